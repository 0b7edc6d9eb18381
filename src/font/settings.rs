//! Settings and the interned word table.
//!
//! A setting is a named enumerated variable with 2..=255 option labels.
//! Labels are `u8` indices into a two-level dictionary: the 256-entry
//! built-in word list shared by every font, and the font-local word list.
//! On the wire the words section stores the referenced built-in ids first
//! and the local words after them, so label indices below the built-in
//! reference count resolve through [`BUILTIN_WORDS`].
//!
//! The *current value* of a setting is per-reader state (see
//! [`crate::SettingsCache`]), never part of the font.

use crate::error::{Error, Result};
use crate::font::{Font, SectionCounts};
use crate::raw::{is_valid_name, Bytes};

/// The built-in word list shared by every font. Fonts reference entries by
/// id instead of storing the bytes.
#[rustfmt::skip]
pub static BUILTIN_WORDS: [&str; 256] = [
    "off", "on", "no", "yes", "none", "auto", "default", "custom",
    "low", "medium", "high", "max", "min", "half", "full", "double",
    "tiny", "small", "normal", "large", "big", "huge", "short", "tall",
    "thin", "light", "regular", "bold", "heavy", "black", "outline", "shadow",
    "italic", "oblique", "upright", "condensed", "expanded", "wide", "narrow", "mono",
    "round", "square", "sharp", "soft", "flat", "raised", "inset", "beveled",
    "simple", "fancy", "plain", "ornate", "clean", "rough", "smooth", "jagged",
    "caps", "lowercase", "uppercase", "mixed", "numeric", "roman", "serif", "sans",
    "white", "gray", "silver", "red", "green", "blue", "yellow", "orange",
    "purple", "pink", "brown", "cyan", "magenta", "gold", "bronze", "copper",
    "left", "right", "center", "top", "bottom", "middle", "start", "end",
    "first", "second", "third", "alt", "main", "extra", "spare", "old",
    "new", "slow", "fast", "still", "blink", "pulse", "wave", "glow",
    "day", "night", "dawn", "dusk", "spring", "summer", "autumn", "winter",
    "easy", "hard", "retro", "modern", "classic", "pixel", "crisp", "blurry",
    "one", "two", "three", "four", "five", "six", "seven", "eight",
    "0", "1", "2", "3", "4", "5", "6", "7",
    "8", "9", "10", "11", "12", "13", "14", "15",
    "16", "17", "18", "19", "20", "21", "22", "23",
    "24", "25", "26", "27", "28", "29", "30", "31",
    "32", "33", "34", "35", "36", "37", "38", "39",
    "40", "41", "42", "43", "44", "45", "46", "47",
    "48", "49", "50", "51", "52", "53", "54", "55",
    "56", "57", "58", "59", "60", "61", "62", "63",
    "64", "65", "66", "67", "68", "69", "70", "71",
    "72", "73", "74", "75", "76", "77", "78", "79",
    "80", "81", "82", "83", "84", "85", "86", "87",
    "88", "89", "90", "91", "92", "93", "94", "95",
    "96", "97", "98", "99", "100", "101", "102", "103",
    "104", "105", "106", "107", "108", "109", "110", "111",
    "112", "113", "114", "115", "116", "117", "118", "119",
    "120", "121", "122", "123", "124", "125", "126", "127",
];

/// View over the word table and setting definitions.
#[derive(Clone, Copy)]
pub struct FontSettings<'a> {
    font: &'a Font,
}

impl<'a> FontSettings<'a> {
    pub(crate) fn new(font: &'a Font) -> Self {
        Self { font }
    }

    pub fn num_words(&self) -> u16 {
        let counts = self.font.counts();
        counts.num_builtin_words as u16 + counts.num_local_words as u16
    }

    /// Resolves a word index: built-in references first, local words after.
    pub fn word(&self, index: u8) -> Option<&'a str> {
        let counts = self.font.counts();
        let bytes = self.font.bytes();
        let base = self.font.offsets().words;
        if index < counts.num_builtin_words {
            let id = bytes.read_u8(base + 1 + index as usize)?;
            return Some(BUILTIN_WORDS[id as usize]);
        }
        let nth = (index - counts.num_builtin_words) as usize;
        if nth >= counts.num_local_words as usize {
            return None;
        }
        let ends = base + 1 + counts.num_builtin_words as usize + 1;
        let words = ends + counts.num_local_words as usize * 2;
        let end = bytes.read_u16(ends + nth * 2)? as usize;
        let start = if nth == 0 {
            0
        } else {
            bytes.read_u16(ends + (nth - 1) * 2)? as usize
        };
        let raw = bytes.slice(words + start, end - start)?;
        core::str::from_utf8(raw).ok()
    }

    pub fn num_settings(&self) -> u8 {
        self.font.counts().num_settings
    }

    pub fn setting_name(&self, setting: u8) -> Option<&'a str> {
        let num = self.num_settings() as usize;
        if setting as usize >= num {
            return None;
        }
        let bytes = self.font.bytes();
        let ends = self.font.offsets().setting_names + 1;
        let names = ends + num * 2;
        let end = bytes.read_u16(ends + setting as usize * 2)? as usize;
        let start = if setting == 0 {
            0
        } else {
            bytes.read_u16(ends + (setting as usize - 1) * 2)? as usize
        };
        let raw = bytes.slice(names + start, end - start)?;
        core::str::from_utf8(raw).ok()
    }

    fn option_list(&self, setting: u8) -> Option<&'a [u8]> {
        let num = self.num_settings() as usize;
        if setting as usize >= num {
            return None;
        }
        let bytes = self.font.bytes();
        let ends = self.font.offsets().setting_defs;
        let lists = ends + num * 2;
        let end = bytes.read_u16(ends + setting as usize * 2)? as usize;
        let start = if setting == 0 {
            0
        } else {
            bytes.read_u16(ends + (setting as usize - 1) * 2)? as usize
        };
        bytes.slice(lists + start, end - start)
    }

    pub fn num_options(&self, setting: u8) -> Option<u8> {
        self.option_list(setting).map(|list| list.len() as u8)
    }

    pub fn option_word_index(&self, setting: u8, option: u8) -> Option<u8> {
        self.option_list(setting)?.get(option as usize).copied()
    }

    pub fn option_label(&self, setting: u8, option: u8) -> Option<&'a str> {
        self.word(self.option_word_index(setting, option)?)
    }
}

pub(crate) fn validate_words(
    bytes: &Bytes,
    start: usize,
    counts: &mut SectionCounts,
) -> Result<usize> {
    let num_builtin = bytes.read_u8(start).ok_or(Error::PrematureEnd)?;
    let ids = start + 1;
    let mut prev_id = -1i32;
    for nth in 0..num_builtin as usize {
        let id = bytes.read_u8(ids + nth).ok_or(Error::PrematureEnd)?;
        if id as i32 <= prev_id {
            return Err(Error::InvalidSection("words"));
        }
        prev_id = id as i32;
    }
    let num_local = bytes.read_u8(ids + num_builtin as usize).ok_or(Error::PrematureEnd)?;
    if num_builtin as u16 + num_local as u16 > 255 {
        return Err(Error::InvalidSection("words"));
    }
    let ends = ids + num_builtin as usize + 1;
    let words = ends + num_local as usize * 2;
    let mut prev_end = 0usize;
    for nth in 0..num_local as usize {
        let end = bytes.read_u16(ends + nth * 2).ok_or(Error::PrematureEnd)? as usize;
        if end <= prev_end || end - prev_end > 32 {
            return Err(Error::InvalidSection("words"));
        }
        let raw = bytes
            .slice(words + prev_end, end - prev_end)
            .ok_or(Error::PrematureEnd)?;
        if core::str::from_utf8(raw).is_err() {
            return Err(Error::InvalidSection("words"));
        }
        prev_end = end;
    }
    counts.num_builtin_words = num_builtin;
    counts.num_local_words = num_local;
    Ok(words + prev_end)
}

pub(crate) fn validate_setting_names(
    bytes: &Bytes,
    start: usize,
    counts: &mut SectionCounts,
) -> Result<usize> {
    let num = bytes.read_u8(start).ok_or(Error::PrematureEnd)?;
    let ends = start + 1;
    let names = ends + num as usize * 2;
    let mut prev_end = 0usize;
    let mut prev_names: Vec<&str> = Vec::with_capacity(num as usize);
    for nth in 0..num as usize {
        let end = bytes.read_u16(ends + nth * 2).ok_or(Error::PrematureEnd)? as usize;
        if end <= prev_end {
            return Err(Error::InvalidSection("setting names"));
        }
        let raw = bytes
            .slice(names + prev_end, end - prev_end)
            .ok_or(Error::PrematureEnd)?;
        let name = core::str::from_utf8(raw)
            .map_err(|_| Error::InvalidSection("setting names"))?;
        if !is_valid_name(name) || prev_names.contains(&name) {
            return Err(Error::InvalidSection("setting names"));
        }
        prev_names.push(name);
        prev_end = end;
    }
    counts.num_settings = num;
    Ok(names + prev_end)
}

/// Validates the option lists and returns the per-setting option counts
/// for the switch validators downstream.
pub(crate) fn validate_setting_defs(
    bytes: &Bytes,
    start: usize,
    num_settings: u8,
    total_words: u16,
) -> Result<(usize, Vec<u8>)> {
    let lists = start + num_settings as usize * 2;
    let mut option_counts = Vec::with_capacity(num_settings as usize);
    let mut prev_end = 0usize;
    for setting in 0..num_settings as usize {
        let end = bytes.read_u16(start + setting * 2).ok_or(Error::PrematureEnd)? as usize;
        let len = end.checked_sub(prev_end).ok_or(Error::InvalidSection("settings"))?;
        if !(2..=255).contains(&len) {
            return Err(Error::InvalidSection("settings"));
        }
        let list = bytes.slice(lists + prev_end, len).ok_or(Error::PrematureEnd)?;
        for &word in list {
            if word as u16 >= total_words {
                return Err(Error::InvalidSection("settings"));
            }
        }
        option_counts.push(len as u8);
        prev_end = end;
    }
    Ok((lists + prev_end, option_counts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_words_are_distinct() {
        let mut sorted: Vec<&str> = BUILTIN_WORDS.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 256);
    }
}
