//! Code-point mapping: switches and the sorted code-point map.
//!
//! The map is a sorted `i32` code-point array plus one packed entry per
//! code point. An entry is either *direct* (one glyph), a *single group*
//! or *switched*, in which case it stores one group per case of its
//! mapping switch and the active case is the mixed-radix combination of
//! the referenced settings' current values.

use bitflags::bitflags;

use crate::cache::settings::SettingsCache;
use crate::error::{Error, Result};
use crate::font::{Font, SectionCounts};
use crate::raw::Bytes;
use crate::is_valid_glyph_index;

/// Discriminant for direct mapping entries.
pub const SWITCH_TYPE_DIRECT: u8 = 0xFF;
/// Discriminant for single-group mapping entries.
pub const SWITCH_TYPE_GROUP: u8 = 0xFE;

bitflags! {
    /// Animation-related flags carried by glyph groups.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct GroupFlags: u8 {
        const LOOPABLE   = 0b0000_0001;
        const SEQUENTIAL = 0b0000_0010;
        const TERMINAL   = 0b0000_0100;
        const SPLITTABLE = 0b0000_1000;
        const _ = !0; // reserved group bits round-trip untouched
    }
}

/// A group of 1..=128 glyphs returned from a mapping lookup.
#[derive(Clone, Copy, Debug)]
pub struct GlyphMappingGroup<'a> {
    kind: GroupKind<'a>,
}

#[derive(Clone, Copy, Debug)]
enum GroupKind<'a> {
    Single(u16),
    Consecutive { first: u16, len: u8, flags: u8 },
    List { glyphs: &'a [u8], flags: u8 },
}

impl<'a> GlyphMappingGroup<'a> {
    pub fn len(&self) -> u8 {
        match self.kind {
            GroupKind::Single(_) => 1,
            GroupKind::Consecutive { len, .. } => len,
            GroupKind::List { glyphs, .. } => (glyphs.len() / 2) as u8,
        }
    }

    pub fn is_empty(&self) -> bool {
        false // groups always hold at least one glyph
    }

    pub fn flags(&self) -> GroupFlags {
        match self.kind {
            GroupKind::Single(_) => GroupFlags::empty(),
            GroupKind::Consecutive { flags, .. } | GroupKind::List { flags, .. } => {
                GroupFlags::from_bits_retain(flags)
            }
        }
    }

    pub fn glyph(&self, nth: u8) -> Option<u16> {
        if nth >= self.len() {
            return None;
        }
        match self.kind {
            GroupKind::Single(glyph) => Some(glyph),
            GroupKind::Consecutive { first, .. } => Some(first + nth as u16),
            GroupKind::List { glyphs, .. } => {
                let at = nth as usize * 2;
                Some(u16::from_le_bytes([glyphs[at], glyphs[at + 1]]))
            }
        }
    }

    /// First glyph of the group, which is the whole story for
    /// non-animated renderers.
    pub fn first(&self) -> u16 {
        self.glyph(0).unwrap_or(crate::GLYPH_MISSING)
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + 'a {
        let group = *self;
        (0..self.len()).filter_map(move |nth| group.glyph(nth))
    }
}

/// One mapping entry, still unresolved against the current settings.
#[derive(Clone, Copy)]
pub struct MappingEntry<'a> {
    font: &'a Font,
    /// Absolute offset of the discriminant byte.
    offset: usize,
    code_point: i32,
}

impl<'a> MappingEntry<'a> {
    pub(crate) fn at_offset(font: &'a Font, offset: usize, code_point: i32) -> Self {
        Self { font, offset, code_point }
    }

    pub fn code_point(&self) -> i32 {
        self.code_point
    }

    /// Absolute blob offset of this entry, usable as a stable cache key.
    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    pub fn switch_type(&self) -> u8 {
        self.font.bytes().read_u8(self.offset).unwrap_or(SWITCH_TYPE_DIRECT)
    }

    pub fn num_cases(&self) -> u16 {
        match self.switch_type() {
            SWITCH_TYPE_DIRECT | SWITCH_TYPE_GROUP => 1,
            switch => FontMapping::new(self.font)
                .switch_case_count(switch)
                .unwrap_or(1),
        }
    }

    /// Returns the group stored for a specific case.
    pub fn group(&self, case: u8) -> Option<GlyphMappingGroup<'a>> {
        let (offset, direct) = self.group_offset(case)?;
        if direct {
            direct_group_at(self.font, offset)
        } else {
            group_record_at(self.font, offset).map(|(group, _)| group)
        }
    }

    /// Evaluates the entry's switch against the current settings and
    /// returns the selected group.
    pub fn resolve(
        &self,
        font: &'a Font,
        settings: &mut SettingsCache,
    ) -> Result<GlyphMappingGroup<'a>> {
        let case = match self.switch_type() {
            SWITCH_TYPE_DIRECT | SWITCH_TYPE_GROUP => 0,
            switch => settings.switch_case(font, switch)?,
        };
        self.group(case).ok_or(Error::InvalidSection("mapping"))
    }

    /// Locates the group for a case: `(absolute offset, is_direct)`.
    pub(crate) fn group_offset(&self, case: u8) -> Option<(usize, bool)> {
        match self.switch_type() {
            SWITCH_TYPE_DIRECT => (case == 0).then_some((self.offset + 1, true)),
            SWITCH_TYPE_GROUP => (case == 0).then_some((self.offset + 1, false)),
            switch => {
                let cases = FontMapping::new(self.font).switch_case_count(switch)?;
                if case as u16 >= cases {
                    return None;
                }
                let mut offset = self.offset + 1;
                for _ in 0..case {
                    offset = skip_group_record(self.font, offset)?;
                }
                Some((offset, false))
            }
        }
    }
}

/// View over the mapping switches and the code-point map.
#[derive(Clone, Copy)]
pub struct FontMapping<'a> {
    font: &'a Font,
}

impl<'a> FontMapping<'a> {
    pub(crate) fn new(font: &'a Font) -> Self {
        Self { font }
    }

    pub fn num_switches(&self) -> u8 {
        self.font.counts().num_switches
    }

    /// Setting indices referenced by a switch.
    pub fn switch_settings(&self, switch: u8) -> Option<&'a [u8]> {
        if switch >= self.num_switches() {
            return None;
        }
        let bytes = self.font.bytes();
        let base = self.font.offsets().mapping_switches;
        let ends = base + 1;
        let data = ends + self.num_switches() as usize * 2;
        let end = bytes.read_u16(ends + switch as usize * 2)? as usize;
        let start = if switch == 0 {
            0
        } else {
            bytes.read_u16(ends + (switch as usize - 1) * 2)? as usize
        };
        let raw = bytes.slice(data + start, end - start)?;
        Some(&raw[1..]) // first byte is the setting count
    }

    /// Number of cases: the product of the option counts of the switch's
    /// settings.
    pub fn switch_case_count(&self, switch: u8) -> Option<u16> {
        let settings = self.font.settings();
        let mut cases = 1u16;
        for &setting in self.switch_settings(switch)? {
            cases = cases.checked_mul(settings.num_options(setting)? as u16)?;
        }
        Some(cases)
    }

    pub fn num_entries(&self) -> u16 {
        self.font.counts().num_mappings
    }

    pub fn code_point_at(&self, nth: u16) -> Option<i32> {
        if nth >= self.num_entries() {
            return None;
        }
        let base = self.font.offsets().mapping;
        self.font.bytes().read_i32(base + 2 + nth as usize * 4)
    }

    pub fn entry_at(&self, nth: u16) -> Option<MappingEntry<'a>> {
        let num = self.num_entries() as usize;
        if nth as usize >= num {
            return None;
        }
        let bytes = self.font.bytes();
        let base = self.font.offsets().mapping;
        let ends = base + 2 + num * 4;
        let entries = ends + num * 3;
        let start = if nth == 0 {
            0
        } else {
            bytes.read_u24(ends + (nth as usize - 1) * 3)? as usize
        };
        Some(MappingEntry {
            font: self.font,
            offset: entries + start,
            code_point: self.code_point_at(nth)?,
        })
    }

    /// Iterates over every mapping entry in code-point order.
    pub fn iter(&self) -> impl Iterator<Item = MappingEntry<'a>> + 'a {
        let view = *self;
        (0..self.num_entries()).filter_map(move |nth| view.entry_at(nth))
    }

    /// Binary-searches the sorted code-point array.
    pub fn lookup(&self, code_point: i32) -> Option<MappingEntry<'a>> {
        let mut lo = 0u16;
        let mut hi = self.num_entries();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let at = self.code_point_at(mid)?;
            match at.cmp(&code_point) {
                core::cmp::Ordering::Less => lo = mid + 1,
                core::cmp::Ordering::Greater => hi = mid,
                core::cmp::Ordering::Equal => return self.entry_at(mid),
            }
        }
        None
    }
}

pub(crate) fn direct_group_at<'a>(
    font: &'a Font,
    offset: usize,
) -> Option<GlyphMappingGroup<'a>> {
    let glyph = font.bytes().read_u16(offset)?;
    Some(GlyphMappingGroup { kind: GroupKind::Single(glyph) })
}

/// Parses a group record, returning the group and the record's end offset.
pub(crate) fn group_record_at<'a>(
    font: &'a Font,
    offset: usize,
) -> Option<(GlyphMappingGroup<'a>, usize)> {
    let bytes = font.bytes();
    let head = bytes.read_u8(offset)?;
    if head == 0 {
        let glyph = bytes.read_u16(offset + 1)?;
        return Some((GlyphMappingGroup { kind: GroupKind::Single(glyph) }, offset + 3));
    }
    if head & 0x80 != 0 {
        let len = (head & 0x7F) + 1;
        let flags = bytes.read_u8(offset + 1)?;
        let first = bytes.read_u16(offset + 2)?;
        let group = GlyphMappingGroup {
            kind: GroupKind::Consecutive { first, len, flags },
        };
        return Some((group, offset + 4));
    }
    let len = head + 1;
    let flags = bytes.read_u8(offset + 1)?;
    let glyphs = bytes.slice(offset + 2, len as usize * 2)?;
    let group = GlyphMappingGroup { kind: GroupKind::List { glyphs, flags } };
    Some((group, offset + 2 + len as usize * 2))
}

fn skip_group_record(font: &Font, offset: usize) -> Option<usize> {
    group_record_at(font, offset).map(|(_, end)| end)
}

pub(crate) fn validate_switches(
    bytes: &Bytes,
    start: usize,
    option_counts: &[u8],
    counts: &mut SectionCounts,
) -> Result<(usize, Vec<u16>)> {
    let num = bytes.read_u8(start).ok_or(Error::PrematureEnd)?;
    let ends = start + 1;
    let data = ends + num as usize * 2;
    let mut case_counts = Vec::with_capacity(num as usize);
    let mut prev_end = 0usize;
    for switch in 0..num as usize {
        let end = bytes.read_u16(ends + switch * 2).ok_or(Error::PrematureEnd)? as usize;
        if end <= prev_end {
            return Err(Error::InvalidSection("mapping switches"));
        }
        let raw = bytes
            .slice(data + prev_end, end - prev_end)
            .ok_or(Error::PrematureEnd)?;
        let num_settings = raw[0] as usize;
        if num_settings == 0 || raw.len() != 1 + num_settings {
            return Err(Error::InvalidSection("mapping switches"));
        }
        let mut cases = 1u32;
        for (nth, &setting) in raw[1..].iter().enumerate() {
            if setting as usize >= option_counts.len()
                || raw[1..].iter().take(nth).any(|&prior| prior == setting)
            {
                return Err(Error::InvalidSection("mapping switches"));
            }
            cases *= option_counts[setting as usize] as u32;
            // a case index must stay addressable as a u8
            if cases > 255 {
                return Err(Error::InvalidSection("mapping switches"));
            }
        }
        case_counts.push(cases as u16);
        prev_end = end;
    }
    counts.num_switches = num;
    Ok((data + prev_end, case_counts))
}

pub(crate) fn validate_mapping(
    bytes: &Bytes,
    start: usize,
    num_glyphs: u16,
    case_counts: &[u16],
    counts: &mut SectionCounts,
) -> Result<usize> {
    let num = bytes.read_u16(start).ok_or(Error::PrematureEnd)?;
    let code_points = start + 2;
    let ends = code_points + num as usize * 4;
    let entries = ends + num as usize * 3;

    let mut prev_code_point = i64::MIN;
    for nth in 0..num as usize {
        let code_point =
            bytes.read_i32(code_points + nth * 4).ok_or(Error::PrematureEnd)?;
        if (code_point as i64) <= prev_code_point || code_point < 0x20 {
            return Err(Error::InvalidSection("mapping"));
        }
        prev_code_point = code_point as i64;
    }

    let mut prev_end = 0usize;
    for nth in 0..num as usize {
        let end = bytes.read_u24(ends + nth * 3).ok_or(Error::PrematureEnd)? as usize;
        if end <= prev_end {
            return Err(Error::InvalidSection("mapping"));
        }
        let entry = bytes
            .slice(entries + prev_end, end - prev_end)
            .ok_or(Error::PrematureEnd)?;
        validate_entry(entry, num_glyphs, case_counts)?;
        prev_end = end;
    }
    counts.num_mappings = num;
    Ok(entries + prev_end)
}

fn validate_entry(entry: &[u8], num_glyphs: u16, case_counts: &[u16]) -> Result<()> {
    let invalid = Error::InvalidSection("mapping");
    let discriminant = *entry.first().ok_or(Error::PrematureEnd)?;
    let mut pos = 1usize;
    let num_groups = match discriminant {
        SWITCH_TYPE_DIRECT => {
            if entry.len() != 3 {
                return Err(invalid);
            }
            let glyph = u16::from_le_bytes([entry[1], entry[2]]);
            if !is_valid_glyph_index(num_glyphs, glyph) {
                return Err(invalid);
            }
            return Ok(());
        }
        SWITCH_TYPE_GROUP => {
            // single-group entries hold 2..=128 glyphs; the length-1
            // record form is only legal inside switched entries
            if entry.get(1) == Some(&0) {
                return Err(invalid);
            }
            1
        }
        switch if (switch as usize) < case_counts.len() => {
            case_counts[switch as usize]
        }
        _ => return Err(invalid),
    };
    for _ in 0..num_groups {
        pos = validate_group_record(entry, pos, num_glyphs)?;
    }
    if pos != entry.len() {
        return Err(invalid);
    }
    Ok(())
}

fn validate_group_record(entry: &[u8], pos: usize, num_glyphs: u16) -> Result<usize> {
    let invalid = Error::InvalidSection("mapping");
    let head = *entry.get(pos).ok_or(Error::PrematureEnd)?;
    if head == 0 {
        let raw = entry.get(pos + 1..pos + 3).ok_or(Error::PrematureEnd)?;
        let glyph = u16::from_le_bytes([raw[0], raw[1]]);
        if !is_valid_glyph_index(num_glyphs, glyph) {
            return Err(invalid);
        }
        return Ok(pos + 3);
    }
    if head & 0x80 != 0 {
        let len = (head & 0x7F) as u16 + 1;
        if len < 2 {
            return Err(invalid);
        }
        let raw = entry.get(pos + 2..pos + 4).ok_or(Error::PrematureEnd)?;
        let first = u16::from_le_bytes([raw[0], raw[1]]);
        for glyph in first..first.checked_add(len).ok_or(invalid.clone())? {
            if !is_valid_glyph_index(num_glyphs, glyph) {
                return Err(invalid);
            }
        }
        return Ok(pos + 4);
    }
    let len = head as usize + 1; // 2..=128
    if len > 128 {
        return Err(invalid);
    }
    let raw = entry
        .get(pos + 2..pos + 2 + len * 2)
        .ok_or(Error::PrematureEnd)?;
    for pair in raw.chunks_exact(2) {
        let glyph = u16::from_le_bytes([pair[0], pair[1]]);
        if !is_valid_glyph_index(num_glyphs, glyph) {
            return Err(invalid);
        }
    }
    Ok(pos + 2 + len * 2)
}
