//! Kerning tables: sorted `(prev << 16) | curr` keys with `i8` offsets.

use crate::error::{Error, Result};
use crate::font::Font;
use crate::raw::Bytes;
use crate::is_valid_glyph_index;

/// View over the horizontal and vertical kerning tables.
#[derive(Clone, Copy)]
pub struct FontKerning<'a> {
    font: &'a Font,
}

impl<'a> FontKerning<'a> {
    pub(crate) fn new(font: &'a Font) -> Self {
        Self { font }
    }

    pub fn num_horz_pairs(&self) -> u32 {
        self.font.counts().num_horz_kernings
    }

    pub fn num_vert_pairs(&self) -> u32 {
        self.font.counts().num_vert_kernings
    }

    /// Horizontal kerning between two adjacent glyphs, zero when absent.
    pub fn horz(&self, prev: u16, curr: u16) -> i8 {
        self.get(self.font.offsets().horz_kernings, self.num_horz_pairs(), prev, curr)
    }

    /// Vertical kerning between two adjacent glyphs, zero when absent.
    pub fn vert(&self, prev: u16, curr: u16) -> i8 {
        self.get(self.font.offsets().vert_kernings, self.num_vert_pairs(), prev, curr)
    }

    /// Returns the `nth` horizontal pair as `(prev, curr, value)`.
    pub fn horz_pair_at(&self, nth: u32) -> Option<(u16, u16, i8)> {
        self.pair_at(self.font.offsets().horz_kernings, self.num_horz_pairs(), nth)
    }

    /// Returns the `nth` vertical pair as `(prev, curr, value)`.
    pub fn vert_pair_at(&self, nth: u32) -> Option<(u16, u16, i8)> {
        self.pair_at(self.font.offsets().vert_kernings, self.num_vert_pairs(), nth)
    }

    fn get(&self, base: usize, num: u32, prev: u16, curr: u16) -> i8 {
        let bytes = self.font.bytes();
        let keys = base + 3;
        let values = keys + num as usize * 4;
        let target = ((prev as u32) << 16) | curr as u32;
        let mut lo = 0u32;
        let mut hi = num;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let key = match bytes.read_u32(keys + mid as usize * 4) {
                Some(key) => key,
                None => return 0,
            };
            match key.cmp(&target) {
                core::cmp::Ordering::Less => lo = mid + 1,
                core::cmp::Ordering::Greater => hi = mid,
                core::cmp::Ordering::Equal => {
                    return bytes.read_i8(values + mid as usize).unwrap_or(0)
                }
            }
        }
        0
    }

    fn pair_at(&self, base: usize, num: u32, nth: u32) -> Option<(u16, u16, i8)> {
        if nth >= num {
            return None;
        }
        let bytes = self.font.bytes();
        let keys = base + 3;
        let values = keys + num as usize * 4;
        let key = bytes.read_u32(keys + nth as usize * 4)?;
        let value = bytes.read_i8(values + nth as usize)?;
        Some(((key >> 16) as u16, key as u16, value))
    }
}

pub(crate) fn validate(
    bytes: &Bytes,
    start: usize,
    num_glyphs: u16,
) -> Result<(usize, u32)> {
    let num = bytes.read_u24(start).ok_or(Error::PrematureEnd)?;
    let keys = start + 3;
    let values = keys + num as usize * 4;
    let mut prev_key: i64 = -1;
    for nth in 0..num as usize {
        let key = bytes.read_u32(keys + nth * 4).ok_or(Error::PrematureEnd)?;
        if (key as i64) <= prev_key {
            return Err(Error::InvalidSection("kernings"));
        }
        let first = (key >> 16) as u16;
        let second = key as u16;
        if !is_valid_glyph_index(num_glyphs, first)
            || !is_valid_glyph_index(num_glyphs, second)
        {
            return Err(Error::InvalidSection("kernings"));
        }
        prev_key = key as i64;
    }
    if !bytes.check_range(values, num as usize) {
        return Err(Error::PrematureEnd);
    }
    Ok((values + num as usize, num))
}
