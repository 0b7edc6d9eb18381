//! Metrics section: a fixed 14-byte block of global font measures.

use crate::error::{Error, Result};
use crate::font::{Font, SectionCounts};
use crate::raw::Bytes;
use crate::MAX_GLYPHS;

pub(crate) const METRICS_SIZE: usize = 14;

/// View over the fixed-size metrics section.
#[derive(Clone, Copy)]
pub struct FontMetrics<'a> {
    font: &'a Font,
}

impl<'a> FontMetrics<'a> {
    pub(crate) fn new(font: &'a Font) -> Self {
        Self { font }
    }

    fn byte(&self, index: usize) -> u8 {
        let offset = self.font.offsets().metrics;
        self.font.bytes().read_u8(offset + index).unwrap_or(0)
    }

    pub fn num_glyphs(&self) -> u16 {
        let offset = self.font.offsets().metrics;
        self.font.bytes().read_u16(offset).unwrap_or(0)
    }

    pub fn has_vert_layout(&self) -> bool {
        self.byte(2) != 0
    }

    /// Fixed advance for monospaced fonts, zero otherwise.
    pub fn mono_width(&self) -> u8 {
        self.byte(3)
    }

    pub fn ascent(&self) -> u8 {
        self.byte(4)
    }

    pub fn extra_ascent(&self) -> u8 {
        self.byte(5)
    }

    pub fn descent(&self) -> u8 {
        self.byte(6)
    }

    pub fn extra_descent(&self) -> u8 {
        self.byte(7)
    }

    pub fn uppercase_ascent(&self) -> u8 {
        self.byte(8)
    }

    pub fn midline_ascent(&self) -> u8 {
        self.byte(9)
    }

    pub fn horz_interspacing(&self) -> u8 {
        self.byte(10)
    }

    pub fn vert_interspacing(&self) -> u8 {
        self.byte(11)
    }

    pub fn line_gap(&self) -> u8 {
        self.byte(12)
    }

    pub fn vert_line_width(&self) -> u8 {
        self.byte(13)
    }
}

pub(crate) fn validate(
    bytes: &Bytes,
    start: usize,
    counts: &mut SectionCounts,
) -> Result<usize> {
    if !bytes.check_range(start, METRICS_SIZE) {
        return Err(Error::PrematureEnd);
    }
    let num_glyphs = bytes.read_u16(start).ok_or(Error::PrematureEnd)?;
    if num_glyphs == 0 || num_glyphs > MAX_GLYPHS {
        return Err(Error::InvalidSection("metrics"));
    }
    let vert_layout = bytes.read_u8(start + 2).ok_or(Error::PrematureEnd)?;
    if vert_layout > 1 {
        return Err(Error::InvalidSection("metrics"));
    }
    counts.num_glyphs = num_glyphs;
    counts.has_vert_layout = vert_layout != 0;
    Ok(start + METRICS_SIZE)
}
