//! Color section: dyes and palettes packed into the descending 0..255
//! glyph-pixel index space.
//!
//! Dye sections hold plain alpha ramps, palette sections hold RGBA quads.
//! Section ends are implicit: the first section runs up to 255, each
//! following one up to the previous section's start minus one, so starts
//! must be strictly descending and ranges can never overlap. Index zero is
//! the background and never belongs to a section.

use crate::error::{Error, Result};
use crate::font::{Font, SectionCounts};
use crate::raw::{is_valid_name, Bytes};

/// What a glyph-pixel value resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorSample {
    /// Alpha of the containing dye at this index.
    Dye(u8),
    /// RGBA of the containing palette at this index.
    Palette([u8; 4]),
}

/// View over the color section.
#[derive(Clone, Copy)]
pub struct FontColor<'a> {
    font: &'a Font,
}

impl<'a> FontColor<'a> {
    pub(crate) fn new(font: &'a Font) -> Self {
        Self { font }
    }

    pub fn num_dyes(&self) -> u8 {
        self.font.counts().num_dyes
    }

    pub fn num_palettes(&self) -> u8 {
        self.font.counts().num_palettes
    }

    pub fn num_sections(&self) -> u16 {
        self.num_dyes() as u16 + self.num_palettes() as u16
    }

    /// Dye sections are declared first.
    pub fn section_is_dye(&self, section: u16) -> bool {
        section < self.num_dyes() as u16
    }

    /// Inclusive `(start, end)` range of the section in palette-index
    /// space.
    pub fn section_range(&self, section: u16) -> Option<(u8, u8)> {
        if section >= self.num_sections() {
            return None;
        }
        let bytes = self.font.bytes();
        let starts = self.font.offsets().color + 2;
        let start = bytes.read_u8(starts + section as usize)?;
        let end = if section == 0 {
            255
        } else {
            bytes.read_u8(starts + section as usize - 1)? - 1
        };
        Some((start, end))
    }

    /// Finds the section containing a glyph-pixel value.
    pub fn section_of_index(&self, index: u8) -> Option<u16> {
        if index == 0 {
            return None;
        }
        for section in 0..self.num_sections() {
            let (start, end) = self.section_range(section)?;
            if (start..=end).contains(&index) {
                return Some(section);
            }
        }
        None
    }

    fn payload_offset(&self, section: u16) -> Option<usize> {
        let total = self.num_sections() as usize;
        let mut offset = self.font.offsets().color + 2 + total;
        for prior in 0..section {
            let (start, end) = self.section_range(prior)?;
            let size = (end - start) as usize + 1;
            offset += if self.section_is_dye(prior) { size } else { size * 4 };
        }
        Some(offset)
    }

    /// Alpha ramp of a dye section, `None` for palettes.
    pub fn dye_alphas(&self, section: u16) -> Option<&'a [u8]> {
        if !self.section_is_dye(section) {
            return None;
        }
        let (start, end) = self.section_range(section)?;
        let offset = self.payload_offset(section)?;
        self.font.bytes().slice(offset, (end - start) as usize + 1)
    }

    /// RGBA payload of a palette section, `None` for dyes.
    pub fn palette_rgba(&self, section: u16) -> Option<&'a [u8]> {
        if section < self.num_dyes() as u16 || section >= self.num_sections() {
            return None;
        }
        let (start, end) = self.section_range(section)?;
        let offset = self.payload_offset(section)?;
        self.font.bytes().slice(offset, ((end - start) as usize + 1) * 4)
    }

    /// Resolves a glyph-pixel value to its dye alpha or palette color.
    pub fn sample(&self, index: u8) -> Option<ColorSample> {
        let section = self.section_of_index(index)?;
        let (start, _) = self.section_range(section)?;
        let nth = (index - start) as usize;
        if self.section_is_dye(section) {
            Some(ColorSample::Dye(*self.dye_alphas(section)?.get(nth)?))
        } else {
            let rgba = self.palette_rgba(section)?;
            let quad = rgba.get(nth * 4..nth * 4 + 4)?;
            Some(ColorSample::Palette([quad[0], quad[1], quad[2], quad[3]]))
        }
    }

    pub fn section_name(&self, section: u16) -> Option<&'a str> {
        let total = self.num_sections();
        if section >= total {
            return None;
        }
        let bytes = self.font.bytes();
        let ends = self.names_ends_offset()?;
        let names = ends + total as usize * 2;
        let end = bytes.read_u16(ends + section as usize * 2)? as usize;
        let start = if section == 0 {
            0
        } else {
            bytes.read_u16(ends + (section as usize - 1) * 2)? as usize
        };
        let raw = bytes.slice(names + start, end - start)?;
        core::str::from_utf8(raw).ok()
    }

    fn names_ends_offset(&self) -> Option<usize> {
        self.payload_offset(self.num_sections())
    }
}

pub(crate) fn validate(
    bytes: &Bytes,
    start: usize,
    counts: &mut SectionCounts,
) -> Result<usize> {
    let num_dyes = bytes.read_u8(start).ok_or(Error::PrematureEnd)?;
    let num_palettes = bytes.read_u8(start + 1).ok_or(Error::PrematureEnd)?;
    let total = num_dyes as usize + num_palettes as usize;
    if total == 0 || total > 255 {
        return Err(Error::InvalidSection("color sections"));
    }

    // strictly descending inclusive starts, never reaching index zero
    let starts = start + 2;
    let mut payload_size = 0usize;
    let mut prev_start = 256i32;
    for section in 0..total {
        let section_start = bytes.read_u8(starts + section).ok_or(Error::PrematureEnd)?;
        if section_start == 0 || (section_start as i32) >= prev_start {
            return Err(Error::InvalidSection("color sections"));
        }
        let end = if section == 0 { 255 } else { prev_start - 1 };
        let size = (end - section_start as i32 + 1) as usize;
        payload_size += if section < num_dyes as usize { size } else { size * 4 };
        prev_start = section_start as i32;
    }

    let payload = starts + total;
    if !bytes.check_range(payload, payload_size) {
        return Err(Error::PrematureEnd);
    }

    let ends = payload + payload_size;
    let names = ends + total * 2;
    let mut prev_end = 0usize;
    for section in 0..total {
        let end = bytes.read_u16(ends + section * 2).ok_or(Error::PrematureEnd)? as usize;
        if end <= prev_end {
            return Err(Error::InvalidSection("color sections"));
        }
        let raw = bytes
            .slice(names + prev_end, end - prev_end)
            .ok_or(Error::PrematureEnd)?;
        let name = core::str::from_utf8(raw)
            .map_err(|_| Error::InvalidSection("color sections"))?;
        if !is_valid_name(name) {
            return Err(Error::InvalidSection("color sections"));
        }
        prev_end = end;
    }
    counts.num_dyes = num_dyes;
    counts.num_palettes = num_palettes;
    Ok(names + prev_end)
}
