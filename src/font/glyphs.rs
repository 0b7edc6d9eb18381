//! Glyph table: placements, raster-op masks and the named-glyph index.
//!
//! Layout: the names section is a `u16` count, the glyph indices in
//! name-sorted order, `u24` name end-offsets and the concatenated name
//! bytes. The masks section is one `u24` end-offset per glyph followed by
//! the mask blob, where each entry starts with the placement bytes and
//! continues with the glyph's raster-op stream.

use crate::error::{Error, Result};
use crate::font::{Font, SectionCounts};
use crate::mask::{self, AlphaMask, MaskRect};
use crate::raw::{is_valid_name, Bytes};

/// Per-glyph placement metrics. The vertical-layout fields are only
/// meaningful when the font has vertical layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GlyphPlacement {
    pub advance: u8,
    pub top_advance: u8,
    pub bottom_advance: u8,
    pub horz_center: u8,
}

/// View over the glyph table.
#[derive(Clone, Copy)]
pub struct FontGlyphs<'a> {
    font: &'a Font,
}

impl<'a> FontGlyphs<'a> {
    pub(crate) fn new(font: &'a Font) -> Self {
        Self { font }
    }

    pub fn num_glyphs(&self) -> u16 {
        self.font.counts().num_glyphs
    }

    pub fn num_named_glyphs(&self) -> u16 {
        self.font.counts().num_named_glyphs
    }

    /// Returns the glyph index and name of the `nth` named glyph, in
    /// ascending name order.
    pub fn named_glyph(&self, nth: u16) -> Option<(u16, &'a str)> {
        if nth >= self.num_named_glyphs() {
            return None;
        }
        let bytes = self.font.bytes();
        let base = self.font.offsets().glyph_names;
        let glyph = bytes.read_u16(base + 2 + nth as usize * 2)?;
        Some((glyph, self.name_at(nth)?))
    }

    /// Iterates over `(glyph index, name)` pairs in ascending name order.
    pub fn named_glyphs(&self) -> impl Iterator<Item = (u16, &'a str)> + 'a {
        let view = *self;
        (0..self.num_named_glyphs()).filter_map(move |nth| view.named_glyph(nth))
    }

    /// Binary-searches the name-sorted index for an exact name.
    pub fn find_index_by_name(&self, name: &str) -> Option<u16> {
        let num = self.num_named_glyphs();
        let mut lo = 0u16;
        let mut hi = num;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.name_at(mid)?.cmp(name) {
                core::cmp::Ordering::Less => lo = mid + 1,
                core::cmp::Ordering::Greater => hi = mid,
                core::cmp::Ordering::Equal => {
                    let bytes = self.font.bytes();
                    let base = self.font.offsets().glyph_names;
                    return bytes.read_u16(base + 2 + mid as usize * 2);
                }
            }
        }
        None
    }

    fn name_at(&self, nth: u16) -> Option<&'a str> {
        let bytes = self.font.bytes();
        let base = self.font.offsets().glyph_names;
        let num = self.num_named_glyphs() as usize;
        let ends = base + 2 + num * 2;
        let names = ends + num * 3;
        let end = bytes.read_u24(ends + nth as usize * 3)? as usize;
        let start = if nth == 0 {
            0
        } else {
            bytes.read_u24(ends + (nth as usize - 1) * 3)? as usize
        };
        let raw = bytes.slice(names + start, end - start)?;
        core::str::from_utf8(raw).ok()
    }

    fn mask_entry(&self, glyph: u16) -> Option<&'a [u8]> {
        if glyph >= self.num_glyphs() {
            return None;
        }
        let bytes = self.font.bytes();
        let base = self.font.offsets().glyph_masks;
        let num = self.num_glyphs() as usize;
        let blob = base + num * 3;
        let end = bytes.read_u24(base + glyph as usize * 3)? as usize;
        let start = if glyph == 0 {
            0
        } else {
            bytes.read_u24(base + (glyph as usize - 1) * 3)? as usize
        };
        bytes.slice(blob + start, end - start)
    }

    fn placement_size(&self) -> usize {
        if self.font.counts().has_vert_layout {
            4
        } else {
            1
        }
    }

    pub fn placement(&self, glyph: u16) -> Option<GlyphPlacement> {
        let entry = self.mask_entry(glyph)?;
        let mut placement = GlyphPlacement {
            advance: *entry.first()?,
            ..Default::default()
        };
        if self.font.counts().has_vert_layout {
            placement.top_advance = *entry.get(1)?;
            placement.bottom_advance = *entry.get(2)?;
            placement.horz_center = *entry.get(3)?;
        }
        Some(placement)
    }

    /// Returns the raw raster-op stream for a glyph.
    pub fn mask_ops(&self, glyph: u16) -> Option<&'a [u8]> {
        self.mask_entry(glyph).map(|entry| &entry[self.placement_size()..])
    }

    /// Decodes the glyph's alpha mask.
    pub fn decode_mask(&self, glyph: u16) -> Result<AlphaMask> {
        let ops = self.mask_ops(glyph).ok_or(Error::GlyphNotFound)?;
        mask::decode(ops)
    }

    /// Computes the glyph's tight bounds without materialising the mask.
    pub fn mask_bounds(&self, glyph: u16) -> Result<MaskRect> {
        let ops = self.mask_ops(glyph).ok_or(Error::GlyphNotFound)?;
        mask::decode_bounds(ops)
    }
}

pub(crate) fn validate_names(
    bytes: &Bytes,
    start: usize,
    num_glyphs: u16,
    counts: &mut SectionCounts,
) -> Result<usize> {
    let num = bytes.read_u16(start).ok_or(Error::PrematureEnd)?;
    if num > num_glyphs {
        return Err(Error::InvalidSection("glyph names"));
    }
    let indices = start + 2;
    let ends = indices + num as usize * 2;
    let names = ends + num as usize * 3;

    let mut seen = vec![false; num_glyphs as usize];
    for nth in 0..num as usize {
        let glyph = bytes.read_u16(indices + nth * 2).ok_or(Error::PrematureEnd)?;
        if glyph >= num_glyphs || seen[glyph as usize] {
            return Err(Error::InvalidSection("glyph names"));
        }
        seen[glyph as usize] = true;
    }

    let mut prev_end = 0usize;
    let mut prev_name: Option<&str> = None;
    for nth in 0..num as usize {
        let end = bytes.read_u24(ends + nth * 3).ok_or(Error::PrematureEnd)? as usize;
        if end <= prev_end {
            return Err(Error::InvalidSection("glyph names"));
        }
        let raw = bytes
            .slice(names + prev_end, end - prev_end)
            .ok_or(Error::PrematureEnd)?;
        let name = core::str::from_utf8(raw)
            .map_err(|_| Error::InvalidSection("glyph names"))?;
        if !is_valid_name(name) {
            return Err(Error::InvalidSection("glyph names"));
        }
        match prev_name {
            Some(prev) if prev == name => return Err(Error::DuplicatedGlyphName),
            Some(prev) if prev > name => {
                return Err(Error::InvalidSection("glyph names"))
            }
            _ => {}
        }
        prev_name = Some(name);
        prev_end = end;
    }
    counts.num_named_glyphs = num;
    Ok(names + prev_end)
}

pub(crate) fn validate_masks(
    bytes: &Bytes,
    start: usize,
    num_glyphs: u16,
    has_vert_layout: bool,
) -> Result<usize> {
    let blob = start + num_glyphs as usize * 3;
    let placement_size = if has_vert_layout { 4 } else { 1 };
    let mut prev_end = 0usize;
    for glyph in 0..num_glyphs as usize {
        let end = bytes.read_u24(start + glyph * 3).ok_or(Error::PrematureEnd)? as usize;
        if end < prev_end + placement_size {
            return Err(Error::InvalidSection("glyph masks"));
        }
        let entry = bytes
            .slice(blob + prev_end, end - prev_end)
            .ok_or(Error::PrematureEnd)?;
        // the bounds walk exercises the whole op stream cheaply
        mask::decode_bounds(&entry[placement_size..])
            .map_err(|_| Error::InvalidSection("glyph masks"))?;
        prev_end = end;
    }
    Ok(blob + prev_end)
}
