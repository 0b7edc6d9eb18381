//! The parsed font container.
//!
//! A [`Font`] is an immutable decompressed byte vector plus one absolute
//! offset per section. Parsing walks the blob once, validating each section
//! and recording where it starts; afterwards every lookup works directly on
//! the bytes through binary searches and offset arithmetic. No section is
//! reshaped into an object graph, which is what makes the byte-for-byte
//! round trip (`parse(export(f)) == f`) trivial.

pub mod color;
pub mod glyphs;
pub mod header;
pub mod kerning;
pub mod mapping;
pub mod metrics;
pub mod rewrites;
pub mod settings;

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;

use crate::error::{Error, Result};
use crate::raw::Bytes;
use crate::{FONT_MAGIC, FORMAT_VERSION, MAX_FONT_DATA_SIZE};

/// Absolute section offsets into the decompressed blob, computed while
/// parsing. `end` always equals the blob length.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct SectionOffsets {
    pub name: usize,
    pub family: usize,
    pub author: usize,
    pub about: usize,
    pub metrics: usize,
    pub color: usize,
    pub glyph_names: usize,
    pub glyph_masks: usize,
    pub words: usize,
    pub setting_names: usize,
    pub setting_defs: usize,
    pub mapping_switches: usize,
    pub mapping: usize,
    pub conditions: usize,
    pub utf8_sets: usize,
    pub glyph_sets: usize,
    pub utf8_rewrites: usize,
    pub glyph_rewrites: usize,
    pub horz_kernings: usize,
    pub vert_kernings: usize,
    pub end: usize,
}

/// Cheap per-section counts cached at parse time so the views don't have
/// to re-read their prefixes on every call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct SectionCounts {
    pub num_glyphs: u16,
    pub has_vert_layout: bool,
    pub num_named_glyphs: u16,
    pub num_dyes: u8,
    pub num_palettes: u8,
    pub num_builtin_words: u8,
    pub num_local_words: u8,
    pub num_settings: u8,
    pub num_switches: u8,
    pub num_mappings: u16,
    pub num_conditions: u8,
    pub num_utf8_sets: u8,
    pub num_glyph_sets: u8,
    pub num_utf8_rules: u8,
    pub num_glyph_rules: u8,
    pub num_horz_kernings: u32,
    pub num_vert_kernings: u32,
}

/// An immutable parsed font.
///
/// Construction goes through [`Font::parse`] (or the builder); afterwards
/// any number of threads may share the font by reference. Per-reader state
/// like settings and mapping caches lives outside the font.
pub struct Font {
    data: Vec<u8>,
    offsets: SectionOffsets,
    counts: SectionCounts,
}

impl PartialEq for Font {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data && self.offsets == other.offsets
    }
}

impl Eq for Font {}

impl std::fmt::Debug for Font {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Font")
            .field("id", &self.header().font_id())
            .field("name", &self.header().name())
            .field("num_glyphs", &self.counts.num_glyphs)
            .field("size", &self.data.len())
            .finish()
    }
}

impl Font {
    /// Parses a `.ggfnt` file: six magic bytes followed by a gzip stream.
    ///
    /// The decompression buffer is bounded by the 32 MiB ceiling at every
    /// step, so a hostile stream can't balloon memory before the size check.
    pub fn parse<R: Read>(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 6];
        reader.read_exact(&mut magic).map_err(map_io)?;
        if magic != FONT_MAGIC {
            return Err(Error::InvalidSignature);
        }
        let mut decoder = GzDecoder::new(reader);
        let mut data = Vec::new();
        let mut chunk = [0u8; 32 * 1024];
        loop {
            let read = decoder.read(&mut chunk).map_err(map_io)?;
            if read == 0 {
                break;
            }
            if data.len() + read > MAX_FONT_DATA_SIZE {
                return Err(Error::FileSizeExceedsLimit);
            }
            data.extend_from_slice(&chunk[..read]);
        }
        Self::from_decompressed(data)
    }

    /// Builds a font from an already decompressed blob, validating every
    /// section and computing the offset table.
    pub fn from_decompressed(data: Vec<u8>) -> Result<Self> {
        if data.len() > MAX_FONT_DATA_SIZE {
            return Err(Error::FileSizeExceedsLimit);
        }
        let (offsets, counts) = compute_offsets(&data)?;
        debug!(
            size = data.len(),
            num_glyphs = counts.num_glyphs,
            "parsed font blob"
        );
        Ok(Self { data, offsets, counts })
    }

    /// Writes the `.ggfnt` file form: magic bytes plus the gzipped blob.
    pub fn export<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&FONT_MAGIC).map_err(|_| Error::InvalidPayload)?;
        let mut encoder = GzEncoder::new(writer, Compression::default());
        encoder.write_all(&self.data).map_err(|_| Error::InvalidPayload)?;
        encoder.finish().map_err(|_| Error::InvalidPayload)?;
        Ok(())
    }

    /// Returns the decompressed blob.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn bytes(&self) -> Bytes<'_> {
        Bytes::new(&self.data)
    }

    pub(crate) fn offsets(&self) -> &SectionOffsets {
        &self.offsets
    }

    pub(crate) fn counts(&self) -> &SectionCounts {
        &self.counts
    }

    pub fn header(&self) -> header::FontHeader<'_> {
        header::FontHeader::new(self)
    }

    pub fn metrics(&self) -> metrics::FontMetrics<'_> {
        metrics::FontMetrics::new(self)
    }

    pub fn color(&self) -> color::FontColor<'_> {
        color::FontColor::new(self)
    }

    pub fn glyphs(&self) -> glyphs::FontGlyphs<'_> {
        glyphs::FontGlyphs::new(self)
    }

    pub fn settings(&self) -> settings::FontSettings<'_> {
        settings::FontSettings::new(self)
    }

    pub fn mapping(&self) -> mapping::FontMapping<'_> {
        mapping::FontMapping::new(self)
    }

    pub fn rewrites(&self) -> rewrites::FontRewrites<'_> {
        rewrites::FontRewrites::new(self)
    }

    pub fn kerning(&self) -> kerning::FontKerning<'_> {
        kerning::FontKerning::new(self)
    }
}

fn map_io(err: std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::PrematureEnd
    } else {
        Error::InvalidPayload
    }
}

fn compute_offsets(data: &[u8]) -> Result<(SectionOffsets, SectionCounts)> {
    let bytes = Bytes::new(data);
    let mut offsets = SectionOffsets::default();
    let mut counts = SectionCounts::default();

    let mut pos = header::validate(&bytes, &mut offsets)?;

    offsets.metrics = pos;
    pos = metrics::validate(&bytes, pos, &mut counts)?;

    offsets.color = pos;
    pos = color::validate(&bytes, pos, &mut counts)?;

    offsets.glyph_names = pos;
    pos = glyphs::validate_names(&bytes, pos, counts.num_glyphs, &mut counts)?;

    offsets.glyph_masks = pos;
    pos = glyphs::validate_masks(&bytes, pos, counts.num_glyphs, counts.has_vert_layout)?;

    offsets.words = pos;
    pos = settings::validate_words(&bytes, pos, &mut counts)?;
    let total_words = counts.num_builtin_words as u16 + counts.num_local_words as u16;

    offsets.setting_names = pos;
    pos = settings::validate_setting_names(&bytes, pos, &mut counts)?;

    offsets.setting_defs = pos;
    let (end, option_counts) =
        settings::validate_setting_defs(&bytes, pos, counts.num_settings, total_words)?;
    pos = end;

    offsets.mapping_switches = pos;
    let (end, case_counts) =
        mapping::validate_switches(&bytes, pos, &option_counts, &mut counts)?;
    pos = end;

    offsets.mapping = pos;
    pos = mapping::validate_mapping(&bytes, pos, counts.num_glyphs, &case_counts, &mut counts)?;

    offsets.conditions = pos;
    pos = rewrites::validate_conditions(&bytes, pos, counts.num_settings, &mut counts)?;

    offsets.utf8_sets = pos;
    pos = rewrites::validate_utf8_sets(&bytes, pos, &mut counts)?;

    offsets.glyph_sets = pos;
    pos = rewrites::validate_glyph_sets(&bytes, pos, counts.num_glyphs, &mut counts)?;

    offsets.utf8_rewrites = pos;
    let (end, num) = rewrites::validate_utf8_rules(
        &bytes,
        pos,
        counts.num_conditions,
        counts.num_utf8_sets,
    )?;
    counts.num_utf8_rules = num;
    pos = end;

    offsets.glyph_rewrites = pos;
    let (end, num) = rewrites::validate_glyph_rules(
        &bytes,
        pos,
        counts.num_conditions,
        counts.num_glyph_sets,
        counts.num_glyphs,
    )?;
    counts.num_glyph_rules = num;
    pos = end;

    offsets.horz_kernings = pos;
    let (end, num) = kerning::validate(&bytes, pos, counts.num_glyphs)?;
    counts.num_horz_kernings = num;
    pos = end;

    offsets.vert_kernings = pos;
    let (end, num) = kerning::validate(&bytes, pos, counts.num_glyphs)?;
    counts.num_vert_kernings = num;
    pos = end;

    offsets.end = pos;
    if pos != data.len() {
        return Err(Error::InvalidSection("trailing data"));
    }
    Ok((offsets, counts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_magic_is_rejected() {
        let result = Font::parse(&b"nonsense here"[..]);
        assert_eq!(result.unwrap_err(), Error::InvalidSignature);
    }

    #[test]
    fn truncated_file_is_rejected() {
        let result = Font::parse(&b"tggf"[..]);
        assert_eq!(result.unwrap_err(), Error::PrematureEnd);
    }

    #[test]
    fn empty_blob_is_premature() {
        let result = Font::from_decompressed(Vec::new());
        assert_eq!(result.unwrap_err(), Error::PrematureEnd);
    }
}
