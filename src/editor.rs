//! The `.ggwkfnt` editor sidecar.
//!
//! Editors keep workflow data that doesn't belong in the shipped font:
//! glyph categories, kerning classes, class-based kerning pairs and
//! display names for rewrite conditions. The sidecar is tied to one font
//! through the font id and refuses to load against anything else.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{Error, Result};
use crate::font::Font;
use crate::raw::{self, is_valid_name, Bytes};
use crate::{EDIT_MAGIC, MAX_FONT_DATA_SIZE};

/// A named run of consecutive glyphs used to organise the editor's glyph
/// list. Category sizes sum to the font's glyph count.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlyphCategory {
    pub name: String,
    pub size: u16,
}

/// A named kerning value that classed pairs can reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KerningClass {
    pub name: String,
    pub value: i8,
}

/// A kerning pair routed through a class. Classes are one-indexed; zero
/// in a pair means "use the pair's own value" and is not storable here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClassKerningPair {
    pub first: u16,
    pub second: u16,
    pub class: u16,
}

/// Parsed contents of a `.ggwkfnt` file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FontEditData {
    pub font_id: u64,
    pub categories: Vec<GlyphCategory>,
    pub kerning_classes: Vec<KerningClass>,
    pub horz_class_pairs: Vec<ClassKerningPair>,
    pub vert_class_pairs: Vec<ClassKerningPair>,
    pub condition_names: Vec<String>,
}

impl FontEditData {
    /// Creates empty edit data bound to a font.
    pub fn for_font(font: &Font) -> Self {
        Self { font_id: font.header().font_id(), ..Default::default() }
    }

    /// Parses a sidecar file and checks it against the font it claims to
    /// belong to.
    pub fn parse<R: Read>(mut reader: R, font: &Font) -> Result<Self> {
        let mut magic = [0u8; 6];
        reader.read_exact(&mut magic).map_err(map_io)?;
        if magic != EDIT_MAGIC {
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
        Self::from_decompressed(&data, font)
    }

    fn from_decompressed(data: &[u8], font: &Font) -> Result<Self> {
        let bytes = Bytes::new(data);
        let font_id = bytes.read_u64(0).ok_or(Error::PrematureEnd)?;
        if font_id != font.header().font_id() {
            return Err(Error::EditDataIdMismatch);
        }
        let mut pos = 8usize;
        let mut edit = Self { font_id, ..Default::default() };

        let num_categories = bytes.read_u8(pos).ok_or(Error::PrematureEnd)?;
        pos += 1;
        let mut names = Vec::with_capacity(num_categories as usize);
        for _ in 0..num_categories {
            names.push(read_name(&bytes, &mut pos, "categories")?);
        }
        let mut total_size = 0u32;
        for name in names {
            let size = bytes.read_u16(pos).ok_or(Error::PrematureEnd)?;
            pos += 2;
            total_size += size as u32;
            edit.categories.push(GlyphCategory { name, size });
        }
        if num_categories > 0 && total_size != font.metrics().num_glyphs() as u32 {
            return Err(Error::InvalidSection("categories"));
        }

        let num_classes = bytes.read_u16(pos).ok_or(Error::PrematureEnd)?;
        pos += 2;
        let mut names = Vec::with_capacity(num_classes as usize);
        for _ in 0..num_classes {
            names.push(read_name(&bytes, &mut pos, "kerning classes")?);
        }
        for name in names {
            let value = bytes.read_i8(pos).ok_or(Error::PrematureEnd)?;
            pos += 1;
            edit.kerning_classes.push(KerningClass { name, value });
        }

        edit.horz_class_pairs = read_class_pairs(&bytes, &mut pos, num_classes)?;
        edit.vert_class_pairs = read_class_pairs(&bytes, &mut pos, num_classes)?;

        let num_condition_names = bytes.read_u8(pos).ok_or(Error::PrematureEnd)?;
        pos += 1;
        if num_condition_names != 0
            && num_condition_names != font.rewrites().num_conditions()
        {
            return Err(Error::InvalidSection("rewrite condition names"));
        }
        for _ in 0..num_condition_names {
            edit.condition_names
                .push(read_name(&bytes, &mut pos, "rewrite condition names")?);
        }

        if pos != data.len() {
            return Err(Error::InvalidSection("trailing data"));
        }
        Ok(edit)
    }

    /// Writes the sidecar file form: magic plus the gzipped payload.
    pub fn export<W: Write>(&self, mut writer: W) -> Result<()> {
        let mut data = Vec::new();
        raw::push_u64(&mut data, self.font_id);

        data.push(self.categories.len() as u8);
        for category in &self.categories {
            raw::push_short_str(&mut data, &category.name);
        }
        for category in &self.categories {
            raw::push_u16(&mut data, category.size);
        }

        raw::push_u16(&mut data, self.kerning_classes.len() as u16);
        for class in &self.kerning_classes {
            raw::push_short_str(&mut data, &class.name);
        }
        for class in &self.kerning_classes {
            data.push(class.value as u8);
        }

        for pairs in [&self.horz_class_pairs, &self.vert_class_pairs] {
            raw::push_u32(&mut data, pairs.len() as u32);
            for pair in pairs {
                raw::push_u16(&mut data, pair.first);
                raw::push_u16(&mut data, pair.second);
                raw::push_u16(&mut data, pair.class);
            }
        }

        data.push(self.condition_names.len() as u8);
        for name in &self.condition_names {
            raw::push_short_str(&mut data, name);
        }

        writer.write_all(&EDIT_MAGIC).map_err(|_| Error::InvalidPayload)?;
        let mut encoder = GzEncoder::new(writer, Compression::default());
        encoder.write_all(&data).map_err(|_| Error::InvalidPayload)?;
        encoder.finish().map_err(|_| Error::InvalidPayload)?;
        Ok(())
    }
}

fn read_name(bytes: &Bytes, pos: &mut usize, section: &'static str) -> Result<String> {
    let len = bytes.read_u8(*pos).ok_or(Error::PrematureEnd)? as usize;
    let raw = bytes.slice(*pos + 1, len).ok_or(Error::PrematureEnd)?;
    let name = core::str::from_utf8(raw).map_err(|_| Error::InvalidSection(section))?;
    if !is_valid_name(name) {
        return Err(Error::InvalidSection(section));
    }
    *pos += 1 + len;
    Ok(name.to_string())
}

fn read_class_pairs(
    bytes: &Bytes,
    pos: &mut usize,
    num_classes: u16,
) -> Result<Vec<ClassKerningPair>> {
    let num = bytes.read_u32(*pos).ok_or(Error::PrematureEnd)?;
    *pos += 4;
    let mut pairs = Vec::with_capacity(num.min(1024) as usize);
    for _ in 0..num {
        let first = bytes.read_u16(*pos).ok_or(Error::PrematureEnd)?;
        let second = bytes.read_u16(*pos + 2).ok_or(Error::PrematureEnd)?;
        let class = bytes.read_u16(*pos + 4).ok_or(Error::PrematureEnd)?;
        *pos += 6;
        // classes are one-indexed; zero means "own value" and can't be
        // stored as a classed pair
        if class == 0 || class > num_classes {
            return Err(Error::InvalidSection("classed kerning pairs"));
        }
        pairs.push(ClassKerningPair { first, second, class });
    }
    Ok(pairs)
}

fn map_io(err: std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::PrematureEnd
    } else {
        Error::InvalidPayload
    }
}
