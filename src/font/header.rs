//! Header section: identity, versioning, dates and description strings.

use crate::error::{Error, Result};
use crate::font::{Font, SectionOffsets};
use crate::raw::{is_valid_spaced_name, Bytes, FontDate};
use crate::FORMAT_VERSION;

/// View over the font header.
#[derive(Clone, Copy)]
pub struct FontHeader<'a> {
    font: &'a Font,
}

impl<'a> FontHeader<'a> {
    pub(crate) fn new(font: &'a Font) -> Self {
        Self { font }
    }

    pub fn format_version(&self) -> u32 {
        read_or_zero_u32(self.font, 0)
    }

    pub fn font_id(&self) -> u64 {
        self.font.bytes().read_u64(4).unwrap_or(0)
    }

    pub fn version_major(&self) -> u16 {
        read_or_zero_u16(self.font, 12)
    }

    pub fn version_minor(&self) -> u16 {
        read_or_zero_u16(self.font, 14)
    }

    /// Date of the first version of the font.
    pub fn first_version_date(&self) -> FontDate {
        date_at(self.font, 16)
    }

    /// Date of the last major version raise.
    pub fn major_version_date(&self) -> FontDate {
        date_at(self.font, 20)
    }

    /// Date of the last minor version raise.
    pub fn minor_version_date(&self) -> FontDate {
        date_at(self.font, 24)
    }

    pub fn name(&self) -> &'a str {
        short_str_at(self.font, self.font.offsets().name)
    }

    pub fn family(&self) -> &'a str {
        short_str_at(self.font, self.font.offsets().family)
    }

    pub fn author(&self) -> &'a str {
        short_str_at(self.font, self.font.offsets().author)
    }

    pub fn about(&self) -> &'a str {
        let offset = self.font.offsets().about;
        let bytes = self.font.bytes();
        let len = bytes.read_u16(offset).unwrap_or(0) as usize;
        bytes
            .slice(offset + 2, len)
            .and_then(|raw| core::str::from_utf8(raw).ok())
            .unwrap_or_default()
    }
}

fn read_or_zero_u16(font: &Font, offset: usize) -> u16 {
    font.bytes().read_u16(offset).unwrap_or(0)
}

fn read_or_zero_u32(font: &Font, offset: usize) -> u32 {
    font.bytes().read_u32(offset).unwrap_or(0)
}

fn date_at(font: &Font, offset: usize) -> FontDate {
    FontDate::parse(&font.bytes(), offset).unwrap_or_default()
}

fn short_str_at(font: &Font, offset: usize) -> &str {
    let bytes = font.bytes();
    let len = bytes.read_u8(offset).unwrap_or(0) as usize;
    bytes
        .slice(offset + 1, len)
        .and_then(|raw| core::str::from_utf8(raw).ok())
        .unwrap_or_default()
}

/// Validates the header and records the string offsets. Returns the offset
/// right after the header, where the metrics section starts.
pub(crate) fn validate(bytes: &Bytes, offsets: &mut SectionOffsets) -> Result<usize> {
    let version = bytes.read_u32(0).ok_or(Error::PrematureEnd)?;
    if version != FORMAT_VERSION {
        return Err(Error::InvalidSection("format version"));
    }
    bytes.read_u64(4).ok_or(Error::PrematureEnd)?;
    bytes.read_u16(12).ok_or(Error::PrematureEnd)?;
    bytes.read_u16(14).ok_or(Error::PrematureEnd)?;
    for date_offset in [16, 20, 24] {
        let date = FontDate::parse(bytes, date_offset).ok_or(Error::PrematureEnd)?;
        if !date.is_valid() {
            return Err(Error::InvalidSection("header date"));
        }
    }
    let mut pos = 28;

    offsets.name = pos;
    let name = validate_short_str(bytes, &mut pos)?;
    if name.is_empty() || !is_valid_spaced_name(name) {
        return Err(Error::InvalidSection("font name"));
    }
    offsets.family = pos;
    validate_short_str(bytes, &mut pos)?;
    offsets.author = pos;
    validate_short_str(bytes, &mut pos)?;

    offsets.about = pos;
    let about_len = bytes.read_u16(pos).ok_or(Error::PrematureEnd)? as usize;
    let about = bytes.slice(pos + 2, about_len).ok_or(Error::PrematureEnd)?;
    if core::str::from_utf8(about).is_err() {
        return Err(Error::InvalidSection("font about"));
    }
    pos += 2 + about_len;
    Ok(pos)
}

fn validate_short_str<'a>(bytes: &Bytes<'a>, pos: &mut usize) -> Result<&'a str> {
    let len = bytes.read_u8(*pos).ok_or(Error::PrematureEnd)? as usize;
    let raw = bytes.slice(*pos + 1, len).ok_or(Error::PrematureEnd)?;
    let value =
        core::str::from_utf8(raw).map_err(|_| Error::InvalidSection("header string"))?;
    *pos += 1 + len;
    Ok(value)
}
