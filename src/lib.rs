//! Compact bitmap font container for indie 2D games.
//!
//! A `.ggfnt` file is six magic bytes plus a gzip stream; the decompressed
//! payload is used directly as the render-time representation. Glyph
//! lookup, kerning lookup and rewrite evaluation all proceed by binary
//! searches and offset arithmetic over one immutable byte blob, with no
//! separate object graph to rebuild.
//!
//! The main types:
//!
//! * [`Font`] — the parsed, immutable container, shareable across threads.
//! * [`FontBuilder`] — mutable editing state producing a [`Font`].
//! * [`SettingsCache`] / [`MappingCache`] — cheap per-reader state for
//!   resolving code points through setting-dependent mapping switches.
//! * [`GlyphTester`] / [`Utf8Tester`] — streaming greedy longest-match
//!   runners for the font's rewrite rules.
//! * [`mask`] — the raster-op codec for 8-bit glyph masks.
//!
//! ```no_run
//! # fn main() -> ggfnt::Result<()> {
//! let file = std::fs::File::open("font.ggfnt").unwrap();
//! let font = ggfnt::Font::parse(std::io::BufReader::new(file))?;
//! let mut settings = ggfnt::SettingsCache::new(&font);
//! if let Some(entry) = font.mapping().lookup('A' as i32) {
//!     let glyph = entry.resolve(&font, &mut settings)?.first();
//!     let mask = font.glyphs().decode_mask(glyph)?;
//!     drop(mask);
//! }
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all, clippy::if_not_else)]

pub mod builder;
pub mod cache;
pub mod condition;
pub mod editor;
mod error;
pub mod font;
pub mod mask;
mod raw;
pub mod rewrite;

pub use builder::{FontBuilder, GlyphRef};
pub use cache::mapping::MappingCache;
pub use cache::settings::SettingsCache;
pub use editor::FontEditData;
pub use error::{Error, Result};
pub use font::mapping::{GlyphMappingGroup, GroupFlags};
pub use font::Font;
pub use mask::{AlphaMask, MaskRect};
pub use raw::{is_valid_name, is_valid_spaced_name, FontDate};
pub use rewrite::rule::{GlyphRewriteRule, RulePattern, Utf8RewriteRule};
pub use rewrite::tester::{GlyphTester, Utf8Tester};

/// Magic signature of `.ggfnt` font files.
pub const FONT_MAGIC: [u8; 6] = *b"tggfnt";
/// Magic signature of `.ggwkfnt` editor sidecar files.
pub const EDIT_MAGIC: [u8; 6] = *b"wkgfnt";

/// Current format version of the binary layout.
pub const FORMAT_VERSION: u32 = 0x0000_0001;

/// Maximum size of the decompressed font blob (32 MiB).
pub const MAX_FONT_DATA_SIZE: usize = 1 << 25;

/// Maximum number of graphical glyphs in a font.
pub const MAX_GLYPHS: u16 = 56789;

/// Reserved glyph index standing in for unmapped code points.
pub const GLYPH_MISSING: u16 = 56789;
/// Reserved glyph index that rewrite output silently drops.
pub const GLYPH_ZILCH: u16 = 56790;
/// Reserved glyph index for line breaks.
pub const GLYPH_NEWLINE: u16 = 56791;

/// Glyph index range reserved for font-defined custom glyphs.
pub const FONT_CUSTOM_GLYPHS: std::ops::Range<u16> = 56900..57000;
/// Glyph index range reserved for renderer-defined custom glyphs.
pub const RENDERER_CUSTOM_GLYPHS: std::ops::Range<u16> = 57000..58000;
/// Glyph index range reserved for application-defined custom glyphs.
pub const APP_CUSTOM_GLYPHS: std::ops::Range<u16> = 58000..60000;
/// Glyph index range reserved for runtime-added custom glyphs (inclusive
/// of 62000).
pub const RUNTIME_CUSTOM_GLYPHS: std::ops::RangeInclusive<u16> = 60000..=62000;

/// Whether `index` is a valid glyph index for a font with `num_glyphs`
/// graphical glyphs: either graphical, one of the special control glyphs,
/// or inside a reserved custom range.
pub fn is_valid_glyph_index(num_glyphs: u16, index: u16) -> bool {
    index < num_glyphs
        || matches!(index, GLYPH_MISSING | GLYPH_ZILCH | GLYPH_NEWLINE)
        || FONT_CUSTOM_GLYPHS.contains(&index)
        || RENDERER_CUSTOM_GLYPHS.contains(&index)
        || APP_CUSTOM_GLYPHS.contains(&index)
        || RUNTIME_CUSTOM_GLYPHS.contains(&index)
}

/// Crude two-bit-pattern balance score used to reject low-variance font
/// ids. Counts each 2-bit pattern over the 32 disjoint bit pairs of `id`;
/// a perfectly balanced id scores 1.0.
pub fn lazy_entropy(id: u64) -> f64 {
    let mut pattern_counts = [0i32; 4];
    let mut value = id;
    for _ in 0..32 {
        pattern_counts[(value & 0b11) as usize] += 1;
        value >>= 2;
    }
    let dist: i32 = pattern_counts.iter().map(|count| (count - 8).abs()).sum();
    1.0 - (dist as f64) / 48.0
}

/// Minimum lazy entropy accepted for generated font ids.
pub const MIN_FONT_ID_ENTROPY: f64 = 0.26;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entropy_extremes() {
        // all pairs identical: dist = 24 + 8 + 8 + 8
        assert_eq!(lazy_entropy(0), 0.0);
        assert_eq!(lazy_entropy(u64::MAX), 0.0);
        // perfectly balanced: eight of each pattern
        let balanced = 0b_00_01_10_11_00_01_10_11_00_01_10_11_00_01_10_11_00_01_10_11_00_01_10_11_00_01_10_11_00_01_10_11u64;
        assert_eq!(lazy_entropy(balanced), 1.0);
        assert!(lazy_entropy(0) < MIN_FONT_ID_ENTROPY);
    }

    #[test]
    fn glyph_index_validity() {
        assert!(is_valid_glyph_index(3, 0));
        assert!(!is_valid_glyph_index(3, 3));
        assert!(is_valid_glyph_index(3, GLYPH_MISSING));
        assert!(is_valid_glyph_index(3, GLYPH_NEWLINE));
        assert!(!is_valid_glyph_index(3, 56792));
        assert!(is_valid_glyph_index(3, 56900));
        assert!(is_valid_glyph_index(3, 62000));
        assert!(!is_valid_glyph_index(3, 62001));
    }
}
