//! Mutable font-building state.
//!
//! During editing, glyphs are addressed by 64-bit random UIDs so inserts
//! and deletions never renumber anything. [`FontBuilder::build`]
//! materialises the UIDs into dense `u16` indices and serialises every
//! section into the immutable blob form; UIDs are never persisted. No
//! builder state outlives the build unless the builder is kept around for
//! further edits.

mod words;

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::condition;
use crate::error::{Error, Result};
use crate::font::glyphs::GlyphPlacement;
use crate::font::mapping::GroupFlags;
use crate::font::metrics::METRICS_SIZE;
use crate::font::Font;
use crate::mask::{self, AlphaMask, MaskRect};
use crate::raw::{self, FontDate};
use crate::rewrite::rule::{
    rule_condition, rule_out_len, rule_output, GlyphRewriteRule, RuleBlock,
    RulePattern, RuleScanner, Utf8RewriteRule,
};
use crate::{
    is_valid_glyph_index, lazy_entropy, FORMAT_VERSION, MAX_FONT_DATA_SIZE, MAX_GLYPHS,
    MIN_FONT_ID_ENTROPY,
};

/// How builder-side APIs address glyphs: by edit-time UID for glyphs
/// owned by the builder, or directly by index for the reserved control
/// and custom ranges.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GlyphRef {
    Uid(u64),
    Index(u16),
}

struct GlyphData {
    name: Option<String>,
    placement: GlyphPlacement,
    mask_ops: Vec<u8>,
    mask_rect: MaskRect,
}

struct ColorSectionData {
    name: String,
    /// Alphas for dyes, RGBA quads for palettes.
    payload: Vec<u8>,
    size: u8,
}

struct SettingData {
    name: String,
    options: Vec<String>,
}

enum MappingData {
    Direct(u64),
    Group(Vec<u64>, GroupFlags),
    Switched { switch: u8, cases: Vec<(Vec<u64>, GroupFlags)> },
}

struct Utf8SetData {
    ranges: Vec<(u32, u32)>,
    singles: Vec<u32>,
}

struct GlyphRuleData {
    condition: u8,
    head: Vec<RulePattern<GlyphRef>>,
    body: Vec<RulePattern<GlyphRef>>,
    tail: Vec<RulePattern<GlyphRef>>,
    output: Vec<GlyphRef>,
}

struct Utf8RuleData {
    condition: u8,
    head: Vec<RulePattern<char>>,
    body: Vec<RulePattern<char>>,
    tail: Vec<RulePattern<char>>,
    output: Vec<char>,
}

/// Builds `.ggfnt` fonts field by field.
pub struct FontBuilder {
    font_id: u64,
    version_major: u16,
    version_minor: u16,
    first_date: FontDate,
    major_date: FontDate,
    minor_date: FontDate,
    name: String,
    family: String,
    author: String,
    about: String,

    has_vert_layout: bool,
    mono_width: u8,
    ascent: u8,
    extra_ascent: u8,
    descent: u8,
    extra_descent: u8,
    uppercase_ascent: u8,
    midline_ascent: u8,
    horz_interspacing: u8,
    vert_interspacing: u8,
    line_gap: u8,
    vert_line_width: u8,

    glyph_order: Vec<u64>,
    glyphs: FxHashMap<u64, GlyphData>,
    dyes: Vec<ColorSectionData>,
    palettes: Vec<ColorSectionData>,
    settings: Vec<SettingData>,
    switches: Vec<Vec<u8>>,
    mappings: BTreeMap<i32, MappingData>,
    conditions: Vec<Vec<u8>>,
    utf8_sets: Vec<Utf8SetData>,
    glyph_sets: Vec<Vec<u64>>,
    glyph_rules: Vec<GlyphRuleData>,
    utf8_rules: Vec<Utf8RuleData>,
    horz_kernings: BTreeMap<(u64, u64), i8>,
    vert_kernings: BTreeMap<(u64, u64), i8>,
}

impl FontBuilder {
    /// Creates an empty builder with a freshly rolled font id and a
    /// single full-alpha "main" dye.
    pub fn new() -> Result<Self> {
        Ok(Self {
            font_id: generate_font_id()?,
            version_major: 0,
            version_minor: 1,
            first_date: FontDate::default(),
            major_date: FontDate::default(),
            minor_date: FontDate::default(),
            name: "unnamed".to_string(),
            family: String::new(),
            author: String::new(),
            about: String::new(),
            has_vert_layout: false,
            mono_width: 0,
            ascent: 0,
            extra_ascent: 0,
            descent: 0,
            extra_descent: 0,
            uppercase_ascent: 0,
            midline_ascent: 0,
            horz_interspacing: 0,
            vert_interspacing: 0,
            line_gap: 0,
            vert_line_width: 0,
            glyph_order: Vec::new(),
            glyphs: FxHashMap::default(),
            dyes: vec![ColorSectionData {
                name: "main".to_string(),
                payload: vec![255],
                size: 1,
            }],
            palettes: Vec::new(),
            settings: Vec::new(),
            switches: Vec::new(),
            mappings: BTreeMap::new(),
            conditions: Vec::new(),
            utf8_sets: Vec::new(),
            glyph_sets: Vec::new(),
            glyph_rules: Vec::new(),
            utf8_rules: Vec::new(),
            horz_kernings: BTreeMap::new(),
            vert_kernings: BTreeMap::new(),
        })
    }

    /// Reconstructs editing state from a parsed font, so an existing font
    /// can be modified and rebuilt. Glyphs get fresh UIDs; their
    /// build-index order is preserved (see [`Self::glyph_uids`]).
    pub fn from_font(font: &Font) -> Result<Self> {
        let header = font.header();
        let metrics = font.metrics();
        let mut builder = Self::new()?;
        builder.font_id = header.font_id();
        builder.version_major = header.version_major();
        builder.version_minor = header.version_minor();
        builder.first_date = header.first_version_date();
        builder.major_date = header.major_version_date();
        builder.minor_date = header.minor_version_date();
        builder.name = header.name().to_string();
        builder.family = header.family().to_string();
        builder.author = header.author().to_string();
        builder.about = header.about().to_string();

        builder.has_vert_layout = metrics.has_vert_layout();
        builder.mono_width = metrics.mono_width();
        builder.ascent = metrics.ascent();
        builder.extra_ascent = metrics.extra_ascent();
        builder.descent = metrics.descent();
        builder.extra_descent = metrics.extra_descent();
        builder.uppercase_ascent = metrics.uppercase_ascent();
        builder.midline_ascent = metrics.midline_ascent();
        builder.horz_interspacing = metrics.horz_interspacing();
        builder.vert_interspacing = metrics.vert_interspacing();
        builder.line_gap = metrics.line_gap();
        builder.vert_line_width = metrics.vert_line_width();

        let glyphs = font.glyphs();
        for index in 0..metrics.num_glyphs() {
            let ops = glyphs.mask_ops(index).ok_or(Error::GlyphNotFound)?;
            let uid = builder.generate_glyph_uid()?;
            builder.glyph_order.push(uid);
            builder.glyphs.insert(
                uid,
                GlyphData {
                    name: None,
                    placement: glyphs.placement(index).ok_or(Error::GlyphNotFound)?,
                    mask_ops: ops.to_vec(),
                    mask_rect: mask::decode_bounds(ops)?,
                },
            );
        }
        let uids_by_index = builder.glyph_order.clone();
        let uid_of = move |index: u16| -> Result<u64> {
            uids_by_index
                .get(index as usize)
                .copied()
                .ok_or(Error::GlyphNotFound)
        };
        for (index, name) in glyphs.named_glyphs() {
            let uid = uid_of(index)?;
            let glyph = builder.glyphs.get_mut(&uid).ok_or(Error::GlyphNotFound)?;
            glyph.name = Some(name.to_string());
        }

        let color = font.color();
        builder.dyes.clear();
        for section in 0..color.num_sections() {
            let name = color
                .section_name(section)
                .ok_or(Error::InvalidSection("color sections"))?
                .to_string();
            let (start, end) = color
                .section_range(section)
                .ok_or(Error::InvalidSection("color sections"))?;
            let size = end - start + 1;
            let payload = if color.section_is_dye(section) {
                color.dye_alphas(section)
            } else {
                color.palette_rgba(section)
            }
            .ok_or(Error::InvalidSection("color sections"))?
            .to_vec();
            let section_data = ColorSectionData { name, payload, size };
            if color.section_is_dye(section) {
                builder.dyes.push(section_data);
            } else {
                builder.palettes.push(section_data);
            }
        }

        let settings = font.settings();
        for setting in 0..settings.num_settings() {
            let name = settings
                .setting_name(setting)
                .ok_or(Error::InvalidSection("settings"))?
                .to_string();
            let num_options =
                settings.num_options(setting).ok_or(Error::InvalidSection("settings"))?;
            let options = (0..num_options)
                .map(|option| {
                    settings
                        .option_label(setting, option)
                        .map(str::to_string)
                        .ok_or(Error::InvalidSection("settings"))
                })
                .collect::<Result<_>>()?;
            builder.settings.push(SettingData { name, options });
        }

        let mapping = font.mapping();
        for switch in 0..mapping.num_switches() {
            let settings_list = mapping
                .switch_settings(switch)
                .ok_or(Error::InvalidSection("mapping switches"))?;
            builder.switches.push(settings_list.to_vec());
        }
        for entry in mapping.iter() {
            let code_point = entry.code_point();
            let read_group = |case: u8| -> Result<(Vec<u64>, GroupFlags)> {
                let group =
                    entry.group(case).ok_or(Error::InvalidSection("mapping"))?;
                let uids = group
                    .iter()
                    .map(|index| uid_of(index))
                    .collect::<Result<Vec<u64>>>()?;
                Ok((uids, group.flags()))
            };
            let data = match entry.switch_type() {
                0xFF => MappingData::Direct(read_group(0)?.0[0]),
                0xFE => {
                    let (uids, flags) = read_group(0)?;
                    MappingData::Group(uids, flags)
                }
                switch => {
                    let cases = (0..entry.num_cases() as u8)
                        .map(read_group)
                        .collect::<Result<Vec<_>>>()?;
                    MappingData::Switched { switch, cases }
                }
            };
            builder.mappings.insert(code_point, data);
        }

        let rewrites = font.rewrites();
        for nth in 0..rewrites.num_conditions() {
            let data = rewrites
                .condition_data(nth)
                .ok_or(Error::InvalidCondition)?;
            builder.conditions.push(data.to_vec());
        }
        for nth in 0..rewrites.num_utf8_sets() {
            let set = rewrites.utf8_set(nth).ok_or(Error::InvalidRewriteRule)?;
            let ranges = (0..set.num_ranges())
                .filter_map(|range| set.range(range))
                .collect();
            let singles = (0..set.num_singles())
                .filter_map(|single| set.single(single))
                .collect();
            builder.utf8_sets.push(Utf8SetData { ranges, singles });
        }
        for nth in 0..rewrites.num_glyph_sets() {
            let set = rewrites.glyph_set(nth).ok_or(Error::InvalidRewriteRule)?;
            let mut uids = Vec::new();
            for range in 0..set.num_ranges() {
                let (first, last) =
                    set.range(range).ok_or(Error::InvalidRewriteRule)?;
                for index in first..=last {
                    uids.push(uid_of(index)?);
                }
            }
            for single in 0..set.num_singles() {
                let index = set.single(single).ok_or(Error::InvalidRewriteRule)?;
                uids.push(uid_of(index)?);
            }
            builder.glyph_sets.push(uids);
        }
        for nth in 0..rewrites.num_glyph_rules() {
            let data = rewrites
                .glyph_rule_data(nth)
                .ok_or(Error::InvalidRewriteRule)?;
            builder.glyph_rules.push(read_glyph_rule(data, &uid_of)?);
        }
        for nth in 0..rewrites.num_utf8_rules() {
            let data = rewrites
                .utf8_rule_data(nth)
                .ok_or(Error::InvalidRewriteRule)?;
            builder.utf8_rules.push(read_utf8_rule(data)?);
        }

        let kerning = font.kerning();
        for nth in 0..kerning.num_horz_pairs() {
            let (prev, curr, value) =
                kerning.horz_pair_at(nth).ok_or(Error::InvalidSection("kernings"))?;
            builder.horz_kernings.insert((uid_of(prev)?, uid_of(curr)?), value);
        }
        for nth in 0..kerning.num_vert_pairs() {
            let (prev, curr, value) =
                kerning.vert_pair_at(nth).ok_or(Error::InvalidSection("kernings"))?;
            builder.vert_kernings.insert((uid_of(prev)?, uid_of(curr)?), value);
        }
        Ok(builder)
    }

    pub fn font_id(&self) -> u64 {
        self.font_id
    }

    pub fn version(&self) -> (u16, u16) {
        (self.version_major, self.version_minor)
    }

    pub fn raise_minor_version(&mut self) {
        self.version_minor += 1;
    }

    pub fn raise_major_version(&mut self) {
        self.version_major += 1;
        self.version_minor = 0;
    }

    pub fn set_name(&mut self, name: &str) -> Result<()> {
        if !raw::is_valid_spaced_name(name) {
            return Err(Error::InvalidArgument("font name"));
        }
        self.name = name.to_string();
        Ok(())
    }

    pub fn set_family(&mut self, family: &str) -> Result<()> {
        if family.len() > 255 {
            return Err(Error::InvalidArgument("font family"));
        }
        self.family = family.to_string();
        Ok(())
    }

    pub fn set_author(&mut self, author: &str) -> Result<()> {
        if author.len() > 255 {
            return Err(Error::InvalidArgument("font author"));
        }
        self.author = author.to_string();
        Ok(())
    }

    pub fn set_about(&mut self, about: &str) -> Result<()> {
        if about.len() > 65535 {
            return Err(Error::InvalidArgument("font about"));
        }
        self.about = about.to_string();
        Ok(())
    }

    pub fn set_first_version_date(&mut self, date: FontDate) -> Result<()> {
        if !date.is_valid() {
            return Err(Error::InvalidArgument("date"));
        }
        self.first_date = date;
        Ok(())
    }

    pub fn set_major_version_date(&mut self, date: FontDate) -> Result<()> {
        if !date.is_valid() {
            return Err(Error::InvalidArgument("date"));
        }
        self.major_date = date;
        Ok(())
    }

    pub fn set_minor_version_date(&mut self, date: FontDate) -> Result<()> {
        if !date.is_valid() {
            return Err(Error::InvalidArgument("date"));
        }
        self.minor_date = date;
        Ok(())
    }

    pub fn set_vert_layout(&mut self, enabled: bool) {
        self.has_vert_layout = enabled;
    }

    pub fn set_mono_width(&mut self, width: u8) {
        self.mono_width = width;
    }

    pub fn set_ascent(&mut self, ascent: u8, extra: u8) {
        self.ascent = ascent;
        self.extra_ascent = extra;
    }

    pub fn set_descent(&mut self, descent: u8, extra: u8) {
        self.descent = descent;
        self.extra_descent = extra;
    }

    pub fn set_uppercase_ascent(&mut self, ascent: u8) {
        self.uppercase_ascent = ascent;
    }

    pub fn set_midline_ascent(&mut self, ascent: u8) {
        self.midline_ascent = ascent;
    }

    pub fn set_interspacing(&mut self, horz: u8, vert: u8) {
        self.horz_interspacing = horz;
        self.vert_interspacing = vert;
    }

    pub fn set_line_gap(&mut self, gap: u8) {
        self.line_gap = gap;
    }

    pub fn set_vert_line_width(&mut self, width: u8) {
        self.vert_line_width = width;
    }

    pub fn num_glyphs(&self) -> u16 {
        self.glyph_order.len() as u16
    }

    /// Adds a glyph mask and returns its edit-time UID. The default
    /// placement advance is the mask width, or the mono width for
    /// monospaced fonts.
    pub fn add_glyph(&mut self, glyph_mask: &AlphaMask) -> Result<u64> {
        if self.glyph_order.len() >= MAX_GLYPHS as usize {
            return Err(Error::LimitExceeded("glyphs"));
        }
        let rect = glyph_mask.tight_bounds();
        self.check_mask_fits(rect)?;
        let mut mask_ops = Vec::new();
        mask::encode(glyph_mask, &mut mask_ops);
        let advance = if self.mono_width != 0 {
            self.mono_width
        } else {
            rect.width().min(255) as u8
        };
        let uid = self.generate_glyph_uid()?;
        self.glyph_order.push(uid);
        self.glyphs.insert(
            uid,
            GlyphData {
                name: None,
                placement: GlyphPlacement { advance, ..Default::default() },
                mask_ops,
                mask_rect: rect,
            },
        );
        Ok(uid)
    }

    fn check_mask_fits(&self, rect: MaskRect) -> Result<()> {
        if rect.is_empty() {
            return Ok(());
        }
        if -rect.min_y > self.ascent as i32 + self.extra_ascent as i32 {
            return Err(Error::GlyphExceedsAscent);
        }
        if rect.max_y > self.descent as i32 + self.extra_descent as i32 {
            return Err(Error::GlyphExceedsDescent);
        }
        Ok(())
    }

    fn generate_glyph_uid(&self) -> Result<u64> {
        loop {
            let uid = random_u64()?;
            if !self.glyphs.contains_key(&uid) {
                return Ok(uid);
            }
        }
    }

    /// Removes a glyph. Glyphs still referenced by mappings, sets, rules
    /// or kerning pairs must be unhooked first.
    pub fn remove_glyph(&mut self, uid: u64) -> Result<()> {
        if !self.glyphs.contains_key(&uid) {
            return Err(Error::GlyphNotFound);
        }
        if self.glyph_referenced(uid) {
            return Err(Error::InvalidArgument("glyph still referenced"));
        }
        self.glyphs.remove(&uid);
        self.glyph_order.retain(|&other| other != uid);
        Ok(())
    }

    fn glyph_referenced(&self, uid: u64) -> bool {
        let in_patterns = |patterns: &[RulePattern<GlyphRef>]| {
            patterns.iter().any(|pattern| {
                matches!(pattern, RulePattern::Literal(GlyphRef::Uid(other)) if *other == uid)
            })
        };
        self.mappings.values().any(|mapping| match mapping {
            MappingData::Direct(other) => *other == uid,
            MappingData::Group(uids, _) => uids.contains(&uid),
            MappingData::Switched { cases, .. } => {
                cases.iter().any(|(uids, _)| uids.contains(&uid))
            }
        }) || self.glyph_sets.iter().any(|set| set.contains(&uid))
            || self.glyph_rules.iter().any(|rule| {
                in_patterns(&rule.head)
                    || in_patterns(&rule.body)
                    || in_patterns(&rule.tail)
                    || rule
                        .output
                        .iter()
                        .any(|glyph| matches!(glyph, GlyphRef::Uid(other) if *other == uid))
            })
            || self
                .horz_kernings
                .keys()
                .chain(self.vert_kernings.keys())
                .any(|&(prev, curr)| prev == uid || curr == uid)
    }

    /// Removes the mapping of a code point.
    pub fn unmap(&mut self, code_point: char) -> Result<()> {
        self.mappings
            .remove(&(code_point as i32))
            .map(|_| ())
            .ok_or(Error::InvalidArgument("code point not mapped"))
    }

    /// Edit-time UIDs in build-index order.
    pub fn glyph_uids(&self) -> &[u64] {
        &self.glyph_order
    }

    pub fn set_glyph_name(&mut self, uid: u64, name: &str) -> Result<()> {
        if !raw::is_valid_name(name) {
            return Err(Error::InvalidArgument("glyph name"));
        }
        if self
            .glyphs
            .iter()
            .any(|(&other, data)| other != uid && data.name.as_deref() == Some(name))
        {
            return Err(Error::DuplicatedGlyphName);
        }
        let glyph = self.glyphs.get_mut(&uid).ok_or(Error::GlyphNotFound)?;
        glyph.name = Some(name.to_string());
        Ok(())
    }

    pub fn set_glyph_placement(&mut self, uid: u64, placement: GlyphPlacement) -> Result<()> {
        if self.mono_width != 0 && placement.advance != self.mono_width {
            return Err(Error::MonoWidthViolated);
        }
        let glyph = self.glyphs.get_mut(&uid).ok_or(Error::GlyphNotFound)?;
        glyph.placement = placement;
        Ok(())
    }

    pub fn add_dye(&mut self, name: &str, alphas: &[u8]) -> Result<u8> {
        self.add_color_section(name, alphas.to_vec(), alphas.len(), true)
    }

    pub fn add_palette(&mut self, name: &str, colors: &[[u8; 4]]) -> Result<u8> {
        let payload: Vec<u8> = colors.iter().flatten().copied().collect();
        self.add_color_section(name, payload, colors.len(), false)
    }

    fn add_color_section(
        &mut self,
        name: &str,
        payload: Vec<u8>,
        size: usize,
        is_dye: bool,
    ) -> Result<u8> {
        if !raw::is_valid_name(name) {
            return Err(Error::InvalidArgument("color section name"));
        }
        if size == 0 || size > 255 {
            return Err(Error::InvalidArgument("color section size"));
        }
        let sections = self.dyes.iter().chain(self.palettes.iter());
        let mut used = size;
        for section in sections {
            if section.name == name {
                return Err(Error::InvalidArgument("color section name"));
            }
            used += section.size as usize;
        }
        // index zero stays reserved for the background
        if used > 255 {
            return Err(Error::LimitExceeded("color sections"));
        }
        if self.dyes.len() + self.palettes.len() >= 255 {
            return Err(Error::LimitExceeded("color sections"));
        }
        let section = ColorSectionData { name: name.to_string(), payload, size: size as u8 };
        if is_dye {
            self.dyes.push(section);
            Ok(self.dyes.len() as u8 - 1)
        } else {
            self.palettes.push(section);
            Ok((self.dyes.len() + self.palettes.len()) as u8 - 1)
        }
    }

    pub fn add_setting(&mut self, name: &str, options: &[&str]) -> Result<u8> {
        if self.settings.len() >= 255 {
            return Err(Error::LimitExceeded("settings"));
        }
        if !raw::is_valid_name(name)
            || self.settings.iter().any(|setting| setting.name == name)
        {
            return Err(Error::InvalidArgument("setting name"));
        }
        if !(2..=255).contains(&options.len()) {
            return Err(Error::InvalidArgument("setting options"));
        }
        for (nth, option) in options.iter().enumerate() {
            if option.is_empty()
                || option.len() > 32
                || options[..nth].contains(option)
            {
                return Err(Error::InvalidArgument("setting options"));
            }
        }
        self.settings.push(SettingData {
            name: name.to_string(),
            options: options.iter().map(|option| option.to_string()).collect(),
        });
        Ok(self.settings.len() as u8 - 1)
    }

    pub fn add_mapping_switch(&mut self, settings: &[u8]) -> Result<u8> {
        if self.switches.len() >= 255 {
            return Err(Error::LimitExceeded("mapping switches"));
        }
        if settings.is_empty() || settings.len() > 255 {
            return Err(Error::InvalidArgument("mapping switch"));
        }
        let mut cases = 1u32;
        for (nth, &setting) in settings.iter().enumerate() {
            if setting as usize >= self.settings.len()
                || settings[..nth].contains(&setting)
            {
                return Err(Error::InvalidArgument("mapping switch"));
            }
            cases *= self.settings[setting as usize].options.len() as u32;
            if cases > 255 {
                return Err(Error::LimitExceeded("mapping switch cases"));
            }
        }
        self.switches.push(settings.to_vec());
        Ok(self.switches.len() as u8 - 1)
    }

    fn switch_case_count(&self, switch: u8) -> u32 {
        self.switches[switch as usize]
            .iter()
            .map(|&setting| self.settings[setting as usize].options.len() as u32)
            .product()
    }

    /// Maps a code point to a single glyph.
    pub fn map(&mut self, code_point: char, uid: u64) -> Result<()> {
        self.check_mappable(code_point, &[uid])?;
        self.mappings.insert(code_point as i32, MappingData::Direct(uid));
        Ok(())
    }

    /// Maps a code point to an animation group of 2..=128 glyphs.
    /// Single-glyph mappings go through [`Self::map`] instead.
    pub fn map_group(
        &mut self,
        code_point: char,
        uids: &[u64],
        flags: GroupFlags,
    ) -> Result<()> {
        self.check_mappable(code_point, uids)?;
        check_group(uids, flags, 2)?;
        self.mappings
            .insert(code_point as i32, MappingData::Group(uids.to_vec(), flags));
        Ok(())
    }

    /// Maps a code point through a mapping switch, one group per case.
    pub fn map_switched(
        &mut self,
        code_point: char,
        switch: u8,
        cases: &[(Vec<u64>, GroupFlags)],
    ) -> Result<()> {
        if switch as usize >= self.switches.len() {
            return Err(Error::InvalidArgument("mapping switch"));
        }
        if cases.len() as u32 != self.switch_case_count(switch) {
            return Err(Error::InvalidArgument("mapping switch cases"));
        }
        for (uids, flags) in cases {
            self.check_mappable(code_point, uids)?;
            check_group(uids, *flags, 1)?;
        }
        self.check_mappable(code_point, &[])?;
        self.mappings.insert(
            code_point as i32,
            MappingData::Switched { switch, cases: cases.to_vec() },
        );
        Ok(())
    }

    fn check_mappable(&self, code_point: char, uids: &[u64]) -> Result<()> {
        if (code_point as i32) < 0x20 {
            return Err(Error::CodePointBeforeSpace);
        }
        if self.mappings.contains_key(&(code_point as i32)) {
            return Err(Error::InvalidArgument("code point already mapped"));
        }
        for uid in uids {
            if !self.glyphs.contains_key(uid) {
                return Err(Error::GlyphNotFound);
            }
        }
        Ok(())
    }

    /// Compiles and registers a rewrite condition from its textual form.
    pub fn add_rewrite_condition(&mut self, text: &str) -> Result<u8> {
        if self.conditions.len() >= 255 {
            return Err(Error::LimitExceeded("rewrite conditions"));
        }
        let data = condition::compile(text)?;
        condition::validate_stream(&data, self.settings.len() as u8)
            .map_err(|_| Error::ConditionSyntax("unknown setting"))?;
        self.conditions.push(data);
        Ok(self.conditions.len() as u8 - 1)
    }

    /// Registers a glyph set from edit-time UIDs. Consecutive glyph
    /// indices coalesce into ranges at build time.
    pub fn add_glyph_set(&mut self, uids: &[u64]) -> Result<u8> {
        if self.glyph_sets.len() >= 255 {
            return Err(Error::LimitExceeded("rewrite sets"));
        }
        for uid in uids {
            if !self.glyphs.contains_key(uid) {
                return Err(Error::GlyphNotFound);
            }
        }
        self.glyph_sets.push(uids.to_vec());
        Ok(self.glyph_sets.len() as u8 - 1)
    }

    pub fn add_utf8_set(
        &mut self,
        ranges: &[(char, char)],
        singles: &[char],
    ) -> Result<u8> {
        if self.utf8_sets.len() >= 255 {
            return Err(Error::LimitExceeded("rewrite sets"));
        }
        let mut set = Utf8SetData { ranges: Vec::new(), singles: Vec::new() };
        for &(first, last) in ranges {
            if first > last {
                return Err(Error::InvalidArgument("rewrite set range"));
            }
            // the wire format caps range lengths at 255
            let mut first = first as u32;
            let last = last as u32;
            while last - first + 1 > 255 {
                set.ranges.push((first, first + 254));
                first += 255;
            }
            set.ranges.push((first, last));
        }
        set.ranges.sort_unstable();
        for window in set.ranges.windows(2) {
            if window[1].0 <= window[0].1 {
                return Err(Error::InvalidArgument("rewrite set range"));
            }
        }
        set.singles = singles.iter().map(|&ch| ch as u32).collect();
        set.singles.sort_unstable();
        set.singles.dedup();
        if set.ranges.len() > 255 || set.singles.len() > 255 {
            return Err(Error::LimitExceeded("rewrite sets"));
        }
        self.utf8_sets.push(set);
        Ok(self.utf8_sets.len() as u8 - 1)
    }

    /// Registers a glyph rewrite rule. Use 0xFF as the condition for
    /// rules that always apply.
    pub fn add_glyph_rule(
        &mut self,
        condition: u8,
        head: &[RulePattern<GlyphRef>],
        body: &[RulePattern<GlyphRef>],
        tail: &[RulePattern<GlyphRef>],
        output: &[GlyphRef],
    ) -> Result<u8> {
        if self.glyph_rules.len() >= 255 {
            return Err(Error::LimitExceeded("glyph rewrite rules"));
        }
        self.check_rule_shape(condition, head.len(), body.len(), tail.len(), output.len())?;
        for pattern in head.iter().chain(body).chain(tail) {
            match *pattern {
                RulePattern::Literal(glyph) => self.check_glyph_ref(glyph)?,
                RulePattern::Set(set) => {
                    if set as usize >= self.glyph_sets.len() {
                        return Err(Error::InvalidRewriteRule);
                    }
                }
            }
        }
        for &glyph in output {
            self.check_glyph_ref(glyph)?;
        }
        self.glyph_rules.push(GlyphRuleData {
            condition,
            head: head.to_vec(),
            body: body.to_vec(),
            tail: tail.to_vec(),
            output: output.to_vec(),
        });
        Ok(self.glyph_rules.len() as u8 - 1)
    }

    /// Registers a code-point rewrite rule.
    pub fn add_utf8_rule(
        &mut self,
        condition: u8,
        head: &[RulePattern<char>],
        body: &[RulePattern<char>],
        tail: &[RulePattern<char>],
        output: &[char],
    ) -> Result<u8> {
        if self.utf8_rules.len() >= 255 {
            return Err(Error::LimitExceeded("utf8 rewrite rules"));
        }
        self.check_rule_shape(condition, head.len(), body.len(), tail.len(), output.len())?;
        for pattern in head.iter().chain(body).chain(tail) {
            if let RulePattern::Set(set) = *pattern {
                if set as usize >= self.utf8_sets.len() {
                    return Err(Error::InvalidRewriteRule);
                }
            }
        }
        self.utf8_rules.push(Utf8RuleData {
            condition,
            head: head.to_vec(),
            body: body.to_vec(),
            tail: tail.to_vec(),
            output: output.to_vec(),
        });
        Ok(self.utf8_rules.len() as u8 - 1)
    }

    fn check_rule_shape(
        &self,
        condition: u8,
        head: usize,
        body: usize,
        tail: usize,
        output: usize,
    ) -> Result<()> {
        if condition != 0xFF && condition as usize >= self.conditions.len() {
            return Err(Error::InvalidRewriteRule);
        }
        if body == 0 || output > body || head + body + tail > 255 {
            return Err(Error::InvalidRewriteRule);
        }
        Ok(())
    }

    fn check_glyph_ref(&self, glyph: GlyphRef) -> Result<()> {
        match glyph {
            GlyphRef::Uid(uid) => {
                if !self.glyphs.contains_key(&uid) {
                    return Err(Error::GlyphNotFound);
                }
            }
            GlyphRef::Index(index) => {
                // only the reserved control and custom ranges may be
                // named by raw index during editing
                if !is_valid_glyph_index(0, index) {
                    return Err(Error::InvalidArgument("reserved glyph index"));
                }
            }
        }
        Ok(())
    }

    /// Sets (or, with zero, clears) the horizontal kerning of a pair.
    pub fn set_horz_kerning(&mut self, prev: u64, curr: u64, value: i8) -> Result<()> {
        set_kerning(&self.glyphs, &mut self.horz_kernings, prev, curr, value)
    }

    /// Sets (or, with zero, clears) the vertical kerning of a pair.
    pub fn set_vert_kerning(&mut self, prev: u64, curr: u64, value: i8) -> Result<()> {
        set_kerning(&self.glyphs, &mut self.vert_kernings, prev, curr, value)
    }

    /// Serialises the whole builder state into an immutable [`Font`].
    pub fn build(&self) -> Result<Font> {
        if self.glyph_order.is_empty() {
            return Err(Error::NoGlyphs);
        }
        let index_of: FxHashMap<u64, u16> = self
            .glyph_order
            .iter()
            .enumerate()
            .map(|(index, &uid)| (uid, index as u16))
            .collect();

        let mut data = Vec::new();
        self.write_header(&mut data);
        self.write_metrics(&mut data)?;
        self.write_color(&mut data);
        self.write_glyph_names(&mut data, &index_of)?;
        self.write_glyph_masks(&mut data)?;
        let word_table = self.write_words(&mut data)?;
        self.write_setting_names(&mut data);
        self.write_setting_defs(&mut data, &word_table);
        self.write_switches(&mut data);
        self.write_mapping(&mut data, &index_of)?;
        self.write_conditions(&mut data);
        self.write_utf8_sets(&mut data);
        self.write_glyph_sets(&mut data, &index_of)?;
        self.write_utf8_rules(&mut data)?;
        self.write_glyph_rules(&mut data, &index_of)?;
        self.write_kernings(&mut data, &self.horz_kernings, &index_of)?;
        self.write_kernings(&mut data, &self.vert_kernings, &index_of)?;

        if data.len() > MAX_FONT_DATA_SIZE {
            return Err(Error::DataExceedsMax);
        }
        debug!(size = data.len(), num_glyphs = self.glyph_order.len(), "built font blob");
        Font::from_decompressed(data)
    }

    fn write_header(&self, data: &mut Vec<u8>) {
        raw::push_u32(data, FORMAT_VERSION);
        raw::push_u64(data, self.font_id);
        raw::push_u16(data, self.version_major);
        raw::push_u16(data, self.version_minor);
        self.first_date.encode(data);
        self.major_date.encode(data);
        self.minor_date.encode(data);
        raw::push_short_str(data, &self.name);
        raw::push_short_str(data, &self.family);
        raw::push_short_str(data, &self.author);
        raw::push_long_str(data, &self.about);
    }

    fn write_metrics(&self, data: &mut Vec<u8>) -> Result<()> {
        let start = data.len();
        raw::push_u16(data, self.glyph_order.len() as u16);
        data.push(self.has_vert_layout as u8);
        data.push(self.mono_width);
        data.push(self.ascent);
        data.push(self.extra_ascent);
        data.push(self.descent);
        data.push(self.extra_descent);
        data.push(self.uppercase_ascent);
        data.push(self.midline_ascent);
        data.push(self.horz_interspacing);
        data.push(self.vert_interspacing);
        data.push(self.line_gap);
        data.push(self.vert_line_width);
        debug_assert_eq!(data.len() - start, METRICS_SIZE, "invalid internal state");
        Ok(())
    }

    fn write_color(&self, data: &mut Vec<u8>) {
        data.push(self.dyes.len() as u8);
        data.push(self.palettes.len() as u8);
        let sections = || self.dyes.iter().chain(self.palettes.iter());
        let mut start = 256i32;
        for section in sections() {
            start -= section.size as i32;
            data.push(start as u8);
        }
        for section in sections() {
            data.extend_from_slice(&section.payload);
        }
        let mut end = 0u16;
        for section in sections() {
            end += section.name.len() as u16;
            raw::push_u16(data, end);
        }
        for section in sections() {
            data.extend_from_slice(section.name.as_bytes());
        }
    }

    fn write_glyph_names(
        &self,
        data: &mut Vec<u8>,
        index_of: &FxHashMap<u64, u16>,
    ) -> Result<()> {
        let mut named: Vec<(&str, u16)> = Vec::new();
        for (&uid, glyph) in &self.glyphs {
            if let Some(name) = &glyph.name {
                named.push((name.as_str(), index_of[&uid]));
            }
        }
        named.sort_unstable();
        for window in named.windows(2) {
            if window[0].0 == window[1].0 {
                return Err(Error::DuplicatedGlyphName);
            }
        }
        raw::push_u16(data, named.len() as u16);
        for &(_, index) in &named {
            raw::push_u16(data, index);
        }
        let mut end = 0u32;
        for &(name, _) in &named {
            end += name.len() as u32;
            raw::push_u24(data, end);
        }
        for &(name, _) in &named {
            data.extend_from_slice(name.as_bytes());
        }
        Ok(())
    }

    fn write_glyph_masks(&self, data: &mut Vec<u8>) -> Result<()> {
        let placement_size = if self.has_vert_layout { 4 } else { 1 };
        let mut end = 0u32;
        for uid in &self.glyph_order {
            let glyph = &self.glyphs[uid];
            self.check_mask_fits(glyph.mask_rect)?;
            if self.mono_width != 0 && glyph.placement.advance != self.mono_width {
                return Err(Error::MonoWidthViolated);
            }
            end += (placement_size + glyph.mask_ops.len()) as u32;
            if end > 0x00FF_FFFF {
                return Err(Error::DataExceedsMax);
            }
            raw::push_u24(data, end);
        }
        for uid in &self.glyph_order {
            let glyph = &self.glyphs[uid];
            data.push(glyph.placement.advance);
            if self.has_vert_layout {
                data.push(glyph.placement.top_advance);
                data.push(glyph.placement.bottom_advance);
                data.push(glyph.placement.horz_center);
            }
            data.extend_from_slice(&glyph.mask_ops);
        }
        Ok(())
    }

    fn write_words(&self, data: &mut Vec<u8>) -> Result<words::WordTable> {
        let labels = self
            .settings
            .iter()
            .flat_map(|setting| setting.options.iter().map(|option| option.as_str()));
        let table = words::intern(labels)?;
        data.push(table.builtin_refs.len() as u8);
        data.extend_from_slice(&table.builtin_refs);
        data.push(table.local_words.len() as u8);
        let mut end = 0u16;
        for word in &table.local_words {
            end += word.len() as u16;
            raw::push_u16(data, end);
        }
        for word in &table.local_words {
            data.extend_from_slice(word.as_bytes());
        }
        Ok(table)
    }

    fn write_setting_names(&self, data: &mut Vec<u8>) {
        data.push(self.settings.len() as u8);
        let mut end = 0u16;
        for setting in &self.settings {
            end += setting.name.len() as u16;
            raw::push_u16(data, end);
        }
        for setting in &self.settings {
            data.extend_from_slice(setting.name.as_bytes());
        }
    }

    fn write_setting_defs(&self, data: &mut Vec<u8>, table: &words::WordTable) {
        let mut end = 0u16;
        for setting in &self.settings {
            end += setting.options.len() as u16;
            raw::push_u16(data, end);
        }
        for setting in &self.settings {
            for option in &setting.options {
                // interning registered every option label
                let index = table.word_index(option).expect("invalid internal state");
                data.push(index);
            }
        }
    }

    fn write_switches(&self, data: &mut Vec<u8>) {
        data.push(self.switches.len() as u8);
        let mut end = 0u16;
        for switch in &self.switches {
            end += 1 + switch.len() as u16;
            raw::push_u16(data, end);
        }
        for switch in &self.switches {
            data.push(switch.len() as u8);
            data.extend_from_slice(switch);
        }
    }

    fn write_mapping(
        &self,
        data: &mut Vec<u8>,
        index_of: &FxHashMap<u64, u16>,
    ) -> Result<()> {
        raw::push_u16(data, self.mappings.len() as u16);
        for &code_point in self.mappings.keys() {
            raw::push_i32(data, code_point);
        }
        let mut entries = Vec::new();
        let mut ends = Vec::new();
        for mapping in self.mappings.values() {
            match mapping {
                MappingData::Direct(uid) => {
                    entries.push(0xFF);
                    raw::push_u16(&mut entries, index_of[uid]);
                }
                MappingData::Group(uids, flags) => {
                    entries.push(0xFE);
                    encode_group(&mut entries, uids, *flags, index_of)?;
                }
                MappingData::Switched { switch, cases } => {
                    entries.push(*switch);
                    for (uids, flags) in cases {
                        encode_group(&mut entries, uids, *flags, index_of)?;
                    }
                }
            }
            ends.push(entries.len() as u32);
        }
        for end in ends {
            if end > 0x00FF_FFFF {
                return Err(Error::DataExceedsMax);
            }
            raw::push_u24(data, end);
        }
        data.extend_from_slice(&entries);
        Ok(())
    }

    fn write_conditions(&self, data: &mut Vec<u8>) {
        data.push(self.conditions.len() as u8);
        let mut end = 0u16;
        for cond in &self.conditions {
            end += cond.len() as u16;
            raw::push_u16(data, end);
        }
        for cond in &self.conditions {
            data.extend_from_slice(cond);
        }
    }

    fn write_utf8_sets(&self, data: &mut Vec<u8>) {
        data.push(self.utf8_sets.len() as u8);
        let mut payload = Vec::new();
        let mut ends = Vec::new();
        for set in &self.utf8_sets {
            payload.push(set.ranges.len() as u8);
            payload.push(set.singles.len() as u8);
            for &(first, last) in &set.ranges {
                raw::push_u32(&mut payload, first);
                payload.push((last - first + 1) as u8);
            }
            for &single in &set.singles {
                raw::push_u32(&mut payload, single);
            }
            ends.push(payload.len() as u16);
        }
        for end in ends {
            raw::push_u16(data, end);
        }
        data.extend_from_slice(&payload);
    }

    fn write_glyph_sets(
        &self,
        data: &mut Vec<u8>,
        index_of: &FxHashMap<u64, u16>,
    ) -> Result<()> {
        data.push(self.glyph_sets.len() as u8);
        let mut payload = Vec::new();
        let mut ends = Vec::new();
        for uids in &self.glyph_sets {
            let mut indices: Vec<u16> = uids.iter().map(|uid| index_of[uid]).collect();
            indices.sort_unstable();
            indices.dedup();
            // coalesce consecutive indices into ranges
            let mut ranges: Vec<(u16, u16)> = Vec::new();
            let mut singles: Vec<u16> = Vec::new();
            let mut run_start = 0usize;
            for nth in 1..=indices.len() {
                let run_ends = nth == indices.len()
                    || indices[nth] != indices[nth - 1] + 1
                    || (nth - run_start) == 255;
                if !run_ends {
                    continue;
                }
                let run = &indices[run_start..nth];
                if run.len() >= 2 {
                    ranges.push((run[0], run[run.len() - 1]));
                } else {
                    singles.push(run[0]);
                }
                run_start = nth;
            }
            if ranges.len() > 255 || singles.len() > 255 {
                return Err(Error::LimitExceeded("rewrite sets"));
            }
            payload.push(ranges.len() as u8);
            payload.push(singles.len() as u8);
            for &(first, last) in &ranges {
                raw::push_u16(&mut payload, first);
                payload.push((last - first + 1) as u8);
            }
            for &single in &singles {
                raw::push_u16(&mut payload, single);
            }
            ends.push(payload.len() as u16);
        }
        for end in ends {
            raw::push_u16(data, end);
        }
        data.extend_from_slice(&payload);
        Ok(())
    }

    fn write_utf8_rules(&self, data: &mut Vec<u8>) -> Result<()> {
        data.push(self.utf8_rules.len() as u8);
        let mut payload = Vec::new();
        let mut ends = Vec::new();
        for rule in &self.utf8_rules {
            let serialized = Utf8RewriteRule::new(
                rule.condition,
                &rule.head,
                &rule.body,
                &rule.tail,
                &rule.output,
            )?;
            payload.extend_from_slice(serialized.data());
            ends.push(payload.len() as u32);
        }
        for end in ends {
            raw::push_u24(data, end);
        }
        data.extend_from_slice(&payload);
        Ok(())
    }

    fn write_glyph_rules(
        &self,
        data: &mut Vec<u8>,
        index_of: &FxHashMap<u64, u16>,
    ) -> Result<()> {
        data.push(self.glyph_rules.len() as u8);
        let mut payload = Vec::new();
        let mut ends = Vec::new();
        for rule in &self.glyph_rules {
            let head = resolve_patterns(&rule.head, index_of)?;
            let body = resolve_patterns(&rule.body, index_of)?;
            let tail = resolve_patterns(&rule.tail, index_of)?;
            let output: Vec<u16> = rule
                .output
                .iter()
                .map(|&glyph| resolve_glyph_ref(glyph, index_of))
                .collect::<Result<_>>()?;
            let serialized =
                GlyphRewriteRule::new(rule.condition, &head, &body, &tail, &output)?;
            payload.extend_from_slice(serialized.data());
            ends.push(payload.len() as u32);
        }
        for end in ends {
            raw::push_u24(data, end);
        }
        data.extend_from_slice(&payload);
        Ok(())
    }

    fn write_kernings(
        &self,
        data: &mut Vec<u8>,
        pairs: &BTreeMap<(u64, u64), i8>,
        index_of: &FxHashMap<u64, u16>,
    ) -> Result<()> {
        let mut resolved: Vec<(u32, i8)> = Vec::with_capacity(pairs.len());
        for (&(prev, curr), &value) in pairs {
            let prev = *index_of.get(&prev).ok_or(Error::GlyphNotFound)?;
            let curr = *index_of.get(&curr).ok_or(Error::GlyphNotFound)?;
            resolved.push((((prev as u32) << 16) | curr as u32, value));
        }
        resolved.sort_unstable_by_key(|&(key, _)| key);
        raw::push_u24(data, resolved.len() as u32);
        for &(key, _) in &resolved {
            raw::push_u32(data, key);
        }
        for &(_, value) in &resolved {
            data.push(value as u8);
        }
        Ok(())
    }
}

/// Checks a glyph group's size and flags. Single-group (0xFE) entries
/// require at least two glyphs (`min_len` 2); switched-entry cases also
/// accept the length-1 record form (`min_len` 1).
fn check_group(uids: &[u64], flags: GroupFlags, min_len: usize) -> Result<()> {
    if uids.len() < min_len || uids.len() > 128 {
        return Err(Error::InvalidArgument("glyph group size"));
    }
    // the single-glyph record form carries no flags byte
    if uids.len() == 1 && !flags.is_empty() {
        return Err(Error::InvalidArgument("glyph group flags"));
    }
    Ok(())
}

fn encode_group(
    out: &mut Vec<u8>,
    uids: &[u64],
    flags: GroupFlags,
    index_of: &FxHashMap<u64, u16>,
) -> Result<()> {
    let indices: Vec<u16> = uids
        .iter()
        .map(|uid| index_of.get(uid).copied().ok_or(Error::GlyphNotFound))
        .collect::<Result<_>>()?;
    match indices.len() {
        1 => {
            out.push(0);
            raw::push_u16(out, indices[0]);
        }
        len => {
            let consecutive = indices
                .windows(2)
                .all(|window| window[1] == window[0] + 1);
            if consecutive {
                out.push(0x80 | (len as u8 - 1));
                out.push(flags.bits());
                raw::push_u16(out, indices[0]);
            } else {
                out.push(len as u8 - 1);
                out.push(flags.bits());
                for index in indices {
                    raw::push_u16(out, index);
                }
            }
        }
    }
    Ok(())
}

fn to_glyph_ref(index: u16, uid_of: &impl Fn(u16) -> Result<u64>) -> Result<GlyphRef> {
    if is_valid_glyph_index(0, index) {
        // reserved control and custom indices stay raw
        Ok(GlyphRef::Index(index))
    } else {
        Ok(GlyphRef::Uid(uid_of(index)?))
    }
}

fn read_glyph_rule(
    data: &[u8],
    uid_of: &impl Fn(u16) -> Result<u64>,
) -> Result<GlyphRuleData> {
    let mut head = Vec::new();
    let mut body = Vec::new();
    let mut tail = Vec::new();
    let mut scanner = RuleScanner::<u16>::new(data)?;
    while let Some((block, pattern)) = scanner.next()? {
        let converted = match pattern {
            RulePattern::Literal(index) => {
                RulePattern::Literal(to_glyph_ref(index, uid_of)?)
            }
            RulePattern::Set(set) => RulePattern::Set(set),
        };
        match block {
            RuleBlock::Head => head.push(converted),
            RuleBlock::Body => body.push(converted),
            RuleBlock::Tail => tail.push(converted),
        }
    }
    let output = (0..rule_out_len(data))
        .map(|nth| {
            let index: u16 = rule_output(data, nth).ok_or(Error::InvalidRewriteRule)?;
            to_glyph_ref(index, uid_of)
        })
        .collect::<Result<_>>()?;
    Ok(GlyphRuleData { condition: rule_condition(data), head, body, tail, output })
}

fn read_utf8_rule(data: &[u8]) -> Result<Utf8RuleData> {
    let mut head = Vec::new();
    let mut body = Vec::new();
    let mut tail = Vec::new();
    let mut scanner = RuleScanner::<u32>::new(data)?;
    while let Some((block, pattern)) = scanner.next()? {
        let converted = match pattern {
            RulePattern::Literal(value) => RulePattern::Literal(
                char::from_u32(value).ok_or(Error::InvalidRewriteRule)?,
            ),
            RulePattern::Set(set) => RulePattern::Set(set),
        };
        match block {
            RuleBlock::Head => head.push(converted),
            RuleBlock::Body => body.push(converted),
            RuleBlock::Tail => tail.push(converted),
        }
    }
    let output = (0..rule_out_len(data))
        .map(|nth| {
            let value: u32 = rule_output(data, nth).ok_or(Error::InvalidRewriteRule)?;
            char::from_u32(value).ok_or(Error::InvalidRewriteRule)
        })
        .collect::<Result<_>>()?;
    Ok(Utf8RuleData { condition: rule_condition(data), head, body, tail, output })
}

fn resolve_patterns(
    patterns: &[RulePattern<GlyphRef>],
    index_of: &FxHashMap<u64, u16>,
) -> Result<Vec<RulePattern<u16>>> {
    patterns
        .iter()
        .map(|pattern| {
            Ok(match *pattern {
                RulePattern::Literal(glyph) => {
                    RulePattern::Literal(resolve_glyph_ref(glyph, index_of)?)
                }
                RulePattern::Set(set) => RulePattern::Set(set),
            })
        })
        .collect()
}

fn resolve_glyph_ref(glyph: GlyphRef, index_of: &FxHashMap<u64, u16>) -> Result<u16> {
    match glyph {
        GlyphRef::Uid(uid) => index_of.get(&uid).copied().ok_or(Error::GlyphNotFound),
        GlyphRef::Index(index) => Ok(index),
    }
}

fn set_kerning(
    glyphs: &FxHashMap<u64, GlyphData>,
    pairs: &mut BTreeMap<(u64, u64), i8>,
    prev: u64,
    curr: u64,
    value: i8,
) -> Result<()> {
    if !glyphs.contains_key(&prev) || !glyphs.contains_key(&curr) {
        return Err(Error::GlyphNotFound);
    }
    if value == 0 {
        pairs.remove(&(prev, curr));
    } else {
        pairs.insert((prev, curr), value);
    }
    Ok(())
}

fn random_u64() -> Result<u64> {
    let mut bytes = [0u8; 8];
    getrandom::getrandom(&mut bytes).map_err(|_| Error::EntropySource)?;
    Ok(u64::from_le_bytes(bytes))
}

fn generate_font_id() -> Result<u64> {
    // initial roll plus up to eight rerolls against the entropy floor
    for _ in 0..9 {
        let id = random_u64()?;
        if lazy_entropy(id) >= MIN_FONT_ID_ENTROPY {
            return Ok(id);
        }
    }
    Err(Error::FontIdEntropy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::MaskRect;

    #[test]
    fn empty_font_fails_to_build() {
        let builder = FontBuilder::new().unwrap();
        assert_eq!(builder.build().unwrap_err(), Error::NoGlyphs);
    }

    #[test]
    fn font_ids_pass_the_entropy_floor() {
        for _ in 0..32 {
            let id = generate_font_id().unwrap();
            assert!(lazy_entropy(id) >= MIN_FONT_ID_ENTROPY);
        }
    }

    #[test]
    fn mapping_before_space_is_rejected() {
        let mut builder = FontBuilder::new().unwrap();
        builder.set_ascent(4, 0);
        let mut glyph_mask = AlphaMask::new(MaskRect::new(0, -1, 1, 0));
        glyph_mask.set(0, -1, 255);
        let uid = builder.add_glyph(&glyph_mask).unwrap();
        assert_eq!(builder.map('\x1B', uid).unwrap_err(), Error::CodePointBeforeSpace);
        builder.map(' ', uid).unwrap();
    }

    #[test]
    fn glyph_over_ascent_is_rejected() {
        let mut builder = FontBuilder::new().unwrap();
        builder.set_ascent(2, 0);
        let mut glyph_mask = AlphaMask::new(MaskRect::new(0, -3, 1, 0));
        glyph_mask.set(0, -3, 255);
        assert_eq!(
            builder.add_glyph(&glyph_mask).unwrap_err(),
            Error::GlyphExceedsAscent,
        );
    }

    #[test]
    fn duplicate_glyph_names_are_rejected() {
        let mut builder = FontBuilder::new().unwrap();
        builder.set_ascent(2, 0);
        let mut glyph_mask = AlphaMask::new(MaskRect::new(0, -1, 1, 0));
        glyph_mask.set(0, -1, 255);
        let first = builder.add_glyph(&glyph_mask).unwrap();
        let second = builder.add_glyph(&glyph_mask).unwrap();
        builder.set_glyph_name(first, "heart").unwrap();
        assert_eq!(
            builder.set_glyph_name(second, "heart").unwrap_err(),
            Error::DuplicatedGlyphName,
        );
    }
}
