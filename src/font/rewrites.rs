//! Rewrite sections: conditions, element sets and serialized rules.

use core::marker::PhantomData;

use crate::condition;
use crate::error::{Error, Result};
use crate::font::{Font, SectionCounts};
use crate::raw::Bytes;
use crate::rewrite::rule::{GlyphRewriteRule, Utf8RewriteRule};
use crate::rewrite::{rule, RewriteElement};

/// A rewrite set: sorted disjoint ranges plus sorted singletons over
/// glyph indices or code points.
#[derive(Clone, Copy)]
pub struct RewriteSet<'a, T: RewriteElement> {
    data: &'a [u8],
    _elem: PhantomData<T>,
}

impl<'a, T: RewriteElement> RewriteSet<'a, T> {
    fn parse(data: &'a [u8]) -> Option<Self> {
        let num_ranges = *data.first()? as usize;
        let num_singles = *data.get(1)? as usize;
        let size = 2 + num_ranges * (T::WIDTH + 1) + num_singles * T::WIDTH;
        (data.len() == size).then_some(Self { data, _elem: PhantomData })
    }

    pub fn num_ranges(&self) -> u8 {
        self.data[0]
    }

    pub fn num_singles(&self) -> u8 {
        self.data[1]
    }

    /// Returns the `nth` range as an inclusive `(first, last)` pair.
    pub fn range(&self, nth: u8) -> Option<(T, T)> {
        if nth >= self.num_ranges() {
            return None;
        }
        let offset = 2 + nth as usize * (T::WIDTH + 1);
        let first = T::read(self.data, offset)?;
        let len = *self.data.get(offset + T::WIDTH)?;
        Some((first, first.range_last(len)?))
    }

    pub fn single(&self, nth: u8) -> Option<T> {
        if nth >= self.num_singles() {
            return None;
        }
        let offset =
            2 + self.num_ranges() as usize * (T::WIDTH + 1) + nth as usize * T::WIDTH;
        T::read(self.data, offset)
    }

    pub fn contains(&self, elem: T) -> bool {
        for nth in 0..self.num_ranges() {
            if let Some((first, last)) = self.range(nth) {
                if elem >= first && elem <= last {
                    return true;
                }
            }
        }
        (0..self.num_singles()).any(|nth| self.single(nth) == Some(elem))
    }

    /// Collects the set as sorted, merged, non-overlapping inclusive
    /// ranges, the shape the decision-tree compiler consumes.
    pub fn normalized_ranges(&self) -> Vec<(T, T)> {
        let mut ranges: Vec<(T, T)> = Vec::new();
        for nth in 0..self.num_ranges() {
            if let Some(range) = self.range(nth) {
                ranges.push(range);
            }
        }
        for nth in 0..self.num_singles() {
            if let Some(single) = self.single(nth) {
                ranges.push((single, single));
            }
        }
        ranges.sort_unstable();
        let mut merged: Vec<(T, T)> = Vec::with_capacity(ranges.len());
        for (first, last) in ranges {
            match merged.last_mut() {
                Some(prev) if first <= prev.1.succ().unwrap_or(prev.1) => {
                    if last > prev.1 {
                        prev.1 = last;
                    }
                }
                _ => merged.push((first, last)),
            }
        }
        merged
    }
}

/// View over the rewrite-related sections.
#[derive(Clone, Copy)]
pub struct FontRewrites<'a> {
    font: &'a Font,
}

impl<'a> FontRewrites<'a> {
    pub(crate) fn new(font: &'a Font) -> Self {
        Self { font }
    }

    pub fn num_conditions(&self) -> u8 {
        self.font.counts().num_conditions
    }

    /// Compiled byte stream of a rewrite condition.
    pub fn condition_data(&self, nth: u8) -> Option<&'a [u8]> {
        section_item(
            self.font.bytes(),
            self.font.offsets().conditions,
            self.num_conditions(),
            nth,
        )
    }

    /// Evaluates a condition against a settings-value slice.
    pub fn eval_condition(&self, nth: u8, values: &[u8]) -> Result<bool> {
        let data = self.condition_data(nth).ok_or(Error::InvalidCondition)?;
        condition::eval(data, values)
    }

    pub fn num_utf8_sets(&self) -> u8 {
        self.font.counts().num_utf8_sets
    }

    pub fn utf8_set(&self, nth: u8) -> Option<RewriteSet<'a, u32>> {
        let data = section_item(
            self.font.bytes(),
            self.font.offsets().utf8_sets,
            self.num_utf8_sets(),
            nth,
        )?;
        RewriteSet::parse(data)
    }

    pub fn num_glyph_sets(&self) -> u8 {
        self.font.counts().num_glyph_sets
    }

    pub fn glyph_set(&self, nth: u8) -> Option<RewriteSet<'a, u16>> {
        let data = section_item(
            self.font.bytes(),
            self.font.offsets().glyph_sets,
            self.num_glyph_sets(),
            nth,
        )?;
        RewriteSet::parse(data)
    }

    pub fn num_utf8_rules(&self) -> u8 {
        self.font.counts().num_utf8_rules
    }

    pub fn utf8_rule_data(&self, nth: u8) -> Option<&'a [u8]> {
        rule_item(
            self.font.bytes(),
            self.font.offsets().utf8_rewrites,
            self.num_utf8_rules(),
            nth,
        )
    }

    /// Owned copy of a serialized code-point rule, ready for a tester.
    pub fn utf8_rule(&self, nth: u8) -> Option<Utf8RewriteRule> {
        self.utf8_rule_data(nth)
            .map(|data| Utf8RewriteRule { data: data.to_vec() })
    }

    pub fn num_glyph_rules(&self) -> u8 {
        self.font.counts().num_glyph_rules
    }

    pub fn glyph_rule_data(&self, nth: u8) -> Option<&'a [u8]> {
        rule_item(
            self.font.bytes(),
            self.font.offsets().glyph_rewrites,
            self.num_glyph_rules(),
            nth,
        )
    }

    /// Owned copy of a serialized glyph rule, ready for a tester.
    pub fn glyph_rule(&self, nth: u8) -> Option<GlyphRewriteRule> {
        self.glyph_rule_data(nth)
            .map(|data| GlyphRewriteRule { data: data.to_vec() })
    }
}

/// Reads item `nth` of a section laid out as `u8 count`, `u16`
/// end-offsets, payload.
fn section_item<'a>(bytes: Bytes<'a>, base: usize, count: u8, nth: u8) -> Option<&'a [u8]> {
    if nth >= count {
        return None;
    }
    let ends = base + 1;
    let data = ends + count as usize * 2;
    let end = bytes.read_u16(ends + nth as usize * 2)? as usize;
    let start = if nth == 0 {
        0
    } else {
        bytes.read_u16(ends + (nth as usize - 1) * 2)? as usize
    };
    bytes.slice(data + start, end - start)
}

/// Reads item `nth` of a rule section: `u8 count`, `u24` end-offsets,
/// payload.
fn rule_item<'a>(bytes: Bytes<'a>, base: usize, count: u8, nth: u8) -> Option<&'a [u8]> {
    if nth >= count {
        return None;
    }
    let ends = base + 1;
    let data = ends + count as usize * 3;
    let end = bytes.read_u24(ends + nth as usize * 3)? as usize;
    let start = if nth == 0 {
        0
    } else {
        bytes.read_u24(ends + (nth as usize - 1) * 3)? as usize
    };
    bytes.slice(data + start, end - start)
}

pub(crate) fn validate_conditions(
    bytes: &Bytes,
    start: usize,
    num_settings: u8,
    counts: &mut SectionCounts,
) -> Result<usize> {
    let (end, num) = walk_u16_section(bytes, start, "rewrite conditions", |item| {
        condition::validate_stream(item, num_settings)
            .map_err(|_| Error::InvalidSection("rewrite conditions"))
    })?;
    counts.num_conditions = num;
    Ok(end)
}

pub(crate) fn validate_utf8_sets(
    bytes: &Bytes,
    start: usize,
    counts: &mut SectionCounts,
) -> Result<usize> {
    let (end, num) = walk_u16_section(bytes, start, "rewrite utf8 sets", |item| {
        validate_set::<u32>(item, "rewrite utf8 sets")
    })?;
    counts.num_utf8_sets = num;
    Ok(end)
}

pub(crate) fn validate_glyph_sets(
    bytes: &Bytes,
    start: usize,
    num_glyphs: u16,
    counts: &mut SectionCounts,
) -> Result<usize> {
    let _ = num_glyphs; // glyph sets may range over reserved indices too
    let (end, num) = walk_u16_section(bytes, start, "rewrite glyph sets", |item| {
        validate_set::<u16>(item, "rewrite glyph sets")
    })?;
    counts.num_glyph_sets = num;
    Ok(end)
}

pub(crate) fn validate_utf8_rules(
    bytes: &Bytes,
    start: usize,
    num_conditions: u8,
    num_sets: u8,
) -> Result<(usize, u8)> {
    walk_u24_section(bytes, start, |item| {
        rule::validate_rule::<u32>(item, num_conditions, num_sets, |elem| {
            elem.in_domain()
        })
        .map_err(|_| Error::InvalidSection("utf8 rewrites"))
    })
}

pub(crate) fn validate_glyph_rules(
    bytes: &Bytes,
    start: usize,
    num_conditions: u8,
    num_sets: u8,
    num_glyphs: u16,
) -> Result<(usize, u8)> {
    walk_u24_section(bytes, start, |item| {
        rule::validate_rule::<u16>(item, num_conditions, num_sets, |glyph| {
            crate::is_valid_glyph_index(num_glyphs, glyph)
        })
        .map_err(|_| Error::InvalidSection("glyph rewrites"))
    })
}

fn validate_set<T: RewriteElement>(data: &[u8], section: &'static str) -> Result<()> {
    let invalid = Error::InvalidSection(section);
    let set = RewriteSet::<T>::parse(data).ok_or(invalid.clone())?;
    let mut prev_last: Option<T> = None;
    for nth in 0..set.num_ranges() {
        let (first, last) = set.range(nth).ok_or(invalid.clone())?;
        if !first.in_domain() || !last.in_domain() {
            return Err(invalid);
        }
        if let Some(prev) = prev_last {
            if first <= prev {
                return Err(invalid);
            }
        }
        prev_last = Some(last);
    }
    let mut prev_single: Option<T> = None;
    for nth in 0..set.num_singles() {
        let single = set.single(nth).ok_or(invalid.clone())?;
        if !single.in_domain() {
            return Err(invalid);
        }
        if let Some(prev) = prev_single {
            if single <= prev {
                return Err(invalid);
            }
        }
        prev_single = Some(single);
    }
    Ok(())
}

fn walk_u16_section(
    bytes: &Bytes,
    start: usize,
    section: &'static str,
    mut validate_item: impl FnMut(&[u8]) -> Result<()>,
) -> Result<(usize, u8)> {
    let num = bytes.read_u8(start).ok_or(Error::PrematureEnd)?;
    let ends = start + 1;
    let data = ends + num as usize * 2;
    let mut prev_end = 0usize;
    for nth in 0..num as usize {
        let end = bytes.read_u16(ends + nth * 2).ok_or(Error::PrematureEnd)? as usize;
        if end <= prev_end {
            return Err(Error::InvalidSection(section));
        }
        let item = bytes
            .slice(data + prev_end, end - prev_end)
            .ok_or(Error::PrematureEnd)?;
        validate_item(item)?;
        prev_end = end;
    }
    Ok((data + prev_end, num))
}

fn walk_u24_section(
    bytes: &Bytes,
    start: usize,
    mut validate_item: impl FnMut(&[u8]) -> Result<()>,
) -> Result<(usize, u8)> {
    let num = bytes.read_u8(start).ok_or(Error::PrematureEnd)?;
    let ends = start + 1;
    let data = ends + num as usize * 3;
    let mut prev_end = 0usize;
    for nth in 0..num as usize {
        let end = bytes.read_u24(ends + nth * 3).ok_or(Error::PrematureEnd)? as usize;
        if end <= prev_end {
            return Err(Error::InvalidRewriteRule);
        }
        let item = bytes
            .slice(data + prev_end, end - prev_end)
            .ok_or(Error::PrematureEnd)?;
        validate_item(item)?;
        prev_end = end;
    }
    Ok((data + prev_end, num))
}
