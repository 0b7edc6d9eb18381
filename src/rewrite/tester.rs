//! Streaming greedy longest-match rewrite runners.
//!
//! A tester holds the loaded rules, one DFA per distinct rule condition,
//! and a circular accumulator sized to the longest rule pattern. Input is
//! fed one element at a time between `begin_sequence` and
//! `finish_sequence`; output comes through the caller-supplied callback,
//! synchronously. The contract is single-threaded and cooperative: calls
//! outside the operating state panic, and the output never depends on the
//! granularity of `feed` calls.
//!
//! Matching is greedy: the longest completed match wins; among matches of
//! the same length the earliest-declared rule wins. On a match the rule's
//! head elements are emitted as-is, the output replaces the body, and the
//! tail elements are emitted but kept in the accumulator (tracked through
//! `unflushed_tail`) so they can participate in further matches.

use smallvec::SmallVec;
use tracing::debug;

use crate::cache::settings::SettingsCache;
use crate::error::{Error, Result};
use crate::font::Font;
use crate::rewrite::dfa::{DfaCompiler, DfaScanner, RewriteDfa, RulePatternRanges, NO_RULE};
use crate::rewrite::pool;
use crate::rewrite::rule::{
    rule_body_len, rule_condition, rule_head_len, rule_out_len, rule_output,
    rule_tail_len, GlyphRewriteRule, RulePattern, RuleScanner, Utf8RewriteRule,
};
use crate::rewrite::RewriteElement;

/// Most rules a tester accepts; indices must stay below the DFA's
/// rule-match sentinel.
pub const MAX_TESTER_RULES: usize = 254;

/// Condition byte meaning "always applies".
pub const CONDITION_NONE: u8 = 0xFF;

struct CircularBuffer<T> {
    data: Vec<T>,
    start: usize,
    len: usize,
}

impl<T: RewriteElement> CircularBuffer<T> {
    fn with_capacity(capacity: usize) -> Self {
        Self { data: vec![T::MIN; capacity], start: 0, len: 0 }
    }

    fn len(&self) -> usize {
        self.len
    }

    fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn push(&mut self, elem: T) {
        assert!(self.len < self.data.len(), "invalid internal state");
        let at = (self.start + self.len) % self.data.len();
        self.data[at] = elem;
        self.len += 1;
    }

    fn peek(&self, nth: usize) -> T {
        assert!(nth < self.len, "invalid internal state");
        self.data[(self.start + nth) % self.data.len()]
    }

    fn pop_front(&mut self) -> T {
        let elem = self.peek(0);
        self.start = (self.start + 1) % self.data.len();
        self.len -= 1;
        elem
    }

    fn clear(&mut self) {
        self.start = 0;
        self.len = 0;
    }
}

struct ConditionSlot<T: RewriteElement> {
    condition: u8,
    dfa: RewriteDfa<T>,
    scanner: DfaScanner,
    active: bool,
}

struct Tester<T: RewriteElement> {
    rules: Vec<Vec<u8>>,
    slots: Vec<ConditionSlot<T>>,
    acc: CircularBuffer<T>,
    scanned: usize,
    unflushed_tail: u8,
    operating: bool,
    rules_dirty: bool,
    activations_stale: bool,
}

impl<T: RewriteElement> Tester<T> {
    fn new() -> Self {
        Self {
            rules: Vec::new(),
            slots: Vec::new(),
            acc: CircularBuffer::with_capacity(0),
            scanned: 0,
            unflushed_tail: 0,
            operating: false,
            rules_dirty: false,
            activations_stale: false,
        }
    }

    fn add_rule(&mut self, data: Vec<u8>) -> Result<u8> {
        assert!(!self.operating, "can't change rules inside a sequence");
        if self.rules.len() >= MAX_TESTER_RULES {
            return Err(Error::TesterTooManyRules);
        }
        self.rules.push(data);
        self.rules_dirty = true;
        Ok((self.rules.len() - 1) as u8)
    }

    fn remove_rule(&mut self, index: u8) -> Result<()> {
        assert!(!self.operating, "can't change rules inside a sequence");
        if index as usize >= self.rules.len() {
            return Err(Error::InvalidArgument("rewrite rule index"));
        }
        self.rules.remove(index as usize);
        self.rules_dirty = true;
        Ok(())
    }

    fn needs_resync(&self) -> bool {
        self.rules_dirty || self.activations_stale
    }

    fn notify_settings_changed(&mut self) {
        self.activations_stale = true;
    }

    /// Rebuilds the per-condition DFAs (when the rules changed) and
    /// refreshes which conditions are active under the current settings.
    fn resync_with(
        &mut self,
        compiler: &mut DfaCompiler<T>,
        eval_condition: impl Fn(u8) -> Result<bool>,
        resolve_set: impl Fn(u8) -> Option<Vec<(T, T)>>,
    ) -> Result<()> {
        assert!(!self.operating, "can't resync inside a sequence");
        if self.rules_dirty {
            let mut groups: Vec<(u8, Vec<u8>)> = Vec::new();
            for (index, data) in self.rules.iter().enumerate() {
                let condition = rule_condition(data);
                match groups.iter_mut().find(|group| group.0 == condition) {
                    Some(group) => group.1.push(index as u8),
                    None => groups.push((condition, vec![index as u8])),
                }
            }
            debug!(rules = self.rules.len(), conditions = groups.len(), "recompiling rewrite DFAs");
            let mut slots = Vec::with_capacity(groups.len());
            for (condition, rule_indices) in groups {
                let mut patterns = Vec::with_capacity(rule_indices.len());
                for &rule_index in &rule_indices {
                    patterns.push(build_pattern(
                        &self.rules[rule_index as usize],
                        rule_index,
                        &resolve_set,
                    )?);
                }
                slots.push(ConditionSlot {
                    condition,
                    dfa: compiler.compile(&patterns)?,
                    scanner: DfaScanner::default(),
                    active: false,
                });
            }
            self.slots = slots;
            let capacity = self
                .rules
                .iter()
                .map(|data| {
                    rule_head_len(data) as usize
                        + rule_body_len(data) as usize
                        + rule_tail_len(data) as usize
                })
                .max()
                .unwrap_or(0);
            self.acc = CircularBuffer::with_capacity(capacity);
            self.rules_dirty = false;
        }
        for slot in &mut self.slots {
            slot.active =
                slot.condition == CONDITION_NONE || eval_condition(slot.condition)?;
        }
        self.activations_stale = false;
        Ok(())
    }

    fn begin_sequence(&mut self) {
        assert!(!self.operating, "sequence already in progress");
        assert!(!self.needs_resync(), "tester requires a resync");
        self.operating = true;
        self.acc.clear();
        self.scanned = 0;
        self.unflushed_tail = 0;
        self.restart_scanners();
    }

    fn feed(&mut self, elem: T, out: &mut impl FnMut(T)) {
        assert!(self.operating, "feed outside a sequence");
        if !self.slots.iter().any(|slot| slot.active) {
            emit(elem, out);
            return;
        }
        self.acc.push(elem);
        self.pump(false, out);
    }

    fn break_sequence(&mut self, out: &mut impl FnMut(T)) {
        assert!(self.operating, "break outside a sequence");
        self.pump(true, out);
    }

    fn finish_sequence(&mut self, out: &mut impl FnMut(T)) {
        assert!(self.operating, "finish outside a sequence");
        self.pump(true, out);
        self.operating = false;
        debug_assert!(
            self.acc.is_empty() && self.unflushed_tail == 0,
            "invalid internal state",
        );
    }

    /// Scans buffered elements and settles as many decisions as the
    /// available input allows. With `draining` set, matches already on the
    /// books fire even while a DFA would rather keep scanning.
    fn pump(&mut self, draining: bool, out: &mut impl FnMut(T)) {
        loop {
            while self.scanned < self.acc.len() {
                let elem = self.acc.peek(self.scanned);
                self.scanned += 1;
                let mut any = false;
                for slot in &mut self.slots {
                    if slot.active {
                        slot.dfa.feed(&mut slot.scanner, elem);
                        any |= slot.scanner.is_scanning();
                    }
                }
                if !any {
                    break;
                }
            }
            let any_scanning = self
                .slots
                .iter()
                .any(|slot| slot.active && slot.scanner.is_scanning());
            if !draining && any_scanning && self.scanned == self.acc.len() {
                return; // need more input to decide
            }
            if draining && self.acc.is_empty() {
                self.unflushed_tail = 0;
                self.restart_scanners();
                self.scanned = 0;
                return;
            }
            match self.best_match() {
                Some(rule_index) => self.fire(rule_index, out),
                None => {
                    let elem = self.acc.pop_front();
                    if self.unflushed_tail > 0 {
                        // already emitted as a previous match's tail
                        self.unflushed_tail -= 1;
                    } else {
                        emit(elem, out);
                    }
                }
            }
            self.restart_scanners();
            self.scanned = 0;
        }
    }

    /// Longest completed match across the per-condition DFAs; ties go to
    /// the lowest (earliest-declared) rule index.
    fn best_match(&self) -> Option<u8> {
        let mut best: Option<(usize, u8)> = None;
        for slot in &self.slots {
            if !slot.active {
                continue;
            }
            let rule_index = slot.scanner.best_rule();
            if rule_index == NO_RULE {
                continue;
            }
            let data = &self.rules[rule_index as usize];
            let span = rule_head_len(data) as usize
                + rule_body_len(data) as usize
                + rule_tail_len(data) as usize;
            let better = match best {
                None => true,
                Some((best_span, best_rule)) => {
                    span > best_span || (span == best_span && rule_index < best_rule)
                }
            };
            if better {
                best = Some((span, rule_index));
            }
        }
        best.map(|(_, rule_index)| rule_index)
    }

    fn fire(&mut self, rule_index: u8, out: &mut impl FnMut(T)) {
        let data = &self.rules[rule_index as usize];
        let head_len = rule_head_len(data);
        let body_len = rule_body_len(data);
        let tail_len = rule_tail_len(data);
        let outputs: SmallVec<[T; 8]> = (0..rule_out_len(data))
            .filter_map(|nth| rule_output(data, nth))
            .collect();

        // head elements pass through as-is (unless a previous match's
        // tail already emitted them)
        for _ in 0..head_len {
            let elem = self.acc.pop_front();
            if self.unflushed_tail > 0 {
                self.unflushed_tail -= 1;
            } else {
                emit(elem, out);
            }
        }
        for &elem in &outputs {
            emit(elem, out);
        }
        // the body is consumed, replaced by the output
        for _ in 0..body_len {
            let _ = self.acc.pop_front();
            if self.unflushed_tail > 0 {
                self.unflushed_tail -= 1;
            }
        }
        // tail elements are emitted but stay buffered for re-scanning
        let leftover = self.unflushed_tail;
        for nth in 0..tail_len {
            if nth >= leftover {
                emit(self.acc.peek(nth as usize), out);
            }
        }
        self.unflushed_tail = leftover.max(tail_len);
    }

    fn restart_scanners(&mut self) {
        for slot in &mut self.slots {
            slot.scanner.restart(slot.active);
        }
    }
}

fn emit<T: RewriteElement>(elem: T, out: &mut impl FnMut(T)) {
    if !elem.is_zilch() {
        out(elem);
    }
}

fn build_pattern<T: RewriteElement>(
    data: &[u8],
    rule_index: u8,
    resolve_set: &impl Fn(u8) -> Option<Vec<(T, T)>>,
) -> Result<RulePatternRanges<T>> {
    let mut scanner = RuleScanner::<T>::new(data)?;
    let mut elems = Vec::new();
    while let Some((_, pattern)) = scanner.next()? {
        match pattern {
            RulePattern::Literal(elem) => elems.push(vec![(elem, elem)]),
            RulePattern::Set(set) => {
                let ranges = resolve_set(set).ok_or(Error::InvalidRewriteRule)?;
                if ranges.is_empty() {
                    return Err(Error::InvalidRewriteRule);
                }
                elems.push(ranges);
            }
        }
    }
    Ok(RulePatternRanges { rule_index, head_len: rule_head_len(data), elems })
}

/// Streaming rewriter over glyph indices. Output glyphs equal to
/// [`crate::GLYPH_ZILCH`] are silently dropped.
pub struct GlyphTester {
    inner: Tester<u16>,
}

impl Default for GlyphTester {
    fn default() -> Self {
        Self::new()
    }
}

impl GlyphTester {
    pub fn new() -> Self {
        Self { inner: Tester::new() }
    }

    /// Loads a rule, returning its index. Fails with
    /// [`Error::TesterTooManyRules`] past [`MAX_TESTER_RULES`].
    pub fn add_rule(&mut self, rule: GlyphRewriteRule) -> Result<u8> {
        self.inner.add_rule(rule.data)
    }

    pub fn remove_rule(&mut self, index: u8) -> Result<()> {
        self.inner.remove_rule(index)
    }

    pub fn num_rules(&self) -> u8 {
        self.inner.rules.len() as u8
    }

    /// Whether rules or settings changed since the last [`Self::resync`].
    pub fn needs_resync(&self) -> bool {
        self.inner.needs_resync()
    }

    /// Tells the tester a rewrite-relevant setting changed, invalidating
    /// the cached condition activations.
    pub fn notify_settings_changed(&mut self) {
        self.inner.notify_settings_changed();
    }

    /// Recompiles changed DFAs and re-evaluates rule conditions.
    pub fn resync(&mut self, font: &Font, settings: &SettingsCache) -> Result<()> {
        let mut compiler = pool::retrieve_glyph_compiler();
        let rewrites = font.rewrites();
        let result = self.inner.resync_with(
            &mut compiler,
            |condition| settings.eval_condition(font, condition),
            |set| rewrites.glyph_set(set).map(|set| set.normalized_ranges()),
        );
        pool::release_glyph_compiler(compiler);
        result
    }

    pub fn is_operating(&self) -> bool {
        self.inner.operating
    }

    pub fn begin_sequence(&mut self) {
        self.inner.begin_sequence();
    }

    pub fn feed(&mut self, glyph: u16, mut out: impl FnMut(u16)) {
        self.inner.feed(glyph, &mut out);
    }

    /// Flushes buffered elements without consuming more input or leaving
    /// the sequence.
    pub fn break_sequence(&mut self, mut out: impl FnMut(u16)) {
        self.inner.break_sequence(&mut out);
    }

    pub fn finish_sequence(&mut self, mut out: impl FnMut(u16)) {
        self.inner.finish_sequence(&mut out);
    }
}

/// Streaming rewriter over code points.
pub struct Utf8Tester {
    inner: Tester<u32>,
}

impl Default for Utf8Tester {
    fn default() -> Self {
        Self::new()
    }
}

impl Utf8Tester {
    pub fn new() -> Self {
        Self { inner: Tester::new() }
    }

    pub fn add_rule(&mut self, rule: Utf8RewriteRule) -> Result<u8> {
        self.inner.add_rule(rule.data)
    }

    pub fn remove_rule(&mut self, index: u8) -> Result<()> {
        self.inner.remove_rule(index)
    }

    pub fn num_rules(&self) -> u8 {
        self.inner.rules.len() as u8
    }

    pub fn needs_resync(&self) -> bool {
        self.inner.needs_resync()
    }

    pub fn notify_settings_changed(&mut self) {
        self.inner.notify_settings_changed();
    }

    pub fn resync(&mut self, font: &Font, settings: &SettingsCache) -> Result<()> {
        let mut compiler = pool::retrieve_utf8_compiler();
        let rewrites = font.rewrites();
        let result = self.inner.resync_with(
            &mut compiler,
            |condition| settings.eval_condition(font, condition),
            |set| rewrites.utf8_set(set).map(|set| set.normalized_ranges()),
        );
        pool::release_utf8_compiler(compiler);
        result
    }

    pub fn is_operating(&self) -> bool {
        self.inner.operating
    }

    pub fn begin_sequence(&mut self) {
        self.inner.begin_sequence();
    }

    pub fn feed(&mut self, ch: char, mut out: impl FnMut(char)) {
        self.inner.feed(ch as u32, &mut |value| {
            if let Some(ch) = char::from_u32(value) {
                out(ch);
            }
        });
    }

    pub fn break_sequence(&mut self, mut out: impl FnMut(char)) {
        self.inner.break_sequence(&mut |value| {
            if let Some(ch) = char::from_u32(value) {
                out(ch);
            }
        });
    }

    pub fn finish_sequence(&mut self, mut out: impl FnMut(char)) {
        self.inner.finish_sequence(&mut |value| {
            if let Some(ch) = char::from_u32(value) {
                out(ch);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::rule::RulePattern::{Literal, Set};

    fn glyph_rule(
        head: &[RulePattern<u16>],
        body: &[RulePattern<u16>],
        tail: &[RulePattern<u16>],
        output: &[u16],
    ) -> GlyphRewriteRule {
        GlyphRewriteRule::new(CONDITION_NONE, head, body, tail, output).unwrap()
    }

    fn detached_resync(tester: &mut GlyphTester) {
        detached_resync_with_sets(tester, &[]);
    }

    fn detached_resync_with_sets(tester: &mut GlyphTester, sets: &[Vec<(u16, u16)>]) {
        let mut compiler = DfaCompiler::new();
        tester
            .inner
            .resync_with(
                &mut compiler,
                |_| Ok(true),
                |set| sets.get(set as usize).cloned(),
            )
            .unwrap();
    }

    fn run(tester: &mut GlyphTester, input: &[u16]) -> Vec<u16> {
        let mut output = Vec::new();
        tester.begin_sequence();
        for &glyph in input {
            tester.feed(glyph, |out| output.push(out));
        }
        tester.finish_sequence(|out| output.push(out));
        output
    }

    fn run_chunked(tester: &mut GlyphTester, input: &[u16], chunk: usize) -> Vec<u16> {
        let mut output = Vec::new();
        tester.begin_sequence();
        for piece in input.chunks(chunk) {
            for &glyph in piece {
                tester.feed(glyph, |out| output.push(out));
            }
        }
        tester.finish_sequence(|out| output.push(out));
        output
    }

    #[test]
    fn simple_body_replacement() {
        let mut tester = GlyphTester::new();
        tester
            .add_rule(glyph_rule(&[], &[Literal(1), Literal(2)], &[], &[3]))
            .unwrap();
        detached_resync(&mut tester);
        assert_eq!(run(&mut tester, &[1, 2]), vec![3]);
        assert_eq!(run(&mut tester, &[0, 1, 2]), vec![0, 3]);
        assert_eq!(run(&mut tester, &[1, 2, 6]), vec![3, 6]);
        assert_eq!(run(&mut tester, &[1, 1, 2]), vec![1, 3]);
        assert_eq!(run(&mut tester, &[1]), vec![1]);
    }

    #[test]
    fn longest_match_is_greedy() {
        let mut tester = GlyphTester::new();
        tester
            .add_rule(glyph_rule(&[], &[Literal(1), Literal(2)], &[], &[3]))
            .unwrap();
        tester
            .add_rule(glyph_rule(&[], &[Literal(1), Literal(2), Literal(3)], &[], &[4]))
            .unwrap();
        detached_resync(&mut tester);
        assert_eq!(run(&mut tester, &[1, 2, 3]), vec![4]);
        assert_eq!(run(&mut tester, &[1, 2, 3, 0, 1, 2]), vec![4, 0, 3]);
        assert_eq!(run(&mut tester, &[1, 2, 4]), vec![3, 4]);
    }

    #[test]
    fn heads_pass_through_and_tails_re_enter() {
        let mut tester = GlyphTester::new();
        tester
            .add_rule(glyph_rule(&[], &[Literal(1), Literal(2)], &[Literal(1)], &[9]))
            .unwrap();
        tester
            .add_rule(glyph_rule(&[Literal(1)], &[Literal(2)], &[], &[8]))
            .unwrap();
        detached_resync(&mut tester);
        assert_eq!(run(&mut tester, &[1, 2, 3]), vec![1, 8, 3]);
        assert_eq!(run(&mut tester, &[0, 1, 2, 1]), vec![0, 9, 1]);
        // the re-buffered tail then serves as the second rule's head
        assert_eq!(run(&mut tester, &[0, 1, 2, 1, 2]), vec![0, 9, 1, 8]);
    }

    #[test]
    fn granularity_independence() {
        let mut tester = GlyphTester::new();
        tester
            .add_rule(glyph_rule(&[], &[Literal(1), Literal(2)], &[Literal(1)], &[9]))
            .unwrap();
        tester
            .add_rule(glyph_rule(&[Literal(1)], &[Literal(2)], &[], &[8]))
            .unwrap();
        tester
            .add_rule(glyph_rule(&[], &[Literal(5), Literal(5), Literal(5)], &[], &[6, 6]))
            .unwrap();
        detached_resync(&mut tester);
        let input = [0, 1, 2, 1, 2, 5, 5, 5, 1, 2, 3, 5, 1, 1, 2, 2];
        let whole = run(&mut tester, &input);
        for chunk in 1..input.len() {
            assert_eq!(run_chunked(&mut tester, &input, chunk), whole, "chunk {chunk}");
        }
    }

    #[test]
    fn set_elements_match_ranges() {
        let mut tester = GlyphTester::new();
        tester
            .add_rule(glyph_rule(&[], &[Set(0), Literal(9)], &[], &[7]))
            .unwrap();
        detached_resync_with_sets(&mut tester, &[vec![(10, 12), (20, 20)]]);
        assert_eq!(run(&mut tester, &[11, 9]), vec![7]);
        assert_eq!(run(&mut tester, &[20, 9]), vec![7]);
        assert_eq!(run(&mut tester, &[13, 9]), vec![13, 9]);
    }

    #[test]
    fn zilch_output_is_dropped() {
        let mut tester = GlyphTester::new();
        tester
            .add_rule(glyph_rule(
                &[],
                &[Literal(1), Literal(2)],
                &[],
                &[crate::GLYPH_ZILCH, 4],
            ))
            .unwrap();
        detached_resync(&mut tester);
        assert_eq!(run(&mut tester, &[1, 2]), vec![4]);
        // zilch fed directly through also vanishes
        assert_eq!(run(&mut tester, &[crate::GLYPH_ZILCH]), Vec::<u16>::new());
    }

    #[test]
    fn break_flushes_without_finishing() {
        let mut tester = GlyphTester::new();
        tester
            .add_rule(glyph_rule(&[], &[Literal(1), Literal(2)], &[], &[3]))
            .unwrap();
        detached_resync(&mut tester);
        let mut output = Vec::new();
        tester.begin_sequence();
        tester.feed(1, |out| output.push(out));
        assert!(output.is_empty()); // buffered, waiting for a 2
        tester.break_sequence(|out| output.push(out));
        assert_eq!(output, vec![1]);
        assert!(tester.is_operating());
        tester.feed(1, |out| output.push(out));
        tester.feed(2, |out| output.push(out));
        tester.finish_sequence(|out| output.push(out));
        assert_eq!(output, vec![1, 3]);
        assert!(!tester.is_operating());
    }

    #[test]
    fn too_many_rules_are_rejected() {
        let mut tester = GlyphTester::new();
        for _ in 0..MAX_TESTER_RULES {
            tester
                .add_rule(glyph_rule(&[], &[Literal(1), Literal(2)], &[], &[3]))
                .unwrap();
        }
        assert_eq!(
            tester.add_rule(glyph_rule(&[], &[Literal(1)], &[], &[2])),
            Err(Error::TesterTooManyRules),
        );
    }

    #[test]
    fn tail_is_emitted_exactly_once() {
        let mut tester = GlyphTester::new();
        tester
            .add_rule(glyph_rule(&[], &[Literal(1), Literal(2)], &[Literal(3)], &[9]))
            .unwrap();
        detached_resync(&mut tester);
        // the tail element is emitted on match and must not be emitted
        // again when it drains out of the accumulator
        assert_eq!(run(&mut tester, &[1, 2, 3]), vec![9, 3]);
        assert_eq!(run(&mut tester, &[1, 2, 3, 4]), vec![9, 3, 4]);
        // without the tail present the rule never fires
        assert_eq!(run(&mut tester, &[1, 2]), vec![1, 2]);
    }

    #[test]
    fn chained_tail_matches() {
        // the fired tail immediately becomes the body of the next match
        let mut tester = GlyphTester::new();
        tester
            .add_rule(glyph_rule(&[], &[Literal(1)], &[Literal(2)], &[7]))
            .unwrap();
        tester
            .add_rule(glyph_rule(&[Literal(2)], &[Literal(5)], &[], &[8]))
            .unwrap();
        detached_resync(&mut tester);
        // 1 fires with tail 2; the emitted 2 stays buffered and then
        // heads the second rule when 5 arrives
        assert_eq!(run(&mut tester, &[1, 2, 5]), vec![7, 2, 8]);
    }

    #[test]
    fn removing_a_rule_reindexes_the_rest() {
        let mut tester = GlyphTester::new();
        tester
            .add_rule(glyph_rule(&[], &[Literal(1), Literal(2)], &[], &[3]))
            .unwrap();
        tester
            .add_rule(glyph_rule(&[], &[Literal(4), Literal(5)], &[], &[6]))
            .unwrap();
        detached_resync(&mut tester);
        assert_eq!(run(&mut tester, &[1, 2, 4, 5]), vec![3, 6]);

        tester.remove_rule(0).unwrap();
        assert!(tester.needs_resync());
        detached_resync(&mut tester);
        assert_eq!(tester.num_rules(), 1);
        assert_eq!(run(&mut tester, &[1, 2, 4, 5]), vec![1, 2, 6]);
    }

    #[test]
    fn inactive_conditions_pass_input_through() {
        let mut tester = GlyphTester::new();
        tester
            .add_rule(
                GlyphRewriteRule::new(
                    3, // condition index, evaluated false below
                    &[],
                    &[Literal(1), Literal(2)],
                    &[],
                    &[9],
                )
                .unwrap(),
            )
            .unwrap();
        let mut compiler = DfaCompiler::new();
        tester
            .inner
            .resync_with(&mut compiler, |_| Ok(false), |_| None)
            .unwrap();
        assert_eq!(run(&mut tester, &[1, 2]), vec![1, 2]);
    }

    #[test]
    #[should_panic(expected = "feed outside a sequence")]
    fn feed_outside_sequence_panics() {
        let mut tester = GlyphTester::new();
        tester.feed(1, |_| {});
    }

    #[test]
    #[should_panic(expected = "requires a resync")]
    fn begin_without_resync_panics() {
        let mut tester = GlyphTester::new();
        tester
            .add_rule(glyph_rule(&[], &[Literal(1)], &[], &[2]))
            .unwrap();
        tester.begin_sequence();
    }

    #[test]
    fn utf8_rules_work_over_chars() {
        let mut tester = Utf8Tester::new();
        tester
            .add_rule(
                Utf8RewriteRule::new(
                    CONDITION_NONE,
                    &[],
                    &[Literal('f'), Literal('i')],
                    &[],
                    &['ﬁ'],
                )
                .unwrap(),
            )
            .unwrap();
        let mut compiler = DfaCompiler::new();
        tester
            .inner
            .resync_with(&mut compiler, |_| Ok(true), |_| None)
            .unwrap();
        let mut output = String::new();
        tester.begin_sequence();
        for ch in "first fish".chars() {
            tester.feed(ch, |out| output.push(out));
        }
        tester.finish_sequence(|out| output.push(out));
        assert_eq!(output, "ﬁrst ﬁsh");
    }
}
