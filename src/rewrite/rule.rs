//! Rewrite rule wire format and the streaming element scanner.
//!
//! On the wire a rule is: condition byte, head/body/tail block lengths,
//! output length, the output sequence, then the *fragments*. A fragment is
//! a control byte packing two nibbles (`sets << 4 | literals`) followed by
//! that many set indices and element literals. A block is a contiguous run
//! of fragments whose nibble totals sum exactly to the block length; an
//! empty block is a single zero control byte.

use core::marker::PhantomData;

use crate::error::{Error, Result};
use crate::rewrite::RewriteElement;

/// One element of a rule's input pattern: a concrete element or a
/// reference to a rewrite set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RulePattern<T> {
    Literal(T),
    Set(u8),
}

/// Which block of a rule an element belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleBlock {
    Head,
    Body,
    Tail,
}

const HEADER_SIZE: usize = 5;

/// Pull iterator over the head, body and tail elements of a serialized
/// rule, validating structure as it goes.
pub struct RuleScanner<'a, T: RewriteElement> {
    data: &'a [u8],
    pos: usize,
    lens: [u8; 3],
    block: usize,
    block_left: u8,
    block_started: bool,
    frag_sets: u8,
    frag_literals: u8,
    _elem: PhantomData<T>,
}

impl<'a, T: RewriteElement> RuleScanner<'a, T> {
    /// Creates a scanner, validating the rule header.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::InvalidRewriteRule);
        }
        let head_len = data[1];
        let body_len = data[2];
        let tail_len = data[3];
        let out_len = data[4];
        if body_len == 0 || out_len > body_len {
            return Err(Error::InvalidRewriteRule);
        }
        if head_len as u16 + body_len as u16 + tail_len as u16 > 255 {
            return Err(Error::InvalidRewriteRule);
        }
        let pos = HEADER_SIZE + out_len as usize * T::WIDTH;
        if pos > data.len() {
            return Err(Error::InvalidRewriteRule);
        }
        Ok(Self {
            data,
            pos,
            lens: [head_len, body_len, tail_len],
            block: 0,
            block_left: head_len,
            block_started: false,
            frag_sets: 0,
            frag_literals: 0,
            _elem: PhantomData,
        })
    }

    fn read_u8(&mut self) -> Result<u8> {
        let byte = *self.data.get(self.pos).ok_or(Error::InvalidRewriteRule)?;
        self.pos += 1;
        Ok(byte)
    }

    /// Yields the next element, or `None` once head, body and tail are
    /// exhausted and the rule data ends exactly where it should.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<(RuleBlock, RulePattern<T>)>> {
        loop {
            if self.frag_sets > 0 {
                self.frag_sets -= 1;
                self.block_left -= 1;
                let set = self.read_u8()?;
                return Ok(Some((self.current_block(), RulePattern::Set(set))));
            }
            if self.frag_literals > 0 {
                self.frag_literals -= 1;
                self.block_left -= 1;
                let elem =
                    T::read(self.data, self.pos).ok_or(Error::InvalidRewriteRule)?;
                self.pos += T::WIDTH;
                if !elem.in_domain() {
                    return Err(Error::InvalidRewriteRule);
                }
                return Ok(Some((self.current_block(), RulePattern::Literal(elem))));
            }
            if self.block_left == 0 {
                if !self.block_started && self.lens[self.block] == 0 {
                    // empty block: a lone zero control byte
                    if self.read_u8()? != 0 {
                        return Err(Error::InvalidRewriteRule);
                    }
                }
                self.block += 1;
                self.block_started = false;
                if self.block == 3 {
                    if self.pos != self.data.len() {
                        return Err(Error::InvalidRewriteRule);
                    }
                    return Ok(None);
                }
                self.block_left = self.lens[self.block];
                continue;
            }
            // next fragment of the current block
            self.block_started = true;
            let control = self.read_u8()?;
            let sets = control >> 4;
            let literals = control & 0x0F;
            if sets + literals == 0 || sets + literals > self.block_left {
                return Err(Error::InvalidRewriteRule);
            }
            self.frag_sets = sets;
            self.frag_literals = literals;
        }
    }

    fn current_block(&self) -> RuleBlock {
        match self.block {
            0 => RuleBlock::Head,
            1 => RuleBlock::Body,
            _ => RuleBlock::Tail,
        }
    }
}

pub(crate) fn rule_condition(data: &[u8]) -> u8 {
    data.first().copied().unwrap_or(0xFF)
}

pub(crate) fn rule_head_len(data: &[u8]) -> u8 {
    data.get(1).copied().unwrap_or(0)
}

pub(crate) fn rule_body_len(data: &[u8]) -> u8 {
    data.get(2).copied().unwrap_or(0)
}

pub(crate) fn rule_tail_len(data: &[u8]) -> u8 {
    data.get(3).copied().unwrap_or(0)
}

pub(crate) fn rule_out_len(data: &[u8]) -> u8 {
    data.get(4).copied().unwrap_or(0)
}

pub(crate) fn rule_output<T: RewriteElement>(data: &[u8], nth: u8) -> Option<T> {
    if nth >= rule_out_len(data) {
        return None;
    }
    T::read(data, HEADER_SIZE + nth as usize * T::WIDTH)
}

/// Full structural validation of a serialized rule against the font's
/// condition and set counts. `check` vets individual literals.
pub(crate) fn validate_rule<T: RewriteElement>(
    data: &[u8],
    num_conditions: u8,
    num_sets: u8,
    check: impl Fn(T) -> bool,
) -> Result<()> {
    let condition = rule_condition(data);
    if condition != 0xFF && condition >= num_conditions {
        return Err(Error::InvalidRewriteRule);
    }
    for nth in 0..rule_out_len(data) {
        let elem: T = rule_output(data, nth).ok_or(Error::InvalidRewriteRule)?;
        if !elem.in_domain() {
            return Err(Error::InvalidRewriteRule);
        }
    }
    let mut scanner = RuleScanner::<T>::new(data)?;
    while let Some((_, pattern)) = scanner.next()? {
        match pattern {
            RulePattern::Set(set) => {
                if set >= num_sets {
                    return Err(Error::InvalidRewriteRule);
                }
            }
            RulePattern::Literal(elem) => {
                if !check(elem) {
                    return Err(Error::InvalidRewriteRule);
                }
            }
        }
    }
    Ok(())
}

fn encode_rule<T: RewriteElement>(
    condition: u8,
    head: &[RulePattern<T>],
    body: &[RulePattern<T>],
    tail: &[RulePattern<T>],
    output: &[T],
) -> Result<Vec<u8>> {
    if body.is_empty() || output.len() > body.len() {
        return Err(Error::InvalidRewriteRule);
    }
    if head.len() + body.len() + tail.len() > 255 {
        return Err(Error::InvalidRewriteRule);
    }
    let mut data = Vec::with_capacity(HEADER_SIZE + 2 * (head.len() + body.len() + tail.len()));
    data.push(condition);
    data.push(head.len() as u8);
    data.push(body.len() as u8);
    data.push(tail.len() as u8);
    data.push(output.len() as u8);
    for &elem in output {
        if !elem.in_domain() {
            return Err(Error::InvalidRewriteRule);
        }
        elem.write(&mut data);
    }
    for block in [head, body, tail] {
        encode_block(&mut data, block)?;
    }
    Ok(data)
}

fn encode_block<T: RewriteElement>(
    data: &mut Vec<u8>,
    block: &[RulePattern<T>],
) -> Result<()> {
    if block.is_empty() {
        data.push(0);
        return Ok(());
    }
    let mut rest = block;
    while !rest.is_empty() {
        let sets = rest
            .iter()
            .take_while(|elem| matches!(elem, RulePattern::Set(_)))
            .take(15)
            .count();
        let literals = rest[sets..]
            .iter()
            .take_while(|elem| matches!(elem, RulePattern::Literal(_)))
            .take(15)
            .count();
        data.push(((sets as u8) << 4) | literals as u8);
        for pattern in &rest[..sets + literals] {
            match *pattern {
                RulePattern::Set(set) => data.push(set),
                RulePattern::Literal(elem) => {
                    if !elem.in_domain() {
                        return Err(Error::InvalidRewriteRule);
                    }
                    elem.write(data);
                }
            }
        }
        rest = &rest[sets + literals..];
    }
    Ok(())
}

macro_rules! impl_rule_accessors {
    ($rule:ident, $elem:ty) => {
        impl $rule {
            /// Raw serialized bytes.
            pub fn data(&self) -> &[u8] {
                &self.data
            }

            /// Condition index, `0xFF` meaning "always applies".
            pub fn condition(&self) -> u8 {
                rule_condition(&self.data)
            }

            pub fn head_len(&self) -> u8 {
                rule_head_len(&self.data)
            }

            pub fn body_len(&self) -> u8 {
                rule_body_len(&self.data)
            }

            pub fn tail_len(&self) -> u8 {
                rule_tail_len(&self.data)
            }

            /// Total input pattern length (head + body + tail).
            pub fn pattern_len(&self) -> u16 {
                self.head_len() as u16 + self.body_len() as u16 + self.tail_len() as u16
            }

            pub fn out_len(&self) -> u8 {
                rule_out_len(&self.data)
            }

            pub fn output(&self, nth: u8) -> Option<$elem> {
                rule_output(&self.data, nth)
            }

            /// Streaming scanner over the rule's input elements.
            pub fn scanner(&self) -> Result<RuleScanner<'_, $elem>> {
                RuleScanner::new(&self.data)
            }
        }
    };
}

/// A rewrite rule over glyph indices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlyphRewriteRule {
    pub(crate) data: Vec<u8>,
}

impl_rule_accessors!(GlyphRewriteRule, u16);

impl GlyphRewriteRule {
    /// Builds a rule from its parts. The body must be non-empty, the
    /// output no longer than the body, and the whole pattern at most 255
    /// elements.
    pub fn new(
        condition: u8,
        head: &[RulePattern<u16>],
        body: &[RulePattern<u16>],
        tail: &[RulePattern<u16>],
        output: &[u16],
    ) -> Result<Self> {
        let data = encode_rule(condition, head, body, tail, output)?;
        Ok(Self { data })
    }

    /// Wraps serialized rule data, validating its structure.
    pub fn from_data(data: Vec<u8>) -> Result<Self> {
        validate_rule::<u16>(&data, 0xFF, 0xFF, |_| true)?;
        Ok(Self { data })
    }
}

/// A rewrite rule over code points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Utf8RewriteRule {
    pub(crate) data: Vec<u8>,
}

impl_rule_accessors!(Utf8RewriteRule, u32);

impl Utf8RewriteRule {
    /// Builds a rule from its parts, with code points given as chars.
    pub fn new(
        condition: u8,
        head: &[RulePattern<char>],
        body: &[RulePattern<char>],
        tail: &[RulePattern<char>],
        output: &[char],
    ) -> Result<Self> {
        let head: Vec<RulePattern<u32>> = head.iter().map(widen).collect();
        let body: Vec<RulePattern<u32>> = body.iter().map(widen).collect();
        let tail: Vec<RulePattern<u32>> = tail.iter().map(widen).collect();
        let output: Vec<u32> = output.iter().map(|&ch| ch as u32).collect();
        let data = encode_rule(condition, &head, &body, &tail, &output)?;
        Ok(Self { data })
    }

    /// Wraps serialized rule data, validating its structure.
    pub fn from_data(data: Vec<u8>) -> Result<Self> {
        validate_rule::<u32>(&data, 0xFF, 0xFF, |_| true)?;
        Ok(Self { data })
    }
}

fn widen(pattern: &RulePattern<char>) -> RulePattern<u32> {
    match *pattern {
        RulePattern::Literal(ch) => RulePattern::Literal(ch as u32),
        RulePattern::Set(set) => RulePattern::Set(set),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scanner_round_trip() {
        let rule = GlyphRewriteRule::new(
            0xFF,
            &[RulePattern::Literal(7)],
            &[RulePattern::Set(2), RulePattern::Literal(8), RulePattern::Literal(9)],
            &[],
            &[3],
        )
        .unwrap();
        assert_eq!(rule.head_len(), 1);
        assert_eq!(rule.body_len(), 3);
        assert_eq!(rule.tail_len(), 0);
        assert_eq!(rule.out_len(), 1);
        assert_eq!(rule.output(0), Some(3));
        assert_eq!(rule.pattern_len(), 4);

        let mut scanner = rule.scanner().unwrap();
        let mut elems = Vec::new();
        while let Some(elem) = scanner.next().unwrap() {
            elems.push(elem);
        }
        assert_eq!(
            elems,
            vec![
                (RuleBlock::Head, RulePattern::Literal(7)),
                (RuleBlock::Body, RulePattern::Set(2)),
                (RuleBlock::Body, RulePattern::Literal(8)),
                (RuleBlock::Body, RulePattern::Literal(9)),
            ],
        );
    }

    #[test]
    fn zero_body_is_rejected() {
        assert_eq!(
            GlyphRewriteRule::new(0xFF, &[], &[], &[], &[]),
            Err(Error::InvalidRewriteRule),
        );
    }

    #[test]
    fn output_longer_than_body_is_rejected() {
        assert_eq!(
            GlyphRewriteRule::new(0xFF, &[], &[RulePattern::Literal(1)], &[], &[2, 3]),
            Err(Error::InvalidRewriteRule),
        );
    }

    #[test]
    fn truncated_data_is_rejected() {
        let rule = GlyphRewriteRule::new(
            0xFF,
            &[],
            &[RulePattern::Literal(1), RulePattern::Literal(2)],
            &[],
            &[9],
        )
        .unwrap();
        let mut data = rule.data().to_vec();
        data.pop();
        assert_eq!(GlyphRewriteRule::from_data(data), Err(Error::InvalidRewriteRule));
    }

    #[test]
    fn stalling_fragment_is_rejected() {
        // head 0, body 1, tail 0, no output; body block starts with a
        // zero control byte, which can't make progress
        let data = vec![0xFF, 0, 1, 0, 0, 0x00, 0x00, 0x00];
        assert_eq!(GlyphRewriteRule::from_data(data), Err(Error::InvalidRewriteRule));
    }

    #[test]
    fn long_blocks_split_into_fragments() {
        let body: Vec<RulePattern<u16>> =
            (0..40).map(|glyph| RulePattern::Literal(glyph)).collect();
        let rule = GlyphRewriteRule::new(0xFF, &[], &body, &[], &[0]).unwrap();
        let mut scanner = rule.scanner().unwrap();
        let mut count = 0;
        while let Some((block, _)) = scanner.next().unwrap() {
            assert_eq!(block, RuleBlock::Body);
            count += 1;
        }
        assert_eq!(count, 40);
    }
}
