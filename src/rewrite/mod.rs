//! Rewrite rules: wire format, shared decision trees and the streaming
//! testers.
//!
//! Rules come in two structurally identical flavors, one over glyph
//! indices and one over code points. The shared machinery is generic over
//! [`RewriteElement`], which the two element widths implement.

pub mod dfa;
pub(crate) mod pool;
pub mod rule;
pub mod tester;

use crate::GLYPH_ZILCH;

/// Element type of a rewrite stream: `u16` glyph indices or `u32` code
/// points.
pub trait RewriteElement:
    Copy + Ord + Eq + core::fmt::Debug + core::hash::Hash + 'static
{
    /// Serialized width in bytes.
    const WIDTH: usize;
    const MIN: Self;
    const MAX: Self;

    fn read(data: &[u8], offset: usize) -> Option<Self>;
    fn write(self, out: &mut Vec<u8>);
    /// Last element of a range starting here with the given length.
    fn range_last(self, len: u8) -> Option<Self>;
    fn succ(self) -> Option<Self>;
    fn pred(self) -> Option<Self>;
    /// Whether the element is structurally valid on its own.
    fn in_domain(self) -> bool;
    /// Whether the element is silently dropped from rewrite output.
    fn is_zilch(self) -> bool;
}

impl RewriteElement for u16 {
    const WIDTH: usize = 2;
    const MIN: Self = 0;
    const MAX: Self = u16::MAX;

    fn read(data: &[u8], offset: usize) -> Option<Self> {
        let raw = data.get(offset..offset + 2)?;
        Some(u16::from_le_bytes([raw[0], raw[1]]))
    }

    fn write(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn range_last(self, len: u8) -> Option<Self> {
        if len == 0 {
            return None;
        }
        self.checked_add(len as u16 - 1)
    }

    fn succ(self) -> Option<Self> {
        self.checked_add(1)
    }

    fn pred(self) -> Option<Self> {
        self.checked_sub(1)
    }

    fn in_domain(self) -> bool {
        true
    }

    fn is_zilch(self) -> bool {
        self == GLYPH_ZILCH
    }
}

impl RewriteElement for u32 {
    const WIDTH: usize = 4;
    const MIN: Self = 0;
    const MAX: Self = 0x10FFFF;

    fn read(data: &[u8], offset: usize) -> Option<Self> {
        let raw = data.get(offset..offset + 4)?;
        Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn write(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn range_last(self, len: u8) -> Option<Self> {
        if len == 0 {
            return None;
        }
        let last = self.checked_add(len as u32 - 1)?;
        (last <= Self::MAX).then_some(last)
    }

    fn succ(self) -> Option<Self> {
        let next = self.checked_add(1)?;
        (next <= Self::MAX).then_some(next)
    }

    fn pred(self) -> Option<Self> {
        self.checked_sub(1)
    }

    fn in_domain(self) -> bool {
        self <= Self::MAX
    }

    fn is_zilch(self) -> bool {
        false
    }
}
