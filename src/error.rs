//! Crate error taxonomy.

use thiserror::Error;

/// Cumulative error type for font parsing, building and rewriting.
///
/// Malformed input and limit overruns are reported through distinct
/// variants so callers can react specifically; caller-side misuse of the
/// streaming APIs (feeding outside a sequence, invalid capacities) panics
/// instead of going through here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("file size exceeds limit")]
    FileSizeExceedsLimit,
    #[error("premature end of file")]
    PrematureEnd,
    #[error("invalid compressed payload")]
    InvalidPayload,
    #[error("invalid {0}")]
    InvalidSection(&'static str),
    #[error("invalid glyph mask data")]
    InvalidMaskData,
    #[error("invalid rewrite condition")]
    InvalidCondition,
    #[error("condition syntax: {0}")]
    ConditionSyntax(&'static str),
    #[error("invalid rewrite rule")]
    InvalidRewriteRule,
    #[error("rewrite compiler hit internal limits")]
    CompilerHitLimits,
    #[error("too many rewrite rules")]
    TesterTooManyRules,
    #[error("can't build font with no glyphs")]
    NoGlyphs,
    #[error("font data exceeds maximum size")]
    DataExceedsMax,
    #[error("duplicated glyph name")]
    DuplicatedGlyphName,
    #[error("glyph exceeds font ascent")]
    GlyphExceedsAscent,
    #[error("glyph exceeds font descent")]
    GlyphExceedsDescent,
    #[error("monospace width violated")]
    MonoWidthViolated,
    #[error("can't map code points before space")]
    CodePointBeforeSpace,
    #[error("glyph not found")]
    GlyphNotFound,
    #[error("{0} exceed limit")]
    LimitExceeded(&'static str),
    #[error("invalid {0}")]
    InvalidArgument(&'static str),
    #[error("couldn't generate font id with enough entropy")]
    FontIdEntropy,
    #[error("entropy source failed")]
    EntropySource,
    #[error("edit data doesn't match font id")]
    EditDataIdMismatch,
}

pub type Result<T> = std::result::Result<T, Error>;
