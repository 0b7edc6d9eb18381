//! Switch and rewrite-rule conditions.
//!
//! A condition is a compiled byte stream. The top three bits of each node
//! select its kind: OR chain, AND chain, a full comparison (operator and
//! right-operand kind packed in the head byte, then the left setting index
//! and the right operand), or one of four compact comparison forms for
//! `setting CMP small_const` with the constant packed in the head byte.
//!
//! The textual grammar compiled by [`compile`]:
//!
//! ```text
//! EXPR := ( EXPR ) | TERM | EXPR (|| EXPR)+ | EXPR (&& EXPR)+
//! TERM := #N OP RHS
//! RHS  := #N | 0..=254
//! OP   := == | != | < | > | <= | >=
//! ```
//!
//! OR and AND chains collapse into single nodes; mixing the two without
//! parentheses is rejected.

use crate::error::{Error, Result};

const KIND_OR: u8 = 0b000;
const KIND_AND: u8 = 0b001;
const KIND_CMP: u8 = 0b010;
const KIND_COMPACT_EQ: u8 = 0b011;
const KIND_COMPACT_NE: u8 = 0b100;
const KIND_COMPACT_LT: u8 = 0b101;
const KIND_COMPACT_GT: u8 = 0b110;

const OP_EQ: u8 = 0;
const OP_NE: u8 = 1;
const OP_LT: u8 = 2;
const OP_GT: u8 = 3;
const OP_LE: u8 = 4;
const OP_GE: u8 = 5;

/// Right operand is a setting index rather than a constant.
const CMP_RHS_SETTING: u8 = 0b0001_0000;

/// Longest accepted textual definition.
pub const MAX_CONDITION_TEXT_LEN: usize = 1024;
/// Longest accepted OR/AND chain.
pub const MAX_CHAIN_LEN: usize = 31;
/// Deepest accepted chain nesting; crafted streams must not be able to
/// recurse without bound.
pub const MAX_NESTING_DEPTH: u8 = 128;

/// Evaluates a compiled condition against the current setting values.
pub fn eval(data: &[u8], values: &[u8]) -> Result<bool> {
    let (result, consumed) = eval_node(data, 0, values, 0)?;
    if consumed != data.len() {
        return Err(Error::InvalidCondition);
    }
    Ok(result)
}

fn eval_node(data: &[u8], pos: usize, values: &[u8], depth: u8) -> Result<(bool, usize)> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(Error::InvalidCondition);
    }
    let head = *data.get(pos).ok_or(Error::InvalidCondition)?;
    let kind = head >> 5;
    let low = head & 0b0001_1111;
    match kind {
        KIND_OR | KIND_AND => {
            let terms = low as usize;
            if !(2..=MAX_CHAIN_LEN).contains(&terms) {
                return Err(Error::InvalidCondition);
            }
            let mut next = pos + 1;
            let mut result = kind == KIND_AND;
            for _ in 0..terms {
                let (term, end) = eval_node(data, next, values, depth + 1)?;
                result = if kind == KIND_OR { result || term } else { result && term };
                next = end;
            }
            Ok((result, next))
        }
        KIND_CMP => {
            let op = head & 0b0000_1111;
            let left = *data.get(pos + 1).ok_or(Error::InvalidCondition)?;
            let right = *data.get(pos + 2).ok_or(Error::InvalidCondition)?;
            let left_value = setting_value(values, left)?;
            let right_value = if head & CMP_RHS_SETTING != 0 {
                setting_value(values, right)?
            } else {
                right
            };
            Ok((compare(op, left_value, right_value)?, pos + 3))
        }
        KIND_COMPACT_EQ | KIND_COMPACT_NE | KIND_COMPACT_LT | KIND_COMPACT_GT => {
            let op = match kind {
                KIND_COMPACT_EQ => OP_EQ,
                KIND_COMPACT_NE => OP_NE,
                KIND_COMPACT_LT => OP_LT,
                _ => OP_GT,
            };
            let setting = *data.get(pos + 1).ok_or(Error::InvalidCondition)?;
            let left_value = setting_value(values, setting)?;
            Ok((compare(op, left_value, low)?, pos + 2))
        }
        _ => Err(Error::InvalidCondition),
    }
}

fn setting_value(values: &[u8], setting: u8) -> Result<u8> {
    values
        .get(setting as usize)
        .copied()
        .ok_or(Error::InvalidCondition)
}

fn compare(op: u8, left: u8, right: u8) -> Result<bool> {
    Ok(match op {
        OP_EQ => left == right,
        OP_NE => left != right,
        OP_LT => left < right,
        OP_GT => left > right,
        OP_LE => left <= right,
        OP_GE => left >= right,
        _ => return Err(Error::InvalidCondition),
    })
}

/// Structural validation of a compiled stream: node kinds, chain lengths
/// and setting indices, with the whole buffer consumed exactly.
pub(crate) fn validate_stream(data: &[u8], num_settings: u8) -> Result<()> {
    let end = validate_node(data, 0, num_settings, 0)?;
    if end != data.len() {
        return Err(Error::InvalidCondition);
    }
    Ok(())
}

fn validate_node(data: &[u8], pos: usize, num_settings: u8, depth: u8) -> Result<usize> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(Error::InvalidCondition);
    }
    let head = *data.get(pos).ok_or(Error::InvalidCondition)?;
    let kind = head >> 5;
    let low = head & 0b0001_1111;
    match kind {
        KIND_OR | KIND_AND => {
            let terms = low as usize;
            if !(2..=MAX_CHAIN_LEN).contains(&terms) {
                return Err(Error::InvalidCondition);
            }
            let mut next = pos + 1;
            for _ in 0..terms {
                next = validate_node(data, next, num_settings, depth + 1)?;
            }
            Ok(next)
        }
        KIND_CMP => {
            let op = head & 0b0000_1111;
            if op > OP_GE {
                return Err(Error::InvalidCondition);
            }
            let left = *data.get(pos + 1).ok_or(Error::InvalidCondition)?;
            let right = *data.get(pos + 2).ok_or(Error::InvalidCondition)?;
            if left >= num_settings {
                return Err(Error::InvalidCondition);
            }
            if head & CMP_RHS_SETTING != 0 {
                if right >= num_settings {
                    return Err(Error::InvalidCondition);
                }
            } else if right == 255 {
                return Err(Error::InvalidCondition);
            }
            Ok(pos + 3)
        }
        KIND_COMPACT_EQ | KIND_COMPACT_NE | KIND_COMPACT_LT | KIND_COMPACT_GT => {
            let setting = *data.get(pos + 1).ok_or(Error::InvalidCondition)?;
            if setting >= num_settings {
                return Err(Error::InvalidCondition);
            }
            Ok(pos + 2)
        }
        _ => Err(Error::InvalidCondition),
    }
}

/// Invokes `mark` for every setting index a compiled condition reads.
pub(crate) fn mark_settings(data: &[u8], mark: &mut impl FnMut(u8)) {
    let _ = mark_node(data, 0, mark, 0);
}

fn mark_node(data: &[u8], pos: usize, mark: &mut impl FnMut(u8), depth: u8) -> Option<usize> {
    if depth >= MAX_NESTING_DEPTH {
        return None;
    }
    let head = *data.get(pos)?;
    let kind = head >> 5;
    match kind {
        KIND_OR | KIND_AND => {
            let mut next = pos + 1;
            for _ in 0..(head & 0b0001_1111) {
                next = mark_node(data, next, mark, depth + 1)?;
            }
            Some(next)
        }
        KIND_CMP => {
            mark(*data.get(pos + 1)?);
            if head & CMP_RHS_SETTING != 0 {
                mark(*data.get(pos + 2)?);
            }
            Some(pos + 3)
        }
        _ => {
            mark(*data.get(pos + 1)?);
            Some(pos + 2)
        }
    }
}

// --- textual grammar ---

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    Setting(u8),
    Const(u8),
    Op(u8),
    Or,
    And,
}

enum Expr {
    Or(Vec<Expr>),
    And(Vec<Expr>),
    Cmp { left: u8, op: u8, rhs_setting: bool, right: u8 },
}

/// Compiles a textual condition definition into its byte-stream form.
pub fn compile(text: &str) -> Result<Vec<u8>> {
    if text.len() > MAX_CONDITION_TEXT_LEN {
        return Err(Error::ConditionSyntax("definition too long"));
    }
    let tokens = tokenize(text)?;
    let mut pos = 0usize;
    let expr = parse_expr(&tokens, &mut pos)?;
    if pos != tokens.len() {
        return Err(Error::ConditionSyntax("unexpected trailing input"));
    }
    let mut data = Vec::new();
    serialize(&expr, &mut data);
    Ok(data)
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0usize;
    while pos < bytes.len() {
        let byte = bytes[pos];
        match byte {
            b' ' | b'\t' => pos += 1,
            b'(' => {
                tokens.push(Token::Open);
                pos += 1;
            }
            b')' => {
                tokens.push(Token::Close);
                pos += 1;
            }
            b'#' => {
                pos += 1;
                let value = lex_number(bytes, &mut pos)?;
                tokens.push(Token::Setting(value));
            }
            b'0'..=b'9' => {
                let value = lex_number(bytes, &mut pos)?;
                tokens.push(Token::Const(value));
            }
            b'=' => {
                if bytes.get(pos + 1) != Some(&b'=') {
                    return Err(Error::ConditionSyntax("expected '=='"));
                }
                tokens.push(Token::Op(OP_EQ));
                pos += 2;
            }
            b'!' => {
                if bytes.get(pos + 1) != Some(&b'=') {
                    return Err(Error::ConditionSyntax("expected '!='"));
                }
                tokens.push(Token::Op(OP_NE));
                pos += 2;
            }
            b'<' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    tokens.push(Token::Op(OP_LE));
                    pos += 2;
                } else {
                    tokens.push(Token::Op(OP_LT));
                    pos += 1;
                }
            }
            b'>' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    tokens.push(Token::Op(OP_GE));
                    pos += 2;
                } else {
                    tokens.push(Token::Op(OP_GT));
                    pos += 1;
                }
            }
            b'|' => {
                if bytes.get(pos + 1) != Some(&b'|') {
                    return Err(Error::ConditionSyntax("expected '||'"));
                }
                tokens.push(Token::Or);
                pos += 2;
            }
            b'&' => {
                if bytes.get(pos + 1) != Some(&b'&') {
                    return Err(Error::ConditionSyntax("expected '&&'"));
                }
                tokens.push(Token::And);
                pos += 2;
            }
            _ => return Err(Error::ConditionSyntax("unexpected character")),
        }
    }
    Ok(tokens)
}

fn lex_number(bytes: &[u8], pos: &mut usize) -> Result<u8> {
    let start = *pos;
    let mut value = 0u32;
    while let Some(digit) = bytes.get(*pos).filter(|byte| byte.is_ascii_digit()) {
        value = value * 10 + (digit - b'0') as u32;
        if value > 254 {
            return Err(Error::ConditionSyntax("number out of range"));
        }
        *pos += 1;
    }
    if *pos == start {
        return Err(Error::ConditionSyntax("expected a number"));
    }
    Ok(value as u8)
}

fn parse_expr(tokens: &[Token], pos: &mut usize) -> Result<Expr> {
    let first = parse_operand(tokens, pos)?;
    let chain_token = match tokens.get(*pos) {
        Some(Token::Or) => Token::Or,
        Some(Token::And) => Token::And,
        _ => return Ok(first),
    };
    let mut operands = vec![first];
    while let Some(&token) = tokens.get(*pos) {
        if token != Token::Or && token != Token::And {
            break;
        }
        if token != chain_token {
            return Err(Error::ConditionSyntax(
                "mixed '||' and '&&' require parentheses",
            ));
        }
        *pos += 1;
        operands.push(parse_operand(tokens, pos)?);
        if operands.len() > MAX_CHAIN_LEN {
            return Err(Error::ConditionSyntax("chain too long"));
        }
    }
    Ok(match chain_token {
        Token::Or => Expr::Or(operands),
        _ => Expr::And(operands),
    })
}

fn parse_operand(tokens: &[Token], pos: &mut usize) -> Result<Expr> {
    match tokens.get(*pos) {
        Some(Token::Open) => {
            *pos += 1;
            let inner = parse_expr(tokens, pos)?;
            if tokens.get(*pos) != Some(&Token::Close) {
                return Err(Error::ConditionSyntax("expected ')'"));
            }
            *pos += 1;
            Ok(inner)
        }
        Some(&Token::Setting(left)) => {
            *pos += 1;
            let op = match tokens.get(*pos) {
                Some(&Token::Op(op)) => op,
                _ => return Err(Error::ConditionSyntax("expected a comparison operator")),
            };
            *pos += 1;
            let (rhs_setting, right) = match tokens.get(*pos) {
                Some(&Token::Setting(setting)) => (true, setting),
                Some(&Token::Const(value)) => (false, value),
                _ => return Err(Error::ConditionSyntax("expected '#N' or a constant")),
            };
            *pos += 1;
            Ok(Expr::Cmp { left, op, rhs_setting, right })
        }
        _ => Err(Error::ConditionSyntax("expected '(' or '#N'")),
    }
}

fn serialize(expr: &Expr, out: &mut Vec<u8>) {
    match expr {
        Expr::Or(terms) | Expr::And(terms) => {
            let kind = if matches!(expr, Expr::Or(_)) { KIND_OR } else { KIND_AND };
            out.push((kind << 5) | terms.len() as u8);
            for term in terms {
                serialize(term, out);
            }
        }
        &Expr::Cmp { left, op, rhs_setting, right } => {
            let compact_kind = match op {
                OP_EQ => Some(KIND_COMPACT_EQ),
                OP_NE => Some(KIND_COMPACT_NE),
                OP_LT => Some(KIND_COMPACT_LT),
                OP_GT => Some(KIND_COMPACT_GT),
                _ => None,
            };
            match compact_kind {
                Some(kind) if !rhs_setting && right < 32 => {
                    out.push((kind << 5) | right);
                    out.push(left);
                }
                _ => {
                    let mut head = KIND_CMP << 5 | op;
                    if rhs_setting {
                        head |= CMP_RHS_SETTING;
                    }
                    out.push(head);
                    out.push(left);
                    out.push(right);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_comparison() {
        // `#0 == 2` fits the two-byte compact form
        let data = compile("#0 == 2").unwrap();
        assert_eq!(data, vec![(KIND_COMPACT_EQ << 5) | 2, 0]);
        assert!(!eval(&data, &[0]).unwrap());
        assert!(eval(&data, &[2]).unwrap());
    }

    #[test]
    fn full_comparison_forms() {
        // constants >= 32 and ordered operators need the full form
        let data = compile("#1 <= 40").unwrap();
        assert_eq!(data, vec![(KIND_CMP << 5) | OP_LE, 1, 40]);
        assert!(eval(&data, &[0, 40]).unwrap());
        assert!(!eval(&data, &[0, 41]).unwrap());

        let data = compile("#0 != #2").unwrap();
        assert_eq!(data, vec![(KIND_CMP << 5) | CMP_RHS_SETTING | OP_NE, 0, 2]);
        assert!(eval(&data, &[1, 0, 3]).unwrap());
        assert!(!eval(&data, &[3, 0, 3]).unwrap());
    }

    #[test]
    fn chains_and_parens() {
        let data = compile("#0 == 1 || #1 == 1 || #2 == 1").unwrap();
        assert_eq!(data[0], 3); // OR of three terms
        assert!(eval(&data, &[0, 1, 0]).unwrap());
        assert!(!eval(&data, &[0, 0, 0]).unwrap());

        let data = compile("(#0 == 1 || #1 == 1) && #2 > 0").unwrap();
        assert!(eval(&data, &[1, 0, 2]).unwrap());
        assert!(!eval(&data, &[1, 0, 0]).unwrap());
        assert!(!eval(&data, &[0, 0, 2]).unwrap());
    }

    #[test]
    fn mixed_chain_requires_parens() {
        assert_eq!(
            compile("#0 == 1 || #1 == 1 && #2 == 1"),
            Err(Error::ConditionSyntax("mixed '||' and '&&' require parentheses")),
        );
    }

    #[test]
    fn syntax_errors() {
        assert!(compile("").is_err());
        assert!(compile("#0 ==").is_err());
        assert!(compile("#0 = 1").is_err());
        assert!(compile("(#0 == 1").is_err());
        assert!(compile("#999 == 1").is_err());
        assert!(compile("#0 == 1 extra").is_err());
    }

    #[test]
    fn chain_length_limit() {
        let chain = |terms: usize| {
            (0..terms)
                .map(|nth| format!("#0 == {}", nth % 2))
                .collect::<Vec<_>>()
                .join(" || ")
        };
        let data = compile(&chain(MAX_CHAIN_LEN)).unwrap();
        assert_eq!(data[0] & 0b0001_1111, MAX_CHAIN_LEN as u8);
        assert_eq!(
            compile(&chain(MAX_CHAIN_LEN + 1)),
            Err(Error::ConditionSyntax("chain too long")),
        );
    }

    #[test]
    fn deep_nesting_evaluates() {
        let data = compile("((((#0 == 1))) && (#1 == 0 || (#1 == 2)))").unwrap();
        assert!(eval(&data, &[1, 0]).unwrap());
        assert!(eval(&data, &[1, 2]).unwrap());
        assert!(!eval(&data, &[1, 1]).unwrap());
        assert!(!eval(&data, &[0, 0]).unwrap());
    }

    #[test]
    fn crafted_deep_nesting_is_rejected() {
        // 150 left-nested AND(2) nodes, then the 151 leaves
        let mut data = vec![(KIND_AND << 5) | 2; 150];
        for _ in 0..151 {
            data.push((KIND_COMPACT_EQ << 5) | 1);
            data.push(0);
        }
        assert_eq!(validate_stream(&data, 1), Err(Error::InvalidCondition));
        assert_eq!(eval(&data, &[0]), Err(Error::InvalidCondition));
    }

    #[test]
    fn definition_length_limit() {
        let long = "#0 == 1 ".repeat(200);
        assert_eq!(
            compile(&long),
            Err(Error::ConditionSyntax("definition too long")),
        );
    }

    #[test]
    fn validate_checks_setting_indices() {
        let data = compile("#3 == 1").unwrap();
        assert!(validate_stream(&data, 4).is_ok());
        assert_eq!(validate_stream(&data, 3), Err(Error::InvalidCondition));
    }

    #[test]
    fn marks_referenced_settings() {
        let data = compile("(#0 == 1 || #4 == #2) && #7 < 9").unwrap();
        let mut marked = Vec::new();
        mark_settings(&data, &mut |setting| marked.push(setting));
        marked.sort_unstable();
        assert_eq!(marked, vec![0, 2, 4, 7]);
    }
}
