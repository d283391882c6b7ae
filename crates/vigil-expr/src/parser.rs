//! Expression parser using a pest PEG grammar plus a Pratt parser for
//! operator precedence.
//!
//! Precedence, lowest first: `or`, `and`, equality, relational and `in`,
//! additive, multiplicative, prefix `!`/`not`/`-`, postfix `.field`/`[index]`.

use pest::iterators::Pair;
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest::Parser;
use pest_derive::Parser;

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::{ExprError, Result};
use crate::value::Value;

#[derive(Parser)]
#[grammar = "src/expr.pest"]
struct ExprParser;

/// Longest source [`parse`] accepts, in bytes.
pub const MAX_EXPR_LEN: usize = 4096;

/// Deepest combined nesting of brackets and prefix operators [`parse`]
/// accepts. Both recurse while parsing.
pub const MAX_NESTING: usize = 64;

/// Parses an expression source string into an AST.
///
/// # Examples
///
/// ```
/// use vigil_expr::parse;
///
/// let expr = parse("pointVal > 10 && device.name != 'lab'").unwrap();
/// println!("{expr:?}");
/// ```
pub fn parse(input: &str) -> Result<Expr> {
    if input.len() > MAX_EXPR_LEN {
        return Err(ExprError::Parse(format!(
            "expression is {} bytes, limit is {MAX_EXPR_LEN}",
            input.len()
        )));
    }
    check_nesting(input)?;

    let mut pairs =
        ExprParser::parse(Rule::program, input).map_err(|e| ExprError::Parse(e.to_string()))?;

    let pratt = PrattParser::new()
        .op(Op::infix(Rule::or_op, Assoc::Left))
        .op(Op::infix(Rule::and_op, Assoc::Left))
        .op(Op::infix(Rule::eq_op, Assoc::Left) | Op::infix(Rule::ne_op, Assoc::Left))
        .op(Op::infix(Rule::lt_op, Assoc::Left)
            | Op::infix(Rule::le_op, Assoc::Left)
            | Op::infix(Rule::gt_op, Assoc::Left)
            | Op::infix(Rule::ge_op, Assoc::Left)
            | Op::infix(Rule::in_op, Assoc::Left))
        .op(Op::infix(Rule::add_op, Assoc::Left) | Op::infix(Rule::sub_op, Assoc::Left))
        .op(Op::infix(Rule::mul_op, Assoc::Left)
            | Op::infix(Rule::div_op, Assoc::Left)
            | Op::infix(Rule::mod_op, Assoc::Left))
        .op(Op::prefix(Rule::not_op) | Op::prefix(Rule::neg_op))
        .op(Op::postfix(Rule::field) | Op::postfix(Rule::index));

    // program = { SOI ~ expr ~ EOI }
    let expr_pair = pairs
        .next()
        .and_then(|program| program.into_inner().find(|p| p.as_rule() == Rule::expr))
        .ok_or_else(|| ExprError::Parse("empty expression".into()))?;

    parse_expr(expr_pair, &pratt, 0)
}

fn too_deep() -> ExprError {
    ExprError::Parse(format!("expression nests deeper than {MAX_NESTING} levels"))
}

/// Rejects input whose bracket and prefix-operator nesting exceeds
/// [`MAX_NESTING`] before the recursive grammar sees it.
///
/// The count is an upper bound: a run of prefix operators is only closed by
/// the operand that follows it, so `a - -b` counts two.
fn check_nesting(input: &str) -> Result<()> {
    let bytes = input.as_bytes();
    let mut brackets = 0usize;
    let mut prefix_run = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'"' | b'\'' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b {
                    i += if bytes[i] == b'\\' { 2 } else { 1 };
                }
                prefix_run = 0;
            }
            b'(' | b'[' => brackets += 1,
            b')' | b']' => {
                brackets = brackets.saturating_sub(1);
                prefix_run = 0;
            }
            b'!' if bytes.get(i + 1) != Some(&b'=') => prefix_run += 1,
            b'-' => prefix_run += 1,
            b if b.is_ascii_alphanumeric() || b == b'_' => {
                let start = i;
                while bytes
                    .get(i + 1)
                    .is_some_and(|c| c.is_ascii_alphanumeric() || *c == b'_')
                {
                    i += 1;
                }
                if &input[start..=i] == "not" {
                    prefix_run += 1;
                } else {
                    prefix_run = 0;
                }
            }
            _ => {}
        }
        if brackets + prefix_run > MAX_NESTING {
            return Err(too_deep());
        }
        i += 1;
    }
    Ok(())
}

fn parse_expr(pair: Pair<'_, Rule>, pratt: &PrattParser<Rule>, depth: usize) -> Result<Expr> {
    if depth > MAX_NESTING {
        return Err(too_deep());
    }
    pratt
        .map_primary(|primary| parse_primary(primary, pratt, depth))
        .map_prefix(|op, rhs| {
            let op = match op.as_rule() {
                Rule::not_op => UnaryOp::Not,
                Rule::neg_op => UnaryOp::Neg,
                other => unreachable!("unexpected prefix rule: {other:?}"),
            };
            Ok(Expr::Unary(op, Box::new(rhs?)))
        })
        .map_postfix(|lhs, op| {
            let lhs = Box::new(lhs?);
            match op.as_rule() {
                Rule::field => {
                    let name = op.into_inner().as_str().to_string();
                    Ok(Expr::Field(lhs, name))
                }
                Rule::index => {
                    let inner = op
                        .into_inner()
                        .next()
                        .ok_or_else(|| ExprError::Parse("empty index".into()))?;
                    Ok(Expr::Index(lhs, Box::new(parse_expr(inner, pratt, depth + 1)?)))
                }
                other => unreachable!("unexpected postfix rule: {other:?}"),
            }
        })
        .map_infix(|lhs, op, rhs| {
            let op = match op.as_rule() {
                Rule::or_op => BinaryOp::Or,
                Rule::and_op => BinaryOp::And,
                Rule::eq_op => BinaryOp::Eq,
                Rule::ne_op => BinaryOp::Ne,
                Rule::lt_op => BinaryOp::Lt,
                Rule::le_op => BinaryOp::Le,
                Rule::gt_op => BinaryOp::Gt,
                Rule::ge_op => BinaryOp::Ge,
                Rule::in_op => BinaryOp::In,
                Rule::add_op => BinaryOp::Add,
                Rule::sub_op => BinaryOp::Sub,
                Rule::mul_op => BinaryOp::Mul,
                Rule::div_op => BinaryOp::Div,
                Rule::mod_op => BinaryOp::Mod,
                other => unreachable!("unexpected infix rule: {other:?}"),
            };
            Ok(Expr::Binary(op, Box::new(lhs?), Box::new(rhs?)))
        })
        .parse(pair.into_inner())
}

fn parse_primary(pair: Pair<'_, Rule>, pratt: &PrattParser<Rule>, depth: usize) -> Result<Expr> {
    match pair.as_rule() {
        Rule::expr => parse_expr(pair, pratt, depth + 1),
        Rule::ident => Ok(Expr::Var(pair.as_str().to_string())),
        Rule::int => pair
            .as_str()
            .parse::<i64>()
            .map(|i| Expr::Literal(Value::Int(i)))
            .map_err(|e| ExprError::Parse(format!("invalid integer '{}': {e}", pair.as_str()))),
        Rule::float => pair
            .as_str()
            .parse::<f64>()
            .map(|f| Expr::Literal(Value::Float(f)))
            .map_err(|e| ExprError::Parse(format!("invalid float '{}': {e}", pair.as_str()))),
        Rule::string => {
            let raw = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
            Ok(Expr::Literal(Value::Str(unescape(raw))))
        }
        Rule::bool_lit => Ok(Expr::Literal(Value::Bool(pair.as_str() == "true"))),
        Rule::null_lit => Ok(Expr::Literal(Value::Null)),
        Rule::list => pair
            .into_inner()
            .map(|item| parse_expr(item, pratt, depth + 1))
            .collect::<Result<Vec<_>>>()
            .map(Expr::List),
        other => unreachable!("unexpected primary rule: {other:?}"),
    }
}

/// Resolves backslash escapes. The grammar only admits the escapes handled here.
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
