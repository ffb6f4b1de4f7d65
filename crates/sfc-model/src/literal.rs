//! Restricted literal grammar used by model sources and oracle replies.
//!
//! The grammar covers mappings, sequences (list or tuple brackets), quoted
//! strings, numbers and the `True`/`False`/`None` constants. Any other bare
//! name is rejected, so text handed to [`parse_literal`] or
//! [`parse_assignments`] is only ever *read*, never executed.
//!
//! Values are represented as [`serde_json::Value`] so the typed model layer
//! can deserialize them with serde.

use pest::error::{Error as PestError, LineColLocation};
use pest::iterators::Pair;
use pest::Parser;
use serde_json::{Map, Number, Value};

use crate::error::ModelError;
use crate::Result;

/// Deepest bracket nesting accepted in a literal.
pub const MAX_NESTING: usize = 128;

#[derive(pest_derive::Parser)]
#[grammar = "literal.pest"]
struct LiteralParser;

/// One `name = <literal>` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub name: String,
    pub value: Value,
}

/// Parse text that consists of exactly one literal.
pub fn parse_literal(src: &str) -> Result<Value> {
    check_nesting(src)?;
    let document = LiteralParser::parse(Rule::document, src)
        .map_err(syntax_error)?
        .next()
        .ok_or_else(|| syntax_at(src, 0, "expected a value"))?;
    match document.into_inner().next() {
        Some(value) => build_value(value),
        None => Err(syntax_at(src, 0, "expected a value")),
    }
}

/// Parse a sequence of `name = <literal>` statements.
///
/// Statements may be separated by newlines or `;`. `#` comments and blank
/// lines are ignored.
pub fn parse_assignments(src: &str) -> Result<Vec<Assignment>> {
    check_nesting(src)?;
    let Some(statements) = LiteralParser::parse(Rule::statements, src)
        .map_err(syntax_error)?
        .next()
    else {
        return Ok(Vec::new());
    };

    let mut out = Vec::new();
    for stmt in statements
        .into_inner()
        .filter(|p| p.as_rule() == Rule::assignment)
    {
        let at = stmt.as_span().start();
        let mut parts = stmt.into_inner().filter(|p| p.as_rule() != Rule::eq);
        let (Some(name), Some(value)) = (parts.next(), parts.next()) else {
            return Err(syntax_at(src, at, "incomplete assignment"));
        };
        out.push(Assignment {
            name: name.as_str().to_string(),
            value: build_value(value)?,
        });
    }
    Ok(out)
}

/// Render a value in the grammar accepted by [`parse_literal`].
pub fn render_literal(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

/// Render `name = <literal>` followed by a newline.
///
/// Top-level sequences are written one item per line, which keeps large
/// step and transition tables readable in diffs.
pub fn render_assignment(name: &str, value: &Value) -> String {
    match value {
        Value::Array(items) if !items.is_empty() => {
            let mut out = format!("{name} = [\n");
            for item in items {
                out.push_str("    ");
                write_value(&mut out, item);
                out.push_str(",\n");
            }
            out.push_str("]\n");
            out
        }
        other => format!("{name} = {}\n", render_literal(other)),
    }
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("None"),
        Value::Bool(true) => out.push_str("True"),
        Value::Bool(false) => out.push_str("False"),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_string(out, key);
                out.push_str(": ");
                write_value(out, item);
            }
            out.push('}');
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('\'');
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out.push('\'');
}

fn build_value(pair: Pair<'_, Rule>) -> Result<Value> {
    match pair.as_rule() {
        Rule::mapping => {
            let mut map = Map::new();
            for entry in pair.into_inner() {
                let at = entry.clone();
                let mut kv = entry.into_inner();
                let (Some(key), Some(value)) = (kv.next(), kv.next()) else {
                    return Err(error_at(&at, "incomplete mapping entry"));
                };
                let key = match build_value(key)? {
                    Value::String(s) => s,
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => return Err(error_at(&at, "mapping keys must be scalars")),
                };
                map.insert(key, build_value(value)?);
            }
            Ok(Value::Object(map))
        }
        Rule::list => pair
            .into_inner()
            .map(build_value)
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Rule::tuple => {
            let mut trailing = false;
            let mut items = Vec::new();
            for inner in pair.into_inner() {
                if inner.as_rule() == Rule::trailing_comma {
                    trailing = true;
                } else {
                    items.push(build_value(inner)?);
                }
            }
            // `(x)` is grouping, `(x,)` is a one-element tuple.
            if items.len() == 1 && !trailing {
                return Ok(items.remove(0));
            }
            Ok(Value::Array(items))
        }
        Rule::strings => {
            let mut out = String::new();
            for piece in pair.into_inner() {
                out.push_str(&unquote(&piece));
            }
            Ok(Value::String(out))
        }
        Rule::number => build_number(&pair),
        Rule::constant => Ok(match pair.as_str() {
            "True" | "true" => Value::Bool(true),
            "False" | "false" => Value::Bool(false),
            _ => Value::Null,
        }),
        Rule::name => Err(error_at(
            &pair,
            format!("unsupported name `{}` in literal", pair.as_str()),
        )),
        other => Err(error_at(&pair, format!("unexpected {}", describe_rule(&other)))),
    }
}

fn unquote(piece: &Pair<'_, Rule>) -> String {
    let raw = piece.as_str();
    let delim = match piece.as_rule() {
        Rule::triple_single | Rule::triple_double => 3,
        _ => 1,
    };
    let body = raw
        .get(delim..raw.len().saturating_sub(delim))
        .unwrap_or_default();

    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\n') => {}
            Some(c @ ('\\' | '\'' | '"')) => out.push(c),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn build_number(pair: &Pair<'_, Rule>) -> Result<Value> {
    let text: String = pair.as_str().chars().filter(|c| *c != '_').collect();
    let trimmed = text.strip_prefix('+').unwrap_or(&text);

    if !trimmed.contains(['.', 'e', 'E']) {
        if let Ok(i) = trimmed.parse::<i64>() {
            return Ok(Value::Number(Number::from(i)));
        }
        if let Ok(u) = trimmed.parse::<u64>() {
            return Ok(Value::Number(Number::from(u)));
        }
    }
    trimmed
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| error_at(pair, format!("invalid number `{}`", pair.as_str())))
}

/// Reject bracket nesting past [`MAX_NESTING`] before the grammar recurses
/// into it. Brackets inside strings and comments do not count.
fn check_nesting(src: &str) -> Result<()> {
    let bytes = src.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'#' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                continue;
            }
            quote @ (b'\'' | b'"') => {
                i = skip_string(bytes, i, quote);
                continue;
            }
            b'[' | b'{' | b'(' => {
                depth += 1;
                if depth > MAX_NESTING {
                    return Err(syntax_at(src, i, "nesting too deep"));
                }
            }
            b']' | b'}' | b')' => depth = depth.saturating_sub(1),
            _ => {}
        }
        i += 1;
    }
    Ok(())
}

/// Offset just past the string literal opening at `start`.
fn skip_string(bytes: &[u8], start: usize, quote: u8) -> usize {
    let triple = bytes[start..].starts_with(&[quote; 3]);
    let delim = if triple { 3 } else { 1 };
    let mut i = start + delim;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' if !triple => return i,
            b if b == quote && (!triple || bytes[i..].starts_with(&[quote; 3])) => {
                return i + delim;
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

fn describe_rule(rule: &Rule) -> String {
    match rule {
        Rule::EOI => "end of input",
        Rule::eq => "'='",
        Rule::trailing_comma => "','",
        Rule::mapping => "a mapping",
        Rule::entry => "a mapping entry",
        Rule::list => "a list",
        Rule::tuple => "a tuple",
        Rule::strings
        | Rule::triple_single
        | Rule::triple_double
        | Rule::single
        | Rule::double => "a string",
        Rule::number => "a number",
        Rule::constant => "True, False or None",
        Rule::name => "a name",
        Rule::assignment => "an assignment",
        Rule::document | Rule::statements => "a literal",
        other => return format!("{other:?}"),
    }
    .to_string()
}

fn syntax_error(err: PestError<Rule>) -> ModelError {
    let err = err.renamed_rules(describe_rule);
    let (line, column) = match err.line_col {
        LineColLocation::Pos(pos) => pos,
        LineColLocation::Span(start, _) => start,
    };
    ModelError::Syntax {
        line,
        column,
        message: err.variant.message().into_owned(),
    }
}

fn error_at(pair: &Pair<'_, Rule>, message: impl Into<String>) -> ModelError {
    let (line, column) = pair.as_span().start_pos().line_col();
    ModelError::Syntax {
        line,
        column,
        message: message.into(),
    }
}

fn syntax_at(src: &str, offset: usize, message: &str) -> ModelError {
    let (line, column) = pest::Position::new(src, offset)
        .map(|p| p.line_col())
        .unwrap_or((1, 1));
    ModelError::Syntax {
        line,
        column,
        message: message.to_string(),
    }
}
