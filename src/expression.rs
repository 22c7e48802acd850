//! Expression analysis
//!
//! Embedded expressions stay as source text in the IR. This module slices them
//! out of the component source, positions them, and decides which ones are
//! compile-time constants (and therefore never need a reactive effect).

use oxc_allocator::Allocator;
use oxc_ast::ast::Expression;
use oxc_parser::Parser;
use oxc_span::SourceType;
use oxc_syntax::operator::UnaryOperator;
use std::collections::HashSet;

use crate::ast::{AttributeChunk, JsNode};
use crate::ir::{ExpressionLoc, SimpleExpression};
use crate::validate::LineIndex;

lazy_static::lazy_static! {
    /// Globals that never change between renders.
    pub static ref GLOBALLY_ALLOWED: HashSet<&'static str> = {
        let mut s = HashSet::new();
        s.insert("Infinity");
        s.insert("undefined");
        s.insert("NaN");
        s.insert("isFinite");
        s.insert("isNaN");
        s.insert("parseFloat");
        s.insert("parseInt");
        s.insert("decodeURI");
        s.insert("decodeURIComponent");
        s.insert("encodeURI");
        s.insert("encodeURIComponent");
        s.insert("Math");
        s.insert("Number");
        s.insert("Date");
        s.insert("Array");
        s.insert("Object");
        s.insert("Boolean");
        s.insert("String");
        s.insert("RegExp");
        s.insert("Map");
        s.insert("Set");
        s.insert("JSON");
        s.insert("Intl");
        s.insert("BigInt");
        s.insert("console");
        s.insert("Error");
        s.insert("Symbol");
        s
    };
}

fn source_type() -> SourceType {
    SourceType::default()
        .with_typescript(true)
        .with_module(true)
        .with_jsx(true)
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTANT DETECTION
// ═══════════════════════════════════════════════════════════════════════════════

pub fn is_constant_expression(exp: &SimpleExpression) -> bool {
    exp.is_static || is_constant_source(&exp.content)
}

/// True when the text parses to a literal, a plain template string, a signed
/// numeric literal or a whitelisted global. Unparseable text is never constant.
pub fn is_constant_source(code: &str) -> bool {
    let code = code.trim();
    if code.is_empty() {
        return false;
    }
    let allocator = Allocator::default();
    match Parser::new(&allocator, code, source_type()).parse_expression() {
        Ok(expr) => is_constant_node(&expr),
        Err(_) => false,
    }
}

fn is_constant_node(expr: &Expression) -> bool {
    match expr {
        Expression::StringLiteral(_)
        | Expression::NumericLiteral(_)
        | Expression::BooleanLiteral(_)
        | Expression::NullLiteral(_)
        | Expression::BigIntLiteral(_)
        | Expression::RegExpLiteral(_) => true,
        Expression::TemplateLiteral(tpl) => tpl.expressions.is_empty(),
        Expression::UnaryExpression(unary) => {
            matches!(
                unary.operator,
                UnaryOperator::UnaryNegation | UnaryOperator::UnaryPlus | UnaryOperator::LogicalNot
            ) && matches!(unary.argument, Expression::NumericLiteral(_))
        }
        Expression::Identifier(id) => GLOBALLY_ALLOWED.contains(id.name.as_str()),
        Expression::ParenthesizedExpression(paren) => is_constant_node(&paren.expression),
        _ => false,
    }
}

/// The cooked value of a plain string literal expression (`"a"`, `'a'`).
pub fn string_literal_value(code: &str) -> Option<String> {
    let allocator = Allocator::default();
    let expr = Parser::new(&allocator, code.trim(), source_type())
        .parse_expression()
        .ok()?;
    match expr {
        Expression::StringLiteral(s) => Some(s.value.to_string()),
        Expression::TemplateLiteral(tpl) if tpl.expressions.is_empty() => tpl
            .quasis
            .first()
            .map(|q| q.value.cooked.as_ref().unwrap_or(&q.value.raw).to_string()),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESOLUTION
// ═══════════════════════════════════════════════════════════════════════════════

pub fn expression_loc(start: u32, end: u32, lines: &LineIndex) -> ExpressionLoc {
    let loc = lines.locate(start);
    ExpressionLoc {
        start,
        end,
        line: loc.line,
        column: loc.column,
    }
}

/// Slices an embedded expression out of the source and positions it.
pub fn resolve_expression(node: &JsNode, source: &str, lines: &LineIndex) -> SimpleExpression {
    let content = node.text(source).trim().to_string();
    SimpleExpression::new_dynamic(content, Some(expression_loc(node.start, node.end, lines)))
}

/// A text/expression attribute value rendered as one template literal, so it
/// can be set (and tracked) as a single expression.
pub fn chunks_to_template_literal(chunks: &[AttributeChunk], source: &str) -> String {
    let mut out = String::from("`");
    for chunk in chunks {
        match chunk {
            AttributeChunk::Text(t) => {
                for c in t.data.chars() {
                    match c {
                        '`' => out.push_str("\\`"),
                        '\\' => out.push_str("\\\\"),
                        '$' => out.push_str("\\$"),
                        _ => out.push(c),
                    }
                }
            }
            AttributeChunk::ExpressionTag(tag) => {
                out.push_str("${");
                out.push_str(tag.expression.text(source).trim());
                out.push('}');
            }
        }
    }
    out.push('`');
    out
}

/// JS string literal for a static value.
pub fn quote(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value))
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAMES
// ═══════════════════════════════════════════════════════════════════════════════

pub fn camelize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '-' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ExpressionTag, TextNode};

    #[test]
    fn test_literals_and_globals_are_constant() {
        for code in ["\"literal\"", "42", "-1", "true", "null", "`plain`", "(7)", "Infinity", "10n"] {
            assert!(is_constant_source(code), "{} should be constant", code);
        }
    }

    #[test]
    fn test_reactive_expressions_are_not_constant() {
        for code in ["count", "`a${b}`", "-x", "a + 1", "foo()", "", "a ++ +"] {
            assert!(!is_constant_source(code), "{} should not be constant", code);
        }
    }

    #[test]
    fn test_static_expressions_are_constant_regardless_of_content() {
        assert!(is_constant_expression(&SimpleExpression::new_static("count")));
        assert!(!is_constant_expression(&SimpleExpression::new_dynamic("count", None)));
    }

    #[test]
    fn test_string_literal_value_unquotes() {
        assert_eq!(string_literal_value("'header'").as_deref(), Some("header"));
        assert_eq!(string_literal_value("name"), None);
    }

    #[test]
    fn test_resolve_expression_positions_content() {
        let source = "<div>\n  {count}</div>";
        let lines = LineIndex::new(source);
        let exp = resolve_expression(&JsNode::new("Identifier", 9, 14), source, &lines);
        assert_eq!(exp.content, "count");
        assert!(!exp.is_static);
        let loc = exp.loc.expect("loc");
        assert_eq!((loc.line, loc.column), (2, 4));
    }

    #[test]
    fn test_mixed_chunks_become_template_literal() {
        let source = "class=\"a {b}\"";
        let chunks = vec![
            AttributeChunk::Text(TextNode {
                data: "a `$ ".to_string(),
                ..Default::default()
            }),
            AttributeChunk::ExpressionTag(ExpressionTag {
                expression: JsNode::new("Identifier", 10, 11),
                start: 9,
                end: 12,
            }),
        ];
        assert_eq!(chunks_to_template_literal(&chunks, source), "`a \\`\\$ ${b}`");
    }

    #[test]
    fn test_name_helpers() {
        assert_eq!(camelize("update-value"), "updateValue");
        assert_eq!(capitalize("click"), "Click");
        assert_eq!(quote("a\"b"), "\"a\\\"b\"");
    }
}
