//! Selector model
//!
//! A css-tree selector is grouped into compound blocks split at combinators.
//! Matching runs right to left against an element and its ancestor chain;
//! every block that takes part in a match is marked for encapsulation and
//! receives the scope class at render time.

use crate::ast::{AttributeChunk, AttributeValue, ElementNode};
use crate::css_ast::{AttributeSelectorNode, SelectorNode, SelectorPart};
use crate::expression::string_literal_value;
use crate::source_edit::SourceEdit;

// ═══════════════════════════════════════════════════════════════════════════════
// BLOCKS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombinatorKind {
    Descendant,
    Child,
    NextSibling,
    SubsequentSibling,
}

impl CombinatorKind {
    fn parse(name: &str) -> Self {
        match name.trim() {
            ">" => CombinatorKind::Child,
            "+" => CombinatorKind::NextSibling,
            "~" => CombinatorKind::SubsequentSibling,
            _ => CombinatorKind::Descendant,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Combinator {
    pub kind: CombinatorKind,
    pub start: u32,
    pub end: u32,
}

/// A compound selector plus the combinator that links it to the block on
/// its left.
#[derive(Debug, Clone)]
pub struct Block {
    pub combinator: Option<Combinator>,
    pub selectors: Vec<SelectorPart>,
    pub should_encapsulate: bool,
}

impl Block {
    fn new(combinator: Option<Combinator>) -> Self {
        Self {
            combinator,
            selectors: Vec::new(),
            should_encapsulate: false,
        }
    }

    /// `:global(...)`, optionally followed by more pseudo selectors.
    pub fn global(&self) -> bool {
        matches!(self.selectors.first(), Some(first) if first.is_pseudo_class("global"))
            && self.selectors.iter().all(SelectorPart::is_pseudo)
    }

    pub fn host(&self) -> bool {
        self.selectors.len() == 1 && self.selectors[0].is_pseudo_class("host")
    }

    pub fn root(&self) -> bool {
        self.selectors.len() == 1 && self.selectors[0].is_pseudo_class("root")
    }
}

fn group_selectors(node: &SelectorNode) -> Vec<Block> {
    let mut blocks = vec![Block::new(None)];
    for part in &node.children {
        let combinator = match part {
            SelectorPart::Combinator(c) => Some(Combinator {
                kind: CombinatorKind::parse(&c.name),
                start: c.start,
                end: c.end,
            }),
            SelectorPart::WhiteSpace(w) => Some(Combinator {
                kind: CombinatorKind::Descendant,
                start: w.start,
                end: w.end,
            }),
            _ => None,
        };

        let Some(combinator) = combinator else {
            if let Some(block) = blocks.last_mut() {
                block.selectors.push(part.clone());
            }
            continue;
        };

        // `a > b` may arrive as whitespace, combinator, whitespace.
        match blocks.last_mut() {
            Some(last) if last.selectors.is_empty() && last.combinator.is_some() => {
                if combinator.kind != CombinatorKind::Descendant {
                    last.combinator = Some(combinator);
                }
            }
            _ => blocks.push(Block::new(Some(combinator))),
        }
    }
    blocks
}

// ═══════════════════════════════════════════════════════════════════════════════
// SELECTOR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct Selector {
    pub blocks: Vec<Block>,
    /// Blocks before the trailing run of `:global(...)` blocks.
    pub local_blocks: usize,
    pub used: bool,
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockMatch {
    NotPossible,
    Possible,
    UnknownSelectorType,
}

struct Frame {
    block: usize,
    position: usize,
    trail: Vec<(usize, usize)>,
}

impl Selector {
    pub fn new(node: &SelectorNode) -> Self {
        let blocks = group_selectors(node);
        let local_blocks = blocks.len() - blocks.iter().rev().take_while(|b| b.global()).count();
        let host_only = blocks.len() == 1 && blocks[0].host();
        let root_only = blocks.len() == 1 && blocks[0].root();
        Self {
            used: local_blocks == 0 || host_only || root_only,
            blocks,
            local_blocks,
            start: node.start,
            end: node.end,
        }
    }

    pub fn encapsulated_count(&self) -> usize {
        self.blocks.iter().filter(|b| b.should_encapsulate).count()
    }

    /// Matches against `chain[0]` with its ancestors following, nearest first.
    /// Returns the chain positions of every element the match relies on.
    pub fn apply(&mut self, chain: &[&ElementNode], source: &str) -> Vec<usize> {
        if self.local_blocks == 0 || chain.is_empty() {
            return Vec::new();
        }
        let local = &self.blocks[..self.local_blocks];
        let mut matched: Vec<(usize, usize)> = Vec::new();
        let mut stack = vec![Frame {
            block: local.len() - 1,
            position: 0,
            trail: Vec::new(),
        }];

        while let Some(frame) = stack.pop() {
            let block = &local[frame.block];
            let mut trail = frame.trail;
            match block_might_apply(block, chain[frame.position], source) {
                BlockMatch::NotPossible => continue,
                BlockMatch::UnknownSelectorType => {
                    trail.push((frame.block, frame.position));
                    matched.extend(trail);
                    continue;
                }
                BlockMatch::Possible => trail.push((frame.block, frame.position)),
            }

            let left = &local[..frame.block];
            if left.is_empty() || left.iter().any(Block::global) {
                matched.extend(trail);
                continue;
            }

            let previous = frame.block - 1;
            match block.combinator.map(|c| c.kind) {
                Some(CombinatorKind::Descendant) => {
                    for position in (frame.position + 1..chain.len()).rev() {
                        stack.push(Frame {
                            block: previous,
                            position,
                            trail: trail.clone(),
                        });
                    }
                }
                Some(CombinatorKind::Child) => {
                    if frame.position + 1 < chain.len() {
                        stack.push(Frame {
                            block: previous,
                            position: frame.position + 1,
                            trail,
                        });
                    }
                }
                // Sibling order is not tracked; assume the sibling exists.
                _ => matched.extend(trail),
            }
        }

        if matched.is_empty() {
            return Vec::new();
        }
        self.used = true;
        let mut positions = Vec::new();
        for (block, position) in matched {
            self.blocks[block].should_encapsulate = true;
            if !positions.contains(&position) {
                positions.push(position);
            }
        }
        positions
    }

    /// Unwraps `:global(...)` and appends the scope class to encapsulated
    /// blocks. The last encapsulated block is padded so the selector gains
    /// `max` scope classes in total.
    pub fn transform(&self, edit: &mut SourceEdit<'_>, attr: &str, max: usize) {
        let padding = max.saturating_sub(self.encapsulated_count());
        let last = self.blocks.iter().rposition(|b| b.should_encapsulate);

        for (index, block) in self.blocks.iter().enumerate() {
            for part in &block.selectors {
                if let SelectorPart::PseudoClassSelector(p) = part {
                    if p.name == "global" {
                        unwrap_global(edit, p.start, p.end, p.args.is_some());
                    }
                }
            }
            if block.should_encapsulate {
                let token = if Some(index) == last {
                    attr.repeat(padding + 1)
                } else {
                    attr.to_string()
                };
                encapsulate_block(edit, block, &token);
            }
        }
    }
}

fn unwrap_global(edit: &mut SourceEdit<'_>, start: u32, end: u32, has_args: bool) {
    if has_args {
        edit.remove(start, start + ":global(".len() as u32);
        edit.remove(end.saturating_sub(1), end);
    } else {
        edit.remove(start, end);
    }
}

fn encapsulate_block(edit: &mut SourceEdit<'_>, block: &Block, token: &str) {
    for (i, part) in block.selectors.iter().enumerate().rev() {
        if let SelectorPart::PseudoClassSelector(p) | SelectorPart::PseudoElementSelector(p) = part {
            if p.name != "root" && p.name != "host" && i == 0 {
                edit.prepend_right(p.start, token);
            }
            continue;
        }
        match part {
            SelectorPart::TypeSelector(t) if t.name == "*" => edit.overwrite(t.start, t.end, token),
            other => {
                if let Some((_, end)) = other.span() {
                    edit.append_left(end, token);
                }
            }
        }
        break;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ELEMENT MATCHING
// ═══════════════════════════════════════════════════════════════════════════════

/// Attributes the runtime may toggle on its own.
const TOGGLED_ATTRIBUTES: &[(&str, &str)] = &[("details", "open"), ("dialog", "open")];

fn unescape(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 && (bytes[0] == b'"' || bytes[0] == b'\'') && bytes[bytes.len() - 1] == bytes[0] {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

fn block_might_apply(block: &Block, element: &ElementNode, source: &str) -> BlockMatch {
    for part in block.selectors.iter().rev() {
        match part {
            SelectorPart::PseudoClassSelector(p) if p.name == "host" || p.name == "root" => {
                return BlockMatch::NotPossible;
            }
            SelectorPart::PseudoClassSelector(p) if p.name == "global" && block.selectors.len() == 1 => {
                return BlockMatch::NotPossible;
            }
            SelectorPart::PseudoClassSelector(_) | SelectorPart::PseudoElementSelector(_) => continue,
            SelectorPart::ClassSelector(c) => {
                let name = unescape(&c.name);
                if !attribute_matches(element, "class", Some(&name), Some("~="), false, source) {
                    return BlockMatch::NotPossible;
                }
            }
            SelectorPart::IdSelector(id) => {
                let name = unescape(&id.name);
                if !attribute_matches(element, "id", Some(&name), Some("="), false, source) {
                    return BlockMatch::NotPossible;
                }
            }
            SelectorPart::AttributeSelector(attr) => {
                if !attribute_selector_matches(element, attr, source) {
                    return BlockMatch::NotPossible;
                }
            }
            SelectorPart::TypeSelector(t) => {
                let name = unescape(&t.name);
                if name != "*" && !element.name.eq_ignore_ascii_case(&name) {
                    return BlockMatch::NotPossible;
                }
            }
            _ => return BlockMatch::UnknownSelectorType,
        }
    }
    BlockMatch::Possible
}

fn attribute_selector_matches(element: &ElementNode, attr: &AttributeSelectorNode, source: &str) -> bool {
    let toggled = TOGGLED_ATTRIBUTES
        .iter()
        .any(|(tag, name)| element.name.eq_ignore_ascii_case(tag) && attr.name.eq_ignore_ascii_case(name));
    if toggled {
        return true;
    }
    let case_insensitive = attr.flags.as_deref().map(|f| f.trim() == "i").unwrap_or(false);
    attribute_matches(
        element,
        &attr.name,
        attr.value.as_deref().map(unquote),
        attr.matcher.as_deref(),
        case_insensitive,
        source,
    )
}

/// Whether the element can carry an attribute satisfying `[name op expected]`.
/// Values computed at runtime are assumed to match.
fn attribute_matches(
    element: &ElementNode,
    name: &str,
    expected: Option<&str>,
    operator: Option<&str>,
    case_insensitive: bool,
    source: &str,
) -> bool {
    if element.has_spread() || element.binding(name).is_some() {
        return true;
    }
    let Some(attr) = element.attribute(name) else {
        return false;
    };
    let chunks = match &attr.value {
        AttributeValue::Boolean(_) => return operator.is_none(),
        value => value.chunks(),
    };
    let Some(expected) = expected else {
        return true;
    };

    let mut value = String::new();
    for chunk in &chunks {
        match chunk {
            AttributeChunk::Text(t) => value.push_str(&t.data),
            AttributeChunk::ExpressionTag(tag) => match string_literal_value(tag.expression.text(source)) {
                Some(literal) => value.push_str(&literal),
                None => return true,
            },
        }
    }
    test_attribute(operator, expected, case_insensitive, &value)
}

fn test_attribute(operator: Option<&str>, expected: &str, case_insensitive: bool, value: &str) -> bool {
    let (expected, value) = if case_insensitive {
        (expected.to_lowercase(), value.to_lowercase())
    } else {
        (expected.to_string(), value.to_string())
    };
    match operator {
        Some("=") => value == expected,
        Some("~=") => value.split_whitespace().any(|v| v == expected),
        Some("|=") => format!("{}-", value).starts_with(&format!("{}-", expected)),
        Some("^=") => value.starts_with(&expected),
        Some("$=") => value.ends_with(&expected),
        Some("*=") => value.contains(&expected),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn selector(value: serde_json::Value) -> Selector {
        let node: SelectorNode = serde_json::from_value(value).expect("selector json");
        Selector::new(&node)
    }

    fn element(value: serde_json::Value) -> ElementNode {
        serde_json::from_value(value).expect("element json")
    }

    fn class_attr(class: &str) -> serde_json::Value {
        json!({ "type": "Attribute", "name": "class",
                "value": [{ "type": "Text", "data": class, "start": 0, "end": 0 }] })
    }

    #[test]
    fn test_grouping_splits_at_combinators() {
        let sel = selector(json!({ "start": 0, "end": 9, "children": [
            { "type": "ClassSelector", "name": "a", "start": 0, "end": 2 },
            { "type": "WhiteSpace", "start": 2, "end": 3 },
            { "type": "Combinator", "name": ">", "start": 3, "end": 4 },
            { "type": "WhiteSpace", "start": 4, "end": 5 },
            { "type": "TypeSelector", "name": "p", "start": 5, "end": 6 }
        ]}));
        assert_eq!(sel.blocks.len(), 2);
        assert_eq!(sel.blocks[1].combinator.map(|c| c.kind), Some(CombinatorKind::Child));
        assert!(!sel.used);
    }

    #[test]
    fn test_trailing_global_is_not_local() {
        let sel = selector(json!({ "start": 0, "end": 14, "children": [
            { "type": "PseudoClassSelector", "name": "global", "start": 0, "end": 14,
              "args": { "start": 8, "end": 13, "children": [] } }
        ]}));
        assert_eq!(sel.local_blocks, 0);
        assert!(sel.used, "global-only selectors are always used");
    }

    #[test]
    fn test_descendant_requires_matching_ancestor() {
        let mut sel = selector(json!({ "start": 0, "end": 5, "children": [
            { "type": "ClassSelector", "name": "a", "start": 0, "end": 2 },
            { "type": "Combinator", "name": " ", "start": 2, "end": 3 },
            { "type": "TypeSelector", "name": "p", "start": 3, "end": 4 }
        ]}));
        let p = element(json!({ "name": "p", "start": 10, "end": 20 }));
        let plain = element(json!({ "name": "div", "start": 0, "end": 30 }));
        assert!(sel.apply(&[&p, &plain], "").is_empty());
        assert!(!sel.used);

        let outer = element(json!({ "name": "section", "start": 0, "end": 40, "attributes": [class_attr("a b")] }));
        let positions = sel.apply(&[&p, &plain, &outer], "");
        assert_eq!(positions, vec![0, 2]);
        assert!(sel.used);
        assert!(sel.blocks.iter().all(|b| b.should_encapsulate));
    }

    #[test]
    fn test_child_combinator_checks_direct_parent_only() {
        let mut sel = selector(json!({ "start": 0, "end": 5, "children": [
            { "type": "ClassSelector", "name": "a", "start": 0, "end": 2 },
            { "type": "Combinator", "name": ">", "start": 2, "end": 3 },
            { "type": "TypeSelector", "name": "p", "start": 3, "end": 4 }
        ]}));
        let p = element(json!({ "name": "p", "start": 10, "end": 20 }));
        let plain = element(json!({ "name": "div", "start": 5, "end": 30 }));
        let outer = element(json!({ "name": "div", "start": 0, "end": 40, "attributes": [class_attr("a")] }));
        assert!(sel.apply(&[&p, &plain, &outer], "").is_empty());
        assert_eq!(sel.apply(&[&p, &outer], ""), vec![0, 1]);
    }

    #[test]
    fn test_dynamic_values_and_spreads_match() {
        let source = "{cls}";
        let dynamic = element(json!({ "name": "div", "start": 0, "end": 5, "attributes": [
            { "type": "Attribute", "name": "class",
              "value": { "type": "ExpressionTag", "expression": { "type": "Identifier", "start": 1, "end": 4 } } }
        ]}));
        let spread = element(json!({ "name": "div", "start": 0, "end": 5, "attributes": [
            { "type": "SpreadAttribute", "expression": { "start": 1, "end": 4 } }
        ]}));
        assert!(attribute_matches(&dynamic, "class", Some("x"), Some("~="), false, source));
        assert!(attribute_matches(&spread, "id", Some("y"), Some("="), false, source));

        let literal_source = "{\"big red\"}";
        let literal = element(json!({ "name": "div", "start": 0, "end": 5, "attributes": [
            { "type": "Attribute", "name": "class",
              "value": { "type": "ExpressionTag", "expression": { "type": "StringLiteral", "start": 1, "end": 10 } } }
        ]}));
        assert!(attribute_matches(&literal, "class", Some("red"), Some("~="), false, literal_source));
        assert!(!attribute_matches(&literal, "class", Some("blue"), Some("~="), false, literal_source));
    }

    #[test]
    fn test_attribute_operators() {
        assert!(test_attribute(Some("|="), "en", false, "en-US"));
        assert!(test_attribute(Some("^="), "ht", false, "https"));
        assert!(test_attribute(Some("$="), "PDF", true, "file.pdf"));
        assert!(!test_attribute(Some("="), "a", false, "ab"));
    }

    #[test]
    fn test_transform_pads_last_encapsulated_block() {
        let source = ".a { color: red }";
        let mut sel = selector(json!({ "start": 0, "end": 2, "children": [
            { "type": "ClassSelector", "name": "a", "start": 0, "end": 2 }
        ]}));
        sel.blocks[0].should_encapsulate = true;
        let mut edit = SourceEdit::new(source);
        sel.transform(&mut edit, ".s", 2);
        assert_eq!(edit.to_string(), ".a.s.s { color: red }");
    }
}
