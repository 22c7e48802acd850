//! CSS AST
//!
//! The parsed `<style>` block as handed over by the external parser, in the
//! css-tree shape: rules carry a selector list prelude and a block of
//! declarations, selectors are flat lists of simple selectors with
//! `Combinator`/`WhiteSpace` nodes between compound parts. All offsets point
//! into the component source.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StyleSheetNode {
    pub start: u32,
    pub end: u32,
    #[serde(default)]
    pub children: Vec<CssNode>,
    /// The text between `<style>` and `</style>`.
    #[serde(default)]
    pub content: Option<StyleContent>,
}

impl StyleSheetNode {
    pub fn content_span(&self) -> (u32, u32) {
        match &self.content {
            Some(content) => (content.start, content.end),
            None => (self.start, self.end),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StyleContent {
    pub start: u32,
    pub end: u32,
    #[serde(default)]
    pub styles: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CssNode {
    Rule(RuleNode),
    Atrule(AtruleNode),
    Declaration(DeclarationNode),
}

impl CssNode {
    pub fn span(&self) -> (u32, u32) {
        match self {
            CssNode::Rule(n) => (n.start, n.end),
            CssNode::Atrule(n) => (n.start, n.end),
            CssNode::Declaration(n) => (n.start, n.end),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleNode {
    pub prelude: SelectorListNode,
    pub block: BlockNode,
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtruleNode {
    pub name: String,
    #[serde(default)]
    pub prelude: Option<ValueNode>,
    #[serde(default)]
    pub block: Option<BlockNode>,
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BlockNode {
    #[serde(default)]
    pub children: Vec<CssNode>,
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclarationNode {
    pub property: String,
    pub value: ValueNode,
    #[serde(default)]
    pub important: bool,
    pub start: u32,
    pub end: u32,
}

/// A declaration value or an at-rule prelude. Only identifiers are needed
/// (keyframe names); everything else is kept as source text.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ValueNode {
    #[serde(default)]
    pub children: Vec<ValuePart>,
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ValuePart {
    Identifier(NamedNode),
    #[serde(other)]
    Other,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SELECTORS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SelectorListNode {
    #[serde(default)]
    pub children: Vec<SelectorNode>,
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SelectorNode {
    #[serde(default)]
    pub children: Vec<SelectorPart>,
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SelectorPart {
    TypeSelector(NamedNode),
    ClassSelector(NamedNode),
    IdSelector(NamedNode),
    AttributeSelector(AttributeSelectorNode),
    PseudoClassSelector(PseudoSelectorNode),
    PseudoElementSelector(PseudoSelectorNode),
    Combinator(NamedNode),
    WhiteSpace(SpanNode),
    NestingSelector(SpanNode),
    Percentage(PercentageNode),
    #[serde(other)]
    Unknown,
}

impl SelectorPart {
    pub fn span(&self) -> Option<(u32, u32)> {
        match self {
            SelectorPart::TypeSelector(n)
            | SelectorPart::ClassSelector(n)
            | SelectorPart::IdSelector(n)
            | SelectorPart::Combinator(n) => Some((n.start, n.end)),
            SelectorPart::AttributeSelector(n) => Some((n.start, n.end)),
            SelectorPart::PseudoClassSelector(n) | SelectorPart::PseudoElementSelector(n) => {
                Some((n.start, n.end))
            }
            SelectorPart::WhiteSpace(n) | SelectorPart::NestingSelector(n) => Some((n.start, n.end)),
            SelectorPart::Percentage(n) => Some((n.start, n.end)),
            SelectorPart::Unknown => None,
        }
    }

    pub fn is_pseudo(&self) -> bool {
        matches!(
            self,
            SelectorPart::PseudoClassSelector(_) | SelectorPart::PseudoElementSelector(_)
        )
    }

    pub fn is_pseudo_class(&self, name: &str) -> bool {
        matches!(self, SelectorPart::PseudoClassSelector(p) if p.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NamedNode {
    pub name: String,
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SpanNode {
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PercentageNode {
    pub value: String,
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AttributeSelectorNode {
    pub name: String,
    #[serde(default)]
    pub matcher: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub flags: Option<String>,
    pub start: u32,
    pub end: u32,
}

/// `:hover`, `::before`, `:global(.x)`, `:not(.y)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PseudoSelectorNode {
    pub name: String,
    #[serde(default)]
    pub args: Option<SelectorListNode>,
    pub start: u32,
    pub end: u32,
}
