//! Foreign template AST
//!
//! The shape produced by the Svelte-style parser (and by the in-crate JSX
//! front-end). Every node carries `start`/`end` byte offsets into the
//! component source; expressions are kept as spans and sliced on demand.

use serde::{Deserialize, Serialize};

use crate::css_ast::StyleSheetNode;

// ═══════════════════════════════════════════════════════════════════════════════
// ROOT & FRAGMENTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Root {
    #[serde(default)]
    pub start: u32,
    #[serde(default)]
    pub end: u32,
    pub fragment: Fragment,
    #[serde(default)]
    pub css: Option<StyleSheetNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Fragment {
    #[serde(default)]
    pub nodes: Vec<TemplateNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TemplateNode {
    Text(TextNode),
    Comment(CommentNode),
    ExpressionTag(ExpressionTag),
    HtmlTag(ExpressionTag),
    RegularElement(ElementNode),
    Component(ElementNode),
    SlotElement(ElementNode),
    SvelteFragment(ElementNode),
    IfBlock(IfBlock),
    EachBlock(EachBlock),
}

impl TemplateNode {
    pub fn span(&self) -> (u32, u32) {
        match self {
            TemplateNode::Text(n) => (n.start, n.end),
            TemplateNode::Comment(n) => (n.start, n.end),
            TemplateNode::ExpressionTag(n) | TemplateNode::HtmlTag(n) => (n.start, n.end),
            TemplateNode::RegularElement(n)
            | TemplateNode::Component(n)
            | TemplateNode::SlotElement(n)
            | TemplateNode::SvelteFragment(n) => (n.start, n.end),
            TemplateNode::IfBlock(n) => (n.start, n.end),
            TemplateNode::EachBlock(n) => (n.start, n.end),
        }
    }

    pub fn element(&self) -> Option<&ElementNode> {
        match self {
            TemplateNode::RegularElement(n)
            | TemplateNode::Component(n)
            | TemplateNode::SlotElement(n)
            | TemplateNode::SvelteFragment(n) => Some(n),
            _ => None,
        }
    }

    pub fn is_whitespace_text(&self) -> bool {
        matches!(self, TemplateNode::Text(t) if t.data.trim().is_empty())
    }

    pub fn is_text_like(&self) -> bool {
        matches!(self, TemplateNode::Text(_) | TemplateNode::ExpressionTag(_))
    }

    pub fn is_comment(&self) -> bool {
        matches!(self, TemplateNode::Comment(_))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LEAVES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TextNode {
    pub data: String,
    #[serde(default)]
    pub raw: String,
    #[serde(default)]
    pub start: u32,
    #[serde(default)]
    pub end: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CommentNode {
    pub data: String,
    pub start: u32,
    pub end: u32,
}

/// An embedded JS expression. Only its span is kept; the text is sliced from
/// the component source when the IR is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct JsNode {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub start: u32,
    pub end: u32,
}

impl JsNode {
    pub fn new(kind: &str, start: u32, end: u32) -> Self {
        Self {
            kind: kind.to_string(),
            start,
            end,
        }
    }

    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        source
            .get(self.start as usize..self.end as usize)
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionTag {
    pub expression: JsNode,
    #[serde(default)]
    pub start: u32,
    #[serde(default)]
    pub end: u32,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ELEMENTS & ATTRIBUTES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ElementNode {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<AttributeNode>,
    #[serde(default)]
    pub fragment: Fragment,
    pub start: u32,
    pub end: u32,
}

impl ElementNode {
    /// First plain attribute with the given name (case-insensitive, like HTML).
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find_map(|a| match a {
            AttributeNode::Attribute(attr) if attr.name.eq_ignore_ascii_case(name) => Some(attr),
            _ => None,
        })
    }

    pub fn attribute_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.attributes.iter_mut().find_map(|a| match a {
            AttributeNode::Attribute(attr) if attr.name.eq_ignore_ascii_case(name) => Some(attr),
            _ => None,
        })
    }

    pub fn has_spread(&self) -> bool {
        self.attributes
            .iter()
            .any(|a| matches!(a, AttributeNode::SpreadAttribute(_)))
    }

    pub fn binding(&self, name: &str) -> Option<&Directive> {
        self.attributes.iter().find_map(|a| match a {
            AttributeNode::BindDirective(d) if d.name == name => Some(d),
            _ => None,
        })
    }

    /// Children that are not whitespace-only text or comments.
    pub fn significant_children(&self) -> impl Iterator<Item = &TemplateNode> {
        self.fragment
            .nodes
            .iter()
            .filter(|n| !n.is_whitespace_text() && !n.is_comment())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AttributeNode {
    Attribute(Attribute),
    SpreadAttribute(SpreadAttribute),
    BindDirective(Directive),
    OnDirective(Directive),
    UseDirective(Directive),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    pub name: String,
    pub value: AttributeValue,
    #[serde(default)]
    pub start: u32,
    #[serde(default)]
    pub end: u32,
}

/// `true` for bare attributes, a single `{expr}`, or a run of text and
/// expression chunks (`class="a {b}"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Boolean(bool),
    Sequence(Vec<AttributeChunk>),
    Expression(ExpressionTag),
}

impl AttributeValue {
    /// The literal value when every chunk is plain text.
    pub fn static_text(&self) -> Option<String> {
        match self {
            AttributeValue::Sequence(chunks) => {
                let mut out = String::new();
                for chunk in chunks {
                    match chunk {
                        AttributeChunk::Text(t) => out.push_str(&t.data),
                        AttributeChunk::ExpressionTag(_) => return None,
                    }
                }
                Some(out)
            }
            _ => None,
        }
    }

    pub fn chunks(&self) -> Vec<AttributeChunk> {
        match self {
            AttributeValue::Boolean(_) => vec![],
            AttributeValue::Sequence(chunks) => chunks.clone(),
            AttributeValue::Expression(tag) => vec![AttributeChunk::ExpressionTag(tag.clone())],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AttributeChunk {
    Text(TextNode),
    ExpressionTag(ExpressionTag),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpreadAttribute {
    pub expression: JsNode,
    #[serde(default)]
    pub start: u32,
    #[serde(default)]
    pub end: u32,
}

/// `bind:name`, `on:name|modifiers` and `use:name` share one shape.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Directive {
    pub name: String,
    #[serde(default)]
    pub expression: Option<JsNode>,
    #[serde(default)]
    pub modifiers: Vec<String>,
    #[serde(default)]
    pub start: u32,
    #[serde(default)]
    pub end: u32,
}

// ═══════════════════════════════════════════════════════════════════════════════
// BLOCKS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IfBlock {
    #[serde(default)]
    pub elseif: bool,
    pub test: JsNode,
    pub consequent: Fragment,
    #[serde(default)]
    pub alternate: Option<Fragment>,
    pub start: u32,
    pub end: u32,
}

impl IfBlock {
    /// The `{:else if}` branch folded into `alternate`, if that is all it holds.
    pub fn else_if(&self) -> Option<&IfBlock> {
        let alternate = self.alternate.as_ref()?;
        let mut significant = alternate
            .nodes
            .iter()
            .filter(|n| !n.is_whitespace_text() && !n.is_comment());
        match (significant.next(), significant.next()) {
            (Some(TemplateNode::IfBlock(nested)), None) if nested.elseif => Some(nested),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EachBlock {
    pub expression: JsNode,
    #[serde(default)]
    pub context: Option<JsNode>,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub key_alias: Option<String>,
    #[serde(default)]
    pub key: Option<JsNode>,
    pub body: Fragment,
    #[serde(default)]
    pub fallback: Option<Fragment>,
    pub start: u32,
    pub end: u32,
}
