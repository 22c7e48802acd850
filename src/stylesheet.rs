//! Scoped stylesheet
//!
//! Rules are flattened into an arena in document order. Selectors are
//! matched against template elements, matched elements receive the scope
//! class, and rendering rewrites the original `<style>` text: selectors are
//! encapsulated, keyframes renamed, unused rules dropped and the result
//! minified. Nested structures are walked with explicit stacks.

#[cfg(feature = "napi")]
use napi_derive::napi;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ast::{
    Attribute, AttributeChunk, AttributeNode, AttributeValue, ElementNode, ExpressionTag, Fragment,
    Root, TemplateNode, TextNode,
};
use crate::css_ast::{CssNode, DeclarationNode, NamedNode, StyleSheetNode, ValueNode, ValuePart};
use crate::css_selector::Selector;
use crate::source_edit::SourceEdit;
use crate::validate::{
    CompilerError, CompilerWarning, LineIndex, W_CSS_MANUAL_SCOPING, W_CSS_UNUSED_SELECTOR,
    X_CSS_SOURCEMAP,
};

lazy_static::lazy_static! {
    static ref VENDOR_PREFIX: Regex = Regex::new(r"^-(webkit|moz|o|ms)-").unwrap();
}

/// `(styles, filename) -> scope class`.
pub type CssHashFn = Arc<dyn Fn(&str, &str) -> String + Send + Sync>;

/// Scope class derived from the style text.
pub fn default_css_hash(styles: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(styles.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("svelte-{}", &digest[..8])
}

fn remove_css_prefix(name: &str) -> String {
    VENDOR_PREFIX.replace(name, "").into_owned()
}

fn is_keyframes(name: &str) -> bool {
    remove_css_prefix(name).eq_ignore_ascii_case("keyframes")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct CssOutput {
    pub code: String,
    /// JSON source map (v3).
    pub map: String,
}

pub struct StylesheetOptions<'s> {
    pub ast: &'s StyleSheetNode,
    pub source: &'s str,
    pub filename: &'s str,
    pub dev: bool,
    pub css_hash: Option<CssHashFn>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ARENA
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
struct Declaration {
    property: String,
    value_start: u32,
    identifiers: Vec<NamedNode>,
    start: u32,
    end: u32,
}

impl Declaration {
    fn from_node(node: &DeclarationNode) -> Self {
        Self {
            property: node.property.clone(),
            value_start: node.value.start,
            identifiers: identifiers(&node.value),
            start: node.start,
            end: node.end,
        }
    }
}

fn identifiers(value: &ValueNode) -> Vec<NamedNode> {
    value
        .children
        .iter()
        .filter_map(|part| match part {
            ValuePart::Identifier(ident) => Some(ident.clone()),
            ValuePart::Other => None,
        })
        .collect()
}

#[derive(Debug, Clone)]
struct Rule {
    selectors: Vec<Selector>,
    declarations: Vec<Declaration>,
    block_start: u32,
    block_end: u32,
    in_keyframes: bool,
    /// False under at-rules that gate matching on anything but the media
    /// environment (`@font-feature-values`, `@page`, ...).
    applicable: bool,
    start: u32,
    end: u32,
}

impl Rule {
    fn is_used(&self, dev: bool) -> bool {
        if self.in_keyframes {
            return true;
        }
        if self.declarations.is_empty() {
            return dev;
        }
        self.selectors.iter().any(|s| s.used)
    }
}

#[derive(Debug, Clone)]
enum Member {
    Item(usize),
    Declaration(Declaration),
}

#[derive(Debug, Clone)]
struct Atrule {
    name: String,
    prelude: Option<(u32, u32)>,
    prelude_identifiers: Vec<NamedNode>,
    block: Option<(u32, u32)>,
    members: Vec<Member>,
    start: u32,
    end: u32,
}

#[derive(Debug, Clone)]
enum CssItem {
    Rule(Rule),
    Atrule(Atrule),
}

impl CssItem {
    fn span(&self) -> (u32, u32) {
        match self {
            CssItem::Rule(r) => (r.start, r.end),
            CssItem::Atrule(a) => (a.start, a.end),
        }
    }
}

const TRANSPARENT_AT_RULES: &[&str] = &["media", "supports", "container", "layer"];

struct Pending<'a> {
    node: &'a CssNode,
    parent: Option<usize>,
    in_keyframes: bool,
    applicable: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// STYLESHEET
// ═══════════════════════════════════════════════════════════════════════════════

pub struct Stylesheet<'s> {
    source: &'s str,
    filename: String,
    dev: bool,
    pub id: String,
    items: Vec<CssItem>,
    parents: Vec<Option<usize>>,
    top_level: Vec<usize>,
    keyframes: HashMap<String, String>,
    locations: Vec<u32>,
    scoped: BTreeSet<u32>,
    warnings: Vec<CompilerWarning>,
    lines: LineIndex,
}

impl<'s> Stylesheet<'s> {
    pub fn new(options: StylesheetOptions<'s>) -> Self {
        let (content_start, content_end) = options.ast.content_span();
        let styles = match &options.ast.content {
            Some(content) if !content.styles.is_empty() => content.styles.clone(),
            _ => options
                .source
                .get(content_start as usize..content_end as usize)
                .unwrap_or("")
                .to_string(),
        };
        let id = match &options.css_hash {
            Some(hash) => hash(&styles, options.filename),
            None => default_css_hash(&styles),
        };

        let mut sheet = Self {
            source: options.source,
            filename: options.filename.to_string(),
            dev: options.dev,
            id,
            items: Vec::new(),
            parents: Vec::new(),
            top_level: Vec::new(),
            keyframes: HashMap::new(),
            locations: Vec::new(),
            scoped: BTreeSet::new(),
            warnings: Vec::new(),
            lines: LineIndex::new(options.source),
        };
        sheet.build(options.ast);
        tracing::debug!(
            id = %sheet.id,
            items = sheet.items.len(),
            keyframes = sheet.keyframes.len(),
            "stylesheet built"
        );
        sheet
    }

    fn build(&mut self, ast: &StyleSheetNode) {
        let mut stack: Vec<Pending<'_>> = ast
            .children
            .iter()
            .rev()
            .map(|node| Pending {
                node,
                parent: None,
                in_keyframes: false,
                applicable: true,
            })
            .collect();

        while let Some(pending) = stack.pop() {
            let (start, end) = pending.node.span();
            self.locations.extend([start, end]);
            let index = self.items.len();

            match pending.node {
                CssNode::Declaration(_) => continue,
                CssNode::Rule(rule) => {
                    let selectors: Vec<Selector> = rule.prelude.children.iter().map(Selector::new).collect();
                    for s in &selectors {
                        self.locations.extend([s.start, s.end]);
                    }
                    let declarations: Vec<Declaration> = rule
                        .block
                        .children
                        .iter()
                        .filter_map(|child| match child {
                            CssNode::Declaration(d) => Some(Declaration::from_node(d)),
                            _ => None,
                        })
                        .collect();
                    for d in &declarations {
                        self.locations.extend([d.start, d.end]);
                    }
                    self.items.push(CssItem::Rule(Rule {
                        selectors,
                        declarations,
                        block_start: rule.block.start,
                        block_end: rule.block.end,
                        in_keyframes: pending.in_keyframes,
                        applicable: pending.applicable,
                        start,
                        end,
                    }));
                }
                CssNode::Atrule(at) => {
                    let keyframes = is_keyframes(&at.name);
                    let prelude_identifiers = at.prelude.as_ref().map(identifiers).unwrap_or_default();
                    if keyframes {
                        for ident in &prelude_identifiers {
                            if !ident.name.starts_with("-global-") {
                                self.keyframes
                                    .insert(ident.name.clone(), format!("{}-{}", self.id, ident.name));
                            }
                        }
                    }

                    let mut members = Vec::new();
                    if let Some(block) = &at.block {
                        let applicable = pending.applicable
                            && (keyframes
                                || TRANSPARENT_AT_RULES
                                    .iter()
                                    .any(|n| at.name.eq_ignore_ascii_case(n)));
                        // Children get indices in document order once popped;
                        // record declarations now, item slots later.
                        for child in block.children.iter() {
                            if let CssNode::Declaration(d) = child {
                                members.push(Member::Declaration(Declaration::from_node(d)));
                            }
                        }
                        for child in block.children.iter().rev() {
                            if !matches!(child, CssNode::Declaration(_)) {
                                stack.push(Pending {
                                    node: child,
                                    parent: Some(index),
                                    in_keyframes: pending.in_keyframes || keyframes,
                                    applicable,
                                });
                            }
                        }
                    }

                    self.items.push(CssItem::Atrule(Atrule {
                        name: at.name.clone(),
                        prelude: at.prelude.as_ref().map(|p| (p.start, p.end)),
                        prelude_identifiers,
                        block: at.block.as_ref().map(|b| (b.start, b.end)),
                        members,
                        start,
                        end,
                    }));
                }
            }

            self.parents.push(pending.parent);
            match pending.parent {
                Some(parent) => {
                    if let CssItem::Atrule(at) = &mut self.items[parent] {
                        at.members.push(Member::Item(index));
                    }
                }
                None => self.top_level.push(index),
            }
        }

        // Members were pushed in two passes; restore source order.
        let starts: Vec<u32> = self.items.iter().map(|i| i.span().0).collect();
        for item in &mut self.items {
            if let CssItem::Atrule(at) = item {
                at.members.sort_by_key(|m| match m {
                    Member::Item(i) => starts[*i],
                    Member::Declaration(d) => d.start,
                });
            }
        }
    }

    pub fn has_styles(&self) -> bool {
        !self.top_level.is_empty()
    }

    pub fn keyframes(&self) -> &HashMap<String, String> {
        &self.keyframes
    }

    /// Whether the element at this start offset received the scope class.
    pub fn is_scoped(&self, element_start: u32) -> bool {
        self.scoped.contains(&element_start)
    }

    /// Matches every selector against `element`; `ancestors` run outermost
    /// first.
    pub fn apply(&mut self, element: &ElementNode, ancestors: &[&ElementNode]) {
        let mut chain: Vec<&ElementNode> = Vec::with_capacity(ancestors.len() + 1);
        chain.push(element);
        chain.extend(ancestors.iter().rev().copied());

        let source = self.source;
        for item in &mut self.items {
            let CssItem::Rule(rule) = item else { continue };
            if rule.in_keyframes || !rule.applicable {
                continue;
            }
            for selector in &mut rule.selectors {
                for position in selector.apply(&chain, source) {
                    self.scoped.insert(chain[position].start);
                }
            }
        }
    }

    /// Applies the stylesheet to every regular element of the template.
    /// Blocks and components do not break the ancestor chain.
    pub fn apply_all(&mut self, root: &Root) {
        let mut ancestors: Vec<&ElementNode> = Vec::new();
        let mut stack: Vec<(&TemplateNode, usize)> =
            root.fragment.nodes.iter().rev().map(|n| (n, 0)).collect();

        while let Some((node, depth)) = stack.pop() {
            ancestors.truncate(depth);
            let (children, child_depth): (Vec<&Fragment>, usize) = match node {
                TemplateNode::RegularElement(el) => {
                    self.apply(el, &ancestors);
                    ancestors.push(el);
                    (vec![&el.fragment], depth + 1)
                }
                TemplateNode::Component(el)
                | TemplateNode::SlotElement(el)
                | TemplateNode::SvelteFragment(el) => (vec![&el.fragment], depth),
                TemplateNode::IfBlock(block) => {
                    let mut fragments = vec![&block.consequent];
                    fragments.extend(block.alternate.as_ref());
                    (fragments, depth)
                }
                TemplateNode::EachBlock(block) => {
                    let mut fragments = vec![&block.body];
                    fragments.extend(block.fallback.as_ref());
                    (fragments, depth)
                }
                _ => continue,
            };
            for fragment in children.into_iter().rev() {
                for child in fragment.nodes.iter().rev() {
                    stack.push((child, child_depth));
                }
            }
        }
        tracing::debug!(scoped = self.scoped.len(), "stylesheet applied");
    }

    /// Adds the scope class to every matched element. Elements with a spread
    /// attribute are left for the author to scope by hand.
    pub fn reify(&mut self, root: &mut Root) {
        if self.scoped.is_empty() {
            return;
        }
        let mut stack: Vec<&mut Fragment> = vec![&mut root.fragment];
        while let Some(fragment) = stack.pop() {
            for node in &mut fragment.nodes {
                match node {
                    TemplateNode::RegularElement(el) => {
                        if self.scoped.contains(&el.start) {
                            if el.has_spread() {
                                let loc = self.lines.locate(el.start);
                                self.warnings.push(CompilerWarning {
                                    code: W_CSS_MANUAL_SCOPING.to_string(),
                                    message: format!(
                                        "<{}> uses a spread attribute and must add the \"{}\" class itself",
                                        el.name, self.id
                                    ),
                                    file: self.filename.clone(),
                                    line: loc.line,
                                    column: loc.column,
                                });
                            } else {
                                add_scope_class(el, &self.id);
                            }
                        }
                        stack.push(&mut el.fragment);
                    }
                    TemplateNode::Component(el)
                    | TemplateNode::SlotElement(el)
                    | TemplateNode::SvelteFragment(el) => stack.push(&mut el.fragment),
                    TemplateNode::IfBlock(block) => {
                        stack.push(&mut block.consequent);
                        if let Some(alternate) = &mut block.alternate {
                            stack.push(alternate);
                        }
                    }
                    TemplateNode::EachBlock(block) => {
                        stack.push(&mut block.body);
                        if let Some(fallback) = &mut block.fallback {
                            stack.push(fallback);
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    /// Warnings collected so far plus one per selector that matched nothing.
    pub fn warnings(&self) -> Vec<CompilerWarning> {
        let mut warnings = self.warnings.clone();
        for item in &self.items {
            let CssItem::Rule(rule) = item else { continue };
            if rule.in_keyframes || !rule.applicable {
                continue;
            }
            for selector in rule.selectors.iter().filter(|s| !s.used) {
                let text = self
                    .source
                    .get(selector.start as usize..selector.end as usize)
                    .unwrap_or("")
                    .trim();
                let loc = self.lines.locate(selector.start);
                warnings.push(CompilerWarning {
                    code: W_CSS_UNUSED_SELECTOR.to_string(),
                    message: format!("Unused CSS selector \"{}\"", text),
                    file: self.filename.clone(),
                    line: loc.line,
                    column: loc.column,
                });
            }
        }
        warnings
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // RENDER
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn render(&self, file: &str) -> Result<CssOutput, CompilerError> {
        let mut edit = SourceEdit::new(self.source);
        for offset in &self.locations {
            edit.add_location(*offset);
        }

        let attr = format!(".{}", self.id);
        let max = self
            .items
            .iter()
            .filter_map(|item| match item {
                CssItem::Rule(rule) if !rule.in_keyframes && rule.applicable => Some(rule),
                _ => None,
            })
            .flat_map(|rule| rule.selectors.iter())
            .map(Selector::encapsulated_count)
            .max()
            .unwrap_or(0);

        for item in &self.items {
            match item {
                CssItem::Rule(rule) => {
                    if !rule.in_keyframes {
                        for selector in rule.selectors.iter().filter(|s| s.used) {
                            selector.transform(&mut edit, &attr, max);
                        }
                    }
                    for declaration in &rule.declarations {
                        self.transform_declaration(&mut edit, declaration);
                    }
                }
                CssItem::Atrule(at) => {
                    if is_keyframes(&at.name) {
                        for ident in &at.prelude_identifiers {
                            if ident.name.starts_with("-global-") {
                                edit.remove(ident.start, ident.start + "-global-".len() as u32);
                            } else if let Some(scoped) = self.keyframes.get(&ident.name) {
                                edit.overwrite(ident.start, ident.end, scoped);
                            }
                        }
                    }
                    for member in &at.members {
                        if let Member::Declaration(declaration) = member {
                            self.transform_declaration(&mut edit, declaration);
                        }
                    }
                }
            }
        }

        let kept = self.kept_items();
        let mut c = 0;
        for index in self.top_level.iter().copied().filter(|i| kept[*i]) {
            let (start, end) = self.items[index].span();
            edit.remove(c, start);
            c = end;
        }
        edit.remove(c, self.source.len() as u32);

        // Parents come first in the arena.
        let mut live = vec![false; self.items.len()];
        for index in 0..self.items.len() {
            live[index] = kept[index] && self.parents[index].map_or(true, |p| live[p]);
            if !live[index] {
                continue;
            }
            match &self.items[index] {
                CssItem::Rule(rule) => self.minify_rule(&mut edit, rule),
                CssItem::Atrule(at) => self.minify_atrule(&mut edit, at, &kept),
            }
        }

        let (code, _) = edit.render();
        let map = edit.generate_map(&self.filename, file).map_err(|e| {
            CompilerError::new(
                X_CSS_SOURCEMAP,
                &format!("Failed to generate CSS source map: {}", e),
                &self.filename,
                1,
                1,
            )
        })?;
        tracing::debug!(bytes = code.len(), "stylesheet rendered");
        Ok(CssOutput { code, map })
    }

    fn transform_declaration(&self, edit: &mut SourceEdit<'_>, declaration: &Declaration) {
        let property = remove_css_prefix(&declaration.property.to_ascii_lowercase());
        if property != "animation" && property != "animation-name" {
            return;
        }
        for ident in &declaration.identifiers {
            if let Some(scoped) = self.keyframes.get(&ident.name) {
                edit.overwrite(ident.start, ident.end, scoped);
            }
        }
    }

    /// Usage computed bottom-up; children always follow their parent.
    fn kept_items(&self) -> Vec<bool> {
        let mut kept = vec![false; self.items.len()];
        for index in (0..self.items.len()).rev() {
            kept[index] = match &self.items[index] {
                CssItem::Rule(rule) => rule.is_used(self.dev),
                CssItem::Atrule(at) => {
                    let mut children = at.members.iter().filter_map(|m| match m {
                        Member::Item(i) => Some(*i),
                        Member::Declaration(_) => None,
                    });
                    let has_declarations = at.members.iter().any(|m| matches!(m, Member::Declaration(_)));
                    at.block.is_none()
                        || is_keyframes(&at.name)
                        || has_declarations
                        || self.dev
                        || children.any(|i| kept[i])
                }
            };
        }
        kept
    }

    fn minify_rule(&self, edit: &mut SourceEdit<'_>, rule: &Rule) {
        let mut c = rule.start;
        let mut started = false;
        for selector in &rule.selectors {
            if !(selector.used || rule.in_keyframes) {
                continue;
            }
            let separator = if started { "," } else { "" };
            if selector.start.saturating_sub(c) as usize > separator.len() {
                edit.overwrite(c, selector.start, separator);
            }
            c = selector.end;
            started = true;
        }
        edit.remove(c, rule.block_start);

        c = rule.block_start + 1;
        for (i, declaration) in rule.declarations.iter().enumerate() {
            let separator = if i > 0 { ";" } else { "" };
            if declaration.start.saturating_sub(c) as usize > separator.len() {
                edit.overwrite(c, declaration.start, separator);
            }
            self.minify_declaration(edit, declaration);
            c = declaration.end;
        }
        edit.remove(c, rule.block_end.saturating_sub(1));
    }

    fn minify_declaration(&self, edit: &mut SourceEdit<'_>, declaration: &Declaration) {
        if declaration.property.starts_with("--") {
            return;
        }
        let c = declaration.start + declaration.property.len() as u32;
        let mut start = declaration.value_start.max(c);
        while edit.char_at(start).is_some_and(|ch| ch.is_whitespace() || ch == ':') && start < declaration.end {
            start += 1;
        }
        if start - c > 1 {
            edit.overwrite(c, start, ":");
        }
    }

    fn minify_atrule(&self, edit: &mut SourceEdit<'_>, at: &Atrule, kept: &[bool]) {
        let mut c = at.start + 1 + at.name.len() as u32;
        if let Some((prelude_start, prelude_end)) = at.prelude {
            let tight = at.name.eq_ignore_ascii_case("media") && edit.char_at(prelude_start) == Some('(');
            if tight {
                edit.remove(c, prelude_start);
            } else if prelude_start > c + 1 {
                edit.overwrite(c, prelude_start, " ");
            }
            c = prelude_end;
        }
        let Some((block_start, block_end)) = at.block else {
            return;
        };
        edit.remove(c, block_start);

        c = block_start + 1;
        let mut previous_declaration = false;
        for member in &at.members {
            match member {
                Member::Item(index) => {
                    if !kept[*index] {
                        continue;
                    }
                    let (start, end) = self.items[*index].span();
                    edit.remove(c, start);
                    c = end;
                    previous_declaration = false;
                }
                Member::Declaration(declaration) => {
                    let separator = if previous_declaration { ";" } else { "" };
                    if declaration.start.saturating_sub(c) as usize > separator.len() {
                        edit.overwrite(c, declaration.start, separator);
                    }
                    self.minify_declaration(edit, declaration);
                    c = declaration.end;
                    previous_declaration = true;
                }
            }
        }
        edit.remove(c, block_end.saturating_sub(1));
    }
}

fn add_scope_class(element: &mut ElementNode, id: &str) {
    let Some(attr) = element.attribute_mut("class") else {
        element.attributes.push(AttributeNode::Attribute(Attribute {
            name: "class".to_string(),
            value: AttributeValue::Sequence(vec![text_chunk(id)]),
            start: element.start,
            end: element.start,
        }));
        return;
    };

    match &mut attr.value {
        AttributeValue::Boolean(_) => attr.value = AttributeValue::Sequence(vec![text_chunk(id)]),
        AttributeValue::Sequence(chunks) => match chunks.as_mut_slice() {
            [AttributeChunk::Text(text)] => {
                text.data.push(' ');
                text.data.push_str(id);
            }
            _ => chunks.push(text_chunk(&format!(" {}", id))),
        },
        AttributeValue::Expression(tag) => {
            let tag: ExpressionTag = tag.clone();
            attr.value = AttributeValue::Sequence(vec![
                AttributeChunk::ExpressionTag(tag),
                text_chunk(&format!(" {}", id)),
            ]);
        }
    }
}

fn text_chunk(data: &str) -> AttributeChunk {
    AttributeChunk::Text(TextNode {
        data: data.to_string(),
        ..Default::default()
    })
}
