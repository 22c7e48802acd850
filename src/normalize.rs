//! Whitespace normalization
//!
//! Runs over the owned AST before the IR transform so the children pass only
//! ever sees condensed text. `<pre>` and `<textarea>` keep their content
//! verbatim. `<svelte:fragment>` wrappers outside a component have no slot to
//! feed and are replaced by their children.

use regex::Regex;

use crate::ast::{ElementNode, Fragment, Root, TemplateNode};
use crate::visitor::{walk_element, walk_node, TemplateVisitor};

lazy_static::lazy_static! {
    static ref WHITESPACE_RUN: Regex = Regex::new(r"[ \t\r\n\f]+").unwrap();
}

const PRESERVE_TAGS: &[&str] = &["pre", "textarea"];

pub fn normalize_root(root: &mut Root) {
    let mut pass = WhitespacePass::default();
    pass.visit_root(root);
    tracing::trace!(dropped = pass.dropped, "whitespace normalized");
}

#[derive(Default)]
struct WhitespacePass {
    preserve_depth: u32,
    component_depth: u32,
    dropped: usize,
}

impl WhitespacePass {
    fn splice_fragments(&self, fragment: &mut Fragment) {
        if self.component_depth > 0 {
            return;
        }
        let needs_splice = fragment
            .nodes
            .iter()
            .any(|n| matches!(n, TemplateNode::SvelteFragment(_)));
        if !needs_splice {
            return;
        }
        let nodes = std::mem::take(&mut fragment.nodes);
        for node in nodes {
            match node {
                TemplateNode::SvelteFragment(inner) => fragment.nodes.extend(inner.fragment.nodes),
                other => fragment.nodes.push(other),
            }
        }
    }

    fn condense(&mut self, fragment: &mut Fragment) {
        let nodes = std::mem::take(&mut fragment.nodes);
        let last = nodes.len().saturating_sub(1);
        for (index, mut node) in nodes.into_iter().enumerate() {
            if let TemplateNode::Text(text) = &mut node {
                if text.data.trim().is_empty() {
                    if index == 0 || index == last {
                        self.dropped += 1;
                        continue;
                    }
                    text.data = " ".to_string();
                } else {
                    text.data = WHITESPACE_RUN.replace_all(&text.data, " ").into_owned();
                }
            }
            fragment.nodes.push(node);
        }
    }
}

impl TemplateVisitor for WhitespacePass {
    fn visit_fragment(&mut self, fragment: &mut Fragment) {
        self.splice_fragments(fragment);
        if self.preserve_depth == 0 {
            self.condense(fragment);
        }
        for node in &mut fragment.nodes {
            self.visit_node(node);
        }
    }

    fn visit_node(&mut self, node: &mut TemplateNode) {
        match node {
            TemplateNode::Component(el) => {
                self.component_depth += 1;
                self.visit_element(el);
                self.component_depth -= 1;
            }
            TemplateNode::RegularElement(el) | TemplateNode::SlotElement(el) => {
                // A component's grandchildren are outside its slot boundary.
                let saved = std::mem::replace(&mut self.component_depth, 0);
                self.visit_element(el);
                self.component_depth = saved;
            }
            other => walk_node(self, other),
        }
    }

    fn visit_element(&mut self, element: &mut ElementNode) {
        let preserve = PRESERVE_TAGS.iter().any(|t| element.name.eq_ignore_ascii_case(t));
        if preserve {
            self.preserve_depth += 1;
        }
        walk_element(self, element);
        if preserve {
            self.preserve_depth -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn root(value: serde_json::Value) -> Root {
        serde_json::from_value(value).expect("root json")
    }

    fn texts(fragment: &Fragment) -> Vec<String> {
        fragment
            .nodes
            .iter()
            .map(|n| match n {
                TemplateNode::Text(t) => t.data.clone(),
                TemplateNode::RegularElement(el) => format!("<{}>", el.name),
                _ => "?".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_trims_edges_and_condenses_interior() {
        let mut ast = root(json!({ "fragment": { "nodes": [
            { "type": "Text", "data": "\n  ", "start": 0, "end": 3 },
            { "type": "RegularElement", "name": "b", "start": 3, "end": 10 },
            { "type": "Text", "data": "\n\n", "start": 10, "end": 12 },
            { "type": "Text", "data": "a   \n b", "start": 12, "end": 19 },
            { "type": "Text", "data": "  ", "start": 19, "end": 21 }
        ]}}));
        normalize_root(&mut ast);
        assert_eq!(texts(&ast.fragment), vec!["<b>", " ", "a b"]);
    }

    #[test]
    fn test_pre_content_is_untouched() {
        let mut ast = root(json!({ "fragment": { "nodes": [
            { "type": "RegularElement", "name": "pre", "start": 0, "end": 20,
              "fragment": { "nodes": [ { "type": "Text", "data": "  a\n   b  ", "start": 5, "end": 14 } ] } }
        ]}}));
        normalize_root(&mut ast);
        let pre = ast.fragment.nodes[0].element().expect("pre");
        assert_eq!(texts(&pre.fragment), vec!["  a\n   b  "]);
    }

    #[test]
    fn test_svelte_fragment_outside_component_is_spliced() {
        let mut ast = root(json!({ "fragment": { "nodes": [
            { "type": "SvelteFragment", "name": "svelte:fragment", "start": 0, "end": 40,
              "fragment": { "nodes": [
                  { "type": "RegularElement", "name": "i", "start": 17, "end": 24 },
                  { "type": "RegularElement", "name": "u", "start": 24, "end": 31 }
              ] } }
        ]}}));
        normalize_root(&mut ast);
        assert_eq!(texts(&ast.fragment), vec!["<i>", "<u>"]);
    }
}
