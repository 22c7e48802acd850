use crate::ast::{EachBlock, ElementNode, ExpressionTag, Fragment, IfBlock, Root, TemplateNode, TextNode};

/// The TemplateVisitor trait is the single traversal mechanism for passes that
/// rewrite the foreign AST in place before the IR transform runs.
///
/// Rules:
/// 1. Traversal order is document order and fixed.
/// 2. Implementers override `visit_*` methods to add behavior.
/// 3. Implementers call the matching `walk_*` function to continue traversal
///    unless pruning is intended.
pub trait TemplateVisitor {
    fn visit_root(&mut self, root: &mut Root) {
        walk_root(self, root);
    }

    fn visit_fragment(&mut self, fragment: &mut Fragment) {
        walk_fragment(self, fragment);
    }

    fn visit_node(&mut self, node: &mut TemplateNode) {
        walk_node(self, node);
    }

    fn visit_element(&mut self, element: &mut ElementNode) {
        walk_element(self, element);
    }

    fn visit_text(&mut self, _text: &mut TextNode) {}

    fn visit_expression_tag(&mut self, _tag: &mut ExpressionTag) {}

    fn visit_if_block(&mut self, block: &mut IfBlock) {
        walk_if_block(self, block);
    }

    fn visit_each_block(&mut self, block: &mut EachBlock) {
        walk_each_block(self, block);
    }
}

pub fn walk_root<V: TemplateVisitor + ?Sized>(visitor: &mut V, root: &mut Root) {
    visitor.visit_fragment(&mut root.fragment);
}

pub fn walk_fragment<V: TemplateVisitor + ?Sized>(visitor: &mut V, fragment: &mut Fragment) {
    for node in &mut fragment.nodes {
        visitor.visit_node(node);
    }
}

pub fn walk_node<V: TemplateVisitor + ?Sized>(visitor: &mut V, node: &mut TemplateNode) {
    match node {
        TemplateNode::RegularElement(el)
        | TemplateNode::Component(el)
        | TemplateNode::SlotElement(el)
        | TemplateNode::SvelteFragment(el) => visitor.visit_element(el),
        TemplateNode::Text(t) => visitor.visit_text(t),
        TemplateNode::ExpressionTag(tag) | TemplateNode::HtmlTag(tag) => {
            visitor.visit_expression_tag(tag)
        }
        TemplateNode::IfBlock(block) => visitor.visit_if_block(block),
        TemplateNode::EachBlock(block) => visitor.visit_each_block(block),
        TemplateNode::Comment(_) => {}
    }
}

pub fn walk_element<V: TemplateVisitor + ?Sized>(visitor: &mut V, element: &mut ElementNode) {
    visitor.visit_fragment(&mut element.fragment);
}

pub fn walk_if_block<V: TemplateVisitor + ?Sized>(visitor: &mut V, block: &mut IfBlock) {
    visitor.visit_fragment(&mut block.consequent);
    if let Some(alternate) = &mut block.alternate {
        visitor.visit_fragment(alternate);
    }
}

pub fn walk_each_block<V: TemplateVisitor + ?Sized>(visitor: &mut V, block: &mut EachBlock) {
    visitor.visit_fragment(&mut block.body);
    if let Some(fallback) = &mut block.fallback {
        visitor.visit_fragment(fallback);
    }
}
