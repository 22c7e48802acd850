//! Template → IR transform
//!
//! The traversal engine and the transform registry. Node transforms run in
//! registration order on enter and may hand back exit callbacks, which run in
//! reverse order once the node's subtree is done.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use crate::ast::{Directive, ElementNode, Root};
use crate::compile::CompileOptions;
use crate::context::{ExitFn, NodeRef, TransformContext};
use crate::ir::{BlockIRNode, DirectiveTransformResult, RootIRNode};
use crate::validate::{CompilerError, CompilerWarning};
use crate::{
    slot_outlet, template_ref, transform_children, transform_element, transform_text, v_bind, v_for,
    v_html, v_if, v_on, v_slot,
};

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSFORM SIGNATURES
// ═══════════════════════════════════════════════════════════════════════════════

pub type NodeTransform =
    Arc<dyn for<'a> Fn(&mut TransformContext<'a>) -> Option<Vec<ExitFn<'a>>> + Send + Sync>;

pub type DirectiveTransform = Arc<
    dyn for<'a> Fn(&Directive, &ElementNode, &mut TransformContext<'a>) -> Option<DirectiveTransformResult>
        + Send
        + Sync,
>;

// ═══════════════════════════════════════════════════════════════════════════════
// REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

pub struct TransformRegistry {
    pub node_transforms: Vec<NodeTransform>,
    pub directive_transforms: HashMap<String, DirectiveTransform>,
}

impl TransformRegistry {
    /// Built-ins first, then the caller's node transforms. Caller directive
    /// transforms replace built-ins of the same name.
    pub fn new(options: &CompileOptions) -> Self {
        let mut node_transforms: Vec<NodeTransform> = vec![
            Arc::new(transform_v_once),
            Arc::new(transform_text::transform_comment),
            Arc::new(v_if::transform_v_if),
            Arc::new(v_for::transform_v_for),
            Arc::new(slot_outlet::transform_slot_outlet),
            Arc::new(template_ref::transform_template_ref),
            Arc::new(transform_element::transform_element),
            Arc::new(transform_text::transform_text),
            Arc::new(v_html::transform_html_tag),
            Arc::new(v_slot::transform_v_slot),
            Arc::new(transform_children::transform_children),
        ];
        node_transforms.extend(options.node_transforms.iter().cloned());

        let mut directive_transforms: HashMap<String, DirectiveTransform> = HashMap::new();
        directive_transforms.insert("bind".to_string(), Arc::new(v_bind::transform_v_bind));
        directive_transforms.insert("on".to_string(), Arc::new(v_on::transform_v_on));
        for (name, transform) in &options.directive_transforms {
            directive_transforms.insert(name.clone(), Arc::clone(transform));
        }

        Self {
            node_transforms,
            directive_transforms,
        }
    }
}

/// Marks the subtree under a `v-once` element as run-once.
fn transform_v_once<'a>(ctx: &mut TransformContext<'a>) -> Option<Vec<ExitFn<'a>>> {
    if let Some(el) = ctx.node.element() {
        if el.attribute("v-once").is_some() {
            ctx.in_v_once = true;
        }
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

pub fn transform_node<'a>(ctx: &mut TransformContext<'a>) {
    ctx.seen = match ctx.node.key() {
        Some(key) => !ctx.shared.borrow_mut().visited.insert(key),
        None => false,
    };
    ctx.removed = false;

    let registry = Rc::clone(&ctx.registry);
    let mut exits: Vec<ExitFn<'a>> = Vec::new();
    for transform in &registry.node_transforms {
        if let Some(on_exit) = transform(ctx) {
            exits.extend(on_exit);
        }
        if ctx.removed {
            return;
        }
    }

    while let Some(exit) = exits.pop() {
        exit(ctx);
    }

    if ctx.node.is_root() {
        ctx.register_template();
    }
}

/// Transforms `node` inside a fresh block and returns the finished block.
/// The context points back at its own node afterwards.
pub fn build_block<'a>(
    ctx: &mut TransformContext<'a>,
    node: NodeRef<'a>,
    span: (u32, u32),
    is_for: bool,
) -> BlockIRNode {
    let saved_node = std::mem::replace(&mut ctx.node, node);
    let saved_seen = ctx.seen;
    let exit = ctx.enter_block(BlockIRNode::new(span.0, span.1), is_for);
    transform_node(ctx);
    let block = exit.exit(ctx);
    ctx.node = saved_node;
    ctx.seen = saved_seen;
    ctx.removed = false;
    block
}

/// Span covered by a list of sibling nodes.
pub fn nodes_span<'n>(nodes: impl IntoIterator<Item = &'n crate::ast::TemplateNode>) -> (u32, u32) {
    let mut span: Option<(u32, u32)> = None;
    for node in nodes {
        let (start, end) = node.span();
        span = Some(match span {
            Some((s, e)) => (s.min(start), e.max(end)),
            None => (start, end),
        });
    }
    span.unwrap_or((0, 0))
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY
// ═══════════════════════════════════════════════════════════════════════════════

pub struct TransformOutput {
    pub ir: RootIRNode,
    pub errors: Vec<CompilerError>,
    pub warnings: Vec<CompilerWarning>,
}

pub fn transform(root: &Root, source: &str, options: &CompileOptions) -> TransformOutput {
    let registry = Rc::new(TransformRegistry::new(options));
    let mut ctx = TransformContext::new_root(root, source, options, registry);

    tracing::debug!(file = %options.filename, "transform start");
    transform_node(&mut ctx);

    let dynamic = std::mem::take(&mut ctx.dynamic);
    let mut shared = ctx.shared.borrow_mut();
    let mut block = shared.blocks.pop().unwrap_or_default();
    block.dynamic = dynamic;

    let ir = RootIRNode {
        source: source.to_string(),
        template: std::mem::take(&mut shared.template),
        component: std::mem::take(&mut shared.component),
        directive: std::mem::take(&mut shared.directive),
        block,
    };
    tracing::debug!(
        file = %options.filename,
        templates = ir.template.len(),
        ids = shared.next_id,
        "transform done"
    );

    TransformOutput {
        ir,
        errors: std::mem::take(&mut shared.errors),
        warnings: std::mem::take(&mut shared.warnings),
    }
}
