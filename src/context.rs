//! Transform context
//!
//! One `TransformContext` value exists per visited node. Child contexts are
//! derived with [`TransformContext::create`]: registries, the id allocator and
//! the block stack live behind a shared handle, while the per-node accumulators
//! (`dynamic`, `template`, `children_template`, `slots`) start fresh so a
//! child can never write into a sibling's state.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashSet};
use std::rc::Rc;

use crate::ast::{ElementNode, JsNode, Root, TemplateNode};
use crate::compile::CompileOptions;
use crate::expression::{is_constant_expression, resolve_expression};
use crate::ir::{BlockIRNode, DynamicFlag, IRDynamicInfo, IREffect, IRSlot, OperationNode, SimpleExpression};
use crate::transform::TransformRegistry;
use crate::validate::{CompilerError, CompilerWarning, LineIndex};

/// Deferred work returned by a node transform, run after the node's subtree.
pub type ExitFn<'a> = Box<dyn FnOnce(&mut TransformContext<'a>) + 'a>;

/// Identity of an AST node for the engine's visited set.
pub type NodeKey = usize;

// ═══════════════════════════════════════════════════════════════════════════════
// NODE REFERENCES
// ═══════════════════════════════════════════════════════════════════════════════

/// What a context currently points at. Structural transforms swap an element
/// or block for the fragment they open, the way a node replacement works.
#[derive(Clone)]
pub enum NodeRef<'a> {
    Root(&'a Root),
    Node(&'a TemplateNode),
    /// The body of a block (`{#if}` branch, `{#each}` body, outlet fallback).
    Fragment(&'a [TemplateNode]),
    /// Children routed to one component slot; not contiguous in the source.
    Slot(Rc<[&'a TemplateNode]>),
}

impl<'a> NodeRef<'a> {
    pub fn children(&self) -> Vec<&'a TemplateNode> {
        match self {
            NodeRef::Root(root) => root.fragment.nodes.iter().collect(),
            NodeRef::Node(node) => match node.element() {
                Some(el) => el.fragment.nodes.iter().collect(),
                None => Vec::new(),
            },
            NodeRef::Fragment(nodes) => nodes.iter().collect(),
            NodeRef::Slot(nodes) => nodes.to_vec(),
        }
    }

    pub fn key(&self) -> Option<NodeKey> {
        match self {
            NodeRef::Node(node) => Some(node_key(node)),
            _ => None,
        }
    }

    pub fn template_node(&self) -> Option<&'a TemplateNode> {
        match self {
            NodeRef::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn element(&self) -> Option<&'a ElementNode> {
        self.template_node().and_then(|n| n.element())
    }

    /// Root and block bodies: children are returned, not appended to a parent template.
    pub fn is_fragment(&self) -> bool {
        !matches!(self, NodeRef::Node(_))
    }

    pub fn is_root(&self) -> bool {
        matches!(self, NodeRef::Root(_))
    }
}

pub fn node_key(node: &TemplateNode) -> NodeKey {
    node as *const TemplateNode as usize
}

/// Persistent parent chain. Cloning a context shares it.
pub struct ParentLink<'a> {
    pub node: NodeRef<'a>,
    pub parent: Option<Rc<ParentLink<'a>>>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SHARED STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Registries shared by every context of one compile.
pub struct SharedState {
    pub template: Vec<String>,
    pub component: BTreeSet<String>,
    pub directive: BTreeSet<String>,
    /// Innermost open block last.
    pub blocks: Vec<BlockIRNode>,
    pub next_id: u32,
    pub visited: HashSet<NodeKey>,
    pub errors: Vec<CompilerError>,
    pub warnings: Vec<CompilerWarning>,
    pub lines: LineIndex,
}

impl SharedState {
    pub fn new(source: &str, root_block: BlockIRNode) -> Self {
        Self {
            template: Vec::new(),
            component: BTreeSet::new(),
            directive: BTreeSet::new(),
            blocks: vec![root_block],
            next_id: 0,
            visited: HashSet::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            lines: LineIndex::new(source),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONTEXT
// ═══════════════════════════════════════════════════════════════════════════════

pub struct TransformContext<'a> {
    pub source: &'a str,
    pub options: &'a CompileOptions,
    pub shared: Rc<RefCell<SharedState>>,
    pub registry: Rc<TransformRegistry>,

    pub node: NodeRef<'a>,
    pub parent: Option<Rc<ParentLink<'a>>>,
    pub index: usize,

    pub dynamic: IRDynamicInfo,
    pub template: String,
    pub children_template: Vec<String>,
    pub slots: Vec<IRSlot>,

    pub in_v_once: bool,
    pub in_v_for: u32,
    /// The current node was consumed before the engine reached it.
    pub seen: bool,
    /// Set by a transform to drop the current node.
    pub removed: bool,
}

impl<'a> TransformContext<'a> {
    pub fn new_root(
        root: &'a Root,
        source: &'a str,
        options: &'a CompileOptions,
        registry: Rc<TransformRegistry>,
    ) -> Self {
        let block = BlockIRNode::new(root.start, root.end.max(source.len() as u32));
        Self {
            source,
            options,
            shared: Rc::new(RefCell::new(SharedState::new(source, block))),
            registry,
            node: NodeRef::Root(root),
            parent: None,
            index: 0,
            dynamic: IRDynamicInfo::default(),
            template: String::new(),
            children_template: Vec::new(),
            slots: Vec::new(),
            in_v_once: false,
            in_v_for: 0,
            seen: false,
            removed: false,
        }
    }

    /// Derives the context for the `index`-th child of the current node.
    pub fn create(&self, node: NodeRef<'a>, index: usize) -> TransformContext<'a> {
        TransformContext {
            source: self.source,
            options: self.options,
            shared: Rc::clone(&self.shared),
            registry: Rc::clone(&self.registry),
            parent: Some(Rc::new(ParentLink {
                node: self.node.clone(),
                parent: self.parent.clone(),
            })),
            node,
            index,
            dynamic: IRDynamicInfo::default(),
            template: String::new(),
            children_template: Vec::new(),
            slots: Vec::new(),
            in_v_once: self.in_v_once,
            in_v_for: self.in_v_for,
            seen: false,
            removed: false,
        }
    }

    /// Source text and position of an embedded expression.
    pub fn resolve(&self, node: &JsNode) -> SimpleExpression {
        resolve_expression(node, self.source, &self.shared.borrow().lines)
    }

    pub fn is_component(&self) -> bool {
        matches!(self.node.template_node(), Some(TemplateNode::Component(_)))
    }

    pub fn parent_node(&self) -> Option<&NodeRef<'a>> {
        self.parent.as_ref().map(|link| &link.node)
    }

    // ───────────────────────────────────────────────────────────────────────────
    // ids & templates
    // ───────────────────────────────────────────────────────────────────────────

    pub fn increase_id(&mut self) -> u32 {
        let mut shared = self.shared.borrow_mut();
        let id = shared.next_id;
        shared.next_id += 1;
        id
    }

    /// Runtime handle for the current node, allocated on first use.
    pub fn reference(&mut self) -> u32 {
        if let Some(id) = self.dynamic.id {
            return id;
        }
        self.dynamic.flags |= DynamicFlag::REFERENCED;
        let id = self.increase_id();
        self.dynamic.id = Some(id);
        id
    }

    pub fn push_template(&mut self, content: String) -> usize {
        let mut shared = self.shared.borrow_mut();
        if let Some(existing) = shared.template.iter().position(|t| *t == content) {
            return existing;
        }
        shared.template.push(content);
        shared.template.len() - 1
    }

    pub fn register_template(&mut self) -> Option<usize> {
        if self.template.is_empty() {
            return None;
        }
        let id = self.push_template(self.template.clone());
        self.dynamic.template = Some(id);
        Some(id)
    }

    // ───────────────────────────────────────────────────────────────────────────
    // operations & effects
    // ───────────────────────────────────────────────────────────────────────────

    pub fn register_operation(&mut self, operation: OperationNode) {
        if let Some(block) = self.shared.borrow_mut().blocks.last_mut() {
            block.operation.push(operation);
        }
    }

    pub fn push_return(&mut self, id: u32) {
        if let Some(block) = self.shared.borrow_mut().blocks.last_mut() {
            block.returns.push(id);
        }
    }

    /// Registers operations that re-run when any of `expressions` changes.
    ///
    /// Constant expressions are dropped first. With nothing left to track, or
    /// inside a run-once subtree, the operations run once at creation. An
    /// effect with the same expression contents is reused.
    pub fn register_effect(
        &mut self,
        expressions: Vec<SimpleExpression>,
        operations: Vec<OperationNode>,
    ) {
        let expressions: Vec<SimpleExpression> = expressions
            .into_iter()
            .filter(|e| !is_constant_expression(e))
            .collect();

        let mut shared = self.shared.borrow_mut();
        let Some(block) = shared.blocks.last_mut() else {
            return;
        };

        if self.in_v_once || expressions.is_empty() {
            block.operation.extend(operations);
            return;
        }

        let existing = block.effect.iter_mut().find(|effect| {
            effect.expressions.len() == expressions.len()
                && effect
                    .expressions
                    .iter()
                    .zip(&expressions)
                    .all(|(a, b)| a.content == b.content)
        });
        match existing {
            Some(effect) => effect.operations.extend(operations),
            None => block.effect.push(IREffect {
                expressions,
                operations,
            }),
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // blocks
    // ───────────────────────────────────────────────────────────────────────────

    /// Opens `block` as the target of new operations. The per-node
    /// accumulators are parked in the returned guard until [`BlockExit::exit`].
    pub fn enter_block(&mut self, mut block: BlockIRNode, is_for: bool) -> BlockExit {
        let saved = BlockExit {
            template: std::mem::take(&mut self.template),
            children_template: std::mem::take(&mut self.children_template),
            dynamic: std::mem::replace(&mut self.dynamic, std::mem::take(&mut block.dynamic)),
            slots: std::mem::take(&mut self.slots),
            is_for,
        };
        if is_for {
            self.in_v_for += 1;
        }
        self.shared.borrow_mut().blocks.push(block);
        saved
    }

    // ───────────────────────────────────────────────────────────────────────────
    // registries
    // ───────────────────────────────────────────────────────────────────────────

    pub fn add_component(&mut self, name: &str) {
        self.shared.borrow_mut().component.insert(name.to_string());
    }

    pub fn add_directive(&mut self, name: &str) {
        self.shared.borrow_mut().directive.insert(name.to_string());
    }

    /// Records that `node` was consumed ahead of the engine reaching it.
    pub fn mark_seen(&mut self, node: &TemplateNode) {
        self.shared.borrow_mut().visited.insert(node_key(node));
    }

    pub fn remove_node(&mut self) {
        self.removed = true;
    }

    // ───────────────────────────────────────────────────────────────────────────
    // diagnostics
    // ───────────────────────────────────────────────────────────────────────────

    pub fn report(&mut self, error: CompilerError) {
        tracing::debug!(code = %error.code, line = error.line, "transform error");
        self.shared.borrow_mut().errors.push(error);
    }

    /// Builds an error positioned at `start..end` without reporting it.
    pub fn locate_error(&self, code: &str, message: &str, start: u32, end: u32) -> CompilerError {
        let loc = self.shared.borrow().lines.locate(start);
        let context = self
            .source
            .get(start as usize..end as usize)
            .map(|s| s.to_string());
        CompilerError::with_details(
            code,
            message,
            &self.options.filename,
            loc.line,
            loc.column,
            context,
            vec![],
        )
    }

    pub fn error_at(&mut self, code: &str, message: &str, start: u32, end: u32) {
        let error = self.locate_error(code, message, start, end);
        self.report(error);
    }

    pub fn warn(&mut self, code: &str, message: &str, start: u32) {
        let mut shared = self.shared.borrow_mut();
        let loc = shared.lines.locate(start);
        shared.warnings.push(CompilerWarning {
            code: code.to_string(),
            message: message.to_string(),
            file: self.options.filename.clone(),
            line: loc.line,
            column: loc.column,
        });
    }
}

/// Saved per-node state of the context that opened a block.
#[must_use = "a block stays open until its exit guard runs"]
pub struct BlockExit {
    template: String,
    children_template: Vec<String>,
    dynamic: IRDynamicInfo,
    slots: Vec<IRSlot>,
    is_for: bool,
}

impl BlockExit {
    /// Registers the block's pending template, closes it and restores the
    /// opener's state. The finished block is handed back by value.
    pub fn exit(self, ctx: &mut TransformContext<'_>) -> BlockIRNode {
        ctx.register_template();
        let mut block = ctx.shared.borrow_mut().blocks.pop().unwrap_or_default();
        block.dynamic = std::mem::replace(&mut ctx.dynamic, self.dynamic);
        ctx.template = self.template;
        ctx.children_template = self.children_template;
        ctx.slots = self.slots;
        if self.is_for {
            ctx.in_v_for = ctx.in_v_for.saturating_sub(1);
        }
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::TransformRegistry;

    fn with_root_context(f: impl FnOnce(&mut TransformContext<'_>)) {
        let root = Root::default();
        let options = CompileOptions::default();
        let registry = Rc::new(TransformRegistry::new(&options));
        let mut ctx = TransformContext::new_root(&root, "", &options, registry);
        f(&mut ctx);
    }

    #[test]
    fn test_reference_is_idempotent() {
        with_root_context(|ctx| {
            let first = ctx.reference();
            assert_eq!(ctx.reference(), first);
            assert!(ctx.dynamic.flags.contains(DynamicFlag::REFERENCED));
            assert_eq!(ctx.increase_id(), first + 1);
        });
    }

    #[test]
    fn test_templates_are_interned() {
        with_root_context(|ctx| {
            let a = ctx.push_template("<div></div>".to_string());
            let b = ctx.push_template("<p></p>".to_string());
            let again = ctx.push_template("<div></div>".to_string());
            assert_eq!((a, b, again), (0, 1, 0));
            assert_eq!(ctx.shared.borrow().template.len(), 2);
        });
    }

    #[test]
    fn test_effects_merge_on_identical_expressions() {
        with_root_context(|ctx| {
            let count = || vec![SimpleExpression::new_dynamic("count", None)];
            let set_text = |element| OperationNode::SetText {
                element,
                values: count(),
            };
            ctx.register_effect(count(), vec![set_text(0)]);
            ctx.register_effect(count(), vec![set_text(1)]);
            ctx.register_effect(
                vec![SimpleExpression::new_dynamic("\"x\"", None)],
                vec![set_text(2)],
            );

            let shared = ctx.shared.borrow();
            let block = &shared.blocks[0];
            assert_eq!(block.effect.len(), 1, "same dependency shares one effect");
            assert_eq!(block.effect[0].operations.len(), 2);
            assert_eq!(block.operation.len(), 1, "constant expressions run once");
        });
    }

    #[test]
    fn test_v_once_scope_skips_effects() {
        with_root_context(|ctx| {
            ctx.in_v_once = true;
            ctx.register_effect(
                vec![SimpleExpression::new_dynamic("count", None)],
                vec![OperationNode::DeclareOldRef { id: 0 }],
            );
            let shared = ctx.shared.borrow();
            assert!(shared.blocks[0].effect.is_empty());
            assert_eq!(shared.blocks[0].operation.len(), 1);
        });
    }

    #[test]
    fn test_enter_block_restores_state() {
        with_root_context(|ctx| {
            ctx.template.push_str("<outer>");
            ctx.reference();
            let guard = ctx.enter_block(BlockIRNode::new(0, 0), true);
            assert_eq!(ctx.in_v_for, 1);
            assert!(ctx.template.is_empty());
            ctx.template.push_str("<li></li>");
            ctx.register_operation(OperationNode::DeclareOldRef { id: 9 });
            let block = guard.exit(ctx);

            assert_eq!(ctx.in_v_for, 0);
            assert_eq!(ctx.template, "<outer>");
            assert_eq!(ctx.dynamic.id, Some(0));
            assert_eq!(block.operation.len(), 1);
            assert_eq!(block.dynamic.template, Some(0));
            assert_eq!(ctx.shared.borrow().blocks.len(), 1);
        });
    }
}
