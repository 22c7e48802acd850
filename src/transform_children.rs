//! Children processing
//!
//! Visits a container's children in child contexts, then classifies them:
//! fragment containers (root, block bodies, slots) return their children,
//! elements splice child templates into their own and turn runs of dynamic
//! children into insert/prepend operations.

use crate::ast::TemplateNode;
use crate::context::{ExitFn, NodeRef, TransformContext};
use crate::ir::{DynamicFlag, IRDynamicInfo, OperationNode};
use crate::transform::transform_node;

pub fn transform_children<'a>(ctx: &mut TransformContext<'a>) -> Option<Vec<ExitFn<'a>>> {
    let is_fragment = ctx.node.is_fragment();
    if !is_fragment && !matches!(ctx.node.template_node(), Some(TemplateNode::RegularElement(_))) {
        return None;
    }

    for (index, child) in ctx.node.children().into_iter().enumerate() {
        let mut child_ctx = ctx.create(NodeRef::Node(child), index);
        transform_node(&mut child_ctx);

        if child_ctx.removed {
            if !is_fragment {
                ctx.children_template.push(String::new());
            }
            ctx.dynamic.children.push(IRDynamicInfo {
                flags: DynamicFlag::NON_TEMPLATE,
                ..Default::default()
            });
            continue;
        }

        let flags = child_ctx.dynamic.flags;
        if is_fragment {
            // Nodes merged into a sibling have nothing to return.
            if !flags.contains(DynamicFlag::NON_TEMPLATE) || flags.contains(DynamicFlag::INSERT) {
                let id = child_ctx.reference();
                child_ctx.register_template();
                ctx.push_return(id);
            }
        } else {
            ctx.children_template.push(std::mem::take(&mut child_ctx.template));
        }

        let child_dynamic = std::mem::take(&mut child_ctx.dynamic);
        if child_dynamic.has_dynamic_child
            || child_dynamic.id.is_some()
            || child_dynamic
                .flags
                .intersects(DynamicFlag::NON_TEMPLATE | DynamicFlag::INSERT)
        {
            ctx.dynamic.has_dynamic_child = true;
        }
        ctx.dynamic.children.push(child_dynamic);
    }

    if !is_fragment {
        process_dynamic_children(ctx);
    }
    None
}

/// Groups consecutive inserted children and emits one operation per run:
/// anchored insert after static content, prepend before any, append at the end.
fn process_dynamic_children(ctx: &mut TransformContext<'_>) {
    let mut run: Vec<usize> = Vec::new();
    let mut has_static = false;

    for index in 0..ctx.dynamic.children.len() {
        let flags = ctx.dynamic.children[index].flags;
        if flags.contains(DynamicFlag::INSERT) {
            run.push(index);
        }
        if flags.contains(DynamicFlag::NON_TEMPLATE) {
            continue;
        }

        if !run.is_empty() {
            if has_static {
                if let Some(slot) = ctx.children_template.get_mut(run[0]) {
                    *slot = "<!>".to_string();
                }
                let anchor = ctx.increase_id();
                let first = &mut ctx.dynamic.children[run[0]];
                first.flags.remove(DynamicFlag::NON_TEMPLATE);
                first.anchor = Some(anchor);
                register_insertion(ctx, &run, Some(anchor));
            } else {
                register_prepend(ctx, &run);
            }
            run.clear();
        }
        has_static = true;
    }

    if !run.is_empty() {
        register_insertion(ctx, &run, None);
    }
}

fn run_ids(ctx: &TransformContext<'_>, run: &[usize]) -> Vec<u32> {
    run.iter()
        .filter_map(|&i| ctx.dynamic.children[i].id)
        .collect()
}

fn register_insertion(ctx: &mut TransformContext<'_>, run: &[usize], anchor: Option<u32>) {
    let elements = run_ids(ctx, run);
    let parent = ctx.reference();
    ctx.register_operation(OperationNode::InsertNode {
        elements,
        parent,
        anchor,
    });
}

fn register_prepend(ctx: &mut TransformContext<'_>, run: &[usize]) {
    let elements = run_ids(ctx, run);
    let parent = ctx.reference();
    ctx.register_operation(OperationNode::PrependNode { elements, parent });
}
