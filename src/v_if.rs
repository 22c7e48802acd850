use crate::ast::{Fragment, IfBlock, TemplateNode};
use crate::context::{ExitFn, NodeRef, TransformContext};
use crate::expression::is_constant_expression;
use crate::ir::{BlockIRNode, DynamicFlag, IfIRNode, IfNegative, OperationNode};
use crate::transform::{build_block, nodes_span};

fn branch_span(fragment: &Fragment, owner: &IfBlock) -> (u32, u32) {
    if fragment.nodes.is_empty() {
        (owner.start, owner.end)
    } else {
        nodes_span(&fragment.nodes)
    }
}

/// `{#if}` opens the positive branch as a block on enter; the `{:else if}`
/// chain and the final `{:else}` are built when the branch closes.
pub fn transform_v_if<'a>(ctx: &mut TransformContext<'a>) -> Option<Vec<ExitFn<'a>>> {
    let Some(TemplateNode::IfBlock(block)) = ctx.node.template_node() else {
        return None;
    };

    ctx.dynamic.flags |= DynamicFlag::NON_TEMPLATE | DynamicFlag::INSERT;
    let id = ctx.reference();
    let condition = ctx.resolve(&block.test);

    let (start, end) = branch_span(&block.consequent, block);
    ctx.node = NodeRef::Fragment(&block.consequent.nodes);
    let positive = ctx.enter_block(BlockIRNode::new(start, end), false);

    let exit: ExitFn<'a> = Box::new(move |ctx: &mut TransformContext<'a>| {
        let positive = positive.exit(ctx);
        let negative = build_negative(ctx, block);
        let once = ctx.in_v_once || is_constant_expression(&condition);
        ctx.register_operation(OperationNode::If(IfIRNode {
            id: Some(id),
            condition,
            positive,
            negative,
            once,
        }));
    });
    Some(vec![exit])
}

fn build_negative<'a>(ctx: &mut TransformContext<'a>, block: &'a IfBlock) -> Option<IfNegative> {
    let alternate = block.alternate.as_ref()?;

    match block.else_if() {
        Some(nested) => {
            let condition = ctx.resolve(&nested.test);
            let positive = build_block(
                ctx,
                NodeRef::Fragment(&nested.consequent.nodes),
                branch_span(&nested.consequent, nested),
                false,
            );
            let negative = build_negative(ctx, nested);
            let once = ctx.in_v_once || is_constant_expression(&condition);
            Some(IfNegative::If(Box::new(IfIRNode {
                id: None,
                condition,
                positive,
                negative,
                once,
            })))
        }
        None => Some(IfNegative::Block(build_block(
            ctx,
            NodeRef::Fragment(&alternate.nodes),
            branch_span(alternate, block),
            false,
        ))),
    }
}
