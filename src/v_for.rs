use crate::ast::{EachBlock, TemplateNode};
use crate::context::{ExitFn, NodeRef, TransformContext};
use crate::expression::is_constant_expression;
use crate::ir::{
    BlockIRNode, DynamicFlag, ForIRNode, IRDynamicInfo, IfIRNode, IfNegative, OperationNode,
    SimpleExpression,
};
use crate::transform::{build_block, nodes_span};
use crate::validate::X_V_FOR_MALFORMED;

/// The body renders a single component per item.
fn renders_component(each: &EachBlock) -> bool {
    let mut significant = each
        .body
        .nodes
        .iter()
        .filter(|n| !n.is_whitespace_text() && !n.is_comment());
    matches!(
        (significant.next(), significant.next()),
        (Some(TemplateNode::Component(_)), None)
    )
}

/// `{#each source as value, index (key)}`. The loop value is carried as raw
/// pattern text, destructuring included.
pub fn transform_v_for<'a>(ctx: &mut TransformContext<'a>) -> Option<Vec<ExitFn<'a>>> {
    let Some(TemplateNode::EachBlock(each)) = ctx.node.template_node() else {
        return None;
    };

    ctx.dynamic.flags |= DynamicFlag::NON_TEMPLATE | DynamicFlag::INSERT;
    let id = ctx.reference();

    let source = ctx.resolve(&each.expression);
    if source.content.is_empty() {
        ctx.error_at(
            X_V_FOR_MALFORMED,
            "{#each} is missing its iterable expression",
            each.start,
            each.end,
        );
    }
    let value = each.context.as_ref().map(|c| ctx.resolve(c));
    let index = each
        .index
        .as_ref()
        .map(|i| SimpleExpression::new_dynamic(i.clone(), None));
    let key = each
        .key_alias
        .as_ref()
        .map(|k| SimpleExpression::new_dynamic(k.clone(), None));
    let key_prop = each.key.as_ref().map(|k| ctx.resolve(k));
    let component = renders_component(each);

    let (start, end) = if each.body.nodes.is_empty() {
        (each.start, each.end)
    } else {
        nodes_span(&each.body.nodes)
    };
    ctx.node = NodeRef::Fragment(&each.body.nodes);
    let render = ctx.enter_block(BlockIRNode::new(start, end), true);

    let exit: ExitFn<'a> = Box::new(move |ctx: &mut TransformContext<'a>| {
        let render = render.exit(ctx);
        let once = ctx.in_v_once || is_constant_expression(&source);
        let mut for_node = ForIRNode {
            id,
            source,
            value,
            key,
            index,
            key_prop,
            render,
            once,
            component,
        };

        let Some(fallback) = &each.fallback else {
            ctx.register_operation(OperationNode::For(for_node));
            return;
        };

        // `{:else}` turns the loop into `if (source.length) loop else fallback`.
        for_node.id = ctx.increase_id();
        let condition = SimpleExpression::new_dynamic(
            format!("({}).length", for_node.source.content),
            for_node.source.loc,
        );
        let mut positive = BlockIRNode::new(each.start, each.end);
        positive.dynamic.children.push(IRDynamicInfo {
            flags: DynamicFlag::REFERENCED | DynamicFlag::NON_TEMPLATE | DynamicFlag::INSERT,
            id: Some(for_node.id),
            ..Default::default()
        });
        positive.returns.push(for_node.id);
        positive.operation.push(OperationNode::For(for_node));

        let span = if fallback.nodes.is_empty() {
            (each.start, each.end)
        } else {
            nodes_span(&fallback.nodes)
        };
        let negative = build_block(ctx, NodeRef::Fragment(&fallback.nodes), span, false);

        ctx.register_operation(OperationNode::If(IfIRNode {
            id: Some(id),
            condition,
            positive,
            negative: Some(IfNegative::Block(negative)),
            once,
        }));
    });
    Some(vec![exit])
}
