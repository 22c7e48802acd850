use crate::ast::{ElementNode, TemplateNode};
use crate::context::{ExitFn, NodeRef, TransformContext};
use crate::ir::{BlockIRNode, DynamicFlag, IRPropsEntry, OperationNode, SimpleExpression};
use crate::transform::nodes_span;
use crate::transform_element::{attribute_expression, build_props, PropsResult};

fn outlet_name(el: &ElementNode, ctx: &TransformContext<'_>) -> SimpleExpression {
    let Some(attr) = el.attribute("name") else {
        return SimpleExpression::new_static("default");
    };
    match attr.value.static_text() {
        Some(name) => SimpleExpression::new_static(name),
        None => attribute_expression(attr, ctx).unwrap_or_else(|| SimpleExpression::new_static("default")),
    }
}

/// `<slot name=… {...props}>fallback</slot>`. The fallback block is only
/// opened when the outlet has content of its own.
pub fn transform_slot_outlet<'a>(ctx: &mut TransformContext<'a>) -> Option<Vec<ExitFn<'a>>> {
    let Some(TemplateNode::SlotElement(el)) = ctx.node.template_node() else {
        return None;
    };

    let id = ctx.reference();
    ctx.dynamic.flags |= DynamicFlag::INSERT | DynamicFlag::NON_TEMPLATE;
    let name = outlet_name(el, ctx);

    let has_fallback = el.significant_children().next().is_some();
    let fallback = if has_fallback {
        let (start, end) = nodes_span(&el.fragment.nodes);
        ctx.node = NodeRef::Fragment(&el.fragment.nodes);
        Some(ctx.enter_block(BlockIRNode::new(start, end), false))
    } else {
        None
    };

    let exit: ExitFn<'a> = Box::new(move |ctx: &mut TransformContext<'a>| {
        let fallback = fallback.map(|open| open.exit(ctx));
        let props = match build_props(el, ctx, &["name"]) {
            PropsResult::Static(props) if props.is_empty() => Vec::new(),
            PropsResult::Static(props) => vec![IRPropsEntry::Static(props)],
            PropsResult::Dynamic { entries, .. } => entries,
        };
        ctx.register_operation(OperationNode::SlotOutlet {
            id,
            name,
            props,
            fallback,
        });
    });
    Some(vec![exit])
}
