use crate::context::{ExitFn, TransformContext};
use crate::expression::is_constant_expression;
use crate::ir::OperationNode;

/// `bind:this={target}` on elements and components.
pub fn transform_template_ref<'a>(ctx: &mut TransformContext<'a>) -> Option<Vec<ExitFn<'a>>> {
    let el = ctx.node.element()?;
    let expression = el.binding("this")?.expression.as_ref()?;

    let exit: ExitFn<'a> = Box::new(move |ctx: &mut TransformContext<'a>| {
        let value = ctx.resolve(expression);
        let id = ctx.reference();
        let effect = !is_constant_expression(&value);
        if effect {
            ctx.register_operation(OperationNode::DeclareOldRef { id });
        }
        let ref_for = ctx.in_v_for > 0;
        ctx.register_effect(
            vec![value.clone()],
            vec![OperationNode::SetTemplateRef {
                element: id,
                value,
                ref_for,
                effect,
            }],
        );
    });
    Some(vec![exit])
}
