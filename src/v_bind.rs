use crate::ast::{Directive, ElementNode};
use crate::context::TransformContext;
use crate::ir::{DirectiveTransformResult, OperationNode, SimpleExpression};
use crate::validate::{validate_binding_target, ERROR_TYPE_BINDING_TARGET, X_V_BIND_NO_EXPRESSION};

/// `bind:name={target}`.
///
/// Components receive the value as a prop plus an update handler. Native
/// elements get a model operation once the element is known to expose the
/// bound property; a mismatch is reported with the `BINDING_TARGET` type and
/// the binding is dropped.
pub fn transform_v_bind(
    dir: &Directive,
    element: &ElementNode,
    ctx: &mut TransformContext<'_>,
) -> Option<DirectiveTransformResult> {
    if dir.name == "this" {
        return None;
    }
    let Some(expression) = &dir.expression else {
        ctx.error_at(
            X_V_BIND_NO_EXPRESSION,
            &format!("`bind:{}` is missing a target expression", dir.name),
            dir.start,
            dir.end,
        );
        return None;
    };
    let value = ctx.resolve(expression);

    if ctx.is_component() {
        return Some(DirectiveTransformResult {
            key: SimpleExpression::new_static(dir.name.clone()),
            value,
            model: true,
            model_modifiers: Some(dir.modifiers.clone()),
            ..Default::default()
        });
    }

    match validate_binding_target(element, &dir.name) {
        Ok(model_type) => {
            let element_id = ctx.reference();
            ctx.register_effect(
                vec![value.clone()],
                vec![OperationNode::SetModelValue {
                    element: element_id,
                    key: dir.name.clone(),
                    value,
                    model_type,
                    modifiers: dir.modifiers.clone(),
                }],
            );
        }
        Err(violation) => {
            let error = ctx
                .locate_error(violation.code, &violation.message, dir.start, dir.end)
                .with_type(ERROR_TYPE_BINDING_TARGET);
            ctx.report(error);
        }
    }
    None
}
