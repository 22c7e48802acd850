use crate::ast::TemplateNode;
use crate::context::{ExitFn, TransformContext};
use crate::expression::is_constant_expression;
use crate::ir::{DynamicFlag, OperationNode, SimpleExpression};

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn transform_comment<'a>(ctx: &mut TransformContext<'a>) -> Option<Vec<ExitFn<'a>>> {
    let Some(TemplateNode::Comment(comment)) = ctx.node.template_node() else {
        return None;
    };
    if ctx.options.comments {
        ctx.template.push_str(&format!("<!--{}-->", comment.data));
    } else {
        ctx.remove_node();
    }
    None
}

pub fn transform_text<'a>(ctx: &mut TransformContext<'a>) -> Option<Vec<ExitFn<'a>>> {
    let node = ctx.node.template_node()?;
    match node {
        TemplateNode::Text(_) | TemplateNode::ExpressionTag(_) if ctx.seen => {
            ctx.dynamic.flags |= DynamicFlag::NON_TEMPLATE;
        }
        TemplateNode::Text(text) => ctx.template.push_str(&escape_html(&text.data)),
        TemplateNode::ExpressionTag(_) => process_text_like(ctx, node),
        _ => {}
    }
    None
}

/// `{expr}` plus the text-like siblings that follow it become one text node.
fn process_text_like<'a>(ctx: &mut TransformContext<'a>, node: &'a TemplateNode) {
    let siblings = ctx.parent_node().map(|p| p.children()).unwrap_or_default();
    let mut run: Vec<&'a TemplateNode> = siblings
        .into_iter()
        .skip(ctx.index)
        .take_while(|n| n.is_text_like())
        .collect();
    if run.is_empty() {
        run.push(node);
    }
    for merged in run.iter().skip(1) {
        ctx.mark_seen(merged);
    }

    let values: Vec<SimpleExpression> = run
        .iter()
        .filter_map(|n| match n {
            TemplateNode::Text(text) => Some(SimpleExpression::new_static(text.data.clone())),
            TemplateNode::ExpressionTag(tag) => Some(ctx.resolve(&tag.expression)),
            _ => None,
        })
        .collect();

    let id = ctx.reference();
    ctx.dynamic.flags |= DynamicFlag::INSERT | DynamicFlag::NON_TEMPLATE;
    let effect = !values.iter().all(is_constant_expression) && !ctx.in_v_once;
    ctx.register_operation(OperationNode::CreateTextNode {
        id,
        values: values.clone(),
        effect,
    });
    if effect {
        ctx.register_effect(
            values.clone(),
            vec![OperationNode::SetText {
                element: id,
                values,
            }],
        );
    }
}
