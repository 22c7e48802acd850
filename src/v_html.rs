use crate::ast::{ElementNode, ExpressionTag, TemplateNode};
use crate::context::{ExitFn, NodeRef, TransformContext};
use crate::ir::DynamicFlag;
use crate::validate::X_HTML_TAG_NOT_ALONE;

/// The `{@html}` tag that makes up the whole content of `element`, if any.
pub fn html_child(element: &ElementNode) -> Option<&ExpressionTag> {
    let mut children = element.significant_children();
    match (children.next(), children.next()) {
        (Some(TemplateNode::HtmlTag(tag)), None) => Some(tag),
        _ => None,
    }
}

/// Raw HTML is applied by the parent element through `SetHtml`; the tag itself
/// contributes nothing to the template.
pub fn transform_html_tag<'a>(ctx: &mut TransformContext<'a>) -> Option<Vec<ExitFn<'a>>> {
    let Some(TemplateNode::HtmlTag(tag)) = ctx.node.template_node() else {
        return None;
    };

    let alone = match ctx.parent_node() {
        Some(NodeRef::Node(TemplateNode::RegularElement(parent))) => html_child(parent).is_some(),
        _ => false,
    };
    if alone {
        ctx.dynamic.flags |= DynamicFlag::NON_TEMPLATE;
    } else {
        ctx.error_at(
            X_HTML_TAG_NOT_ALONE,
            "{@html} must be the only child of an element",
            tag.start,
            tag.end,
        );
        ctx.remove_node();
    }
    None
}
