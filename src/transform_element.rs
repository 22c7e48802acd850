//! Elements and components
//!
//! Runs on exit, after the children have filled `children_template`. Static
//! attributes are inlined into the element's template; everything else goes
//! through the effect registrar.

use std::collections::{HashMap, HashSet};

use crate::ast::{
    Attribute, AttributeChunk, AttributeNode, AttributeValue, Directive, ElementNode, TemplateNode,
};
use crate::context::{ExitFn, NodeRef, TransformContext};
use crate::expression::{chunks_to_template_literal, expression_loc};
use crate::ir::{
    DirectiveIR, DirectiveTransformResult, DynamicFlag, IRProp, IRPropsDynamicExpression,
    IRPropsEntry, InheritProps, OperationNode, SimpleExpression,
};
use crate::transform_text::escape_html;
use crate::v_html::html_child;
use crate::validate::{X_RESERVED_PROP, X_V_ON_NO_EXPRESSION};

lazy_static::lazy_static! {
    static ref VOID_TAGS: HashSet<&'static str> = [
        "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
        "source", "track", "wbr",
    ]
    .into_iter()
    .collect();

    static ref ONLY_VALID_CHILDREN: HashMap<&'static str, Vec<&'static str>> = {
        let mut m = HashMap::new();
        m.insert("head", vec!["base", "basefont", "bgsound", "link", "meta", "title", "noscript", "noframes", "style", "script", "template"]);
        m.insert("optgroup", vec!["option"]);
        m.insert("select", vec!["optgroup", "option", "hr"]);
        m.insert("table", vec!["caption", "colgroup", "tbody", "tfoot", "thead"]);
        m.insert("tr", vec!["td", "th"]);
        m.insert("colgroup", vec!["col"]);
        m.insert("tbody", vec!["tr"]);
        m.insert("thead", vec!["tr"]);
        m.insert("tfoot", vec!["tr"]);
        m
    };

    static ref ONLY_VALID_PARENTS: HashMap<&'static str, Vec<&'static str>> = {
        let mut m = HashMap::new();
        m.insert("td", vec!["tr"]);
        m.insert("th", vec!["tr"]);
        m.insert("tr", vec!["tbody", "thead", "tfoot"]);
        m.insert("tbody", vec!["table"]);
        m.insert("thead", vec!["table"]);
        m.insert("tfoot", vec!["table"]);
        m.insert("caption", vec!["table"]);
        m.insert("colgroup", vec!["table"]);
        m
    };

    static ref P_CLOSING: HashSet<&'static str> = [
        "address", "article", "aside", "blockquote", "center", "details", "dialog", "dir", "div",
        "dl", "fieldset", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
        "header", "hgroup", "hr", "li", "main", "nav", "menu", "ol", "p", "pre", "section",
        "table", "ul",
    ]
    .into_iter()
    .collect();
}

/// Whether the HTML parser keeps `<child>` inside `<parent>` when the
/// template string is instantiated.
pub fn is_valid_html_nesting(parent: &str, child: &str) -> bool {
    if matches!(child, "script" | "template" | "style") && parent != "select" {
        return true;
    }
    if let Some(valid) = ONLY_VALID_CHILDREN.get(parent) {
        return valid.iter().any(|v| *v == child);
    }
    if let Some(valid) = ONLY_VALID_PARENTS.get(child) {
        return valid.iter().any(|v| *v == parent);
    }
    if parent == "p" && P_CLOSING.contains(child) {
        return false;
    }
    if parent == child && matches!(child, "a" | "button" | "form") {
        return false;
    }
    true
}

fn is_reserved_prop(name: &str) -> bool {
    name.is_empty() || name == "ref_for" || name == "ref_key" || name.starts_with("onVnode")
}

// ═══════════════════════════════════════════════════════════════════════════════
// NODE TRANSFORM
// ═══════════════════════════════════════════════════════════════════════════════

pub fn transform_element<'a>(ctx: &mut TransformContext<'a>) -> Option<Vec<ExitFn<'a>>> {
    let exit: ExitFn<'a> = match ctx.node.template_node()? {
        TemplateNode::RegularElement(el) => Box::new(move |ctx: &mut TransformContext<'a>| {
            transform_native_element(el, ctx)
        }),
        TemplateNode::Component(el) => Box::new(move |ctx: &mut TransformContext<'a>| {
            transform_component_element(el, ctx)
        }),
        _ => return None,
    };
    Some(vec![exit])
}

/// The element is the only significant node at the root of the component.
fn is_single_root(ctx: &TransformContext<'_>) -> bool {
    match ctx.parent_node() {
        Some(NodeRef::Root(root)) => {
            root.fragment
                .nodes
                .iter()
                .filter(|n| !n.is_whitespace_text() && !n.is_comment())
                .count()
                == 1
        }
        _ => false,
    }
}

fn transform_native_element<'a>(el: &'a ElementNode, ctx: &mut TransformContext<'a>) {
    let tag = el.name.as_str();
    let single_root = is_single_root(ctx);
    let props = build_props(el, ctx, &[]);

    let mut template = format!("<{}", tag);
    if let Some(scope_id) = &ctx.options.scope_id {
        template.push(' ');
        template.push_str(scope_id);
    }

    let inherit = match props {
        PropsResult::Dynamic {
            entries,
            expressions,
        } => {
            let element = ctx.reference();
            ctx.register_effect(
                expressions,
                vec![OperationNode::SetDynamicProps {
                    element,
                    props: entries,
                    root: single_root,
                }],
            );
            InheritProps::All(true)
        }
        PropsResult::Static(props) => {
            let mut dynamic_keys = Vec::new();
            for prop in props {
                let inline = prop.key.is_static && prop.values.len() == 1 && prop.values[0].is_static;
                if inline {
                    template.push(' ');
                    template.push_str(&prop.key.content);
                    if !prop.values[0].content.is_empty() {
                        template.push_str(&format!("=\"{}\"", escape_html(&prop.values[0].content)));
                    }
                    continue;
                }
                dynamic_keys.push(prop.key.content.clone());
                let element = ctx.reference();
                ctx.register_effect(
                    prop.values.clone(),
                    vec![OperationNode::SetProp {
                        element,
                        prop,
                        root: single_root,
                        tag: tag.to_string(),
                    }],
                );
            }
            InheritProps::Keys(dynamic_keys)
        }
    };
    template.push('>');

    if let Some(html) = html_child(el) {
        let value = ctx.resolve(&html.expression);
        let element = ctx.reference();
        ctx.register_effect(vec![value.clone()], vec![OperationNode::SetHtml { element, value }]);
    }

    template.push_str(&ctx.children_template.concat());
    if !VOID_TAGS.contains(tag) {
        template.push_str(&format!("</{}>", tag));
    }

    if single_root && ctx.options.inherit_attrs {
        let element = ctx.reference();
        ctx.register_operation(OperationNode::SetInheritAttrs {
            element,
            props: inherit,
        });
    }

    let misplaced = match ctx.parent_node() {
        Some(NodeRef::Node(TemplateNode::RegularElement(parent))) => {
            !is_valid_html_nesting(&parent.name, tag)
        }
        _ => false,
    };
    if misplaced {
        ctx.reference();
        let index = ctx.push_template(template);
        ctx.dynamic.template = Some(index);
        ctx.dynamic.flags |= DynamicFlag::INSERT | DynamicFlag::NON_TEMPLATE;
    } else {
        ctx.template.push_str(&template);
    }
}

fn transform_component_element<'a>(el: &'a ElementNode, ctx: &mut TransformContext<'a>) {
    let single_root = is_single_root(ctx);
    let mut asset = true;
    let mut dynamic = None;
    let mut skip: Vec<&str> = Vec::new();

    if el.name == "svelte:component" {
        if let Some(this) = el.attribute("this") {
            dynamic = attribute_expression(this, ctx);
        }
        asset = false;
        skip.push("this");
    } else if ctx.options.binding_metadata.contains_key(&el.name) || el.name.contains('.') {
        asset = false;
    }
    if asset {
        ctx.add_component(&el.name);
    }

    let props = match build_props(el, ctx, &skip) {
        PropsResult::Static(props) if props.is_empty() => Vec::new(),
        PropsResult::Static(props) => vec![IRPropsEntry::Static(props)],
        PropsResult::Dynamic { entries, .. } => entries,
    };

    ctx.dynamic.flags |= DynamicFlag::NON_TEMPLATE | DynamicFlag::INSERT;
    let id = ctx.reference();
    let slots = std::mem::take(&mut ctx.slots);
    ctx.register_operation(OperationNode::CreateComponent {
        id,
        tag: el.name.clone(),
        props,
        slots,
        asset,
        root: single_root,
        once: ctx.in_v_once,
        dynamic,
    });
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROPS
// ═══════════════════════════════════════════════════════════════════════════════

pub enum PropsResult {
    Static(Vec<IRProp>),
    /// A spread or dynamic event object is present; props are merged at runtime.
    Dynamic {
        entries: Vec<IRPropsEntry>,
        expressions: Vec<SimpleExpression>,
    },
}

/// Expression value of a plain attribute, `None` for boolean or literal values.
pub(crate) fn attribute_expression(attr: &Attribute, ctx: &TransformContext<'_>) -> Option<SimpleExpression> {
    match &attr.value {
        AttributeValue::Expression(tag) => Some(ctx.resolve(&tag.expression)),
        AttributeValue::Sequence(chunks) => match chunks.as_slice() {
            [AttributeChunk::ExpressionTag(tag)] => Some(ctx.resolve(&tag.expression)),
            _ => None,
        },
        AttributeValue::Boolean(_) => None,
    }
}

fn attribute_result(attr: &Attribute, ctx: &TransformContext<'_>) -> Option<DirectiveTransformResult> {
    let value = match &attr.value {
        AttributeValue::Boolean(false) => return None,
        AttributeValue::Boolean(true) => SimpleExpression::new_static(""),
        value => match value.static_text() {
            Some(text) => SimpleExpression::new_static(text),
            None => match attribute_expression(attr, ctx) {
                Some(exp) => exp,
                None => {
                    let loc = expression_loc(attr.start, attr.end, &ctx.shared.borrow().lines);
                    SimpleExpression::new_dynamic(
                        chunks_to_template_literal(&value.chunks(), ctx.source),
                        Some(loc),
                    )
                }
            },
        },
    };
    Some(DirectiveTransformResult {
        key: SimpleExpression::new_static(attr.name.clone()),
        value,
        ..Default::default()
    })
}

fn run_directive<'a>(
    kind: &str,
    dir: &Directive,
    el: &ElementNode,
    ctx: &mut TransformContext<'a>,
) -> Option<DirectiveTransformResult> {
    let transform = ctx.registry.directive_transforms.get(kind).cloned()?;
    transform(dir, el, ctx)
}

fn with_directive(dir: &Directive, ctx: &mut TransformContext<'_>) {
    let asset = !ctx.options.binding_metadata.contains_key(&dir.name);
    if asset {
        ctx.add_directive(&dir.name);
    }
    let exp = dir.expression.as_ref().map(|e| ctx.resolve(e));
    let element = ctx.reference();
    ctx.register_operation(OperationNode::WithDirective {
        element,
        dir: DirectiveIR {
            name: dir.name.clone(),
            exp,
            modifiers: dir.modifiers.clone(),
        },
        name: dir.name.clone(),
        asset,
    });
}

/// Later duplicates of `class`, `style` and handler props merge their values
/// into the first occurrence; other duplicates keep the first.
fn dedupe_props(results: Vec<DirectiveTransformResult>) -> Vec<IRProp> {
    let mut deduped: Vec<IRProp> = Vec::new();
    for result in results {
        let prop = IRProp::from(result);
        if !prop.key.is_static {
            deduped.push(prop);
            continue;
        }
        let existing = deduped
            .iter_mut()
            .find(|p| p.key.is_static && p.key.content == prop.key.content);
        match existing {
            Some(existing) => {
                if existing.key.content == "class" || existing.key.content == "style" || existing.handler {
                    existing.values.extend(prop.values);
                }
            }
            None => deduped.push(prop),
        }
    }
    deduped
}

/// Collects the props of `el`, running directive transforms along the way.
/// Names in `skip` are left out.
pub fn build_props<'a>(el: &'a ElementNode, ctx: &mut TransformContext<'a>, skip: &[&str]) -> PropsResult {
    let is_component = ctx.is_component();
    let in_slot = matches!(ctx.parent_node(), Some(NodeRef::Slot(_)));

    let mut results: Vec<DirectiveTransformResult> = Vec::new();
    let mut entries: Vec<IRPropsEntry> = Vec::new();
    let mut expressions: Vec<SimpleExpression> = Vec::new();
    let mut dynamic = false;

    fn flush(results: &mut Vec<DirectiveTransformResult>, entries: &mut Vec<IRPropsEntry>) {
        if !results.is_empty() {
            entries.push(IRPropsEntry::Static(dedupe_props(std::mem::take(results))));
        }
    }

    for attr in &el.attributes {
        let result = match attr {
            AttributeNode::Attribute(a) => {
                let name = a.name.as_str();
                if name == "key" || name == "v-once" || skip.contains(&name) || (in_slot && name == "slot") {
                    continue;
                }
                if is_reserved_prop(name) {
                    ctx.error_at(
                        X_RESERVED_PROP,
                        &format!("\"{}\" is a reserved attribute and cannot be used as a prop", name),
                        a.start,
                        a.end,
                    );
                    continue;
                }
                attribute_result(a, ctx)
            }
            AttributeNode::SpreadAttribute(spread) => {
                dynamic = true;
                flush(&mut results, &mut entries);
                let value = ctx.resolve(&spread.expression);
                expressions.push(value.clone());
                entries.push(IRPropsEntry::Dynamic(IRPropsDynamicExpression {
                    value,
                    handler: false,
                }));
                None
            }
            AttributeNode::OnDirective(d) if d.name.is_empty() => {
                let Some(exp) = &d.expression else {
                    ctx.error_at(X_V_ON_NO_EXPRESSION, "`on` is missing an event object", d.start, d.end);
                    continue;
                };
                let value = ctx.resolve(exp);
                if is_component {
                    dynamic = true;
                    flush(&mut results, &mut entries);
                    expressions.push(value.clone());
                    entries.push(IRPropsEntry::Dynamic(IRPropsDynamicExpression {
                        value,
                        handler: true,
                    }));
                } else {
                    let element = ctx.reference();
                    ctx.register_effect(
                        vec![value.clone()],
                        vec![OperationNode::SetDynamicEvents {
                            element,
                            event: value,
                        }],
                    );
                }
                None
            }
            AttributeNode::OnDirective(d) => run_directive("on", d, el, ctx),
            AttributeNode::BindDirective(d) if d.name == "this" => None,
            AttributeNode::BindDirective(d) => run_directive("bind", d, el, ctx),
            AttributeNode::UseDirective(d) => {
                if ctx.registry.directive_transforms.contains_key(&d.name) {
                    run_directive(&d.name, d, el, ctx)
                } else {
                    with_directive(d, ctx);
                    None
                }
            }
        };

        if let Some(result) = result {
            expressions.push(result.value.clone());
            results.push(result);
        }
    }

    if dynamic {
        flush(&mut results, &mut entries);
        PropsResult::Dynamic {
            entries,
            expressions,
        }
    } else {
        PropsResult::Static(dedupe_props(results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_nesting_rules() {
        assert!(!is_valid_html_nesting("p", "div"));
        assert!(!is_valid_html_nesting("table", "tr"));
        assert!(is_valid_html_nesting("tbody", "tr"));
        assert!(!is_valid_html_nesting("a", "a"));
        assert!(is_valid_html_nesting("div", "p"));
        assert!(is_valid_html_nesting("table", "template"));
    }

    #[test]
    fn test_class_values_merge_on_dedupe() {
        let prop = |key: &str, value: &str| DirectiveTransformResult {
            key: SimpleExpression::new_static(key),
            value: SimpleExpression::new_dynamic(value, None),
            ..Default::default()
        };
        let deduped = dedupe_props(vec![prop("class", "a"), prop("id", "x"), prop("class", "b"), prop("id", "y")]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].values.len(), 2);
        assert_eq!(deduped[1].values[0].content, "x");
    }
}
