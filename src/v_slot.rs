//! Component slots
//!
//! A component's children are routed into slot blocks before the component
//! itself is created. `slot="name"` picks a named slot, `slot={expr}` a
//! dynamic one, and everything else lands in the implicit default slot.
//! `<svelte:fragment>` wrappers contribute their children only.

use std::collections::HashSet;
use std::rc::Rc;

use crate::ast::TemplateNode;
use crate::context::{ExitFn, NodeRef, TransformContext};
use crate::ir::{IRSlot, NamedSlot, SimpleExpression};
use crate::transform::{build_block, nodes_span};
use crate::transform_element::attribute_expression;
use crate::validate::{X_V_SLOT_DUPLICATE_SLOT_NAMES, X_V_SLOT_MIXED_SLOT_USAGE};

struct SlotGroup<'a> {
    name: String,
    nodes: Vec<&'a TemplateNode>,
    span: (u32, u32),
}

struct DynamicSlotGroup<'a> {
    name: SimpleExpression,
    nodes: Vec<&'a TemplateNode>,
    span: (u32, u32),
}

fn slot_body(node: &TemplateNode) -> Vec<&TemplateNode> {
    match node {
        TemplateNode::SvelteFragment(fragment) => fragment.fragment.nodes.iter().collect(),
        other => vec![other],
    }
}

pub fn transform_v_slot<'a>(ctx: &mut TransformContext<'a>) -> Option<Vec<ExitFn<'a>>> {
    let Some(TemplateNode::Component(component)) = ctx.node.template_node() else {
        return None;
    };

    let mut implicit: Vec<&'a TemplateNode> = Vec::new();
    let mut named: Vec<SlotGroup<'a>> = Vec::new();
    let mut dynamic: Vec<DynamicSlotGroup<'a>> = Vec::new();

    for child in &component.fragment.nodes {
        let Some(attr) = child.element().and_then(|el| el.attribute("slot")) else {
            implicit.extend(slot_body(child));
            continue;
        };
        let nodes = slot_body(child);
        let span = child.span();
        match attr.value.static_text() {
            Some(name) => named.push(SlotGroup { name, nodes, span }),
            None => match attribute_expression(attr, ctx) {
                Some(name) => dynamic.push(DynamicSlotGroup { name, nodes, span }),
                None => named.push(SlotGroup {
                    name: "default".to_string(),
                    nodes,
                    span,
                }),
            },
        }
    }

    let mut slots: Vec<NamedSlot> = Vec::new();
    let has_implicit = implicit
        .iter()
        .any(|n| !n.is_whitespace_text() && !n.is_comment());
    if has_implicit {
        let span = nodes_span(implicit.iter().copied());
        let block = build_block(ctx, NodeRef::Slot(Rc::from(implicit)), span, false);
        slots.push(NamedSlot {
            name: "default".to_string(),
            block,
        });
    }

    let mut explicit: HashSet<String> = HashSet::new();
    for group in named {
        let block = build_block(ctx, NodeRef::Slot(Rc::from(group.nodes)), group.span, false);
        let conflict = if !explicit.insert(group.name.clone()) {
            Some((
                X_V_SLOT_DUPLICATE_SLOT_NAMES,
                format!("Duplicate slot name \"{}\" on <{}>", group.name, component.name),
            ))
        } else if group.name == "default" && has_implicit {
            Some((
                X_V_SLOT_MIXED_SLOT_USAGE,
                format!(
                    "<{}> receives default slot content both implicitly and through slot=\"default\"",
                    component.name
                ),
            ))
        } else {
            None
        };

        match slots.iter_mut().find(|s| s.name == group.name) {
            Some(existing) => {
                if let Some((code, message)) = conflict {
                    ctx.error_at(code, &message, group.span.0, group.span.1);
                }
                existing.block = block;
            }
            None => slots.push(NamedSlot {
                name: group.name,
                block,
            }),
        }
    }

    let mut ir_slots = Vec::new();
    if !slots.is_empty() {
        ir_slots.push(IRSlot::Static { slots });
    }
    for group in dynamic {
        let block = build_block(ctx, NodeRef::Slot(Rc::from(group.nodes)), group.span, false);
        ir_slots.push(IRSlot::Dynamic {
            name: group.name,
            block,
        });
    }
    ctx.slots = ir_slots;
    None
}
