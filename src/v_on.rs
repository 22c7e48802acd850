use std::collections::HashSet;

use crate::ast::{Directive, ElementNode};
use crate::context::TransformContext;
use crate::expression::{camelize, capitalize};
use crate::ir::{DirectiveTransformResult, EventModifiers, OperationNode, SimpleExpression};
use crate::validate::X_V_ON_NO_EXPRESSION;

lazy_static::lazy_static! {
    static ref OPTION_MODIFIERS: HashSet<&'static str> =
        ["passive", "nonpassive", "once", "capture"].into_iter().collect();

    static ref NON_KEY_MODIFIERS: HashSet<&'static str> = [
        "stop", "prevent", "self", "ctrl", "shift", "alt", "meta", "exact", "middle",
        "trusted", "stopImmediatePropagation",
    ]
    .into_iter()
    .collect();

    static ref KEYBOARD_EVENTS: HashSet<&'static str> =
        ["keyup", "keydown", "keypress"].into_iter().collect();

    /// Events the runtime listens for once at the document root.
    static ref DELEGATED_EVENTS: HashSet<&'static str> = [
        "beforeinput", "click", "dblclick", "contextmenu", "focusin", "focusout", "input",
        "keydown", "keyup", "mousedown", "mousemove", "mouseout", "mouseover", "mouseup",
        "pointerdown", "pointermove", "pointerout", "pointerover", "pointerup",
        "touchend", "touchmove", "touchstart",
    ]
    .into_iter()
    .collect();
}

fn normalize_modifier(modifier: &str) -> &str {
    match modifier {
        "preventDefault" => "prevent",
        "stopPropagation" => "stop",
        other => other,
    }
}

pub fn resolve_modifiers(event: &str, modifiers: &[String]) -> EventModifiers {
    let mut resolved = EventModifiers::default();
    for modifier in modifiers {
        let modifier = normalize_modifier(modifier);
        if OPTION_MODIFIERS.contains(modifier) {
            resolved.options.push(modifier.to_string());
        } else if modifier == "left" || modifier == "right" {
            if KEYBOARD_EVENTS.contains(event) {
                resolved.keys.push(modifier.to_string());
            } else {
                resolved.non_keys.push(modifier.to_string());
            }
        } else if NON_KEY_MODIFIERS.contains(modifier) {
            resolved.non_keys.push(modifier.to_string());
        } else {
            resolved.keys.push(modifier.to_string());
        }
    }
    resolved
}

pub fn transform_v_on(
    dir: &Directive,
    _element: &ElementNode,
    ctx: &mut TransformContext<'_>,
) -> Option<DirectiveTransformResult> {
    if dir.expression.is_none() && dir.modifiers.is_empty() {
        ctx.error_at(
            X_V_ON_NO_EXPRESSION,
            &format!("`on:{}` is missing a handler expression", dir.name),
            dir.start,
            dir.end,
        );
        return None;
    }

    let modifiers = resolve_modifiers(&dir.name, &dir.modifiers);
    let mut event = dir.name.clone();
    if modifiers.non_keys.iter().any(|m| m == "right") {
        event = "contextmenu".to_string();
    } else if modifiers.non_keys.iter().any(|m| m == "middle") {
        event = "mouseup".to_string();
    }
    let value = dir.expression.as_ref().map(|e| ctx.resolve(e));

    if ctx.is_component() {
        let key = format!("on{}", capitalize(&camelize(&event)));
        return Some(DirectiveTransformResult {
            key: SimpleExpression::new_static(key),
            value: value.unwrap_or_else(|| SimpleExpression::new_dynamic("() => {}", None)),
            handler: true,
            handler_modifiers: Some(modifiers),
            ..Default::default()
        });
    }

    let delegate = modifiers.options.is_empty() && DELEGATED_EVENTS.contains(event.as_str());
    let element_id = ctx.reference();
    ctx.register_operation(OperationNode::SetEvent {
        element: element_id,
        key: SimpleExpression::new_static(event),
        value,
        modifiers,
        delegate,
        effect: false,
    });
    None
}
