//! Transform pipeline tests
//!
//! Foreign ASTs are built with `serde_json::json!` against a real source
//! string so every expression span slices the text it names.

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    use serde_json::{json, Value};

    use crate::ast::{Directive, ElementNode, Root};
    use crate::compile::{compile, CompileInput, CompileOptions, CompileResult};
    use crate::context::{ExitFn, TransformContext};
    use crate::ir::{DirectiveTransformResult, DynamicFlag, OperationNode, SimpleExpression};
    use crate::transform::{DirectiveTransform, NodeTransform};
    use crate::validate::{
        CompilerError, ERROR_TYPE_BINDING_TARGET, X_RESERVED_PROP, X_V_BIND_INVALID_TARGET,
        X_V_ON_NO_EXPRESSION,
    };

    fn span(source: &str, needle: &str) -> (u32, u32) {
        let start = source.find(needle).expect("needle in source") as u32;
        (start, start + needle.len() as u32)
    }

    fn js(source: &str, code: &str) -> Value {
        let (start, end) = span(source, code);
        json!({ "type": "Identifier", "start": start, "end": end })
    }

    fn expression_tag(source: &str, code: &str) -> Value {
        let (start, end) = span(source, &format!("{{{}}}", code));
        json!({
            "type": "ExpressionTag",
            "start": start,
            "end": end,
            "expression": { "type": "Identifier", "start": start + 1, "end": end - 1 }
        })
    }

    fn element(name: &str, attributes: Vec<Value>, children: Vec<Value>) -> Value {
        json!({
            "type": "RegularElement",
            "name": name,
            "start": 0,
            "end": 0,
            "attributes": attributes,
            "fragment": { "nodes": children }
        })
    }

    fn text(data: &str) -> Value {
        json!({ "type": "Text", "data": data, "start": 0, "end": 0 })
    }

    fn root(source: &str, nodes: Vec<Value>) -> Root {
        serde_json::from_value(json!({ "start": 0, "end": source.len(), "fragment": { "nodes": nodes } }))
            .expect("root json")
    }

    fn run_with(source: &str, nodes: Vec<Value>, options: &CompileOptions) -> CompileResult {
        let ast = root(source, nodes);
        compile(CompileInput::Template { source, ast }, options).expect("compile")
    }

    fn run(source: &str, nodes: Vec<Value>) -> CompileResult {
        run_with(source, nodes, &CompileOptions::default())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TEXT
    // ═══════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_interpolation_creates_tracked_text_node() {
        let source = "<div>{count}</div>";
        let result = run(source, vec![element("div", vec![], vec![expression_tag(source, "count")])]);
        let block = &result.ast.block;

        assert_eq!(result.ast.template, vec!["<div></div>".to_string()]);
        assert_eq!(block.returns, vec![1], "the div is the block's only return");
        match &block.operation[..] {
            [OperationNode::CreateTextNode { id, values, effect }, OperationNode::InsertNode { elements, parent, anchor }] =>
            {
                assert_eq!(*id, 0);
                assert_eq!(values[0].content, "count");
                assert!(*effect, "non-constant text is tracked");
                assert_eq!(elements, &vec![0]);
                assert_eq!(*parent, 1);
                assert_eq!(*anchor, None);
            }
            other => panic!("unexpected operations: {:?}", other),
        }
        assert_eq!(block.effect.len(), 1);
        assert_eq!(block.effect[0].expressions[0].content, "count");
        assert!(matches!(
            block.effect[0].operations[..],
            [OperationNode::SetText { element: 0, .. }]
        ));
    }

    #[test]
    fn test_literal_interpolation_is_not_tracked() {
        let source = r#"<div>{"literal"}</div>"#;
        let result = run(source, vec![element("div", vec![], vec![expression_tag(source, "\"literal\"")])]);
        let block = &result.ast.block;

        assert!(block.effect.is_empty(), "constant text needs no effect");
        assert!(matches!(
            block.operation[..],
            [OperationNode::CreateTextNode { effect: false, .. }, OperationNode::InsertNode { .. }]
        ));
    }

    #[test]
    fn test_text_siblings_merge_into_one_node() {
        let source = "<p>{a} and {b}</p>";
        let result = run(
            source,
            vec![element(
                "p",
                vec![],
                vec![expression_tag(source, "a"), text(" and "), expression_tag(source, "b")],
            )],
        );
        let creates: Vec<&OperationNode> = result
            .ast
            .block
            .operation
            .iter()
            .filter(|op| matches!(op, OperationNode::CreateTextNode { .. }))
            .collect();
        assert_eq!(creates.len(), 1, "merged siblings become one text node");
        if let OperationNode::CreateTextNode { values, .. } = creates[0] {
            let contents: Vec<&str> = values.iter().map(|v| v.content.as_str()).collect();
            assert_eq!(contents, vec!["a", " and ", "b"]);
        }
    }

    #[test]
    fn test_static_text_is_escaped_into_template() {
        let source = "<p>a &lt; b</p>";
        let result = run(source, vec![element("p", vec![], vec![text("a < b")])]);
        assert_eq!(result.ast.template, vec!["<p>a &lt; b</p>".to_string()]);
        assert!(result.ast.block.operation.is_empty());
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EFFECTS & TEMPLATES
    // ═══════════════════════════════════════════════════════════════════════════

    fn dynamic_attr(source: &str, name: &str, code: &str) -> Value {
        let tag = expression_tag(source, code);
        json!({ "type": "Attribute", "name": name, "value": tag })
    }

    #[test]
    fn test_identical_expressions_share_one_effect() {
        let source = "<p title={count}></p><span title={count}></span>";
        let result = run(
            source,
            vec![
                element("p", vec![dynamic_attr(source, "title", "count")], vec![]),
                element("span", vec![dynamic_attr(source, "title", "count")], vec![]),
            ],
        );
        let effects = &result.ast.block.effect;
        assert_eq!(effects.len(), 1, "one effect for one dependency");
        assert_eq!(effects[0].operations.len(), 2);
        assert!(effects[0]
            .operations
            .iter()
            .all(|op| matches!(op, OperationNode::SetProp { .. })));
    }

    #[test]
    fn test_static_attributes_are_inlined() {
        let source = r#"<input type="text" disabled>"#;
        let result = run(
            source,
            vec![element(
                "input",
                vec![
                    json!({ "type": "Attribute", "name": "type", "value": [text("text")] }),
                    json!({ "type": "Attribute", "name": "disabled", "value": true }),
                ],
                vec![],
            )],
        );
        assert_eq!(result.ast.template, vec![r#"<input type="text" disabled>"#.to_string()]);
        assert!(result.ast.block.effect.is_empty());
    }

    #[test]
    fn test_identical_subtrees_share_a_template() {
        let source = "{#if a}<b>x</b>{/if}{#if c}<b>x</b>{/if}";
        let branch = |test: &str| {
            json!({
                "type": "IfBlock",
                "test": js(source, test),
                "consequent": { "nodes": [element("b", vec![], vec![text("x")])] },
                "start": 0,
                "end": 0
            })
        };
        let result = run(source, vec![branch("a"), branch("c")]);

        assert_eq!(result.ast.template, vec!["<b>x</b>".to_string()]);
        let templates: Vec<Option<usize>> = result
            .ast
            .block
            .operation
            .iter()
            .filter_map(|op| match op {
                OperationNode::If(node) => Some(node.positive.dynamic.children[0].template),
                _ => None,
            })
            .collect();
        assert_eq!(templates, vec![Some(0), Some(0)]);
    }

    fn collect_ids(value: &Value, ids: &mut Vec<u64>) {
        match value {
            Value::Object(map) => {
                if map.contains_key("flags") {
                    if let Some(id) = map.get("id").and_then(Value::as_u64) {
                        ids.push(id);
                    }
                }
                for child in map.values() {
                    collect_ids(child, ids);
                }
            }
            Value::Array(items) => {
                for item in items {
                    collect_ids(item, ids);
                }
            }
            _ => {}
        }
    }

    #[test]
    fn test_reference_ids_are_unique() {
        let source = "<div>{a}<p>{b}</p>{#if c}<i>{d}</i>{/if}</div>";
        let result = run(
            source,
            vec![element(
                "div",
                vec![],
                vec![
                    expression_tag(source, "a"),
                    element("p", vec![], vec![expression_tag(source, "b")]),
                    json!({
                        "type": "IfBlock",
                        "test": js(source, "c"),
                        "consequent": { "nodes": [element("i", vec![], vec![expression_tag(source, "d")])] },
                        "start": 0,
                        "end": 0
                    }),
                ],
            )],
        );

        let ir = serde_json::to_value(&result.ast).expect("ir json");
        let mut ids = Vec::new();
        collect_ids(&ir, &mut ids);
        let distinct: HashSet<u64> = ids.iter().copied().collect();
        assert!(!ids.is_empty());
        assert_eq!(distinct.len(), ids.len(), "ids repeat: {:?}", ids);
    }

    #[test]
    fn test_compiles_are_idempotent() {
        let source = "<ul>{#each items as item}<li>{item}</li>{/each}</ul><p title={t}>{t}</p>";
        let nodes = || {
            vec![
                element(
                    "ul",
                    vec![],
                    vec![json!({
                        "type": "EachBlock",
                        "expression": js(source, "items"),
                        "context": js(source, "item"),
                        "body": { "nodes": [element("li", vec![], vec![expression_tag(source, "item")])] },
                        "start": 4,
                        "end": 47
                    })],
                ),
                element("p", vec![dynamic_attr(source, "title", "t")], vec![expression_tag(source, "t")]),
            ]
        };
        let first = run(source, nodes());
        let second = run(source, nodes());
        assert_eq!(first.ast, second.ast);
        assert_eq!(first.ast.template, second.ast.template);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_invalid_binding_is_reported_not_thrown() {
        let source = "<div bind:value={x}></div>";
        let (start, end) = span(source, "bind:value={x}");
        let seen: Arc<Mutex<Vec<CompilerError>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let options = CompileOptions {
            filename: "Form.svelte".to_string(),
            on_error: Some(Arc::new(move |e: &CompilerError| {
                sink.lock().expect("lock").push(e.clone());
            })),
            ..Default::default()
        };
        let result = run_with(
            source,
            vec![element(
                "div",
                vec![json!({
                    "type": "BindDirective",
                    "name": "value",
                    "expression": js(source, "x"),
                    "start": start,
                    "end": end
                })],
                vec![],
            )],
            &options,
        );

        assert_eq!(result.errors.len(), 1);
        let error = &result.errors[0];
        assert_eq!(error.code, X_V_BIND_INVALID_TARGET);
        assert_eq!(error.error_type, ERROR_TYPE_BINDING_TARGET);
        assert_eq!(error.file, "Form.svelte");
        assert_eq!((error.line, error.column), (1, 6));
        assert_eq!(result.ast.template, vec!["<div></div>".to_string()]);
        assert_eq!(seen.lock().expect("lock").len(), 1, "on_error receives the binding error");
    }

    #[test]
    fn test_input_binding_becomes_model_value() {
        let source = "<input bind:value={name}>";
        let result = run(
            source,
            vec![element(
                "input",
                vec![json!({ "type": "BindDirective", "name": "value", "expression": js(source, "name") })],
                vec![],
            )],
        );
        assert!(result.errors.is_empty());
        assert!(matches!(
            result.ast.block.effect[0].operations[..],
            [OperationNode::SetModelValue { .. }]
        ));
    }

    #[test]
    fn test_reserved_props_and_empty_handlers_are_errors() {
        let source = "<div ref_key=\"a\" on:click></div>";
        let result = run(
            source,
            vec![element(
                "div",
                vec![
                    json!({ "type": "Attribute", "name": "ref_key", "value": [text("a")] }),
                    json!({ "type": "OnDirective", "name": "click" }),
                ],
                vec![],
            )],
        );
        let codes: Vec<&str> = result.errors.iter().map(|e| e.code.as_str()).collect();
        assert!(codes.contains(&X_RESERVED_PROP), "codes: {:?}", codes);
        assert!(codes.contains(&X_V_ON_NO_EXPRESSION), "codes: {:?}", codes);
    }

    #[test]
    fn test_root_flags_are_plain_references() {
        let source = "<div></div>";
        let result = run(source, vec![element("div", vec![], vec![])]);
        let child = &result.ast.block.dynamic.children[0];
        assert_eq!(child.flags, DynamicFlag::REFERENCED);
        assert_eq!(child.template, Some(0));
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CALLER TRANSFORMS
    // ═══════════════════════════════════════════════════════════════════════════

    fn node_transform<F>(f: F) -> NodeTransform
    where
        F: for<'a> Fn(&mut TransformContext<'a>) -> Option<Vec<ExitFn<'a>>> + Send + Sync + 'static,
    {
        Arc::new(f)
    }

    fn directive_transform<F>(f: F) -> DirectiveTransform
    where
        F: for<'a> Fn(&Directive, &ElementNode, &mut TransformContext<'a>) -> Option<DirectiveTransformResult>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(f)
    }

    #[test]
    fn test_caller_transforms_compose_with_built_ins() {
        let source = "<div><span></span><drop></drop></div>";
        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let recorder_log = Arc::clone(&log);

        let remover = node_transform(|ctx| {
            if ctx.node.element().is_some_and(|el| el.name == "drop") {
                ctx.remove_node();
            }
            None
        });
        let recorder = node_transform(move |ctx| {
            let name = ctx.node.element()?.name.clone();
            recorder_log.lock().expect("lock").push(format!("enter {}", name));
            let exit_log = Arc::clone(&recorder_log);
            let exit: ExitFn<'_> = Box::new(move |_ctx: &mut TransformContext<'_>| {
                exit_log.lock().expect("lock").push(format!("exit {}", name));
            });
            Some(vec![exit])
        });
        let options = CompileOptions {
            node_transforms: vec![remover, recorder],
            ..Default::default()
        };

        let result = run_with(
            source,
            vec![element(
                "div",
                vec![],
                vec![element("span", vec![], vec![]), element("drop", vec![], vec![])],
            )],
            &options,
        );

        // Children are visited while the parent's built-ins run, ahead of the recorder.
        assert_eq!(
            *log.lock().expect("lock"),
            vec!["enter span", "exit span", "enter div", "exit div"]
        );
        assert!(result.errors.is_empty());
        assert_eq!(result.ast.template, vec!["<div><span></span></div>".to_string()]);
        assert!(result.ast.template.iter().all(|t| !t.contains("drop")));
    }

    #[test]
    fn test_caller_transform_warnings_reach_the_result() {
        let source = "<marquee></marquee>";
        let warn = node_transform(|ctx| {
            if ctx.node.element().is_some_and(|el| el.name == "marquee") {
                ctx.warn("obsolete_element", "`<marquee>` is obsolete", 0);
            }
            None
        });
        let options = CompileOptions {
            filename: "Banner.svelte".to_string(),
            node_transforms: vec![warn],
            ..Default::default()
        };
        let result = run_with(source, vec![element("marquee", vec![], vec![])], &options);

        let warning = result
            .warnings
            .iter()
            .find(|w| w.code == "obsolete_element")
            .expect("caller warning");
        assert_eq!(warning.file, "Banner.svelte");
        assert_eq!((warning.line, warning.column), (1, 1));
        assert_eq!(result.ast.template, vec!["<marquee></marquee>".to_string()]);
    }

    #[test]
    fn test_bind_transform_can_be_replaced_by_name() {
        let source = "<input bind:value={name}>";
        let mut options = CompileOptions::default();
        options.directive_transforms.insert(
            "bind".to_string(),
            directive_transform(|dir, _el, ctx| {
                let value = ctx.resolve(dir.expression.as_ref()?);
                Some(DirectiveTransformResult {
                    key: SimpleExpression::new_static(dir.name.clone()),
                    value,
                    ..Default::default()
                })
            }),
        );
        let result = run_with(
            source,
            vec![element(
                "input",
                vec![json!({ "type": "BindDirective", "name": "value", "expression": js(source, "name") })],
                vec![],
            )],
            &options,
        );

        assert!(result.errors.is_empty(), "{:?}", result.errors);
        let [OperationNode::SetProp { prop, .. }] = &result.ast.block.effect[0].operations[..] else {
            panic!("expected a plain prop, got {:?}", result.ast.block.effect);
        };
        assert_eq!(prop.key.content, "value");
        assert_eq!(prop.values[0].content, "name");
        assert!(!prop.model);
        assert_eq!(result.ast.template, vec!["<input>".to_string()]);
    }
}
