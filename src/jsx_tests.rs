//! JSX pipeline tests: JSX source compiled end to end lands on the same IR
//! shapes as the equivalent template.

#[cfg(test)]
mod tests {
    use crate::compile::{compile, CompileInput, CompileOptions, CompileResult};
    use crate::ir::{IfNegative, OperationNode};
    use crate::validate::{ERROR_TYPE_SYNTAX, X_JSX_SYNTAX};

    fn options() -> CompileOptions {
        CompileOptions {
            filename: "App.jsx".to_string(),
            ..Default::default()
        }
    }

    fn run(source: &str) -> CompileResult {
        compile(CompileInput::Jsx { source }, &options()).expect("jsx compiles")
    }

    fn find_if(operations: &[OperationNode]) -> &crate::ir::IfIRNode {
        operations
            .iter()
            .find_map(|op| match op {
                OperationNode::If(node) => Some(node),
                _ => None,
            })
            .expect("an if operation")
    }

    #[test]
    fn test_ternary_becomes_if_with_else() {
        let result = run("export default <div>{ok ? <a/> : <b/>}</div>");
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(
            result.ast.template,
            vec!["<a></a>".to_string(), "<b></b>".to_string(), "<div></div>".to_string()]
        );

        let block = &result.ast.block;
        let node = find_if(&block.operation);
        assert_eq!(node.id, Some(0));
        assert_eq!(node.condition.content, "ok");
        assert_eq!(node.positive.returns, vec![1]);
        assert!(matches!(&node.negative, Some(IfNegative::Block(b)) if b.returns == vec![2]));
        assert!(block.operation.iter().any(|op| matches!(
            op,
            OperationNode::InsertNode { elements, parent: 3, anchor: None } if elements == &vec![0]
        )));
        assert_eq!(block.returns, vec![3]);
    }

    #[test]
    fn test_logical_and_becomes_if_without_else() {
        let result = run("export default <div>{show && <i/>}</div>");
        let node = find_if(&result.ast.block.operation);
        assert_eq!(node.condition.content, "show");
        assert!(node.negative.is_none());
    }

    #[test]
    fn test_map_becomes_keyed_for() {
        let result = run("export default <ul>{items.map((item, i) => <li key={item.id}>{item.name}</li>)}</ul>");
        assert!(result.errors.is_empty(), "{:?}", result.errors);

        let node = result
            .ast
            .block
            .operation
            .iter()
            .find_map(|op| match op {
                OperationNode::For(node) => Some(node),
                _ => None,
            })
            .expect("a for operation");
        assert_eq!(node.source.content, "items");
        assert_eq!(node.value.as_ref().map(|v| v.content.as_str()), Some("item"));
        assert_eq!(node.index.as_ref().map(|v| v.content.as_str()), Some("i"));
        assert_eq!(node.key_prop.as_ref().map(|v| v.content.as_str()), Some("item.id"));
        assert!(result.ast.template.contains(&"<li></li>".to_string()), "key is not rendered");
        assert!(node.render.effect.iter().any(|e| e
            .operations
            .iter()
            .any(|op| matches!(op, OperationNode::SetText { .. }))));
    }

    #[test]
    fn test_v_if_chain_matches_template_shape() {
        let result = run("export default <div><p v-if={a}/><i v-else-if={b}/><b v-else/></div>");
        let node = find_if(&result.ast.block.operation);
        assert_eq!(node.id, Some(0));
        let Some(IfNegative::If(nested)) = &node.negative else {
            panic!("expected an else-if branch");
        };
        assert_eq!(nested.id, None);
        assert_eq!(nested.condition.content, "b");
        assert!(matches!(nested.negative, Some(IfNegative::Block(_))));
        assert_eq!(
            result.ast.template,
            vec![
                "<p></p>".to_string(),
                "<i></i>".to_string(),
                "<b></b>".to_string(),
                "<div></div>".to_string()
            ]
        );
    }

    #[test]
    fn test_v_if_with_v_for_wraps_the_loop() {
        let result = run("export default <ul><li v-if={show} v-for={item in list}>{item}</li></ul>");
        let node = find_if(&result.ast.block.operation);
        assert_eq!(node.condition.content, "show");
        let [OperationNode::For(each)] = &node.positive.operation[..] else {
            panic!("expected the loop inside the if, got {:?}", node.positive.operation);
        };
        assert_eq!(each.source.content, "list");
        assert_eq!(each.value.as_ref().map(|v| v.content.as_str()), Some("item"));
        assert!(each.index.is_none());
    }

    #[test]
    fn test_event_handlers_are_delegated() {
        let result = run("export default <button onClick={go}>x</button>");
        assert_eq!(result.ast.template, vec!["<button>x</button>".to_string()]);
        let [OperationNode::SetEvent { element, key, value, delegate, .. }] = &result.ast.block.operation[..] else {
            panic!("expected one event, got {:?}", result.ast.block.operation);
        };
        assert_eq!(*element, 0);
        assert_eq!(key.content, "click");
        assert_eq!(value.as_ref().map(|v| v.content.as_str()), Some("go"));
        assert!(*delegate);
    }

    #[test]
    fn test_multiline_text_is_joined() {
        let result = run("export default <p>\n  hello\n  world\n</p>");
        assert_eq!(result.ast.template, vec!["<p>hello world</p>".to_string()]);
    }

    #[test]
    fn test_character_references_are_escaped_once() {
        let result = run("export default <div>a &amp; b &lt; c</div>");
        assert_eq!(result.ast.template, vec!["<div>a &amp; b &lt; c</div>".to_string()]);
    }

    #[test]
    fn test_attribute_character_references_are_escaped_once() {
        let result = run(r#"export default <div title="a &amp; b">x</div>"#);
        assert_eq!(result.ast.template, vec![r#"<div title="a &amp; b">x</div>"#.to_string()]);
    }

    #[test]
    fn test_v_else_after_whitespace_on_one_line_joins_the_chain() {
        let result = run("export default <div><p v-if={a}/> <span v-else/></div>");
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        let node = find_if(&result.ast.block.operation);
        assert_eq!(node.condition.content, "a");
        assert!(matches!(&node.negative, Some(IfNegative::Block(b)) if b.returns == vec![2]));
    }

    #[test]
    fn test_fragment_root_returns_every_child() {
        let result = run("export default <><a/><b/></>");
        assert_eq!(result.ast.block.returns, vec![0, 1]);
        assert_eq!(result.ast.template, vec!["<a></a>".to_string(), "<b></b>".to_string()]);
    }

    #[test]
    fn test_syntax_errors_abort_the_compile() {
        let err = compile(CompileInput::Jsx { source: "export default <div>" }, &options())
            .expect_err("unclosed element");
        assert_eq!(err.code, X_JSX_SYNTAX);
        assert_eq!(err.error_type, ERROR_TYPE_SYNTAX);
        assert_eq!(err.file, "App.jsx");
    }
}
