//! Scoped stylesheet tests, run through the full compile so selector
//! matching, scope class injection and CSS rendering are seen together.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Value};

    use crate::ast::Root;
    use crate::compile::{compile, CompileInput, CompileOptions, CompileResult};
    use crate::ir::OperationNode;
    use crate::stylesheet::{Stylesheet, StylesheetOptions};
    use crate::validate::{W_CSS_MANUAL_SCOPING, W_CSS_UNUSED_SELECTOR};

    fn offset(source: &str, needle: &str) -> u32 {
        source.find(needle).expect("needle in source") as u32
    }

    fn element(source: &str, open_tag: &str, name: &str, class: Option<&str>, children: Vec<Value>) -> Value {
        let start = offset(source, open_tag);
        let attributes: Vec<Value> = class
            .map(|c| {
                vec![json!({ "type": "Attribute", "name": "class",
                             "value": [{ "type": "Text", "data": c }] })]
            })
            .unwrap_or_default();
        json!({
            "type": "RegularElement",
            "name": name,
            "start": start,
            "end": start + open_tag.len() as u32,
            "attributes": attributes,
            "fragment": { "nodes": children }
        })
    }

    fn class(name: &str, start: u32) -> Value {
        json!({ "type": "ClassSelector", "name": name, "start": start, "end": start + 1 + name.len() as u32 })
    }

    /// A compact rule such as `.a .b{color:red;margin:0}`; `parts` receives
    /// the rule's start offset.
    fn rule(source: &str, text: &str, parts: impl Fn(u32) -> Vec<Value>, declarations: &[(&str, &str)]) -> Value {
        let start = offset(source, text);
        let brace = start + text.find('{').expect("block") as u32;
        let end = start + text.len() as u32;

        let mut pos = brace + 1;
        let mut children = Vec::new();
        for (property, value) in declarations {
            let value_start = pos + property.len() as u32 + 1;
            let value_end = value_start + value.len() as u32;
            let mut identifiers = Vec::new();
            let mut word_start = value_start;
            for word in value.split(' ') {
                if word.starts_with(|c: char| c.is_ascii_alphabetic()) {
                    identifiers.push(json!({
                        "type": "Identifier", "name": word,
                        "start": word_start, "end": word_start + word.len() as u32
                    }));
                }
                word_start += word.len() as u32 + 1;
            }
            children.push(json!({
                "type": "Declaration",
                "property": property,
                "value": { "children": identifiers, "start": value_start, "end": value_end },
                "start": pos,
                "end": value_end
            }));
            pos = value_end + 1;
        }

        json!({
            "type": "Rule",
            "prelude": {
                "children": [{ "children": parts(start), "start": start, "end": brace }],
                "start": start,
                "end": brace
            },
            "block": { "children": children, "start": brace, "end": end },
            "start": start,
            "end": end
        })
    }

    fn stylesheet(source: &str, children: Vec<Value>) -> Value {
        let start = offset(source, "<style>");
        let content_start = start + "<style>".len() as u32;
        let content_end = offset(source, "</style>");
        json!({
            "start": start,
            "end": content_end + "</style>".len() as u32,
            "children": children,
            "content": {
                "start": content_start,
                "end": content_end,
                "styles": &source[content_start as usize..content_end as usize]
            }
        })
    }

    fn options(dev: bool) -> CompileOptions {
        CompileOptions {
            filename: "App.svelte".to_string(),
            dev,
            css_hash: Some(Arc::new(|_: &str, _: &str| "svelte-x".to_string())),
            ..Default::default()
        }
    }

    fn run(source: &str, nodes: Vec<Value>, css: Value, options: &CompileOptions) -> CompileResult {
        let ast: Root = serde_json::from_value(json!({
            "start": 0,
            "end": source.len(),
            "fragment": { "nodes": nodes },
            "css": css
        }))
        .expect("root json");
        compile(CompileInput::Template { source, ast }, options).expect("compile")
    }

    fn css_code(result: &CompileResult) -> &str {
        result.css.as_ref().map(|c| c.code.as_str()).expect("css output")
    }

    #[test]
    fn test_matched_rule_is_scoped() {
        let source = "<div class=\"a\"></div><style>.a { color: red; }</style>";
        let result = run(
            source,
            vec![element(source, "<div class=\"a\">", "div", Some("a"), vec![])],
            stylesheet(
                source,
                vec![rule(source, ".a { color: red; }", |s| vec![class("a", s)], &[])],
            ),
            &options(false),
        );
        assert_eq!(result.ast.template, vec!["<div class=\"a svelte-x\"></div>".to_string()]);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    }

    #[test]
    fn test_declarations_are_minified() {
        let source = "<div class=\"a\"></div><style>.a { color: red; }</style>";
        let s = offset(source, ".a {");
        let declaration = json!({
            "type": "Declaration",
            "property": "color",
            "value": { "children": [{ "type": "Identifier", "name": "red", "start": s + 12, "end": s + 15 }],
                       "start": s + 12, "end": s + 15 },
            "start": s + 5,
            "end": s + 15
        });
        let css = stylesheet(
            source,
            vec![json!({
                "type": "Rule",
                "prelude": { "children": [{ "children": [class("a", s)], "start": s, "end": s + 2 }],
                             "start": s, "end": s + 2 },
                "block": { "children": [declaration], "start": s + 3, "end": s + 18 },
                "start": s,
                "end": s + 18
            })],
        );
        let result = run(
            source,
            vec![element(source, "<div class=\"a\">", "div", Some("a"), vec![])],
            css,
            &options(false),
        );
        assert_eq!(css_code(&result), ".a.svelte-x{color:red}");
    }

    #[test]
    fn test_unused_selector_is_dropped_and_reported() {
        let source = "<p></p><style>.a{color:red}</style>";
        let result = run(
            source,
            vec![element(source, "<p>", "p", None, vec![])],
            stylesheet(source, vec![rule(source, ".a{color:red}", |s| vec![class("a", s)], &[("color", "red")])]),
            &options(false),
        );
        assert_eq!(css_code(&result), "");
        assert_eq!(result.ast.template, vec!["<p></p>".to_string()]);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].code, W_CSS_UNUSED_SELECTOR);
        assert_eq!(result.warnings[0].message, "Unused CSS selector \".a\"");
        assert_eq!(result.warnings[0].file, "App.svelte");
    }

    #[test]
    fn test_specificity_is_padded_across_rules() {
        let source = "<div class=\"a\"><p class=\"b\"></p></div><p class=\"c\"></p>\
                      <style>.a .b{color:red}.c{color:blue}</style>";
        let result = run(
            source,
            vec![
                element(
                    source,
                    "<div class=\"a\">",
                    "div",
                    Some("a"),
                    vec![element(source, "<p class=\"b\">", "p", Some("b"), vec![])],
                ),
                element(source, "<p class=\"c\">", "p", Some("c"), vec![]),
            ],
            stylesheet(
                source,
                vec![
                    rule(
                        source,
                        ".a .b{color:red}",
                        |s| {
                            vec![
                                class("a", s),
                                json!({ "type": "WhiteSpace", "start": s + 2, "end": s + 3 }),
                                class("b", s + 3),
                            ]
                        },
                        &[("color", "red")],
                    ),
                    rule(source, ".c{color:blue}", |s| vec![class("c", s)], &[("color", "blue")]),
                ],
            ),
            &options(false),
        );
        assert_eq!(
            css_code(&result),
            ".a.svelte-x .b.svelte-x{color:red}.c.svelte-x.svelte-x{color:blue}"
        );
        assert!(result.warnings.is_empty());
    }

    /// `@keyframes spin{to{opacity:0}}` wherever it sits in `source`.
    fn spin_keyframes(source: &str) -> Value {
        let k = offset(source, "@keyframes");
        json!({
            "type": "Atrule",
            "name": "keyframes",
            "prelude": {
                "children": [{ "type": "Identifier", "name": "spin", "start": k + 11, "end": k + 15 }],
                "start": k + 11,
                "end": k + 15
            },
            "block": {
                "children": [rule(
                    source,
                    "to{opacity:0}",
                    |s| vec![json!({ "type": "TypeSelector", "name": "to", "start": s, "end": s + 2 })],
                    &[("opacity", "0")],
                )],
                "start": k + 15,
                "end": k + 30
            },
            "start": k,
            "end": k + 30
        })
    }

    #[test]
    fn test_keyframes_are_renamed_with_their_references() {
        let source = "<div class=\"a\"></div><style>@keyframes spin{to{opacity:0}}.a{animation:spin 1s}</style>";
        let keyframes = spin_keyframes(source);
        let result = run(
            source,
            vec![element(source, "<div class=\"a\">", "div", Some("a"), vec![])],
            stylesheet(
                source,
                vec![
                    keyframes,
                    rule(source, ".a{animation:spin 1s}", |s| vec![class("a", s)], &[("animation", "spin 1s")]),
                ],
            ),
            &options(false),
        );
        assert_eq!(
            css_code(&result),
            "@keyframes svelte-x-spin{to{opacity:0}}.a.svelte-x{animation:svelte-x-spin 1s}"
        );
    }

    #[test]
    fn test_stylesheet_reports_keyframes_and_scoped_elements() {
        let source = "<div class=\"a\"></div><p></p><style>@keyframes spin{to{opacity:0}}.a{color:red}</style>";
        let mut ast: Root = serde_json::from_value(json!({
            "start": 0,
            "end": source.len(),
            "fragment": { "nodes": [
                element(source, "<div class=\"a\">", "div", Some("a"), vec![]),
                element(source, "<p>", "p", None, vec![])
            ] },
            "css": stylesheet(
                source,
                vec![
                    spin_keyframes(source),
                    rule(source, ".a{color:red}", |s| vec![class("a", s)], &[("color", "red")]),
                ],
            )
        }))
        .expect("root json");
        let css = ast.css.take().expect("stylesheet");
        let mut sheet = Stylesheet::new(StylesheetOptions {
            ast: &css,
            source,
            filename: "App.svelte",
            dev: false,
            css_hash: options(false).css_hash,
        });

        assert_eq!(sheet.keyframes().get("spin").map(String::as_str), Some("svelte-x-spin"));
        sheet.apply_all(&ast);
        assert!(sheet.is_scoped(offset(source, "<div")));
        assert!(!sheet.is_scoped(offset(source, "<p>")));
    }

    #[test]
    fn test_global_selector_is_unwrapped() {
        let source = "<p></p><style>:global(.x){color:red}</style>";
        let result = run(
            source,
            vec![element(source, "<p>", "p", None, vec![])],
            stylesheet(
                source,
                vec![rule(
                    source,
                    ":global(.x){color:red}",
                    |s| {
                        vec![json!({
                            "type": "PseudoClassSelector",
                            "name": "global",
                            "args": {
                                "children": [{ "children": [class("x", s + 8)], "start": s + 8, "end": s + 10 }],
                                "start": s + 8,
                                "end": s + 10
                            },
                            "start": s,
                            "end": s + 11
                        })]
                    },
                    &[("color", "red")],
                )],
            ),
            &options(false),
        );
        assert_eq!(css_code(&result), ".x{color:red}");
        assert!(result.warnings.is_empty());
        assert_eq!(result.ast.template, vec!["<p></p>".to_string()]);
    }

    #[test]
    fn test_spread_elements_need_manual_scoping() {
        let source = "<div {...rest}></div><style>div{color:red}</style>";
        let rest = offset(source, "rest");
        let div = json!({
            "type": "RegularElement",
            "name": "div",
            "start": 0,
            "end": 21,
            "attributes": [
                { "type": "SpreadAttribute",
                  "expression": { "type": "Identifier", "start": rest, "end": rest + 4 } }
            ]
        });
        let result = run(
            source,
            vec![div],
            stylesheet(
                source,
                vec![rule(
                    source,
                    "div{color:red}",
                    |s| vec![json!({ "type": "TypeSelector", "name": "div", "start": s, "end": s + 3 })],
                    &[("color", "red")],
                )],
            ),
            &options(false),
        );
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].code, W_CSS_MANUAL_SCOPING);
        assert!(result
            .ast
            .block
            .effect
            .iter()
            .flat_map(|e| e.operations.iter())
            .any(|op| matches!(op, OperationNode::SetDynamicProps { .. })));
        assert_eq!(css_code(&result), "div.svelte-x{color:red}");
    }

    #[test]
    fn test_source_map_points_at_the_component() {
        let source = "<div class=\"a\"></div><style>.a{color:red}</style>";
        let result = run(
            source,
            vec![element(source, "<div class=\"a\">", "div", Some("a"), vec![])],
            stylesheet(source, vec![rule(source, ".a{color:red}", |s| vec![class("a", s)], &[("color", "red")])]),
            &options(false),
        );
        let map: Value = serde_json::from_str(&result.css.as_ref().expect("css").map).expect("map json");
        assert_eq!(map["version"], 3);
        assert_eq!(map["sources"][0], "App.svelte");
        assert_eq!(map["file"], "App.css");
        assert!(!map["mappings"].as_str().unwrap_or("").is_empty());
    }

    #[test]
    fn test_css_option_off_skips_rendering() {
        let source = "<div class=\"a\"></div><style>.a{color:red}</style>";
        let mut options = options(false);
        options.css = false;
        let result = run(
            source,
            vec![element(source, "<div class=\"a\">", "div", Some("a"), vec![])],
            stylesheet(source, vec![rule(source, ".a{color:red}", |s| vec![class("a", s)], &[("color", "red")])]),
            &options,
        );
        assert!(result.css.is_none());
        assert_eq!(result.ast.template, vec!["<div class=\"a svelte-x\"></div>".to_string()]);
    }

    #[test]
    fn test_empty_rules_survive_in_dev() {
        let source = "<p class=\"a\"></p><style>.a{}</style>";
        let css = || stylesheet(source, vec![rule(source, ".a{}", |s| vec![class("a", s)], &[])]);
        let nodes = || vec![element(source, "<p class=\"a\">", "p", Some("a"), vec![])];

        let production = run(source, nodes(), css(), &options(false));
        assert_eq!(css_code(&production), "");

        let dev = run(source, nodes(), css(), &options(true));
        assert_eq!(css_code(&dev), ".a.svelte-x{}");
    }
}
