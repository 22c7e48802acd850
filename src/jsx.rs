//! JSX front-end
//!
//! Parses a module with oxc and lowers the first JSX expression it contains
//! into the template AST, so JSX components flow through the same transform
//! as Svelte-style templates. Vue-JSX control flow (`v-if` chains, `v-for`,
//! ternaries, `&&` and `.map`) becomes `IfBlock` and `EachBlock` nodes.

use html_escape::decode_html_entities;
use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_ast_visit::Visit;
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};
use oxc_syntax::operator::{BinaryOperator, LogicalOperator};

use crate::ast::{
    Attribute, AttributeChunk, AttributeNode, AttributeValue, Directive, EachBlock, ElementNode,
    ExpressionTag, Fragment, IfBlock, JsNode, Root, SpreadAttribute, TemplateNode, TextNode,
};
use crate::validate::{CompilerError, LineIndex, ERROR_TYPE_SYNTAX, X_JSX_SYNTAX};

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY
// ═══════════════════════════════════════════════════════════════════════════════

pub fn parse_jsx(source: &str, filename: &str) -> Result<Root, CompilerError> {
    let lines = LineIndex::new(source);
    let syntax_error = |message: &str, offset: u32| {
        let loc = lines.locate(offset);
        CompilerError::new(X_JSX_SYNTAX, message, filename, loc.line, loc.column)
            .with_type(ERROR_TYPE_SYNTAX)
    };

    let allocator = Allocator::default();
    let source_type = SourceType::default()
        .with_module(true)
        .with_typescript(true)
        .with_jsx(true);
    let ret = Parser::new(&allocator, source, source_type).parse();

    if let Some(first) = ret.errors.first() {
        let offset = first
            .labels
            .as_ref()
            .and_then(|labels| labels.first())
            .map(|label| label.offset() as u32)
            .unwrap_or(0);
        return Err(syntax_error(&first.to_string(), offset));
    }

    let mut finder = RootFinder {
        lowering: JsxLowering::new(source),
        nodes: None,
    };
    finder.visit_program(&ret.program);

    if let Some((message, offset)) = finder.lowering.error {
        return Err(syntax_error(&message, offset));
    }
    let Some(nodes) = finder.nodes else {
        return Err(syntax_error("No JSX expression found", 0));
    };

    tracing::debug!(file = %filename, nodes = nodes.len(), "jsx lowered");
    Ok(Root {
        start: 0,
        end: source.len() as u32,
        fragment: Fragment { nodes },
        css: None,
    })
}

/// Stops at the first JSX element or fragment in document order.
struct RootFinder<'s> {
    lowering: JsxLowering<'s>,
    nodes: Option<Vec<TemplateNode>>,
}

impl<'a> Visit<'a> for RootFinder<'_> {
    fn visit_jsx_element(&mut self, it: &JSXElement<'a>) {
        if self.nodes.is_some() {
            return;
        }
        let mut nodes = Vec::new();
        self.lowering.push_element(it, &mut nodes);
        self.nodes = Some(nodes);
    }

    fn visit_jsx_fragment(&mut self, it: &JSXFragment<'a>) {
        if self.nodes.is_some() {
            return;
        }
        self.nodes = Some(self.lowering.lower_children(&it.children));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOWERING
// ═══════════════════════════════════════════════════════════════════════════════

struct ForSpec {
    source: JsNode,
    value: Option<JsNode>,
    index: Option<String>,
    key_alias: Option<String>,
}

/// Control-flow attributes pulled off an element before it is lowered.
#[derive(Default)]
struct ControlFlow {
    v_if: Option<JsNode>,
    v_else_if: Option<JsNode>,
    v_else: bool,
    v_for: Option<ForSpec>,
}

struct JsxLowering<'s> {
    source: &'s str,
    error: Option<(String, u32)>,
}

fn js_node(kind: &str, span: Span) -> JsNode {
    JsNode::new(kind, span.start, span.end)
}

fn expression_kind(expr: &Expression) -> &'static str {
    match expr {
        Expression::Identifier(_) => "Identifier",
        Expression::StringLiteral(_) => "StringLiteral",
        Expression::NumericLiteral(_) => "NumericLiteral",
        Expression::BooleanLiteral(_) => "BooleanLiteral",
        Expression::NullLiteral(_) => "NullLiteral",
        Expression::TemplateLiteral(_) => "TemplateLiteral",
        Expression::CallExpression(_) => "CallExpression",
        Expression::ArrowFunctionExpression(_) => "ArrowFunctionExpression",
        Expression::ObjectExpression(_) => "ObjectExpression",
        Expression::ArrayExpression(_) => "ArrayExpression",
        Expression::StaticMemberExpression(_) | Expression::ComputedMemberExpression(_) => {
            "MemberExpression"
        }
        _ => "Expression",
    }
}

fn strip_parens<'b, 'a>(mut expr: &'b Expression<'a>) -> &'b Expression<'a> {
    while let Expression::ParenthesizedExpression(inner) = expr {
        expr = &inner.expression;
    }
    expr
}

fn is_jsx(expr: &Expression) -> bool {
    matches!(
        strip_parens(expr),
        Expression::JSXElement(_) | Expression::JSXFragment(_)
    )
}

/// A ternary whose branches render markup.
fn is_jsx_conditional(expr: &Expression) -> bool {
    match strip_parens(expr) {
        Expression::ConditionalExpression(cond) => {
            is_jsx(&cond.consequent)
                || is_jsx(&cond.alternate)
                || is_jsx_conditional(&cond.consequent)
                || is_jsx_conditional(&cond.alternate)
        }
        _ => false,
    }
}

fn tag_name(name: &JSXElementName) -> String {
    match name {
        JSXElementName::Identifier(id) => id.name.to_string(),
        JSXElementName::IdentifierReference(id) => id.name.to_string(),
        JSXElementName::NamespacedName(ns) => format!("{}:{}", ns.namespace.name, ns.name.name),
        JSXElementName::MemberExpression(me) => member_name(me),
        JSXElementName::ThisExpression(_) => "this".to_string(),
    }
}

fn member_name(me: &JSXMemberExpression) -> String {
    let object = match &me.object {
        JSXMemberExpressionObject::IdentifierReference(id) => id.name.to_string(),
        JSXMemberExpressionObject::MemberExpression(inner) => member_name(inner),
        JSXMemberExpressionObject::ThisExpression(_) => "this".to_string(),
    };
    format!("{}.{}", object, me.property.name)
}

fn attribute_name(name: &JSXAttributeName) -> String {
    match name {
        JSXAttributeName::Identifier(id) => id.name.to_string(),
        JSXAttributeName::NamespacedName(ns) => format!("{}:{}", ns.namespace.name, ns.name.name),
    }
}

/// `onClick_stop` -> ("click", ["stop"]); `onUpdate:modelValue` keeps its suffix.
fn event_name(attr: &str) -> Option<(String, Vec<String>)> {
    let rest = attr.strip_prefix("on")?;
    if rest.is_empty() {
        return Some((String::new(), vec![]));
    }
    let mut chars = rest.chars();
    let first = chars.next()?;
    if !first.is_ascii_uppercase() {
        return None;
    }
    let mut parts = rest.split('_');
    let head = parts.next().unwrap_or_default();
    let mut name = String::with_capacity(head.len());
    name.push(first.to_ascii_lowercase());
    name.push_str(&head[first.len_utf8()..]);
    Some((name, parts.map(str::to_string).collect()))
}

/// `v-model:title_trim` -> ("model", Some("title"), ["trim"]).
fn split_directive(attr: &str) -> Option<(String, Option<String>, Vec<String>)> {
    let rest = attr.strip_prefix("v-")?;
    let mut parts = rest.split('_');
    let head = parts.next().unwrap_or_default();
    let modifiers = parts.map(str::to_string).collect();
    let (name, arg) = match head.split_once(':') {
        Some((name, arg)) => (name.to_string(), Some(arg.to_string())),
        None => (head.to_string(), None),
    };
    Some((name, arg, modifiers))
}

/// JSX text whitespace: lines are trimmed where they meet a line break and
/// whitespace-only lines disappear.
fn clean_jsx_text(value: &str) -> String {
    let lines: Vec<&str> = value.split('\n').map(|l| l.trim_end_matches('\r')).collect();
    let last_non_empty = lines.iter().rposition(|l| !l.trim().is_empty());
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        let mut text = line.replace('\t', " ");
        if i != 0 {
            text = text.trim_start().to_string();
        }
        if i != lines.len() - 1 {
            text = text.trim_end().to_string();
        }
        if text.is_empty() {
            continue;
        }
        out.push_str(&text);
        if Some(i) != last_non_empty {
            out.push(' ');
        }
    }
    out
}

/// The IfBlock at the end of an open `v-if`/`v-else-if` chain.
fn open_tail(block: &mut IfBlock) -> Option<&mut IfBlock> {
    if block.alternate.is_none() {
        return Some(block);
    }
    match block.alternate.as_mut().map(|f| f.nodes.as_mut_slice()) {
        Some([TemplateNode::IfBlock(nested)]) if nested.elseif => open_tail(nested),
        _ => None,
    }
}

fn key_attribute(nodes: &[TemplateNode]) -> Option<JsNode> {
    let [node] = nodes else { return None };
    match &node.element()?.attribute("key")?.value {
        AttributeValue::Expression(tag) => Some(tag.expression.clone()),
        _ => None,
    }
}

impl<'s> JsxLowering<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            error: None,
        }
    }

    fn fail(&mut self, message: &str, offset: u32) {
        if self.error.is_none() {
            self.error = Some((message.to_string(), offset));
        }
    }

    fn text(&self, span: Span) -> &'s str {
        self.source
            .get(span.start as usize..span.end as usize)
            .unwrap_or("")
    }

    fn lower_children(&mut self, children: &[JSXChild]) -> Vec<TemplateNode> {
        let mut out = Vec::new();
        for child in children {
            match child {
                JSXChild::Text(t) => {
                    let data = clean_jsx_text(&t.value);
                    if !data.is_empty() {
                        let data = decode_html_entities(&data).into_owned();
                        out.push(TemplateNode::Text(TextNode {
                            data,
                            raw: t.value.to_string(),
                            start: t.span.start,
                            end: t.span.end,
                        }));
                    }
                }
                JSXChild::Element(el) => self.push_element(el, &mut out),
                JSXChild::Fragment(frag) => {
                    let nodes = self.lower_children(&frag.children);
                    out.extend(nodes);
                }
                JSXChild::ExpressionContainer(container) => {
                    if let Some(expr) = container.expression.as_expression() {
                        let nodes = self.lower_expression(expr, container.span);
                        out.extend(nodes);
                    }
                }
                JSXChild::Spread(spread) => {
                    out.push(TemplateNode::ExpressionTag(ExpressionTag {
                        expression: js_node("SpreadElement", spread.expression.span()),
                        start: spread.span.start,
                        end: spread.span.end,
                    }));
                }
            }
        }
        out
    }

    /// Markup or an embedded expression rendered in place.
    fn lower_expression(&mut self, expr: &Expression, container: Span) -> Vec<TemplateNode> {
        let inner = strip_parens(expr);
        let node = match inner {
            Expression::JSXElement(el) => {
                let mut nodes = Vec::new();
                self.push_element(el, &mut nodes);
                return nodes;
            }
            Expression::JSXFragment(frag) => return self.lower_children(&frag.children),
            Expression::ConditionalExpression(cond) if is_jsx_conditional(inner) => {
                TemplateNode::IfBlock(self.lower_conditional(cond, false))
            }
            Expression::LogicalExpression(logical)
                if logical.operator == LogicalOperator::And && is_jsx(&logical.right) =>
            {
                TemplateNode::IfBlock(IfBlock {
                    elseif: false,
                    test: js_node(expression_kind(&logical.left), logical.left.span()),
                    consequent: Fragment {
                        nodes: self.lower_branch(&logical.right),
                    },
                    alternate: None,
                    start: logical.span.start,
                    end: logical.span.end,
                })
            }
            Expression::CallExpression(call) => match self.lower_map(call) {
                Some(each) => TemplateNode::EachBlock(each),
                None => expression_tag(expr, container),
            },
            _ => expression_tag(expr, container),
        };
        vec![node]
    }

    fn lower_branch(&mut self, expr: &Expression) -> Vec<TemplateNode> {
        let inner = strip_parens(expr);
        match inner {
            Expression::NullLiteral(_) => vec![],
            Expression::Identifier(id) if id.name == "undefined" => vec![],
            _ => self.lower_expression(expr, inner.span()),
        }
    }

    fn lower_conditional(&mut self, cond: &ConditionalExpression, elseif: bool) -> IfBlock {
        let consequent = self.lower_branch(&cond.consequent);
        let alternate = match strip_parens(&cond.alternate) {
            Expression::ConditionalExpression(nested) if is_jsx_conditional(&cond.alternate) => {
                vec![TemplateNode::IfBlock(self.lower_conditional(nested, true))]
            }
            _ => self.lower_branch(&cond.alternate),
        };
        IfBlock {
            elseif,
            test: js_node(expression_kind(&cond.test), cond.test.span()),
            consequent: Fragment { nodes: consequent },
            alternate: if alternate.is_empty() {
                None
            } else {
                Some(Fragment { nodes: alternate })
            },
            start: cond.span.start,
            end: cond.span.end,
        }
    }

    /// `list.map((item, i) => <li/>)`
    fn lower_map(&mut self, call: &CallExpression) -> Option<EachBlock> {
        let Expression::StaticMemberExpression(member) = &call.callee else {
            return None;
        };
        if member.property.name != "map" {
            return None;
        }
        let callback = call.arguments.first()?.as_expression()?;
        let (params, body) = match strip_parens(callback) {
            Expression::ArrowFunctionExpression(arrow) => {
                let body = if arrow.expression {
                    arrow.get_expression()
                } else {
                    returned_expression(&arrow.body.statements)
                };
                (&arrow.params, body)
            }
            Expression::FunctionExpression(func) => {
                let body = func
                    .body
                    .as_ref()
                    .and_then(|b| returned_expression(&b.statements));
                (&func.params, body)
            }
            _ => return None,
        };
        let body = body.filter(|b| is_jsx(b))?;

        let value = params
            .items
            .first()
            .map(|p| js_node("Pattern", p.pattern.span()));
        let index = params.items.get(1).and_then(|p| match &p.pattern {
            BindingPattern::BindingIdentifier(id) => Some(id.name.to_string()),
            _ => None,
        });
        let nodes = self.lower_branch(body);
        Some(EachBlock {
            expression: js_node(expression_kind(&member.object), member.object.span()),
            context: value,
            index,
            key_alias: None,
            key: key_attribute(&nodes),
            body: Fragment { nodes },
            fallback: None,
            start: call.span.start,
            end: call.span.end,
        })
    }

    /// `(item, i) in list`, `(value, key, index) in obj` or `item in list`.
    fn parse_v_for(&mut self, expr: &Expression) -> Option<ForSpec> {
        let Expression::BinaryExpression(binary) = strip_parens(expr) else {
            self.fail("v-for expects `alias in source`", expr.span().start);
            return None;
        };
        if binary.operator != BinaryOperator::In {
            self.fail("v-for expects `alias in source`", binary.span.start);
            return None;
        }
        let source = js_node(expression_kind(&binary.right), binary.right.span());
        let aliases: Vec<&Expression> = match strip_parens(&binary.left) {
            Expression::SequenceExpression(seq) => seq.expressions.iter().collect(),
            other => vec![other],
        };
        let alias_text = |e: &Expression| self.text(e.span()).trim().to_string();
        let (key_alias, index) = match aliases.len() {
            0 | 1 => (None, None),
            2 => (None, Some(alias_text(aliases[1]))),
            _ => (Some(alias_text(aliases[1])), Some(alias_text(aliases[2]))),
        };
        Some(ForSpec {
            source,
            value: aliases.first().map(|e| js_node("Pattern", e.span())),
            index,
            key_alias,
        })
    }

    /// Lowers an element and places it into `out`, attaching `v-else-if` and
    /// `v-else` to the chain opened by the preceding sibling.
    fn push_element(&mut self, el: &JSXElement, out: &mut Vec<TemplateNode>) {
        let (element, flow) = self.lower_element(el);
        let name = element.name.clone();
        let node = if name == "slot" {
            TemplateNode::SlotElement(element)
        } else if name == "template" {
            TemplateNode::SvelteFragment(element)
        } else if name.contains('.') || name.starts_with(|c: char| c.is_ascii_uppercase()) {
            TemplateNode::Component(element)
        } else {
            TemplateNode::RegularElement(element)
        };

        let node = match flow.v_for {
            Some(spec) => {
                let body = vec![node];
                TemplateNode::EachBlock(EachBlock {
                    expression: spec.source,
                    context: spec.value,
                    index: spec.index,
                    key_alias: spec.key_alias,
                    key: key_attribute(&body),
                    body: Fragment { nodes: body },
                    fallback: None,
                    start: el.span.start,
                    end: el.span.end,
                })
            }
            None => node,
        };

        if let Some(test) = flow.v_if {
            out.push(TemplateNode::IfBlock(IfBlock {
                elseif: false,
                test,
                consequent: Fragment { nodes: vec![node] },
                alternate: None,
                start: el.span.start,
                end: el.span.end,
            }));
            return;
        }

        if flow.v_else_if.is_none() && !flow.v_else {
            out.push(node);
            return;
        }

        // Whitespace between branches on one line still joins the chain.
        while out.last().is_some_and(|n| n.is_whitespace_text() || n.is_comment()) {
            out.pop();
        }
        let tail = match out.last_mut() {
            Some(TemplateNode::IfBlock(head)) => {
                head.end = el.span.end;
                open_tail(head)
            }
            _ => None,
        };
        let Some(tail) = tail else {
            self.fail("v-else/v-else-if has no adjacent v-if", el.span.start);
            return;
        };
        let branch = match flow.v_else_if {
            Some(test) => TemplateNode::IfBlock(IfBlock {
                elseif: true,
                test,
                consequent: Fragment { nodes: vec![node] },
                alternate: None,
                start: el.span.start,
                end: el.span.end,
            }),
            None => node,
        };
        tail.alternate = Some(Fragment {
            nodes: vec![branch],
        });
    }

    fn lower_element(&mut self, el: &JSXElement) -> (ElementNode, ControlFlow) {
        let opening = &el.opening_element;
        let mut flow = ControlFlow::default();
        let mut attributes = Vec::new();
        let mut html: Option<ExpressionTag> = None;

        for item in &opening.attributes {
            let attr = match item {
                JSXAttributeItem::SpreadAttribute(spread) => {
                    attributes.push(AttributeNode::SpreadAttribute(SpreadAttribute {
                        expression: js_node(expression_kind(&spread.argument), spread.argument.span()),
                        start: spread.span.start,
                        end: spread.span.end,
                    }));
                    continue;
                }
                JSXAttributeItem::Attribute(attr) => attr,
            };

            let name = attribute_name(&attr.name);
            let value = self.attribute_value(attr.value.as_ref());
            let expression = match &value {
                AttributeValue::Expression(tag) => Some(tag.expression.clone()),
                _ => None,
            };
            let directive = |name: String, modifiers: Vec<String>| Directive {
                name,
                expression: expression.clone(),
                modifiers,
                start: attr.span.start,
                end: attr.span.end,
            };

            if let Some((event, modifiers)) = event_name(&name) {
                attributes.push(AttributeNode::OnDirective(directive(event, modifiers)));
                continue;
            }
            if name == "ref" {
                attributes.push(AttributeNode::BindDirective(directive("this".to_string(), vec![])));
                continue;
            }

            let Some((dir, arg, modifiers)) = split_directive(&name) else {
                attributes.push(AttributeNode::Attribute(Attribute {
                    name,
                    value,
                    start: attr.span.start,
                    end: attr.span.end,
                }));
                continue;
            };

            match dir.as_str() {
                "if" => flow.v_if = expression.clone(),
                "else-if" => flow.v_else_if = expression.clone(),
                "else" => flow.v_else = true,
                "for" => {
                    flow.v_for = match attr.value.as_ref() {
                        Some(JSXAttributeValue::ExpressionContainer(c)) => c
                            .expression
                            .as_expression()
                            .and_then(|e| self.parse_v_for(e)),
                        _ => {
                            self.fail("v-for expects an expression", attr.span.start);
                            None
                        }
                    }
                }
                "model" => {
                    let target = arg.unwrap_or_else(|| "value".to_string());
                    attributes.push(AttributeNode::BindDirective(directive(target, modifiers)));
                }
                "html" => {
                    if let AttributeValue::Expression(tag) = value {
                        html = Some(tag);
                    }
                }
                "slot" => attributes.push(AttributeNode::Attribute(Attribute {
                    name: "slot".to_string(),
                    value: AttributeValue::Sequence(vec![AttributeChunk::Text(TextNode {
                        data: arg.unwrap_or_else(|| "default".to_string()),
                        ..Default::default()
                    })]),
                    start: attr.span.start,
                    end: attr.span.end,
                })),
                "once" => attributes.push(AttributeNode::Attribute(Attribute {
                    name: "v-once".to_string(),
                    value: AttributeValue::Boolean(true),
                    start: attr.span.start,
                    end: attr.span.end,
                })),
                _ => attributes.push(AttributeNode::UseDirective(directive(dir, modifiers))),
            }
        }

        let mut nodes = self.lower_children(&el.children);
        if let Some(tag) = html {
            nodes.insert(0, TemplateNode::HtmlTag(tag));
        }

        let element = ElementNode {
            name: tag_name(&opening.name),
            attributes,
            fragment: Fragment { nodes },
            start: el.span.start,
            end: el.span.end,
        };
        (element, flow)
    }

    fn attribute_value(&mut self, value: Option<&JSXAttributeValue>) -> AttributeValue {
        match value {
            None => AttributeValue::Boolean(true),
            Some(JSXAttributeValue::StringLiteral(s)) => {
                AttributeValue::Sequence(vec![AttributeChunk::Text(TextNode {
                    data: decode_html_entities(s.value.as_str()).into_owned(),
                    raw: self.text(s.span).to_string(),
                    start: s.span.start + 1,
                    end: s.span.end.saturating_sub(1),
                })])
            }
            Some(JSXAttributeValue::ExpressionContainer(container)) => {
                match container.expression.as_expression() {
                    Some(expr) => AttributeValue::Expression(ExpressionTag {
                        expression: js_node(expression_kind(expr), expr.span()),
                        start: container.span.start,
                        end: container.span.end,
                    }),
                    None => AttributeValue::Boolean(true),
                }
            }
            Some(JSXAttributeValue::Element(el)) => AttributeValue::Expression(ExpressionTag {
                expression: js_node("JSXElement", el.span),
                start: el.span.start,
                end: el.span.end,
            }),
            Some(JSXAttributeValue::Fragment(frag)) => AttributeValue::Expression(ExpressionTag {
                expression: js_node("JSXFragment", frag.span),
                start: frag.span.start,
                end: frag.span.end,
            }),
        }
    }
}

fn expression_tag(expr: &Expression, container: Span) -> TemplateNode {
    TemplateNode::ExpressionTag(ExpressionTag {
        expression: js_node(expression_kind(expr), expr.span()),
        start: container.start,
        end: container.end,
    })
}

fn returned_expression<'b, 'a>(statements: &'b [Statement<'a>]) -> Option<&'b Expression<'a>> {
    statements.iter().find_map(|s| match s {
        Statement::ReturnStatement(ret) => ret.argument.as_ref(),
        _ => None,
    })
}
