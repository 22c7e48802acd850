#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};

use crate::ast::{AttributeValue, ElementNode};
use crate::ir::ModelType;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const X_V_ON_NO_EXPRESSION: &str = "VAPOR001";
pub const X_V_BIND_NO_EXPRESSION: &str = "VAPOR002";
pub const X_V_BIND_INVALID_TARGET: &str = "VAPOR003";
pub const X_V_BIND_INVALID_NAME: &str = "VAPOR004";
pub const X_RESERVED_PROP: &str = "VAPOR005";
pub const X_V_SLOT_MIXED_SLOT_USAGE: &str = "VAPOR006";
pub const X_V_SLOT_DUPLICATE_SLOT_NAMES: &str = "VAPOR007";
pub const X_HTML_TAG_NOT_ALONE: &str = "VAPOR008";
pub const X_V_FOR_MALFORMED: &str = "VAPOR009";
pub const X_JSX_SYNTAX: &str = "VAPOR010";
pub const X_INVALID_AST: &str = "VAPOR011";
pub const X_CSS_SOURCEMAP: &str = "VAPOR012";

// ═══════════════════════════════════════════════════════════════════════════════
// WARNING CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const W_CSS_UNUSED_SELECTOR: &str = "css_unused_selector";
pub const W_CSS_MANUAL_SCOPING: &str = "css_manual_scoping";
pub const W_DEPRECATED_OPTION: &str = "deprecated_option";

pub const ERROR_TYPE_COMPILER: &str = "COMPILER_ERROR";
pub const ERROR_TYPE_BINDING_TARGET: &str = "BINDING_TARGET";
pub const ERROR_TYPE_SYNTAX: &str = "SYNTAX_ERROR";

// ═══════════════════════════════════════════════════════════════════════════════
// GUARANTEES
// ═══════════════════════════════════════════════════════════════════════════════

fn get_guarantee(code: &str) -> &'static str {
    match code {
        X_V_ON_NO_EXPRESSION => "Event listeners always have a handler expression.",
        X_V_BIND_NO_EXPRESSION => "Two-way bindings always have a target expression.",
        X_V_BIND_INVALID_TARGET => "Two-way bindings only target elements that expose the bound property.",
        X_V_BIND_INVALID_NAME => "Only known element properties can be bound.",
        X_RESERVED_PROP => "Reserved attribute names are never forwarded as props.",
        X_V_SLOT_MIXED_SLOT_USAGE => {
            "A component receives its default slot either implicitly or explicitly, not both."
        }
        X_V_SLOT_DUPLICATE_SLOT_NAMES => "Each named slot is declared once per component.",
        X_HTML_TAG_NOT_ALONE => "Raw HTML replaces the whole content of its parent element.",
        X_V_FOR_MALFORMED => "Loops declare an iterable source and an item alias.",
        X_JSX_SYNTAX => "JSX input is syntactically valid.",
        X_INVALID_AST => "Template ASTs follow the documented node shapes.",
        X_CSS_SOURCEMAP => "Scoped CSS is always emitted with a source map.",
        _ => "Unknown rule.",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
#[error("[{code}] {message} ({file}:{line}:{column})")]
pub struct CompilerError {
    pub code: String,
    pub error_type: String,
    pub message: String,
    pub guarantee: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub context: Option<String>,
    pub hints: Vec<String>,
}

impl CompilerError {
    pub fn new(code: &str, message: &str, file: &str, line: u32, column: u32) -> Self {
        Self::with_details(code, message, file, line, column, None, vec![])
    }

    pub fn with_details(
        code: &str,
        message: &str,
        file: &str,
        line: u32,
        column: u32,
        context: Option<String>,
        hints: Vec<String>,
    ) -> Self {
        CompilerError {
            code: code.to_string(),
            error_type: ERROR_TYPE_COMPILER.to_string(),
            message: message.to_string(),
            guarantee: get_guarantee(code).to_string(),
            file: file.to_string(),
            line,
            column,
            context,
            hints,
        }
    }

    pub fn with_type(mut self, error_type: &str) -> Self {
        self.error_type = error_type.to_string();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct CompilerWarning {
    pub code: String,
    pub message: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE LOCATIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

/// Byte offset to 1-based line/column lookup, built once per source.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<u32>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i as u32 + 1);
            }
        }
        Self { line_starts }
    }

    pub fn locate(&self, offset: u32) -> SourceLocation {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(next) => next.saturating_sub(1),
        };
        SourceLocation {
            line: line as u32 + 1,
            column: offset - self.line_starts[line] + 1,
        }
    }

    /// Zero-based (line, column) pair with the column in UTF-16 code units,
    /// the form source maps use. `source` is the text the index was built from.
    pub fn locate_utf16(&self, source: &str, offset: u32) -> (u32, u32) {
        let loc = self.locate(offset);
        let line_start = self.line_starts[loc.line as usize - 1] as usize;
        let column = source
            .get(line_start..offset as usize)
            .map(|text| text.encode_utf16().count() as u32)
            .unwrap_or(loc.column - 1);
        (loc.line - 1, column)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BINDING TARGET VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// A rejected `bind:` directive, before it is positioned in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingViolation {
    pub code: &'static str,
    pub message: String,
}

impl BindingViolation {
    fn invalid_target(name: &str, expected: &str) -> Self {
        Self {
            code: X_V_BIND_INVALID_TARGET,
            message: format!("`bind:{}` can only be used with {}", name, expected),
        }
    }
}

/// Static value of the `type` attribute, `Err(())` when it is computed at runtime.
fn input_type(element: &ElementNode) -> Result<Option<String>, ()> {
    match element.attribute("type") {
        None => Ok(None),
        Some(attr) => match &attr.value {
            AttributeValue::Boolean(_) => Ok(Some(String::new())),
            value => value.static_text().map(|t| Some(t.to_lowercase())).ok_or(()),
        },
    }
}

/// Checks that a native element can carry the given two-way binding and returns
/// the model flavour the runtime has to install.
pub fn validate_binding_target(
    element: &ElementNode,
    name: &str,
) -> Result<ModelType, BindingViolation> {
    let tag = element.name.to_lowercase();
    let input_type = if tag == "input" {
        input_type(element)
    } else {
        Ok(None)
    };

    match name {
        "value" => match tag.as_str() {
            "input" => match input_type {
                Err(()) => Ok(ModelType::Dynamic),
                Ok(Some(t)) if t == "file" => Err(BindingViolation {
                    code: X_V_BIND_INVALID_TARGET,
                    message: "`bind:value` cannot be used with <input type=\"file\">, use `bind:files` instead".to_string(),
                }),
                Ok(Some(t)) if t == "checkbox" => Ok(ModelType::Checkbox),
                Ok(Some(t)) if t == "radio" => Ok(ModelType::Radio),
                Ok(_) => Ok(ModelType::Text),
            },
            "textarea" => Ok(ModelType::Text),
            "select" => Ok(ModelType::Select),
            _ => Err(BindingViolation::invalid_target(
                name,
                "<input>, <textarea> or <select>",
            )),
        },
        "checked" | "indeterminate" => match input_type {
            Ok(Some(t)) if tag == "input" && t == "checkbox" => Ok(ModelType::Checkbox),
            _ => Err(BindingViolation::invalid_target(name, "<input type=\"checkbox\">")),
        },
        "group" => match input_type {
            Ok(Some(t)) if tag == "input" && t == "radio" => Ok(ModelType::Radio),
            Ok(Some(t)) if tag == "input" && t == "checkbox" => Ok(ModelType::Checkbox),
            _ => Err(BindingViolation::invalid_target(
                name,
                "<input type=\"radio\"> or <input type=\"checkbox\">",
            )),
        },
        "files" => match input_type {
            Ok(Some(t)) if tag == "input" && t == "file" => Ok(ModelType::File),
            _ => Err(BindingViolation::invalid_target(name, "<input type=\"file\">")),
        },
        "open" => {
            if tag == "details" || tag == "dialog" {
                Ok(ModelType::Property)
            } else {
                Err(BindingViolation::invalid_target(name, "<details> or <dialog>"))
            }
        }
        "innerHTML" | "innerText" | "textContent" => {
            if element.attribute("contenteditable").is_some() {
                Ok(ModelType::Property)
            } else {
                Err(BindingViolation::invalid_target(
                    name,
                    "elements with a `contenteditable` attribute",
                ))
            }
        }
        _ => Err(BindingViolation {
            code: X_V_BIND_INVALID_NAME,
            message: format!("`bind:{}` is not a valid binding on <{}>", name, element.name),
        }),
    }
}
