//! Compile driver
//!
//! Runs one file through the pipeline: parse (JSX) or take the foreign AST,
//! normalize whitespace, scope the stylesheet, transform to IR, then hand the
//! IR to the caller's generator. Diagnostics are collected per file and
//! drained into the caller's hooks by [`Compiler`].

#[cfg(feature = "napi")]
use napi_derive::napi;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::ast::Root;
use crate::ir::RootIRNode;
use crate::jsx::parse_jsx;
use crate::normalize::normalize_root;
use crate::stylesheet::{CssHashFn, CssOutput, Stylesheet, StylesheetOptions};
use crate::transform::{transform, DirectiveTransform, NodeTransform};
use crate::validate::{
    CompilerError, CompilerWarning, ERROR_TYPE_SYNTAX, W_DEPRECATED_OPTION, X_INVALID_AST,
};

// ═══════════════════════════════════════════════════════════════════════════════
// OPTIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum CompileMode {
    #[default]
    Module,
    Function,
}

pub type ErrorHandler = Arc<dyn Fn(&CompilerError) + Send + Sync>;
pub type WarningHandler = Arc<dyn Fn(&CompilerWarning) + Send + Sync>;

/// Turns the IR into JavaScript. Generation lives outside this crate.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self, ir: &RootIRNode, options: &CompileOptions) -> GeneratedCode;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedCode {
    pub code: String,
    pub preamble: String,
    pub helpers: BTreeSet<String>,
    pub vapor_helpers: BTreeSet<String>,
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompileOptions {
    pub filename: String,
    pub prefix_identifiers: bool,
    /// Attribute stamped on every element (`data-v-xxxx`).
    pub scope_id: Option<String>,
    pub mode: CompileMode,
    /// Names declared in the component script, with their binding kind.
    pub binding_metadata: HashMap<String, String>,
    pub expression_plugins: Vec<String>,
    pub is_ts: bool,
    pub inherit_attrs: bool,
    pub comments: bool,
    pub dev: bool,
    /// Render the scoped stylesheet.
    pub css: bool,
    /// No effect in vapor mode.
    pub cache_handlers: Option<bool>,
    /// No effect in vapor mode.
    pub hoist_static: Option<bool>,

    #[serde(skip)]
    pub node_transforms: Vec<NodeTransform>,
    #[serde(skip)]
    pub directive_transforms: HashMap<String, DirectiveTransform>,
    #[serde(skip)]
    pub on_error: Option<ErrorHandler>,
    #[serde(skip)]
    pub on_warn: Option<WarningHandler>,
    #[serde(skip)]
    pub css_hash: Option<CssHashFn>,
    #[serde(skip)]
    pub generator: Option<Arc<dyn CodeGenerator>>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            filename: "index.vue".to_string(),
            prefix_identifiers: false,
            scope_id: None,
            mode: CompileMode::Module,
            binding_metadata: HashMap::new(),
            expression_plugins: Vec::new(),
            is_ts: false,
            inherit_attrs: false,
            comments: false,
            dev: false,
            css: true,
            cache_handlers: None,
            hoist_static: None,
            node_transforms: Vec::new(),
            directive_transforms: HashMap::new(),
            on_error: None,
            on_warn: None,
            css_hash: None,
            generator: None,
        }
    }
}

impl fmt::Debug for CompileOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompileOptions")
            .field("filename", &self.filename)
            .field("prefix_identifiers", &self.prefix_identifiers)
            .field("scope_id", &self.scope_id)
            .field("mode", &self.mode)
            .field("binding_metadata", &self.binding_metadata)
            .field("expression_plugins", &self.expression_plugins)
            .field("is_ts", &self.is_ts)
            .field("inherit_attrs", &self.inherit_attrs)
            .field("comments", &self.comments)
            .field("dev", &self.dev)
            .field("css", &self.css)
            .field("node_transforms", &self.node_transforms.len())
            .field("directive_transforms", &self.directive_transforms.keys().collect::<Vec<_>>())
            .field("generator", &self.generator.is_some())
            .finish_non_exhaustive()
    }
}

impl CompileOptions {
    fn deprecation_warnings(&self) -> Vec<CompilerWarning> {
        [
            ("cacheHandlers", self.cache_handlers.is_some()),
            ("hoistStatic", self.hoist_static.is_some()),
        ]
        .into_iter()
        .filter(|(_, set)| *set)
        .map(|(name, _)| CompilerWarning {
            code: W_DEPRECATED_OPTION.to_string(),
            message: format!("`{}` has no effect in vapor mode", name),
            file: self.filename.clone(),
            line: 1,
            column: 1,
        })
        .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INPUT & RESULT
// ═══════════════════════════════════════════════════════════════════════════════

pub enum CompileInput<'s> {
    /// Source plus the AST produced by the external template parser.
    Template { source: &'s str, ast: Root },
    Jsx { source: &'s str },
}

impl<'s> CompileInput<'s> {
    /// Template input from the parser's JSON output.
    pub fn from_json(source: &'s str, ast_json: &str, filename: &str) -> Result<Self, CompilerError> {
        let ast: Root = serde_json::from_str(ast_json).map_err(|e| {
            CompilerError::new(
                X_INVALID_AST,
                &format!("Template AST could not be read: {}", e),
                filename,
                e.line() as u32,
                e.column() as u32,
            )
            .with_type(ERROR_TYPE_SYNTAX)
        })?;
        Ok(CompileInput::Template { source, ast })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResult {
    pub code: String,
    pub ast: RootIRNode,
    pub preamble: String,
    pub helpers: BTreeSet<String>,
    pub vapor_helpers: BTreeSet<String>,
    pub css: Option<CssOutput>,
    pub errors: Vec<CompilerError>,
    pub warnings: Vec<CompilerWarning>,
}

pub struct BatchFile<'s> {
    pub filename: String,
    pub input: CompileInput<'s>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PIPELINE
// ═══════════════════════════════════════════════════════════════════════════════

fn css_file_name(filename: &str) -> String {
    Path::new(filename)
        .with_extension("css")
        .to_string_lossy()
        .into_owned()
}

fn compile_file(input: CompileInput<'_>, options: &CompileOptions) -> Result<CompileResult, CompilerError> {
    let (source, mut ast) = match input {
        CompileInput::Template { source, ast } => (source, ast),
        CompileInput::Jsx { source } => (source, parse_jsx(source, &options.filename)?),
    };
    tracing::debug!(file = %options.filename, bytes = source.len(), "compile start");

    normalize_root(&mut ast);

    let mut warnings = options.deprecation_warnings();
    let mut errors = Vec::new();

    // The scope class must be on the elements before their templates are built.
    let css_ast = ast.css.take();
    let mut stylesheet = css_ast.as_ref().map(|node| {
        Stylesheet::new(StylesheetOptions {
            ast: node,
            source,
            filename: &options.filename,
            dev: options.dev,
            css_hash: options.css_hash.clone(),
        })
    });
    if let Some(sheet) = stylesheet.as_mut() {
        sheet.apply_all(&ast);
        sheet.reify(&mut ast);
    }

    let output = transform(&ast, source, options);
    errors.extend(output.errors);
    warnings.extend(output.warnings);

    let mut css = None;
    if let Some(sheet) = &stylesheet {
        warnings.extend(sheet.warnings());
        if options.css && sheet.has_styles() {
            match sheet.render(&css_file_name(&options.filename)) {
                Ok(rendered) => css = Some(rendered),
                Err(e) => errors.push(e),
            }
        }
    }

    let generated = options
        .generator
        .as_ref()
        .map(|g| g.generate(&output.ir, options))
        .unwrap_or_default();

    tracing::debug!(
        file = %options.filename,
        errors = errors.len(),
        warnings = warnings.len(),
        "compile done"
    );

    Ok(CompileResult {
        code: generated.code,
        ast: output.ir,
        preamble: generated.preamble,
        helpers: generated.helpers,
        vapor_helpers: generated.vapor_helpers,
        css,
        errors,
        warnings,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER
// ═══════════════════════════════════════════════════════════════════════════════

/// Owns the options and the warn-once table shared by every compile it runs.
pub struct Compiler {
    options: CompileOptions,
    reported: HashSet<(String, String, String)>,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self {
            options,
            reported: HashSet::new(),
        }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn compile(&mut self, input: CompileInput<'_>) -> Result<CompileResult, CompilerError> {
        let result = compile_file(input, &self.options)?;
        self.drain(&result);
        Ok(result)
    }

    /// Compiles independent files in parallel. Results and hook calls keep
    /// input order.
    pub fn compile_batch(&mut self, files: Vec<BatchFile<'_>>) -> Vec<Result<CompileResult, CompilerError>> {
        tracing::debug!(files = files.len(), "batch compile");
        let options = &self.options;
        let results: Vec<Result<CompileResult, CompilerError>> = files
            .into_par_iter()
            .map(|file| {
                let mut file_options = options.clone();
                file_options.filename = file.filename;
                compile_file(file.input, &file_options)
            })
            .collect();

        for result in &results {
            match result {
                Ok(result) => self.drain(result),
                Err(error) => self.emit_error(error),
            }
        }
        results
    }

    fn emit_error(&self, error: &CompilerError) {
        match &self.options.on_error {
            Some(on_error) => on_error(error),
            None => tracing::debug!(code = %error.code, file = %error.file, "unhandled compile error"),
        }
    }

    fn drain(&mut self, result: &CompileResult) {
        for error in &result.errors {
            self.emit_error(error);
        }
        for warning in &result.warnings {
            let key = (warning.file.clone(), warning.code.clone(), warning.message.clone());
            if !self.reported.insert(key) {
                continue;
            }
            match &self.options.on_warn {
                Some(on_warn) => on_warn(warning),
                None => tracing::warn!(
                    code = %warning.code,
                    file = %warning.file,
                    line = warning.line,
                    "{}",
                    warning.message
                ),
            }
        }
    }
}

pub fn compile(input: CompileInput<'_>, options: &CompileOptions) -> Result<CompileResult, CompilerError> {
    Compiler::new(options.clone()).compile(input)
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Without `ast_json` the source is compiled as JSX.
#[cfg(feature = "napi")]
#[napi]
pub fn compile_template_native(
    source: String,
    ast_json: Option<String>,
    options_json: Option<String>,
) -> napi::Result<serde_json::Value> {
    let options: CompileOptions = match options_json {
        Some(json) => serde_json::from_str(&json)
            .map_err(|e| napi::Error::from_reason(format!("Invalid options: {}", e)))?,
        None => CompileOptions::default(),
    };
    let input = match &ast_json {
        Some(json) => CompileInput::from_json(&source, json, &options.filename)
            .map_err(|e| napi::Error::from_reason(e.to_string()))?,
        None => CompileInput::Jsx { source: &source },
    };
    let result = compile(input, &options).map_err(|e| napi::Error::from_reason(e.to_string()))?;
    serde_json::to_value(result).map_err(|e| napi::Error::from_reason(e.to_string()))
}
