//! # Vapor Template Compiler (native)
//!
//! Compiles Svelte-style template ASTs and JSX into the Vapor IR: a set of
//! deduplicated static HTML templates plus a tree of blocks whose operations
//! (`setText`, `setProp`, `insertNode`, `if`, `for`, ...) patch only what can
//! change. A scoped stylesheet engine encapsulates `<style>` rules against the
//! elements they match.
//!
//! ## Pipeline
//!
//! 1. **Input**: a foreign AST (`CompileInput::Template`) or JSX source, lowered
//!    to the same AST by [`jsx::parse_jsx`].
//! 2. **Normalize**: whitespace condensing, `<pre>` preserved.
//! 3. **Stylesheet**: selectors matched against elements, scope class added.
//! 4. **Transform**: the node transforms run over the tree, building the IR.
//! 5. **Render**: CSS minified with a v3 source map; the IR goes to the
//!    caller's [`CodeGenerator`].
//!
//! ## Invariants
//!
//! - Element ids are unique per compile and allocated depth-first.
//! - Each distinct template string is registered once.
//! - Binding errors never abort a compile; they are reported through
//!   `on_error` and listed in [`CompileResult::errors`].

pub mod ast;
pub mod css_ast;
pub mod ir;
pub mod jsx;

mod compile;
mod context;
mod css_selector;
mod expression;
mod normalize;
mod slot_outlet;
mod source_edit;
mod stylesheet;
mod template_ref;
mod transform;
mod transform_children;
mod transform_element;
mod transform_text;
mod v_bind;
mod v_for;
mod v_html;
mod v_if;
mod v_on;
mod v_slot;
mod validate;
mod visitor;

#[cfg(test)]
mod jsx_tests;
#[cfg(test)]
mod stylesheet_tests;
#[cfg(test)]
mod transform_tests;

#[cfg(feature = "napi")]
pub use compile::compile_template_native;
pub use compile::{
    compile, BatchFile, CodeGenerator, CompileInput, CompileMode, CompileOptions, CompileResult,
    Compiler, ErrorHandler, GeneratedCode, WarningHandler,
};
pub use context::{ExitFn, NodeRef, TransformContext};
pub use normalize::normalize_root;
pub use source_edit::SourceEdit;
pub use stylesheet::{default_css_hash, CssHashFn, CssOutput, Stylesheet, StylesheetOptions};
pub use transform::{transform, DirectiveTransform, NodeTransform, TransformOutput};
pub use validate::*;
pub use visitor::TemplateVisitor;
