//! # templar-renderer
//!
//! Tera-based template engine with a pluggable function registry.
//!
//! A [`FunctionRegistry`] collects [`FunctionSource`]s; the [`TemplateEngine`]
//! either executes a template with the real functions (recording a materials
//! ledger) or dry-runs it with stubs that only record call arguments.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use templar_renderer::{FunctionRegistry, TemplateEngine};
//!
//! fn show(path: &Path) {
//!     if let Ok(engine) = TemplateEngine::new(FunctionRegistry::new(), None) {
//!         if let Ok(rendered) = engine.render(path) {
//!             println!("{} bytes, {} materials", rendered.content.len(), rendered.ledger.len());
//!         }
//!     }
//! }
//! ```

pub mod args;
pub mod engine;
pub mod error;
pub mod registry;

pub use engine::{CallArgs, RecordedCalls, Rendered, TemplateEngine};
pub use error::RenderError;
pub use registry::{
    Args, FunctionRegistry, FunctionSource, MaterialSink, NullSink, ResultKind, TemplateFunction,
};
