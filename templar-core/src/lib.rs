//! templar core library — domain types, materials ledger, settings, errors.
//!
//! - [`types`] — project newtype, material namespaces, image reference helpers
//! - [`materials`] — the per-render ledger (BOM), header encoding and diffing
//! - [`config`] — run-wide [`Settings`]
//! - [`error`] — [`MaterialsError`]

pub mod config;
pub mod error;
pub mod materials;
pub mod types;

pub use config::{Credentials, Settings};
pub use error::MaterialsError;
pub use materials::{Change, Ledger};
pub use types::{is_qualified_reference, Namespace, ProjectName};
