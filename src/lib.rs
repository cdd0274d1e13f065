//! page-annotator library
//!
//! HTML loading, configuration and the JSON-lines host used by the
//! `page-annotator` binary. Exposed for integration testing.

pub mod cli;
pub mod config;
pub mod errors;
pub mod host;
pub mod html;

pub use config::{AnnotatorConfig, LoadedConfig};
pub use errors::{AnnotatorError, AnnotatorResult};
pub use host::JsonLinesSink;
