pub mod annotate;
pub mod app;
pub mod commands;
pub mod env;
pub mod extract;
pub mod runtime;
pub mod stdio;

pub use annotate::{cmd_annotate, AnnotateArgs};
pub use extract::{cmd_extract, ExtractArgs};
pub use stdio::{cmd_stdio, StdioArgs};
