use clap::Subcommand;

use super::annotate::AnnotateArgs;
use super::extract::ExtractArgs;
use super::stdio::StdioArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Extract the visible text of an HTML page
    Extract(ExtractArgs),

    /// Decorate annotations from a JSON file into an HTML page
    Annotate(AnnotateArgs),

    /// Serve host commands read as JSON lines from stdin
    Stdio(StdioArgs),
}
