use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use page_annotations::{AnnotationPolicy, AnnotationSession};
use tokio::io::BufReader;
use tracing::info;

use crate::host::{self, JsonLinesSink};
use crate::html;

#[derive(Args, Clone, Debug)]
pub struct StdioArgs {
    /// HTML file the commands operate on
    #[arg(value_name = "HTML")]
    pub html: PathBuf,
}

/// Reads one JSON command per line from stdin and answers on stdout until
/// stdin closes.
pub async fn cmd_stdio(args: StdioArgs, policy: AnnotationPolicy) -> Result<()> {
    let mut doc = html::load_file(&args.html).await?;
    let mut session = AnnotationSession::new(JsonLinesSink::stdout(), policy);
    session.attach(&mut doc)?;

    let reader = BufReader::new(tokio::io::stdin());
    let handled = host::serve_lines(reader, &mut doc, &mut session).await?;

    session.detach(&mut doc);
    info!(handled, "stdin closed");
    Ok(())
}
