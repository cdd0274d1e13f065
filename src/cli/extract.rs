use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use page_annotations::{AnnotationPolicy, AnnotationSession};

use crate::host::JsonLinesSink;
use crate::html;

#[derive(Args, Clone, Debug)]
pub struct ExtractArgs {
    /// HTML file to read
    #[arg(value_name = "HTML")]
    pub html: PathBuf,

    /// Maximum number of characters to extract
    #[arg(long)]
    pub max_chars: Option<usize>,
}

pub async fn cmd_extract(args: ExtractArgs, policy: AnnotationPolicy) -> Result<()> {
    let doc = html::load_file(&args.html).await?;
    let max_chars = args.max_chars.unwrap_or(policy.default_max_chars);
    let mut session = AnnotationSession::new(JsonLinesSink::stdout(), policy);
    session.extract_text(&doc, max_chars);
    Ok(())
}
