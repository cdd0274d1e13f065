use std::path::{Path, PathBuf};

use annotator_core_types::{Annotation, HostCommand};
use anyhow::Result;
use clap::Args;
use page_annotations::{AnnotationPolicy, AnnotationSession};
use tokio::fs;
use tracing::info;

use crate::errors::{AnnotatorError, AnnotatorResult};
use crate::host::JsonLinesSink;
use crate::html;

#[derive(Args, Clone, Debug)]
pub struct AnnotateArgs {
    /// HTML file to decorate
    #[arg(value_name = "HTML")]
    pub html: PathBuf,

    /// JSON array of annotations, offsets into the extracted text
    #[arg(value_name = "ANNOTATIONS")]
    pub annotations: PathBuf,

    /// Maximum number of characters to extract before decorating
    #[arg(long)]
    pub max_chars: Option<usize>,

    /// Simulate a tap on the annotation with this index
    #[arg(long, value_name = "INDEX")]
    pub tap: Option<usize>,

    /// Print the decorated body after the host messages
    #[arg(long)]
    pub print_html: bool,
}

pub async fn cmd_annotate(args: AnnotateArgs, policy: AnnotationPolicy) -> Result<()> {
    let mut doc = html::load_file(&args.html).await?;
    let annotations = read_annotations(&args.annotations).await?;
    let max_chars = args.max_chars.unwrap_or(policy.default_max_chars);

    let mut session = AnnotationSession::new(JsonLinesSink::stdout(), policy);
    session.extract_text(&doc, max_chars);
    if let Some(report) = session.decorate_annotations(&mut doc, annotations) {
        info!(
            successes = report.successes,
            total = report.total,
            "annotations decorated"
        );
    }
    if let Some(index) = args.tap {
        session.handle_command(&mut doc, HostCommand::Tap { index });
    }

    if args.print_html {
        println!("{}", html::serialize(&doc, doc.body()));
    }
    Ok(())
}

async fn read_annotations(path: &Path) -> AnnotatorResult<Vec<Annotation>> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|err| AnnotatorError::read(path, err))?;
    serde_json::from_str(&content)
        .map_err(|err| AnnotatorError::json(path.display().to_string(), err))
}
