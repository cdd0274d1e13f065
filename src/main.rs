use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    page_annotator::cli::app::run().await
}
