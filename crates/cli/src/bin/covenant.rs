use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    covenant_cli::main_entry().await
}
