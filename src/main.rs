use anyhow::Result;
use recipebot::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
