use std::time::Duration;

use anyhow::{Result, anyhow};
use futures_util::StreamExt;

use super::render::render;
use crate::ai::recipe::{HttpPageFetcher, RecipeBot};
use crate::ai::structured::{StreamChunk, StreamMode};
use crate::core::AppConfig;
use crate::openai::OpenAiClient;

pub async fn run(url: &str, annotations: &str, config: &AppConfig) -> Result<()> {
    let store = super::open_store(&config.db_path).await?;
    let fetcher = HttpPageFetcher::new(Duration::from_secs(config.request_timeout_secs));
    let client = OpenAiClient::from_config(config);

    let mut bot = RecipeBot::new(&config.openai_model);
    println!("Fetching {}...", url);

    let mut output = None;
    let result = {
        let mut chunks = bot
            .extract(&client, &fetcher, url, annotations, StreamMode::Delta)
            .await?;
        let mut result = Ok(());
        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(StreamChunk::Done(done)) => output = Some(done),
                Ok(_) => {}
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        result
    };

    // Saved even when the model fails so the session can be retried
    store.save(&bot).await?;
    result?;

    let output = output.ok_or_else(|| anyhow!("Model response ended without a result"))?;
    println!("{}", render(&output));
    println!("Session ID: {}", bot.id());

    Ok(())
}
