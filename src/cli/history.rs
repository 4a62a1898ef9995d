use anyhow::{Result, anyhow};

use super::render::render;
use crate::ai::recipe::RecipeBot;
use crate::ai::structured::OutputSchema;
use crate::core::AppConfig;
use crate::openai::Role;

pub async fn run(session_id: &str, config: &AppConfig) -> Result<()> {
    let store = super::open_store(&config.db_path).await?;
    let bot: RecipeBot = store
        .load(session_id)
        .await?
        .ok_or_else(|| anyhow!("Chat session {} not found", session_id))?;

    if let Some(source) = bot.source() {
        println!("Source: {}\n", source.url);
    }

    for turn in bot.history() {
        match turn.role {
            Role::User => println!(">>> {}\n", turn.content),
            _ => match OutputSchema::Recipe.parse(&turn.content) {
                Ok(output) => println!("{}\n", render(&output)),
                Err(_) => println!("{}\n", turn.content),
            },
        }
    }

    Ok(())
}
