use anyhow::{Result, anyhow};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use super::render::render;
use crate::ai::recipe::RecipeBot;
use crate::core::AppConfig;
use crate::openai::OpenAiClient;

pub async fn run(session_id: &str, config: &AppConfig) -> Result<()> {
    let store = super::open_store(&config.db_path).await?;
    let client = OpenAiClient::from_config(config);
    let mut bot: RecipeBot = store
        .load(session_id)
        .await?
        .ok_or_else(|| anyhow!("Chat session {} not found", session_id))?;

    if let Some(recipe) = bot.latest_recipe() {
        println!("Continuing session for {}", recipe.name);
    }

    let mut rl = DefaultEditor::new()?;

    loop {
        let readline = rl.readline(">>> ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                let result = bot.session.reply(&client, line).await;
                store.save(&bot).await?;
                match result {
                    Ok(output) => println!("{}", render(&output)),
                    Err(e) => println!("Error: {}", e),
                }
            }
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}
