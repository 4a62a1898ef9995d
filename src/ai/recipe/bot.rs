use anyhow::{Error, Result, anyhow};
use futures::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::fetch::PageFetcher;
use super::models::RecipeResponse;
use crate::ai::chat::db::SessionRecordV1;
use crate::ai::chat::{Persist, Session, SessionRecord, StoreError, Turn};
use crate::ai::prompt::{Prompt, templates};
use crate::ai::structured::{OutputSchema, StreamChunk, StreamMode};
use crate::openai::{Role, StructuredCompletion};

/// The assistant instruction and the first extraction request are
/// plumbing, not part of the conversation the user sees.
const RESERVED_TURNS: usize = 2;

/// The page a recipe was extracted from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSource {
    pub url: String,
    pub text: String,
}

/// A session that extracts a recipe from a web page and then answers
/// follow-up questions about it, editing the recipe when asked.
#[derive(Debug, Clone)]
pub struct RecipeBot {
    pub session: Session,
    source: Option<PageSource>,
}

impl RecipeBot {
    pub fn new(model: &str) -> Self {
        Self {
            session: Session::new(model, OutputSchema::Recipe),
            source: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.session.id
    }

    pub fn source(&self) -> Option<&PageSource> {
        self.source.as_ref()
    }

    /// Fetches the page unless it's the one that was fetched last.
    pub async fn load_source(
        &mut self,
        fetcher: &dyn PageFetcher,
        url: &str,
    ) -> Result<&PageSource, Error> {
        let cached = matches!(&self.source, Some(source) if source.url == url);
        if !cached {
            let text = fetcher.fetch_text(url).await?;
            self.source = Some(PageSource {
                url: url.to_string(),
                text,
            });
        } else {
            tracing::debug!("Reusing fetched page for {}", url);
        }
        self.source
            .as_ref()
            .ok_or_else(|| anyhow!("No page loaded for {}", url))
    }

    /// Extracts the recipe on the page at `url`, streaming the result.
    ///
    /// `annotations` is a free text request for what to put in the
    /// annotation fields of the recipe, e.g. metric conversions.
    pub async fn extract<'a>(
        &'a mut self,
        client: &'a dyn StructuredCompletion,
        fetcher: &dyn PageFetcher,
        url: &str,
        annotations: &str,
        mode: StreamMode,
    ) -> Result<BoxStream<'a, Result<StreamChunk, Error>>, Error> {
        let page_text = self.load_source(fetcher, url).await?.text.clone();

        let templates = templates();
        if self.session.transcript().is_empty() {
            let instruction = templates.render(&Prompt::RecipeAssistant.to_string(), &json!({}))?;
            self.session.append(Role::System, &instruction);
        }
        let prompt = templates.render(
            &Prompt::ExtractRecipe.to_string(),
            &json!({"page_text": page_text, "annotations": annotations}),
        )?;

        let previous = self.latest_recipe();
        Ok(check_recipe_ids(
            self.session.request(client, &prompt, mode),
            previous,
        ))
    }

    /// Sends a follow-up message about the recipe.
    pub fn chat<'a>(
        &'a mut self,
        client: &'a dyn StructuredCompletion,
        message: &str,
        mode: StreamMode,
    ) -> BoxStream<'a, Result<StreamChunk, Error>> {
        let previous = self.latest_recipe();
        check_recipe_ids(self.session.request(client, message, mode), previous)
    }

    /// The most recent recipe the model returned, if any.
    pub fn latest_recipe(&self) -> Option<RecipeResponse> {
        self.session
            .transcript()
            .iter()
            .rev()
            .filter(|t| t.role == Role::Assistant)
            .filter_map(|t| OutputSchema::Recipe.parse(&t.content).ok())
            .find_map(|output| output.recipe().cloned())
    }

    pub fn history(&self) -> Vec<Turn> {
        self.session.history(RESERVED_TURNS)
    }
}

/// Logs a warning when a new recipe breaks the id scheme or doesn't
/// keep the ids of the recipe it revises. The recipe is still passed
/// along as-is.
fn check_recipe_ids<'a>(
    stream: BoxStream<'a, Result<StreamChunk, Error>>,
    previous: Option<RecipeResponse>,
) -> BoxStream<'a, Result<StreamChunk, Error>> {
    Box::pin(stream.inspect(move |chunk| {
        let Ok(StreamChunk::Done(output)) = chunk else {
            return;
        };
        let Some(recipe) = output.recipe() else {
            return;
        };
        if let Err(e) = recipe.validate_ids() {
            tracing::warn!("Recipe {} has invalid ids: {}", recipe.name, e);
        }
        if let Some(previous) = &previous
            && !recipe.is_revision_of(previous)
        {
            tracing::warn!("Recipe {} did not keep the ids of the previous version", recipe.name);
        }
    }))
}

impl Persist for RecipeBot {
    fn session_id(&self) -> &str {
        self.id()
    }

    fn to_record(&self) -> SessionRecord {
        let SessionRecord::V1(mut record) = self.session.to_record();
        record.source = self.source.clone();
        SessionRecord::V1(record)
    }

    fn from_record(record: SessionRecord) -> Result<Self, StoreError> {
        let SessionRecord::V1(SessionRecordV1 {
            id,
            output_schema,
            model,
            transcript,
            source,
        }) = record;
        if output_schema != OutputSchema::Recipe {
            return Err(StoreError::Incompatible {
                id,
                reason: format!("expected a recipe session, found {:?}", output_schema),
            });
        }
        let session = Session::builder(&model, output_schema)
            .id(&id)
            .transcript(transcript)
            .build();
        Ok(Self { session, source })
    }
}
