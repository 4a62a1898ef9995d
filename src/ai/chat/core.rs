use anyhow::{Error, Result, bail};
use futures::stream::BoxStream;
use futures_util::StreamExt;
use uuid::Uuid;

use super::models::{Transcript, Turn};
use crate::ai::structured::{
    OutputSchema, StreamChunk, StreamMode, StructuredOutput, structured_stream,
};
use crate::openai::{Role, StructuredCompletion};

/// A conversation with an LLM that always answers in a fixed
/// structured format.
///
/// The transcript is append-only. Each call to `request` adds the
/// user's turn and, once the model has produced a complete response,
/// the assistant's turn. Persisting the session is left to the caller
/// (see `TranscriptStore`).
///
/// Use `Session::new` or `Session::builder()` to construct a `Session`.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    model: String,
    output_schema: OutputSchema,
    transcript: Transcript,
}

impl Session {
    pub fn new(model: &str, output_schema: OutputSchema) -> Self {
        SessionBuilder::new(model, output_schema).build()
    }

    pub fn builder(model: &str, output_schema: OutputSchema) -> SessionBuilder {
        SessionBuilder::new(model, output_schema)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn output_schema(&self) -> OutputSchema {
        self.output_schema
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn append(&mut self, role: Role, content: &str) {
        self.transcript.push(Turn::new(role, content));
    }

    /// Runs the next turn of the conversation and streams the response
    /// back as it is generated.
    ///
    /// Nothing happens until the stream is polled. The user's turn is
    /// added on the first poll and the assistant's turn right before
    /// the `Done` chunk is yielded. If the model fails the stream ends
    /// with the error and the user's turn stays in the transcript
    /// without a reply.
    ///
    /// Dropping the stream early abandons the model request.
    pub fn request<'a>(
        &'a mut self,
        client: &'a dyn StructuredCompletion,
        user_message: &str,
        mode: StreamMode,
    ) -> BoxStream<'a, Result<StreamChunk, Error>> {
        let user_message = user_message.to_string();

        Box::pin(async_stream::try_stream! {
            self.append(Role::User, &user_message);

            let upstream = client.completion_stream(
                &self.model,
                self.transcript.messages(),
                self.output_schema.response_format(),
            );
            let mut chunks = structured_stream(upstream, self.output_schema, mode);

            while let Some(chunk) = chunks.next().await {
                let chunk = chunk.inspect_err(|e| {
                    tracing::error!("Session {} request failed: {}", self.id, e)
                })?;
                if let StreamChunk::Done(output) = &chunk {
                    let content = serde_json::to_string(output)?;
                    self.append(Role::Assistant, &content);
                }
                yield chunk;
            }
        })
    }

    /// Runs the next turn without streaming and returns the final
    /// response.
    pub async fn reply(
        &mut self,
        client: &dyn StructuredCompletion,
        user_message: &str,
    ) -> Result<StructuredOutput, Error> {
        let mut stream = self.request(client, user_message, StreamMode::Delta);
        while let Some(chunk) = stream.next().await {
            if let StreamChunk::Done(output) = chunk? {
                return Ok(output);
            }
        }
        bail!("Model response ended without a result")
    }

    /// Turns visible to the user. Skips the first `reserved` turns and
    /// every system turn.
    pub fn history(&self, reserved: usize) -> Vec<Turn> {
        self.transcript
            .iter()
            .skip(reserved)
            .filter(|t| t.role != Role::System)
            .cloned()
            .collect()
    }
}

pub struct SessionBuilder {
    id: Option<String>,
    model: String,
    output_schema: OutputSchema,
    transcript: Transcript,
}

impl SessionBuilder {
    pub fn new(model: &str, output_schema: OutputSchema) -> Self {
        Self {
            id: None,
            model: model.to_string(),
            output_schema,
            transcript: Transcript::new(),
        }
    }

    /// Use an existing session ID instead of minting a new one.
    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn transcript(mut self, turns: Vec<Turn>) -> Self {
        self.transcript = Transcript::new_with_turns(turns);
        self
    }

    pub fn build(self) -> Session {
        Session {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            model: self.model,
            output_schema: self.output_schema,
            transcript: self.transcript,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::openai::Message;
    use anyhow::anyhow;
    use serde_json::Value;

    /// Model that plays back canned fragments, one script per request,
    /// and records the messages it was sent.
    #[derive(Default)]
    pub(crate) struct ScriptedModel {
        scripts: Mutex<VecDeque<Vec<Result<String, String>>>>,
        requests: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedModel {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn reply(self, fragments: &[&str]) -> Self {
            let script = fragments.iter().map(|f| Ok(f.to_string())).collect();
            self.scripts.lock().unwrap().push_back(script);
            self
        }

        pub(crate) fn fail_after(self, fragments: &[&str], error: &str) -> Self {
            let mut script: Vec<Result<String, String>> =
                fragments.iter().map(|f| Ok(f.to_string())).collect();
            script.push(Err(error.to_string()));
            self.scripts.lock().unwrap().push_back(script);
            self
        }

        pub(crate) fn requests(&self) -> Vec<Vec<Message>> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl StructuredCompletion for ScriptedModel {
        fn completion_stream(
            &self,
            _model: &str,
            messages: Vec<Message>,
            _response_format: Value,
        ) -> BoxStream<'static, Result<String, Error>> {
            self.requests.lock().unwrap().push(messages);
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| vec![Err("No scripted reply".to_string())]);
            Box::pin(futures::stream::iter(
                script.into_iter().map(|r| r.map_err(|e| anyhow!(e))),
            ))
        }
    }

    async fn drain(
        session: &mut Session,
        client: &dyn StructuredCompletion,
        msg: &str,
    ) -> Vec<Result<StreamChunk, Error>> {
        session.request(client, msg, StreamMode::Delta).collect().await
    }

    #[test]
    fn test_new_mints_unique_ids() {
        let a = Session::new("gpt-4o-mini", OutputSchema::Conversational);
        let b = Session::new("gpt-4o-mini", OutputSchema::Conversational);
        assert_ne!(a.id, b.id);
        assert!(Uuid::parse_str(&a.id).is_ok());
        assert!(a.transcript().is_empty());
        assert_eq!(a.model(), "gpt-4o-mini");
    }

    #[test]
    fn test_builder_with_existing_id_and_transcript() {
        let session = Session::builder("gpt-4o-mini", OutputSchema::Recipe)
            .id("existing-session-id")
            .transcript(vec![Turn::new(Role::User, "Hi")])
            .build();
        assert_eq!(session.id, "existing-session-id");
        assert_eq!(session.output_schema(), OutputSchema::Recipe);
        assert_eq!(session.transcript().len(), 1);
    }

    #[tokio::test]
    async fn test_request_appends_user_and_assistant_turns() {
        let model = ScriptedModel::new().reply(&[r#"{"respo"#, r#"nse": "Hi"#, r#"!"}"#]);
        let mut session = Session::new("gpt-4o-mini", OutputSchema::Conversational);

        let chunks = drain(&mut session, &model, "Hello").await;
        assert!(matches!(chunks.last(), Some(Ok(StreamChunk::Done(_)))));

        assert_eq!(
            session.transcript().turns(),
            &[
                Turn::new(Role::User, "Hello"),
                Turn::new(Role::Assistant, r#"{"response":"Hi!"}"#),
            ]
        );
    }

    #[tokio::test]
    async fn test_request_is_lazy() {
        let model = ScriptedModel::new().reply(&[r#"{"response": "Hi!"}"#]);
        let mut session = Session::new("gpt-4o-mini", OutputSchema::Conversational);

        let stream = session.request(&model, "Hello", StreamMode::Delta);
        drop(stream);

        assert!(session.transcript().is_empty());
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn test_model_error_keeps_user_turn_only() {
        let model = ScriptedModel::new().fail_after(&[r#"{"response": "#], "upstream closed");
        let mut session = Session::new("gpt-4o-mini", OutputSchema::Conversational);

        let chunks = drain(&mut session, &model, "Hello").await;
        let last = chunks.last().unwrap();
        assert_eq!(last.as_ref().unwrap_err().to_string(), "upstream closed");
        assert!(!chunks.iter().any(|c| matches!(c, Ok(StreamChunk::Done(_)))));

        assert_eq!(
            session.transcript().turns(),
            &[Turn::new(Role::User, "Hello")]
        );
    }

    #[tokio::test]
    async fn test_model_sees_full_transcript() {
        let model = ScriptedModel::new()
            .reply(&[r#"{"response": "Hi!"}"#])
            .reply(&[r#"{"response": "Bye!"}"#]);
        let mut session = Session::new("gpt-4o-mini", OutputSchema::Conversational);
        session.append(Role::System, "Be brief");

        drain(&mut session, &model, "Hello").await;
        drain(&mut session, &model, "Goodbye").await;

        let requests = model.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].len(), 2);
        assert_eq!(
            requests[1],
            vec![
                Message::new(Role::System, "Be brief"),
                Message::new(Role::User, "Hello"),
                Message::new(Role::Assistant, r#"{"response":"Hi!"}"#),
                Message::new(Role::User, "Goodbye"),
            ]
        );
        assert_eq!(session.transcript().len(), 5);
    }

    #[tokio::test]
    async fn test_reply_returns_final_output() {
        let model = ScriptedModel::new().reply(&["{", r#""response": "Hi!"}"#]);
        let mut session = Session::new("gpt-4o-mini", OutputSchema::Conversational);

        let output = session.reply(&model, "Hello").await.unwrap();
        assert_eq!(output.to_value(), serde_json::json!({"response": "Hi!"}));
    }

    #[test]
    fn test_history_skips_reserved_and_system_turns() {
        let session = Session::builder("gpt-4o-mini", OutputSchema::Recipe)
            .transcript(vec![
                Turn::new(Role::System, "Instructions"),
                Turn::new(Role::User, "Extract this page"),
                Turn::new(Role::Assistant, "{}"),
                Turn::new(Role::System, "Reminder"),
                Turn::new(Role::User, "Double it"),
            ])
            .build();

        assert_eq!(
            session.history(2),
            vec![
                Turn::new(Role::Assistant, "{}"),
                Turn::new(Role::User, "Double it"),
            ]
        );
        assert_eq!(session.history(0).len(), 3);
        assert!(session.history(10).is_empty());
    }
}
