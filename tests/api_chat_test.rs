//! Integration tests for the chat API endpoints

mod test_utils;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use futures::StreamExt;
    use serde_json::{Value, json};
    use serial_test::serial;
    use tower::util::ServiceExt;

    use recipebot::ai::chat::db::SessionRecordV1;
    use recipebot::ai::chat::{Persist, SessionRecord, Turn};
    use recipebot::ai::recipe::{PageSource, RecipeBot};
    use recipebot::ai::structured::OutputSchema;
    use recipebot::api::public::chat::ChatHistoryResponse;
    use recipebot::openai::Role;

    use crate::test_utils::{
        PANCAKES_RESPONSE, TestApp, body_to_string, completion_sse, stalled_sse_server, test_app,
    };

    const SESSION_ID: &str = "3f1c2f9e-8d7a-4b8e-9c55-2f0e6f1a7b10";

    const ANNOTATED_RESPONSE: &str = r#"{"type": "RecipeResponse", "response": {"name": "Pancakes", "prep_time": "10 minutes", "cook_time": "15 minutes", "recipe_yield": "4 servings", "ingredients": [{"quantity": "2 cups", "name": "flour", "id": "$I1", "section": "", "annotations": ""}, {"quantity": "2", "name": "large eggs", "id": "$I2", "section": "", "annotations": "Use 1/2 cup applesauce instead."}, {"quantity": "1 1/2 cups", "name": "milk", "id": "$I3", "section": "", "annotations": ""}], "instructions": [{"id": "$S1", "text": "Whisk everything together.", "annotations": ""}, {"id": "$S2", "text": "Cook on a hot griddle.", "annotations": ""}], "additional_info": ""}}"#;

    /// Saves a session that already went through extraction
    async fn seed_session(app: &TestApp) {
        let record = SessionRecord::V1(SessionRecordV1 {
            id: SESSION_ID.to_string(),
            output_schema: OutputSchema::Recipe,
            model: "gpt-4o-mini".to_string(),
            transcript: vec![
                Turn::new(Role::System, "You are an AI assistant..."),
                Turn::new(Role::User, "Extract the recipe JSON from the following webpage text..."),
                Turn::new(Role::Assistant, PANCAKES_RESPONSE),
            ],
            source: Some(PageSource {
                url: "https://example.com/pancakes".to_string(),
                text: "# Pancakes".to_string(),
            }),
        });
        let bot = RecipeBot::from_record(record).unwrap();
        app.store.save(&bot).await.unwrap();
    }

    fn chat_request(session_id: &str, payload: Value) -> Request<Body> {
        Request::builder()
            .uri(format!("/api/chat/{}", session_id))
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap()
    }

    /// Follow-up edits come back as a recipe with the same ids
    #[tokio::test]
    #[serial]
    async fn it_continues_a_session() {
        let mut server = mockito::Server::new_async().await;
        let model = server
            .mock("POST", "/v1/chat/completions")
            .match_body(mockito::Matcher::Regex("out of eggs".to_string()))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(completion_sse(ANNOTATED_RESPONSE, 11))
            .expect(1)
            .create_async()
            .await;
        let app = test_app(&server.url()).await;
        seed_session(&app).await;

        let response = app
            .router
            .clone()
            .oneshot(chat_request(
                SESSION_ID,
                json!({"message": "I'm out of eggs, what can I use?"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_to_string(response.into_body()).await;
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body[0]["session_id"], SESSION_ID);
        assert_eq!(
            body[1]["response"]["ingredients"][1]["annotations"],
            "Use 1/2 cup applesauce instead."
        );

        let bot = app.wait_for_session(SESSION_ID, 5).await;
        let first: Value = serde_json::from_str(PANCAKES_RESPONSE).unwrap();
        let latest = bot.latest_recipe().unwrap();
        let first_ids: Vec<&str> = first["response"]["ingredients"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["id"].as_str().unwrap())
            .collect();
        assert_eq!(latest.ingredient_ids(), first_ids);
        // Page isn't fetched again for follow-ups
        assert_eq!(bot.source().unwrap().text, "# Pancakes");

        model.assert_async().await;
    }

    /// Hanging up mid-response stops the model request and the session
    /// is saved with the question but no answer
    #[tokio::test]
    #[serial]
    async fn it_saves_the_session_when_the_client_disconnects() {
        let (llm_host, upstream_closed) =
            stalled_sse_server(r#"{"type": "ConversationalResponse", "response": "Let me think"#).await;
        let app = test_app(&llm_host).await;
        seed_session(&app).await;

        let response = app
            .router
            .clone()
            .oneshot(chat_request(
                SESSION_ID,
                json!({"message": "How long do these keep?"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut body = response.into_body().into_data_stream();
        let mut received = String::new();
        while !received.contains("Let me think") {
            let frame = body.next().await.unwrap().unwrap();
            received.push_str(std::str::from_utf8(&frame).unwrap());
        }
        assert!(received.starts_with('['));
        assert!(received.contains(SESSION_ID));
        drop(body);

        tokio::time::timeout(Duration::from_secs(5), upstream_closed)
            .await
            .expect("Model request was not closed")
            .unwrap();

        let bot = app.wait_for_session(SESSION_ID, 4).await;
        let turns = bot.session.transcript().turns();
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[3].role, Role::User);
        assert_eq!(turns[3].content, "How long do these keep?");
    }

    #[tokio::test]
    #[serial]
    async fn it_returns_history_without_the_preamble() {
        let app = test_app("http://localhost:1").await;
        seed_session(&app).await;

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/chat_history/{}", SESSION_ID))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_to_string(response.into_body()).await;
        let history: ChatHistoryResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(history.session_id, SESSION_ID);
        assert_eq!(history.history.len(), 1);
        assert_eq!(history.history[0].role, Role::Assistant);
        assert_eq!(history.history[0].content, PANCAKES_RESPONSE);
    }

    #[tokio::test]
    #[serial]
    async fn it_returns_not_found_for_unknown_sessions() {
        let mut server = mockito::Server::new_async().await;
        let model = server
            .mock("POST", "/v1/chat/completions")
            .expect(0)
            .create_async()
            .await;
        let app = test_app(&server.url()).await;

        let response = app
            .router
            .clone()
            .oneshot(chat_request("does-not-exist", json!({"message": "Hello"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/chat_history/does-not-exist")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        assert_eq!(app.session_count().await, 0);
        model.assert_async().await;
    }

    #[tokio::test]
    #[serial]
    async fn it_rejects_an_empty_message() {
        let app = test_app("http://localhost:1").await;
        seed_session(&app).await;

        let response = app
            .router
            .clone()
            .oneshot(chat_request(SESSION_ID, json!({"message": ""})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bot: RecipeBot = app.store.load(SESSION_ID).await.unwrap().unwrap();
        assert_eq!(bot.session.transcript().len(), 3);
    }

    #[tokio::test]
    #[serial]
    async fn it_returns_not_found_for_corrupt_sessions() {
        let app = test_app("http://localhost:1").await;
        app.db
            .call(|conn| {
                conn.execute(
                    "INSERT INTO session_record (id, data, updated_at) VALUES ('broken', '{\"version\": \"1\"', '')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let response = app
            .router
            .clone()
            .oneshot(chat_request("broken", json!({"message": "Hello"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_to_string(response.into_body()).await;
        assert!(body.contains("could not be restored"));
    }
}
