use async_trait::async_trait;
use eyre::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};
use url::Url;

use crate::cli::chat::conversation_state::{ConversationState, Role, Turn};
use crate::config::ChatConfig;

/// Shown when the first candidate carries no text.
pub const NO_TEXT_FALLBACK: &str = "I'm just sitting here for a minute.";
/// Shown when the response has no candidates at all.
pub const NO_CANDIDATES_FALLBACK: &str = "I'm drawing a blank right now.";
/// Shown for everything else: HTTP errors, network failures, undecodable bodies.
pub const FAILURE_FALLBACK: &str = "Something's off. Give me a moment.";

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("API request failed with status {status}")]
    Status { status: u16, body: String },
    /// Built only through `request_error`, which drops the keyed URL.
    #[error("request to the generation endpoint failed: {0}")]
    Request(reqwest::Error),
    #[error("could not decode the response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("response contained no candidates")]
    NoCandidates,
    #[error("first candidate contained no text")]
    EmptyText,
}

impl GeminiError {
    /// The request URL carries the API key, so it never reaches an error message.
    fn request_error(err: reqwest::Error) -> Self {
        GeminiError::Request(err.without_url())
    }

    /// The in-character text the user sees instead of a reply.
    pub fn fallback_text(&self) -> &'static str {
        match self {
            GeminiError::NoCandidates => NO_CANDIDATES_FALLBACK,
            GeminiError::EmptyText => NO_TEXT_FALLBACK,
            GeminiError::Status { .. } | GeminiError::Request(_) | GeminiError::Decode(_) => {
                FAILURE_FALLBACK
            }
        }
    }
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: Role,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

impl<'a> GenerateContentRequest<'a> {
    fn from_turns(turns: &'a [Turn]) -> Self {
        let contents = turns
            .iter()
            .map(|turn| RequestContent {
                role: turn.role(),
                parts: vec![RequestPart { text: turn.text() }],
            })
            .collect();
        Self { contents }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    fn first_text(self) -> Result<String, GeminiError> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            warn!(
                prompt_feedback = ?self.prompt_feedback,
                "Response contained no candidates"
            );
            return Err(GeminiError::NoCandidates);
        };

        let text = candidate
            .content
            .and_then(|content| content.parts.into_iter().next())
            .and_then(|part| part.text)
            .filter(|text| !text.is_empty());

        match text {
            Some(text) => Ok(text),
            None => {
                debug!(finish_reason = ?candidate.finish_reason, "First candidate had no text");
                Err(GeminiError::EmptyText)
            }
        }
    }
}

/// Something that can turn a conversation into the model's next reply.
#[async_trait]
pub trait ReplyFetcher: Send + Sync {
    async fn generate_content(&self, turns: &[Turn]) -> Result<String, GeminiError>;
}

pub struct GeminiClient {
    endpoint: Url,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            endpoint: config.endpoint(),
            client,
        })
    }

    async fn read_error_body(response: reqwest::Response) -> String {
        let raw = match response.text().await {
            Ok(raw) => raw,
            Err(e) => return format!("<unreadable body: {}>", e.without_url()),
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(json) => serde_json::to_string_pretty(&json).unwrap_or(raw),
            Err(_) => raw,
        }
    }
}

#[async_trait]
impl ReplyFetcher for GeminiClient {
    async fn generate_content(&self, turns: &[Turn]) -> Result<String, GeminiError> {
        let request_body = GenerateContentRequest::from_turns(turns);

        let payload = serde_json::to_string_pretty(&request_body)?;
        debug!(turns = turns.len(), "Sending request to Gemini API: {}", payload);

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request_body)
            .send()
            .await
            .map_err(GeminiError::request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = Self::read_error_body(response).await;
            error!(
                status = status.as_u16(),
                status_text = status.canonical_reason().unwrap_or(""),
                "API request failed with response: {}",
                body
            );
            return Err(GeminiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(GeminiError::request_error)?;
        debug!("Received response from Gemini API: {}", body);

        let parsed: GenerateContentResponse = serde_json::from_str(&body)?;
        parsed.first_text()
    }
}

/// Asks `fetcher` for the next reply and records it in `state`.
///
/// Never fails: every error is logged and turned into fallback text, and
/// nothing is appended to the history in that case.
pub async fn fetch_reply(fetcher: &dyn ReplyFetcher, state: &mut ConversationState) -> String {
    debug_assert!(!state.is_empty(), "history lost its seed turns");
    let result = fetcher.generate_content(state.snapshot()).await;
    match result {
        Ok(text) => {
            if let Err(e) = state.add_model_message(&text) {
                warn!("Discarding reply: {}", e);
                return NO_TEXT_FALLBACK.to_string();
            }
            text
        }
        Err(err @ (GeminiError::NoCandidates | GeminiError::EmptyText)) => {
            warn!("Using fallback reply: {}", err);
            err.fallback_text().to_string()
        }
        Err(err) => {
            error!("Failed to get a reply: {}", err);
            err.fallback_text().to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Mock, Server, ServerGuard};
    use serde_json::json;

    use super::*;

    const PATH: &str = r"^/v1beta/models/test-model:generateContent";

    fn client_for(base_url: &str) -> GeminiClient {
        let config =
            ChatConfig::from_parts(Some("test-key".to_string()), "test-model", base_url, 5).unwrap();
        GeminiClient::new(&config).unwrap()
    }

    async fn mock_reply(server: &mut ServerGuard, status: usize, body: &str) -> Mock {
        server
            .mock("POST", Matcher::Regex(PATH.to_string()))
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await
    }

    fn seeded_state() -> ConversationState {
        let mut state = ConversationState::with_seed("be chill", "yo");
        state.add_user_message("what's up").unwrap();
        state
    }

    #[tokio::test]
    async fn sends_full_history_in_order() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Regex(PATH.to_string()))
            .match_query(Matcher::UrlEncoded("key".to_string(), "test-key".to_string()))
            .match_body(Matcher::Json(json!({
                "contents": [
                    { "role": "user", "parts": [{ "text": "be chill" }] },
                    { "role": "model", "parts": [{ "text": "yo" }] },
                    { "role": "user", "parts": [{ "text": "what's up" }] }
                ]
            })))
            .with_status(200)
            .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"Not much."}]}}]}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let mut state = seeded_state();
        let reply = fetch_reply(&client, &mut state).await;

        mock.assert_async().await;
        assert_eq!(reply, "Not much.");
    }

    #[tokio::test]
    async fn successful_reply_is_appended() {
        let mut server = Server::new_async().await;
        let mock = mock_reply(
            &mut server,
            200,
            r#"{"candidates":[{"content":{"parts":[{"text":"Hey."}],"role":"model"},"finishReason":"STOP"}]}"#,
        )
        .await;

        let client = client_for(&server.url());
        let mut state = seeded_state();
        let reply = fetch_reply(&client, &mut state).await;

        mock.assert_async().await;
        assert_eq!(reply, "Hey.");
        assert_eq!(state.len(), 4);
        assert_eq!(state.snapshot()[3], Turn::model("Hey."));
    }

    #[tokio::test]
    async fn only_first_part_of_first_candidate_is_used() {
        let mut server = Server::new_async().await;
        let _mock = mock_reply(
            &mut server,
            200,
            r#"{"candidates":[
                {"content":{"parts":[{"text":"first"},{"text":"second"}]}},
                {"content":{"parts":[{"text":"other candidate"}]}}
            ]}"#,
        )
        .await;

        let client = client_for(&server.url());
        let mut state = seeded_state();

        assert_eq!(fetch_reply(&client, &mut state).await, "first");
    }

    #[tokio::test]
    async fn server_error_returns_failure_fallback() {
        let mut server = Server::new_async().await;
        let mock = mock_reply(
            &mut server,
            500,
            r#"{"error":{"code":500,"message":"Internal error","status":"INTERNAL"}}"#,
        )
        .await;

        let client = client_for(&server.url());
        let mut state = seeded_state();
        let reply = fetch_reply(&client, &mut state).await;

        mock.assert_async().await;
        assert_eq!(reply, FAILURE_FALLBACK);
        assert_eq!(state.len(), 3);
    }

    #[tokio::test]
    async fn status_error_keeps_raw_body_when_not_json() {
        let mut server = Server::new_async().await;
        let _mock = mock_reply(&mut server, 503, "upstream unavailable").await;

        let client = client_for(&server.url());
        let state = seeded_state();
        let err = client.generate_content(state.snapshot()).await.unwrap_err();

        match err {
            GeminiError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "upstream unavailable");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_candidates_returns_blank_fallback() {
        let mut server = Server::new_async().await;
        let _mock = mock_reply(&mut server, 200, r#"{"candidates":[]}"#).await;

        let client = client_for(&server.url());
        let mut state = seeded_state();
        let reply = fetch_reply(&client, &mut state).await;

        assert_eq!(reply, NO_CANDIDATES_FALLBACK);
        assert_eq!(state.len(), 3);
    }

    #[tokio::test]
    async fn missing_candidates_field_counts_as_none() {
        let mut server = Server::new_async().await;
        let _mock = mock_reply(
            &mut server,
            200,
            r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#,
        )
        .await;

        let client = client_for(&server.url());
        let mut state = seeded_state();

        assert_eq!(fetch_reply(&client, &mut state).await, NO_CANDIDATES_FALLBACK);
        assert_eq!(state.len(), 3);
    }

    #[tokio::test]
    async fn missing_text_returns_sitting_fallback() {
        let mut server = Server::new_async().await;
        let _mock = mock_reply(
            &mut server,
            200,
            r#"{"candidates":[{"content":{"parts":[{}]},"finishReason":"SAFETY"}]}"#,
        )
        .await;

        let client = client_for(&server.url());
        let mut state = seeded_state();
        let reply = fetch_reply(&client, &mut state).await;

        assert_eq!(reply, NO_TEXT_FALLBACK);
        assert_eq!(state.len(), 3);
    }

    #[tokio::test]
    async fn empty_text_returns_sitting_fallback() {
        let mut server = Server::new_async().await;
        let _mock = mock_reply(
            &mut server,
            200,
            r#"{"candidates":[{"content":{"parts":[{"text":""}]}}]}"#,
        )
        .await;

        let client = client_for(&server.url());
        let mut state = seeded_state();

        assert_eq!(fetch_reply(&client, &mut state).await, NO_TEXT_FALLBACK);
        assert_eq!(state.len(), 3);
    }

    #[tokio::test]
    async fn undecodable_body_returns_failure_fallback() {
        let mut server = Server::new_async().await;
        let _mock = mock_reply(&mut server, 200, "<html>oops</html>").await;

        let client = client_for(&server.url());
        let mut state = seeded_state();

        assert_eq!(fetch_reply(&client, &mut state).await, FAILURE_FALLBACK);
        assert_eq!(state.len(), 3);
    }

    #[tokio::test]
    async fn connection_failure_returns_failure_fallback() {
        let client = client_for("http://127.0.0.1:1");
        let mut state = seeded_state();

        assert_eq!(fetch_reply(&client, &mut state).await, FAILURE_FALLBACK);
        assert_eq!(state.len(), 3);
    }

    #[tokio::test]
    async fn request_errors_do_not_reveal_the_api_key() {
        let config =
            ChatConfig::from_parts(Some("SUPERSECRET".to_string()), "m", "http://127.0.0.1:1", 5).unwrap();
        let client = GeminiClient::new(&config).unwrap();
        let state = seeded_state();

        let err = client.generate_content(state.snapshot()).await.unwrap_err();

        assert!(matches!(err, GeminiError::Request(_)));
        assert!(!err.to_string().contains("SUPERSECRET"));
        assert!(!format!("{err:?}").contains("SUPERSECRET"));
    }

    #[tokio::test]
    async fn status_error_message_leaves_body_to_the_log() {
        let mut server = Server::new_async().await;
        let _mock = mock_reply(&mut server, 400, r#"{"error":{"message":"bad things"}}"#).await;

        let client = client_for(&server.url());
        let state = seeded_state();
        let err = client.generate_content(state.snapshot()).await.unwrap_err();

        assert_eq!(err.to_string(), "API request failed with status 400");
        match err {
            GeminiError::Status { body, .. } => assert!(body.contains("bad things")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn fallback_text_per_error_kind() {
        assert_eq!(GeminiError::NoCandidates.fallback_text(), NO_CANDIDATES_FALLBACK);
        assert_eq!(GeminiError::EmptyText.fallback_text(), NO_TEXT_FALLBACK);
        assert_eq!(
            GeminiError::Status {
                status: 429,
                body: String::new()
            }
            .fallback_text(),
            FAILURE_FALLBACK
        );
        let decode = serde_json::from_str::<Value>("{").unwrap_err();
        assert_eq!(GeminiError::from(decode).fallback_text(), FAILURE_FALLBACK);
    }
}
