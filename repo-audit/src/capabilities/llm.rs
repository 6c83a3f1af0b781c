use std::borrow::Cow;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::{AnalysisRequest, RequestKind, TextAnalyzer};
use crate::config::AnalysisConfig;
use crate::stage::StageResult;

const SYSTEM_PROMPT: &str = "You are an expert AI code reviewer.";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Longest prefix of `s` holding at most `max_chars` characters.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// At most `max_chars` characters of `s`, dropping from the middle so both
/// the opening instructions and the closing sections survive.
pub fn elide_middle(s: &str, max_chars: usize) -> Cow<'_, str> {
    let total = s.chars().count();
    if total <= max_chars {
        return Cow::Borrowed(s);
    }
    let head = max_chars / 2;
    let tail = max_chars - head;
    let tail_start = s
        .char_indices()
        .nth(total - tail)
        .map_or(s.len(), |(idx, _)| idx);
    Cow::Owned(format!("{}{}", truncate_chars(s, head), &s[tail_start..]))
}

pub fn review_prompt(label: &str, content: &str) -> String {
    format!(
        "Analyze the following file: `{label}`.\n\
         Your task:\n\
         - Identify bugs, code smells, security vulnerabilities\n\
         - Suggest improvements or refactorings\n\
         - Mention anything the code does well\n\
         - Respond clearly for a human reader\n\
         \n\
         Code:\n\
         {label}\n\
         {content}\n"
    )
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct ChatCompletionsAnalyzer {
    client: reqwest::Client,
    config: AnalysisConfig,
}

impl ChatCompletionsAnalyzer {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("repo-audit/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, config })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'))
    }

    fn build_prompt(&self, request: &AnalysisRequest<'_>) -> String {
        match request.kind {
            RequestKind::File => review_prompt(
                request.label,
                truncate_chars(request.content, self.config.max_file_chars),
            ),
            RequestKind::Synthesis => {
                elide_middle(request.content, self.config.max_synthesis_chars).into_owned()
            }
        }
    }

    async fn complete(&self, api_key: &str, prompt: &str) -> Result<String> {
        let url = self.completions_url();
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!("{url} returned HTTP {status}: {}", detail.trim());
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .with_context(|| format!("failed to parse JSON from {url}"))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .context("completion response contained no message")
    }
}

#[async_trait]
impl TextAnalyzer for ChatCompletionsAnalyzer {
    #[instrument(skip(self, request), fields(label = request.label, kind = ?request.kind))]
    async fn analyze_text(&self, request: AnalysisRequest<'_>) -> Result<StageResult<String>> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return Ok(StageResult::Failure(
                "LLM error: no API key configured".to_string(),
            ));
        };

        let prompt = self.build_prompt(&request);
        match self.complete(api_key, &prompt).await {
            Ok(text) => {
                debug!(chars = text.len(), "analysis received");
                Ok(StageResult::Success(text))
            }
            Err(e) => {
                warn!(error = %e, "analysis request failed");
                Ok(StageResult::Failure(format!("LLM error: {e:#}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> AnalysisConfig {
        AnalysisConfig {
            api_key: Some("test-key".into()),
            api_base: server.uri(),
            model: "test-model".into(),
            ..AnalysisConfig::default()
        }
    }

    fn file_request<'a>(content: &'a str, label: &'a str) -> AnalysisRequest<'a> {
        AnalysisRequest {
            content,
            label,
            kind: RequestKind::File,
        }
    }

    fn completion(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": text } }]
        }))
    }

    #[test]
    fn truncate_counts_characters_not_bytes() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn elide_middle_keeps_both_ends() {
        assert_eq!(elide_middle("abcdef", 10), "abcdef");
        assert_eq!(elide_middle("abcdefghij", 4), "abij");
        assert_eq!(elide_middle("héllo wörld", 5), "hérld");
        assert_eq!(elide_middle("abc", 0), "");
    }

    #[test]
    fn review_prompt_names_the_file() {
        let prompt = review_prompt("src/app.py", "print(1)");
        assert!(prompt.contains("Analyze the following file: `src/app.py`."));
        assert!(prompt.ends_with("src/app.py\nprint(1)\n"));
    }

    #[tokio::test]
    async fn missing_api_key_fails_without_network() {
        let analyzer = ChatCompletionsAnalyzer::new(AnalysisConfig::default()).unwrap();

        let result = analyzer.analyze_text(file_request("x", "a.py")).await.unwrap();
        assert_eq!(
            result,
            StageResult::Failure("LLM error: no API key configured".into())
        );
    }

    #[tokio::test]
    async fn returns_trimmed_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(completion("  Looks fine.  \n"))
            .expect(1)
            .mount(&server)
            .await;

        let analyzer = ChatCompletionsAnalyzer::new(config_for(&server)).unwrap();
        let result = analyzer
            .analyze_text(file_request("print(1)", "app.py"))
            .await
            .unwrap();

        assert_eq!(result, StageResult::Success("Looks fine.".into()));
    }

    #[tokio::test]
    async fn file_content_is_truncated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(completion("ok"))
            .mount(&server)
            .await;

        let analyzer = ChatCompletionsAnalyzer::new(config_for(&server)).unwrap();
        let content = "x".repeat(5000);
        analyzer
            .analyze_text(file_request(&content, "big.js"))
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["model"], "test-model");
        let user = body["messages"][1]["content"].as_str().unwrap();
        assert_eq!(user.matches('x').count(), 3000);
    }

    #[tokio::test]
    async fn synthesis_is_sent_without_review_template() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(completion("summary"))
            .mount(&server)
            .await;

        let analyzer = ChatCompletionsAnalyzer::new(config_for(&server)).unwrap();
        let result = analyzer
            .analyze_text(AnalysisRequest {
                content: "Summarize this report",
                label: "Final Report Synthesis",
                kind: RequestKind::Synthesis,
            })
            .await
            .unwrap();
        assert_eq!(result, StageResult::Success("summary".into()));

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["messages"][1]["content"], "Summarize this report");
    }

    #[tokio::test]
    async fn long_synthesis_keeps_the_report_tail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(completion("summary"))
            .mount(&server)
            .await;

        let mut config = config_for(&server);
        config.max_synthesis_chars = 100;
        let analyzer = ChatCompletionsAnalyzer::new(config).unwrap();

        let report = format!(
            "Based on the following report{}Test Results:\n1 failed",
            "File: a.py\n".repeat(50)
        );
        analyzer
            .analyze_text(AnalysisRequest {
                content: &report,
                label: "Final Report Synthesis",
                kind: RequestKind::Synthesis,
            })
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let user = body["messages"][1]["content"].as_str().unwrap();
        assert_eq!(user.chars().count(), 100);
        assert!(user.starts_with("Based on the following report"));
        assert!(user.ends_with("Test Results:\n1 failed"));
    }

    #[tokio::test]
    async fn http_error_is_a_declared_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let analyzer = ChatCompletionsAnalyzer::new(config_for(&server)).unwrap();
        let result = analyzer.analyze_text(file_request("x", "a.py")).await.unwrap();

        match result {
            StageResult::Failure(msg) => {
                assert!(msg.starts_with("LLM error:"));
                assert!(msg.contains("429"));
                assert!(msg.contains("quota exceeded"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_choices_is_a_declared_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let analyzer = ChatCompletionsAnalyzer::new(config_for(&server)).unwrap();
        let result = analyzer.analyze_text(file_request("x", "a.py")).await.unwrap();
        assert!(!result.is_success());
    }

    #[tokio::test]
    async fn trailing_slash_in_api_base_is_tolerated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(completion("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = config_for(&server);
        config.api_base.push('/');
        let analyzer = ChatCompletionsAnalyzer::new(config).unwrap();
        let result = analyzer.analyze_text(file_request("x", "a.py")).await.unwrap();
        assert!(result.is_success());
    }
}
