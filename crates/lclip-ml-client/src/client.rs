//! Low-level Gemini HTTP plumbing shared by the capability modules.

use std::path::Path;
use std::time::Instant;

use reqwest::multipart;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{MlError, MlResult};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default model for every capability group.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Gemini API client. Stateless with respect to credentials: every call
/// takes the per-job API key as an argument.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: &'a [Part],
}

/// One part of a generation request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum Part {
    Text(String),
    InlineData {
        #[serde(rename = "mimeType")]
        mime_type: String,
        data: String,
    },
    FileData {
        #[serde(rename = "mimeType")]
        mime_type: String,
        #[serde(rename = "fileUri")]
        file_uri: String,
    },
}

impl Part {
    pub fn text(s: impl Into<String>) -> Self {
        Part::Text(s.into())
    }
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct FileUploadResponse {
    file: UploadedFile,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    uri: String,
    name: String,
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GeminiClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Override the API base URL (mock servers in tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Call the generation endpoint and return the first candidate's text.
    pub(crate) async fn generate(
        &self,
        model: &str,
        api_key: &str,
        parts: &[Part],
        json_response: bool,
    ) -> MlResult<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, model, api_key
        );

        let request = GenerateRequest {
            contents: vec![Content { parts }],
            generation_config: json_response.then(|| GenerationConfig {
                response_mime_type: "application/json".to_string(),
            }),
        };

        let started = Instant::now();
        let response = self.http.post(&url).json(&request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_failure(status, body));
        }

        let payload: GenerateResponse = response
            .json()
            .await
            .map_err(|e| MlError::invalid(format!("unparseable generation response: {}", e)))?;

        let text = payload
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .unwrap_or_default();

        if text.trim().is_empty() {
            // Empty responses happen under load and resolve on retry
            return Err(MlError::transient("empty model response"));
        }

        let elapsed = started.elapsed();
        info!(
            model,
            duration_ms = elapsed.as_millis() as u64,
            "Model call completed"
        );
        metrics::counter!("lclip_model_calls_total", "model" => model.to_string())
            .increment(1);
        metrics::histogram!("lclip_model_call_duration_seconds", "model" => model.to_string())
            .record(elapsed.as_secs_f64());

        Ok(text)
    }

    /// Upload a media file and return its `file_uri` for generation calls.
    pub(crate) async fn upload_file(
        &self,
        path: &Path,
        mime_type: &str,
        api_key: &str,
    ) -> MlResult<(String, String)> {
        let url = format!(
            "{}/upload/v1beta/files?uploadType=multipart&key={}",
            self.base_url, api_key
        );

        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());
        let metadata = serde_json::json!({ "file": { "display_name": display_name } });

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| MlError::transient(format!("failed to read upload: {}", e)))?;

        let form = multipart::Form::new()
            .part(
                "metadata",
                multipart::Part::text(metadata.to_string())
                    .mime_str("application/json")
                    .map_err(|e| MlError::invalid(e.to_string()))?,
            )
            .part(
                "file",
                multipart::Part::bytes(bytes)
                    .file_name(display_name)
                    .mime_str(mime_type)
                    .map_err(|e| MlError::invalid(e.to_string()))?,
            );

        let response = self.http.post(&url).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_failure(status, body));
        }

        let payload: FileUploadResponse = response
            .json()
            .await
            .map_err(|e| MlError::invalid(format!("unparseable upload response: {}", e)))?;

        debug!(uri = %payload.file.uri, "Uploaded media to model file store");
        Ok((payload.file.uri, payload.file.name))
    }

    /// Call the generation endpoint expecting a declared JSON shape.
    ///
    /// The response is fence-stripped and parsed into `T`; a shape failure
    /// is retried once with an explicit corrective reminder appended to the
    /// prompt before surfacing an error.
    pub(crate) async fn generate_shaped<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        model: &str,
        api_key: &str,
        parts: &[Part],
    ) -> MlResult<T> {
        let text = crate::retry::with_retry(operation, || {
            self.generate(model, api_key, parts, true)
        })
        .await?;

        match crate::json::parse_shaped::<T>(&text) {
            Ok(value) => Ok(value),
            Err(first_failure) => {
                warn!(operation, error = %first_failure, "Shape violation, issuing corrective retry");
                let mut corrective = parts.to_vec();
                corrective.push(Part::text(
                    "Your previous reply was not valid JSON. Return ONLY valid JSON matching \
                     the requested shape, with no markdown fences or commentary.",
                ));
                let text = crate::retry::with_retry(operation, || {
                    self.generate(model, api_key, &corrective, true)
                })
                .await?;
                crate::json::parse_shaped(&text)
            }
        }
    }

    /// Best-effort deletion of an uploaded file.
    pub(crate) async fn delete_file(&self, file_name: &str, api_key: &str) {
        let url = format!("{}/v1beta/{}?key={}", self.base_url, file_name, api_key);
        if let Err(e) = self.http.delete(&url).send().await {
            warn!("Failed to delete uploaded model file {}: {}", file_name, e);
        }
    }
}

/// Map an HTTP failure onto the gateway error taxonomy.
fn classify_http_failure(status: StatusCode, body: String) -> MlError {
    if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || body.contains("API key not valid")
        || body.contains("API_KEY_INVALID")
    {
        MlError::Auth(format!("{}: {}", status, truncate(&body)))
    } else if status == StatusCode::TOO_MANY_REQUESTS
        || body.to_lowercase().contains("quota")
        || body.to_lowercase().contains("rate limit")
    {
        MlError::RateLimited(format!("{}: {}", status, truncate(&body)))
    } else if status.is_server_error() {
        MlError::Transient(format!("{}: {}", status, truncate(&body)))
    } else {
        MlError::InvalidResponse(format!("{}: {}", status, truncate(&body)))
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(300).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn generation_body(text: &str) -> serde_json::Value {
        serde_json::json!({
            "candidates": [
                { "content": { "parts": [ { "text": text } ] } }
            ]
        })
    }

    #[tokio::test]
    async fn test_generate_returns_first_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(generation_body("hello")))
            .mount(&server)
            .await;

        let client = GeminiClient::new().with_base_url(server.uri());
        let text = client
            .generate(DEFAULT_MODEL, "key", &[Part::text("hi")], false)
            .await
            .unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn test_generate_auth_failure_is_not_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string(
                "{\"error\": {\"status\": \"INVALID_ARGUMENT\", \"message\": \"API key not valid\"}}",
            ))
            .mount(&server)
            .await;

        let client = GeminiClient::new().with_base_url(server.uri());
        let err = client
            .generate(DEFAULT_MODEL, "bad", &[Part::text("hi")], false)
            .await
            .unwrap_err();
        assert!(matches!(err, MlError::Auth(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_generate_rate_limit_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = GeminiClient::new().with_base_url(server.uri());
        let err = client
            .generate(DEFAULT_MODEL, "key", &[Part::text("hi")], false)
            .await
            .unwrap_err();
        assert!(matches!(err, MlError::RateLimited(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_generate_empty_response_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"candidates": []})),
            )
            .mount(&server)
            .await;

        let client = GeminiClient::new().with_base_url(server.uri());
        let err = client
            .generate(DEFAULT_MODEL, "key", &[Part::text("hi")], false)
            .await
            .unwrap_err();
        assert!(matches!(err, MlError::Transient(_)));
    }
}
