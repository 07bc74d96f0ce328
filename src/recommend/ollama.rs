use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::config::RecommenderConfig;
use crate::error::{NormalizerError, Result};
use crate::media::MediaDescriptor;
use crate::resolve::TargetFormat;
use super::{RecommendationPayload, Recommender};

/// Ollama response wrapper
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    /// The generated text; expected to be the JSON payload itself
    response: String,
}

/// Recommender backed by an Ollama `/api/generate` endpoint
pub struct OllamaRecommender {
    client: Client,
    config: RecommenderConfig,
}

impl OllamaRecommender {
    pub fn new(config: RecommenderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| NormalizerError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn build_prompt(&self, source: &MediaDescriptor, target: &TargetFormat) -> Result<String> {
        let source_json = serde_json::to_string_pretty(source)?;
        let target_json = serde_json::to_string_pretty(target)?;

        Ok(format!(
            r#"You are an expert in media encoding. Recommend ffmpeg encoding parameters for converting the source below to the target format.

SOURCE:
{}

TARGET:
{}

Return ONLY a JSON object with exactly these fields:
{{
  "codec_parameters": {{"preset": "medium", "profile": "high"}},
  "bitrate_strategy": {{"type": "CRF", "value": 23}},
  "ffmpeg_options": ["-movflags", "+faststart"],
  "audio_parameters": {{"bitrate": "192k"}},
  "optimizations": ["short notes on what was optimized"]
}}

Rules:
1. bitrate_strategy.type is one of CRF, CBR, VBR
2. codec_parameters and audio_parameters values are strings or numbers
3. Do not change the codec"#,
            source_json, target_json
        ))
    }
}

#[async_trait]
impl Recommender for OllamaRecommender {
    async fn recommend(&self, source: &MediaDescriptor, target: &TargetFormat) -> Result<RecommendationPayload> {
        let prompt = self.build_prompt(source, target)?;
        debug!("Requesting recommendation from {} ({})", self.config.endpoint, self.config.model);

        let response = self
            .client
            .post(format!("{}/api/generate", self.config.endpoint.trim_end_matches('/')))
            .json(&json!({
                "model": self.config.model,
                "prompt": prompt,
                "stream": false,
                "format": "json"
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(NormalizerError::Recommender(format!(
                "Recommendation request failed {}: {}",
                status, error_text
            )));
        }

        let wrapper: OllamaResponse = response
            .json()
            .await
            .map_err(|e| NormalizerError::Recommender(format!("Failed to read response: {}", e)))?;

        debug!("Raw recommendation: {}", wrapper.response);
        let payload = RecommendationPayload::parse(&wrapper.response)?;
        info!(
            "Received recommendation for {} ({} codec parameters)",
            source.path.display(),
            payload.codec_parameters.len()
        );
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn recommender(endpoint: String) -> OllamaRecommender {
        OllamaRecommender::new(RecommenderConfig {
            enabled: true,
            endpoint,
            model: "test-model".to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn inputs() -> (MediaDescriptor, TargetFormat) {
        (MediaDescriptor::empty("clip.mov"), TargetFormat::new("mp4"))
    }

    #[tokio::test]
    async fn test_recommend_parses_generated_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({"model": "test-model", "stream": false, "format": "json"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "test-model",
                "response": "{\"codec_parameters\": {\"preset\": \"slow\"}, \"bitrate_strategy\": {\"type\": \"CRF\", \"value\": 21}}",
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (source, target) = inputs();
        let payload = recommender(server.uri()).recommend(&source, &target).await.unwrap();

        assert_eq!(payload.codec_parameters["preset"], json!("slow"));
        assert_eq!(payload.bitrate_strategy.unwrap().value, json!(21));
    }

    #[tokio::test]
    async fn test_http_error_is_a_recommender_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
            .mount(&server)
            .await;

        let (source, target) = inputs();
        let result = recommender(server.uri()).recommend(&source, &target).await;

        assert!(matches!(result, Err(NormalizerError::Recommender(ref msg)) if msg.contains("model not loaded")));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_http_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let (source, target) = inputs();
        let result = recommender(endpoint).recommend(&source, &target).await;

        assert!(matches!(result, Err(NormalizerError::Http(_))));
    }

    #[tokio::test]
    async fn test_malformed_generated_text_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": "I think you should use CRF 23."
            })))
            .mount(&server)
            .await;

        let (source, target) = inputs();
        let result = recommender(server.uri()).recommend(&source, &target).await;

        assert!(matches!(result, Err(NormalizerError::Recommender(_))));
    }

    #[test]
    fn test_prompt_embeds_source_and_target() {
        let (source, target) = inputs();
        let prompt = recommender("http://localhost:11434".to_string())
            .build_prompt(&source, &target)
            .unwrap();

        assert!(prompt.contains("clip.mov"));
        assert!(prompt.contains("\"format\": \"mp4\""));
        assert!(prompt.contains("bitrate_strategy"));
    }
}
