use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, error, info};

use crate::config::GeminiConfig;
use crate::error::GatewayError;
use crate::gateway::{ImageService, StyleSuggestion, parse_style_suggestions};
use crate::payload::DEFAULT_MIME_TYPE;

const PROVIDER: &str = "Gemini";

pub struct GeminiClient {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn generate_content(
        &self,
        parts: Vec<Value>,
        generation_config: Value,
    ) -> Result<Value, GatewayError> {
        let api_url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url, self.config.model
        );

        let request_body = json!({
            "contents": [
                {
                    "role": "user",
                    "parts": parts
                }
            ],
            "generationConfig": generation_config
        });

        debug!(
            "Sending request to Gemini API ({} parts, config {})",
            request_body["contents"][0]["parts"]
                .as_array()
                .map(Vec::len)
                .unwrap_or(0),
            request_body["generationConfig"]
        );

        let response = self
            .client
            .post(&api_url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let err = GatewayError::from_response(PROVIDER, response).await;
            error!("API request failed with response: {}", err);
            return Err(err);
        }

        let response_json: Value = response.json().await?;
        let candidates = candidate_count(&response_json);
        debug!("Received response from Gemini API with {} candidate(s)", candidates);
        Ok(response_json)
    }

    async fn produce_image(&self, parts: Vec<Value>) -> Result<Option<String>, GatewayError> {
        let response = self
            .generate_content(parts, json!({ "responseModalities": ["Text", "Image"] }))
            .await?;

        let text = collect_text(&response);
        if !text.is_empty() {
            debug!("Text response: {}", text);
        }

        match first_inline_image(&response) {
            Some(data) => {
                info!("Image data received, length: {}", data.len());
                Ok(Some(data))
            }
            None => {
                info!("No image found in response");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl ImageService for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<Option<String>, GatewayError> {
        info!("Generating image for prompt: {}", prompt);
        self.produce_image(vec![json!({ "text": prompt })]).await
    }

    async fn edit(&self, instruction: &str, image: &str) -> Result<Option<String>, GatewayError> {
        info!(
            "Editing image ({} base64 chars) with prompt: {}",
            image.len(),
            instruction
        );
        self.produce_image(vec![
            json!({ "text": instruction }),
            json!({
                "inlineData": {
                    "mimeType": DEFAULT_MIME_TYPE,
                    "data": image
                }
            }),
        ])
        .await
    }

    async fn suggest_styles(
        &self,
        seed: &str,
    ) -> Result<Option<Vec<StyleSuggestion>>, GatewayError> {
        info!("Generating style suggestions for prompt: {}", seed);
        let response = self
            .generate_content(
                vec![json!({ "text": style_suggestions_prompt(seed) })],
                json!({ "responseModalities": ["Text"] }),
            )
            .await?;

        let text = collect_text(&response);
        debug!("Raw suggestion response: {}", text);
        Ok(parse_style_suggestions(&text))
    }

    async fn suggest_animation(&self, seed: &str) -> Result<Option<String>, GatewayError> {
        info!("Generating animation prompt for: {}", seed);
        let response = self
            .generate_content(
                vec![json!({ "text": animation_prompt(seed) })],
                json!({
                    "responseModalities": ["Text"],
                    "temperature": 0.8,
                    "maxOutputTokens": 200
                }),
            )
            .await?;

        let text = collect_text(&response).trim().to_string();
        debug!("Generated animation prompt: {}", text);
        Ok(Some(text).filter(|t| !t.is_empty()))
    }
}

fn style_suggestions_prompt(seed: &str) -> String {
    format!(
        r#"Based on this image description: "{seed}",
generate 6 creative style modification suggestions that would look good for this image.

Return the result as a JSON array of objects, where each object has:
- 'name': a short, catchy name for the button (2-3 words max)
- 'style': a detailed instruction for how to edit the image (start with an action verb)

For example:
[
  {{ "name": "Neon Glow", "style": "Add neon glow effects with bright blues and pinks" }},
  {{ "name": "Vintage Film", "style": "Apply a vintage film grain and desaturated colors" }}
]

Be creative and varied with the suggestions. They should be different from each other.
Output ONLY the JSON array, no other text."#
    )
}

fn animation_prompt(seed: &str) -> String {
    format!(
        r#"Based on this image description: "{seed}",
generate a creative, detailed prompt for animating this image into a short video.

The prompt should:
1. Describe subtle, natural movements that would make the image come alive
2. Suggest camera movements or zooms if appropriate
3. Add atmosphere elements like wind, light changes, or particle effects if fitting
4. Be specific but concise (under 100 words)

Focus on creating a prompt that would work well with AI video generation from a still image.

Output ONLY the prompt itself, no explanations or additional text."#
    )
}

fn candidate_count(response: &Value) -> usize {
    response
        .get("candidates")
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0)
}

fn candidate_parts(response: &Value) -> impl Iterator<Item = &Value> {
    response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn first_inline_image(response: &Value) -> Option<String> {
    candidate_parts(response).find_map(|part| {
        part.get("inlineData")
            .or_else(|| part.get("inline_data"))
            .and_then(|inline| inline.get("data"))
            .and_then(Value::as_str)
            .filter(|data| !data.is_empty())
            .map(str::to_string)
    })
}

fn collect_text(response: &Value) -> String {
    candidate_parts(response)
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("")
}
