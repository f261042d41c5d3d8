//! Provider-facing contracts for the image and video capabilities.
//!
//! Every call resolves to `Ok(Some(_))`, `Ok(None)` when the provider answered
//! without a usable payload, or `Err` when the call itself failed. Nothing
//! here retries.

use std::fmt;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::GatewayError;

/// A one-click style edit offered after an image is produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleSuggestion {
    /// Short button label.
    pub name: String,
    /// Full edit instruction sent to the image model.
    pub style: String,
}

impl StyleSuggestion {
    pub fn new(name: impl Into<String>, style: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            style: style.into(),
        }
    }
}

const DEFAULT_STYLES: [(&str, &str); 6] = [
    (
        "More",
        "Create more variations of this image keeping the same style and subject",
    ),
    (
        "Add text",
        "Add a beautiful, elegant text caption or title to this image that describes the scene",
    ),
    (
        "Watercolor",
        "Transform this image into a soft, dreamy watercolor painting style",
    ),
    (
        "Cinematic",
        "Make this image look like a scene from a high-budget film with dramatic lighting",
    ),
    (
        "Pop Art",
        "Transform this image into a vibrant, colorful pop art style with bold outlines",
    ),
    (
        "Dreamy Haze",
        "Add a soft dreamy haze effect with gentle light leaks and pastel tones",
    ),
];

/// The static list shown until a dynamic one has been fetched.
pub fn default_style_suggestions() -> Vec<StyleSuggestion> {
    DEFAULT_STYLES
        .iter()
        .map(|(name, style)| StyleSuggestion::new(*name, *style))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VideoDuration {
    #[default]
    #[serde(rename = "5s")]
    Five,
    #[serde(rename = "6s")]
    Six,
    #[serde(rename = "7s")]
    Seven,
    #[serde(rename = "8s")]
    Eight,
}

/// Input of an image-to-video job.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct VideoRequest {
    pub prompt: String,
    /// A fully-qualified image URL or a data URL.
    pub image_url: String,
    pub aspect_ratio: AspectRatio,
    pub duration: VideoDuration,
}

impl VideoRequest {
    pub fn new(prompt: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image_url: image_url.into(),
            aspect_ratio: AspectRatio::Auto,
            duration: VideoDuration::Five,
        }
    }
}

// Data URLs run to megabytes; keep them out of debug logs.
impl fmt::Debug for VideoRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoRequest")
            .field("prompt", &self.prompt)
            .field("image_url_len", &self.image_url.len())
            .field("aspect_ratio", &self.aspect_ratio)
            .field("duration", &self.duration)
            .finish()
    }
}

#[async_trait]
pub trait ImageService: Send + Sync {
    /// Text-to-image. Returns raw base64 image data.
    async fn generate(&self, prompt: &str) -> Result<Option<String>, GatewayError>;

    /// Edits `image`, which must already be raw base64 (no data URL header).
    async fn edit(&self, instruction: &str, image: &str) -> Result<Option<String>, GatewayError>;

    /// Style suggestions seeded by a description of the current image.
    async fn suggest_styles(&self, seed: &str)
        -> Result<Option<Vec<StyleSuggestion>>, GatewayError>;

    /// A prompt for animating an image described by `seed`.
    async fn suggest_animation(&self, seed: &str) -> Result<Option<String>, GatewayError>;
}

#[async_trait]
pub trait VideoService: Send + Sync {
    /// Runs an image-to-video job to completion and returns the video URL.
    async fn animate(&self, request: &VideoRequest) -> Result<Option<String>, GatewayError>;
}

/// Pulls a suggestion list out of free-form model output.
///
/// Tries the first balanced `[...]`, then everything from the first `[` to
/// the last `]`, then the whole text. An empty list counts as no suggestions.
pub fn parse_style_suggestions(text: &str) -> Option<Vec<StyleSuggestion>> {
    let mut candidates = Vec::with_capacity(3);
    if let Some(balanced) = first_balanced_array(text) {
        candidates.push(balanced);
    }
    if let Ok(re) = Regex::new(r"\[[\s\S]*\]") {
        if let Some(greedy) = re.find(text) {
            candidates.push(greedy.as_str());
        }
    }
    candidates.push(text.trim());

    for candidate in candidates {
        match serde_json::from_str::<Vec<StyleSuggestion>>(candidate) {
            Ok(suggestions) if suggestions.is_empty() => {
                debug!("Suggestion list parsed but empty");
                return None;
            }
            Ok(suggestions) => return Some(suggestions),
            Err(e) => debug!("Suggestion candidate rejected: {}", e),
        }
    }

    warn!("Could not parse style suggestions from model output");
    None
}

/// Returns the first `[...]` whose brackets balance, skipping brackets that
/// appear inside JSON string literals.
fn first_balanced_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_six_entries() {
        let defaults = default_style_suggestions();
        assert_eq!(defaults.len(), 6);
        assert_eq!(defaults[2].name, "Watercolor");
        assert!(defaults.iter().all(|s| !s.style.is_empty()));
    }

    #[test]
    fn parses_json_wrapped_in_prose() {
        let text = r#"Here is the list: [ {"name": "Neon Glow", "style": "Add neon glow effects"}, {"name": "Vintage Film", "style": "Apply film grain"} ] done"#;
        let parsed = parse_style_suggestions(text).unwrap();
        assert_eq!(
            parsed,
            vec![
                StyleSuggestion::new("Neon Glow", "Add neon glow effects"),
                StyleSuggestion::new("Vintage Film", "Apply film grain"),
            ]
        );
    }

    #[test]
    fn parses_fenced_code_block() {
        let text = "```json\n[{\"name\": \"Noir\", \"style\": \"Convert to black and white\"}]\n```";
        let parsed = parse_style_suggestions(text).unwrap();
        assert_eq!(parsed[0].name, "Noir");
    }

    #[test]
    fn brackets_inside_strings_do_not_end_the_array() {
        let text = r#"[{"name": "Tags [x]", "style": "Add a label that reads ]["}] and then [1]"#;
        let parsed = parse_style_suggestions(text).unwrap();
        assert_eq!(parsed[0].name, "Tags [x]");
        assert_eq!(parsed[0].style, "Add a label that reads ][");
    }

    #[test]
    fn first_balanced_array_handles_nesting() {
        assert_eq!(first_balanced_array("a [[1], [2]] b [3]"), Some("[[1], [2]]"));
        assert_eq!(first_balanced_array("no array"), None);
        assert_eq!(first_balanced_array("[unterminated"), None);
    }

    #[test]
    fn unparsable_or_empty_output_yields_none() {
        assert!(parse_style_suggestions("I cannot help with that.").is_none());
        assert!(parse_style_suggestions("[not json]").is_none());
        assert!(parse_style_suggestions("[]").is_none());
        assert!(parse_style_suggestions(r#"[{"label": "wrong shape"}]"#).is_none());
    }

    #[test]
    fn video_request_serializes_wire_enums() {
        let mut request = VideoRequest::new("slow pan", "data:image/png;base64,QUJD");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["aspect_ratio"], "auto");
        assert_eq!(value["duration"], "5s");

        request.aspect_ratio = AspectRatio::Portrait;
        request.duration = VideoDuration::Eight;
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["aspect_ratio"], "9:16");
        assert_eq!(value["duration"], "8s");
    }

    #[test]
    fn video_request_debug_hides_image_data() {
        let request = VideoRequest::new("slow pan", "data:image/png;base64,SECRETPIXELS");
        let rendered = format!("{request:?}");
        assert!(!rendered.contains("SECRETPIXELS"));
        assert!(rendered.contains("slow pan"));
    }
}
