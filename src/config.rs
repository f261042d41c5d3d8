use std::env;
use std::time::Duration;

use eyre::{Result, eyre};

pub const DEFAULT_GEMINI_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.0-flash-exp-image-generation";
pub const DEFAULT_FAL_QUEUE_BASE: &str = "https://queue.fal.run";
pub const DEFAULT_VIDEO_MODEL: &str = "fal-ai/veo2/image-to-video";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_GEMINI_BASE.to_string(),
            model: DEFAULT_IMAGE_MODEL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = trim_base(base_url.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct FalConfig {
    pub api_key: String,
    pub queue_base: String,
    pub model: String,
    pub poll_interval: Duration,
}

impl FalConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            queue_base: DEFAULT_FAL_QUEUE_BASE.to_string(),
            model: DEFAULT_VIDEO_MODEL.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }

    pub fn with_queue_base(mut self, queue_base: impl Into<String>) -> Self {
        self.queue_base = trim_base(queue_base.into());
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Delays of the scripted welcome sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WelcomeTiming {
    pub before_thinking: Duration,
    pub thinking: Duration,
    pub before_prompt_hint: Duration,
    pub before_prompts: Duration,
}

impl WelcomeTiming {
    pub fn instant() -> Self {
        Self {
            before_thinking: Duration::ZERO,
            thinking: Duration::ZERO,
            before_prompt_hint: Duration::ZERO,
            before_prompts: Duration::ZERO,
        }
    }
}

impl Default for WelcomeTiming {
    fn default() -> Self {
        Self {
            before_thinking: Duration::from_millis(1000),
            thinking: Duration::from_millis(1500),
            before_prompt_hint: Duration::from_millis(800),
            before_prompts: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub gemini: GeminiConfig,
    pub fal: FalConfig,
    pub welcome: WelcomeTiming,
}

impl Config {
    /// Reads credentials and endpoint overrides from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let gemini_key = non_empty("GEMINI_API_KEY")
            .ok_or_else(|| eyre!("GEMINI_API_KEY environment variable not set"))?;
        let fal_key = non_empty("FAL_KEY")
            .or_else(|| non_empty("FAL_API_KEY"))
            .ok_or_else(|| eyre!("FAL_KEY (or FAL_API_KEY) environment variable not set"))?;

        let mut gemini = GeminiConfig::new(gemini_key);
        if let Some(base) = non_empty("GEMINI_API_BASE") {
            gemini = gemini.with_base_url(base);
        }
        if let Some(model) = non_empty("GEMINI_IMAGE_MODEL") {
            gemini.model = model;
        }

        let mut fal = FalConfig::new(fal_key);
        if let Some(base) = non_empty("FAL_QUEUE_BASE") {
            fal = fal.with_queue_base(base);
        }
        if let Some(model) = non_empty("FAL_VIDEO_MODEL") {
            fal.model = model;
        }
        if let Some(raw) = non_empty("FAL_POLL_INTERVAL_MS") {
            let millis: u64 = raw
                .parse()
                .map_err(|_| eyre!("FAL_POLL_INTERVAL_MS must be a whole number of milliseconds, got {raw:?}"))?;
            if millis == 0 {
                return Err(eyre!("FAL_POLL_INTERVAL_MS must be greater than zero"));
            }
            fal.poll_interval = Duration::from_millis(millis);
        }

        Ok(Self {
            gemini,
            fal,
            welcome: WelcomeTiming::default(),
        })
    }
}

fn trim_base(base: String) -> String {
    base.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_credentials_are_set() {
        let config =
            Config::from_lookup(lookup(&[("GEMINI_API_KEY", "g"), ("FAL_KEY", "f")])).unwrap();
        assert_eq!(config.gemini.api_key, "g");
        assert_eq!(config.gemini.base_url, DEFAULT_GEMINI_BASE);
        assert_eq!(config.gemini.model, DEFAULT_IMAGE_MODEL);
        assert_eq!(config.fal.api_key, "f");
        assert_eq!(config.fal.model, DEFAULT_VIDEO_MODEL);
        assert_eq!(config.fal.poll_interval, Duration::from_millis(1000));
        assert_eq!(config.welcome, WelcomeTiming::default());
    }

    #[test]
    fn fal_api_key_is_accepted_as_fallback() {
        let config =
            Config::from_lookup(lookup(&[("GEMINI_API_KEY", "g"), ("FAL_API_KEY", "alt")]))
                .unwrap();
        assert_eq!(config.fal.api_key, "alt");
    }

    #[test]
    fn blank_credentials_are_rejected() {
        let err = Config::from_lookup(lookup(&[("GEMINI_API_KEY", "  "), ("FAL_KEY", "f")]))
            .unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));

        let err = Config::from_lookup(lookup(&[("GEMINI_API_KEY", "g")])).unwrap_err();
        assert!(err.to_string().contains("FAL_KEY"));
    }

    #[test]
    fn overrides_are_trimmed() {
        let config = Config::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "g"),
            ("FAL_KEY", "f"),
            ("GEMINI_API_BASE", "http://localhost:9000/"),
            ("FAL_QUEUE_BASE", " http://localhost:9001// "),
            ("FAL_VIDEO_MODEL", "fal-ai/kling/image-to-video"),
            ("FAL_POLL_INTERVAL_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(config.gemini.base_url, "http://localhost:9000");
        assert_eq!(config.fal.queue_base, "http://localhost:9001");
        assert_eq!(config.fal.model, "fal-ai/kling/image-to-video");
        assert_eq!(config.fal.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn bad_poll_interval_is_an_error() {
        let err = Config::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "g"),
            ("FAL_KEY", "f"),
            ("FAL_POLL_INTERVAL_MS", "soon"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("FAL_POLL_INTERVAL_MS"));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "g"),
            ("FAL_KEY", "f"),
            ("FAL_POLL_INTERVAL_MS", "0"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
    }
}
