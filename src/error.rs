/// Failure of a provider call.
///
/// A call that succeeds on the wire but carries no usable payload is not an
/// error: gateway methods report that case as `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{provider} API request failed ({status}): {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl GatewayError {
    /// Builds an `Api` error from a non-success response, consuming its body.
    pub async fn from_response(provider: &'static str, response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => GatewayError::Api {
                provider,
                status,
                body,
            },
            Err(e) => GatewayError::Transport(e),
        }
    }
}
