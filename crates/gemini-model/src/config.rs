use std::fmt::Debug;

const DEFAULT_MODEL: &str = "gemini-pro";
const DEFAULT_BASE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta";

/// Builder for [`GeminiConfig`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct GeminiConfigBuilder {
    api_key: String,
    model: Option<String>,
    base_url: Option<String>,
}

impl GeminiConfigBuilder {
    /// Creates a builder with the given API key.
    #[inline]
    pub fn with_api_key<S: Into<String>>(api_key: S) -> Self {
        Self {
            api_key: api_key.into(),
            model: None,
            base_url: None,
        }
    }

    /// Sets the model to use.
    ///
    /// Both `gemini-pro` and the resource form `models/gemini-pro` are
    /// accepted.
    #[inline]
    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets a custom base URL.
    #[inline]
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> GeminiConfig {
        let model = self.model.unwrap_or_else(|| DEFAULT_MODEL.to_owned());
        let model = model
            .strip_prefix("models/")
            .map(ToOwned::to_owned)
            .unwrap_or(model);
        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned())
            .trim_end_matches('/')
            .to_owned();
        GeminiConfig {
            api_key: self.api_key,
            model,
            base_url,
        }
    }
}

impl Debug for GeminiConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfigBuilder")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Configuration for the Gemini provider.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct GeminiConfig {
    pub(crate) api_key: String,
    pub(crate) model: String,
    pub(crate) base_url: String,
}

impl GeminiConfig {
    /// Returns the model name, without the `models/` prefix.
    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    pub(crate) fn stream_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        )
    }
}

impl Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GeminiConfigBuilder::with_api_key("key").build();
        assert_eq!(config.model(), "gemini-pro");
        assert_eq!(
            config.stream_url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:streamGenerateContent?alt=sse"
        );
        assert!(format!("{config:?}").contains("<redacted>"));
    }

    #[test]
    fn test_resource_model_name() {
        let config = GeminiConfigBuilder::with_api_key("key")
            .with_model("models/gemini-1.5-flash")
            .with_base_url("http://localhost:8080/")
            .build();
        assert_eq!(config.model(), "gemini-1.5-flash");
        assert_eq!(
            config.stream_url(),
            "http://localhost:8080/models/gemini-1.5-flash:streamGenerateContent?alt=sse"
        );
    }
}
