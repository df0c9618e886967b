use std::sync::Arc;
use std::time::Duration;

use little_chat_model::ModelProvider;

use super::SessionController;
use crate::config::{ChatConfig, DEFAULT_REQUEST_TIMEOUT, DEFAULT_USER};
use crate::model_client::ModelClient;
use crate::store::PersistenceBackend;

/// [`SessionController`] builder.
pub struct ControllerBuilder {
    pub(crate) model_client: ModelClient,
    pub(crate) system_prompt: Option<String>,
    pub(crate) request_timeout: Duration,
    pub(crate) user: String,
    pub(crate) backend: Option<Arc<dyn PersistenceBackend>>,
    pub(crate) auto_persist: Option<bool>,
}

impl ControllerBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self {
            model_client: ModelClient::new(provider),
            system_prompt: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user: DEFAULT_USER.to_owned(),
            backend: None,
            auto_persist: None,
        }
    }

    /// Applies the session settings of `config`.
    ///
    /// The persistence backend is not opened here, see
    /// [`ChatConfig::open_backend`].
    pub fn with_config(mut self, config: &ChatConfig) -> Self {
        self.system_prompt = config.system_prompt.clone();
        self.request_timeout = config.request_timeout;
        self.user = config.user.clone();
        self.auto_persist = Some(config.auto_persist);
        self
    }

    /// Sets the instruction sent ahead of every conversation.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Bounds every model round trip.
    #[inline]
    pub fn with_request_timeout(mut self, limit: Duration) -> Self {
        self.request_timeout = limit;
        self
    }

    /// Sets the owner of the persisted history.
    #[inline]
    pub fn with_user<S: Into<String>>(mut self, user: S) -> Self {
        self.user = user.into();
        self
    }

    /// Attaches a persistence backend. Auto-persist is enabled unless
    /// turned off explicitly.
    #[inline]
    pub fn with_backend(
        mut self,
        backend: Arc<dyn PersistenceBackend>,
    ) -> Self {
        self.backend = Some(backend);
        self
    }

    #[inline]
    pub fn auto_persist(mut self, enabled: bool) -> Self {
        self.auto_persist = Some(enabled);
        self
    }

    /// Builds the controller with an empty transcript and archive.
    #[inline]
    pub fn build(self) -> SessionController {
        SessionController::from_builder(self)
    }
}
