mod builder;
mod state;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

pub use builder::ControllerBuilder;
pub use state::SessionStage;

use crate::conversation::{
    ArchiveId, ChatLogArchive, Message, Transcript,
};
use crate::error::{ExportError, SessionError};
use crate::export::{self, ExportLines};
use crate::model_client::ModelClient;
use crate::model_session::ModelSession;
use crate::store::{
    PersistenceBackend, archive_key, load_json, save_json, transcript_key,
};

/// Prefix of the assistant message shown when a turn fails.
pub const ERROR_PREFIX: &str = "❌ Error: ";

/// Owns the live conversation of one user.
///
/// The controller holds the active transcript, the archive of past chat logs
/// and the model session carrying the backend context. Every operation takes
/// `&mut self`, so operations on one controller never interleave.
///
/// Backend failures never escape [`submit_user_turn`]; they show up in the
/// transcript as assistant error messages and the session stays usable.
///
/// [`submit_user_turn`]: SessionController::submit_user_turn
pub struct SessionController {
    model_client: ModelClient,
    system_prompt: Option<String>,
    request_timeout: Duration,
    user: String,
    transcript: Transcript,
    archive: ChatLogArchive,
    model_session: ModelSession,
    backend: Option<Arc<dyn PersistenceBackend>>,
    auto_persist: bool,
}

impl SessionController {
    fn from_builder(builder: ControllerBuilder) -> Self {
        let ControllerBuilder {
            model_client,
            system_prompt,
            request_timeout,
            user,
            backend,
            auto_persist,
        } = builder;

        let auto_persist = auto_persist.unwrap_or(true) && backend.is_some();
        let model_session =
            ModelSession::new(model_client.clone(), system_prompt.clone());
        Self {
            model_client,
            system_prompt,
            request_timeout,
            user,
            transcript: Transcript::default(),
            archive: ChatLogArchive::default(),
            model_session,
            backend,
            auto_persist,
        }
    }

    #[inline]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    #[inline]
    pub fn archive(&self) -> &ChatLogArchive {
        &self.archive
    }

    #[inline]
    pub fn user(&self) -> &str {
        &self.user
    }

    #[inline]
    pub fn state(&self) -> SessionStage {
        SessionStage::of_len(self.transcript.len())
    }

    /// Sends `text` as the next user turn and appends the reply.
    ///
    /// Returns the appended assistant message, which is an error message if
    /// the backend failed. Empty or whitespace-only input is ignored and
    /// returns `None`.
    #[inline]
    pub async fn submit_user_turn(&mut self, text: &str) -> Option<&Message> {
        let cancel = CancellationToken::new();
        self.submit_user_turn_with(text, &cancel, |_| {}).await
    }

    /// Like [`submit_user_turn`], but streams reply fragments to `on_delta`
    /// and gives up when `cancel` fires.
    ///
    /// A failed auto-persist is logged and otherwise ignored; use
    /// [`submit_user_turn_checked`] to observe it.
    ///
    /// [`submit_user_turn`]: SessionController::submit_user_turn
    /// [`submit_user_turn_checked`]: SessionController::submit_user_turn_checked
    pub async fn submit_user_turn_with(
        &mut self,
        text: &str,
        cancel: &CancellationToken,
        on_delta: impl FnMut(&str) + Send + 'static,
    ) -> Option<&Message> {
        if !self.run_turn(text, cancel, on_delta).await {
            return None;
        }
        if let Err(err) = self.auto_persist().await {
            warn!("failed to persist the turn: {err}");
        }
        self.transcript.last()
    }

    /// Like [`submit_user_turn_with`], but reports auto-persist failures.
    /// The turn stays in memory either way.
    ///
    /// [`submit_user_turn_with`]: SessionController::submit_user_turn_with
    pub async fn submit_user_turn_checked(
        &mut self,
        text: &str,
        cancel: &CancellationToken,
        on_delta: impl FnMut(&str) + Send + 'static,
    ) -> Result<Option<&Message>, SessionError> {
        if !self.run_turn(text, cancel, on_delta).await {
            return Ok(None);
        }
        self.auto_persist().await?;
        Ok(self.transcript.last())
    }

    /// Returns `false` if the input was ignored.
    async fn run_turn(
        &mut self,
        text: &str,
        cancel: &CancellationToken,
        on_delta: impl FnMut(&str) + Send + 'static,
    ) -> bool {
        if text.trim().is_empty() {
            trace!("ignored empty input");
            return false;
        }

        self.transcript.push(Message::user(text));
        let reply = self
            .model_session
            .send_turn(text, self.request_timeout, cancel, on_delta)
            .await;
        let message = match reply {
            Ok(reply) => Message::assistant(reply),
            Err(failure) => {
                warn!("turn failed: {failure}");
                Message::assistant_error(format!("{ERROR_PREFIX}{failure}"))
            }
        };
        self.transcript.push(message);
        debug!("transcript now has {} messages", self.transcript.len());
        true
    }

    /// Archives the current transcript, if any, and starts over.
    ///
    /// Returns the id of the new chat log, or `None` when there was nothing
    /// to archive.
    pub async fn start_new_session(
        &mut self,
    ) -> Result<Option<ArchiveId>, SessionError> {
        let archived = if self.transcript.is_empty() {
            None
        } else {
            let transcript = std::mem::take(&mut self.transcript);
            let id = self.archive.archive(transcript, Utc::now());
            debug!("archived the transcript as chat log #{id}");
            Some(id)
        };
        self.reset_model_session();
        self.auto_persist().await?;
        Ok(archived)
    }

    /// Replaces the transcript with a copy of an archived chat log.
    ///
    /// The transcript being replaced is dropped, not archived.
    pub async fn switch_to_archived(
        &mut self,
        id: ArchiveId,
    ) -> Result<(), SessionError> {
        let Some(entry) = self.archive.get(id) else {
            return Err(SessionError::NotFound { id });
        };
        self.transcript = entry.transcript_snapshot().clone();
        self.reset_model_session();
        debug!(
            "switched to chat log #{id} with {} messages",
            self.transcript.len()
        );
        self.auto_persist().await
    }

    /// Empties the transcript without archiving it.
    pub async fn clear_active(&mut self) -> Result<(), SessionError> {
        self.transcript.clear();
        self.reset_model_session();
        debug!("cleared the transcript");
        self.auto_persist().await
    }

    /// Lines of the plain-text chat log of the active transcript.
    #[inline]
    pub fn export_transcript(&self) -> ExportLines<'_> {
        ExportLines::new(&self.transcript)
    }

    /// Writes the chat log of the active transcript into `dir`.
    #[inline]
    pub async fn export_to_file(
        &self,
        dir: &Path,
    ) -> Result<PathBuf, ExportError> {
        export::export_to_file(&self.transcript, dir).await
    }

    /// Saves the transcript and the archive. Does nothing without a backend.
    pub async fn persist(&self) -> Result<(), SessionError> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };
        save_json(&**backend, &transcript_key(&self.user), &self.transcript)
            .await?;
        save_json(&**backend, &archive_key(&self.user), &self.archive).await?;
        trace!("persisted history of {}", self.user);
        Ok(())
    }

    /// Loads the transcript and the archive saved by [`persist`].
    ///
    /// Records that were never saved leave the in-memory state as it is.
    ///
    /// [`persist`]: SessionController::persist
    pub async fn restore(&mut self) -> Result<(), SessionError> {
        if self.backend.is_none() {
            return Ok(());
        }
        let (transcript, archive) = self.load_history(&self.user).await?;
        if let Some(transcript) = transcript {
            self.transcript = transcript;
        }
        if let Some(archive) = archive {
            self.archive = archive;
        }
        self.reset_model_session();
        debug!(
            "restored {} messages and {} chat logs of {}",
            self.transcript.len(),
            self.archive.len(),
            self.user
        );
        Ok(())
    }

    /// Hands the controller over to `user`: the in-memory history is dropped
    /// and replaced with whatever was persisted for them.
    ///
    /// If their records cannot be loaded the controller keeps its current
    /// user and history.
    pub async fn switch_user<S: Into<String>>(
        &mut self,
        user: S,
    ) -> Result<(), SessionError> {
        let user = user.into();
        let (transcript, archive) = self.load_history(&user).await?;
        self.user = user;
        self.transcript = transcript.unwrap_or_default();
        self.archive = archive.unwrap_or_default();
        self.reset_model_session();
        debug!(
            "switched to user {} with {} messages and {} chat logs",
            self.user,
            self.transcript.len(),
            self.archive.len()
        );
        Ok(())
    }

    async fn load_history(
        &self,
        user: &str,
    ) -> Result<(Option<Transcript>, Option<ChatLogArchive>), SessionError> {
        let Some(backend) = &self.backend else {
            return Ok((None, None));
        };
        let transcript = load_json(&**backend, &transcript_key(user)).await?;
        let archive = load_json(&**backend, &archive_key(user)).await?;
        Ok((transcript, archive))
    }

    async fn auto_persist(&self) -> Result<(), SessionError> {
        if self.auto_persist {
            self.persist().await
        } else {
            Ok(())
        }
    }

    fn reset_model_session(&mut self) {
        self.model_session = ModelSession::seeded(
            self.model_client.clone(),
            self.system_prompt.clone(),
            &self.transcript,
        );
    }
}
