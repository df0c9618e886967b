use std::future::pending;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::pin::pin;

use little_chat_core::store::MemoryStore;
use little_chat_core::{
    AccountStore, ArchiveId, PersistentAccountStore, SessionController,
};
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::command::{Command, HELP, parse_command};
use crate::renderer::Renderer;
use crate::voice::VoiceOutput;

const PREVIEW_LEN: usize = 40;

/// The interactive chat loop: reads input through a [`Renderer`], runs
/// commands and user turns against a [`SessionController`], and shows the
/// results.
pub struct ChatApp<R> {
    controller: SessionController,
    renderer: R,
    voice: VoiceOutput,
    accounts: Box<dyn AccountStore>,
    export_dir: PathBuf,
    interrupts: Option<mpsc::UnboundedReceiver<()>>,
}

impl<R: Renderer> ChatApp<R> {
    /// Creates an app with voice output off, in-memory accounts and exports
    /// written to the working directory.
    pub fn new(controller: SessionController, renderer: R) -> Self {
        Self {
            controller,
            renderer,
            voice: VoiceOutput::new(false),
            accounts: Box::new(PersistentAccountStore::new(MemoryStore::new())),
            export_dir: PathBuf::from("."),
            interrupts: None,
        }
    }

    /// Reads replies aloud through `voice`.
    #[inline]
    pub fn with_voice(mut self, voice: VoiceOutput) -> Self {
        self.voice = voice;
        self
    }

    /// Uses `accounts` for `/register` and `/login`.
    #[inline]
    pub fn with_accounts(mut self, accounts: Box<dyn AccountStore>) -> Self {
        self.accounts = accounts;
        self
    }

    /// Sets where `/export` without an argument writes to.
    #[inline]
    pub fn with_export_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.export_dir = dir.into();
        self
    }

    /// Every `()` received cancels the turn in flight, e.g. on Ctrl-C.
    #[inline]
    pub fn with_interrupts(
        mut self,
        interrupts: mpsc::UnboundedReceiver<()>,
    ) -> Self {
        self.interrupts = Some(interrupts);
        self
    }

    /// The session controller driven by this app.
    #[inline]
    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    /// The renderer this app draws to.
    #[inline]
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Runs until the input ends or the user quits.
    pub async fn run(&mut self) {
        self.renderer
            .render_notice("Type a message, or /help for commands.");
        self.render_transcript();

        while let Some(line) = self.renderer.read_input().await {
            if self.handle_line(&line).await.is_break() {
                break;
            }
        }
        debug!("chat loop finished");
    }

    /// Handles one input line.
    pub async fn handle_line(&mut self, line: &str) -> ControlFlow<()> {
        let command = match parse_command(line) {
            Ok(command) => command,
            Err(err) => {
                self.renderer.render_notice(&err.to_string());
                return ControlFlow::Continue(());
            }
        };
        trace!("handling {command:?}");

        match command {
            Command::Message(text) => self.submit(&text).await,
            Command::NewSession => self.start_new_session().await,
            Command::Clear => {
                let notice = match self.controller.clear_active().await {
                    Ok(()) => "Chat cleared.".to_owned(),
                    Err(err) => format!("⚠️  {err}"),
                };
                self.renderer.render_notice(&notice);
            }
            Command::History => self.render_history(),
            Command::Switch(id) => self.switch_to(id).await,
            Command::Export(dir) => self.export(dir).await,
            Command::Register { username, password } => {
                self.register(&username, &password).await
            }
            Command::Login { username, password } => {
                self.login(&username, &password).await
            }
            Command::Help => self.renderer.render_notice(HELP),
            Command::Quit => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    async fn submit(&mut self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        // Interrupts that arrived while idle do not apply to this turn.
        if let Some(interrupts) = &mut self.interrupts {
            while interrupts.try_recv().is_ok() {}
        }

        let (delta_tx, mut delta_rx) = mpsc::unbounded_channel::<String>();
        let cancel = CancellationToken::new();
        self.renderer.render_waiting();

        let result = {
            let Self {
                controller,
                renderer,
                interrupts,
                ..
            } = self;
            let mut turn = pin!(controller.submit_user_turn_checked(
                text,
                &cancel,
                move |delta| {
                    delta_tx.send(delta.to_owned()).ok();
                }
            ));
            loop {
                select! {
                    biased;
                    Some(delta) = delta_rx.recv() => {
                        renderer.render_delta(&delta);
                    }
                    result = &mut turn => {
                        break result.map(|reply| reply.cloned());
                    }
                    Some(()) = next_interrupt(interrupts),
                        if !cancel.is_cancelled() =>
                    {
                        debug!("cancelling the turn in flight");
                        cancel.cancel();
                    }
                }
            }
        };
        while let Ok(delta) = delta_rx.try_recv() {
            self.renderer.render_delta(&delta);
        }

        let reply = match result {
            Ok(reply) => reply,
            Err(err) => {
                let reply = self.controller.transcript().last().cloned();
                if let Some(reply) = &reply {
                    self.renderer.render_message(reply);
                }
                self.renderer.render_notice(&format!(
                    "⚠️  Failed to save the chat: {err}"
                ));
                return;
            }
        };
        if let Some(reply) = reply {
            self.renderer.render_message(&reply);
            self.voice.say(&reply).await;
        }
    }

    async fn start_new_session(&mut self) {
        let notice = match self.controller.start_new_session().await {
            Ok(Some(id)) => {
                format!("Chat saved as #{id}. Started a new chat.")
            }
            Ok(None) => "Started a new chat.".to_owned(),
            Err(err) => format!("⚠️  {err}"),
        };
        self.renderer.render_notice(&notice);
    }

    fn render_history(&mut self) {
        let archive = self.controller.archive();
        if archive.is_empty() {
            self.renderer.render_notice("No saved chats yet.");
            return;
        }
        let mut listing = String::from("Saved chats, most recent first:");
        for entry in archive.iter() {
            let snapshot = entry.transcript_snapshot();
            let preview = snapshot
                .iter()
                .find(|message| !message.is_error())
                .map(|message| preview(message.text()))
                .unwrap_or_default();
            listing.push_str(&format!(
                "\n  #{}  {}  {} messages  {}",
                entry.id(),
                entry.label(),
                snapshot.len(),
                preview
            ));
        }
        self.renderer.render_notice(&listing);
    }

    async fn switch_to(&mut self, id: ArchiveId) {
        match self.controller.switch_to_archived(id).await {
            Ok(()) => {
                self.renderer.render_notice(&format!("Reopened chat #{id}."));
                self.render_transcript();
            }
            Err(err) => self.renderer.render_notice(&format!("⚠️  {err}")),
        }
    }

    async fn export(&mut self, dir: Option<PathBuf>) {
        let dir = dir.unwrap_or_else(|| self.export_dir.clone());
        if let Err(err) = tokio::fs::create_dir_all(&dir).await {
            warn!("failed to create {}: {err}", dir.display());
        }
        let notice = match self.controller.export_to_file(&dir).await {
            Ok(path) => format!("Chat exported to {}.", path.display()),
            Err(err) => format!("⚠️  {err}"),
        };
        self.renderer.render_notice(&notice);
    }

    async fn register(&mut self, username: &str, password: &str) {
        let notice = match self.accounts.register(username, password).await {
            Ok(true) => {
                format!("Account {username} created. Use /login to sign in.")
            }
            Ok(false) => {
                "That username is taken or not allowed.".to_owned()
            }
            Err(err) => format!("⚠️  {err}"),
        };
        self.renderer.render_notice(&notice);
    }

    async fn login(&mut self, username: &str, password: &str) {
        match self.accounts.authenticate(username, password).await {
            Ok(true) => {}
            Ok(false) => {
                self.renderer
                    .render_notice("Wrong username or password.");
                return;
            }
            Err(err) => {
                self.renderer.render_notice(&format!("⚠️  {err}"));
                return;
            }
        }
        match self.controller.switch_user(username).await {
            Ok(()) => {
                info!("logged in as {username}");
                self.renderer
                    .render_notice(&format!("Logged in as {username}."));
                self.render_transcript();
            }
            Err(err) => {
                let notice = format!(
                    "⚠️  Could not load the chats of {username}, still \
                     using {}: {err}",
                    self.controller.user()
                );
                self.renderer.render_notice(&notice);
            }
        }
    }

    fn render_transcript(&mut self) {
        for message in self.controller.transcript().iter() {
            self.renderer.render_message(message);
        }
    }
}

async fn next_interrupt(
    interrupts: &mut Option<mpsc::UnboundedReceiver<()>>,
) -> Option<()> {
    match interrupts {
        Some(interrupts) => interrupts.recv().await,
        None => pending().await,
    }
}

fn preview(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > PREVIEW_LEN {
        let cut: String = line.chars().take(PREVIEW_LEN).collect();
        format!("{cut}…")
    } else {
        line.to_owned()
    }
}

#[cfg(test)]
mod tests;
