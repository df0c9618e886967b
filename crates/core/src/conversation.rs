//! Conversation-related types.

use std::fmt::{self, Display};
use std::str::FromStr;

use chrono::{DateTime, Local, Utc};
use little_chat_model::ModelMessage;
use serde::{Deserialize, Serialize};

/// Format of archive labels, in local time.
pub const ARCHIVE_LABEL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Who produced a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person chatting.
    User,
    /// The model, or the session speaking on its behalf.
    Assistant,
}

impl Role {
    /// Returns the upper-case label used by exported chat logs.
    #[inline]
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Distinguishes model output from error notes shown in its place.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// A regular utterance.
    #[default]
    Normal,
    /// A failed turn, rendered as an error bubble. Never sent to the
    /// model as context.
    Error,
}

/// One role-tagged utterance. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    text: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    kind: MessageKind,
}

impl Message {
    /// Creates a user message stamped with the current time.
    #[inline]
    pub fn user<S: Into<String>>(text: S) -> Self {
        Self::new(Role::User, text.into(), MessageKind::Normal)
    }

    /// Creates an assistant message stamped with the current time.
    #[inline]
    pub fn assistant<S: Into<String>>(text: S) -> Self {
        Self::new(Role::Assistant, text.into(), MessageKind::Normal)
    }

    /// Creates an assistant error note.
    #[inline]
    pub fn assistant_error<S: Into<String>>(text: S) -> Self {
        Self::new(Role::Assistant, text.into(), MessageKind::Error)
    }

    fn new(role: Role, text: String, kind: MessageKind) -> Self {
        Self {
            role,
            text,
            timestamp: Utc::now(),
            kind,
        }
    }

    #[inline]
    pub fn role(&self) -> Role {
        self.role
    }

    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[inline]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    #[inline]
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Returns `true` if this is an error note rather than model output.
    #[inline]
    pub fn is_error(&self) -> bool {
        self.kind == MessageKind::Error
    }

    /// Converts this message into model context. Error notes carry no
    /// context and yield `None`.
    pub fn to_model_message(&self) -> Option<ModelMessage> {
        if self.is_error() {
            return None;
        }
        let text = self.text.clone();
        Some(match self.role {
            Role::User => ModelMessage::User(text),
            Role::Assistant => ModelMessage::Assistant(text),
        })
    }
}

/// The live, in-order list of messages of a conversation.
///
/// Messages are only ever appended. Consecutive messages of the same role
/// are allowed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    #[inline]
    pub(crate) fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    #[inline]
    pub(crate) fn clear(&mut self) {
        self.messages.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[inline]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    #[inline]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Returns the model context equivalent of this transcript.
    pub fn to_model_messages(&self) -> Vec<ModelMessage> {
        self.messages
            .iter()
            .filter_map(Message::to_model_message)
            .collect()
    }
}

impl FromIterator<Message> for Transcript {
    fn from_iter<T: IntoIterator<Item = Message>>(iter: T) -> Self {
        Self {
            messages: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Stable reference to an archived chat log.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct ArchiveId(u64);

impl Display for ArchiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ArchiveId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().trim_start_matches('#').parse().map(ArchiveId)
    }
}

/// A frozen copy of a past transcript.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    id: ArchiveId,
    label: String,
    created_at: DateTime<Utc>,
    transcript_snapshot: Transcript,
}

impl ArchiveEntry {
    #[inline]
    pub fn id(&self) -> ArchiveId {
        self.id
    }

    /// The creation time, formatted with [`ARCHIVE_LABEL_FORMAT`].
    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[inline]
    pub fn transcript_snapshot(&self) -> &Transcript {
        &self.transcript_snapshot
    }
}

/// Saved chat logs of one user.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLogArchive {
    // Oldest first.
    entries: Vec<ArchiveEntry>,
    next_id: u64,
}

impl ChatLogArchive {
    /// Freezes `transcript` into a new entry and returns its id.
    pub(crate) fn archive(
        &mut self,
        transcript: Transcript,
        created_at: DateTime<Utc>,
    ) -> ArchiveId {
        let id = ArchiveId(self.next_id);
        self.next_id += 1;
        let label = created_at
            .with_timezone(&Local)
            .format(ARCHIVE_LABEL_FORMAT)
            .to_string();
        self.entries.push(ArchiveEntry {
            id,
            label,
            created_at,
            transcript_snapshot: transcript,
        });
        id
    }

    #[inline]
    pub fn get(&self, id: ArchiveId) -> Option<&ArchiveEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    #[inline]
    pub fn contains(&self, id: ArchiveId) -> bool {
        self.get(id).is_some()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates the entries, most recent first.
    #[inline]
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &ArchiveEntry> {
        self.entries.iter().rev()
    }

    /// Returns the most recently archived entry.
    #[inline]
    pub fn latest(&self) -> Option<&ArchiveEntry> {
        self.entries.last()
    }
}
