/// A request to be sent to the model provider.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ModelRequest {
    /// The input messages, oldest first.
    pub messages: Vec<ModelMessage>,
}

impl ModelRequest {
    /// Creates a request with the given history.
    #[inline]
    pub fn with_messages(messages: impl Into<Vec<ModelMessage>>) -> Self {
        Self {
            messages: messages.into(),
        }
    }

    /// Returns the number of user and assistant turns in this request,
    /// ignoring system instructions.
    pub fn turn_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|msg| !matches!(msg, ModelMessage::System(_)))
            .count()
    }
}

/// A complete message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModelMessage {
    /// The system instructions.
    System(String),
    /// A user input text.
    User(String),
    /// An assistant text.
    Assistant(String),
}

impl ModelMessage {
    /// Returns the text content of this message.
    #[inline]
    pub fn text(&self) -> &str {
        match self {
            ModelMessage::System(text)
            | ModelMessage::User(text)
            | ModelMessage::Assistant(text) => text,
        }
    }
}
