/// Coarse stage of the active conversation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SessionStage {
    /// The transcript is empty.
    #[default]
    Idle,
    /// The transcript holds at least one message.
    Active,
}

impl SessionStage {
    #[inline]
    pub(crate) fn of_len(len: usize) -> Self {
        if len == 0 {
            SessionStage::Idle
        } else {
            SessionStage::Active
        }
    }
}
