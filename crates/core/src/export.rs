//! Plain-text chat log export.
//!
//! An exported chat log has one `"<ROLE>: <text>"` line per message, in
//! conversation order, e.g. `USER: Hi`.

use std::iter::FusedIterator;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::conversation::{Message, Transcript};
use crate::error::ExportError;

/// Lazily formats the messages of a transcript as export lines.
///
/// The iterator borrows the transcript and allocates nothing up front.
/// Clones advance independently.
#[derive(Clone, Debug)]
pub struct ExportLines<'a> {
    messages: std::slice::Iter<'a, Message>,
}

impl<'a> ExportLines<'a> {
    #[inline]
    pub fn new(transcript: &'a Transcript) -> Self {
        Self {
            messages: transcript.iter(),
        }
    }
}

impl Iterator for ExportLines<'_> {
    type Item = String;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.messages.next().map(format_line)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.messages.size_hint()
    }
}

impl ExactSizeIterator for ExportLines<'_> {}

impl FusedIterator for ExportLines<'_> {}

/// Formats one message as an export line.
///
/// Line breaks in the text are written as `\n` and `\r` and backslashes are
/// doubled, so every message takes exactly one line.
pub fn format_line(message: &Message) -> String {
    let mut line = format!("{}: ", message.role().label());
    for c in message.text().chars() {
        match c {
            '\\' => line.push_str("\\\\"),
            '\n' => line.push_str("\\n"),
            '\r' => line.push_str("\\r"),
            c => line.push(c),
        }
    }
    line
}

/// Returns the file name of a chat log exported at `at`.
pub fn export_file_name(at: DateTime<Local>) -> String {
    format!("chat_log_{}.txt", at.format("%Y%m%d_%H%M%S"))
}

/// Renders the whole export artifact.
pub fn render(lines: ExportLines<'_>) -> String {
    let mut contents = String::new();
    for line in lines {
        contents.push_str(&line);
        contents.push('\n');
    }
    contents
}

/// Writes the chat log of `transcript` into `dir` and returns its path.
pub async fn export_to_file(
    transcript: &Transcript,
    dir: &Path,
) -> Result<PathBuf, ExportError> {
    let path = dir.join(export_file_name(Local::now()));
    let contents = render(ExportLines::new(transcript));
    tokio::fs::write(&path, contents)
        .await
        .map_err(|source| ExportError::Io {
            path: path.clone(),
            source,
        })?;
    info!("exported {} messages to {}", transcript.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn transcript() -> Transcript {
        [Message::user("Hi"), Message::assistant("Hello")]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_lines() {
        let transcript = transcript();
        let lines: Vec<_> = ExportLines::new(&transcript).collect();
        assert_eq!(lines, vec!["USER: Hi", "ASSISTANT: Hello"]);
        assert_eq!(ExportLines::new(&transcript).len(), 2);
    }

    #[test]
    fn test_multiline_text_stays_on_one_line() {
        let transcript: Transcript = [
            Message::user("List two\r\nfruits"),
            Message::assistant("1. apple\n2. pear\nC:\\fruit"),
        ]
        .into_iter()
        .collect();
        let contents = render(ExportLines::new(&transcript));
        assert_eq!(
            contents,
            "USER: List two\\r\\nfruits\n\
             ASSISTANT: 1. apple\\n2. pear\\nC:\\\\fruit\n"
        );
        assert_eq!(contents.lines().count(), transcript.len());
    }

    #[test]
    fn test_empty_transcript() {
        let transcript = Transcript::default();
        assert_eq!(ExportLines::new(&transcript).next(), None);
        assert_eq!(render(ExportLines::new(&transcript)), "");
    }

    #[test]
    fn test_file_name() {
        let at = Local.with_ymd_and_hms(2026, 10, 18, 9, 5, 3).unwrap();
        assert_eq!(export_file_name(at), "chat_log_20261018_090503.txt");
    }

    #[tokio::test]
    async fn test_export_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = export_to_file(&transcript(), dir.path()).await.unwrap();
        assert!(
            path.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("chat_log_")
        );
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "USER: Hi\nASSISTANT: Hello\n");
    }

    #[tokio::test]
    async fn test_export_into_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = export_to_file(&transcript(), &dir.path().join("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Io { .. }));
    }
}
