use little_chat_model::{ModelMessage, ModelRequest};
use serde::{Deserialize, Serialize};

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentChunk {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

impl Candidate {
    /// Concatenates all text parts of this candidate.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .flat_map(|content| &content.parts)
            .filter_map(|part| part.text.as_deref())
            .collect()
    }
}

// ----------------------------
// Types shared by both streams
// ----------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
}

// -----------
// Conversions
// -----------

const USER_ROLE: &str = "user";
const MODEL_ROLE: &str = "model";

/// Converts the history into Gemini contents.
///
/// Gemini expects turns to alternate between `user` and `model`, so
/// consecutive messages of the same role (e.g. a retry after a failed turn)
/// are merged into one content with several parts. System messages are
/// collected into the system instruction.
pub fn create_request(req: &ModelRequest) -> GenerateContentRequest {
    let mut contents: Vec<Content> = Vec::new();
    let mut system_parts = Vec::new();

    for msg in &req.messages {
        let role = match msg {
            ModelMessage::System(text) => {
                system_parts.push(text_part(text));
                continue;
            }
            ModelMessage::User(_) => USER_ROLE,
            ModelMessage::Assistant(_) => MODEL_ROLE,
        };
        let part = text_part(msg.text());
        match contents.last_mut() {
            Some(last) if last.role.as_deref() == Some(role) => {
                last.parts.push(part);
            }
            _ => contents.push(Content {
                role: Some(role.to_owned()),
                parts: vec![part],
            }),
        }
    }

    GenerateContentRequest {
        contents,
        system_instruction: if system_parts.is_empty() {
            None
        } else {
            Some(Content {
                role: None,
                parts: system_parts,
            })
        },
    }
}

#[inline]
fn text_part(text: &str) -> Part {
    Part {
        text: Some(text.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_create_request() {
        let request = ModelRequest::with_messages([
            ModelMessage::System("You are PhoGPT.".to_owned()),
            ModelMessage::User("Hello".to_owned()),
            ModelMessage::Assistant("Hi there".to_owned()),
            ModelMessage::User("First try".to_owned()),
            ModelMessage::User("Second try".to_owned()),
        ]);
        let payload = serde_json::to_value(create_request(&request)).unwrap();
        assert_eq!(
            payload,
            json!({
                "contents": [
                    { "role": "user", "parts": [{ "text": "Hello" }] },
                    { "role": "model", "parts": [{ "text": "Hi there" }] },
                    {
                        "role": "user",
                        "parts": [
                            { "text": "First try" },
                            { "text": "Second try" }
                        ]
                    }
                ],
                "systemInstruction": {
                    "parts": [{ "text": "You are PhoGPT." }]
                }
            })
        );
    }

    #[test]
    fn test_parse_chunk() {
        let chunk: GenerateContentChunk = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"4"},{"text":"!"}],"role":"model"},"finishReason":"STOP","index":0}],"modelVersion":"gemini-pro"}"#,
        )
        .unwrap();
        assert_eq!(chunk.candidates[0].text(), "4!");
        assert_eq!(chunk.candidates[0].finish_reason.as_deref(), Some("STOP"));
        assert!(chunk.prompt_feedback.is_none());
    }
}
