// ABOUTME: Wire protocol spoken over room connections
// ABOUTME: Tagged client/server message types and inbound frame validation

use pairroom_config::Config;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const UNSUPPORTED_LANGUAGE: &str = "unsupported_language";
pub const EXECUTION_IN_PROGRESS: &str = "execution_in_progress";

const MAX_LANGUAGE_TAG_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid message: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("Binary frames are not supported")]
    BinaryFrame,
    #[error("{field} is {size} bytes, limit is {limit}")]
    TooLarge {
        field: &'static str,
        size: usize,
        limit: usize,
    },
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// Size limits applied to inbound frames before they reach a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    pub max_buffer_bytes: usize,
    pub max_source_bytes: usize,
}

impl FrameLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_buffer_bytes: config.max_buffer_bytes,
            max_source_bytes: config.execution.max_source_bytes,
        }
    }
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Messages a client may send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Edit { content: String },
    LanguageChange { language: String },
    CursorMove {
        #[serde(rename = "cursorPosition", default)]
        cursor_position: u64,
    },
    Run { code: String, language: String },
}

impl ClientMessage {
    /// Decode and validate one text frame
    pub fn parse(text: &str, limits: &FrameLimits) -> Result<Self, ProtocolError> {
        let message: ClientMessage = serde_json::from_str(text)?;
        message.validate(limits)?;
        Ok(message)
    }

    fn validate(&self, limits: &FrameLimits) -> Result<(), ProtocolError> {
        match self {
            ClientMessage::Edit { content } => {
                check_size("content", content, limits.max_buffer_bytes)
            }
            ClientMessage::LanguageChange { language } => check_language(language),
            ClientMessage::CursorMove { .. } => Ok(()),
            ClientMessage::Run { code, language } => {
                check_size("code", code, limits.max_source_bytes)?;
                check_language(language)
            }
        }
    }
}

fn check_size(field: &'static str, value: &str, limit: usize) -> Result<(), ProtocolError> {
    if value.len() > limit {
        return Err(ProtocolError::TooLarge {
            field,
            size: value.len(),
            limit,
        });
    }
    Ok(())
}

fn check_language(language: &str) -> Result<(), ProtocolError> {
    if language.trim().is_empty() {
        return Err(ProtocolError::Empty("language"));
    }
    check_size("language", language, MAX_LANGUAGE_TAG_BYTES)
}

/// Messages the server sends. Everything but `error` carries the room
/// version at the time it was emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Sync {
        content: String,
        language: String,
        version: u64,
    },
    BufferChanged {
        content: String,
        language: String,
        version: u64,
        from: String,
    },
    LanguageChanged {
        language: String,
        version: u64,
        from: String,
    },
    UserJoined {
        count: usize,
        version: u64,
    },
    UserLeft {
        count: usize,
        version: u64,
    },
    /// Sent to everyone but `from`
    CursorMove {
        #[serde(rename = "cursorPosition")]
        cursor_position: u64,
        from: String,
        version: u64,
    },
    ExecutionResult {
        success: bool,
        stdout: String,
        stderr: String,
        duration_ms: u64,
        timed_out: bool,
        truncated: bool,
        requested_by: Option<String>,
        version: u64,
    },
    Error {
        code: String,
        message: String,
    },
}

impl ServerMessage {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn limits() -> FrameLimits {
        FrameLimits {
            max_buffer_bytes: 64,
            max_source_bytes: 16,
        }
    }

    #[test]
    fn test_parse_client_messages() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"edit","content":"print(1)"}"#, &limits()).unwrap(),
            ClientMessage::Edit {
                content: "print(1)".to_string()
            }
        );
        assert_eq!(
            ClientMessage::parse(
                r#"{"type":"language_change","language":"javascript"}"#,
                &limits()
            )
            .unwrap(),
            ClientMessage::LanguageChange {
                language: "javascript".to_string()
            }
        );
        assert_eq!(
            ClientMessage::parse(
                r#"{"type":"run","code":"print(1)","language":"python"}"#,
                &limits()
            )
            .unwrap(),
            ClientMessage::Run {
                code: "print(1)".to_string(),
                language: "python".to_string()
            }
        );
    }

    #[test]
    fn test_parse_cursor_move() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"cursor_move","cursorPosition":42}"#, &limits())
                .unwrap(),
            ClientMessage::CursorMove {
                cursor_position: 42
            }
        );
        // The position defaults to the start of the buffer
        assert_eq!(
            ClientMessage::parse(r#"{"type":"cursor_move"}"#, &limits()).unwrap(),
            ClientMessage::CursorMove { cursor_position: 0 }
        );
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let message = ClientMessage::parse(
            r#"{"type":"edit","content":"x","cursorPosition":3}"#,
            &limits(),
        )
        .unwrap();
        assert_eq!(
            message,
            ClientMessage::Edit {
                content: "x".to_string()
            }
        );
    }

    #[test]
    fn test_malformed_frames_rejected() {
        for frame in [
            "not json",
            r#"{"content":"x"}"#,
            r#"{"type":"cursor_move","cursorPosition":-3}"#,
            r#"{"type":"run","code":"print(1)"}"#,
            r#"{"type":"edit","content":42}"#,
        ] {
            assert!(
                matches!(
                    ClientMessage::parse(frame, &limits()),
                    Err(ProtocolError::InvalidJson(_))
                ),
                "accepted {}",
                frame
            );
        }
    }

    #[test]
    fn test_oversized_payloads_rejected() {
        let edit = format!(r#"{{"type":"edit","content":"{}"}}"#, "x".repeat(65));
        assert!(matches!(
            ClientMessage::parse(&edit, &limits()),
            Err(ProtocolError::TooLarge {
                field: "content",
                size: 65,
                limit: 64
            })
        ));

        let run = format!(
            r#"{{"type":"run","code":"{}","language":"python"}}"#,
            "x".repeat(17)
        );
        assert!(matches!(
            ClientMessage::parse(&run, &limits()),
            Err(ProtocolError::TooLarge { field: "code", .. })
        ));
    }

    #[test]
    fn test_empty_language_rejected() {
        assert!(matches!(
            ClientMessage::parse(r#"{"type":"language_change","language":" "}"#, &limits()),
            Err(ProtocolError::Empty("language"))
        ));
    }

    #[test]
    fn test_server_message_wire_shape() {
        let json = ServerMessage::BufferChanged {
            content: "print(1)".to_string(),
            language: "python".to_string(),
            version: 1,
            from: "conn-a".to_string(),
        }
        .to_json()
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "type": "buffer_changed",
                "content": "print(1)",
                "language": "python",
                "version": 1,
                "from": "conn-a"
            })
        );

        let json = ServerMessage::UserJoined { count: 2, version: 0 }
            .to_json()
            .unwrap();
        assert_eq!(json, r#"{"type":"user_joined","count":2,"version":0}"#);

        let json = ServerMessage::CursorMove {
            cursor_position: 7,
            from: "conn-a".to_string(),
            version: 3,
        }
        .to_json()
        .unwrap();
        assert_eq!(
            json,
            r#"{"type":"cursor_move","cursorPosition":7,"from":"conn-a","version":3}"#
        );
    }
}
