use serde::{Deserialize, Serialize};

use crate::capture::CaptureRequest;
use crate::error::ControlError;

/// Out-of-band instruction for a running pipeline.
///
/// Encoded as JSON objects tagged by `"type"`:
///
/// ```json
/// {"type": "capture", "frames": 3, "path": "shots/scene"}
/// {"type": "write", "hex": "0a000000 1000"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Record the next `frames` frames under `path`.
    Capture {
        frames: u32,
        #[serde(default)]
        path: String,
    },
    /// Write raw bytes back to the link.
    Write { hex: String },
}

/// A decoded control message, ready for the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlAction {
    Capture(CaptureRequest),
    Write(Vec<u8>),
}

impl ControlMessage {
    /// Parse one JSON line.
    pub fn parse(line: &str) -> Result<Self, ControlError> {
        Ok(serde_json::from_str(line.trim())?)
    }

    pub fn capture(frames: u32, path: impl Into<String>) -> Self {
        Self::Capture {
            frames,
            path: path.into(),
        }
    }

    pub fn write(bytes: &[u8]) -> Self {
        Self::Write {
            hex: hex::encode(bytes),
        }
    }

    /// Decode into an action. Whitespace inside `hex` is ignored.
    pub fn into_action(self) -> Result<ControlAction, ControlError> {
        match self {
            Self::Capture { frames, path } => {
                Ok(ControlAction::Capture(CaptureRequest::new(frames, path)))
            }
            Self::Write { hex } => {
                let bytes = decode_hex(&hex)?;
                if bytes.is_empty() {
                    return Err(ControlError::EmptyCommand);
                }
                Ok(ControlAction::Write(bytes))
            }
        }
    }
}

/// Decode hex, ignoring whitespace and an optional `0x` prefix.
pub fn decode_hex(text: &str) -> Result<Vec<u8>, ControlError> {
    let text = text.trim();
    let text = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(hex::decode(compact)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_message_roundtrip() {
        let msg = ControlMessage::parse(r#"{"type":"capture","frames":3,"path":"shots/scene"}"#)
            .unwrap();
        assert_eq!(msg, ControlMessage::capture(3, "shots/scene"));

        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"capture","frames":3,"path":"shots/scene"}"#);

        assert_eq!(
            msg.into_action().unwrap(),
            ControlAction::Capture(CaptureRequest::new(3, "shots/scene"))
        );
    }

    #[test]
    fn capture_path_defaults_to_empty() {
        let msg = ControlMessage::parse(r#"{"type":"capture","frames":1}"#).unwrap();
        assert_eq!(msg, ControlMessage::capture(1, ""));
    }

    #[test]
    fn write_message_decodes_hex() {
        let msg = ControlMessage::parse(r#" {"type":"write","hex":"0a000000 1000"} "#).unwrap();
        assert_eq!(
            msg.into_action().unwrap(),
            ControlAction::Write(vec![0x0a, 0, 0, 0, 0x10, 0])
        );
        assert_eq!(ControlMessage::write(&[0xde, 0xad]), ControlMessage::Write {
            hex: "dead".to_string()
        });
    }

    #[test]
    fn bad_messages_rejected() {
        assert!(matches!(
            ControlMessage::parse(r#"{"type":"reboot"}"#),
            Err(ControlError::Json(_))
        ));
        assert!(matches!(
            ControlMessage::parse(r#"{"type":"write","hex":"zz"}"#)
                .unwrap()
                .into_action(),
            Err(ControlError::Hex(_))
        ));
        assert!(matches!(
            ControlMessage::parse(r#"{"type":"write","hex":""}"#)
                .unwrap()
                .into_action(),
            Err(ControlError::EmptyCommand)
        ));
    }

    #[test]
    fn hex_prefix_accepted() {
        assert_eq!(decode_hex("0xAB cd").unwrap(), vec![0xab, 0xcd]);
        assert!(decode_hex("abc").is_err());
    }
}
