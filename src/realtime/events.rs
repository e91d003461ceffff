//! Inbound realtime event types.

use serde_json::Value;

use crate::audio::types::parse_pcm_mime_type;

/// A message from the remote agent, reduced to what the session acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Base64 PCM16 speech from the agent. `format` is the
    /// `(sample_rate, channels)` the agent declared, if it declared one.
    AudioData {
        data: String,
        format: Option<(u32, u16)>,
    },
    /// The agent detected the user talking over it; stop playback now.
    Interrupted,
    /// Anything else. Ignored by the session.
    Unknown,
}

impl InboundEvent {
    /// Parse a server payload into a typed event.
    ///
    /// Understands the flat `{ audioData, interrupted }` shape and the nested
    /// `serverContent` shape. When a payload carries both an interruption and
    /// audio, the interruption wins: that audio belongs to the cut-off turn.
    pub fn from_payload(payload: &Value) -> Self {
        let interrupted = bool_field(payload, "interrupted")
            || bool_at(payload, &["serverContent", "interrupted"]);
        if interrupted {
            return Self::Interrupted;
        }

        string_field(payload, "audioData")
            .map(|data| {
                let format = declared_format(payload.get("mimeType").and_then(Value::as_str));
                (data, format)
            })
            .or_else(|| nested_inline_audio(payload))
            .map(|(data, format)| Self::AudioData { data, format })
            .unwrap_or(Self::Unknown)
    }

    /// Audio with no declared format; played at the configured output format.
    pub fn audio(data: impl Into<String>) -> Self {
        Self::AudioData {
            data: data.into(),
            format: None,
        }
    }

    /// Parse raw message text. Text that is not JSON is treated as `Unknown`.
    pub fn from_text(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => Self::from_payload(&value),
            Err(error) => {
                tracing::debug!(%error, "ignoring non-JSON realtime message");
                Self::Unknown
            }
        }
    }
}

/// Connection-level events, in the order the transport observed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(InboundEvent),
    Error { message: String },
    Closed,
}

fn nested_inline_audio(payload: &Value) -> Option<(String, Option<(u32, u16)>)> {
    let parts = payload
        .get("serverContent")?
        .get("modelTurn")?
        .get("parts")?
        .as_array()?;
    parts.iter().find_map(|part| {
        let inline = part.get("inlineData")?;
        let mime = inline.get("mimeType").and_then(Value::as_str);
        if mime.is_some_and(|mime| !mime.starts_with("audio/")) {
            return None;
        }
        string_field(inline, "data").map(|data| (data, declared_format(mime)))
    })
}

fn declared_format(mime: Option<&str>) -> Option<(u32, u16)> {
    match parse_pcm_mime_type(mime?) {
        Ok(format) => Some(format),
        Err(error) => {
            tracing::debug!(%error, "unusable audio format tag, using session output format");
            None
        }
    }
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

fn bool_field(value: &Value, field: &str) -> bool {
    value.get(field).and_then(Value::as_bool).unwrap_or(false)
}

fn bool_at(value: &Value, path: &[&str]) -> bool {
    let mut current = value;
    for key in path {
        match current.get(*key) {
            Some(next) => current = next,
            None => return false,
        }
    }
    current.as_bool().unwrap_or(false)
}
