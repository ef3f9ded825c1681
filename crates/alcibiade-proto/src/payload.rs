use crate::{Opcode, ProtoError};
use bytes::{Buf, BufMut, BytesMut};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Highlighted span of the caller's document, in character offsets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    #[serde(default)]
    pub start: usize,
    #[serde(default)]
    pub end: usize,
    #[serde(default)]
    pub text: String,
}

/// Partial conversation config. Unknown keys (e.g. `reasoningMode`) are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_window: Option<i64>,
    #[serde(default, rename = "useRAG", skip_serializing_if = "Option::is_none")]
    pub use_rag: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskPayload {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub selection: Option<Selection>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub config: Option<ConfigPatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConfigPayload {
    pub conversation_id: String,
    pub config: ConfigPatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub message: String,
}

/// Single reply shape for every request: `{ok: true, text}` or `{ok: false, error}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskReply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AskReply {
    pub fn success(text: impl Into<String>) -> Self {
        Self { ok: true, text: Some(text.into()), error: None }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self { ok: false, text: None, error: Some(error.into()) }
    }

    pub fn into_result(self) -> Result<String, String> {
        if self.ok {
            Ok(self.text.unwrap_or_default())
        } else {
            Err(self.error.unwrap_or_default())
        }
    }
}

pub fn encode_frame(op: Opcode, payload: &[u8]) -> BytesMut {
    // frame: [u32 len][u8 opcode][payload]
    let len = 1 + payload.len();
    let mut out = BytesMut::with_capacity(4 + len);
    out.put_u32_le(len as u32);
    out.put_u8(op as u8);
    out.extend_from_slice(payload);
    out
}

pub fn encode_json_frame<T: Serialize>(op: Opcode, value: &T) -> Result<BytesMut, ProtoError> {
    let payload = serde_json::to_vec(value)?;
    Ok(encode_frame(op, &payload))
}

/// Splits a full frame (length prefix included) into its opcode and payload.
pub fn decode_frame(mut frame: &[u8]) -> Result<(Opcode, &[u8]), ProtoError> {
    if frame.remaining() < 5 {
        return Err(ProtoError::InvalidFrame("frame shorter than header".into()));
    }
    let len = frame.get_u32_le() as usize;
    if len == 0 || frame.remaining() != len {
        return Err(ProtoError::InvalidFrame(format!(
            "declared length {} but {} bytes follow",
            len,
            frame.remaining()
        )));
    }
    let op = Opcode::try_from(frame.get_u8())?;
    Ok((op, frame))
}

pub fn decode_json<T: DeserializeOwned>(payload: &[u8]) -> Result<T, ProtoError> {
    if payload.is_empty() {
        return Err(ProtoError::BadPayload);
    }
    Ok(serde_json::from_slice(payload)?)
}
