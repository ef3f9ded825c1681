use alcibiade_proto::{
    decode_frame, decode_json, encode_json_frame, AskPayload, AskReply, ConfigPatch, Opcode,
    ProtoError, StatusPayload, UpdateConfigPayload,
};
use bytes::BytesMut;
use serde::Serialize;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

use super::framing::read_frame;

const DEFAULT_MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Desktop-side connection to the IPC server
pub struct IpcClient {
    stream: UnixStream,
    buf: BytesMut,
    max_frame_bytes: usize,
}

impl IpcClient {
    /// Connect to the server at the given socket path
    pub async fn connect<P: AsRef<Path>>(path: P) -> Result<Self, ProtoError> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self {
            stream,
            buf: BytesMut::with_capacity(4096),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        })
    }

    /// Send an ask. `on_status` receives every `ai:status` message pushed
    /// before the reply arrives.
    pub async fn ask<F>(&mut self, payload: &AskPayload, mut on_status: F) -> Result<AskReply, ProtoError>
    where
        F: FnMut(String),
    {
        self.send(Opcode::Ask, payload).await?;
        loop {
            let (opcode, body) = self.read_message().await?;
            match opcode {
                Opcode::Status => {
                    let status: StatusPayload = decode_json(&body)?;
                    on_status(status.message);
                }
                Opcode::Reply => return decode_json(&body),
                other => {
                    return Err(ProtoError::InvalidFrame(format!(
                        "unexpected {:?} frame from server",
                        other
                    )))
                }
            }
        }
    }

    pub async fn update_config(
        &mut self,
        conversation_id: &str,
        config: ConfigPatch,
    ) -> Result<AskReply, ProtoError> {
        let payload = UpdateConfigPayload {
            conversation_id: conversation_id.to_string(),
            config,
        };
        self.send(Opcode::UpdateConfig, &payload).await?;
        self.expect_reply().await
    }

    pub async fn ping(&mut self) -> Result<AskReply, ProtoError> {
        self.send_frame(Opcode::Ping, &[]).await?;
        self.expect_reply().await
    }

    async fn send<T: Serialize>(&mut self, opcode: Opcode, payload: &T) -> Result<(), ProtoError> {
        let frame = encode_json_frame(opcode, payload)?;
        self.stream.write_all(&frame).await?;
        Ok(())
    }

    async fn send_frame(&mut self, opcode: Opcode, payload: &[u8]) -> Result<(), ProtoError> {
        let frame = alcibiade_proto::encode_frame(opcode, payload);
        self.stream.write_all(&frame).await?;
        Ok(())
    }

    async fn read_message(&mut self) -> Result<(Opcode, Vec<u8>), ProtoError> {
        let frame = read_frame(&mut self.stream, self.max_frame_bytes, &mut self.buf)
            .await?
            .ok_or_else(|| ProtoError::InvalidFrame("server closed the connection".into()))?;
        let (opcode, payload) = decode_frame(&frame)?;
        Ok((opcode, payload.to_vec()))
    }

    async fn expect_reply(&mut self) -> Result<AskReply, ProtoError> {
        loop {
            let (opcode, body) = self.read_message().await?;
            match opcode {
                Opcode::Reply => return decode_json(&body),
                // status frames only accompany asks
                Opcode::Status => continue,
                other => {
                    return Err(ProtoError::InvalidFrame(format!(
                        "unexpected {:?} frame from server",
                        other
                    )))
                }
            }
        }
    }
}
