//! Desktop IPC over a Unix-domain socket
//!
//! Frames are `[u32 LE len][u8 opcode][JSON payload]`. Requests on one
//! connection are handled in order; each gets exactly one `Reply` frame.
//! `Status` frames may be pushed while an ask is backing off.

pub mod client;
pub mod framing;

use alcibiade_proto::{
    decode_frame, decode_json, encode_json_frame, AskPayload, AskReply, Opcode, ProtoError,
    StatusPayload, UpdateConfigPayload,
};
use bytes::BytesMut;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::IpcConfig;
use crate::services::{AskError, AskRequest, AskService, StatusSink};
use crate::utils::error::EMPTY_PROMPT_REPLY;
use framing::read_frame;

pub use client::IpcClient;

/// Reply text for frames that cannot be decoded
pub const INVALID_FRAME_REPLY: &str = "Invalid IPC frame";

pub struct IpcContext {
    pub ask_service: Arc<AskService>,
    pub max_frame_bytes: usize,
}

/// Bind the socket, replacing a stale socket file from a previous run
pub fn bind(path: &Path) -> anyhow::Result<UnixListener> {
    if path.exists() {
        std::fs::remove_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to remove stale socket {}: {}", path.display(), e))?;
    }
    let listener = UnixListener::bind(path)?;
    info!("IPC listening on {}", path.display());
    Ok(listener)
}

pub async fn run(config: &IpcConfig, ask_service: Arc<AskService>) -> anyhow::Result<()> {
    let listener = bind(&config.socket_path)?;
    let ctx = Arc::new(IpcContext {
        ask_service,
        max_frame_bytes: config.max_frame_bytes,
    });
    serve(listener, ctx).await
}

pub async fn serve(listener: UnixListener, ctx: Arc<IpcContext>) -> anyhow::Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let c = ctx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, c).await {
                        error!("IPC connection error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("IPC accept error: {}", e);
            }
        }
    }
}

/// Pushes retry notices to the client as `Status` frames
pub struct ChannelStatusSink {
    tx: mpsc::UnboundedSender<BytesMut>,
}

impl StatusSink for ChannelStatusSink {
    fn notify(&self, message: &str) {
        let payload = StatusPayload {
            message: message.to_string(),
        };
        match encode_json_frame(Opcode::Status, &payload) {
            // a closed channel means the client left; the notice is dropped
            Ok(frame) => {
                let _ = self.tx.send(frame);
            }
            Err(e) => warn!("Failed to encode status frame: {}", e),
        }
    }
}

async fn handle_connection(stream: UnixStream, ctx: Arc<IpcContext>) -> anyhow::Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<BytesMut>();

    let writer_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = writer.write_all(&frame).await {
                debug!("IPC write failed: {}", e);
                break;
            }
        }
    });

    let status = ChannelStatusSink { tx: tx.clone() };
    let mut buf = BytesMut::with_capacity(4096);

    let result = loop {
        let frame = match read_frame(&mut reader, ctx.max_frame_bytes, &mut buf).await {
            Ok(Some(f)) => f,
            Ok(None) => break Ok(()), // EOF
            Err(e) => break Err(e),
        };

        let reply = handle_frame(&frame, &ctx, &status).await;
        let encoded = encode_json_frame(Opcode::Reply, &reply)?;
        if tx.send(encoded).is_err() {
            break Ok(());
        }
    };

    drop(status);
    drop(tx);
    writer_task.await.ok();

    result.map_err(Into::into)
}

async fn handle_frame(frame: &[u8], ctx: &IpcContext, status: &ChannelStatusSink) -> AskReply {
    let (opcode, payload) = match decode_frame(frame) {
        Ok(parts) => parts,
        Err(e) => {
            warn!("Rejected IPC frame: {}", e);
            return AskReply::failure(INVALID_FRAME_REPLY);
        }
    };

    match opcode {
        Opcode::Ask => match decode_json::<AskPayload>(payload) {
            Ok(ask) => handle_ask(ask, ctx, status).await,
            Err(e) => bad_payload(opcode, e),
        },
        Opcode::UpdateConfig => match decode_json::<UpdateConfigPayload>(payload) {
            Ok(update) => handle_update_config(update, ctx),
            Err(e) => bad_payload(opcode, e),
        },
        Opcode::Ping => AskReply::success("pong"),
        Opcode::Reply | Opcode::Status => {
            AskReply::failure(format!("{} frames are server-to-client only", opcode.channel()))
        }
    }
}

async fn handle_ask(ask: AskPayload, ctx: &IpcContext, status: &ChannelStatusSink) -> AskReply {
    let request = AskRequest {
        prompt: ask.prompt.unwrap_or_default(),
        document: ask.text,
        selection: ask.selection,
        conversation_id: ask.conversation_id,
        config: ask.config,
    };

    match ctx.ask_service.ask(request, status).await {
        Ok(answer) => {
            debug!(
                conversation_id = %answer.conversation_id,
                source = ?answer.source,
                "IPC ask answered"
            );
            AskReply::success(answer.text)
        }
        Err(AskError::EmptyPrompt) => {
            warn!("Rejected IPC ask without prompt");
            AskReply::failure(EMPTY_PROMPT_REPLY)
        }
    }
}

fn handle_update_config(update: UpdateConfigPayload, ctx: &IpcContext) -> AskReply {
    let config = ctx
        .ask_service
        .store()
        .update_config(&update.conversation_id, &update.config);
    match serde_json::to_string(&config) {
        Ok(json) => AskReply::success(json),
        Err(e) => {
            error!("Failed to serialize conversation config: {}", e);
            AskReply::failure("Failed to update conversation config")
        }
    }
}

fn bad_payload(opcode: Opcode, err: ProtoError) -> AskReply {
    warn!("Bad {} payload: {}", opcode.channel(), err);
    AskReply::failure(format!("Invalid {} payload", opcode.channel()))
}
