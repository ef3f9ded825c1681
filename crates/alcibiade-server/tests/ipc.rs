mod common;

use alcibiade_proto::{encode_frame, AskPayload, ConfigPatch, Opcode};
use alcibiade_server::ipc::{self, IpcClient, IpcContext, INVALID_FRAME_REPLY};
use alcibiade_server::services::conversation::ConversationStore;
use alcibiade_server::utils::error::EMPTY_PROMPT_REPLY;
use alcibiade_server::AppState;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

use common::{offline_state, overloaded, scripted_state, ScriptedBackend};

fn socket_path() -> PathBuf {
    std::env::temp_dir().join(format!("alcibiade-test-{}.sock", uuid::Uuid::new_v4()))
}

/// Start an IPC server for `state` on a fresh socket
async fn start(state: &AppState) -> PathBuf {
    let path = socket_path();
    let listener = ipc::bind(&path).unwrap();
    let ctx = Arc::new(IpcContext {
        ask_service: state.ask_service.clone(),
        max_frame_bytes: 64 * 1024,
    });
    tokio::spawn(ipc::serve(listener, ctx));
    path
}

fn ask(prompt: &str) -> AskPayload {
    AskPayload {
        prompt: Some(prompt.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_ping() {
    let state = offline_state();
    let path = start(&state).await;
    let mut client = IpcClient::connect(&path).await.unwrap();

    let reply = client.ping().await.unwrap();
    assert_eq!(reply.into_result(), Ok("pong".to_string()));
}

#[tokio::test]
async fn test_ask_falls_back_without_backend() {
    let state = offline_state();
    let path = start(&state).await;
    let mut client = IpcClient::connect(&path).await.unwrap();

    let mut statuses = Vec::new();
    let reply = client
        .ask(&ask("2+2=?"), |m| statuses.push(m))
        .await
        .unwrap();

    let text = reply.into_result().unwrap();
    assert!(text.contains("2+2=?"));
    assert!(statuses.is_empty());
}

#[tokio::test]
async fn test_empty_prompt_fails_with_same_reply_shape() {
    let state = offline_state();
    let path = start(&state).await;
    let mut client = IpcClient::connect(&path).await.unwrap();

    let reply = client.ask(&AskPayload::default(), |_| {}).await.unwrap();
    assert!(!reply.ok);
    assert_eq!(reply.error.as_deref(), Some(EMPTY_PROMPT_REPLY));

    // connection stays usable after a failure
    assert!(client.ping().await.unwrap().ok);
}

#[tokio::test]
async fn test_malformed_ask_payload_gets_generic_failure_reply() {
    let state = offline_state();
    let path = start(&state).await;

    let mut raw = UnixStream::connect(&path).await.unwrap();
    raw.write_all(&encode_frame(Opcode::Ask, b"{not json"))
        .await
        .unwrap();

    let mut buf = bytes::BytesMut::new();
    let reply = ipc::framing::read_frame(&mut raw, 1024, &mut buf)
        .await
        .unwrap()
        .unwrap();
    let (_, payload) = alcibiade_proto::decode_frame(&reply).unwrap();
    let reply: alcibiade_proto::AskReply = alcibiade_proto::decode_json(payload).unwrap();
    assert!(!reply.ok);
    assert_eq!(reply.error.as_deref(), Some("Invalid ai:ask payload"));
}

#[tokio::test]
async fn test_retry_status_frames_precede_reply() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        Err(overloaded()),
        Ok(json!({"text": "Enfin, le vin."})),
    ]));
    let state = scripted_state(backend.clone(), 5);
    let path = start(&state).await;
    let mut client = IpcClient::connect(&path).await.unwrap();

    let mut statuses = Vec::new();
    let reply = client
        .ask(&ask("Parle-moi du vin"), |m| statuses.push(m))
        .await
        .unwrap();

    assert_eq!(reply.into_result(), Ok("Enfin, le vin.".to_string()));
    assert_eq!(statuses.len(), 1);
    assert!(statuses[0].starts_with("Model overloaded, retrying in"));
    assert!(statuses[0].contains("(attempt 2/3)"));
    assert_eq!(backend.prompts.lock().len(), 2);
}

#[tokio::test]
async fn test_config_and_history_per_conversation() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        Ok(json!("a1")),
        Ok(json!("a2")),
        Ok(json!("a3")),
    ]));
    let state = scripted_state(backend, 5);
    let path = start(&state).await;
    let mut client = IpcClient::connect(&path).await.unwrap();

    let reply = client
        .update_config(
            "conv_1",
            ConfigPatch {
                memory_window: Some(2),
                use_rag: Some(false),
            },
        )
        .await
        .unwrap();
    let config: serde_json::Value = serde_json::from_str(&reply.into_result().unwrap()).unwrap();
    assert_eq!(config, json!({"memoryWindow": 2, "useRAG": false}));

    for i in 1..=3 {
        let mut payload = ask(&format!("q{}", i));
        payload.conversation_id = Some("conv_1".to_string());
        let reply = client.ask(&payload, |_| {}).await.unwrap();
        assert_eq!(reply.into_result(), Ok(format!("a{}", i)));
    }

    let history: Vec<String> = state
        .store
        .get("conv_1")
        .history
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(history, vec!["q2", "a2", "q3", "a3"]);
}

#[tokio::test]
async fn test_unknown_opcode_gets_generic_failure_reply() {
    let state = offline_state();
    let path = start(&state).await;

    let mut raw = UnixStream::connect(&path).await.unwrap();
    let mut frame = encode_frame(Opcode::Ping, b"");
    frame[4] = 0x33;
    raw.write_all(&frame).await.unwrap();

    let mut buf = bytes::BytesMut::new();
    let reply = ipc::framing::read_frame(&mut raw, 1024, &mut buf)
        .await
        .unwrap()
        .unwrap();
    let (opcode, payload) = alcibiade_proto::decode_frame(&reply).unwrap();
    assert_eq!(opcode, Opcode::Reply);
    let reply: alcibiade_proto::AskReply = alcibiade_proto::decode_json(payload).unwrap();
    assert!(!reply.ok);
    let error = reply.error.unwrap();
    assert_eq!(error, INVALID_FRAME_REPLY);
    assert!(!error.contains("0x33"));
}
