//! Stream Handler - WebSocket 流式合成会话
//!
//! 协议：客户端先发 start，之后任意多条 text，空 content 或 end 结束。
//! 服务端下发二进制 s16le PCM 帧，穿插 JSON 事件
//! (started / segment / end / error)。
//!
//! 出站消息统一经过一个有界通道，由独占 sink 的写入任务发送，
//! PCM 帧与事件保持产生顺序。

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::application::{SpeechError, StreamingSession};
use crate::domain::pcm_bytes;

use super::super::dto::{ClientMessage, SessionEvent};
use super::super::state::AppState;

/// 会话终止方式
enum SessionEnd {
    /// 客户端断开或关闭，无需回执
    ClientGone,
    /// 失败，应回 error 事件
    Failed(String),
}

/// GET /v1/audio/stream
pub async fn stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_stream_socket(socket, state))
}

async fn handle_stream_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let (msg_tx, mut msg_rx) = mpsc::channel::<Message>(32);
    let writer = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    run_session(&mut receiver, &msg_tx, &state).await;

    // 关闭出站通道，写入任务发完缓冲后关 socket
    drop(msg_tx);
    let _ = writer.await;
}

/// 驱动会话到结束；失败时补发 error 事件
async fn run_session<S>(receiver: &mut S, msg_tx: &mpsc::Sender<Message>, state: &Arc<AppState>)
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    if let Err(SessionEnd::Failed(message)) = drive_session(receiver, msg_tx, state).await {
        let _ = send_event(msg_tx, &SessionEvent::Error { message }).await;
    }
}

/// 等待 start 消息、打开会话并驱动到结束
async fn drive_session<S>(
    receiver: &mut S,
    msg_tx: &mpsc::Sender<Message>,
    state: &Arc<AppState>,
) -> Result<(), SessionEnd>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    // 第一条业务消息必须是 start
    let (voice_id, speed, mode) = loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => {
                let msg: ClientMessage = serde_json::from_str(&text)
                    .map_err(|e| SessionEnd::Failed(format!("invalid message: {}", e)))?;
                match msg {
                    ClientMessage::Start {
                        voice,
                        speed,
                        boundary,
                    } => {
                        let voice = voice.unwrap_or_else(|| state.default_voice.clone());
                        break (voice, speed, boundary.unwrap_or_default());
                    }
                    _ => {
                        return Err(SessionEnd::Failed(
                            "expected start message first".to_string(),
                        ))
                    }
                }
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => return Err(SessionEnd::ClientGone),
            Some(Ok(_)) => {
                return Err(SessionEnd::Failed(
                    "expected text message before session start".to_string(),
                ))
            }
            Some(Err(e)) => {
                tracing::debug!(error = %e, "WebSocket error before session start");
                return Err(SessionEnd::ClientGone);
            }
        }
    };

    let mut session = state
        .speech
        .open_session(&voice_id, mode, speed)
        .await
        .map_err(|e| SessionEnd::Failed(e.to_string()))?;

    send_event(
        msg_tx,
        &SessionEvent::Started {
            session_id: session.id(),
            sample_rate: session.sample_rate(),
            voice: voice_id,
        },
    )
    .await
    .map_err(|_| SessionEnd::ClientGone)?;

    let result = pump_session(receiver, msg_tx, state, &mut session).await;
    state.speech.close_session(&session);
    result
}

/// 文本进、音频出的主循环
async fn pump_session<S>(
    receiver: &mut S,
    msg_tx: &mpsc::Sender<Message>,
    state: &Arc<AppState>,
    session: &mut StreamingSession,
) -> Result<(), SessionEnd>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => {
                let msg: ClientMessage = serde_json::from_str(&text)
                    .map_err(|e| SessionEnd::Failed(format!("invalid message: {}", e)))?;
                match msg {
                    ClientMessage::Text { content } if content.is_empty() => {
                        return finish_session(msg_tx, state, session).await;
                    }
                    ClientMessage::Text { content } => {
                        for segment in session.ingest(&content) {
                            synthesize_to_socket(msg_tx, state, session, &segment).await?;
                        }
                    }
                    ClientMessage::End => {
                        return finish_session(msg_tx, state, session).await;
                    }
                    ClientMessage::Start { .. } => {
                        return Err(SessionEnd::Failed("session already started".to_string()));
                    }
                }
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            // 未收到 end 就断开视为取消，残余文本不冲洗
            Some(Ok(Message::Close(_))) | None => {
                tracing::debug!(session_id = %session.id(), "Stream session cancelled by client");
                return Err(SessionEnd::ClientGone);
            }
            Some(Ok(_)) => {
                return Err(SessionEnd::Failed("unexpected binary message".to_string()));
            }
            Some(Err(e)) => {
                tracing::debug!(session_id = %session.id(), error = %e, "WebSocket error");
                return Err(SessionEnd::ClientGone);
            }
        }
    }
}

/// 冲洗残余文本并发送 end 事件
async fn finish_session(
    msg_tx: &mpsc::Sender<Message>,
    state: &Arc<AppState>,
    session: &mut StreamingSession,
) -> Result<(), SessionEnd> {
    if let Some(residual) = session.flush() {
        synthesize_to_socket(msg_tx, state, session, &residual).await?;
    }
    send_event(
        msg_tx,
        &SessionEvent::End {
            segments: session.segment_count(),
        },
    )
    .await
    .map_err(|_| SessionEnd::ClientGone)?;
    Ok(())
}

/// 合成一个片段并把 PCM 帧转发到出站通道
///
/// 合成与转发并发进行，片段完成后补发 segment 事件；
/// 出站通道关闭会传导为合成取消
async fn synthesize_to_socket(
    msg_tx: &mpsc::Sender<Message>,
    state: &Arc<AppState>,
    session: &mut StreamingSession,
    segment: &str,
) -> Result<(), SessionEnd> {
    let (tx, mut rx) = mpsc::channel::<Vec<i16>>(8);

    let forward = async {
        while let Some(pcm) = rx.recv().await {
            if msg_tx
                .send(Message::Binary(pcm_bytes(&pcm)))
                .await
                .is_err()
            {
                // 写入任务已退出；拒收后续块让合成侧观察到取消
                rx.close();
                break;
            }
        }
    };
    let synthesize = async {
        let result = session.synthesize_segment(segment, &tx).await;
        drop(tx);
        result
    };

    let (result, ()) = tokio::join!(synthesize, forward);
    let stats = match result {
        Ok(stats) => stats,
        Err(SpeechError::Cancelled) => return Err(SessionEnd::ClientGone),
        Err(e) => return Err(SessionEnd::Failed(e.to_string())),
    };

    state.speech.record_segment(session);
    send_event(
        msg_tx,
        &SessionEvent::Segment {
            index: stats.index,
            samples: stats.samples,
        },
    )
    .await
    .map_err(|_| SessionEnd::ClientGone)?;
    Ok(())
}

async fn send_event(
    msg_tx: &mpsc::Sender<Message>,
    event: &SessionEvent,
) -> Result<(), mpsc::error::SendError<Message>> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize session event");
            return Ok(());
        }
    };
    msg_tx.send(Message::Text(json)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{
        AudioFormat, VoiceError, VoiceInfo, VoiceKind, VoiceRef, VoiceStorePort,
    };
    use crate::application::{AudioOptions, SpeechService};
    use crate::infrastructure::adapters::tts::{FakeTtsEngine, FakeTtsEngineConfig};
    use crate::infrastructure::adapters::PcmEncoder;
    use crate::infrastructure::memory::{ModelManager, SessionRegistry};
    use async_trait::async_trait;
    use futures_util::stream;
    use std::path::PathBuf;

    struct StaticVoiceStore;

    #[async_trait]
    impl VoiceStorePort for StaticVoiceStore {
        async fn resolve(&self, voice_id: &str) -> Result<VoiceRef, VoiceError> {
            if voice_id != "nature" {
                return Err(VoiceError::NotFound(voice_id.to_string()));
            }
            Ok(VoiceRef {
                id: voice_id.to_string(),
                kind: VoiceKind::ReferencePair {
                    audio_path: PathBuf::from("voices/nature.wav"),
                    transcript: "reference".to_string(),
                },
            })
        }

        async fn list(&self) -> Result<Vec<VoiceInfo>, VoiceError> {
            Ok(vec![])
        }
    }

    fn test_state(engine: Arc<FakeTtsEngine>) -> Arc<AppState> {
        let manager = ModelManager::new(engine.clone(), 300);
        let speech = Arc::new(SpeechService::new(
            Arc::new(StaticVoiceStore),
            manager.clone(),
            Arc::new(PcmEncoder::default()),
            None,
            Arc::new(SessionRegistry::new()),
            AudioOptions {
                sample_rate: 24000,
                chunk_samples: 8192,
            },
        ));
        Arc::new(AppState::new(
            speech,
            manager,
            engine,
            None,
            "nature".to_string(),
            AudioFormat::Wav,
        ))
    }

    fn text_msg(json: &str) -> Result<Message, axum::Error> {
        Ok(Message::Text(json.to_string()))
    }

    /// 驱动一段固定的客户端消息序列，返回出站消息的类型序列与事件
    async fn run_messages(
        state: &Arc<AppState>,
        messages: Vec<Result<Message, axum::Error>>,
    ) -> (Vec<String>, Vec<serde_json::Value>) {
        let (msg_tx, mut msg_rx) = mpsc::channel::<Message>(64);
        let mut receiver = stream::iter(messages);
        run_session(&mut receiver, &msg_tx, state).await;
        drop(msg_tx);

        let mut kinds = Vec::new();
        let mut events = Vec::new();
        while let Some(msg) = msg_rx.recv().await {
            match msg {
                Message::Text(json) => {
                    let event: serde_json::Value = serde_json::from_str(&json).unwrap();
                    kinds.push(event["event"].as_str().unwrap().to_string());
                    events.push(event);
                }
                Message::Binary(_) => kinds.push("pcm".to_string()),
                _ => {}
            }
        }
        (kinds, events)
    }

    #[tokio::test]
    async fn test_first_message_must_be_start() {
        let state = test_state(Arc::new(FakeTtsEngine::with_defaults()));

        let (kinds, events) = run_messages(
            &state,
            vec![text_msg(r#"{"type":"text","content":"hello"}"#)],
        )
        .await;

        // 未 start 先发文本：只回一个 error 事件，不产生音频
        assert_eq!(kinds, vec!["error"]);
        assert!(events[0]["data"]["message"]
            .as_str()
            .unwrap()
            .contains("start"));
    }

    #[tokio::test]
    async fn test_empty_content_flushes_then_ends() {
        let engine = Arc::new(FakeTtsEngine::with_defaults());
        let state = test_state(engine.clone());

        let (kinds, events) = run_messages(
            &state,
            vec![
                text_msg(r#"{"type":"start"}"#),
                text_msg(r#"{"type":"text","content":"Hello there. And a tail"}"#),
                text_msg(r#"{"type":"text","content":""}"#),
            ],
        )
        .await;

        // 完整句先合成，空 content 触发残余冲洗；PCM 帧先于各自的 segment 事件
        assert_eq!(
            kinds,
            vec![
                "started", "pcm", "pcm", "segment", "pcm", "pcm", "segment", "end"
            ]
        );
        assert_eq!(
            engine.synthesized(),
            vec!["Hello there.", "And a tail"]
        );
        let end = events.last().unwrap();
        assert_eq!(end["data"]["segments"], 2);
        assert_eq!(state.speech.registry().active_count(), 0);
    }

    #[tokio::test]
    async fn test_end_without_text_reports_zero_segments() {
        let state = test_state(Arc::new(FakeTtsEngine::with_defaults()));

        let (kinds, events) = run_messages(
            &state,
            vec![text_msg(r#"{"type":"start"}"#), text_msg(r#"{"type":"end"}"#)],
        )
        .await;

        assert_eq!(kinds, vec!["started", "end"]);
        assert_eq!(events[1]["data"]["segments"], 0);
    }

    #[tokio::test]
    async fn test_synthesis_failure_sends_error_event() {
        let engine = Arc::new(FakeTtsEngine::new(FakeTtsEngineConfig {
            fail_synthesis: true,
            ..Default::default()
        }));
        let state = test_state(engine);

        let (kinds, events) = run_messages(
            &state,
            vec![
                text_msg(r#"{"type":"start"}"#),
                text_msg(r#"{"type":"text","content":"Hello there. "}"#),
            ],
        )
        .await;

        // 合成失败终止会话并回 error 事件；登记表同步清空
        assert_eq!(kinds, vec!["started", "error"]);
        assert!(events[1]["data"]["message"]
            .as_str()
            .unwrap()
            .contains("Synthesis failed"));
        assert_eq!(state.speech.registry().active_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_voice_sends_error_event() {
        let state = test_state(Arc::new(FakeTtsEngine::with_defaults()));

        let (kinds, events) = run_messages(
            &state,
            vec![text_msg(r#"{"type":"start","voice":"ghost"}"#)],
        )
        .await;

        assert_eq!(kinds, vec!["error"]);
        assert!(events[0]["data"]["message"]
            .as_str()
            .unwrap()
            .contains("ghost"));
    }

    #[tokio::test]
    async fn test_second_start_rejected() {
        let state = test_state(Arc::new(FakeTtsEngine::with_defaults()));

        let (kinds, events) = run_messages(
            &state,
            vec![text_msg(r#"{"type":"start"}"#), text_msg(r#"{"type":"start"}"#)],
        )
        .await;

        assert_eq!(kinds, vec!["started", "error"]);
        assert!(events[1]["data"]["message"]
            .as_str()
            .unwrap()
            .contains("already started"));
    }

    #[tokio::test]
    async fn test_disconnect_without_end_sends_nothing_further() {
        let engine = Arc::new(FakeTtsEngine::with_defaults());
        let state = test_state(engine.clone());

        // 客户端发完一句就断开：已合成的片段下发，残余不冲洗，无 end 事件
        let (kinds, _) = run_messages(
            &state,
            vec![
                text_msg(r#"{"type":"start"}"#),
                text_msg(r#"{"type":"text","content":"Hello there. And a tail"}"#),
            ],
        )
        .await;

        assert_eq!(kinds, vec!["started", "pcm", "pcm", "segment"]);
        assert_eq!(engine.synthesized(), vec!["Hello there."]);
        assert_eq!(state.speech.registry().active_count(), 0);
    }
}
