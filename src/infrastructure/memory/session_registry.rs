//! Session Registry - 活动会话登记表
//!
//! 记录当前打开的流式会话，供健康上报观测并发度。
//! 条目只在会话打开/关闭时写入，不参与合成路径。

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

/// 会话条目快照
#[derive(Debug, Clone, Serialize)]
pub struct SessionEntry {
    pub session_id: Uuid,
    pub voice_id: String,
    pub started_at: DateTime<Utc>,
    pub segments_synthesized: u64,
}

/// 活动会话登记表
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<Uuid, SessionEntry>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记新会话，返回分配的会话 ID
    pub fn register(&self, voice_id: &str) -> Uuid {
        let session_id = Uuid::new_v4();
        self.sessions.insert(
            session_id,
            SessionEntry {
                session_id,
                voice_id: voice_id.to_string(),
                started_at: Utc::now(),
                segments_synthesized: 0,
            },
        );
        tracing::debug!(session_id = %session_id, voice = %voice_id, "Session registered");
        session_id
    }

    /// 片段完成后累加计数
    pub fn record_segment(&self, session_id: &Uuid) {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.segments_synthesized += 1;
        }
    }

    /// 会话关闭（正常或异常）时移除
    pub fn unregister(&self, session_id: &Uuid) {
        if let Some((_, entry)) = self.sessions.remove(session_id) {
            tracing::debug!(
                session_id = %session_id,
                segments = entry.segments_synthesized,
                "Session unregistered"
            );
        }
    }

    /// 当前活动会话数
    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// 所有活动会话的快照
    pub fn snapshot(&self) -> Vec<SessionEntry> {
        self.sessions.iter().map(|e| e.value().clone()).collect()
    }
}
