//! 会话注册表
//!
//! 记录当前存活的会话，供 `/sessions` 查询以及服务关闭时统一停止。
//! 注册表只观察会话，不把会话交给其他连接使用。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::session::PtySession;
use super::types::SessionInfo;

/// 会话注册表
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Arc<PtySession>>>>,
}

impl SessionRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记会话
    pub async fn register(&self, session: Arc<PtySession>) {
        let id = session.id().to_string();
        self.sessions.write().await.insert(id.clone(), session);
        tracing::debug!("登记会话: {}", id);
    }

    /// 注销会话
    pub async fn remove(&self, session_id: &str) -> Option<Arc<PtySession>> {
        let removed = self.sessions.write().await.remove(session_id);
        if removed.is_some() {
            tracing::debug!("注销会话: {}", session_id);
        }
        removed
    }

    /// 获取会话
    pub async fn get(&self, session_id: &str) -> Option<Arc<PtySession>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// 列出所有会话信息，按创建时间排序
    pub async fn list(&self) -> Vec<SessionInfo> {
        let sessions: Vec<Arc<PtySession>> =
            self.sessions.read().await.values().cloned().collect();

        let mut infos = Vec::with_capacity(sessions.len());
        for session in sessions {
            infos.push(session.info().await);
        }
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        infos
    }

    /// 会话数量
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// 停止并注销所有会话
    pub async fn stop_all(&self) {
        let sessions: Vec<Arc<PtySession>> = {
            let mut map = self.sessions.write().await;
            map.drain().map(|(_, session)| session).collect()
        };
        if sessions.is_empty() {
            return;
        }

        tracing::info!("停止 {} 个会话", sessions.len());
        let stops = sessions.iter().map(|session| session.stop());
        futures::future::join_all(stops).await;
    }
}
