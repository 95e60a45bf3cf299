//! HTTP 路由
//!
//! - `GET /pty`：WebSocket 升级，每条连接启动一个独立会话
//! - `GET /sessions`：当前会话列表（JSON）
//! - 其余请求：静态文件

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::pty::manager::SessionRegistry;
use crate::pty::session::PtySession;
use crate::pty::types::SessionInfo;

use super::config::BridgeConfig;
use super::ws;

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BridgeConfig>,
    pub registry: SessionRegistry,
}

/// 构建路由
pub fn router(state: AppState) -> Router {
    let static_files = ServeDir::new(&state.config.static_root);

    Router::new()
        .route("/pty", get(pty_handler))
        .route("/sessions", get(list_sessions))
        .fallback_service(static_files)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 启动会话并升级为 WebSocket
///
/// 进程启动失败时直接返回 500，不进行升级。
async fn pty_handler(upgrade: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let config = &state.config;
    let session = match PtySession::start(&config.command, &config.args, config.session.clone())
    {
        Ok(session) => Arc::new(session),
        Err(e) => {
            tracing::error!("启动会话失败: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };
    state.registry.register(session.clone()).await;

    let on_failed = {
        let session = session.clone();
        let registry = state.registry.clone();
        move |e: axum::Error| {
            tracing::warn!(session = %session.id(), "WebSocket 升级失败: {}", e);
            tokio::spawn(async move {
                session.stop().await;
                registry.remove(session.id()).await;
            });
        }
    };

    let registry = state.registry.clone();
    upgrade
        .on_failed_upgrade(on_failed)
        .on_upgrade(move |socket| async move {
            let (sink, source) = ws::split(socket);
            let outcome = session.run_bridge(sink, source).await;
            registry.remove(session.id()).await;
            tracing::info!(
                session = %outcome.session_id,
                trigger = ?outcome.trigger,
                exit_code = ?outcome.stop.exit_code,
                "连接结束: {}",
                outcome.exit
            );
        })
}

/// 列出会话
async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    Json(state.registry.list().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pty::session::SessionOptions;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::path::PathBuf;
    use tower::ServiceExt;

    fn test_state(static_root: PathBuf) -> AppState {
        AppState {
            config: Arc::new(BridgeConfig {
                listen_addr: "127.0.0.1:0".to_string(),
                command: "/bin/cat".to_string(),
                args: Vec::new(),
                static_root,
                session: SessionOptions::default(),
            }),
            registry: SessionRegistry::new(),
        }
    }

    #[tokio::test]
    async fn test_sessions_endpoint_returns_empty_list() {
        let app = router(test_state(std::env::temp_dir()));

        let response = app
            .oneshot(Request::builder().uri("/sessions").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let infos: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        assert!(infos.is_empty());
    }

    #[tokio::test]
    async fn test_static_files_are_served() {
        let dir = std::env::temp_dir().join(format!("ws-pty-bridge-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("index.html"), "<h1>terminal</h1>").unwrap();

        let app = router(test_state(dir.clone()));
        let response = app
            .oneshot(Request::builder().uri("/index.html").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"<h1>terminal</h1>");

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_pty_requires_websocket_upgrade() {
        let state = test_state(std::env::temp_dir());
        let registry = state.registry.clone();
        let app = router(state);

        let response = app
            .oneshot(Request::builder().uri("/pty").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.status().is_client_error());
        assert_eq!(registry.count().await, 0);
    }
}
