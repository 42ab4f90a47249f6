//! Axum-based HTTP gateway: the status panel, a small JSON API and the
//! bridge webhook.

pub mod panel;

use crate::bot::{BotSession, LogEntry, Mode, ModeSnapshot};
use crate::channels::traits::{Channel, ConnectionSnapshot, InboundMessage};
use crate::channels::WhatsAppChannel;
use crate::identity::SlotState;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB)
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout (30s)
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

pub const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "+", env!("PAIRBOT_GIT_SHA"));

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<BotSession>,
    pub whatsapp: Arc<WhatsAppChannel>,
    pub tx: mpsc::Sender<InboundMessage>,
    /// `(clock, text)` pairs listed on the panel; empty when greetings are off.
    pub greetings: Arc<Vec<(String, String)>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdentitySnapshot {
    pub me: SlotState,
    pub counterparty: SlotState,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub connection: ConnectionSnapshot,
    pub modes: ModeSnapshot,
    pub identities: IdentitySnapshot,
    pub greetings: Vec<(String, String)>,
    pub log: Vec<LogEntry>,
    pub version: &'static str,
}

impl AppState {
    pub fn status(&self) -> StatusSnapshot {
        let identities = self.session.identities();
        StatusSnapshot {
            connection: self.session.channel().connection().snapshot(),
            modes: self.session.modes().snapshot(),
            identities: IdentitySnapshot {
                me: identities.me().state().clone(),
                counterparty: identities.counterparty().state().clone(),
            },
            greetings: self.greetings.as_ref().clone(),
            log: self.session.log_snapshot(),
            version: VERSION,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_panel))
        .route("/health", get(handle_health))
        .route("/api/status", get(handle_status))
        .route("/toggle/{mode}", post(handle_toggle))
        .route("/webhook/whatsapp", post(handle_whatsapp_webhook))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
}

/// Bind and serve until `shutdown` resolves.
pub async fn run_gateway<F>(host: &str, port: u16, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("failed to bind status panel on {host}:{port}"))?;
    let addr = listener.local_addr()?;
    tracing::info!("🌐 status panel listening on http://{addr}");
    tracing::info!("  POST /webhook/whatsapp  (point the bridge webhook here)");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// AXUM HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// GET /: HTML status panel
async fn handle_panel(State(state): State<AppState>) -> Html<String> {
    Html(panel::render_panel(&state.status()))
}

/// GET /health
async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "connected": state.session.channel().connection().is_ready(),
        "version": VERSION,
    }))
}

/// GET /api/status
async fn handle_status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.status())
}

/// POST /toggle/{mode}: flip a mode, then back to the panel
async fn handle_toggle(State(state): State<AppState>, Path(mode): Path<String>) -> Response {
    let Ok(parsed) = mode.parse::<Mode>() else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": format!("unknown mode: {mode}")})),
        )
            .into_response();
    };
    let on = state.session.modes().toggle(parsed);
    tracing::info!(mode = %mode, on, "mode toggled");
    Redirect::to("/").into_response()
}

/// POST /webhook/whatsapp: bridge events
async fn handle_whatsapp_webhook(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let Ok(payload) = serde_json::from_slice::<serde_json::Value>(&body) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Invalid JSON payload"})),
        );
    };

    let messages = state.whatsapp.ingest_webhook(&payload);
    let total = messages.len();
    let mut queued = 0;
    for msg in messages {
        // Never wait for room; a full queue is answered with 503.
        match state.tx.try_send(msg) {
            Ok(()) => queued += 1,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                tracing::warn!(
                    id = %msg.id,
                    queued,
                    dropped = total - queued,
                    "inbound queue full; rejecting webhook"
                );
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(serde_json::json!({"error": "inbound queue full", "queued": queued})),
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::error!("dispatcher is gone; dropping inbound message");
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(serde_json::json!({"error": "dispatcher unavailable"})),
                );
            }
        }
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({"status": "ok", "queued": queued})),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::tests::{reply_client, ME, PARTNER};
    use crate::identity::Identities;
    use axum::http::header;
    use http_body_util::BodyExt as _;

    fn test_state() -> (AppState, mpsc::Receiver<InboundMessage>) {
        test_state_with_capacity(8)
    }

    fn test_state_with_capacity(capacity: usize) -> (AppState, mpsc::Receiver<InboundMessage>) {
        let whatsapp = Arc::new(WhatsAppChannel::new(
            "http://127.0.0.1:9".into(),
            "key".into(),
            "pairbot".into(),
        ));
        let (client, _) = reply_client(Some("iyiyim"));
        let session = Arc::new(BotSession::new(
            whatsapp.clone(),
            client,
            Identities::from_config(Some(ME), None),
        ));
        let (tx, rx) = mpsc::channel(capacity);
        let state = AppState {
            session,
            whatsapp,
            tx,
            greetings: Arc::new(vec![("08:00".into(), "Günaydın 🌅".into())]),
        };
        (state, rx)
    }

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn health_reports_connection() {
        let (state, _rx) = test_state();
        let response = handle_health(State(state.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["connected"], false);
        assert_eq!(json["version"], VERSION);

        state.whatsapp.connection().mark_ready();
        let response = handle_health(State(state)).await.into_response();
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["connected"], true);
    }

    #[tokio::test]
    async fn toggle_flips_mode_and_redirects() {
        let (state, _rx) = test_state();
        let response = handle_toggle(State(state.clone()), Path("lover".into())).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/");
        assert!(state.session.modes().get(Mode::Lover));

        handle_toggle(State(state.clone()), Path("self-echo".into())).await;
        handle_toggle(State(state.clone()), Path("lover".into())).await;
        let modes = state.session.modes().snapshot();
        assert!(!modes.lover);
        assert!(modes.self_echo);
    }

    #[tokio::test]
    async fn toggle_unknown_mode_is_404() {
        let (state, _rx) = test_state();
        let response = handle_toggle(State(state.clone()), Path("party".into())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            state.session.modes().snapshot(),
            ModeSnapshot {
                lover: false,
                self_echo: false
            }
        );
    }

    #[tokio::test]
    async fn webhook_rejects_bad_json() {
        let (state, _rx) = test_state();
        let response = handle_whatsapp_webhook(State(state), Bytes::from_static(b"{not json"))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn webhook_queues_messages() {
        let (state, mut rx) = test_state();
        let payload = serde_json::json!({
            "event": "messages.upsert",
            "sender": ME,
            "data": {
                "key": {"remoteJid": PARTNER, "fromMe": false, "id": "ABC"},
                "message": {"conversation": "selam"}
            }
        });
        let response = handle_whatsapp_webhook(
            State(state),
            Bytes::from(serde_json::to_vec(&payload).unwrap()),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.from, PARTNER);
        assert_eq!(msg.to, ME);
        assert_eq!(msg.body, "selam");
        assert!(!msg.from_self);
    }

    #[tokio::test]
    async fn webhook_full_queue_is_503_without_waiting() {
        let (state, mut rx) = test_state_with_capacity(1);
        let payload = serde_json::json!({
            "event": "messages.upsert",
            "sender": ME,
            "data": [
                {
                    "key": {"remoteJid": PARTNER, "fromMe": false, "id": "Q1"},
                    "message": {"conversation": "selam"}
                },
                {
                    "key": {"remoteJid": PARTNER, "fromMe": false, "id": "Q2"},
                    "message": {"conversation": "naber"}
                }
            ]
        });
        let response = tokio::time::timeout(
            Duration::from_secs(2),
            handle_whatsapp_webhook(
                State(state),
                Bytes::from(serde_json::to_vec(&payload).unwrap()),
            ),
        )
        .await
        .expect("webhook handler must not block on a full queue")
        .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["queued"], 1);

        assert_eq!(rx.recv().await.unwrap().id, "Q1");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn webhook_without_dispatcher_is_503() {
        let (state, rx) = test_state();
        drop(rx);
        let payload = serde_json::json!({
            "event": "messages.upsert",
            "sender": ME,
            "data": {
                "key": {"remoteJid": PARTNER, "fromMe": false, "id": "Z1"},
                "message": {"conversation": "selam"}
            }
        });
        let response = handle_whatsapp_webhook(
            State(state),
            Bytes::from(serde_json::to_vec(&payload).unwrap()),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn webhook_qr_event_shows_on_panel() {
        let (state, _rx) = test_state();
        let payload = serde_json::json!({
            "event": "QRCODE_UPDATED",
            "data": {"qrcode": {"base64": "data:image/png;base64,QRQR"}}
        });
        handle_whatsapp_webhook(
            State(state.clone()),
            Bytes::from(serde_json::to_vec(&payload).unwrap()),
        )
        .await;

        let Html(html) = handle_panel(State(state)).await;
        assert!(html.contains(panel::WAITING_LABEL));
        assert!(html.contains("data:image/png;base64,QRQR"));
    }

    #[tokio::test]
    async fn status_endpoint_reports_identities_and_log() {
        let (state, _rx) = test_state();
        let Json(status) = handle_status(State(state)).await;
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["identities"]["me"]["state"], "configured");
        assert_eq!(json["identities"]["me"]["address"], ME);
        assert_eq!(json["identities"]["counterparty"]["state"], "unset");
        assert_eq!(json["connection"]["ready"], false);
        assert_eq!(json["log"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn router_serves_panel_over_http() {
        let (state, _rx) = test_state();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router(state)).await;
        });

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();
        let html = client
            .get(format!("http://{addr}/"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(html.contains("WhatsApp Bot"));

        let toggled = client
            .post(format!("http://{addr}/toggle/lover"))
            .send()
            .await
            .unwrap();
        assert_eq!(toggled.status().as_u16(), 303);

        let missing = client
            .post(format!("http://{addr}/toggle/nope"))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status().as_u16(), 404);
    }
}
