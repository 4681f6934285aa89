use axum::Json;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::{Method, StatusCode, Uri};
use axum::routing::{get, post};
use common_types::MfaMethod;
use serde::Deserialize;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// What the MFA endpoint tells the auth state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MfaEvent {
    Received { method: MfaMethod, code: String },
    Resend { method: MfaMethod, phone_id: u32 },
}

#[derive(Clone)]
struct MfaState {
    events: mpsc::Sender<MfaEvent>,
    /// Channel the next submitted code is attributed to; a resend request
    /// switches it away from the default trusted-device push.
    method: Arc<Mutex<MfaMethod>>,
}

/// Short-lived HTTP listener for out-of-band MFA input.
///
/// Runs only while the session sits in the MFA-required state; stopping it
/// shuts the listener down gracefully.
pub struct MfaServer {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl MfaServer {
    pub async fn start(port: u16, events: mpsc::Sender<MfaEvent>) -> std::io::Result<Self> {
        let state = MfaState {
            events,
            method: Arc::new(Mutex::new(MfaMethod::Device)),
        };
        let app = router(state);
        let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
        let addr = listener.local_addr()?;
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                shutdown_rx.await.ok();
            });
            if let Err(e) = server.await {
                warn!("MFA endpoint terminated with an error: {e}");
            }
        });
        info!("🔐 MFA endpoint listening on {addr}");

        Ok(Self {
            addr,
            shutdown,
            handle,
        })
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.await;
    }
}

fn router(state: MfaState) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/mfa", post(submit_code))
        .route("/resend_mfa", post(resend_mfa))
        .fallback(fallback)
        .with_state(state)
}

fn message(text: impl Into<String>) -> Json<Value> {
    Json(json!({ "message": text.into() }))
}

async fn banner() -> Json<Value> {
    message("icesync MFA endpoint, submit your code with POST /mfa?code=<6 digits>")
}

#[derive(Deserialize)]
struct CodeQuery {
    code: Option<String>,
}

fn valid_code(code: &str) -> bool {
    code.len() == 6 && code.chars().all(|c| c.is_ascii_digit())
}

async fn submit_code(
    State(state): State<MfaState>,
    Query(query): Query<CodeQuery>,
) -> (StatusCode, Json<Value>) {
    let code = query.code.unwrap_or_default();
    if !valid_code(&code) {
        warn!("Received malformed MFA code: {code:?}");
        return (
            StatusCode::BAD_REQUEST,
            message("Unexpected MFA code format! Expecting 6 digits"),
        );
    }

    let method = *state.method.lock().unwrap();
    if state
        .events
        .send(MfaEvent::Received {
            method,
            code: code.clone(),
        })
        .await
        .is_err()
    {
        warn!("MFA code arrived but no authentication flow is waiting");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            message("No authentication flow is waiting for a code"),
        );
    }
    (StatusCode::OK, message(format!("Read MFA code: {code}")))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResendQuery {
    method: Option<String>,
    phone_number_id: Option<String>,
}

async fn resend_mfa(
    State(state): State<MfaState>,
    Query(query): Query<ResendQuery>,
) -> (StatusCode, Json<Value>) {
    let method = match query.method.as_deref() {
        Some("device") => MfaMethod::Device,
        Some("sms") => MfaMethod::Sms,
        Some("voice") => MfaMethod::Voice,
        other => {
            let name = other.unwrap_or_default();
            warn!("Received resend request with unknown method: {name:?}");
            return (
                StatusCode::BAD_REQUEST,
                message(format!("Unknown resend method: {name}")),
            );
        }
    };
    // An unparsable phone number ID silently falls back to the primary one.
    let phone_id = query
        .phone_number_id
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(1);

    *state.method.lock().unwrap() = method;
    if state
        .events
        .send(MfaEvent::Resend { method, phone_id })
        .await
        .is_err()
    {
        warn!("Resend request arrived but no authentication flow is waiting");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            message("No authentication flow is waiting for a code"),
        );
    }
    (
        StatusCode::OK,
        message(format!("Requesting MFA resend with method {method}")),
    )
}

async fn fallback(method: Method, uri: Uri) -> (StatusCode, Json<Value>) {
    if method == Method::POST {
        warn!("POST to unknown MFA route: {uri}");
        (
            StatusCode::NOT_FOUND,
            message("Route not found. Known endpoints: POST /mfa, POST /resend_mfa"),
        )
    } else {
        warn!("Unsupported request to MFA endpoint: {method} {uri}");
        (
            StatusCode::BAD_REQUEST,
            message(format!("Method not supported: {method}")),
        )
    }
}
