use crate::{AuthError, MfaEvent, MfaServer};
use common_types::{AuthObserver, MfaMethod};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const AUTH_BASE: &str = "https://idmsa.apple.com/appleauth/auth";
pub const SETUP_BASE: &str = "https://setup.icloud.com/setup/ws/1";

/// Public client identifier of the iCloud web frontend; the auth endpoints
/// reject requests without it.
const WIDGET_KEY: &str = "83545bf919aa8c6ea33b0619fc240081e2927c164174f4c7b493fd979b8";

/// How long the MFA-required state waits for an out-of-band code.
const MFA_DEADLINE: Duration = Duration::from_secs(10 * 60);

const SESSION_TOKEN_HEADER: &str = "X-Apple-Session-Token";
const SESSION_ID_HEADER: &str = "X-Apple-ID-Session-Id";
const SCNT_HEADER: &str = "scnt";
const TRUST_TOKEN_HEADER: &str = "X-Apple-TwoSV-Trust-Token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    MfaRequired,
    Authenticated,
    Ready,
}

impl SessionState {
    fn name(self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::MfaRequired => "mfa-required",
            Self::Authenticated => "authenticated",
            Self::Ready => "ready",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedPhoneNumber {
    pub id: u32,
    pub number_with_dial_code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthOptions {
    #[serde(default)]
    trusted_phone_numbers: Vec<TrustedPhoneNumber>,
}

#[derive(Debug, Deserialize)]
struct AccountLogin {
    webservices: std::collections::HashMap<String, WebService>,
}

#[derive(Debug, Deserialize)]
struct WebService {
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ZoneList {
    zones: Vec<ZoneEnvelope>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ZoneEnvelope {
    zone_id: ZoneId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ZoneId {
    zone_name: String,
}

/// Authenticated session against the photo service.
///
/// Owns credentials, the cookie jar, and the session/trust tokens, and
/// walks the state machine unauthenticated → mfa-required → authenticated
/// → ready. Once ready, requests issued with [`AuthSession::http`] carry
/// the session cookies.
pub struct AuthSession {
    http: Client,
    username: String,
    password: String,
    trust_token: Option<String>,
    trust_token_path: PathBuf,
    mfa_port: u16,
    session_token: Option<String>,
    session_id: Option<String>,
    scnt: Option<String>,
    photos_url: Option<String>,
    zones: Vec<String>,
    state: SessionState,
    observer: Arc<dyn AuthObserver>,
}

impl AuthSession {
    /// Create a session from credentials. A trust token stored by an
    /// earlier run is picked up from `trust_token_path` unless one is given
    /// explicitly.
    ///
    /// # Panics
    /// If the HTTP client cannot be constructed.
    #[must_use]
    pub fn new(
        username: String,
        password: String,
        trust_token: Option<String>,
        trust_token_path: PathBuf,
        mfa_port: u16,
        observer: Arc<dyn AuthObserver>,
    ) -> Self {
        let trust_token = trust_token.or_else(|| {
            fs::read_to_string(&trust_token_path)
                .ok()
                .map(|token| token.trim().to_owned())
                .filter(|token| !token.is_empty())
        });
        Self {
            // A total-duration timeout would cut off large asset bodies, so
            // only connect and per-read stalls are bounded.
            http: Client::builder()
                .cookie_store(true)
                .connect_timeout(Duration::from_secs(5))
                .read_timeout(Duration::from_secs(60))
                .build()
                .expect("Failed to create HTTP client"),
            username,
            password,
            trust_token,
            trust_token_path,
            mfa_port,
            session_token: None,
            session_id: None,
            scnt: None,
            photos_url: None,
            zones: Vec::new(),
            state: SessionState::Unauthenticated,
            observer,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn trust_token(&self) -> Option<&str> {
        self.trust_token.as_deref()
    }

    #[must_use]
    pub fn photos_url(&self) -> Option<&str> {
        self.photos_url.as_deref()
    }

    #[must_use]
    pub fn zones(&self) -> &[String] {
        &self.zones
    }

    /// The cookie-carrying client for record and download requests.
    #[must_use]
    pub fn http(&self) -> Client {
        self.http.clone()
    }

    /// Drive the state machine to `Ready`.
    ///
    /// With a valid trust token the MFA handshake is skipped entirely;
    /// otherwise the local MFA endpoint is started and the flow blocks
    /// until a code arrives or the deadline passes.
    pub async fn authenticate(&mut self, cancel: &CancellationToken) -> Result<(), AuthError> {
        self.set_state(SessionState::Unauthenticated);
        self.sign_in(cancel).await?;
        self.account_login().await?;
        self.discover_zones().await?;
        self.set_state(SessionState::Ready);
        Ok(())
    }

    /// Rebuild the session from stored credentials and trust token, for
    /// mid-run recovery after an expiry.
    pub async fn refresh(&mut self, cancel: &CancellationToken) -> Result<(), AuthError> {
        info!("Refreshing photo service session");
        self.session_token = None;
        self.session_id = None;
        self.scnt = None;
        self.photos_url = None;
        self.zones.clear();
        self.authenticate(cancel).await
    }

    async fn sign_in(&mut self, cancel: &CancellationToken) -> Result<(), AuthError> {
        let trust_tokens: Vec<&str> = self.trust_token.iter().map(String::as_str).collect();
        let response = self
            .http
            .post(format!("{AUTH_BASE}/signin"))
            .headers(self.auth_headers())
            .json(&json!({
                "accountName": self.username,
                "password": self.password,
                "rememberMe": true,
                "trustTokens": trust_tokens,
            }))
            .send()
            .await?;
        self.capture_session_headers(&response);

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::CONFLICT => {
                // 2FA required; the payload of the transition is the list
                // of trusted phone numbers fetched from the auth options.
                self.set_state(SessionState::MfaRequired);
                self.observer.mfa_required();
                let phones = self.fetch_trusted_phones().await?;
                self.run_mfa_flow(&phones, cancel).await?;
                self.request_trust().await?;
                Ok(())
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AuthError::InvalidCredentials),
            status => Err(self.unexpected("signin", status, response).await),
        }?;

        self.set_state(SessionState::Authenticated);
        Ok(())
    }

    async fn fetch_trusted_phones(&mut self) -> Result<Vec<TrustedPhoneNumber>, AuthError> {
        let response = self
            .http
            .get(AUTH_BASE)
            .headers(self.auth_headers())
            .send()
            .await?;
        self.capture_session_headers(&response);
        if !response.status().is_success() {
            let status = response.status();
            return Err(self.unexpected("auth options", status, response).await);
        }
        let options: AuthOptions = response
            .json()
            .await
            .map_err(|_| AuthError::MalformedResponse("trustedPhoneNumbers".into()))?;
        Ok(options.trusted_phone_numbers)
    }

    async fn run_mfa_flow(
        &mut self,
        phones: &[TrustedPhoneNumber],
        cancel: &CancellationToken,
    ) -> Result<(), AuthError> {
        let (tx, mut rx) = mpsc::channel::<MfaEvent>(8);
        let server = MfaServer::start(self.mfa_port, tx)
            .await
            .map_err(AuthError::MfaServer)?;
        let deadline = tokio::time::Instant::now() + MFA_DEADLINE;
        let mut last_phone_id: u32 = 1;

        let result = loop {
            let event = tokio::select! {
                () = cancel.cancelled() => break Err(AuthError::Interrupted),
                () = tokio::time::sleep_until(deadline) => break Err(AuthError::MfaTimeout),
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break Err(AuthError::MfaTimeout),
                },
            };
            match event {
                MfaEvent::Received { method, code } => {
                    self.observer.mfa_received(method, &code);
                    match self.submit_code(method, &code, last_phone_id).await {
                        Ok(()) => break Ok(()),
                        Err(e) if e.is_recoverable() => break Err(e),
                        Err(e) => {
                            let message = format!("MFA code was not accepted: {e}");
                            self.observer.warning(&message);
                        }
                    }
                }
                MfaEvent::Resend { method, phone_id } => {
                    last_phone_id = phone_id;
                    match self.resend(method, phone_id, phones).await {
                        Ok(()) => self.observer.mfa_resent(method),
                        Err(e @ (AuthError::MfaTimeout | AuthError::Network(_))) => break Err(e),
                        Err(e) => {
                            let message = format!("MFA resend failed: {e}");
                            self.observer.warning(&message);
                        }
                    }
                }
            }
        };

        server.stop().await;
        result
    }

    async fn submit_code(
        &mut self,
        method: MfaMethod,
        code: &str,
        phone_id: u32,
    ) -> Result<(), AuthError> {
        let (endpoint, body, expected) = match method {
            MfaMethod::Device => (
                "verify/trusteddevice/securitycode",
                json!({ "securityCode": { "code": code } }),
                StatusCode::NO_CONTENT,
            ),
            MfaMethod::Sms | MfaMethod::Voice => (
                "verify/phone/securitycode",
                json!({
                    "securityCode": { "code": code },
                    "phoneNumber": { "id": phone_id },
                    "mode": method.to_string(),
                }),
                StatusCode::OK,
            ),
        };
        let response = self
            .http
            .post(format!("{AUTH_BASE}/{endpoint}"))
            .headers(self.auth_headers())
            .json(&body)
            .send()
            .await?;
        self.capture_session_headers(&response);

        if response.status() == expected {
            info!("MFA code accepted via {method}");
            Ok(())
        } else {
            let status = response.status();
            Err(self.unexpected(endpoint, status, response).await)
        }
    }

    async fn resend(
        &mut self,
        method: MfaMethod,
        phone_id: u32,
        phones: &[TrustedPhoneNumber],
    ) -> Result<(), AuthError> {
        let (endpoint, body) = match method {
            MfaMethod::Device => ("verify/trusteddevice", json!({})),
            MfaMethod::Sms | MfaMethod::Voice => {
                // Enforce membership before dispatch; an unknown ID never
                // reaches the service.
                if !phones.iter().any(|phone| phone.id == phone_id) {
                    let message = phone_list_warning(phones);
                    self.observer.warning(&message);
                    return Ok(());
                }
                (
                    "verify/phone",
                    json!({
                        "phoneNumber": { "id": phone_id },
                        "mode": method.to_string(),
                    }),
                )
            }
        };
        let response = self
            .http
            .put(format!("{AUTH_BASE}/{endpoint}"))
            .headers(self.auth_headers())
            .json(&body)
            .send()
            .await?;
        self.capture_session_headers(&response);

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::PRECONDITION_FAILED => {
                let message = phone_list_warning(phones);
                self.observer.warning(&message);
                Ok(())
            }
            StatusCode::FORBIDDEN => Err(AuthError::MfaTimeout),
            status => Err(self.unexpected(endpoint, status, response).await),
        }
    }

    async fn request_trust(&mut self) -> Result<(), AuthError> {
        let response = self
            .http
            .get(format!("{AUTH_BASE}/2sv/trust"))
            .headers(self.auth_headers())
            .send()
            .await?;
        self.capture_session_headers(&response);
        if !response.status().is_success() {
            let status = response.status();
            return Err(self.unexpected("2sv/trust", status, response).await);
        }

        if let Some(token) = header_value(&response, TRUST_TOKEN_HEADER) {
            self.trust_token = Some(token.clone());
            self.persist_trust_token(&token)?;
            self.observer.trust_token_stored();
        } else {
            warn!("Trust request succeeded but returned no token");
        }
        Ok(())
    }

    fn persist_trust_token(&self, token: &str) -> Result<(), AuthError> {
        fs::write(&self.trust_token_path, token).map_err(AuthError::TrustToken)?;
        fs::set_permissions(&self.trust_token_path, fs::Permissions::from_mode(0o600))
            .map_err(AuthError::TrustToken)
    }

    async fn account_login(&mut self) -> Result<(), AuthError> {
        let session_token = self
            .session_token
            .clone()
            .ok_or_else(|| AuthError::MalformedResponse("missing session token".into()))?;
        let response = self
            .http
            .post(format!("{SETUP_BASE}/accountLogin"))
            .json(&json!({
                "dsWebAuthToken": session_token,
                "trustToken": self.trust_token,
                "extended_login": true,
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(self.unexpected("accountLogin", status, response).await);
        }
        let login: AccountLogin = response
            .json()
            .await
            .map_err(|_| AuthError::MalformedResponse("webservices".into()))?;
        let photos_url = login
            .webservices
            .get("ckdatabasews")
            .map(|service| service.url.clone())
            .ok_or_else(|| AuthError::MalformedResponse("webservices.ckdatabasews.url".into()))?;
        self.photos_url = Some(photos_url);
        Ok(())
    }

    /// Resolve the per-zone photo endpoint via the zone discovery call.
    async fn discover_zones(&mut self) -> Result<(), AuthError> {
        let base = self
            .photos_url
            .clone()
            .ok_or_else(|| AuthError::MalformedResponse("missing photo service URL".into()))?;
        let response = self
            .http
            .post(format!(
                "{base}/database/1/com.apple.photos.cloud/production/private/zones/list"
            ))
            .json(&json!({}))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(self.unexpected("zones/list", status, response).await);
        }
        let zone_list: ZoneList = response
            .json()
            .await
            .map_err(|_| AuthError::MalformedResponse("zones".into()))?;
        self.zones = zone_list
            .zones
            .into_iter()
            .map(|zone| zone.zone_id.zone_name)
            .collect();
        if self.zones.is_empty() {
            return Err(AuthError::MalformedResponse("no photo zones".into()));
        }
        info!("Photo service ready with {} zone(s)", self.zones.len());
        Ok(())
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("X-Apple-Widget-Key", HeaderValue::from_static(WIDGET_KEY));
        headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(session_id) = &self.session_id
            && let Ok(value) = HeaderValue::from_str(session_id)
        {
            headers.insert(SESSION_ID_HEADER, value);
        }
        if let Some(scnt) = &self.scnt
            && let Ok(value) = HeaderValue::from_str(scnt)
        {
            headers.insert(SCNT_HEADER, value);
        }
        headers
    }

    fn capture_session_headers(&mut self, response: &Response) {
        if let Some(token) = header_value(response, SESSION_TOKEN_HEADER) {
            self.session_token = Some(token);
        }
        if let Some(session_id) = header_value(response, SESSION_ID_HEADER) {
            self.session_id = Some(session_id);
        }
        if let Some(scnt) = header_value(response, SCNT_HEADER) {
            self.scnt = Some(scnt);
        }
    }

    async fn unexpected(&self, endpoint: &str, status: StatusCode, response: Response) -> AuthError {
        let body = response.text().await.unwrap_or_default();
        AuthError::UnexpectedStatus {
            endpoint: endpoint.to_owned(),
            status: status.as_u16(),
            body,
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            self.state = state;
            self.observer.state_changed(state.name());
        }
    }
}

fn header_value(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

/// Warning text for a phone resend with an ID missing from the trusted
/// list.
#[must_use]
pub fn phone_list_warning(phones: &[TrustedPhoneNumber]) -> String {
    let mut message = String::from("Selected Phone Number ID does not exist.\nAvailable numbers:");
    for phone in phones {
        message.push_str(&format!("\n- {}: {}", phone.id, phone.number_with_dial_code));
    }
    message
}
