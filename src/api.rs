use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::model::{Friend, Message, Thread, UserId};
use crate::realtime::{RealtimeError, Subscription};
use crate::session::AppState;
use crate::transport::{Transport, TransportError};

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Credentials for the gateway, issued by `login` or `resume`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySession {
    pub token: String,
    #[serde(rename = "userID", alias = "userId")]
    pub user_id: UserId,
    #[serde(default)]
    pub app_state: Option<serde_json::Value>,
}

impl GatewaySession {
    pub fn app_state(&self) -> Option<AppState> {
        self.app_state.clone().map(AppState)
    }
}

#[derive(Clone)]
pub struct GatewayClient {
    base_url: String,
    http: Client,
    session: Option<GatewaySession>,
}

impl GatewayClient {
    pub fn new(base_url: String) -> Result<Self, TransportError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            session: None,
        })
    }

    pub fn with_session(mut self, session: GatewaySession) -> Self {
        self.session = Some(session);
        self
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<GatewaySession, TransportError> {
        let url = format!("{}/login", self.base_url);
        let mut payload = serde_json::Map::new();
        payload.insert("email".to_string(), json!(email));
        payload.insert("password".to_string(), json!(password));
        self.post(url, None, payload).await
    }

    /// Trades a stored app state for a fresh session.
    pub async fn resume(&self, state: &AppState) -> Result<GatewaySession, TransportError> {
        let url = format!("{}/resume", self.base_url);
        let mut payload = serde_json::Map::new();
        payload.insert("appState".to_string(), state.0.clone());
        self.post(url, None, payload).await
    }

    pub async fn logout(&self) -> Result<(), TransportError> {
        let url = format!("{}/logout", self.base_url);
        let _: serde_json::Value = self.post(url, Some(self.token()?), serde_json::Map::new()).await?;
        Ok(())
    }

    /// Opens the push channel for this session's incoming messages.
    pub async fn subscribe_incoming(&self, realtime_url: &str) -> Result<Subscription, RealtimeError> {
        let token = self.token().map_err(|_| RealtimeError::NotAuthenticated)?;
        Subscription::connect(realtime_url, token).await
    }

    fn token(&self) -> Result<&str, TransportError> {
        self.session
            .as_ref()
            .map(|session| session.token.as_str())
            .ok_or(TransportError::NotAuthenticated)
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        url: String,
        token: Option<&str>,
        payload: serde_json::Map<String, serde_json::Value>,
    ) -> Result<T, TransportError> {
        let mut request = self.http.post(url).json(&payload);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        let api_response: ApiResponse<T> = response.json().await?;
        match api_response {
            ApiResponse::Ok { result, .. } => Ok(result),
            ApiResponse::Err {
                error,
                description,
                ..
            } => Err(TransportError::Gateway {
                error,
                description: description.unwrap_or_else(|| "Unknown error".to_string()),
            }),
        }
    }
}

#[async_trait]
impl Transport for GatewayClient {
    fn current_user_id(&self) -> UserId {
        self.session
            .as_ref()
            .map(|session| session.user_id.clone())
            .unwrap_or_else(|| UserId::new(""))
    }

    async fn fetch_thread_list(&self, offset: usize, limit: usize) -> Result<Vec<Thread>, TransportError> {
        let url = format!("{}/getThreadList", self.base_url);
        let mut payload = serde_json::Map::new();
        payload.insert("offset".to_string(), json!(offset));
        payload.insert("limit".to_string(), json!(limit));
        self.post(url, Some(self.token()?), payload).await
    }

    async fn fetch_friend_list(&self) -> Result<Vec<Friend>, TransportError> {
        let url = format!("{}/getFriendsList", self.base_url);
        self.post(url, Some(self.token()?), serde_json::Map::new()).await
    }

    async fn fetch_thread_history(
        &self,
        thread_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Message>, TransportError> {
        let url = format!("{}/getThreadHistory", self.base_url);
        let mut payload = serde_json::Map::new();
        payload.insert("threadID".to_string(), json!(thread_id));
        payload.insert("offset".to_string(), json!(offset));
        payload.insert("limit".to_string(), json!(limit));
        self.post(url, Some(self.token()?), payload).await
    }

    async fn send_message(&self, body: &str, thread_id: &str) -> Result<(), TransportError> {
        let url = format!("{}/sendMessage", self.base_url);
        let mut payload = serde_json::Map::new();
        payload.insert("threadID".to_string(), json!(thread_id));
        payload.insert("body".to_string(), json!(body));
        let _: SendMessageResult = self.post(url, Some(self.token()?), payload).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageResult {
    #[allow(dead_code)]
    #[serde(rename = "messageID", alias = "messageId", default)]
    message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged, rename_all = "camelCase")]
enum ApiResponse<T> {
    Ok { ok: bool, result: T },
    Err {
        ok: bool,
        error: String,
        error_code: Option<i32>,
        description: Option<String>,
    },
}
