use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;

use roomguard_core::error::{Result, RoomGuardError};
use roomguard_core::event::StateEvent;

use crate::config::HomeserverApiConfig;

use super::RoomStateApi;

#[derive(Deserialize)]
struct RoomStateResponse {
    #[serde(default)]
    state: Vec<Value>,
}

#[derive(Deserialize)]
struct SendResponse {
    event_id: String,
}

/// `RoomStateApi` backed by the homeserver's HTTP APIs.
///
/// - reads: `GET /_synapse/admin/v1/rooms/{room_id}/state` (admin token)
/// - writes: `PUT /_matrix/client/v3/rooms/{room_id}/state/{type}/{state_key}?user_id={sender}`
///   (application service token, sent as `sender`)
pub struct HomeserverClient {
    http: Client,
    base: Url,
    admin_token: String,
    as_token: String,
}

impl HomeserverClient {
    /// Build from config, reading both tokens from the environment.
    pub fn from_config(cfg: &HomeserverApiConfig) -> Result<Self> {
        let admin_token = token_from_env(&cfg.admin_token_env)?;
        let as_token = token_from_env(&cfg.as_token_env)?;
        Self::connect(
            &cfg.base_url,
            admin_token,
            as_token,
            Duration::from_millis(cfg.request_timeout_ms),
        )
    }

    pub fn connect(base_url: &str, admin_token: String, as_token: String, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| RoomGuardError::BadConfig(format!("homeserver base_url {base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(RoomGuardError::BadConfig(format!(
                "homeserver base_url {base_url} cannot carry a path"
            )));
        }
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("roomguard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RoomGuardError::Internal(format!("http client: {e}")))?;

        tracing::info!(base_url = %base, "homeserver client ready");
        Ok(Self {
            http,
            base,
            admin_token,
            as_token,
        })
    }

    /// Base URL with `segments` appended, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RoomGuardError::BadConfig("homeserver base_url cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn token_from_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(t) if !t.trim().is_empty() => Ok(t),
        _ => Err(RoomGuardError::BadConfig(format!(
            "environment variable {name} must hold a homeserver token"
        ))),
    }
}

async fn failure(what: &str, resp: reqwest::Response) -> RoomGuardError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    RoomGuardError::Internal(format!("{what} failed ({status}): {body}"))
}

#[async_trait]
impl RoomStateApi for HomeserverClient {
    async fn get_state_event(
        &self,
        room_id: &str,
        event_type: &str,
        state_key: &str,
    ) -> Result<Option<StateEvent>> {
        let url = self.endpoint(&["_synapse", "admin", "v1", "rooms", room_id, "state"])?;
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.admin_token)
            .send()
            .await
            .map_err(|e| RoomGuardError::Internal(format!("room state request: {e}")))?;

        // Room not known to the homeserver yet.
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(failure("room state read", resp).await);
        }

        let body: RoomStateResponse = resp
            .json()
            .await
            .map_err(|e| RoomGuardError::MalformedEvent(format!("room state response: {e}")))?;

        let found = body.state.into_iter().find(|ev| {
            ev.get("type").and_then(Value::as_str) == Some(event_type)
                && ev.get("state_key").and_then(Value::as_str) == Some(state_key)
        });
        match found {
            Some(ev) => serde_json::from_value(ev)
                .map(Some)
                .map_err(|e| RoomGuardError::MalformedEvent(format!("room state event: {e}"))),
            None => Ok(None),
        }
    }

    async fn send_state_event(&self, event: StateEvent) -> Result<String> {
        let Some(state_key) = event.state_key.as_deref() else {
            return Err(RoomGuardError::BadRequest(format!(
                "{} sent without state_key",
                event.event_type
            )));
        };
        let mut url = self.endpoint(&[
            "_matrix",
            "client",
            "v3",
            "rooms",
            &event.room_id,
            "state",
            &event.event_type,
            state_key,
        ])?;
        url.query_pairs_mut().append_pair("user_id", &event.sender);

        let resp = self
            .http
            .put(url)
            .bearer_auth(&self.as_token)
            .json(&event.content)
            .send()
            .await
            .map_err(|e| RoomGuardError::Internal(format!("send state request: {e}")))?;
        if !resp.status().is_success() {
            return Err(failure("send state", resp).await);
        }

        let sent: SendResponse = resp
            .json()
            .await
            .map_err(|e| RoomGuardError::MalformedEvent(format!("send state response: {e}")))?;
        Ok(sent.event_id)
    }
}
