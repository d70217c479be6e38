use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::files::{current_epoch_seconds, read_json, remove_if_exists, write_private_json};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The gateway's login state. Stored and handed back verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct AppState(pub Value);

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionFile {
    app_state: Value,
    gateway_url: String,
    updated_at: i64,
}

/// `appstate.json`, scoped to the gateway that issued it.
pub struct SessionStore {
    path: PathBuf,
    gateway_url: String,
}

impl SessionStore {
    pub fn new(path: PathBuf, gateway_url: String) -> Self {
        Self { path, gateway_url }
    }

    pub fn load(&self) -> Result<Option<AppState>, SessionError> {
        let Some(file) = read_json::<SessionFile, SessionError>(&self.path)? else {
            return Ok(None);
        };
        if file.gateway_url != self.gateway_url || file.app_state.is_null() {
            return Ok(None);
        }
        Ok(Some(AppState(file.app_state)))
    }

    pub fn store(&self, state: &AppState) -> Result<(), SessionError> {
        let file = SessionFile {
            app_state: state.0.clone(),
            gateway_url: self.gateway_url.clone(),
            updated_at: current_epoch_seconds(),
        };
        write_private_json(&self.path, &file)
    }

    pub fn clear(&self) -> Result<(), SessionError> {
        Ok(remove_if_exists(&self.path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_blob_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(dir.path().join("nested").join("appstate.json"), "http://gw/v1".to_string());
        assert_eq!(store.load().expect("load"), None);

        let blob = AppState(json!([{"key": "c_user", "value": "42"}, {"key": "xs", "value": "opaque"}]));
        store.store(&blob).expect("store");
        assert_eq!(store.load().expect("load"), Some(blob));

        store.clear().expect("clear");
        store.clear().expect("clear twice");
        assert_eq!(store.load().expect("load"), None);
    }

    #[test]
    fn ignores_session_from_other_gateway() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("appstate.json");
        SessionStore::new(path.clone(), "http://one/v1".to_string())
            .store(&AppState(json!({"token": "x"})))
            .expect("store");

        let other = SessionStore::new(path, "http://two/v1".to_string());
        assert_eq!(other.load().expect("load"), None);
    }
}
