use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::files::{current_epoch_seconds, read_json, write_private_json};
use crate::model::UserId;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LocalState {
    pub current_user_id: Option<UserId>,
    pub gateway_url: Option<String>,
    pub updated_at: Option<i64>,
    pub last_thread_id: Option<String>,
}

#[derive(Clone)]
pub struct LocalDb {
    path: PathBuf,
    gateway_url: String,
}

impl LocalDb {
    pub fn new(path: PathBuf, gateway_url: String) -> Self {
        Self { path, gateway_url }
    }

    /// State recorded against another gateway reads as empty.
    pub fn load(&self) -> Result<LocalState, StateError> {
        let state = read_json::<LocalState, StateError>(&self.path)?.unwrap_or_default();
        match state.gateway_url.as_deref() {
            Some(gateway_url) if gateway_url != self.gateway_url => Ok(LocalState::default()),
            _ => Ok(state),
        }
    }

    pub fn set_current_user(&self, user_id: UserId) -> Result<(), StateError> {
        self.update(|state| state.current_user_id = Some(user_id))
    }

    pub fn set_last_thread(&self, thread_id: &str) -> Result<(), StateError> {
        self.update(|state| state.last_thread_id = Some(thread_id.to_string()))
    }

    pub fn clear(&self) -> Result<(), StateError> {
        self.update(|state| {
            state.current_user_id = None;
            state.last_thread_id = None;
        })
    }

    fn update(&self, apply: impl FnOnce(&mut LocalState)) -> Result<(), StateError> {
        let mut state = self.load()?;
        apply(&mut state);
        state.gateway_url = Some(self.gateway_url.clone());
        state.updated_at = Some(current_epoch_seconds());
        write_private_json(&self.path, &state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remembers_user_and_last_thread() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = LocalDb::new(dir.path().join("state.json"), "http://gw/v1".to_string());
        assert!(db.load().expect("load").current_user_id.is_none());

        db.set_current_user(UserId::new("42")).expect("user");
        db.set_last_thread("t9").expect("thread");
        let state = db.load().expect("load");
        assert_eq!(state.current_user_id, Some(UserId::new("42")));
        assert_eq!(state.last_thread_id.as_deref(), Some("t9"));

        db.clear().expect("clear");
        let state = db.load().expect("load");
        assert!(state.current_user_id.is_none());
        assert!(state.last_thread_id.is_none());
    }
}
