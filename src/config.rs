use std::env;
use std::path::PathBuf;

use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub gateway_url: String,
    pub realtime_url: String,
    pub data_dir: PathBuf,
    pub session_path: PathBuf,
    pub state_path: PathBuf,
    pub cache_dir: PathBuf,
    pub log_filter: String,
}

impl Config {
    pub fn load() -> Self {
        let gateway_url = env::var("MESSENGER_GATEWAY_URL").unwrap_or_else(|_| DEFAULT_GATEWAY_URL.to_string());
        let gateway_url = gateway_url.trim_end_matches('/').to_string();

        let realtime_url = env::var("MESSENGER_REALTIME_URL")
            .unwrap_or_else(|_| default_realtime_url(&gateway_url));
        let realtime_url = realtime_url.trim_end_matches('/').to_string();

        let data_dir = env::var("MESSENGER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());
        let session_path = env::var("MESSENGER_SESSION_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("appstate.json"));
        let state_path = env::var("MESSENGER_STATE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("state.json"));
        let cache_dir = env::var("MESSENGER_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("data"));

        let log_filter = env::var("MESSENGER_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());

        Self {
            gateway_url,
            realtime_url,
            data_dir,
            session_path,
            state_path,
            cache_dir,
            log_filter,
        }
    }
}

const DEFAULT_GATEWAY_URL: &str = "http://localhost:8787/v1";
const DEFAULT_LOG_FILTER: &str = "warn";

/// `http(s)://host/v1` becomes `ws(s)://host/v1/listen`.
fn default_realtime_url(gateway_url: &str) -> String {
    let base = if let Some(rest) = gateway_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = gateway_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        gateway_url.to_string()
    };
    format!("{base}/listen")
}

fn default_data_dir() -> PathBuf {
    let base = env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."));
    base.join(".messenger-cli")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realtime_url_follows_gateway_scheme() {
        assert_eq!(default_realtime_url("https://gw.example/v1"), "wss://gw.example/v1/listen");
        assert_eq!(default_realtime_url("http://localhost:8787/v1"), "ws://localhost:8787/v1/listen");
    }
}
