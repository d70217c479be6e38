use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::{SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::debug;
use url::Url;

use crate::model::Message;

const EVENT_BUFFER: usize = 256;

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("url error: {0}")]
    Url(#[from] url::ParseError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("connection error")]
    ConnectionError,
    #[error("not logged in")]
    NotAuthenticated,
    #[error("listener error: {0}")]
    Listener(String),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ClientFrame<'a> {
    Init { token: &'a str },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub(crate) enum ServerFrame {
    Open,
    Message { message: Message },
    Error { message: String },
    #[serde(other)]
    Other,
}

pub struct Subscription {
    events: mpsc::Receiver<Result<Message, RealtimeError>>,
    reader: Option<JoinHandle<()>>,
}

impl Subscription {
    pub async fn connect(url: &str, token: &str) -> Result<Self, RealtimeError> {
        let url = Url::parse(url)?;
        let (mut ws, _) = connect_async(url).await?;

        let init = serde_json::to_string(&ClientFrame::Init { token })?;
        ws.send(WsMessage::Text(init)).await?;
        wait_for_open(&mut ws).await?;

        let (sender, events) = mpsc::channel(EVENT_BUFFER);
        let reader = tokio::spawn(read_frames(ws, sender));
        Ok(Self {
            events,
            reader: Some(reader),
        })
    }

    #[cfg(test)]
    pub(crate) fn from_channel(events: mpsc::Receiver<Result<Message, RealtimeError>>) -> Self {
        Self { events, reader: None }
    }

}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl Stream for Subscription {
    type Item = Result<Message, RealtimeError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

async fn wait_for_open(ws: &mut WsStream) -> Result<(), RealtimeError> {
    loop {
        let Some(frame) = read_frame(ws).await? else {
            return Err(RealtimeError::ConnectionError);
        };
        match frame {
            ServerFrame::Open => return Ok(()),
            ServerFrame::Error { message } => return Err(RealtimeError::Listener(message)),
            _ => {}
        }
    }
}

async fn read_frames(mut ws: WsStream, sender: mpsc::Sender<Result<Message, RealtimeError>>) {
    loop {
        let event = match read_frame(&mut ws).await {
            Ok(Some(ServerFrame::Message { message })) => Ok(message),
            Ok(Some(ServerFrame::Error { message })) => Err(RealtimeError::Listener(message)),
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(error @ RealtimeError::Json(_)) => Err(error),
            Err(error) => {
                let _ = sender.send(Err(error)).await;
                break;
            }
        };
        if sender.send(event).await.is_err() {
            break;
        }
    }
    debug!("push listener closed");
}

/// Next JSON frame, or `None` once the socket has closed.
async fn read_frame(ws: &mut WsStream) -> Result<Option<ServerFrame>, RealtimeError> {
    loop {
        let Some(message) = ws.next().await else {
            return Ok(None);
        };
        match message? {
            WsMessage::Text(text) => return Ok(Some(parse_frame(&text)?)),
            WsMessage::Binary(data) => return Ok(Some(serde_json::from_slice(&data)?)),
            WsMessage::Close(_) => return Ok(None),
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            _ => continue,
        }
    }
}

pub(crate) fn parse_frame(text: &str) -> Result<ServerFrame, RealtimeError> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_server_frames() {
        let frame = parse_frame(
            r#"{"type": "message", "message": {"messageID": "m1", "threadID": "t1", "senderID": "7", "body": "hi", "timestamp": 10}}"#,
        )
        .expect("message frame");
        let ServerFrame::Message { message } = frame else {
            panic!("expected message frame");
        };
        assert_eq!(message.thread_id, "t1");

        assert!(matches!(parse_frame(r#"{"type": "open"}"#), Ok(ServerFrame::Open)));
        assert!(matches!(parse_frame(r#"{"type": "typing", "from": "7"}"#), Ok(ServerFrame::Other)));
        assert!(parse_frame("not json").is_err());
    }

    #[tokio::test]
    async fn subscription_ends_when_source_closes() {
        let (sender, events) = mpsc::channel(4);
        let mut subscription = Subscription::from_channel(events);
        sender
            .send(Err(RealtimeError::ConnectionError))
            .await
            .expect("send");
        drop(sender);

        assert!(matches!(subscription.next().await, Some(Err(RealtimeError::ConnectionError))));
        assert!(subscription.next().await.is_none());
        assert!(subscription.next().await.is_none());
    }
}
