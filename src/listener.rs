use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::model::{Message, Thread};
use crate::realtime::RealtimeError;
use crate::store::{MergeOutcome, SharedStore, StoreError};
use crate::transport::Transport;

pub fn spawn_merge_worker<T, S, F>(store: SharedStore, transport: Arc<T>, events: S, on_new: F) -> JoinHandle<()>
where
    T: Transport + ?Sized + 'static,
    S: Stream<Item = Result<Message, RealtimeError>> + Send + Unpin + 'static,
    F: Fn(&Message, &Thread) + Send + 'static,
{
    tokio::spawn(run_merge_loop(store, transport, events, on_new))
}

async fn run_merge_loop<T, S, F>(store: SharedStore, transport: Arc<T>, mut events: S, on_new: F)
where
    T: Transport + ?Sized,
    S: Stream<Item = Result<Message, RealtimeError>> + Unpin,
    F: Fn(&Message, &Thread),
{
    while let Some(event) = events.next().await {
        let message = match event {
            Ok(message) => message,
            Err(error) => {
                warn!(%error, "push listener error");
                continue;
            }
        };
        let thread_id = message.thread_id.clone();
        let mut guard = store.lock().await;
        let outcome = match guard.merge_incoming(transport.as_ref(), message.clone(), &thread_id).await {
            Ok(outcome) => outcome,
            Err(StoreError::NotFound(thread_id)) => {
                debug!(thread_id, "push message for a thread outside the loaded list");
                continue;
            }
            Err(error) => {
                warn!(thread_id, %error, "could not merge pushed message");
                continue;
            }
        };
        let latest = match &outcome {
            MergeOutcome::Appended(_) => Some(&message),
            MergeOutcome::Fetched(thread) => thread.messages.as_ref().and_then(|messages| messages.last()),
            MergeOutcome::Duplicate(_) => None,
        };
        if let Some(latest) = latest {
            on_new(latest, outcome.thread());
        }
    }
    debug!("merge worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UserId;
    use crate::realtime::Subscription;
    use crate::store::ThreadStore;
    use crate::store::tests::{FakeTransport, message, thread};
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::mpsc;

    fn pushed(id: &str, thread_id: &str, timestamp: i64) -> Message {
        let mut message = message(id, "alice", id, timestamp);
        message.thread_id = thread_id.to_string();
        message
    }

    #[tokio::test]
    async fn applies_pushes_serially_and_ignores_redelivery() {
        let mut histories = HashMap::new();
        histories.insert("t1".to_string(), vec![pushed("m1", "t1", 100)]);
        let transport = Arc::new(FakeTransport {
            threads: vec![thread("t1", &["alice", "me"], 100), thread("t2", &["bob", "me"], 500)],
            histories,
            ..FakeTransport::default()
        });
        let mut store = ThreadStore::new(UserId::new("me"));
        store.refresh(transport.as_ref(), None).await.expect("refresh");
        store.fetch_page(transport.as_ref(), "t1", None).await.expect("fetch");
        let store = store.into_shared();

        let (sender, events) = mpsc::channel(16);
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let worker = spawn_merge_worker(store.clone(), transport, Subscription::from_channel(events), move |message, _| {
            sink.lock().expect("seen lock").push(message.message_id.clone());
        });

        for event in [
            Ok(pushed("m3", "t1", 900)),
            Ok(pushed("m2", "t1", 600)),
            Ok(pushed("m3", "t1", 900)),
            Err(RealtimeError::Listener("hiccup".to_string())),
            Ok(pushed("m4", "elsewhere", 1_000)),
        ] {
            sender.send(event).await.expect("send");
        }
        drop(sender);
        worker.await.expect("worker");

        assert_eq!(seen.lock().expect("seen lock").as_slice(), ["m3", "m2"]);
        let store = store.lock().await;
        let t1 = store.thread("t1").expect("t1");
        let ids: Vec<&str> = t1
            .messages
            .as_ref()
            .expect("messages")
            .iter()
            .map(|message| message.message_id.as_str())
            .collect();
        assert_eq!(ids, ["m1", "m2", "m3"]);
        assert_eq!(t1.timestamp, 900);
        assert_eq!(store.threads()[0].thread_id, "t1");
    }
}
