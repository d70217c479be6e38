use std::io;
use std::sync::Arc;

use dialoguer::{Confirm, Editor, Input, Select};
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

use crate::api::GatewayClient;
use crate::images::ImageCache;
use crate::listener::spawn_merge_worker;
use crate::model::{Message, Thread};
use crate::output::thread_choice_label;
use crate::state::{LocalDb, StateError};
use crate::store::{SharedStore, StoreError, ThreadStore, display_name};
use crate::transcript::write_transcript;
use crate::transport::Transport;

const HELP: &str = "\
Commands:
  threads [search]  pick a thread and print it (alias: t)
  send              send a message (alias: s)
  reload            reload threads and friends
  help              show this help
  exit              leave (alias: quit)";

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),
    #[error("prompt task failed: {0}")]
    Join(#[from] JoinError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, PartialEq, Eq)]
enum ShellCommand<'a> {
    Threads(Option<&'a str>),
    Send,
    Reload,
    Help,
    Exit,
    Empty,
    Unknown(&'a str),
}

fn parse_command(line: &str) -> ShellCommand<'_> {
    let line = line.trim();
    let (name, rest) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, Some(rest.trim()).filter(|rest| !rest.is_empty())),
        None => (line, None),
    };
    match name {
        "" => ShellCommand::Empty,
        "threads" | "t" => ShellCommand::Threads(rest),
        "send" | "s" => ShellCommand::Send,
        "reload" => ShellCommand::Reload,
        "help" | "?" => ShellCommand::Help,
        "exit" | "quit" => ShellCommand::Exit,
        other => ShellCommand::Unknown(other),
    }
}

struct Shell {
    client: Arc<GatewayClient>,
    store: SharedStore,
    images: ImageCache,
    local_db: LocalDb,
    current_thread: Option<String>,
}

pub async fn run(
    client: GatewayClient,
    images: ImageCache,
    local_db: LocalDb,
    realtime_url: &str,
) -> Result<(), ShellError> {
    let client = Arc::new(client);
    let mut store = ThreadStore::new(client.current_user_id());
    store.refresh(client.as_ref(), None).await?;
    println!("Loaded {} threads. Type `help` for commands.", store.threads().len());

    let store = store.into_shared();
    let worker = start_notifications(&client, &store, realtime_url).await;

    let mut shell = Shell {
        client,
        store,
        images,
        current_thread: local_db.load()?.last_thread_id,
        local_db,
    };
    let result = shell.repl().await;

    if let Some(worker) = worker {
        worker.abort();
    }
    result
}

async fn start_notifications(
    client: &Arc<GatewayClient>,
    store: &SharedStore,
    realtime_url: &str,
) -> Option<JoinHandle<()>> {
    match client.subscribe_incoming(realtime_url).await {
        Ok(subscription) => Some(spawn_merge_worker(
            store.clone(),
            client.clone(),
            subscription,
            notify_new_message,
        )),
        Err(error) => {
            warn!(%error, "push listener unavailable");
            eprintln!("Live updates are unavailable: {error}");
            None
        }
    }
}

fn notify_new_message(message: &Message, thread: &Thread) {
    println!("\nNew message! {} ({})", message.body_text(), display_name(thread));
}

impl Shell {
    async fn repl(&mut self) -> Result<(), ShellError> {
        loop {
            let line = blocking(|| {
                Input::<String>::new()
                    .with_prompt("messenger")
                    .allow_empty(true)
                    .interact_text()
            })
            .await?;

            let outcome = match parse_command(&line) {
                ShellCommand::Empty => Ok(()),
                ShellCommand::Exit => return Ok(()),
                ShellCommand::Help => {
                    println!("{HELP}");
                    Ok(())
                }
                ShellCommand::Threads(search) => self.threads(search).await,
                ShellCommand::Send => self.send().await,
                ShellCommand::Reload => self.reload().await,
                ShellCommand::Unknown(name) => {
                    eprintln!("Unknown command `{name}`. Type `help` for a list.");
                    Ok(())
                }
            };

            // Remote failures abort the command, not the shell.
            match outcome {
                Ok(()) => {}
                Err(ShellError::Store(error)) => eprintln!("{error}"),
                Err(error) => return Err(error),
            }
        }
    }

    async fn threads(&mut self, search: Option<&str>) -> Result<(), ShellError> {
        let Some(thread_id) = self.pick_thread(search).await? else {
            return Ok(());
        };
        self.open_thread(&thread_id).await
    }

    async fn reload(&mut self) -> Result<(), ShellError> {
        let mut store = self.store.lock().await;
        store.refresh(self.client.as_ref(), None).await?;
        println!("Loaded {} threads and {} friends.", store.threads().len(), store.friends().len());
        Ok(())
    }

    async fn send(&mut self) -> Result<(), ShellError> {
        let Some(thread_id) = self.send_target().await? else {
            return Ok(());
        };

        let body = match blocking(|| Editor::new().edit("").map_err(dialoguer::Error::from)).await {
            Ok(Some(body)) => body,
            Ok(None) => {
                println!("Message discarded.");
                return Ok(());
            }
            Err(error) => {
                debug!(%error, "editor unavailable, reading a single line");
                blocking(|| Input::<String>::new().with_prompt("Message").interact_text()).await?
            }
        };
        let body = body.trim().to_string();
        if body.is_empty() {
            println!("Message discarded.");
            return Ok(());
        }

        self.store
            .lock()
            .await
            .send_message(self.client.as_ref(), &body, &thread_id)
            .await?;
        self.remember_thread(&thread_id)?;
        println!("Sent.");
        Ok(())
    }

    /// The current thread if the user confirms it, otherwise a fresh pick.
    async fn send_target(&mut self) -> Result<Option<String>, ShellError> {
        let current = match self.current_thread.as_deref() {
            Some(thread_id) => {
                let store = self.store.lock().await;
                store
                    .thread(thread_id)
                    .map(|thread| (thread.thread_id.clone(), display_name(thread)))
            }
            None => None,
        };

        if let Some((thread_id, name)) = current {
            let prompt = format!("Send to {name}?");
            let confirmed = blocking(move || Confirm::new().with_prompt(prompt).default(true).interact()).await?;
            if confirmed {
                return Ok(Some(thread_id));
            }
        }
        self.pick_thread(None).await
    }

    async fn pick_thread(&self, search: Option<&str>) -> Result<Option<String>, ShellError> {
        let (ids, labels): (Vec<String>, Vec<String>) = {
            let store = self.store.lock().await;
            store
                .search(search)
                .into_iter()
                .enumerate()
                .map(|(index, thread)| (thread.thread_id.clone(), thread_choice_label(index, thread)))
                .unzip()
        };
        if ids.is_empty() {
            println!("No threads found.");
            return Ok(None);
        }

        let selection = blocking(move || {
            Select::new()
                .with_prompt("Thread")
                .items(labels.as_slice())
                .default(0)
                .interact_opt()
        })
        .await?;
        Ok(selection.and_then(|index| ids.get(index).cloned()))
    }

    async fn open_thread(&mut self, thread_id: &str) -> Result<(), ShellError> {
        let (thread, my_id) = {
            let mut store = self.store.lock().await;
            let thread = store.fetch_page(self.client.as_ref(), thread_id, None).await?;
            (thread, store.current_user_id().clone())
        };
        self.remember_thread(thread_id)?;

        println!("== {} ({} messages) ==", display_name(&thread), thread.message_count());
        let messages = thread.messages.unwrap_or_default();
        write_transcript(&mut io::stdout(), &messages, &my_id, &self.images).await?;
        Ok(())
    }

    fn remember_thread(&mut self, thread_id: &str) -> Result<(), ShellError> {
        self.current_thread = Some(thread_id.to_string());
        self.local_db.set_last_thread(thread_id)?;
        Ok(())
    }
}

async fn blocking<T, F>(prompt: F) -> Result<T, ShellError>
where
    T: Send + 'static,
    F: FnOnce() -> dialoguer::Result<T> + Send + 'static,
{
    Ok(tokio::task::spawn_blocking(prompt).await??)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_aliases() {
        assert_eq!(parse_command("threads"), ShellCommand::Threads(None));
        assert_eq!(parse_command("  t   bob  "), ShellCommand::Threads(Some("bob")));
        assert_eq!(parse_command("threads weekend plans"), ShellCommand::Threads(Some("weekend plans")));
        assert_eq!(parse_command("s"), ShellCommand::Send);
        assert_eq!(parse_command("reload"), ShellCommand::Reload);
        assert_eq!(parse_command("quit"), ShellCommand::Exit);
        assert_eq!(parse_command("   "), ShellCommand::Empty);
        assert_eq!(parse_command("dance now"), ShellCommand::Unknown("dance"));
    }
}
