use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::model::{Friend, Message, Thread, UserId};
use crate::transport::{Transport, TransportError};

pub const DEFAULT_THREAD_LIMIT: usize = 50;
pub const DEFAULT_PAGE_SIZE: usize = 50;

const DISPLAY_NAME_MAX_CHARS: usize = 50;
const ELLIPSIS: &str = "...";

pub type SharedStore = Arc<Mutex<ThreadStore>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("thread not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("invalid input: {0}")]
    Validation(String),
}

#[derive(Debug, Clone)]
pub enum MergeOutcome {
    Appended(Thread),
    Duplicate(Thread),
    Fetched(Thread),
}

impl MergeOutcome {
    pub fn thread(&self) -> &Thread {
        match self {
            MergeOutcome::Appended(thread)
            | MergeOutcome::Duplicate(thread)
            | MergeOutcome::Fetched(thread) => thread,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ThreadStore {
    current_user_id: UserId,
    threads: Vec<Thread>,
    friends: Vec<Friend>,
}

impl ThreadStore {
    pub fn new(current_user_id: UserId) -> Self {
        Self {
            current_user_id,
            threads: Vec::new(),
            friends: Vec::new(),
        }
    }

    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    pub fn current_user_id(&self) -> &UserId {
        &self.current_user_id
    }

    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    pub fn friends(&self) -> &[Friend] {
        &self.friends
    }

    pub fn thread(&self, thread_id: &str) -> Option<&Thread> {
        self.threads.iter().find(|thread| thread.thread_id == thread_id)
    }

    pub async fn refresh<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        limit: Option<usize>,
    ) -> Result<(), StoreError> {
        let limit = limit.unwrap_or(DEFAULT_THREAD_LIMIT);
        let (threads, friends) = tokio::try_join!(
            transport.fetch_thread_list(0, limit),
            transport.fetch_friend_list()
        )?;
        self.replace_threads(threads);
        self.friends = friends;
        self.link_friends();
        Ok(())
    }

    pub async fn load_threads<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        limit: Option<usize>,
    ) -> Result<&[Thread], StoreError> {
        let limit = limit.unwrap_or(DEFAULT_THREAD_LIMIT);
        let threads = transport.fetch_thread_list(0, limit).await?;
        self.replace_threads(threads);
        Ok(&self.threads)
    }

    pub async fn load_friends<T: Transport + ?Sized>(&mut self, transport: &T) -> Result<&[Friend], StoreError> {
        self.friends = transport.fetch_friend_list().await?;
        Ok(&self.friends)
    }

    // Participants missing from the friend list are skipped.
    pub fn link_friends(&mut self) {
        let friends = &self.friends;
        let current_user_id = &self.current_user_id;
        for thread in &mut self.threads {
            thread.friends = thread
                .participants
                .iter()
                .filter_map(|id| friends.iter().find(|friend| &friend.user_id == id))
                .cloned()
                .collect();
            thread.is_self = thread.participants.len() == 1 && &thread.participants[0] == current_user_id;
        }
    }

    pub async fn fetch_page<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        thread_id: &str,
        max: Option<usize>,
    ) -> Result<Thread, StoreError> {
        if self.thread(thread_id).is_none() {
            return Err(StoreError::NotFound(thread_id.to_string()));
        }
        let max = max.unwrap_or(DEFAULT_PAGE_SIZE);
        let messages = transport.fetch_thread_history(thread_id, 0, max).await?;
        let messages = self.normalize_history(thread_id, messages);
        debug!(thread_id, count = messages.len(), "fetched thread page");

        let thread = self
            .thread_mut(thread_id)
            .ok_or_else(|| StoreError::NotFound(thread_id.to_string()))?;
        thread.messages = Some(messages);
        thread.refresh_from_last_message();
        let thread = thread.clone();
        self.sort_threads();
        Ok(thread)
    }

    /// Delivering the same message twice leaves the thread as it was after
    /// the first delivery.
    pub async fn merge_incoming<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        mut message: Message,
        thread_id: &str,
    ) -> Result<MergeOutcome, StoreError> {
        let Some(thread) = self.thread(thread_id) else {
            return Err(StoreError::NotFound(thread_id.to_string()));
        };

        let Some(messages) = thread.messages.as_ref() else {
            let thread = self.fetch_page(transport, thread_id, None).await?;
            return Ok(MergeOutcome::Fetched(thread));
        };

        if messages.iter().any(|existing| existing.message_id == message.message_id) {
            debug!(thread_id, message_id = %message.message_id, "dropping duplicate message");
            return Ok(MergeOutcome::Duplicate(thread.clone()));
        }

        message.thread_id = thread_id.to_string();
        if message.sender_name.is_none() {
            message.sender_name = self.friend_name(&message.sender_id).map(str::to_string);
        }

        let thread = self
            .thread_mut(thread_id)
            .ok_or_else(|| StoreError::NotFound(thread_id.to_string()))?;
        let messages = thread.messages.get_or_insert_with(Vec::new);
        messages.push(message);
        messages.sort_by_key(|message| message.timestamp);
        thread.refresh_from_last_message();
        let thread = thread.clone();
        self.sort_threads();
        Ok(MergeOutcome::Appended(thread))
    }

    pub fn search(&self, term: Option<&str>) -> Vec<&Thread> {
        let Some(pattern) = term.map(str::trim).filter(|term| !term.is_empty()) else {
            return self.threads.iter().collect();
        };
        let Some(regex) = build_search_regex(pattern) else {
            return Vec::new();
        };
        self.threads
            .iter()
            .filter(|thread| {
                regex.is_match(&display_name(thread))
                    || thread.friends.iter().any(|friend| regex.is_match(&friend.full_name))
            })
            .collect()
    }

    pub async fn send_message<T: Transport + ?Sized>(
        &self,
        transport: &T,
        body: &str,
        thread_id: &str,
    ) -> Result<(), StoreError> {
        if body.trim().is_empty() {
            return Err(StoreError::Validation("message body is empty".to_string()));
        }
        if self.thread(thread_id).is_none() {
            return Err(StoreError::NotFound(thread_id.to_string()));
        }
        transport.send_message(body, thread_id).await?;
        Ok(())
    }

    pub fn friend_name(&self, user_id: &UserId) -> Option<&str> {
        self.friends
            .iter()
            .find(|friend| &friend.user_id == user_id)
            .map(|friend| friend.full_name.as_str())
    }

    fn thread_mut(&mut self, thread_id: &str) -> Option<&mut Thread> {
        self.threads.iter_mut().find(|thread| thread.thread_id == thread_id)
    }

    fn replace_threads(&mut self, threads: Vec<Thread>) {
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(threads.len());
        for mut thread in threads {
            if !seen.insert(thread.thread_id.clone()) {
                continue;
            }
            let mut participants = HashSet::new();
            thread.participants.retain(|id| participants.insert(id.clone()));
            if let Some(messages) = thread.messages.take() {
                thread.messages = Some(self.normalize_history(&thread.thread_id, messages));
                thread.refresh_from_last_message();
            }
            unique.push(thread);
        }
        self.threads = unique;
        self.sort_threads();
    }

    fn normalize_history(&self, thread_id: &str, mut messages: Vec<Message>) -> Vec<Message> {
        messages.sort_by_key(|message| message.timestamp);
        let mut seen = HashSet::new();
        messages.retain(|message| seen.insert(message.message_id.clone()));
        for message in &mut messages {
            if message.thread_id.is_empty() {
                message.thread_id = thread_id.to_string();
            }
            if message.sender_name.is_none() {
                message.sender_name = self.friend_name(&message.sender_id).map(str::to_string);
            }
        }
        messages
    }

    fn sort_threads(&mut self) {
        self.threads.sort_by_key(|thread| Reverse(thread.timestamp));
    }
}

pub fn display_name(thread: &Thread) -> String {
    if thread.is_self {
        return "Me".to_string();
    }
    if let Some(name) = thread.name.as_deref().filter(|name| !name.is_empty()) {
        return name.to_string();
    }
    let joined = thread
        .friends
        .iter()
        .map(|friend| friend.full_name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    truncate_chars(&joined, DISPLAY_NAME_MAX_CHARS)
}

pub fn truncate_chars(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let keep = max.saturating_sub(ELLIPSIS.len());
    let mut output: String = value.chars().take(keep).collect();
    output.push_str(ELLIPSIS);
    output
}

fn build_search_regex(pattern: &str) -> Option<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .or_else(|_| RegexBuilder::new(&regex::escape(pattern)).case_insensitive(true).build())
        .ok()
}
