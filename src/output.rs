use serde::Serialize;
use thiserror::Error;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::dates::format_relative_date;
use crate::model::{Friend, Thread};
use crate::store::{display_name, truncate_chars};

const SNIPPET_MAX_CHARS: usize = 50;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadListOutput {
    pub items: Vec<ThreadListItem>,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadListItem {
    pub thread_id: String,
    pub display_name: String,
    pub snippet: String,
    pub timestamp: i64,
    pub relative_date: String,
    pub friends: Vec<Friend>,
    pub is_self: bool,
}

impl ThreadListOutput {
    pub fn build<'a>(threads: impl IntoIterator<Item = &'a Thread>, now_ms: i64) -> Self {
        let items = threads
            .into_iter()
            .map(|thread| ThreadListItem {
                thread_id: thread.thread_id.clone(),
                display_name: display_name(thread),
                snippet: collapse_snippet(&thread.snippet),
                timestamp: thread.timestamp,
                relative_date: format_relative_date(thread.timestamp, now_ms),
                friends: thread.friends.clone(),
                is_self: thread.is_self,
            })
            .collect();
        Self { items }
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), OutputError> {
    let payload = serde_json::to_string_pretty(value)?;
    println!("{payload}");
    Ok(())
}

pub fn print_thread_list(output: &ThreadListOutput, json: bool) -> Result<(), OutputError> {
    if json {
        return print_json(output);
    }

    let mut id_width = display_width("id");
    let mut name_width = display_width("name");
    let mut when_width = display_width("when");
    for item in &output.items {
        id_width = id_width.max(display_width(&item.thread_id));
        name_width = name_width.max(display_width(&item.display_name));
        when_width = when_width.max(display_width(&item.relative_date));
    }
    id_width = id_width.min(20);
    name_width = name_width.min(32);
    when_width = when_width.min(10);

    println!(
        "{}  {}  {}  {}",
        pad_left("id", id_width),
        pad_right("name", name_width),
        pad_right("when", when_width),
        pad_right("last message", SNIPPET_MAX_CHARS),
    );
    for item in &output.items {
        let snippet = if item.snippet.is_empty() {
            "<no messages>"
        } else {
            item.snippet.as_str()
        };
        println!(
            "{}  {}  {}  {}",
            pad_left(&truncate_display(&item.thread_id, id_width), id_width),
            pad_right(&truncate_display(&item.display_name, name_width), name_width),
            pad_right(&item.relative_date, when_width),
            pad_right(snippet, SNIPPET_MAX_CHARS),
        );
    }
    Ok(())
}

/// `"3. Alice Liddell: see you"`, as offered by the thread picker.
pub fn thread_choice_label(index: usize, thread: &Thread) -> String {
    format!(
        "{}. {}: {}",
        index + 1,
        display_name(thread),
        collapse_snippet(&thread.snippet)
    )
}

/// Joins non-empty snippet lines with spaces and caps the result at 50
/// characters.
pub fn collapse_snippet(snippet: &str) -> String {
    let joined = snippet
        .split('\n')
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    truncate_chars(&joined, SNIPPET_MAX_CHARS)
}

fn display_width(value: &str) -> usize {
    UnicodeWidthStr::width(value)
}

fn truncate_display(value: &str, max_width: usize) -> String {
    if display_width(value) <= max_width {
        return value.to_string();
    }
    let ellipsis = "...";
    let mut width = 0usize;
    let mut output = String::new();
    for ch in value.chars() {
        let ch_width = UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + ch_width + ellipsis.len() > max_width {
            break;
        }
        output.push(ch);
        width += ch_width;
    }
    output.push_str(ellipsis);
    output
}

fn pad_right(value: &str, width: usize) -> String {
    let mut output = value.to_string();
    let current = display_width(value);
    if current < width {
        output.push_str(&" ".repeat(width - current));
    }
    output
}

fn pad_left(value: &str, width: usize) -> String {
    let current = display_width(value);
    if current >= width {
        return value.to_string();
    }
    let mut output = " ".repeat(width - current);
    output.push_str(value);
    output
}
