use std::io::{self, Write};

use futures_util::future::join_all;

use crate::dates::format_message_time;
use crate::images::ImageCache;
use crate::model::{Attachment, Message, UserId};

const WRAP_COLUMNS: usize = 70;
const INDENT: &str = "    ";

pub async fn write_transcript<W: Write>(
    out: &mut W,
    messages: &[Message],
    my_id: &UserId,
    images: &ImageCache,
) -> io::Result<usize> {
    let mut written = 0;
    for message in messages {
        let Some(block) = message_to_string(message, my_id, images).await else {
            continue;
        };
        writeln!(out, "{block}")?;
        out.flush()?;
        written += 1;
    }
    Ok(written)
}

/// `None` for status events that carry neither text nor attachments.
pub async fn message_to_string(message: &Message, my_id: &UserId, images: &ImageCache) -> Option<String> {
    if !message.is_printable() {
        return None;
    }

    let sender = if &message.sender_id == my_id {
        "Me".to_string()
    } else {
        message
            .sender_name
            .clone()
            .unwrap_or_else(|| message.sender_id.to_string())
    };
    let mut block = format!("{} ({})\n", sender, format_message_time(message.timestamp));

    let body = message.body_text();
    if !body.is_empty() {
        let wrapped = body
            .split('\n')
            .map(|line| split_long_text(line, WRAP_COLUMNS).join(&format!("\n{INDENT}")))
            .collect::<Vec<_>>()
            .join(&format!("\n{INDENT}"));
        block.push_str(&format!("  > {wrapped}\n"));
    }

    let attachments = join_all(
        message
            .attachments
            .iter()
            .map(|attachment| attachment_text(attachment, images)),
    )
    .await;
    for text in attachments {
        block.push_str(&text);
        block.push('\n');
    }

    Some(block)
}

pub async fn attachment_text(attachment: &Attachment, images: &ImageCache) -> String {
    let pretext = match attachment.description.as_deref() {
        Some(description) => format!("{INDENT}{description}\n\n"),
        None => "\n".to_string(),
    };
    let art = images.resolve(attachment.url().unwrap_or("")).await;
    let art = art
        .split('\n')
        .map(|line| format!("{INDENT}{line}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{pretext}{art}")
}

// Breaks only at whitespace, dropping the whitespace it breaks on.
pub fn split_long_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    let mut count = 0usize;
    for ch in text.chars() {
        if count < width || !ch.is_whitespace() {
            line.push(ch);
            count += 1;
        } else {
            lines.push(std::mem::take(&mut line));
            count = 0;
        }
    }
    if count > 0 {
        lines.push(line);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::tests::{FakeFetcher, encoded_gradient};
    use crate::images::Viewport;
    use crate::model::AttachmentSource;
    use image::ImageFormat;
    use std::sync::Arc;

    fn message(id: &str, sender: &str, body: Option<&str>, attachments: Vec<Attachment>) -> Message {
        Message {
            message_id: id.to_string(),
            thread_id: "t1".to_string(),
            sender_id: UserId::new(sender),
            sender_name: Some("Alice".to_string()),
            body: body.map(str::to_string),
            attachments,
            timestamp: 1_769_612_645_000,
        }
    }

    fn images(dir: &std::path::Path, fetcher: Arc<FakeFetcher>) -> ImageCache {
        ImageCache::new(dir.to_path_buf(), fetcher).with_viewport(Viewport { columns: 40, rows: 20 })
    }

    #[test]
    fn split_breaks_only_on_whitespace() {
        assert_eq!(split_long_text("short", 70), vec!["short"]);
        assert_eq!(split_long_text("aaaa bbbb cccc", 4), vec!["aaaa", "bbbb", "cccc"]);
        assert_eq!(split_long_text("abcdefgh ij", 4), vec!["abcdefgh", "ij"]);
        assert!(split_long_text("", 70).is_empty());
    }

    #[tokio::test]
    async fn status_events_produce_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fetcher = Arc::new(FakeFetcher::failing(500));
        let images = images(dir.path(), fetcher);
        let me = UserId::new("me");

        let empty = message("m1", "alice", Some(""), Vec::new());
        assert!(message_to_string(&empty, &me, &images).await.is_none());

        let mut out = Vec::new();
        let written = write_transcript(&mut out, &[empty], &me, &images).await.expect("write");
        assert_eq!(written, 0);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn own_messages_are_labelled_me() {
        let dir = tempfile::tempdir().expect("tempdir");
        let images = images(dir.path(), Arc::new(FakeFetcher::failing(500)));

        let block = message_to_string(&message("m1", "fbid:me", Some("hello\nworld"), Vec::new()), &UserId::new("me"), &images)
            .await
            .expect("printable");
        assert!(block.starts_with("Me ("));
        assert!(block.contains("  > hello\n    world\n"));
    }

    #[tokio::test]
    async fn transcript_keeps_message_order_and_renders_images() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fetcher = Arc::new(FakeFetcher::serving(encoded_gradient(ImageFormat::Png), Some("image/png")));
        let images = images(dir.path(), fetcher.clone());
        let photo = Attachment {
            source: Some(AttachmentSource::PreviewUrl("http://x/photo.png".to_string())),
            description: Some("holiday".to_string()),
        };
        let messages = vec![
            message("m1", "alice", Some("first"), Vec::new()),
            message("m2", "alice", None, vec![photo]),
            message("m3", "alice", Some("third"), Vec::new()),
        ];

        let mut out = Vec::new();
        let written = write_transcript(&mut out, &messages, &UserId::new("me"), &images)
            .await
            .expect("write");
        let text = String::from_utf8(out).expect("utf8");

        assert_eq!(written, 3);
        let first = text.find("> first").expect("first");
        let photo = text.find("    holiday\n\n    http://x/photo.png").expect("photo");
        let third = text.find("> third").expect("third");
        assert!(first < photo && photo < third);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn broken_attachment_does_not_abort_message() {
        let dir = tempfile::tempdir().expect("tempdir");
        let images = images(dir.path(), Arc::new(FakeFetcher::failing(404)));
        let broken = Attachment {
            source: Some(AttachmentSource::DirectUrl("http://x/gone.jpg".to_string())),
            description: None,
        };

        let block = message_to_string(&message("m1", "alice", Some("look"), vec![broken]), &UserId::new("me"), &images)
            .await
            .expect("printable");
        assert!(block.starts_with("Alice ("));
        assert!(block.ends_with("  > look\n\n    \n"));
    }
}
