use std::sync::LazyLock;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use tracing::{info, warn};

use crate::config::Settings;
use crate::discord::{DiscordClient, Message};
use crate::store::{self, Author, LinkRecord};

static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").unwrap());

const EXCERPT_CHARS: usize = 200;

/// Every `http(s)://` run up to the next whitespace, in order of appearance.
pub fn extract_urls(content: &str) -> Vec<String> {
    URL_RE
        .find_iter(content)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// One record per URL in the message, all sharing the message metadata.
pub fn records_from_message(message: &Message) -> Vec<LinkRecord> {
    let urls = extract_urls(&message.content);
    if urls.is_empty() {
        return Vec::new();
    }

    let author = Author {
        username: message.author.username.clone(),
        display_name: message.author.display_name().to_string(),
        id: message.author.id.clone(),
        avatar: message.author.avatar_url(),
    };
    let timestamp = normalize_timestamp(&message.timestamp);
    let content: String = message.content.chars().take(EXCERPT_CHARS).collect();

    urls.into_iter()
        .map(|url| LinkRecord {
            url,
            author: author.clone(),
            timestamp: timestamp.clone(),
            message_id: message.id.clone(),
            content: content.clone(),
            has_attachments: !message.attachments.is_empty(),
            attachment_count: message.attachments.len() as u32,
            ..Default::default()
        })
        .collect()
}

/// `2024-01-01T00:00:00.000000+00:00` → `2024-01-01T00:00:00.000Z`.
fn normalize_timestamp(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(t) => t
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Millis, true),
        Err(e) => {
            warn!("Unparseable timestamp {:?}: {}", raw, e);
            raw.to_string()
        }
    }
}

fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Newest first. Stable, so records from one message keep their URL order.
pub fn sort_newest_first(links: &mut [LinkRecord]) {
    links.sort_by(|a, b| parse_timestamp(&b.timestamp).cmp(&parse_timestamp(&a.timestamp)));
}

pub fn build_records(messages: &[Message]) -> Vec<LinkRecord> {
    let mut links: Vec<LinkRecord> = messages.iter().flat_map(records_from_message).collect();
    sort_newest_first(&mut links);
    links
}

/// Link Extractor stage. Nothing is written unless every page was fetched.
pub async fn run(settings: &Settings) -> Result<usize> {
    let creds = settings.discord()?;
    let client = DiscordClient::new(&creds.token)?;

    info!("Fetching messages from thread {}", creds.thread_id);
    let thread = client.fetch_channel(&creds.thread_id).await?;
    if let Some(name) = &thread.name {
        println!("Thread: {}", name);
    }

    let messages = client.fetch_all_messages(&thread.id).await?;
    println!("Fetched {} messages", messages.len());

    let links = build_records(&messages);
    println!("Extracted {} URLs", links.len());

    store::save_links(&settings.data_path, &links)?;
    println!("Saved links to {}", settings.data_path.display());
    Ok(links.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(id: &str, content: &str, timestamp: &str) -> Message {
        serde_json::from_value(json!({
            "id": id,
            "content": content,
            "timestamp": timestamp,
            "author": { "id": "1", "username": "bob" },
            "attachments": []
        }))
        .unwrap()
    }

    #[test]
    fn one_message_two_urls() {
        let text = "check this out https://example.com and https://a.test/x thanks";
        let msg = message("m1", text, "2024-01-01T00:00:00.000Z");
        let links = build_records(&[msg]);

        assert_eq!(links.len(), 2);
        assert_eq!(links[0].url, "https://example.com");
        assert_eq!(links[1].url, "https://a.test/x");
        for l in &links {
            assert_eq!(l.author.id, "1");
            assert_eq!(l.author.username, "bob");
            assert_eq!(l.author.display_name, "bob");
            assert_eq!(l.timestamp, "2024-01-01T00:00:00.000Z");
            assert_eq!(l.content, text);
            assert_eq!(l.message_id, "m1");
            assert!(!l.has_attachments);
            assert_eq!(l.attachment_count, 0);
        }
    }

    #[test]
    fn no_urls_no_records() {
        let msg = message("m1", "nothing to see here, just ftp://x", "2024-01-01T00:00:00Z");
        assert!(records_from_message(&msg).is_empty());
    }

    #[test]
    fn url_runs_to_whitespace() {
        assert_eq!(
            extract_urls("see (https://a.test/p?q=1)\nand http://b.test"),
            vec!["https://a.test/p?q=1)", "http://b.test"]
        );
    }

    #[test]
    fn excerpt_is_200_chars() {
        let long = format!("https://a.test {}", "あ".repeat(300));
        let msg = message("m1", &long, "2024-01-01T00:00:00Z");
        let links = records_from_message(&msg);
        assert_eq!(links[0].content.chars().count(), 200);
    }

    #[test]
    fn attachments_counted() {
        let msg: Message = serde_json::from_value(json!({
            "id": "m1",
            "content": "https://a.test",
            "timestamp": "2024-01-01T00:00:00Z",
            "author": { "id": "1", "username": "bob", "global_name": "Bobby" },
            "attachments": [{ "id": "a1" }, { "id": "a2" }]
        }))
        .unwrap();
        let links = records_from_message(&msg);
        assert!(links[0].has_attachments);
        assert_eq!(links[0].attachment_count, 2);
        assert_eq!(links[0].author.display_name, "Bobby");
    }

    #[test]
    fn discord_timestamps_normalized_and_sorted_desc() {
        let msgs = vec![
            message("old", "https://old.test", "2023-05-01T10:00:00.000000+00:00"),
            message("new", "https://new.test", "2024-02-01T09:30:00.123000+09:00"),
            message("mid", "https://mid.test", "2023-12-31T23:59:59.000000+00:00"),
        ];
        let links = build_records(&msgs);
        let urls: Vec<&str> = links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(urls, vec!["https://new.test", "https://mid.test", "https://old.test"]);
        assert_eq!(links[0].timestamp, "2024-02-01T00:30:00.123Z");
    }
}
