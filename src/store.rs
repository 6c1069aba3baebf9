use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::ArchiveError;

// ── Records ──

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub avatar: String,
}

/// One URL occurrence from a chat message. Fields after `attachment_count`
/// are filled in by later stages and may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRecord {
    pub url: String,
    #[serde(default)]
    pub author: Author,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub has_attachments: bool,
    #[serde(default)]
    pub attachment_count: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_ja: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// `None`: never attempted. `Some(None)`: capture failed (`null` on disk).
    #[serde(
        default,
        deserialize_with = "explicit_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub screenshot: Option<Option<String>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn explicit_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl LinkRecord {
    pub fn tags(&self) -> &[String] {
        self.tags.as_deref().unwrap_or_default()
    }

    pub fn screenshot_path(&self) -> Option<&str> {
        self.screenshot.as_ref().and_then(|s| s.as_deref())
    }

    pub fn domain(&self) -> String {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string())
    }
}

// ── Persistence ──

/// Read the whole document. A missing file is fatal for every stage but the extractor.
pub fn load_links(path: &Path) -> Result<Vec<LinkRecord>> {
    if !path.exists() {
        return Err(ArchiveError::DataFileMissing(path.to_path_buf()).into());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let links = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(links)
}

/// Rewrite the whole document through a sibling temp file and a rename.
pub fn save_links(path: &Path, links: &[LinkRecord]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(links)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub enriched: usize,
    pub tagged: usize,
    pub screenshots: usize,
    pub screenshot_failures: usize,
    pub authors: usize,
    pub tags: usize,
    pub domains: usize,
}

pub fn get_stats(links: &[LinkRecord]) -> Stats {
    Stats {
        total: links.len(),
        enriched: links.iter().filter(|l| l.title.is_some()).count(),
        tagged: links.iter().filter(|l| l.tags.is_some()).count(),
        screenshots: links.iter().filter(|l| l.screenshot_path().is_some()).count(),
        screenshot_failures: links
            .iter()
            .filter(|l| matches!(l.screenshot, Some(None)))
            .count(),
        authors: unique_authors(links),
        tags: unique_tags(links).len(),
        domains: unique_domains(links),
    }
}

pub fn unique_authors(links: &[LinkRecord]) -> usize {
    links
        .iter()
        .map(|l| l.author.id.as_str())
        .collect::<HashSet<_>>()
        .len()
}

/// Every tag in use, sorted.
pub fn unique_tags(links: &[LinkRecord]) -> Vec<String> {
    let mut tags: Vec<String> = links
        .iter()
        .flat_map(|l| l.tags().iter().cloned())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    tags.sort();
    tags
}

pub fn unique_domains(links: &[LinkRecord]) -> usize {
    links
        .iter()
        .map(|l| l.domain())
        .collect::<HashSet<_>>()
        .len()
}
