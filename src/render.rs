use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::env;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use url::form_urlencoded;

use crate::config::Settings;
use crate::store::{self, LinkRecord};

const INDEX_CSS: &str = include_str!("../templates/index.css");
const INDEX_JS: &str = include_str!("../templates/index.js");
const TAGS_CSS: &str = include_str!("../templates/tags.css");

const SITE_TITLE: &str = "Discord Link Archive";

// ── Helpers ──

/// Escapes `& < > " '` so the result is safe in text and quoted attributes.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// `YYYY/MM/DD HH:MM` in local time; unparseable input is shown as is.
pub fn format_date(timestamp: &str) -> String {
    match DateTime::parse_from_rfc3339(timestamp) {
        Ok(t) => t.with_timezone(&Local).format("%Y/%m/%d %H:%M").to_string(),
        Err(_) => timestamp.to_string(),
    }
}

fn encode_query_value(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn generated_at() -> String {
    Local::now().format("%Y/%m/%d %H:%M:%S").to_string()
}

/// Lexically normalized absolute form of `path`.
fn absolute(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .context("Failed to resolve working directory")?
            .join(path)
    };
    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Href of directory `to` as seen from a page in directory `from`.
pub fn relative_href(from: &Path, to: &Path) -> Result<String> {
    let from = absolute(from)?;
    let to = absolute(to)?;
    let from: Vec<Component> = from.components().collect();
    let to: Vec<Component> = to.components().collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let parts: Vec<String> = std::iter::repeat("..".to_string())
        .take(from.len() - common)
        .chain(
            to[common..]
                .iter()
                .map(|c| c.as_os_str().to_string_lossy().into_owned()),
        )
        .collect();
    if parts.is_empty() {
        Ok(".".to_string())
    } else {
        Ok(parts.join("/"))
    }
}

/// Stored screenshot paths carry only a file name that matters; it is
/// re-rooted at `base`, the screenshot directory as seen from the page.
fn screenshot_src(stored: &str, base: &str) -> String {
    let file = Path::new(stored)
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| stored.to_string());
    if base == "." {
        file
    } else {
        format!("{}/{}", base, file)
    }
}

fn write_page(path: &Path, html: &str) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    fs::write(path, html).with_context(|| format!("Failed to write {}", path.display()))
}

// ── Tag index ──

#[derive(Debug, Clone, PartialEq)]
pub struct TagCount {
    pub name: String,
    pub count: usize,
}

/// Usage count per tag, most used first; ties keep first-seen order.
pub fn aggregate_tags(links: &[LinkRecord]) -> Vec<TagCount> {
    let mut counts: Vec<TagCount> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for tag in links.iter().flat_map(|l| l.tags()) {
        match index.get(tag.as_str()) {
            Some(&i) => counts[i].count += 1,
            None => {
                index.insert(tag.as_str(), counts.len());
                counts.push(TagCount {
                    name: tag.clone(),
                    count: 1,
                });
            }
        }
    }
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

pub fn render_tags_page(tags: &[TagCount], generated_at: &str) -> String {
    let mut items = String::new();
    for tag in tags {
        let _ = write!(
            items,
            r#"
    <a href="index.html?tag={href}" class="tag-item-link">
      <div class="tag-item">
        <span class="tag-name">#{name}</span>
        <span class="tag-count">{count}</span>
      </div>
    </a>"#,
            href = escape_html(&encode_query_value(&tag.name)),
            name = escape_html(&tag.name),
            count = tag.count,
        );
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="ja">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>Tags - {title}</title>
  <style>
{css}
  </style>
</head>
<body>
  <div class="container">
    <header>
      <a href="index.html" class="back-link">← 戻る</a>
      <h1>Tags</h1>
      <p class="subtitle">タグ一覧</p>
      <div class="stats">{total} タグ</div>
    </header>

    <div class="tags-grid">{items}
    </div>

    <footer>
      <p>最終更新: {updated}</p>
      <p>Generated by {title}</p>
    </footer>
  </div>
</body>
</html>
"#,
        title = SITE_TITLE,
        css = TAGS_CSS,
        total = tags.len(),
        items = items,
        updated = escape_html(generated_at),
    )
}

// ── Listing ──

fn render_card(out: &mut String, link: &LinkRecord, screenshot_base: &str) {
    let url = escape_html(&link.url);
    let tags = link.tags();
    let _ = write!(
        out,
        r#"
    <li class="link-item" data-tags="{data_tags}" data-url="{url}">
      <div class="link-header">
        <div class="author-info">
          <img src="{avatar}" alt="{name}" class="avatar">
          <span class="author-name">{name}</span>
        </div>
        <div class="header-right">
          <button class="favorite-btn" data-url="{url}" title="お気に入りに追加">
            <span class="star-icon">☆</span>
          </button>
          <span class="timestamp">{date}</span>
        </div>
      </div>"#,
        data_tags = escape_html(&tags.join(",")),
        url = url,
        avatar = escape_html(&link.author.avatar),
        name = escape_html(&link.author.display_name),
        date = escape_html(&format_date(&link.timestamp)),
    );

    if !tags.is_empty() {
        out.push_str(
            r#"
      <div class="tags-wrapper">
        <div class="tags">"#,
        );
        for tag in tags {
            let tag = escape_html(tag);
            let _ = write!(out, r#"<span class="tag" data-tag="{0}">#{0}</span>"#, tag);
        }
        out.push_str(
            r#"</div>
        <button class="tags-toggle-btn" title="タグを展開/折りたたむ">
          <span class="toggle-icon">▼</span>
        </button>
      </div>"#,
        );
    }

    let image = link
        .image
        .as_deref()
        .filter(|i| !i.is_empty())
        .map(str::to_string)
        .or_else(|| {
            link.screenshot_path()
                .map(|p| screenshot_src(p, screenshot_base))
        });
    if let Some(src) = image.as_deref() {
        let _ = write!(
            out,
            r#"
      <div class="screenshot-container">
        <img src="{}" alt="Screenshot of {}" class="screenshot" loading="lazy">
      </div>"#,
            escape_html(src),
            url,
        );
    }

    if let Some(desc) = link.description_ja.as_deref().filter(|d| !d.is_empty()) {
        let _ = write!(out, r#"
      <div class="description">{}</div>"#, escape_html(desc));
    }
    if !link.content.is_empty() {
        let _ = write!(
            out,
            r#"
      <div class="message-excerpt">{}</div>"#,
            escape_html(&link.content)
        );
    }
    if link.has_attachments {
        let _ = write!(
            out,
            r#"
      <div class="attachments-badge">📎 {} 個の添付ファイル</div>"#,
            link.attachment_count
        );
    }
    out.push_str("\n    </li>");
}

/// `screenshot_base` is the screenshot directory relative to the page.
pub fn render_index(links: &[LinkRecord], generated_at: &str, screenshot_base: &str) -> String {
    let stats = store::get_stats(links);
    let mut cards = String::new();
    for link in links {
        render_card(&mut cards, link, screenshot_base);
    }

    format!(
        r##"<!DOCTYPE html>
<html lang="ja">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{title}</title>
  <style>
{css}
  </style>
</head>
<body>
  <nav class="top-nav">
    <div class="top-nav-content">
      <a href="index.html" class="nav-link">home</a>
      <a href="tags.html" class="nav-link">tags</a>
      <a href="#" class="nav-link favorite" id="favorites-link">★ お気に入りのみ</a>
    </div>
  </nav>
  <div class="container">
    <header>
      <h1>{title}</h1>
      <p class="subtitle">スレッドで共有されたリンク集</p>
      <div class="stats">
        <div class="stat-item"><div class="stat-number">{links}</div><div class="stat-label">リンク数</div></div>
        <div class="stat-item"><div class="stat-number">{authors}</div><div class="stat-label">投稿者数</div></div>
        <div class="stat-item"><div class="stat-number">{tags}</div><div class="stat-label">タグ数</div></div>
        <div class="stat-item"><div class="stat-number">{domains}</div><div class="stat-label">ドメイン数</div></div>
      </div>
    </header>

    <ul class="links-list" id="linksList">{cards}
    </ul>

    <footer>
      <p>最終更新: {updated}</p>
      <p>Generated by {title}</p>
    </footer>
  </div>

  <script>
{js}
  </script>
</body>
</html>
"##,
        title = SITE_TITLE,
        css = INDEX_CSS,
        links = stats.total,
        authors = stats.authors,
        tags = stats.tags,
        domains = stats.domains,
        cards = cards,
        updated = escape_html(generated_at),
        js = INDEX_JS,
    )
}

// ── Stages ──

/// Page Renderer, listing page.
pub fn run_index(settings: &Settings) -> Result<PathBuf> {
    let links = store::load_links(&settings.data_path)?;
    println!("Loaded {} links", links.len());

    let path = settings.index_path();
    let screenshot_base = relative_href(&settings.output_dir, &settings.screenshot_dir)?;
    write_page(&path, &render_index(&links, &generated_at(), &screenshot_base))?;
    println!("Wrote {}", path.display());
    Ok(path)
}

/// Page Renderer, tag index.
pub fn run_tags_page(settings: &Settings) -> Result<PathBuf> {
    let links = store::load_links(&settings.data_path)?;
    let tags = aggregate_tags(&links);
    println!("Found {} tags across {} links", tags.len(), links.len());

    let path = settings.tags_page_path();
    write_page(&path, &render_tags_page(&tags, &generated_at()))?;
    println!("Wrote {}", path.display());
    Ok(path)
}
