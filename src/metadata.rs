use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

static README_IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[.*?\]\((.*?)\)").unwrap());

/// What a page says about itself. `title` falls back to the page URL.
#[derive(Debug, Clone, PartialEq)]
pub struct PageMetadata {
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub image: String,
}

impl PageMetadata {
    pub fn fallback(url: &str) -> Self {
        PageMetadata {
            title: url.to_string(),
            description: String::new(),
            keywords: Vec::new(),
            image: String::new(),
        }
    }
}

fn meta_content(doc: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    doc.select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn title_text(doc: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    doc.select(&selector)
        .next()
        .map(|el| el.text().collect::<String>())
        .filter(|s| !s.is_empty())
}

/// Pull title/description/keywords/image out of `html`, in OpenGraph →
/// Twitter card → plain HTML precedence.
pub fn parse_metadata(html: &str, page_url: &str) -> PageMetadata {
    let doc = Html::parse_document(html);

    let title = meta_content(&doc, r#"meta[property="og:title"]"#)
        .or_else(|| meta_content(&doc, r#"meta[name="twitter:title"]"#))
        .or_else(|| title_text(&doc))
        .unwrap_or_else(|| page_url.to_string())
        .trim()
        .to_string();

    let description = meta_content(&doc, r#"meta[property="og:description"]"#)
        .or_else(|| meta_content(&doc, r#"meta[name="twitter:description"]"#))
        .or_else(|| meta_content(&doc, r#"meta[name="description"]"#))
        .unwrap_or_default()
        .trim()
        .to_string();

    let keywords = meta_content(&doc, r#"meta[name="keywords"]"#)
        .map(|k| {
            k.split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let image = meta_content(&doc, r#"meta[property="og:image"]"#)
        .or_else(|| meta_content(&doc, r#"meta[name="twitter:image"]"#))
        .map(|src| resolve_image_url(&src, page_url))
        .unwrap_or_default();

    PageMetadata {
        title,
        description,
        keywords,
        image,
    }
}

/// Absolute URLs pass through, `//host/...` takes the page scheme, anything
/// else is resolved against the page origin. Unresolvable input is returned as is.
pub fn resolve_image_url(image: &str, page_url: &str) -> String {
    if image.starts_with("http://") || image.starts_with("https://") {
        return image.to_string();
    }
    let Ok(base) = Url::parse(page_url) else {
        return image.to_string();
    };
    if image.starts_with("//") {
        return format!("{}:{}", base.scheme(), image);
    }
    let origin = base.origin().ascii_serialization();
    Url::parse(&origin)
        .and_then(|o| o.join(image))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| image.to_string())
}

/// `(owner, repo)` for `https://github.com/<owner>/<repo>[/...]`.
pub fn github_repo(url: &str) -> Option<(String, String)> {
    let parsed = Url::parse(url).ok()?;
    if parsed.host_str()? != "github.com" {
        return None;
    }
    let mut parts = parsed.path_segments()?.filter(|p| !p.is_empty());
    let owner = parts.next()?.to_string();
    let repo = parts.next()?.to_string();
    Some((owner, repo))
}

/// First `![alt](src)` in a README, with repo-relative paths pointed at raw content.
pub fn first_readme_image(readme: &str, owner: &str, repo: &str) -> Option<String> {
    let src = README_IMAGE_RE
        .captures(readme)?
        .get(1)
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty())?;
    if src.starts_with("http://") || src.starts_with("https://") {
        Some(src.to_string())
    } else {
        Some(format!(
            "https://raw.githubusercontent.com/{}/{}/main/{}",
            owner, repo, src
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}", name)).unwrap()
    }

    #[test]
    fn opengraph_article() {
        let meta = parse_metadata(&fixture("article.html"), "https://example.com/post");
        assert_eq!(meta.title, "Building a Tokio service");
        assert_eq!(meta.description, "How we moved our ingest pipeline to async Rust.");
        assert_eq!(meta.keywords, vec!["rust", "tokio", "async"]);
        assert_eq!(meta.image, "https://example.com/img/a.png");
    }

    #[test]
    fn twitter_card_fallbacks() {
        let meta = parse_metadata(&fixture("twitter_card.html"), "https://blog.test/p/1");
        assert_eq!(meta.title, "Card title");
        assert_eq!(meta.description, "Card description");
        assert_eq!(meta.image, "https://cdn.example.com/a.png");
        assert!(meta.keywords.is_empty());
    }

    #[test]
    fn plain_html_fallbacks() {
        let html = r#"<html><head><title>  Plain page </title>
            <meta name="description" content=" plain description ">
            <meta name="keywords" content="one, ,two,">
            </head><body></body></html>"#;
        let meta = parse_metadata(html, "https://a.test/");
        assert_eq!(meta.title, "Plain page");
        assert_eq!(meta.description, "plain description");
        assert_eq!(meta.keywords, vec!["one", "two"]);
        assert_eq!(meta.image, "");
    }

    #[test]
    fn empty_page_uses_url_as_title() {
        let meta = parse_metadata("<html><body>hi</body></html>", "https://a.test/x");
        assert_eq!(meta, PageMetadata::fallback("https://a.test/x"));
    }

    #[test]
    fn relative_image() {
        assert_eq!(
            resolve_image_url("/img/a.png", "https://example.com/post"),
            "https://example.com/img/a.png"
        );
        assert_eq!(
            resolve_image_url("img/a.png", "https://example.com/deep/post"),
            "https://example.com/img/a.png"
        );
    }

    #[test]
    fn protocol_relative_image() {
        assert_eq!(
            resolve_image_url("//cdn.example.com/a.png", "https://example.com/x"),
            "https://cdn.example.com/a.png"
        );
        assert_eq!(
            resolve_image_url("//cdn.example.com/a.png", "http://example.com/x"),
            "http://cdn.example.com/a.png"
        );
    }

    #[test]
    fn absolute_image_passthrough() {
        assert_eq!(
            resolve_image_url("https://other.test/i.jpg", "not a url"),
            "https://other.test/i.jpg"
        );
        assert_eq!(resolve_image_url("/i.jpg", "not a url"), "/i.jpg");
    }

    #[test]
    fn github_repo_paths() {
        assert_eq!(
            github_repo("https://github.com/owner/repo"),
            Some(("owner".into(), "repo".into()))
        );
        assert_eq!(
            github_repo("https://github.com/owner/repo/tree/main/src"),
            Some(("owner".into(), "repo".into()))
        );
        assert_eq!(github_repo("https://github.com/owner"), None);
        assert_eq!(github_repo("https://gist.github.com/owner/abc"), None);
        assert_eq!(github_repo("https://example.com/owner/repo"), None);
    }

    #[test]
    fn readme_images() {
        let readme = fixture("readme.md");
        assert_eq!(
            first_readme_image(&readme, "owner", "repo").as_deref(),
            Some("https://raw.githubusercontent.com/owner/repo/main/docs/banner.png")
        );
        assert_eq!(
            first_readme_image("![logo](https://img.test/l.svg) ![b](x.png)", "o", "r").as_deref(),
            Some("https://img.test/l.svg")
        );
        assert_eq!(first_readme_image("# no images here", "o", "r"), None);
    }
}
