//! Tag derivation from a closed vocabulary.
//!
//! Five sources feed a link's tags:
//!   1. keyword matches over title + description + url (evaluated at enrichment)
//!   2. page `<meta name="keywords">` entries, title-cased (evaluated at enrichment)
//!   3. hostname → service label, at most one
//!   4. keywords in the URL path + query
//!   5. keywords in the message excerpt
//!
//! Sources 1 and 2 are stored on the record as `metaTags`; `generate_tags`
//! unions them with 3–5 and returns the sorted, duplicate-free result.

use std::collections::BTreeSet;

use anyhow::Result;
use tracing::info;

use crate::config::Settings;
use crate::store::{self, LinkRecord};

/// Scanned against `title + " " + description + " " + url`.
const METADATA_KEYWORDS: &[(&str, &str)] = &[
    // languages
    ("python", "Python"),
    ("javascript", "JavaScript"),
    ("typescript", "TypeScript"),
    ("java", "Java"),
    ("c++", "C++"),
    ("c#", "C#"),
    ("ruby", "Ruby"),
    ("php", "PHP"),
    ("go", "Go"),
    ("golang", "Go"),
    ("rust", "Rust"),
    ("swift", "Swift"),
    ("kotlin", "Kotlin"),
    // frameworks
    ("react", "React"),
    ("vue", "Vue"),
    ("angular", "Angular"),
    ("nodejs", "Node.js"),
    ("node.js", "Node.js"),
    ("django", "Django"),
    ("flask", "Flask"),
    ("spring", "Spring"),
    ("laravel", "Laravel"),
    ("rails", "Rails"),
    // platforms
    ("github", "GitHub"),
    ("gitlab", "GitLab"),
    ("docker", "Docker"),
    ("kubernetes", "Kubernetes"),
    ("aws", "AWS"),
    ("azure", "Azure"),
    ("gcp", "GCP"),
    ("google cloud", "GCP"),
    // fields
    ("ai", "AI"),
    ("artificial intelligence", "AI"),
    ("machine learning", "機械学習"),
    ("deep learning", "ディープラーニング"),
    ("data science", "データサイエンス"),
    ("frontend", "フロントエンド"),
    ("backend", "バックエンド"),
    ("fullstack", "フルスタック"),
    ("devops", "DevOps"),
    ("security", "セキュリティ"),
    ("database", "データベース"),
    ("web development", "Web開発"),
    ("mobile", "モバイル"),
    ("design", "デザイン"),
    ("ui", "UI"),
    ("ux", "UX"),
    // content types
    ("tutorial", "チュートリアル"),
    ("guide", "ガイド"),
    ("documentation", "ドキュメント"),
    ("blog", "ブログ"),
    ("article", "記事"),
    ("video", "動画"),
    ("course", "講座"),
    ("tool", "ツール"),
    ("library", "ライブラリ"),
    ("framework", "フレームワーク"),
    // Japanese keywords
    ("チュートリアル", "チュートリアル"),
    ("ガイド", "ガイド"),
    ("ドキュメント", "ドキュメント"),
    ("ブログ", "ブログ"),
    ("記事", "記事"),
    ("機械学習", "機械学習"),
    ("ディープラーニング", "ディープラーニング"),
    ("データサイエンス", "データサイエンス"),
    ("フロントエンド", "フロントエンド"),
    ("バックエンド", "バックエンド"),
    ("セキュリティ", "セキュリティ"),
    ("データベース", "データベース"),
    ("ツール", "ツール"),
    ("デザイン", "デザイン"),
];

/// Exact hostname match first, then first substring match in this order.
const DOMAINS: &[(&str, &str)] = &[
    ("github.com", "GitHub"),
    ("stackoverflow.com", "StackOverflow"),
    ("reddit.com", "Reddit"),
    ("twitter.com", "Twitter"),
    ("x.com", "Twitter"),
    ("youtube.com", "YouTube"),
    ("youtu.be", "YouTube"),
    ("medium.com", "Medium"),
    ("dev.to", "DevTo"),
    ("qiita.com", "Qiita"),
    ("zenn.dev", "Zenn"),
    ("note.com", "Note"),
    ("amazon.co.jp", "Amazon"),
    ("amazon.com", "Amazon"),
    ("wikipedia.org", "Wikipedia"),
    ("docs.google.com", "GoogleDocs"),
    ("drive.google.com", "GoogleDrive"),
    ("notion.so", "Notion"),
    ("figma.com", "Figma"),
    ("canva.com", "Canva"),
    ("discord.com", "Discord"),
    ("slack.com", "Slack"),
    ("trello.com", "Trello"),
    ("asana.com", "Asana"),
    ("linkedin.com", "LinkedIn"),
    ("facebook.com", "Facebook"),
    ("instagram.com", "Instagram"),
    ("tiktok.com", "TikTok"),
    ("twitch.tv", "Twitch"),
    ("spotify.com", "Spotify"),
    ("soundcloud.com", "SoundCloud"),
    ("npmjs.com", "npm"),
    ("pypi.org", "PyPI"),
    ("docker.com", "Docker"),
    ("kubernetes.io", "Kubernetes"),
    ("aws.amazon.com", "AWS"),
    ("cloud.google.com", "GCP"),
    ("azure.microsoft.com", "Azure"),
];

const PATH_KEYWORDS: &[(&str, &str)] = &[
    ("linux", "Linux"),
    ("windows", "Windows"),
    ("macos", "macOS"),
    ("ios", "iOS"),
    ("android", "Android"),
    ("python", "Python"),
    ("javascript", "JavaScript"),
    ("typescript", "TypeScript"),
    ("java", "Java"),
    ("cpp", "C++"),
    ("csharp", "C#"),
    ("ruby", "Ruby"),
    ("php", "PHP"),
    ("go", "Go"),
    ("rust", "Rust"),
    ("swift", "Swift"),
    ("kotlin", "Kotlin"),
    ("react", "React"),
    ("vue", "Vue"),
    ("angular", "Angular"),
    ("nodejs", "Node.js"),
    ("node", "Node.js"),
    ("docker", "Docker"),
    ("kubernetes", "Kubernetes"),
    ("aws", "AWS"),
    ("gcp", "GCP"),
    ("azure", "Azure"),
    ("ai", "AI"),
    ("ml", "機械学習"),
    ("machine-learning", "機械学習"),
    ("deep-learning", "ディープラーニング"),
    ("data-science", "データサイエンス"),
    ("frontend", "フロントエンド"),
    ("backend", "バックエンド"),
    ("fullstack", "フルスタック"),
    ("devops", "DevOps"),
    ("security", "セキュリティ"),
    ("database", "データベース"),
    ("sql", "SQL"),
    ("nosql", "NoSQL"),
    ("api", "API"),
    ("rest", "REST"),
    ("graphql", "GraphQL"),
    ("tutorial", "チュートリアル"),
    ("guide", "ガイド"),
    ("documentation", "ドキュメント"),
    ("blog", "ブログ"),
    ("news", "ニュース"),
    ("article", "記事"),
    ("video", "動画"),
    ("podcast", "ポッドキャスト"),
    ("tool", "ツール"),
    ("editor", "エディタ"),
    ("vscode", "VSCode"),
    ("vim", "Vim"),
    ("emacs", "Emacs"),
    ("git", "Git"),
    ("github", "GitHub"),
    ("gitlab", "GitLab"),
    ("design", "デザイン"),
    ("ui", "UI"),
    ("ux", "UX"),
    ("css", "CSS"),
    ("html", "HTML"),
    ("sass", "Sass"),
    ("tailwind", "TailwindCSS"),
    ("bootstrap", "Bootstrap"),
];

const CONTENT_KEYWORDS: &[(&str, &str)] = &[
    ("linux", "Linux"),
    ("windows", "Windows"),
    ("mac", "macOS"),
    ("python", "Python"),
    ("javascript", "JavaScript"),
    ("typescript", "TypeScript"),
    ("react", "React"),
    ("vue", "Vue"),
    ("angular", "Angular"),
    ("docker", "Docker"),
    ("kubernetes", "Kubernetes"),
    ("ai", "AI"),
    ("機械学習", "機械学習"),
    ("チュートリアル", "チュートリアル"),
    ("ガイド", "ガイド"),
    ("ツール", "ツール"),
    ("エディタ", "エディタ"),
    ("デザイン", "デザイン"),
    ("セキュリティ", "セキュリティ"),
    ("データベース", "データベース"),
    ("フロントエンド", "フロントエンド"),
    ("バックエンド", "バックエンド"),
];

fn scan<'a>(text: &str, table: &'a [(&'a str, &'a str)]) -> impl Iterator<Item = &'a str> + 'a {
    let lower = text.to_lowercase();
    table
        .iter()
        .filter(move |(keyword, _)| lower.contains(keyword))
        .map(|(_, label)| *label)
}

/// First char upper, rest lower; kept only when 2 < chars < 20.
pub fn normalize_keyword(keyword: &str) -> Option<String> {
    let mut chars = keyword.chars();
    let first = chars.next()?;
    let normalized: String = first
        .to_uppercase()
        .chain(chars.flat_map(char::to_lowercase))
        .collect();
    let len = normalized.chars().count();
    (len > 2 && len < 20).then_some(normalized)
}

/// The enrichment-time sources, in first-seen order.
pub fn metadata_tags(title: &str, description: &str, url: &str, keywords: &[String]) -> Vec<String> {
    let combined = format!("{} {} {}", title, description, url);
    let mut tags: Vec<String> = Vec::new();
    let candidates = scan(&combined, METADATA_KEYWORDS)
        .map(str::to_string)
        .chain(keywords.iter().filter_map(|k| normalize_keyword(k)));
    for tag in candidates {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

pub fn domain_tags(url: &str) -> Vec<String> {
    let Ok(parsed) = url::Url::parse(url) else {
        return Vec::new();
    };
    let Some(host) = parsed.host_str() else {
        return Vec::new();
    };
    DOMAINS
        .iter()
        .find(|(domain, _)| *domain == host)
        .or_else(|| DOMAINS.iter().find(|(domain, _)| host.contains(domain)))
        .map(|(_, label)| vec![label.to_string()])
        .unwrap_or_default()
}

pub fn path_tags(url: &str) -> Vec<String> {
    let Ok(parsed) = url::Url::parse(url) else {
        return Vec::new();
    };
    let full_path = match parsed.query() {
        Some(q) => format!("{}?{}", parsed.path(), q),
        None => parsed.path().to_string(),
    };
    scan(&full_path, PATH_KEYWORDS).map(str::to_string).collect()
}

pub fn content_tags(content: &str) -> Vec<String> {
    scan(content, CONTENT_KEYWORDS).map(str::to_string).collect()
}

/// Sorted, duplicate-free union of every source. Pure; no I/O.
pub fn generate_tags(link: &LinkRecord) -> Vec<String> {
    let mut tags = BTreeSet::new();
    tags.extend(link.meta_tags.iter().flatten().cloned());
    tags.extend(domain_tags(&link.url));
    tags.extend(path_tags(&link.url));
    tags.extend(content_tags(&link.content));
    tags.into_iter().collect()
}

/// Tag Generator stage.
pub fn run(settings: &Settings) -> Result<usize> {
    let links = store::load_links(&settings.data_path)?;
    println!("Tagging {} links...", links.len());

    let total = links.len();
    let tagged: Vec<LinkRecord> = links
        .into_iter()
        .enumerate()
        .map(|(i, mut link)| {
            let tags = generate_tags(&link);
            info!(
                "[{}/{}] {} -> {}",
                i + 1,
                total,
                link.url,
                if tags.is_empty() { "(none)".to_string() } else { tags.join(", ") }
            );
            link.tags = Some(tags);
            link
        })
        .collect();

    store::save_links(&settings.data_path, &tagged)?;

    let unique = store::unique_tags(&tagged);
    println!("Saved tags to {}", settings.data_path.display());
    println!("{} unique tags: {}", unique.len(), unique.join(", "));
    Ok(unique.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(url: &str, content: &str, meta: &[&str]) -> LinkRecord {
        LinkRecord {
            url: url.to_string(),
            content: content.to_string(),
            meta_tags: if meta.is_empty() {
                None
            } else {
                Some(meta.iter().map(|s| s.to_string()).collect())
            },
            ..Default::default()
        }
    }

    #[test]
    fn domain_exact_then_substring() {
        assert_eq!(domain_tags("https://github.com/rust-lang/rust"), vec!["GitHub"]);
        assert_eq!(domain_tags("https://www.youtube.com/watch?v=1"), vec!["YouTube"]);
        // exact beats the earlier substring entry "amazon.com"
        assert_eq!(domain_tags("https://aws.amazon.com/ec2"), vec!["AWS"]);
        assert!(domain_tags("https://example.org").is_empty());
        assert!(domain_tags("not a url").is_empty());
    }

    #[test]
    fn path_and_query_case_insensitive() {
        let tags = path_tags("https://example.org/Blog/Rust-Tutorial?lang=PYTHON");
        assert!(tags.contains(&"ブログ".to_string()));
        assert!(tags.contains(&"Rust".to_string()));
        assert!(tags.contains(&"チュートリアル".to_string()));
        assert!(tags.contains(&"Python".to_string()));
    }

    #[test]
    fn path_synonyms_share_label() {
        let tags = path_tags("https://example.org/nodejs");
        assert_eq!(tags.iter().filter(|t| *t == "Node.js").count(), 2);
        let link = link("https://example.org/nodejs", "", &[]);
        assert_eq!(
            generate_tags(&link).iter().filter(|t| *t == "Node.js").count(),
            1
        );
    }

    #[test]
    fn content_keywords() {
        let tags = content_tags("Dockerで始めるセキュリティ入門");
        assert_eq!(tags, vec!["Docker", "セキュリティ"]);
    }

    #[test]
    fn keyword_normalization() {
        assert_eq!(normalize_keyword("rUST"), Some("Rust".to_string()));
        assert_eq!(normalize_keyword("ai"), None);
        assert_eq!(normalize_keyword(""), None);
        assert_eq!(normalize_keyword(&"x".repeat(20)), None);
        assert_eq!(normalize_keyword(&"x".repeat(19)).map(|s| s.len()), Some(19));
    }

    #[test]
    fn metadata_sources_combined() {
        let tags = metadata_tags(
            "Deep Learning with PyTorch",
            "A tutorial",
            "https://example.org/post",
            &["pytorch".into(), "ml".into(), " ".into()],
        );
        assert!(tags.contains(&"ディープラーニング".to_string()));
        assert!(tags.contains(&"チュートリアル".to_string()));
        assert!(tags.contains(&"Pytorch".to_string()));
        assert!(!tags.iter().any(|t| t == "Ml"));
    }

    #[test]
    fn union_is_sorted_and_unique() {
        let link = link(
            "https://github.com/tokio-rs/tokio?tab=readme",
            "rust async runtime, great for docker services",
            &["GitHub", "Rust", "Async"],
        );
        let tags = generate_tags(&link);
        let mut expected = tags.clone();
        expected.sort();
        expected.dedup();
        assert_eq!(tags, expected);
        assert!(tags.contains(&"GitHub".to_string()));
        assert!(tags.contains(&"Docker".to_string()));
        assert!(tags.contains(&"Async".to_string()));
    }

    #[test]
    fn idempotent() {
        let mut link = link(
            "https://zenn.dev/someone/articles/react-hooks",
            "Reactのガイド",
            &["React", "フロントエンド"],
        );
        let once = generate_tags(&link);
        link.tags = Some(once.clone());
        let twice = generate_tags(&link);
        assert_eq!(once, twice);
    }

    #[test]
    fn tolerates_unenriched_record() {
        let link = link("https://qiita.com/x", "", &[]);
        assert_eq!(generate_tags(&link), vec!["Qiita"]);
    }

    #[test]
    fn stage_rewrites_in_place() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = Settings::for_paths(
            tmp.path().join("data").join("links.json"),
            tmp.path().join("screenshots"),
            tmp.path().to_path_buf(),
        );
        let raw = serde_json::json!([
            { "url": "https://zenn.dev/a/articles/rust-cli", "content": "", "pinned": true },
            { "url": "https://example.com/", "content": "nothing here" },
            { "url": "https://qiita.com/x", "content": "", "tags": ["Stale"], "note": { "by": "bob" } }
        ]);
        std::fs::create_dir_all(settings.data_path.parent().unwrap()).unwrap();
        std::fs::write(&settings.data_path, raw.to_string()).unwrap();

        run(&settings).unwrap();

        let links = store::load_links(&settings.data_path).unwrap();
        let urls: Vec<&str> = links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://zenn.dev/a/articles/rust-cli",
                "https://example.com/",
                "https://qiita.com/x"
            ]
        );
        assert!(links.iter().all(|l| l.tags.is_some()));
        assert_eq!(links[2].tags(), ["Qiita"]);

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&settings.data_path).unwrap()).unwrap();
        assert_eq!(saved[0]["pinned"], serde_json::json!(true));
        assert_eq!(saved[2]["note"]["by"], "bob");
        assert!(saved[1].get("pinned").is_none());
    }
}
