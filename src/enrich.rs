use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{redirect, StatusCode};
use tracing::{info, warn};

use crate::config::Settings;
use crate::metadata::{self, PageMetadata};
use crate::store::{self, LinkRecord};
use crate::tags;
use crate::translate::Translator;

const GITHUB_API: &str = "https://api.github.com";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_REDIRECTS: usize = 5;
const RECORD_DELAY: Duration = Duration::from_millis(200);

pub struct EnrichStats {
    pub total: usize,
    pub titled: usize,
}

pub struct Enricher {
    http: reqwest::Client,
    github_api: String,
    translator: Translator,
}

impl Enricher {
    pub fn new() -> Result<Self> {
        Self::with_endpoints(GITHUB_API, Translator::new()?)
    }

    pub fn with_endpoints(github_api: &str, translator: Translator) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Enricher {
            http,
            github_api: github_api.trim_end_matches('/').to_string(),
            translator,
        })
    }

    async fn fetch_page(&self, url: &str) -> Result<PageMetadata> {
        let html = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(metadata::parse_metadata(&html, url))
    }

    /// Raw README of a repository. A missing README is `None`, not an error.
    async fn fetch_readme(&self, owner: &str, repo: &str) -> Result<Option<String>> {
        let resp = self
            .http
            .get(format!("{}/repos/{}/{}/readme", self.github_api, owner, repo))
            .header("Accept", "application/vnd.github.v3.raw")
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(resp.error_for_status()?.text().await?))
    }

    async fn readme_image(&self, owner: &str, repo: &str) -> Result<Option<String>> {
        let readme = self.fetch_readme(owner, repo).await?;
        Ok(readme.and_then(|md| metadata::first_readme_image(&md, owner, repo)))
    }

    /// Fill a missing image from the README of a `github.com/<owner>/<repo>` URL.
    async fn with_github_fallback(&self, url: &str, mut meta: PageMetadata) -> PageMetadata {
        if !meta.image.is_empty() {
            return meta;
        }
        let Some((owner, repo)) = metadata::github_repo(url) else {
            return meta;
        };
        match self.readme_image(&owner, &repo).await {
            Ok(Some(image)) => meta.image = image,
            Ok(None) => {}
            Err(e) => warn!("README lookup failed for {}/{}: {:#}", owner, repo, e),
        }
        meta
    }

    /// Metadata for `url`; never fails, any error yields the defaults.
    pub async fn fetch_metadata(&self, url: &str) -> PageMetadata {
        match self.fetch_page(url).await {
            Ok(meta) => self.with_github_fallback(url, meta).await,
            Err(e) => {
                warn!("Failed to fetch {}: {:#}", url, e);
                PageMetadata::fallback(url)
            }
        }
    }

    pub async fn enrich(&self, link: &mut LinkRecord) {
        let meta = self.fetch_metadata(&link.url).await;
        let description_ja = self.translator.to_japanese(&meta.description).await;
        let meta_tags =
            tags::metadata_tags(&meta.title, &meta.description, &link.url, &meta.keywords);

        link.title = Some(meta.title);
        link.description = Some(meta.description);
        link.description_ja = Some(description_ja);
        link.image = Some(meta.image);
        link.meta_tags = Some(meta_tags);
    }
}

fn has_real_title(link: &LinkRecord) -> bool {
    link.title.as_deref().is_some_and(|t| t != link.url)
}

/// Metadata Enricher stage.
pub async fn run(settings: &Settings) -> Result<EnrichStats> {
    let mut links = store::load_links(&settings.data_path)?;
    let enricher = Enricher::new()?;
    let total = links.len();
    println!("Fetching metadata for {} links...", total);

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    for (i, link) in links.iter_mut().enumerate() {
        enricher.enrich(link).await;
        info!(
            "[{}/{}] {} -> {}",
            i + 1,
            total,
            link.url,
            link.title.as_deref().unwrap_or_default()
        );
        pb.inc(1);
        tokio::time::sleep(RECORD_DELAY).await;
    }
    pb.finish_and_clear();

    store::save_links(&settings.data_path, &links)?;

    let titled = links.iter().filter(|l| has_real_title(l)).count();
    println!("Saved metadata to {}", settings.data_path.display());
    println!("  {} of {} links have a page title", titled, total);
    Ok(EnrichStats { total, titled })
}
