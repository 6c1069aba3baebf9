use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::config::Settings;
use crate::store::{self, LinkRecord};

const VIEWPORT_WIDTH: u32 = 1280;
const VIEWPORT_HEIGHT: u32 = 720;
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);
const SETTLE_DELAY: Duration = Duration::from_secs(2);
const JPEG_QUALITY: i64 = 80;
const RECORD_DELAY: Duration = Duration::from_secs(1);

/// Prefix of the path stored on a record; the page renderer maps it onto
/// the configured screenshot directory.
pub const STORED_PREFIX: &str = "screenshots";

/// `<sha256(url) hex>.jpg`
pub fn screenshot_filename(url: &str) -> String {
    format!("{}.jpg", hex::encode(Sha256::digest(url.as_bytes())))
}

/// `screenshots/<file>`, independent of where the directory actually lives.
pub fn stored_path(file: &str) -> String {
    format!("{}/{}", STORED_PREFIX, file)
}

/// Renders `url` into a JPEG at `path`.
#[allow(async_fn_in_trait)]
pub trait Capture {
    async fn capture(&self, url: &str, path: &Path) -> Result<()>;
}

/// Headless Chrome, one fresh browser per capture.
pub struct ChromeCapture;

impl ChromeCapture {
    fn config() -> Result<BrowserConfig> {
        BrowserConfig::builder()
            .no_sandbox()
            .window_size(VIEWPORT_WIDTH, VIEWPORT_HEIGHT)
            .viewport(Viewport {
                width: VIEWPORT_WIDTH,
                height: VIEWPORT_HEIGHT,
                device_scale_factor: Some(1.0),
                emulating_mobile: false,
                is_landscape: true,
                has_touch: false,
            })
            .request_timeout(NAVIGATION_TIMEOUT)
            .build()
            .map_err(|e| anyhow!("Invalid browser config: {}", e))
    }

    async fn shoot(browser: &Browser, url: &str, path: &Path) -> Result<()> {
        // new_page resolves on the load event, not network idle; the settle
        // delay below covers late requests.
        let page = tokio::time::timeout(NAVIGATION_TIMEOUT, browser.new_page(url))
            .await
            .map_err(|_| anyhow!("Navigation timed out after {:?}", NAVIGATION_TIMEOUT))?
            .context("Navigation failed")?;

        tokio::time::sleep(SETTLE_DELAY).await;

        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Jpeg)
            .quality(JPEG_QUALITY)
            .full_page(false)
            .build();
        page.save_screenshot(params, path)
            .await
            .context("Screenshot failed")?;
        Ok(())
    }
}

impl Capture for ChromeCapture {
    async fn capture(&self, url: &str, path: &Path) -> Result<()> {
        let (mut browser, mut handler) = Browser::launch(Self::config()?)
            .await
            .context("Failed to launch browser")?;
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let result = Self::shoot(&browser, url, path).await;

        // Teardown runs whatever the capture outcome.
        if let Err(e) = browser.close().await {
            warn!("Browser close failed: {}", e);
        }
        if let Err(e) = browser.wait().await {
            warn!("Browser exit wait failed: {}", e);
        }
        events.abort();

        result
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct ScreenshotStats {
    pub captured: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Attach a screenshot to each record, reusing files that already exist.
/// Failures are recorded as `null` and never abort the batch.
pub async fn annotate<C: Capture>(
    links: &mut [LinkRecord],
    dir: &Path,
    capturer: &C,
    delay: Duration,
) -> Result<ScreenshotStats> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let total = links.len();
    let mut stats = ScreenshotStats::default();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    for (i, link) in links.iter_mut().enumerate() {
        let file = screenshot_filename(&link.url);
        let path = dir.join(&file);
        let relative = stored_path(&file);

        if path.exists() {
            info!("[{}/{}] exists: {}", i + 1, total, relative);
            link.screenshot = Some(Some(relative));
            stats.skipped += 1;
            pb.inc(1);
            continue;
        }

        match capturer.capture(&link.url, &path).await {
            Ok(()) => {
                info!("[{}/{}] captured {}", i + 1, total, link.url);
                link.screenshot = Some(Some(relative));
                stats.captured += 1;
            }
            Err(e) => {
                warn!("[{}/{}] capture failed for {}: {:#}", i + 1, total, link.url, e);
                link.screenshot = Some(None);
                stats.failed += 1;
            }
        }
        pb.inc(1);

        if i + 1 < total {
            tokio::time::sleep(delay).await;
        }
    }
    pb.finish_and_clear();

    Ok(stats)
}

/// Screenshot Annotator stage.
pub async fn run(settings: &Settings) -> Result<ScreenshotStats> {
    let mut links = store::load_links(&settings.data_path)?;
    println!("Capturing screenshots for {} links...", links.len());

    let stats = annotate(
        &mut links,
        &settings.screenshot_dir,
        &ChromeCapture,
        RECORD_DELAY,
    )
    .await?;

    store::save_links(&settings.data_path, &links)?;
    println!(
        "Screenshots: {} captured, {} skipped (existing), {} failed",
        stats.captured, stats.skipped, stats.failed
    );
    Ok(stats)
}
