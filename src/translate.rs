use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use tracing::warn;

const TRANSLATE_ENDPOINT: &str = "https://translate.googleapis.com/translate_a/single";
const TIMEOUT: Duration = Duration::from_secs(10);

/// Hiragana, Katakana, or CJK ideographs.
pub fn contains_japanese(text: &str) -> bool {
    text.chars().any(|c| {
        matches!(
            c as u32,
            0x3040..=0x309F | 0x30A0..=0x30FF | 0x4E00..=0x9FAF
        )
    })
}

pub struct Translator {
    http: reqwest::Client,
    endpoint: String,
}

impl Translator {
    pub fn new() -> Result<Self> {
        Self::with_endpoint(TRANSLATE_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Translator {
            http,
            endpoint: endpoint.to_string(),
        })
    }

    /// Japanese rendering of `text`. Text that already contains Japanese is
    /// returned untouched without a request; a failed request falls back to
    /// the untranslated text.
    pub async fn to_japanese(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return String::new();
        }
        if contains_japanese(text) {
            return text.to_string();
        }
        match self.request(text).await {
            Ok(translated) => translated,
            Err(e) => {
                warn!("Translation failed: {:#}", e);
                text.to_string()
            }
        }
    }

    async fn request(&self, text: &str) -> Result<String> {
        let body: Value = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("client", "gtx"),
                ("sl", "auto"),
                ("tl", "ja"),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        parse_translation(&body)
    }
}

/// The response is `[[["訳文", "source", ...], ...], ...]`; sentences are concatenated.
fn parse_translation(body: &Value) -> Result<String> {
    let segments = body
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("unexpected translation payload"))?;
    let translated: String = segments
        .iter()
        .filter_map(|s| s.get(0).and_then(Value::as_str))
        .collect();
    if translated.is_empty() {
        return Err(anyhow!("empty translation"));
    }
    Ok(translated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[test]
    fn japanese_ranges() {
        assert!(contains_japanese("これはテスト"));
        assert!(contains_japanese("Rust入門"));
        assert!(contains_japanese("カタカナ only"));
        assert!(!contains_japanese("plain English text"));
        assert!(!contains_japanese("한국어"));
    }

    #[test]
    fn parses_segments() {
        let body = json!([[["こんにちは。", "Hello.", null], ["世界", "World", null]], null, "en"]);
        assert_eq!(parse_translation(&body).unwrap(), "こんにちは。世界");
        assert!(parse_translation(&json!({"error": 1})).is_err());
    }

    #[tokio::test]
    async fn japanese_is_never_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let t = Translator::with_endpoint(&server.url()).unwrap();
        assert_eq!(t.to_japanese("日本語の説明").await, "日本語の説明");
        assert_eq!(t.to_japanese("").await, "");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn translates_english() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("tl".into(), "ja".into()),
                Matcher::UrlEncoded("q".into(), "A fast web framework".into()),
            ]))
            .with_status(200)
            .with_body(r#"[[["高速なWebフレームワーク","A fast web framework",null,null,10]],null,"en"]"#)
            .expect(1)
            .create_async()
            .await;

        let t = Translator::with_endpoint(&server.url()).unwrap();
        assert_eq!(t.to_japanese("A fast web framework").await, "高速なWebフレームワーク");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn failure_falls_back_to_source() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .match_query(Matcher::Any)
            .with_status(429)
            .create_async()
            .await;

        let t = Translator::with_endpoint(&server.url()).unwrap();
        assert_eq!(t.to_japanese("rate limited").await, "rate limited");
    }
}
