//! Promotional video catalog client.
//!
//! The waiting-room video lives in an external content catalog; the layout
//! endpoint returns banners whose media lists may contain several videos.
//! The newest (last) VIDEO entry wins.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait VideoCatalog: Send + Sync {
    async fn fetch_promo_video_url(&self) -> Result<String>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LayoutResponse {
    data: Vec<Layout>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Layout {
    attributes: LayoutAttributes,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LayoutAttributes {
    banners: Banners,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Banners {
    data: Vec<Banner>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Banner {
    attributes: BannerAttributes,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BannerAttributes {
    media: Vec<MediaItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MediaItem {
    #[serde(rename = "type")]
    kind: String,
    url: Option<String>,
}

/// Extract the newest video URL from a layout response body.
pub fn parse_promo_video_url(body: &str) -> Result<String> {
    let response: LayoutResponse =
        serde_json::from_str(body).context("Failed to parse catalog response")?;

    let layout = response
        .data
        .first()
        .context("Catalog response contains no layout")?;
    let banner = layout
        .attributes
        .banners
        .data
        .first()
        .context("Catalog layout contains no banners")?;

    let url = banner
        .attributes
        .media
        .iter()
        .filter(|m| m.kind == "VIDEO")
        .filter_map(|m| m.url.as_deref())
        .next_back();

    match url {
        Some(url) => Ok(url.to_string()),
        None => bail!("Catalog banner contains no video media"),
    }
}

pub struct ContentCatalog {
    http: reqwest::Client,
    endpoint: String,
}

impl ContentCatalog {
    pub fn new(endpoint: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            http,
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl VideoCatalog for ContentCatalog {
    async fn fetch_promo_video_url(&self) -> Result<String> {
        let response = self
            .http
            .get(&self.endpoint)
            .send()
            .await
            .context("Failed to reach content catalog")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Content catalog returned {status}");
        }

        let body = response
            .text()
            .await
            .context("Failed to read catalog response")?;
        let url = parse_promo_video_url(&body)?;
        debug!("Catalog resolved waiting-room video: {url}");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "data": [{
            "attributes": {
                "banners": {
                    "data": [{
                        "attributes": {
                            "media": [
                                {"type": "IMAGE", "url": "https://cdn.example.net/poster.png"},
                                {"type": "VIDEO", "url": "https://cdn.example.net/old.mp4"},
                                {"type": "VIDEO", "url": "https://cdn.example.net/new.mp4"}
                            ]
                        }
                    }]
                }
            }
        }]
    }"#;

    #[test]
    fn test_parse_picks_newest_video() {
        assert_eq!(
            parse_promo_video_url(SAMPLE).unwrap(),
            "https://cdn.example.net/new.mp4"
        );
    }

    #[test]
    fn test_parse_rejects_empty_data() {
        assert!(parse_promo_video_url(r#"{"data":[]}"#).is_err());
    }

    #[test]
    fn test_parse_rejects_banner_without_video() {
        let body = r#"{"data":[{"attributes":{"banners":{"data":[{"attributes":{"media":[{"type":"IMAGE","url":"x"}]}}]}}}]}"#;
        assert!(parse_promo_video_url(body).is_err());
    }

    #[test]
    fn test_parse_skips_video_without_url() {
        let body = r#"{"data":[{"attributes":{"banners":{"data":[{"attributes":{"media":[{"type":"VIDEO","url":"https://cdn.example.net/a.mp4"},{"type":"VIDEO"}]}}]}}}]}"#;
        assert_eq!(
            parse_promo_video_url(body).unwrap(),
            "https://cdn.example.net/a.mp4"
        );
    }
}
