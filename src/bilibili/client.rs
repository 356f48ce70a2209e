use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, REFERER, USER_AGENT};
use reqwest::Client;
use serde::de::DeserializeOwned;

use super::cookie::CookieHeader;
use super::error::ApiError;
use super::types::{
    Envelope, FavoritePage, PlayerInfo, SubtitleBody, SubtitleTrack, VideoView,
    RESOURCE_TYPE_VIDEO,
};
use crate::retry::{retry_with_backoff, RetryAction, RetryPolicy};
use crate::sync::{DetailFetcher, ItemDetail, ItemFetcher, ItemStats, RemoteItem, Subtitle};

pub const DEFAULT_BASE_URL: &str = "https://api.bilibili.com";
const WEB_REFERER: &str = "https://www.bilibili.com/";
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

const FAVORITE_LIST_PATH: &str = "/x/v3/fav/resource/list";
const VIDEO_VIEW_PATH: &str = "/x/web-interface/view";
const PLAYER_PATH: &str = "/x/player/v2";
/// Label used in errors for subtitle file downloads, which have no API path.
const SUBTITLE_FILE: &str = "subtitle file";

/// Connection settings for [`BiliClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Items per favorites page (the web API caps this at 20).
    pub page_size: u32,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: 20,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// Bilibili web API client. Requests are anonymous unless a cookie is given.
#[derive(Debug, Clone)]
pub struct BiliClient {
    http: Client,
    base_url: String,
    page_size: u32,
    retry: RetryPolicy,
}

impl BiliClient {
    pub fn new(config: ClientConfig, cookie: Option<&CookieHeader>) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        headers.insert(REFERER, HeaderValue::from_static(WEB_REFERER));
        if let Some(cookie) = cookie {
            let mut value = HeaderValue::from_str(&cookie.header_value())?;
            value.set_sensitive(true);
            headers.insert(COOKIE, value);
        }

        let http = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            page_size: config.page_size.clamp(1, 20),
            retry: config.retry,
        })
    }

    /// Every video in a favorites folder, in the order the API returns them
    /// (most recently added first). Non-video resources are skipped.
    pub async fn favorite_items(&self, media_id: u64) -> Result<Vec<RemoteItem>, ApiError> {
        let mut items = Vec::new();
        let mut page_number = 1u32;
        loop {
            let page: FavoritePage = self
                .get_json(
                    FAVORITE_LIST_PATH,
                    &[
                        ("media_id", media_id.to_string()),
                        ("pn", page_number.to_string()),
                        ("ps", self.page_size.to_string()),
                        ("platform", "web".to_string()),
                    ],
                )
                .await?;

            let medias = page.medias.unwrap_or_default();
            let received = medias.len();
            items.extend(
                medias
                    .into_iter()
                    .filter(|m| m.kind == RESOURCE_TYPE_VIDEO && !m.bvid.is_empty())
                    .map(|m| RemoteItem {
                        id: m.bvid,
                        title: m.title,
                        added_at: timestamp(m.fav_time),
                    }),
            );
            tracing::debug!(media_id, page = page_number, received, "Fetched favorites page");

            if !page.has_more {
                break;
            }
            if received == 0 {
                tracing::warn!(media_id, page = page_number, "Empty page despite has_more, stopping");
                break;
            }
            page_number += 1;
        }
        Ok(items)
    }

    /// Full metadata of one video, including its subtitle text when there is
    /// one.
    pub async fn video_detail(&self, bvid: &str) -> Result<ItemDetail, ApiError> {
        let view: VideoView = self
            .get_json(VIDEO_VIEW_PATH, &[("bvid", bvid.to_string())])
            .await?;
        let subtitle = self.subtitle(&view.bvid, view.cid).await;
        Ok(ItemDetail {
            id: view.bvid,
            aid: view.aid,
            title: view.title,
            description: view.desc,
            author: view.owner.name,
            author_id: view.owner.mid,
            category: view.tname,
            cover_url: view.pic,
            published_at: timestamp(view.pubdate),
            fetched_at: Utc::now(),
            duration_secs: view.duration,
            stats: ItemStats {
                view: view.stat.view,
                danmaku: view.stat.danmaku,
                reply: view.stat.reply,
                like: view.stat.like,
                coin: view.stat.coin,
                favorite: view.stat.favorite,
                share: view.stat.share,
            },
            subtitle,
        })
    }

    /// Subtitle text of a video's first part.
    ///
    /// Missing subtitles are common and never fail the item: any error is
    /// logged and reported as `None`.
    pub async fn subtitle(&self, bvid: &str, cid: u64) -> Option<Subtitle> {
        if cid == 0 {
            return None;
        }
        match self.fetch_subtitle(bvid, cid).await {
            Ok(subtitle) => subtitle,
            Err(e) => {
                tracing::warn!(bvid, error = %e, "Failed to fetch subtitles, writing note without them");
                None
            }
        }
    }

    async fn fetch_subtitle(&self, bvid: &str, cid: u64) -> Result<Option<Subtitle>, ApiError> {
        let player: PlayerInfo = self
            .get_json(
                PLAYER_PATH,
                &[("bvid", bvid.to_string()), ("cid", cid.to_string())],
            )
            .await?;
        let Some(track) = select_track(&player.subtitle.subtitles) else {
            tracing::debug!(bvid, "No subtitles");
            return Ok(None);
        };
        tracing::debug!(bvid, lan = %track.lan, lan_doc = %track.lan_doc, "Fetching subtitles");

        let url = absolute_url(&track.subtitle_url);
        let url = url.as_str();
        let body: SubtitleBody = retry_with_backoff(&self.retry, classify, |_| {
            self.fetch_json(url, SUBTITLE_FILE, &[])
        })
        .await?;

        let text = body
            .body
            .iter()
            .map(|line| line.content.trim())
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if text.is_empty() {
            return Ok(None);
        }
        Ok(Some(Subtitle {
            language: track.lan.clone(),
            text,
        }))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        retry_with_backoff(&self.retry, classify, |_| self.get_once(endpoint, query)).await
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let envelope: Envelope<T> = self.fetch_json(&url, endpoint, query).await?;
        if envelope.code != 0 {
            return Err(ApiError::Api {
                code: envelope.code,
                message: envelope.message,
                endpoint: endpoint.to_string(),
            });
        }
        envelope.data.ok_or_else(|| ApiError::Decode {
            endpoint: endpoint.to_string(),
            reason: "response has no data".to_string(),
        })
    }

    /// One GET, decoded as JSON. `endpoint` only labels errors.
    async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &str,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let transport = |source| ApiError::Transport {
            endpoint: endpoint.to_string(),
            source,
        };

        let resp = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(transport)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::HttpStatus {
                status: status.as_u16(),
                endpoint: endpoint.to_string(),
            });
        }
        let body = resp.bytes().await.map_err(transport)?;
        serde_json::from_slice(&body).map_err(|e| ApiError::Decode {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }
}

fn classify(e: &ApiError) -> RetryAction {
    if e.is_retryable() {
        RetryAction::Retry
    } else {
        RetryAction::Abort
    }
}

/// Uploader subtitles first, then the AI-generated Chinese track.
fn select_track(tracks: &[SubtitleTrack]) -> Option<&SubtitleTrack> {
    tracks
        .iter()
        .find(|t| !t.lan.is_empty() && !t.lan.starts_with("ai-") && !t.subtitle_url.is_empty())
        .or_else(|| {
            tracks
                .iter()
                .find(|t| t.lan == "ai-zh" && !t.subtitle_url.is_empty())
        })
}

fn absolute_url(url: &str) -> String {
    match url.strip_prefix("//") {
        Some(rest) => format!("https://{}", rest),
        None => url.to_string(),
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

#[async_trait]
impl ItemFetcher for BiliClient {
    async fn fetch_items(&self, collection_id: u64) -> anyhow::Result<Vec<RemoteItem>> {
        Ok(self.favorite_items(collection_id).await?)
    }
}

#[async_trait]
impl DetailFetcher for BiliClient {
    async fn fetch_detail(&self, id: &str) -> anyhow::Result<ItemDetail> {
        Ok(self.video_detail(id).await?)
    }
}
