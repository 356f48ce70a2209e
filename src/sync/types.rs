//! Boundary types exchanged between the engine and its collaborators.

use chrono::{DateTime, Utc};

/// One entry of the remote favorites list, as returned by the list call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteItem {
    /// Stable item id (BV id).
    pub id: String,
    pub title: String,
    /// When the item was added to the collection.
    pub added_at: DateTime<Utc>,
}

#[cfg(test)]
impl RemoteItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>, added_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            added_at,
        }
    }
}

/// Engagement counters of an item at fetch time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemStats {
    pub view: u64,
    pub danmaku: u64,
    pub reply: u64,
    pub like: u64,
    pub coin: u64,
    pub favorite: u64,
    pub share: u64,
}

/// Subtitle track of an item, flattened to plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subtitle {
    /// Language code, e.g. `zh-CN` or `ai-zh`.
    pub language: String,
    pub text: String,
}

/// Full metadata of one item, as returned by the detail call.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemDetail {
    pub id: String,
    pub aid: u64,
    pub title: String,
    pub description: String,
    pub author: String,
    pub author_id: u64,
    pub category: String,
    pub cover_url: String,
    pub published_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    pub duration_secs: u64,
    pub stats: ItemStats,
    /// `None` when the item has no usable subtitles.
    pub subtitle: Option<Subtitle>,
}

impl ItemDetail {
    /// Canonical web URL of the item.
    pub fn url(&self) -> String {
        format!("https://www.bilibili.com/video/{}", self.id)
    }
}
