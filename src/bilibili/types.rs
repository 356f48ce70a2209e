//! Wire types for the parts of the Bilibili web API this crate uses.
//!
//! Only the fields that are read are declared; everything else is ignored.

use serde::Deserialize;

/// Common response envelope: `{"code": 0, "message": "0", "data": {...}}`.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

/// Resource type of a video in a favorites folder.
pub(crate) const RESOURCE_TYPE_VIDEO: i64 = 2;

/// One page of `/x/v3/fav/resource/list`.
#[derive(Debug, Deserialize)]
pub(crate) struct FavoritePage {
    #[serde(default)]
    pub medias: Option<Vec<FavoriteMedia>>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FavoriteMedia {
    #[serde(rename = "type", default)]
    pub kind: i64,
    #[serde(default)]
    pub bvid: String,
    #[serde(default)]
    pub title: String,
    /// Unix seconds.
    #[serde(default)]
    pub fav_time: i64,
}

/// Payload of `/x/web-interface/view`.
#[derive(Debug, Deserialize)]
pub(crate) struct VideoView {
    pub bvid: String,
    pub aid: u64,
    /// Id of the first part, needed for the player API.
    #[serde(default)]
    pub cid: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub pic: String,
    #[serde(default)]
    pub tname: String,
    /// Unix seconds.
    #[serde(default)]
    pub pubdate: i64,
    #[serde(default)]
    pub duration: u64,
    pub owner: VideoOwner,
    #[serde(default)]
    pub stat: VideoStat,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VideoOwner {
    pub mid: u64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct VideoStat {
    #[serde(default)]
    pub view: u64,
    #[serde(default)]
    pub danmaku: u64,
    #[serde(default)]
    pub reply: u64,
    #[serde(default)]
    pub favorite: u64,
    #[serde(default)]
    pub coin: u64,
    #[serde(default)]
    pub share: u64,
    #[serde(default)]
    pub like: u64,
}

/// Payload of `/x/player/v2`. Only the subtitle list is read.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct PlayerInfo {
    #[serde(default)]
    pub subtitle: PlayerSubtitles,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PlayerSubtitles {
    #[serde(default)]
    pub subtitles: Vec<SubtitleTrack>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SubtitleTrack {
    /// Language code; AI-generated tracks start with `ai-`.
    #[serde(default)]
    pub lan: String,
    #[serde(default)]
    pub lan_doc: String,
    /// Often protocol-relative (`//aisubtitle.hdslb.com/...`).
    #[serde(default)]
    pub subtitle_url: String,
}

/// Subtitle file served from `subtitle_url`. Not wrapped in an envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct SubtitleBody {
    #[serde(default)]
    pub body: Vec<SubtitleLine>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubtitleLine {
    #[serde(default)]
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_favorite_page() {
        let json = r#"{
            "code": 0, "message": "0", "ttl": 1,
            "data": {
                "info": {"id": 1, "title": "default"},
                "medias": [
                    {"id": 1, "type": 2, "bvid": "BV1xx411c7mD", "title": "First", "fav_time": 1700000000},
                    {"id": 2, "type": 12, "bvid": "", "title": "An audio", "fav_time": 1690000000}
                ],
                "has_more": true
            }
        }"#;
        let env: Envelope<FavoritePage> = serde_json::from_str(json).unwrap();
        assert_eq!(env.code, 0);
        let page = env.data.unwrap();
        assert!(page.has_more);
        let medias = page.medias.unwrap();
        assert_eq!(medias.len(), 2);
        assert_eq!(medias[0].kind, RESOURCE_TYPE_VIDEO);
        assert_eq!(medias[0].bvid, "BV1xx411c7mD");
        assert_eq!(medias[1].kind, 12);
    }

    #[test]
    fn test_deserialize_empty_folder() {
        let json = r#"{"code": 0, "message": "0", "data": {"medias": null, "has_more": false}}"#;
        let env: Envelope<FavoritePage> = serde_json::from_str(json).unwrap();
        let page = env.data.unwrap();
        assert!(page.medias.is_none());
        assert!(!page.has_more);
    }

    #[test]
    fn test_deserialize_error_envelope() {
        let json = r#"{"code": -404, "message": "啥都木有", "ttl": 1}"#;
        let env: Envelope<VideoView> = serde_json::from_str(json).unwrap();
        assert_eq!(env.code, -404);
        assert!(env.data.is_none());
    }

    #[test]
    fn test_deserialize_video_view() {
        let json = r#"{
            "bvid": "BV1xx411c7mD", "aid": 170001, "title": "Video",
            "desc": "line1\nline2", "pic": "http://i0.hdslb.com/a.jpg", "tname": "Tech",
            "pubdate": 1700000000, "duration": 125,
            "owner": {"mid": 99, "name": "uploader", "face": "x"},
            "stat": {"view": 10, "danmaku": 2, "reply": 3, "favorite": 4, "coin": 5, "share": 6, "like": 7, "his_rank": 0}
        }"#;
        let view: VideoView = serde_json::from_str(json).unwrap();
        assert_eq!(view.aid, 170001);
        assert_eq!(view.owner.name, "uploader");
        assert_eq!(view.stat.like, 7);
        assert_eq!(view.duration, 125);
        assert_eq!(view.cid, 0);
    }

    #[test]
    fn test_deserialize_player_subtitles() {
        let json = r#"{
            "code": 0, "message": "0",
            "data": {
                "cid": 456,
                "subtitle": {
                    "allow_submit": false,
                    "subtitles": [
                        {"id": 1, "lan": "ai-zh", "lan_doc": "中文（自动生成）",
                         "subtitle_url": "//aisubtitle.hdslb.com/bfs/ai_subtitle/prod/1.json"}
                    ]
                }
            }
        }"#;
        let env: Envelope<PlayerInfo> = serde_json::from_str(json).unwrap();
        let tracks = env.data.unwrap().subtitle.subtitles;
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].lan, "ai-zh");
        assert!(tracks[0].subtitle_url.starts_with("//"));
    }

    #[test]
    fn test_deserialize_subtitle_body() {
        let json = r#"{"font_size": 0.4, "body": [
            {"from": 0.0, "to": 1.5, "location": 2, "content": "你好"},
            {"from": 1.5, "to": 3.0, "location": 2, "content": "世界"}
        ]}"#;
        let body: SubtitleBody = serde_json::from_str(json).unwrap();
        let lines: Vec<_> = body.body.iter().map(|l| l.content.as_str()).collect();
        assert_eq!(lines, vec!["你好", "世界"]);
    }
}
