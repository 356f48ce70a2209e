use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use thiserror::Error;
use tokio::fs;

use super::paths::{id_suffix, markdown_path, temp_path};
use crate::sync::{ItemDetail, ItemWriter};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const NO_DESCRIPTION: &str = "*No description.*";
const NO_SUBTITLES: &str = "*No subtitles.*";

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to move {from} into place: {source}")]
    Rename {
        from: PathBuf,
        source: std::io::Error,
    },
}

/// Writes one Markdown note per video into a directory.
#[derive(Debug, Clone)]
pub struct MarkdownWriter {
    output_dir: PathBuf,
}

impl MarkdownWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Write the note through a temp file and rename it over the target, so a
    /// reader never sees a half-written note.
    pub async fn write_note(&self, detail: &ItemDetail) -> Result<PathBuf, WriteError> {
        fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| WriteError::CreateDir {
                path: self.output_dir.clone(),
                source,
            })?;

        let path = markdown_path(&self.output_dir, &detail.id, &detail.title);
        let part = temp_path(&path);
        if let Err(source) = fs::write(&part, render(detail)).await {
            let _ = fs::remove_file(&part).await;
            return Err(WriteError::Write { path: part, source });
        }
        if let Err(source) = fs::rename(&part, &path).await {
            let _ = fs::remove_file(&part).await;
            return Err(WriteError::Rename { from: part, source });
        }
        tracing::debug!(id = %detail.id, path = %path.display(), "Wrote note");
        self.remove_stale_notes(&detail.id, &path).await;
        Ok(path)
    }

    /// Delete notes of the same item written under an earlier title.
    /// Failures only warn; the new note is already in place.
    async fn remove_stale_notes(&self, id: &str, keep: &Path) {
        let suffix = id_suffix(id);
        let mut entries = match fs::read_dir(&self.output_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to scan output directory for stale notes");
                return;
            }
        };
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to scan output directory for stale notes");
                    break;
                }
            };
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') || !name.ends_with(&suffix) {
                continue;
            }
            let stale = entry.path();
            if stale.as_path() == keep {
                continue;
            }
            match fs::remove_file(&stale).await {
                Ok(()) => tracing::info!(id, path = %stale.display(), "Removed note with outdated title"),
                Err(e) => tracing::warn!(id, path = %stale.display(), error = %e, "Failed to remove outdated note"),
            }
        }
    }
}

#[async_trait]
impl ItemWriter for MarkdownWriter {
    fn target_path(&self, id: &str, title: &str) -> PathBuf {
        markdown_path(&self.output_dir, id, title)
    }

    async fn write(&self, detail: &ItemDetail) -> anyhow::Result<PathBuf> {
        Ok(self.write_note(detail).await?)
    }
}

/// Render the note: YAML front matter, a heading, the description and the
/// subtitle text.
pub fn render(detail: &ItemDetail) -> String {
    let mut out = String::with_capacity(512 + detail.description.len());
    out.push_str("---\n");
    field(&mut out, "bv", quote(&detail.id));
    field(&mut out, "url", quote(&detail.url()));
    field(&mut out, "aid", detail.aid);
    field(&mut out, "title", quote(&detail.title));
    field(&mut out, "author", quote(&detail.author));
    field(&mut out, "author_id", detail.author_id);
    field(&mut out, "published", quote(&local_time(detail.published_at)));
    field(&mut out, "category", quote(&detail.category));
    field(&mut out, "cover", quote(&detail.cover_url));
    field(&mut out, "duration", quote(&format_clock(detail.duration_secs)));
    let stats = &detail.stats;
    field(&mut out, "view", stats.view);
    field(&mut out, "like", stats.like);
    field(&mut out, "coin", stats.coin);
    field(&mut out, "favorite", stats.favorite);
    field(&mut out, "share", stats.share);
    field(&mut out, "reply", stats.reply);
    field(&mut out, "danmaku", stats.danmaku);
    if let Some(subtitle) = &detail.subtitle {
        field(&mut out, "subtitle_language", quote(&subtitle.language));
    }
    field(&mut out, "fetched", quote(&local_time(detail.fetched_at)));
    out.push_str("---\n\n");

    let _ = writeln!(out, "# {}\n", detail.title.trim());
    let description = normalize_description(&detail.description);
    if description.is_empty() {
        out.push_str(NO_DESCRIPTION);
    } else {
        out.push_str(&description);
    }
    out.push_str("\n\n## Subtitles\n\n");
    match detail.subtitle.as_ref().map(|s| s.text.trim()) {
        Some(text) if !text.is_empty() => out.push_str(text),
        _ => out.push_str(NO_SUBTITLES),
    }
    out.push('\n');
    out
}

fn field(out: &mut String, key: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "{}: {}", key, value);
}

// A JSON string literal is a valid YAML double-quoted scalar.
fn quote(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}

fn local_time(t: DateTime<Utc>) -> String {
    t.with_timezone(&Local).format(TIME_FORMAT).to_string()
}

/// `m:ss`, or `h:mm:ss` for an hour or more.
fn format_clock(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

fn normalize_description(desc: &str) -> String {
    let unified = desc.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(unified.len());
    let mut newlines = 0;
    for c in unified.trim().chars() {
        if c == '\n' {
            newlines += 1;
            if newlines <= 2 {
                out.push(c);
            }
        } else {
            newlines = 0;
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{ItemStats, Subtitle};

    fn detail(title: &str, description: &str) -> ItemDetail {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        ItemDetail {
            id: "BV1xx411c7mD".into(),
            aid: 170001,
            title: title.into(),
            description: description.into(),
            author: "uploader".into(),
            author_id: 99,
            category: "Science".into(),
            cover_url: "http://i0.hdslb.com/a.jpg".into(),
            published_at: at,
            fetched_at: at,
            duration_secs: 3725,
            stats: ItemStats {
                view: 1,
                danmaku: 2,
                reply: 3,
                like: 4,
                coin: 5,
                favorite: 6,
                share: 7,
            },
            subtitle: None,
        }
    }

    #[test]
    fn test_render_front_matter() {
        let md = render(&detail("Black holes: explained", "Intro"));
        assert!(md.starts_with("---\nbv: \"BV1xx411c7mD\"\n"));
        assert!(md.contains("url: \"https://www.bilibili.com/video/BV1xx411c7mD\"\n"));
        assert!(md.contains("title: \"Black holes: explained\"\n"));
        assert!(md.contains("aid: 170001\n"));
        assert!(md.contains("duration: \"1:02:05\"\n"));
        assert!(md.contains("view: 1\n"));
        assert!(md.contains("danmaku: 2\n"));
        assert!(md.contains("published: \""));
        assert!(md.contains("\n---\n\n# Black holes: explained\n\nIntro\n"));
        assert!(!md.contains("subtitle_language"));
    }

    #[test]
    fn test_quotes_are_escaped() {
        let md = render(&detail("say \"hi\"", ""));
        assert!(md.contains(r#"title: "say \"hi\"""#));
    }

    #[test]
    fn test_empty_description_placeholder() {
        let md = render(&detail("t", "   \n "));
        assert!(md.contains("# t\n\n*No description.*\n"));
    }

    #[test]
    fn test_missing_subtitles_placeholder() {
        let md = render(&detail("t", "body"));
        assert!(md.ends_with("body\n\n## Subtitles\n\n*No subtitles.*\n"));
    }

    #[test]
    fn test_subtitle_section() {
        let mut d = detail("t", "body");
        d.subtitle = Some(Subtitle {
            language: "ai-zh".into(),
            text: "第一句\n第二句\n".into(),
        });
        let md = render(&d);
        assert!(md.contains("subtitle_language: \"ai-zh\"\n"));
        assert!(md.ends_with("## Subtitles\n\n第一句\n第二句\n"));
    }

    #[test]
    fn test_description_normalized() {
        assert_eq!(normalize_description("a\r\nb\n\n\n\n\nc\r"), "a\nb\n\nc");
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(59), "0:59");
        assert_eq!(format_clock(95), "1:35");
        assert_eq!(format_clock(3600), "1:00:00");
    }

    #[tokio::test]
    async fn test_write_creates_file_and_no_temp_left() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("notes");
        let writer = MarkdownWriter::new(&out);

        let path = writer.write_note(&detail("A/B test", "body")).await.unwrap();
        assert_eq!(path, out.join("A_B test-BV1xx411c7mD.md"));
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("# A/B test"));

        let leftovers: Vec<_> = std::fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_rewrite_overwrites_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = MarkdownWriter::new(dir.path());
        let first = writer.write_note(&detail("T", "old")).await.unwrap();
        let second = writer.write_note(&detail("T", "new")).await.unwrap();
        assert_eq!(first, second);
        assert!(std::fs::read_to_string(&second).unwrap().contains("new"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_longest_cjk_title_written_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let writer = MarkdownWriter::new(dir.path());
        let title = format!("【科普】{}", "黑".repeat(76));

        let path = writer.write_note(&detail(&title, "body")).await.unwrap();

        assert!(path.exists());
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with("-BV1xx411c7mD.md"));
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains(&format!("# {}", title)));
    }

    #[tokio::test]
    async fn test_renamed_title_replaces_old_note() {
        let dir = tempfile::tempdir().unwrap();
        let writer = MarkdownWriter::new(dir.path());
        std::fs::write(dir.path().join("Other-BV2.md"), "keep").unwrap();

        let old = writer.write_note(&detail("Old title", "v1")).await.unwrap();
        let new = writer.write_note(&detail("New title", "v2")).await.unwrap();

        assert!(!old.exists());
        assert_eq!(new, dir.path().join("New title-BV1xx411c7mD.md"));
        let mut names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["New title-BV1xx411c7mD.md", "Other-BV2.md"]);
    }

    #[tokio::test]
    async fn test_unwritable_dir_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let writer = MarkdownWriter::new(blocker.join("sub"));
        let err = writer.write_note(&detail("T", "")).await.unwrap_err();
        assert!(matches!(err, WriteError::CreateDir { .. }));
    }

    #[test]
    fn test_target_path_matches_written_path() {
        let writer = MarkdownWriter::new("/notes");
        assert_eq!(
            writer.target_path("BV1", "Title"),
            PathBuf::from("/notes/Title-BV1.md")
        );
    }
}
