use std::path::{Path, PathBuf};

/// Longest title prefix kept in a file name, in characters.
const MAX_TITLE_CHARS: usize = 100;

/// File name limit of common filesystems (ext4, APFS, NTFS), in bytes.
const MAX_FILE_NAME_BYTES: usize = 255;

/// Bytes the temp name adds around the title: `.` + `-` + `.md` + `.part`.
const NAME_OVERHEAD_BYTES: usize = 1 + 1 + 3 + 5;

/// Make a video title safe to use as a file name on every platform.
///
/// Reserved characters become `_`, runs of whitespace become one space,
/// leading and trailing dots and spaces are dropped and the result is cut to
/// 100 characters. An empty result becomes `untitled`.
pub fn clean_title(title: &str) -> String {
    let replaced: String = title
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect();
    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed
        .trim_matches(|c| c == '.' || c == ' ')
        .chars()
        .take(MAX_TITLE_CHARS)
        .collect();
    let trimmed = truncated.trim_end_matches(|c| c == '.' || c == ' ');
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `<dir>/<clean title>-<id>.md`. The id suffix keeps the path unique per item.
///
/// The title is shortened further when needed so that the temp name from
/// [`temp_path`] stays within 255 bytes.
pub fn markdown_path(dir: &Path, id: &str, title: &str) -> PathBuf {
    let budget = MAX_FILE_NAME_BYTES.saturating_sub(NAME_OVERHEAD_BYTES + id.len());
    let cleaned = clean_title(title);
    let fitted = truncate_to_bytes(&cleaned, budget).trim_end_matches(|c| c == '.' || c == ' ');
    let stem = if fitted.is_empty() { "untitled" } else { fitted };
    dir.join(format!("{}-{}.md", stem, id))
}

/// Suffix shared by every note of an item, whatever its title.
pub fn id_suffix(id: &str) -> String {
    format!("-{}.md", id)
}

/// Longest prefix of `s` that fits in `max_bytes` and ends on a char boundary.
fn truncate_to_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Hidden sibling used while a file is being written.
pub fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.part", name))
}
