use crate::archive::model::RecordId;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

// Literal patterns; a failure here is a programming error.
static HASHTAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#[0-9A-Za-z_]+").expect("hashtag pattern"));
static NON_ALNUM_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9A-Za-z]+").expect("slug pattern"));
static NON_TAG_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9A-Za-z_-]+").expect("tag slug pattern"));

pub fn is_remote(url: &str) -> bool {
    url.contains("://")
}

/// Output filename of one page of a month. Page 1 carries no suffix.
pub fn make_filename(month_slug: &str, page: u64) -> String {
    if page > 1 {
        format!("{month_slug}_{page}.html")
    } else {
        format!("{month_slug}.html")
    }
}

/// Group key used to namespace ids, data files and media dirs.
pub fn slugify_group(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.to_lowercase().chars() {
        if ch.is_alphanumeric() || ch == '-' || ch == '_' {
            out.push(ch);
        } else {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "group".to_string()
    } else {
        trimmed.to_string()
    }
}

fn sanitize_slug(input: &str) -> String {
    NON_ALNUM_RUN
        .replace_all(input.trim(), "-")
        .trim_matches('-')
        .to_ascii_lowercase()
}

pub fn slugify_topic(title: &str, topic_id: Option<&RecordId>) -> String {
    let slug = sanitize_slug(title);
    if !slug.is_empty() {
        return slug;
    }
    match topic_id {
        Some(id) if !id.is_general() => format!("topic-{id}"),
        _ => "topic".to_string(),
    }
}

/// Directory (under the media root) holding one topic's files.
pub fn topic_dir(topic_id: Option<&RecordId>, topic_title: Option<&str>) -> String {
    if let Some(id) = topic_id.filter(|id| !id.is_general()) {
        return format!("topic-{id}");
    }
    match topic_title.map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => slugify_topic(title, None),
        None => "general".to_string(),
    }
}

/// Every `#tag` in `text`, lowercased, in order of appearance.
pub fn extract_hashtags(text: &str) -> Vec<String> {
    HASHTAG
        .find_iter(text)
        .map(|tag| tag.as_str().to_lowercase())
        .collect()
}

pub fn slugify_hashtag(tag: &str) -> String {
    NON_TAG_CHARS
        .replace_all(&tag.trim_start_matches('#').to_lowercase(), "")
        .into_owned()
}

/// Number of directory levels `path` descends into after normalization.
pub fn dir_depth(path: &str) -> usize {
    let mut depth = 0usize;
    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::ParentDir => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    depth
}

/// True when `path` is absolute or normalizes to somewhere above its base.
pub fn is_unsafe_path(path: &str) -> bool {
    let p = Path::new(path);
    if p.is_absolute() || p.has_root() {
        return true;
    }
    let mut depth = 0usize;
    for component in p.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::ParentDir => {
                if depth == 0 {
                    return true;
                }
                depth -= 1;
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return true,
        }
    }
    false
}

/// Name of the media root as seen from the site root.
pub fn media_root(media_dir: &str) -> String {
    let path = Path::new(media_dir);
    if path.is_absolute() {
        return path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
    }
    media_dir.trim_end_matches('/').to_string()
}

/// Prefix prepended to a group's media URLs so they resolve from the
/// shared media root.
pub fn media_prefix(group_media_dir: &str, media_root_dir: &str) -> String {
    if group_media_dir.is_empty() {
        return String::new();
    }
    let group = Path::new(group_media_dir);
    if group.is_absolute() {
        return media_root(group_media_dir);
    }
    if media_root_dir.is_empty() {
        return group_media_dir.to_string();
    }
    match group.strip_prefix(media_root_dir) {
        Ok(rest) => rest.to_string_lossy().trim_matches('/').to_string(),
        Err(_) => group_media_dir.to_string(),
    }
}

/// Joins a prefix and a storage-relative URL with a single slash.
pub fn prefixed_url(prefix: &str, url: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() || is_remote(url) {
        url.to_string()
    } else {
        format!("{prefix}/{}", url.trim_start_matches('/'))
    }
}

/// Final path component of a `/`-separated storage URL.
pub fn basename(url: &str) -> &str {
    url.rsplit(['/', '\\']).next().unwrap_or(url)
}

/// Lexical path from directory `base` to `target`. Both must be absolute.
pub fn relative_path(target: &Path, base: &Path) -> PathBuf {
    let target: Vec<Component> = target.components().collect();
    let base: Vec<Component> = base.components().collect();
    let common = target
        .iter()
        .zip(base.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..base.len() {
        out.push("..");
    }
    for component in &target[common..] {
        out.push(component.as_os_str());
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}
