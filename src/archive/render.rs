//! Rendering boundary between the publishing pipeline and whatever turns a
//! context into text. The pipeline only ever talks to these traits.

use crate::archive::config::Settings;
use crate::archive::model::{Day, Message, Month, RecordId};
use crate::error::Result;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\n+").expect("blank line pattern"));

/// Message id -> output filename holding it. Rebuilt on every publish run.
pub type PageIds = HashMap<RecordId, String>;

/// Months grouped by year, ascending.
pub type Timeline = BTreeMap<i32, Vec<Month>>;

pub type FilenameFn = fn(&Month, u64) -> String;
pub type TextFn = fn(&str) -> String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub current: u64,
    pub total: u64,
}

pub struct PageContext<'a> {
    pub config: &'a Settings,
    pub timeline: &'a Timeline,
    pub dayline: &'a [Day],
    pub month: &'a Month,
    pub messages: &'a [Message],
    pub page_ids: &'a PageIds,
    pub pagination: Pagination,
    pub make_filename: FilenameFn,
    pub nl2br: TextFn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaView {
    Index,
    Topic,
    Hashtag,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSummary {
    pub id: RecordId,
    pub title: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashtagSummary {
    pub tag: String,
    pub slug: String,
    pub count: usize,
}

pub struct MediaPageContext<'a> {
    pub config: &'a Settings,
    pub view: MediaView,
    pub title: &'a str,
    pub topics: &'a [TopicSummary],
    pub hashtags: &'a [HashtagSummary],
    pub messages: &'a [Message],
    pub page_ids: &'a PageIds,
    pub timeline: &'a Timeline,
    pub root_prefix: &'a str,
}

pub struct AbstractContext<'a> {
    pub config: &'a Settings,
    pub m: &'a Message,
    pub media_mime: &'a str,
    pub page_ids: &'a PageIds,
    pub nl2br: TextFn,
}

pub trait PageRenderer {
    fn render_page(&self, ctx: &PageContext<'_>) -> Result<String>;
}

pub trait MediaRenderer {
    fn render_media_page(&self, ctx: &MediaPageContext<'_>) -> Result<String>;
}

pub trait AbstractRenderer {
    fn render_abstract(&self, ctx: &AbstractContext<'_>) -> Result<String>;
}

pub fn page_filename(month: &Month, page: u64) -> String {
    crate::archive::paths::make_filename(&month.slug, page)
}

/// Collapses blank-line runs to one blank line and marks every remaining
/// line break with `<br />`. The newline is kept before the marker so a
/// URL at the end of a line is never glued to the tag.
pub fn nl2br(text: &str) -> String {
    BLANK_RUNS
        .replace_all(text, "\n\n")
        .replace('\n', "\n<br />")
}

/// Escapes text for HTML and XML bodies and attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
