//! User-supplied Jinja templates, loaded from disk at build time.
//!
//! Each file becomes one renderer. Templates see plain data: messages,
//! months and days flattened to strings and numbers, plus the
//! `make_filename(slug, page)` function and the `nl2br` filter (which
//! escapes its input first, so `{{ m.content | nl2br }}` is safe).

use crate::archive::config::Settings;
use crate::archive::model::{Day, Media, Message, Month};
use crate::archive::paths::make_filename;
use crate::archive::render::{
    AbstractContext, AbstractRenderer, HashtagSummary, MediaPageContext, MediaRenderer,
    MediaView, PageContext, PageIds, PageRenderer, Timeline, TopicSummary, escape, nl2br,
};
use crate::error::{ArchiveError, Result};
use minijinja::value::Value;
use minijinja::{AutoEscape, Environment, context};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const TEMPLATE: &str = "template";

pub struct FileTemplate {
    name: String,
    env: Environment<'static>,
}

impl FileTemplate {
    /// Reads and compiles `path`. A missing or unparseable file is a
    /// render error naming the file.
    pub fn load(path: &Path) -> Result<Self> {
        let name = path.display().to_string();
        let source = fs::read_to_string(path)
            .map_err(|err| ArchiveError::render(&name, format!("template not loaded: {err}")))?;

        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        env.add_function("make_filename", |slug: String, page: u64| {
            make_filename(&slug, page)
        });
        env.add_filter("nl2br", |text: String| {
            Value::from_safe_string(nl2br(&escape(&text)))
        });
        env.add_template_owned(TEMPLATE, source)
            .map_err(|err| ArchiveError::render(&name, err))?;
        Ok(Self { name, env })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn render(&self, ctx: Value) -> Result<String> {
        self.env
            .get_template(TEMPLATE)
            .and_then(|tpl| tpl.render(ctx))
            .map_err(|err| ArchiveError::render(&self.name, err))
    }
}

#[derive(Serialize)]
struct UserItem<'a> {
    id: i64,
    username: Option<&'a str>,
    first_name: Option<&'a str>,
    last_name: Option<&'a str>,
    handle: String,
    full_name: String,
    tags: &'a [String],
    avatar: Option<&'a str>,
}

#[derive(Serialize)]
struct MediaItem<'a> {
    id: i64,
    kind: &'a str,
    url: Option<&'a str>,
    title: Option<&'a str>,
    description: Option<&'a str>,
    thumb: Option<&'a str>,
}

impl<'a> From<&'a Media> for MediaItem<'a> {
    fn from(media: &'a Media) -> Self {
        Self {
            id: media.id,
            kind: &media.kind,
            url: media.url.as_deref(),
            title: media.title.as_deref(),
            description: media.description.as_deref(),
            thumb: media.thumb.as_deref(),
        }
    }
}

#[derive(Serialize)]
struct MessageItem<'a> {
    id: String,
    kind: &'a str,
    date: String,
    day: String,
    time: String,
    edit_date: Option<String>,
    content: &'a str,
    reply_to: Option<String>,
    /// Page holding the replied-to message, when it was published.
    reply_page: Option<&'a str>,
    page: Option<&'a str>,
    user: UserItem<'a>,
    media: Option<MediaItem<'a>>,
    topic_id: Option<String>,
    topic_title: Option<&'a str>,
}

fn message_item<'a>(m: &'a Message, page_ids: &'a PageIds) -> MessageItem<'a> {
    MessageItem {
        id: m.id.to_string(),
        kind: &m.kind,
        date: m.date.to_rfc3339(),
        day: m.day_slug(),
        time: m.date.format("%H:%M").to_string(),
        edit_date: m.edit_date.as_ref().map(|d| d.to_rfc3339()),
        content: m.text(),
        reply_to: m.reply_to.as_ref().map(ToString::to_string),
        reply_page: m
            .reply_to
            .as_ref()
            .and_then(|r| page_ids.get(r))
            .map(String::as_str),
        page: page_ids.get(&m.id).map(String::as_str),
        user: UserItem {
            id: m.user.id,
            username: m.user.username.as_deref(),
            first_name: m.user.first_name.as_deref(),
            last_name: m.user.last_name.as_deref(),
            handle: m.user.handle(),
            full_name: m.user.full_name(),
            tags: &m.user.tags,
            avatar: m.user.avatar.as_deref(),
        },
        media: m.media.as_ref().map(MediaItem::from),
        topic_id: m.topic_id.as_ref().map(ToString::to_string),
        topic_title: m.topic_title.as_deref(),
    }
}

fn messages<'a>(list: &'a [Message], page_ids: &'a PageIds) -> Vec<MessageItem<'a>> {
    list.iter().map(|m| message_item(m, page_ids)).collect()
}

#[derive(Serialize)]
struct MonthItem<'a> {
    slug: &'a str,
    label: &'a str,
    count: u64,
}

impl<'a> From<&'a Month> for MonthItem<'a> {
    fn from(month: &'a Month) -> Self {
        Self {
            slug: &month.slug,
            label: &month.label,
            count: month.count,
        }
    }
}

#[derive(Serialize)]
struct DayItem<'a> {
    slug: &'a str,
    label: &'a str,
    count: u64,
    page: u64,
}

impl<'a> From<&'a Day> for DayItem<'a> {
    fn from(day: &'a Day) -> Self {
        Self {
            slug: &day.slug,
            label: &day.label,
            count: day.count,
            page: day.page,
        }
    }
}

#[derive(Serialize)]
struct YearItem<'a> {
    year: i32,
    months: Vec<MonthItem<'a>>,
}

fn timeline(timeline: &Timeline) -> Vec<YearItem<'_>> {
    timeline
        .iter()
        .map(|(year, months)| YearItem {
            year: *year,
            months: months.iter().map(MonthItem::from).collect(),
        })
        .collect()
}

fn page_id_map(page_ids: &PageIds) -> BTreeMap<String, &str> {
    page_ids
        .iter()
        .map(|(id, page)| (id.to_string(), page.as_str()))
        .collect()
}

#[derive(Serialize)]
struct ConfigItem<'a> {
    #[serde(flatten)]
    settings: &'a Settings,
    site_title: String,
    site_subtitle: String,
}

fn config(settings: &Settings) -> ConfigItem<'_> {
    ConfigItem {
        settings,
        site_title: settings.site_title(),
        site_subtitle: settings.site_subtitle(),
    }
}

#[derive(Serialize)]
struct TopicItem<'a> {
    id: String,
    title: &'a str,
    count: usize,
}

fn topics(list: &[TopicSummary]) -> Vec<TopicItem<'_>> {
    list.iter()
        .map(|t| TopicItem {
            id: t.id.to_string(),
            title: &t.title,
            count: t.count,
        })
        .collect()
}

fn view_name(view: MediaView) -> &'static str {
    match view {
        MediaView::Index => "index",
        MediaView::Topic => "topic",
        MediaView::Hashtag => "hashtag",
    }
}

#[derive(Serialize)]
struct HashtagItem<'a> {
    tag: &'a str,
    slug: &'a str,
    count: usize,
}

fn hashtags(list: &[HashtagSummary]) -> Vec<HashtagItem<'_>> {
    list.iter()
        .map(|h| HashtagItem {
            tag: &h.tag,
            slug: &h.slug,
            count: h.count,
        })
        .collect()
}

/// Renderers backed by template files. Any of the three may be absent.
#[derive(Default)]
pub struct FileTemplates {
    pub page: Option<FileTemplate>,
    pub media: Option<FileTemplate>,
    pub feed_abstract: Option<FileTemplate>,
}

fn loaded<'a>(slot: &'a Option<FileTemplate>, what: &str) -> Result<&'a FileTemplate> {
    slot.as_ref()
        .ok_or_else(|| ArchiveError::render(what, "template not loaded"))
}

impl PageRenderer for FileTemplates {
    fn render_page(&self, ctx: &PageContext<'_>) -> Result<String> {
        loaded(&self.page, "page")?.render(context! {
            config => config(ctx.config),
            timeline => timeline(ctx.timeline),
            dayline => ctx.dayline.iter().map(DayItem::from).collect::<Vec<_>>(),
            month => MonthItem::from(ctx.month),
            messages => messages(ctx.messages, ctx.page_ids),
            page_ids => page_id_map(ctx.page_ids),
            pagination => context! {
                current => ctx.pagination.current,
                total => ctx.pagination.total,
            },
        })
    }
}

impl MediaRenderer for FileTemplates {
    fn render_media_page(&self, ctx: &MediaPageContext<'_>) -> Result<String> {
        loaded(&self.media, "media")?.render(context! {
            config => config(ctx.config),
            view => view_name(ctx.view),
            title => ctx.title,
            topics => topics(ctx.topics),
            hashtags => hashtags(ctx.hashtags),
            messages => messages(ctx.messages, ctx.page_ids),
            page_ids => page_id_map(ctx.page_ids),
            timeline => timeline(ctx.timeline),
            root_prefix => ctx.root_prefix,
        })
    }
}

impl AbstractRenderer for FileTemplates {
    fn render_abstract(&self, ctx: &AbstractContext<'_>) -> Result<String> {
        loaded(&self.feed_abstract, "feed abstract")?.render(context! {
            config => config(ctx.config),
            m => message_item(ctx.m, ctx.page_ids),
            media_mime => ctx.media_mime,
            page_ids => page_id_map(ctx.page_ids),
        })
    }
}
