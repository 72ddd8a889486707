//! Built-in site templates.

use crate::archive::config::Settings;
use crate::archive::model::{Media, Message, Month};
use crate::archive::paths::{basename, is_remote, media_root};
use crate::archive::render::{
    AbstractContext, AbstractRenderer, MediaPageContext, MediaRenderer, MediaView, PageContext,
    PageIds, PageRenderer, TextFn, Timeline, escape,
};
use crate::error::Result;
use maud::{DOCTYPE, Markup, PreEscaped, html};

#[derive(Debug, Default, Clone, Copy)]
pub struct SiteTemplates;

fn site_media_url(cfg: &Settings, url: &str) -> String {
    if is_remote(url) {
        url.to_string()
    } else {
        format!("{}/{}", media_root(&cfg.media_dir), url.trim_start_matches('/'))
    }
}

fn text_block(text: &str, nl2br: TextFn) -> Markup {
    html! {
        div.text { (PreEscaped(nl2br(&escape(text)))) }
    }
}

fn head(cfg: &Settings, title: &str, description: &str, prefix: &str) -> Markup {
    html! {
        head {
            meta charset="utf-8";
            meta name="viewport" content="width=device-width, initial-scale=1";
            title { (title) }
            meta name="description" content=(description);
            link rel="stylesheet" href=(format!("{prefix}{}/style.css", media_root(&cfg.static_dir)));
            @if cfg.publish_rss_feed {
                link rel="alternate" type="application/rss+xml" title=(cfg.site_title()) href=(format!("{prefix}index.rss"));
                link rel="alternate" type="application/atom+xml" title=(cfg.site_title()) href=(format!("{prefix}index.atom"));
            }
        }
    }
}

fn site_header(cfg: &Settings, prefix: &str) -> Markup {
    html! {
        header.site {
            h1 { a href=(format!("{prefix}index.html")) { (cfg.site_title()) } }
            p.subtitle { (cfg.site_subtitle()) }
            @if !cfg.group.is_empty() {
                a.telegram href=(cfg.telegram_url.replace("{id}", &cfg.group)) { "View on Telegram" }
            }
            @if cfg.publish_media_index {
                " "
                a.media href=(format!("{prefix}{}/index.html", cfg.media_pages_dir.trim_end_matches('/'))) { "Media" }
            }
        }
    }
}

fn timeline_nav(
    timeline: &Timeline,
    current: Option<&Month>,
    make_filename: fn(&Month, u64) -> String,
    prefix: &str,
) -> Markup {
    html! {
        nav.timeline {
            @for (year, months) in timeline.iter().rev() {
                section.year {
                    h3 { (year) }
                    ul {
                        @for month in months {
                            li {
                                @if current.is_some_and(|c| c.slug == month.slug) {
                                    strong { (month.label) }
                                } @else {
                                    a href=(format!("{prefix}{}", make_filename(month, 1))) { (month.label) }
                                }
                                " "
                                span.count { "(" (month.count) ")" }
                            }
                        }
                    }
                }
            }
        }
    }
}

fn media_block(cfg: &Settings, media: &Media, prefix: &str) -> Markup {
    let Some(url) = media.url.as_deref().filter(|u| !u.is_empty()) else {
        return html! {};
    };
    let label = media
        .title
        .clone()
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| basename(url).to_string());
    let href = if is_remote(url) {
        url.to_string()
    } else {
        format!("{prefix}{}", site_media_url(cfg, url))
    };
    let preview = media
        .thumb
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(|t| format!("{prefix}{}", site_media_url(cfg, t)))
        .or_else(|| (media.kind == "photo" && !is_remote(url)).then(|| href.clone()));

    html! {
        figure.media data-kind=(media.kind) {
            @if let Some(src) = preview {
                a href=(href) { img src=(src) alt=(label) loading="lazy"; }
            } @else {
                a.file href=(href) { (label) }
            }
            @if let Some(desc) = media.description.as_deref().filter(|d| !d.is_empty()) {
                figcaption { (desc) }
            }
        }
    }
}

struct MessageView<'a> {
    cfg: &'a Settings,
    page_ids: &'a PageIds,
    nl2br: TextFn,
    prefix: &'a str,
}

impl MessageView<'_> {
    fn render(&self, m: &Message) -> Markup {
        let id = m.id.to_string();
        let sender = if self.cfg.show_sender_fullname {
            m.user.full_name()
        } else {
            format!("@{}", m.user.handle())
        };
        html! {
            article.message id=(id) {
                header {
                    span.sender { (sender) }
                    " "
                    a.time href=(format!("#{id}")) { (m.date.format("%H:%M").to_string()) }
                    @if m.edit_date.is_some() {
                        " "
                        span.edited { "(edited)" }
                    }
                    @if let Some(topic) = m.topic_title.as_deref().filter(|t| !t.is_empty()) {
                        " "
                        span.topic { (topic) }
                    }
                }
                @if let Some(parent) = &m.reply_to {
                    @if let Some(page) = self.page_ids.get(parent) {
                        p.reply {
                            a href=(format!("{}{page}#{parent}", self.prefix)) { "Reply to #" (parent.to_string()) }
                        }
                    }
                }
                @if !m.text().is_empty() {
                    (text_block(m.text(), self.nl2br))
                }
                @if let Some(media) = &m.media {
                    (media_block(self.cfg, media, self.prefix))
                }
            }
        }
    }
}

impl PageRenderer for SiteTemplates {
    fn render_page(&self, ctx: &PageContext<'_>) -> Result<String> {
        let cfg = ctx.config;
        let view = MessageView {
            cfg,
            page_ids: ctx.page_ids,
            nl2br: ctx.nl2br,
            prefix: "",
        };
        let mut previous_day = String::new();
        let mut blocks = Vec::with_capacity(ctx.messages.len());
        for m in ctx.messages {
            let day = m.day_slug();
            let day_heading = (day != previous_day).then(|| m.date.format("%d %B %Y").to_string());
            blocks.push((day.clone(), day_heading, view.render(m)));
            previous_day = day;
        }
        let pagination = ctx.pagination;

        let markup = html! {
            (DOCTYPE)
            html lang="en" {
                (head(cfg, &cfg.page_heading(&ctx.month.label), &cfg.meta_text(&ctx.month.label), ""))
                body {
                    (site_header(cfg, ""))
                    (timeline_nav(ctx.timeline, Some(ctx.month), ctx.make_filename, ""))
                    nav.dayline {
                        ul {
                            @for day in ctx.dayline {
                                li {
                                    a href=(format!("{}#{}", (ctx.make_filename)(ctx.month, day.page), day.slug)) {
                                        (day.label)
                                    }
                                    " "
                                    span.count { "(" (day.count) ")" }
                                }
                            }
                        }
                    }
                    main {
                        h2.month { (ctx.month.label) }
                        @for (slug, heading, block) in blocks {
                            @if let Some(heading) = heading {
                                h3.day id=(slug) { (heading) }
                            }
                            (block)
                        }
                    }
                    @if pagination.total > 1 {
                        nav.pagination {
                            ul {
                                @for page in 1..=pagination.total {
                                    li {
                                        @if page == pagination.current {
                                            strong { (page) }
                                        } @else {
                                            a href=((ctx.make_filename)(ctx.month, page)) { (page) }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        };
        Ok(markup.into_string())
    }
}

impl MediaRenderer for SiteTemplates {
    fn render_media_page(&self, ctx: &MediaPageContext<'_>) -> Result<String> {
        let cfg = ctx.config;
        let prefix = ctx.root_prefix;
        let view = MessageView {
            cfg,
            page_ids: ctx.page_ids,
            nl2br: crate::archive::render::nl2br,
            prefix,
        };
        let heading = match ctx.view {
            MediaView::Index => "Media".to_string(),
            MediaView::Topic => format!("Topic: {}", ctx.title),
            MediaView::Hashtag => format!("Tag: {}", ctx.title),
        };

        let markup = html! {
            (DOCTYPE)
            html lang="en" {
                (head(cfg, &format!("{heading} - {}", cfg.site_title()), &cfg.site_subtitle(), prefix))
                body.media-index {
                    (site_header(cfg, prefix))
                    (timeline_nav(ctx.timeline, None, crate::archive::render::page_filename, prefix))
                    nav.media-topics {
                        h3 { "Topics" }
                        ul {
                            @for topic in ctx.topics {
                                li {
                                    a href=(format!("topic-{}.html", topic.id)) { (topic.title) }
                                    " "
                                    span.count { "(" (topic.count) ")" }
                                }
                            }
                        }
                    }
                    @if cfg.publish_media_hashtags && !ctx.hashtags.is_empty() {
                        nav.media-tags {
                            h3 { "Tags" }
                            ul {
                                @for tag in ctx.hashtags {
                                    li {
                                        a href=(format!("tag-{}.html", tag.slug)) { (tag.tag) }
                                        " "
                                        span.count { "(" (tag.count) ")" }
                                    }
                                }
                            }
                        }
                    }
                    main {
                        h2 { (heading) }
                        @for m in ctx.messages {
                            @if let Some(page) = ctx.page_ids.get(&m.id) {
                                p.permalink {
                                    a href=(format!("{prefix}{page}#{}", m.id)) { (m.date.format("%d %b %Y %H:%M").to_string()) }
                                }
                            }
                            (view.render(m))
                        }
                    }
                }
            }
        };
        Ok(markup.into_string())
    }
}

impl AbstractRenderer for SiteTemplates {
    fn render_abstract(&self, ctx: &AbstractContext<'_>) -> Result<String> {
        let cfg = ctx.config;
        let m = ctx.m;
        let media = m
            .media
            .as_ref()
            .and_then(|media| media.url.as_deref().filter(|u| !u.is_empty()).map(|u| (media, u)));

        let markup = html! {
            @if !m.text().is_empty() {
                (text_block(m.text(), ctx.nl2br))
            }
            @if let Some((media, url)) = media {
                @let href = if is_remote(url) {
                    url.to_string()
                } else {
                    format!("{}/{}", cfg.site_root(), site_media_url(cfg, url))
                };
                @let label = media.title.clone().unwrap_or_else(|| basename(url).to_string());
                @if ctx.media_mime.starts_with("image/") {
                    p { img src=(href) alt=(label); }
                } @else {
                    p { a href=(href) { (label) } }
                }
            }
        };
        Ok(markup.into_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::model::{Day, RecordId};
    use crate::archive::render::{Pagination, nl2br, page_filename};
    use crate::archive::testutil::{at, message, with_media};
    use chrono::NaiveDate;

    fn month() -> Month {
        Month::new(NaiveDate::from_ymd_opt(2024, 1, 1).expect("date"), 3)
    }

    #[test]
    fn page_links_replies_and_escapes_content() {
        let cfg = Settings {
            group: "demo".into(),
            ..Settings::default()
        };
        let month = month();
        let mut timeline = Timeline::new();
        timeline.insert(2024, vec![month.clone()]);
        let dayline = vec![Day::new(NaiveDate::from_ymd_opt(2024, 1, 2).expect("date"), 2, 1)];

        let parent = message(1, at(2024, 1, 2, 9, 0));
        let mut reply = message(2, at(2024, 1, 2, 10, 0));
        reply.reply_to = Some(RecordId::Num(1));
        reply.content = Some("<b>hi</b>\nthere".into());
        let messages = vec![parent, reply];

        let mut page_ids = PageIds::new();
        page_ids.insert(RecordId::Num(1), "2023-12_2.html".into());

        let html = SiteTemplates
            .render_page(&PageContext {
                config: &cfg,
                timeline: &timeline,
                dayline: &dayline,
                month: &month,
                messages: &messages,
                page_ids: &page_ids,
                pagination: Pagination { current: 1, total: 2 },
                make_filename: page_filename,
                nl2br,
            })
            .expect("render");

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("href=\"2023-12_2.html#1\""));
        assert!(html.contains("&lt;b&gt;hi&lt;/b&gt;\n<br />there"));
        assert!(html.contains("href=\"2024-01_2.html\""));
        assert!(html.contains("id=\"2024-01-02\""));
        assert!(html.contains("@demo (Telegram) archive"));
    }

    #[test]
    fn abstract_embeds_images_with_absolute_urls() {
        let cfg = Settings {
            site_url: "https://example.test".into(),
            ..Settings::default()
        };
        let m = with_media(message(1, at(2024, 1, 1, 0, 0)), 3, "topic-1/p.jpg", None);
        let page_ids = PageIds::new();
        let html = SiteTemplates
            .render_abstract(&AbstractContext {
                config: &cfg,
                m: &m,
                media_mime: "image/jpeg",
                page_ids: &page_ids,
                nl2br,
            })
            .expect("render");
        assert!(html.contains("src=\"https://example.test/media/topic-1/p.jpg\""));
        assert!(html.contains("message 1"));
    }

    #[test]
    fn media_pages_use_root_prefix() {
        let cfg = Settings::default();
        let timeline = Timeline::new();
        let m = with_media(message(5, at(2024, 1, 1, 0, 0)), 5, "a.jpg", None);
        let mut page_ids = PageIds::new();
        page_ids.insert(RecordId::Num(5), "2024-01.html".into());
        let html = SiteTemplates
            .render_media_page(&MediaPageContext {
                config: &cfg,
                view: MediaView::Topic,
                title: "General",
                topics: &[],
                hashtags: &[],
                messages: std::slice::from_ref(&m),
                page_ids: &page_ids,
                timeline: &timeline,
                root_prefix: "../",
            })
            .expect("render");
        assert!(html.contains("href=\"../2024-01.html#5\""));
        assert!(html.contains("src=\"../media/a.jpg\""));
        assert!(html.contains("href=\"../static/style.css\""));
    }
}
