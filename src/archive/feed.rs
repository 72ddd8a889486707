//! Bounded window of recent messages and the RSS / Atom documents built
//! from it.

use crate::archive::config::Settings;
use crate::archive::fsops::write_file;
use crate::archive::model::Message;
use crate::archive::paths::{is_remote, media_root};
use crate::archive::render::{AbstractContext, AbstractRenderer, PageIds, escape, nl2br};
use crate::error::{ArchiveError, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

pub const UNKNOWN_MIME: &str = "application/octet-stream";
pub const REMOTE_MIME: &str = "text/html";
pub const RSS_FILE: &str = "index.rss";
pub const ATOM_FILE: &str = "index.atom";

pub fn generator() -> String {
    format!("tg-archive {}", env!("CARGO_PKG_VERSION"))
}

/// The latest `capacity` messages pushed, oldest first.
#[derive(Debug, Clone)]
pub struct FeedWindow {
    capacity: usize,
    entries: VecDeque<Message>,
}

impl FeedWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    pub fn push(&mut self, m: Message) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(m);
    }

    pub fn extend<I: IntoIterator<Item = Message>>(&mut self, messages: I) {
        for m in messages {
            self.push(m);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Message> {
        self.entries.iter()
    }
}

/// Content-type detection for a local media file.
pub trait MimeProbe {
    fn probe(&self, path: &Path) -> Option<String>;
}

/// Guesses from the file extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtensionProbe;

impl MimeProbe for ExtensionProbe {
    fn probe(&self, path: &Path) -> Option<String> {
        mime_guess::from_path(path).first_raw().map(str::to_string)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enclosure {
    pub url: String,
    pub size: u64,
    pub mime: String,
}

#[derive(Debug, Clone)]
pub struct FeedEntry {
    pub url: String,
    pub title: String,
    pub author: String,
    pub published: DateTime<Tz>,
    pub enclosure: Option<Enclosure>,
    pub content: String,
}

pub struct FeedBuilder<'a> {
    settings: &'a Settings,
    page_ids: &'a PageIds,
    mime: Option<&'a dyn MimeProbe>,
    abstracts: Option<&'a dyn AbstractRenderer>,
}

impl<'a> FeedBuilder<'a> {
    pub fn new(settings: &'a Settings, page_ids: &'a PageIds) -> Self {
        Self {
            settings,
            page_ids,
            mime: None,
            abstracts: None,
        }
    }

    pub fn with_mime(mut self, probe: Option<&'a dyn MimeProbe>) -> Self {
        self.mime = probe;
        self
    }

    pub fn with_abstracts(mut self, renderer: Option<&'a dyn AbstractRenderer>) -> Self {
        self.abstracts = renderer;
        self
    }

    /// Entries for the window, newest first.
    pub fn entries(&self, window: &FeedWindow) -> Result<Vec<FeedEntry>> {
        window.iter().rev().map(|m| self.entry(m)).collect()
    }

    pub fn entry(&self, m: &Message) -> Result<FeedEntry> {
        let page = self.page_ids.get(&m.id).ok_or_else(|| {
            ArchiveError::InvalidRecord(format!("message {} was never assigned a page", m.id))
        })?;
        let url = format!("{}/{}#{}", self.settings.site_root(), page, m.id);
        let enclosure = self.enclosure(m);
        let media_mime = enclosure.as_ref().map(|e| e.mime.as_str()).unwrap_or("");
        let content = self.make_abstract(m, media_mime)?;

        Ok(FeedEntry {
            title: format!(
                "@{} on {} (#{})",
                m.user.handle(),
                m.date.format("%Y-%m-%d %H:%M:%S%:z"),
                m.id
            ),
            author: m.user.handle(),
            url,
            published: m.date,
            enclosure,
            content,
        })
    }

    fn enclosure(&self, m: &Message) -> Option<Enclosure> {
        let url = m.media.as_ref()?.url.as_deref().filter(|u| !u.is_empty())?;
        let public = format!(
            "{}/{}/{}",
            self.settings.site_root(),
            media_root(&self.settings.media_dir),
            url
        );
        if is_remote(url) {
            return Some(Enclosure {
                url: public,
                size: 0,
                mime: REMOTE_MIME.to_string(),
            });
        }

        let local = Path::new(&self.settings.media_dir).join(url);
        let (size, mime) = match fs::metadata(&local) {
            Ok(meta) => (
                meta.len(),
                self.mime
                    .and_then(|probe| probe.probe(&local))
                    .unwrap_or_else(|| UNKNOWN_MIME.to_string()),
            ),
            Err(_) => (0, UNKNOWN_MIME.to_string()),
        };
        Some(Enclosure {
            url: public,
            size,
            mime,
        })
    }

    fn make_abstract(&self, m: &Message, media_mime: &str) -> Result<String> {
        if let Some(renderer) = self.abstracts {
            return renderer.render_abstract(&AbstractContext {
                config: self.settings,
                m,
                media_mime,
                page_ids: self.page_ids,
                nl2br,
            });
        }
        if let Some(content) = m.content.as_deref().filter(|c| !c.is_empty()) {
            return Ok(content.to_string());
        }
        Ok(m
            .media
            .as_ref()
            .and_then(|media| media.title.clone())
            .unwrap_or_default())
    }

    /// Writes `index.rss` and `index.atom` under `out_dir`.
    pub fn write(&self, window: &FeedWindow, out_dir: &Path) -> Result<usize> {
        let entries = self.entries(window)?;
        write_file(&out_dir.join(RSS_FILE), &render_rss(self.settings, &entries))?;
        write_file(&out_dir.join(ATOM_FILE), &render_atom(self.settings, &entries))?;
        Ok(entries.len())
    }
}

fn last_updated(entries: &[FeedEntry]) -> DateTime<Utc> {
    entries
        .iter()
        .map(|e| e.published.with_timezone(&Utc))
        .max()
        .unwrap_or_else(Utc::now)
}

pub fn render_rss(settings: &Settings, entries: &[FeedEntry]) -> String {
    let site = escape(settings.site_root());
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<rss version=\"2.0\">\n<channel>\n");
    out.push_str(&format!("  <title>{}</title>\n", escape(&settings.site_title())));
    out.push_str(&format!("  <link>{site}</link>\n"));
    out.push_str(&format!(
        "  <description>{}</description>\n",
        escape(&settings.site_subtitle())
    ));
    out.push_str(&format!("  <generator>{}</generator>\n", escape(&generator())));
    out.push_str(&format!(
        "  <lastBuildDate>{}</lastBuildDate>\n",
        last_updated(entries).to_rfc2822()
    ));

    for e in entries {
        let url = escape(&e.url);
        out.push_str("  <item>\n");
        out.push_str(&format!("    <title>{}</title>\n", escape(&e.title)));
        out.push_str(&format!("    <link>{url}</link>\n"));
        out.push_str(&format!("    <guid isPermaLink=\"true\">{url}</guid>\n"));
        out.push_str(&format!("    <pubDate>{}</pubDate>\n", e.published.to_rfc2822()));
        if let Some(enc) = &e.enclosure {
            out.push_str(&format!(
                "    <enclosure url=\"{}\" length=\"{}\" type=\"{}\"/>\n",
                escape(&enc.url),
                enc.size,
                escape(&enc.mime)
            ));
        }
        out.push_str(&format!(
            "    <description>{}</description>\n",
            escape(&e.content)
        ));
        out.push_str("  </item>\n");
    }
    out.push_str("</channel>\n</rss>\n");
    out
}

pub fn render_atom(settings: &Settings, entries: &[FeedEntry]) -> String {
    let site = escape(settings.site_root());
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<feed xmlns=\"http://www.w3.org/2005/Atom\">\n");
    out.push_str(&format!("  <id>{site}</id>\n"));
    out.push_str(&format!("  <title>{}</title>\n", escape(&settings.site_title())));
    out.push_str(&format!(
        "  <subtitle>{}</subtitle>\n",
        escape(&settings.site_subtitle())
    ));
    out.push_str(&format!(
        "  <updated>{}</updated>\n",
        last_updated(entries).to_rfc3339()
    ));
    out.push_str(&format!("  <link href=\"{site}\" rel=\"alternate\"/>\n"));
    out.push_str(&format!(
        "  <generator version=\"{}\">{}</generator>\n",
        env!("CARGO_PKG_VERSION"),
        escape(&generator())
    ));

    for e in entries {
        let url = escape(&e.url);
        let published = e.published.to_rfc3339();
        out.push_str("  <entry>\n");
        out.push_str(&format!("    <id>{url}</id>\n"));
        out.push_str(&format!("    <title>{}</title>\n", escape(&e.title)));
        out.push_str(&format!("    <link href=\"{url}\"/>\n"));
        out.push_str(&format!("    <published>{published}</published>\n"));
        out.push_str(&format!("    <updated>{published}</updated>\n"));
        out.push_str(&format!(
            "    <author><name>{}</name></author>\n",
            escape(&e.author)
        ));
        if let Some(enc) = &e.enclosure {
            out.push_str(&format!(
                "    <link rel=\"enclosure\" href=\"{}\" length=\"{}\" type=\"{}\"/>\n",
                escape(&enc.url),
                enc.size,
                escape(&enc.mime)
            ));
        }
        out.push_str(&format!(
            "    <content type=\"html\">{}</content>\n",
            escape(&e.content)
        ));
        out.push_str("  </entry>\n");
    }
    out.push_str("</feed>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::model::RecordId;
    use crate::archive::testutil::{at, message, with_media};
    use std::cell::Cell;
    use tempfile::tempdir;

    fn settings(media_dir: &Path) -> Settings {
        Settings {
            group: "demo".into(),
            site_url: "https://example.test/".into(),
            media_dir: media_dir.display().to_string(),
            ..Settings::default()
        }
    }

    fn pages(messages: &[&Message]) -> PageIds {
        messages
            .iter()
            .map(|m| (m.id.clone(), "2024-01.html".to_string()))
            .collect()
    }

    #[test]
    fn window_keeps_latest_entries() {
        let mut window = FeedWindow::new(3);
        window.extend((1..=5).map(|id| message(id, at(2024, 1, id as u32, 0, 0))));
        let ids: Vec<RecordId> = window.iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids, vec![RecordId::Num(3), RecordId::Num(4), RecordId::Num(5)]);
    }

    #[test]
    fn zero_capacity_window_stays_empty() {
        let mut window = FeedWindow::new(0);
        window.push(message(1, at(2024, 1, 1, 0, 0)));
        assert!(window.is_empty());
    }

    #[test]
    fn entry_links_to_assigned_page() {
        let tmp = tempdir().expect("tempdir");
        let cfg = settings(tmp.path());
        let m = message(42, at(2024, 1, 5, 10, 0));
        let ids = pages(&[&m]);
        let entry = FeedBuilder::new(&cfg, &ids).entry(&m).expect("entry");
        assert_eq!(entry.url, "https://example.test/2024-01.html#42");
        assert!(entry.title.starts_with("@u on 2024-01-05 10:00:00"));
        assert!(entry.title.ends_with("(#42)"));
        assert_eq!(entry.content, "message 42");
    }

    #[test]
    fn missing_probe_falls_back_to_octet_stream() {
        let tmp = tempdir().expect("tempdir");
        fs::write(tmp.path().join("a.jpg"), "jpeg").expect("write");
        let cfg = settings(tmp.path());
        let m = with_media(message(1, at(2024, 1, 1, 0, 0)), 1, "a.jpg", None);
        let ids = pages(&[&m]);
        let enc = FeedBuilder::new(&cfg, &ids)
            .entry(&m)
            .expect("entry")
            .enclosure
            .expect("enclosure");
        assert_eq!(enc.mime, UNKNOWN_MIME);
        assert_eq!(enc.size, 4);
    }

    struct CountingProbe {
        calls: Cell<usize>,
    }

    impl MimeProbe for CountingProbe {
        fn probe(&self, _path: &Path) -> Option<String> {
            self.calls.set(self.calls.get() + 1);
            Some("image/x-test".into())
        }
    }

    #[test]
    fn probe_is_consulted_for_existing_files_only() {
        let tmp = tempdir().expect("tempdir");
        fs::write(tmp.path().join("a.jpg"), "jpeg").expect("write");
        let cfg = settings(tmp.path());
        let present = with_media(message(1, at(2024, 1, 1, 0, 0)), 1, "a.jpg", None);
        let missing = with_media(message(2, at(2024, 1, 1, 1, 0)), 2, "gone.jpg", None);
        let ids = pages(&[&present, &missing]);
        let probe = CountingProbe {
            calls: Cell::new(0),
        };
        let builder = FeedBuilder::new(&cfg, &ids).with_mime(Some(&probe));

        let found = builder.entry(&present).expect("entry").enclosure.expect("enc");
        let gone = builder.entry(&missing).expect("entry").enclosure.expect("enc");
        assert_eq!(found.mime, "image/x-test");
        assert_eq!(gone.mime, UNKNOWN_MIME);
        assert_eq!(probe.calls.get(), 1);
    }

    #[test]
    fn extension_probe_guesses_from_suffix() {
        assert_eq!(
            ExtensionProbe.probe(Path::new("clip.mp4")).as_deref(),
            Some("video/mp4")
        );
        assert_eq!(ExtensionProbe.probe(Path::new("noext")), None);
    }

    #[test]
    fn remote_media_is_html_without_size() {
        let tmp = tempdir().expect("tempdir");
        let cfg = settings(tmp.path());
        let m = with_media(message(1, at(2024, 1, 1, 0, 0)), 1, "https://x.test/v", None);
        let ids = pages(&[&m]);
        let enc = FeedBuilder::new(&cfg, &ids)
            .entry(&m)
            .expect("entry")
            .enclosure
            .expect("enclosure");
        assert_eq!(enc.mime, REMOTE_MIME);
        assert_eq!(enc.size, 0);
    }

    #[test]
    fn abstract_falls_back_to_media_title() {
        let tmp = tempdir().expect("tempdir");
        let cfg = settings(tmp.path());
        let mut m = with_media(message(1, at(2024, 1, 1, 0, 0)), 9, "a.jpg", None);
        m.content = None;
        let ids = pages(&[&m]);
        let entry = FeedBuilder::new(&cfg, &ids).entry(&m).expect("entry");
        assert_eq!(entry.content, "media 9");
    }

    #[test]
    fn written_feeds_parse_back() {
        let tmp = tempdir().expect("tempdir");
        let cfg = settings(tmp.path());
        let mut window = FeedWindow::new(10);
        let mut first = message(1, at(2024, 1, 1, 0, 0));
        first.content = Some("a < b & \"c\"".into());
        let second = with_media(message(2, at(2024, 1, 2, 0, 0)), 2, "b.png", None);
        let ids = pages(&[&first, &second]);
        window.extend([first, second]);

        let out = tmp.path().join("site");
        let written = FeedBuilder::new(&cfg, &ids)
            .write(&window, &out)
            .expect("write");
        assert_eq!(written, 2);

        for name in [RSS_FILE, ATOM_FILE] {
            let xml = fs::read_to_string(out.join(name)).expect("read");
            let feed = feed_rs::parser::parse(xml.as_bytes()).expect("parse");
            assert_eq!(feed.entries.len(), 2);
            assert_eq!(
                feed.title.expect("title").content,
                "@demo (Telegram) archive"
            );
            assert_eq!(
                feed.entries[0].links[0].href,
                "https://example.test/2024-01.html#2"
            );
        }
    }
}
