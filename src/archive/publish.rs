//! End-to-end build of the static site from an archive source.

use crate::archive::config::Settings;
use crate::archive::feed::{FeedBuilder, FeedWindow, MimeProbe};
use crate::archive::fsops::{install_dir, install_file, recreate_dir, write_file};
use crate::archive::media_index::{MediaIndexer, validate_pages_dir};
use crate::archive::migrate::{MigrationOutcome, migrate_media_by_topic};
use crate::archive::paths::media_root;
use crate::archive::render::{
    AbstractRenderer, MediaRenderer, PageContext, PageIds, PageRenderer, Pagination, Timeline,
    nl2br, page_filename,
};
use crate::archive::source::ArchiveSource;
use crate::error::Result;
use chrono::Datelike;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, Serialize)]
pub struct BuildOutcome {
    pub nothing_to_publish: bool,
    pub pages_written: usize,
    pub last_page: Option<String>,
    pub feed_entries: usize,
    pub media_pages: usize,
    pub migration: Option<MigrationOutcome>,
}

pub struct Publisher {
    settings: Settings,
    source: Box<dyn ArchiveSource>,
    symlink: bool,
    pages: Box<dyn PageRenderer>,
    media: Option<Box<dyn MediaRenderer>>,
    abstracts: Option<Box<dyn AbstractRenderer>>,
    mime: Option<Box<dyn MimeProbe>>,
    page_ids: PageIds,
    timeline: Timeline,
}

impl Publisher {
    pub fn new(
        settings: Settings,
        source: Box<dyn ArchiveSource>,
        pages: Box<dyn PageRenderer>,
    ) -> Self {
        Self {
            settings,
            source,
            symlink: false,
            pages,
            media: None,
            abstracts: None,
            mime: None,
            page_ids: PageIds::new(),
            timeline: Timeline::new(),
        }
    }

    pub fn with_symlink(mut self, symlink: bool) -> Self {
        self.symlink = symlink;
        self
    }

    pub fn with_media_renderer(mut self, renderer: Box<dyn MediaRenderer>) -> Self {
        self.media = Some(renderer);
        self
    }

    pub fn with_abstracts(mut self, renderer: Box<dyn AbstractRenderer>) -> Self {
        self.abstracts = Some(renderer);
        self
    }

    pub fn with_mime(mut self, probe: Box<dyn MimeProbe>) -> Self {
        self.mime = Some(probe);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn page_ids(&self) -> &PageIds {
        &self.page_ids
    }

    fn out_dir(&self) -> PathBuf {
        PathBuf::from(&self.settings.publish_dir)
    }

    pub fn build(&mut self) -> Result<BuildOutcome> {
        let mut outcome = BuildOutcome::default();
        self.page_ids.clear();
        self.timeline.clear();

        if self.settings.publish_rss_feed {
            info!(
                "rss media mime detection: {}",
                if self.mime.is_some() { "enabled" } else { "disabled" }
            );
        }
        if self.settings.publish_media_index {
            validate_pages_dir(&self.settings.media_pages_dir)?;
        }

        outcome.migration = self.migrate()?;

        self.prepare()?;
        let out = self.out_dir();

        let months = self.source.timeline()?;
        if months.is_empty() {
            info!("no data found to publish site");
            outcome.nothing_to_publish = true;
            return Ok(outcome);
        }
        for month in &months {
            self.timeline
                .entry(month.date.year())
                .or_default()
                .push(month.clone());
        }

        let capacity = if self.settings.publish_rss_feed {
            self.settings.rss_feed_entries
        } else {
            0
        };
        let mut window = FeedWindow::new(capacity);
        let per_page = self.settings.per_page.max(1);

        for month in &months {
            let (year, mon) = (month.date.year(), month.date.month());
            let dayline = self.source.dayline(year, mon, per_page)?;
            let total = self.source.message_count(year, mon)?;
            let total_pages = total.div_ceil(per_page);

            for page in 1..=total_pages {
                let offset = (page - 1) * per_page;
                let messages = self.source.messages_page(year, mon, offset, per_page)?;
                if messages.is_empty() {
                    debug!(month = %month.slug, page, "empty page skipped");
                    continue;
                }

                let fname = page_filename(month, page);
                for m in &messages {
                    self.page_ids.insert(m.id.clone(), fname.clone());
                }

                let html = self.pages.render_page(&PageContext {
                    config: &self.settings,
                    timeline: &self.timeline,
                    dayline: &dayline,
                    month,
                    messages: &messages,
                    page_ids: &self.page_ids,
                    pagination: Pagination {
                        current: page,
                        total: total_pages,
                    },
                    make_filename: page_filename,
                    nl2br,
                })?;
                write_file(&out.join(&fname), &html)?;
                window.extend(messages);

                outcome.pages_written += 1;
                outcome.last_page = Some(fname);
            }
        }

        if let Some(last) = &outcome.last_page {
            install_file(&out.join(last), &out.join("index.html"), self.symlink)?;
        }

        if self.settings.publish_rss_feed {
            outcome.feed_entries = FeedBuilder::new(&self.settings, &self.page_ids)
                .with_mime(self.mime.as_deref())
                .with_abstracts(self.abstracts.as_deref())
                .write(&window, &out)?;
        }

        if self.settings.publish_media_index {
            match self.media.as_deref() {
                None => warn!("media renderer not loaded; skipping media index"),
                Some(renderer) => {
                    let indexer = MediaIndexer {
                        settings: &self.settings,
                        page_ids: &self.page_ids,
                        timeline: &self.timeline,
                        renderer,
                    };
                    outcome.media_pages = indexer.publish(self.source.media_messages()?, &out)?;
                }
            }
        }

        Ok(outcome)
    }

    /// Moves media into topic directories for every group that opted in.
    /// `None` when no group did.
    pub fn migrate(&mut self) -> Result<Option<MigrationOutcome>> {
        let mut total: Option<MigrationOutcome> = None;
        for group in self.source.media_groups() {
            if !group.policy.migrate {
                continue;
            }
            let outcome = migrate_media_by_topic(group)?;
            total.get_or_insert_with(MigrationOutcome::default).absorb(&outcome);
        }
        Ok(total)
    }

    fn prepare(&self) -> Result<()> {
        let out = self.out_dir();
        recreate_dir(&out)?;

        let static_dir = Path::new(&self.settings.static_dir);
        if static_dir.is_file() {
            install_file(static_dir, &out.join(media_root(&self.settings.static_dir)), self.symlink)?;
        } else if static_dir.is_dir() {
            install_dir(static_dir, &out.join(media_root(&self.settings.static_dir)), self.symlink)?;
        } else {
            warn!(path = %static_dir.display(), "static directory missing; skipping");
        }

        let media_dirs = if self.settings.media_dirs.is_empty() {
            vec![self.settings.media_dir.clone()]
        } else {
            self.settings.media_dirs.clone()
        };
        for dir in media_dirs.iter().filter(|d| !d.is_empty()) {
            let src = Path::new(dir);
            if src.exists() {
                install_dir(src, &out.join(media_root(dir)), self.symlink)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::model::{Day, Message, Month, RecordId, paginate_days};
    use crate::archive::render::{MediaPageContext, MediaView};
    use crate::archive::source::MediaGroup;
    use crate::archive::testutil::{at, message, with_media};
    use crate::error::ArchiveError;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::fs;
    use std::rc::Rc;
    use tempfile::tempdir;

    struct MemorySource {
        messages: Vec<Message>,
        count_bias: u64,
        calls: Rc<RefCell<Vec<(u64, u64)>>>,
    }

    impl MemorySource {
        fn new(messages: Vec<Message>) -> Self {
            Self {
                messages,
                count_bias: 0,
                calls: Rc::new(RefCell::new(Vec::new())),
            }
        }

        fn month(&self, year: i32, month: u32) -> Vec<Message> {
            self.messages
                .iter()
                .filter(|m| m.date.year() == year && m.date.month() == month)
                .cloned()
                .collect()
        }
    }

    impl ArchiveSource for MemorySource {
        fn timeline(&self) -> Result<Vec<Month>> {
            let mut months: BTreeMap<String, Month> = BTreeMap::new();
            for m in &self.messages {
                let date = m.date.date_naive().with_day(1).expect("first");
                months
                    .entry(m.date.format("%Y-%m").to_string())
                    .and_modify(|mo| mo.count += 1)
                    .or_insert_with(|| Month::new(date, 1));
            }
            Ok(months.into_values().collect())
        }

        fn dayline(&self, year: i32, month: u32, per_page: u64) -> Result<Vec<Day>> {
            let mut days: BTreeMap<String, Day> = BTreeMap::new();
            for m in self.month(year, month) {
                days.entry(m.day_slug())
                    .and_modify(|d| d.count += 1)
                    .or_insert_with(|| Day::new(m.date.date_naive(), 1, 1));
            }
            let mut days: Vec<Day> = days.into_values().collect();
            paginate_days(&mut days, per_page);
            Ok(days)
        }

        fn message_count(&self, year: i32, month: u32) -> Result<u64> {
            Ok(self.month(year, month).len() as u64 + self.count_bias)
        }

        fn messages_page(
            &self,
            year: i32,
            month: u32,
            offset: u64,
            limit: u64,
        ) -> Result<Vec<Message>> {
            self.calls.borrow_mut().push((offset, limit));
            Ok(self
                .month(year, month)
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect())
        }

        fn media_messages(&self) -> Result<Vec<Message>> {
            Ok(self
                .messages
                .iter()
                .filter(|m| m.media.is_some())
                .cloned()
                .collect())
        }

        fn media_groups(&mut self) -> Vec<MediaGroup<'_>> {
            Vec::new()
        }
    }

    struct PageEcho;

    impl PageRenderer for PageEcho {
        fn render_page(&self, ctx: &PageContext<'_>) -> Result<String> {
            let ids: Vec<String> = ctx.messages.iter().map(|m| m.id.to_string()).collect();
            Ok(format!(
                "{} {}/{} [{}]",
                ctx.month.slug,
                ctx.pagination.current,
                ctx.pagination.total,
                ids.join(",")
            ))
        }
    }

    struct MediaEcho;

    impl MediaRenderer for MediaEcho {
        fn render_media_page(&self, ctx: &MediaPageContext<'_>) -> Result<String> {
            Ok(format!("{:?} {}", ctx.view, ctx.title))
        }
    }

    fn settings(root: &Path) -> Settings {
        Settings {
            group: "demo".into(),
            publish_dir: root.join("site").display().to_string(),
            static_dir: root.join("static").display().to_string(),
            media_dir: root.join("media").display().to_string(),
            per_page: 2,
            ..Settings::default()
        }
    }

    fn january(n: i64) -> Vec<Message> {
        (1..=n)
            .map(|id| message(id, at(2024, 1, 1 + id as u32, 12, 0)))
            .collect()
    }

    #[test]
    fn pages_are_fetched_in_fixed_windows() {
        let tmp = tempdir().expect("tempdir");
        let source = MemorySource::new(january(4));
        let calls = Rc::clone(&source.calls);
        let mut publisher = Publisher::new(settings(tmp.path()), Box::new(source), Box::new(PageEcho));

        let outcome = publisher.build().expect("build");
        assert_eq!(*calls.borrow(), vec![(0, 2), (2, 2)]);
        assert_eq!(outcome.pages_written, 2);
        assert_eq!(outcome.last_page.as_deref(), Some("2024-01_2.html"));

        let site = tmp.path().join("site");
        assert_eq!(
            fs::read_to_string(site.join("2024-01.html")).expect("page 1"),
            "2024-01 1/2 [1,2]"
        );
        assert_eq!(
            fs::read_to_string(site.join("index.html")).expect("index"),
            fs::read_to_string(site.join("2024-01_2.html")).expect("page 2")
        );
        assert_eq!(publisher.page_ids().get(&RecordId::Num(3)).map(String::as_str), Some("2024-01_2.html"));
    }

    #[test]
    fn empty_page_is_skipped() {
        let tmp = tempdir().expect("tempdir");
        let mut source = MemorySource::new(january(2));
        source.count_bias = 1;
        let mut publisher = Publisher::new(settings(tmp.path()), Box::new(source), Box::new(PageEcho));

        let outcome = publisher.build().expect("build");
        assert_eq!(outcome.pages_written, 1);
        assert!(!tmp.path().join("site").join("2024-01_2.html").exists());
        assert_eq!(outcome.last_page.as_deref(), Some("2024-01.html"));
    }

    #[test]
    fn empty_timeline_is_nothing_to_publish() {
        let tmp = tempdir().expect("tempdir");
        let mut publisher = Publisher::new(
            settings(tmp.path()),
            Box::new(MemorySource::new(Vec::new())),
            Box::new(PageEcho),
        );
        let outcome = publisher.build().expect("build");
        assert!(outcome.nothing_to_publish);
        assert!(!tmp.path().join("site").join("index.html").exists());
    }

    #[test]
    fn feed_window_spans_months() {
        let tmp = tempdir().expect("tempdir");
        let mut messages = january(3);
        messages.push(message(10, at(2024, 2, 1, 12, 0)));
        messages.push(message(11, at(2024, 2, 2, 12, 0)));
        let mut cfg = settings(tmp.path());
        cfg.rss_feed_entries = 3;
        let mut publisher = Publisher::new(cfg, Box::new(MemorySource::new(messages)), Box::new(PageEcho));

        let outcome = publisher.build().expect("build");
        assert_eq!(outcome.feed_entries, 3);
        let rss = fs::read_to_string(tmp.path().join("site").join("index.rss")).expect("rss");
        assert!(rss.contains("2024-02.html#11"));
        assert!(rss.contains("2024-01_2.html#3"));
        assert!(!rss.contains("#2</link>"));
    }

    #[test]
    fn missing_media_renderer_skips_index() {
        let tmp = tempdir().expect("tempdir");
        let mut cfg = settings(tmp.path());
        cfg.publish_media_index = true;
        let messages = vec![with_media(message(1, at(2024, 1, 1, 0, 0)), 1, "a.jpg", None)];
        let mut publisher = Publisher::new(cfg, Box::new(MemorySource::new(messages)), Box::new(PageEcho));

        let outcome = publisher.build().expect("build");
        assert_eq!(outcome.media_pages, 0);
        assert!(!tmp.path().join("site").join("media-pages").exists());
    }

    #[test]
    fn media_index_is_written_with_renderer() {
        let tmp = tempdir().expect("tempdir");
        let mut cfg = settings(tmp.path());
        cfg.publish_media_index = true;
        let mut m = with_media(message(1, at(2024, 1, 1, 0, 0)), 1, "a.jpg", None);
        m.content = Some("#cats".into());
        let mut publisher = Publisher::new(cfg, Box::new(MemorySource::new(vec![m])), Box::new(PageEcho))
            .with_media_renderer(Box::new(MediaEcho));

        let outcome = publisher.build().expect("build");
        assert_eq!(outcome.media_pages, 3);
        let pages = tmp.path().join("site").join("media-pages");
        assert_eq!(
            fs::read_to_string(pages.join("tag-cats.html")).expect("tag"),
            format!("{:?} #cats", MediaView::Hashtag)
        );
    }

    #[test]
    fn escaping_media_pages_dir_fails_before_writing() {
        let tmp = tempdir().expect("tempdir");
        let mut cfg = settings(tmp.path());
        cfg.publish_media_index = true;
        cfg.media_pages_dir = "../escape".into();
        let mut publisher = Publisher::new(cfg, Box::new(MemorySource::new(january(1))), Box::new(PageEcho))
            .with_media_renderer(Box::new(MediaEcho));

        assert!(matches!(publisher.build(), Err(ArchiveError::Config(_))));
        assert!(!tmp.path().join("site").exists());
    }

    struct FailingPages;

    impl PageRenderer for FailingPages {
        fn render_page(&self, ctx: &PageContext<'_>) -> Result<String> {
            Err(ArchiveError::render(ctx.month.slug.clone(), "template not loaded"))
        }
    }

    #[test]
    fn render_failure_aborts_build() {
        let tmp = tempdir().expect("tempdir");
        let mut publisher = Publisher::new(
            settings(tmp.path()),
            Box::new(MemorySource::new(january(1))),
            Box::new(FailingPages),
        );
        assert!(matches!(publisher.build(), Err(ArchiveError::Render { .. })));
        assert!(!tmp.path().join("site").join("index.html").exists());
    }

    #[test]
    fn static_and_media_dirs_are_copied() {
        let tmp = tempdir().expect("tempdir");
        fs::create_dir_all(tmp.path().join("static")).expect("mkdir");
        fs::write(tmp.path().join("static").join("style.css"), "body{}").expect("write");
        fs::create_dir_all(tmp.path().join("media")).expect("mkdir");
        fs::write(tmp.path().join("media").join("a.jpg"), "a").expect("write");
        let mut publisher = Publisher::new(
            settings(tmp.path()),
            Box::new(MemorySource::new(january(1))),
            Box::new(PageEcho),
        );

        publisher.build().expect("build");
        let site = tmp.path().join("site");
        assert!(site.join("static").join("style.css").is_file());
        assert!(site.join("media").join("a.jpg").is_file());
    }
}
