//! Secondary index of media-bearing messages, grouped by topic and hashtag.

use crate::archive::config::Settings;
use crate::archive::fsops::write_file;
use crate::archive::model::{Message, RecordId};
use crate::archive::paths::{dir_depth, extract_hashtags, is_unsafe_path, slugify_hashtag};
use crate::archive::render::{
    HashtagSummary, MediaPageContext, MediaRenderer, MediaView, PageIds, Timeline, TopicSummary,
};
use crate::error::{ArchiveError, Result};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Default)]
pub struct MediaIndex {
    pub topics: Vec<TopicSummary>,
    pub hashtags: Vec<HashtagSummary>,
    topic_messages: Vec<Vec<Message>>,
    tags: Vec<String>,
    tag_messages: Vec<Vec<Message>>,
}

impl MediaIndex {
    /// Groups local-media messages by topic and hashtag in first-seen order.
    /// A tag repeated within one message counts once.
    pub fn collect(messages: Vec<Message>) -> Self {
        let mut index = Self::default();
        let mut topic_slot: HashMap<RecordId, usize> = HashMap::new();
        let mut tag_slot: HashMap<String, usize> = HashMap::new();

        for m in messages {
            if m.media.as_ref().and_then(|media| media.local_url()).is_none() {
                continue;
            }

            let topic_id = m
                .topic_id
                .clone()
                .filter(|id| !id.is_general())
                .unwrap_or(RecordId::Num(0));
            let slot = *topic_slot.entry(topic_id.clone()).or_insert_with(|| {
                let title = match m.topic_title.as_deref().filter(|t| !t.is_empty()) {
                    Some(title) => title.to_string(),
                    None if topic_id.is_general() => "General".to_string(),
                    None => format!("Topic {topic_id}"),
                };
                index.topics.push(TopicSummary {
                    id: topic_id.clone(),
                    title,
                    count: 0,
                });
                index.topic_messages.push(Vec::new());
                index.topics.len() - 1
            });
            index.topics[slot].count += 1;

            let mut seen = HashSet::new();
            for tag in extract_hashtags(m.text()) {
                if !seen.insert(tag.clone()) {
                    continue;
                }
                let tslot = *tag_slot.entry(tag.clone()).or_insert_with(|| {
                    index.tags.push(tag.clone());
                    index.tag_messages.push(Vec::new());
                    index.tags.len() - 1
                });
                index.tag_messages[tslot].push(m.clone());
            }

            index.topic_messages[slot].push(m);
        }

        index.hashtags = index
            .tags
            .iter()
            .zip(&index.tag_messages)
            .map(|(tag, msgs)| HashtagSummary {
                tag: tag.clone(),
                slug: slugify_hashtag(tag),
                count: msgs.len(),
            })
            .filter(|h| !h.slug.is_empty())
            .collect();
        index
    }

    pub fn topic_messages(&self, id: &RecordId) -> &[Message] {
        self.topics
            .iter()
            .position(|t| &t.id == id)
            .map(|i| self.topic_messages[i].as_slice())
            .unwrap_or(&[])
    }

    pub fn tag_messages(&self, tag: &str) -> &[Message] {
        self.tags
            .iter()
            .position(|t| t == tag)
            .map(|i| self.tag_messages[i].as_slice())
            .unwrap_or(&[])
    }
}

/// Checks `media_pages_dir` stays inside the output root.
pub fn validate_pages_dir(dir: &str) -> Result<()> {
    if is_unsafe_path(dir) {
        return Err(ArchiveError::Config(format!(
            "media_pages_dir `{dir}` must be a relative path inside publish_dir"
        )));
    }
    Ok(())
}

pub fn root_prefix(dir: &str) -> String {
    "../".repeat(dir_depth(dir))
}

pub struct MediaIndexer<'a> {
    pub settings: &'a Settings,
    pub page_ids: &'a PageIds,
    pub timeline: &'a Timeline,
    pub renderer: &'a dyn MediaRenderer,
}

impl MediaIndexer<'_> {
    /// Renders every media page; returns how many files were written.
    pub fn publish(&self, messages: Vec<Message>, out_dir: &Path) -> Result<usize> {
        let pages_dir = self.settings.media_pages_dir.as_str();
        validate_pages_dir(pages_dir)?;
        let target = out_dir.join(pages_dir);
        let prefix = root_prefix(pages_dir);
        let index = MediaIndex::collect(messages);

        let mut written = 0usize;
        self.render(&target.join("index.html"), MediaView::Index, "Media", &index, &[], &prefix)?;
        written += 1;

        for (topic, msgs) in index.topics.iter().zip(&index.topic_messages) {
            let path = target.join(format!("topic-{}.html", topic.id));
            self.render(&path, MediaView::Topic, &topic.title, &index, msgs, &prefix)?;
            written += 1;
        }

        if self.settings.publish_media_hashtags {
            for summary in &index.hashtags {
                let msgs = index.tag_messages(&summary.tag);
                let path = target.join(format!("tag-{}.html", summary.slug));
                self.render(&path, MediaView::Hashtag, &summary.tag, &index, msgs, &prefix)?;
                written += 1;
            }
        }

        debug!(dir = %target.display(), written, "media index written");
        Ok(written)
    }

    fn render(
        &self,
        path: &Path,
        view: MediaView,
        title: &str,
        index: &MediaIndex,
        messages: &[Message],
        root_prefix: &str,
    ) -> Result<()> {
        let html = self.renderer.render_media_page(&MediaPageContext {
            config: self.settings,
            view,
            title,
            topics: &index.topics,
            hashtags: &index.hashtags,
            messages,
            page_ids: self.page_ids,
            timeline: self.timeline,
            root_prefix,
        })?;
        write_file(path, &html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::testutil::{at, message, with_media};
    use std::cell::RefCell;
    use std::fs;
    use tempfile::tempdir;

    fn media_msg(id: i64, text: &str, topic: Option<i64>) -> Message {
        let mut m = with_media(message(id, at(2024, 1, 1, id as u32, 0)), id, &format!("{id}.jpg"), None);
        m.content = Some(text.into());
        m.topic_id = topic.map(RecordId::Num);
        m
    }

    #[test]
    fn repeated_tag_counts_once_per_message() {
        let index = MediaIndex::collect(vec![media_msg(1, "#foo #foo", None)]);
        assert_eq!(index.hashtags.len(), 1);
        assert_eq!(index.hashtags[0].tag, "#foo");
        assert_eq!(index.hashtags[0].count, 1);
        assert_eq!(index.tag_messages("#foo").len(), 1);
    }

    #[test]
    fn topics_keep_first_seen_order() {
        let index = MediaIndex::collect(vec![
            media_msg(1, "", Some(5)),
            media_msg(2, "", None),
            media_msg(3, "", Some(5)),
        ]);
        let summary: Vec<(String, String, usize)> = index
            .topics
            .iter()
            .map(|t| (t.id.to_string(), t.title.clone(), t.count))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("5".to_string(), "Topic 5".to_string(), 2),
                ("0".to_string(), "General".to_string(), 1),
            ]
        );
        assert_eq!(index.topic_messages(&RecordId::Num(5)).len(), 2);
    }

    #[test]
    fn remote_and_missing_media_are_ignored() {
        let remote = with_media(message(1, at(2024, 1, 1, 0, 0)), 1, "https://x.test/a", None);
        let mut empty = with_media(message(2, at(2024, 1, 1, 0, 0)), 2, "", None);
        empty.content = Some("#tag".into());
        let plain = message(3, at(2024, 1, 1, 0, 0));
        let index = MediaIndex::collect(vec![remote, empty, plain]);
        assert!(index.topics.is_empty());
        assert!(index.hashtags.is_empty());
    }

    #[test]
    fn escaping_pages_dir_is_rejected() {
        assert!(matches!(
            validate_pages_dir("../escape"),
            Err(ArchiveError::Config(_))
        ));
        assert!(validate_pages_dir("/abs").is_err());
        assert!(validate_pages_dir("media/../pages").is_ok());
        assert_eq!(root_prefix("media/pages"), "../../");
        assert_eq!(root_prefix("./media-pages"), "../");
    }

    struct Recorder {
        seen: RefCell<Vec<(MediaView, String, usize, String)>>,
    }

    impl MediaRenderer for Recorder {
        fn render_media_page(&self, ctx: &MediaPageContext<'_>) -> Result<String> {
            self.seen.borrow_mut().push((
                ctx.view,
                ctx.title.to_string(),
                ctx.messages.len(),
                ctx.root_prefix.to_string(),
            ));
            Ok(format!("<h1>{}</h1>", ctx.title))
        }
    }

    #[test]
    fn publish_writes_index_topics_and_tags() {
        let tmp = tempdir().expect("tempdir");
        let settings = Settings {
            media_pages_dir: "media/pages".into(),
            ..Settings::default()
        };
        let page_ids = PageIds::new();
        let timeline = Timeline::new();
        let recorder = Recorder {
            seen: RefCell::new(Vec::new()),
        };
        let indexer = MediaIndexer {
            settings: &settings,
            page_ids: &page_ids,
            timeline: &timeline,
            renderer: &recorder,
        };

        let written = indexer
            .publish(
                vec![media_msg(1, "#Cats and #dogs", Some(7)), media_msg(2, "#cats", None)],
                tmp.path(),
            )
            .expect("publish");
        assert_eq!(written, 5);

        let dir = tmp.path().join("media").join("pages");
        for name in ["index.html", "topic-7.html", "topic-0.html", "tag-cats.html", "tag-dogs.html"] {
            assert!(dir.join(name).is_file(), "{name} missing");
        }
        assert_eq!(
            fs::read_to_string(dir.join("tag-cats.html")).expect("read"),
            "<h1>#cats</h1>"
        );

        let seen = recorder.seen.borrow();
        assert_eq!(seen[0].0, MediaView::Index);
        assert_eq!(seen[0].2, 0);
        assert!(seen.iter().all(|s| s.3 == "../../"));
        let cats = seen.iter().find(|s| s.1 == "#cats").expect("cats page");
        assert_eq!(cats.2, 2);
    }

    #[test]
    fn hashtag_pages_can_be_disabled() {
        let tmp = tempdir().expect("tempdir");
        let settings = Settings {
            publish_media_hashtags: false,
            ..Settings::default()
        };
        let page_ids = PageIds::new();
        let timeline = Timeline::new();
        let recorder = Recorder {
            seen: RefCell::new(Vec::new()),
        };
        let indexer = MediaIndexer {
            settings: &settings,
            page_ids: &page_ids,
            timeline: &timeline,
            renderer: &recorder,
        };
        let written = indexer
            .publish(vec![media_msg(1, "#cats", None)], tmp.path())
            .expect("publish");
        assert_eq!(written, 2);
        assert!(!tmp.path().join("media-pages").join("tag-cats.html").exists());
    }
}
