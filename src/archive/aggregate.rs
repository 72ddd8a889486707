//! Several group stores presented as one chronologically merged archive.

use crate::archive::model::{Day, Message, Month, RecordId, paginate_days};
use crate::archive::paths::prefixed_url;
use crate::archive::source::{ArchiveSource, MediaGroup, MediaPolicy};
use crate::archive::store::Store;
use crate::error::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub struct ArchiveGroup {
    pub key: String,
    pub label: Option<String>,
    pub media_dir: PathBuf,
    /// Prepended to stored media URLs so they resolve from the shared media root.
    pub media_prefix: String,
    pub policy: MediaPolicy,
    pub store: Store,
}

impl ArchiveGroup {
    /// Rewrites one store-local message into the merged id space. Dates
    /// stay in the group's zone, the one its month and day buckets use.
    fn scope(&self, mut m: Message) -> Message {
        m.id = RecordId::scoped(&self.key, &m.id);
        m.reply_to = m.reply_to.map(|r| RecordId::scoped(&self.key, &r));

        let topic = m.topic_id.take().filter(|id| !id.is_general());
        let title = match (m.topic_title.take().filter(|t| !t.trim().is_empty()), &topic) {
            (Some(title), _) => title,
            (None, Some(id)) => format!("Topic {id}"),
            (None, None) => "General".to_string(),
        };
        m.topic_id = Some(match &topic {
            Some(id) => RecordId::scoped(&self.key, id),
            None => RecordId::Scoped(format!("{}-general", self.key)),
        });
        m.topic_title = Some(match self.label.as_deref().filter(|l| !l.is_empty()) {
            Some(label) => format!("{label} / {title}"),
            None => title,
        });

        if let Some(media) = m.media.as_mut() {
            media.url = media.url.take().map(|u| prefixed_url(&self.media_prefix, &u));
            media.thumb = media
                .thumb
                .take()
                .map(|t| prefixed_url(&self.media_prefix, &t));
        }
        m
    }
}

/// Merging view over groups in declaration order. Equal timestamps keep
/// that order.
pub struct MultiGroup {
    groups: Vec<ArchiveGroup>,
}

impl MultiGroup {
    pub fn new(groups: Vec<ArchiveGroup>) -> Self {
        Self { groups }
    }

    pub fn groups(&self) -> &[ArchiveGroup] {
        &self.groups
    }
}

impl ArchiveSource for MultiGroup {
    fn timeline(&self) -> Result<Vec<Month>> {
        let mut merged: BTreeMap<String, Month> = BTreeMap::new();
        for group in &self.groups {
            for month in group.store.timeline()? {
                merged
                    .entry(month.slug.clone())
                    .and_modify(|m| m.count += month.count)
                    .or_insert(month);
            }
        }
        Ok(merged.into_values().collect())
    }

    fn dayline(&self, year: i32, month: u32, per_page: u64) -> Result<Vec<Day>> {
        let mut merged: BTreeMap<String, Day> = BTreeMap::new();
        for group in &self.groups {
            for day in group.store.dayline(year, month, per_page)? {
                merged
                    .entry(day.slug.clone())
                    .and_modify(|d| d.count += day.count)
                    .or_insert(day);
            }
        }
        let mut days: Vec<Day> = merged.into_values().collect();
        paginate_days(&mut days, per_page);
        Ok(days)
    }

    fn message_count(&self, year: i32, month: u32) -> Result<u64> {
        let mut total = 0u64;
        for group in &self.groups {
            total += group.store.message_count(year, month)?;
        }
        Ok(total)
    }

    // Pulls each group's whole month and slices after merging.
    fn messages_page(
        &self,
        year: i32,
        month: u32,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Message>> {
        let mut merged = Vec::new();
        for group in &self.groups {
            for m in group.store.messages_page(year, month, 0, u64::MAX)? {
                merged.push(group.scope(m));
            }
        }
        merged.sort_by_key(|m| m.date);

        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(merged.into_iter().skip(offset).take(limit).collect())
    }

    fn media_messages(&self) -> Result<Vec<Message>> {
        let mut out = Vec::new();
        for group in &self.groups {
            out.extend(
                group
                    .store
                    .media_messages()?
                    .into_iter()
                    .map(|m| group.scope(m)),
            );
        }
        Ok(out)
    }

    fn media_groups(&mut self) -> Vec<MediaGroup<'_>> {
        self.groups
            .iter_mut()
            .map(|group| MediaGroup {
                key: Some(group.key.clone()),
                media_dir: group.media_dir.clone(),
                policy: group.policy,
                store: &mut group.store,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::model::Topic;
    use crate::archive::testutil::{at, message, with_media};
    use chrono_tz::Tz;

    fn group(key: &str, label: Option<&str>, prefix: &str, messages: &[Message]) -> ArchiveGroup {
        group_in(Tz::UTC, key, label, prefix, messages)
    }

    fn group_in(
        tz: Tz,
        key: &str,
        label: Option<&str>,
        prefix: &str,
        messages: &[Message],
    ) -> ArchiveGroup {
        let mut store = Store::in_memory(tz).expect("store");
        for m in messages {
            store.insert_user(&m.user).expect("user");
            if let Some(media) = &m.media {
                store.insert_media(media).expect("media");
            }
            store.insert_message(m).expect("message");
        }
        store.commit().expect("commit");
        ArchiveGroup {
            key: key.into(),
            label: label.map(str::to_string),
            media_dir: PathBuf::from(format!("media/{key}")),
            media_prefix: prefix.into(),
            policy: MediaPolicy::default(),
            store,
        }
    }

    fn ids(messages: &[Message]) -> Vec<String> {
        messages.iter().map(|m| m.id.to_string()).collect()
    }

    #[test]
    fn merges_counts_and_scopes_ids() {
        let multi = MultiGroup::new(
            vec![
                group("g1", None, "", &[message(1, at(2024, 1, 1, 12, 0))]),
                group("g2", None, "", &[message(1, at(2024, 1, 2, 12, 0))]),
            ]
        );

        assert_eq!(multi.message_count(2024, 1).expect("count"), 2);
        let page = multi.messages_page(2024, 1, 0, 10).expect("page");
        assert_eq!(ids(&page), vec!["g1-1", "g2-1"]);
        assert_eq!(multi.dayline(2024, 1, 10).expect("dayline").len(), 2);
        assert_eq!(multi.timeline().expect("timeline")[0].count, 2);
    }

    #[test]
    fn interleaves_by_timestamp_and_slices_globally() {
        let multi = MultiGroup::new(
            vec![
                group(
                    "a",
                    None,
                    "",
                    &[
                        message(1, at(2024, 1, 1, 8, 0)),
                        message(2, at(2024, 1, 3, 8, 0)),
                    ],
                ),
                group(
                    "b",
                    None,
                    "",
                    &[
                        message(1, at(2024, 1, 2, 8, 0)),
                        message(2, at(2024, 1, 4, 8, 0)),
                    ],
                ),
            ]
        );
        let first = multi.messages_page(2024, 1, 0, 2).expect("page");
        let second = multi.messages_page(2024, 1, 2, 2).expect("page");
        assert_eq!(ids(&first), vec!["a-1", "b-1"]);
        assert_eq!(ids(&second), vec!["a-2", "b-2"]);
        assert!(multi.messages_page(2024, 1, 4, 2).expect("page").is_empty());
    }

    #[test]
    fn equal_timestamps_keep_declaration_order() {
        let same = at(2024, 5, 1, 9, 0);
        let multi = MultiGroup::new(
            vec![
                group("second", None, "", &[message(7, same)]),
                group("first", None, "", &[message(3, same)]),
            ]
        );
        let page = multi.messages_page(2024, 5, 0, 10).expect("page");
        assert_eq!(ids(&page), vec!["second-7", "first-3"]);
    }

    #[test]
    fn dayline_sums_shared_days_and_repaginates() {
        let multi = MultiGroup::new(
            vec![
                group(
                    "a",
                    None,
                    "",
                    &[
                        message(1, at(2024, 1, 1, 8, 0)),
                        message(2, at(2024, 1, 2, 8, 0)),
                    ],
                ),
                group("b", None, "", &[message(1, at(2024, 1, 1, 9, 0))]),
            ]
        );
        let days = multi.dayline(2024, 1, 2).expect("dayline");
        let summary: Vec<(u64, u64)> = days.iter().map(|d| (d.count, d.page)).collect();
        assert_eq!(summary, vec![(2, 1), (1, 2)]);
    }

    #[test]
    fn media_urls_gain_group_prefix() {
        let m = with_media(message(1, at(2024, 1, 1, 12, 0)), 1, "v/1.mp4", Some("t.jpg"));
        let multi = MultiGroup::new(vec![group("g1", None, "media/g1", &[m])]);
        let media = multi.media_messages().expect("media")[0]
            .media
            .clone()
            .expect("media");
        assert_eq!(media.url.as_deref(), Some("media/g1/v/1.mp4"));
        assert_eq!(media.thumb.as_deref(), Some("media/g1/t.jpg"));
    }

    #[test]
    fn topics_carry_group_label() {
        let mut g = group("g1", Some("Group A"), "", &[message(1, at(2024, 1, 1, 12, 0))]);
        let mut topical = message(2, at(2024, 1, 1, 13, 0));
        topical.topic_id = Some(RecordId::Num(9));
        g.store
            .insert_topic(&Topic {
                id: 9,
                title: "Movies".into(),
            })
            .expect("topic");
        g.store.insert_message(&topical).expect("message");
        let mut untitled = message(3, at(2024, 1, 1, 14, 0));
        untitled.topic_id = Some(RecordId::Num(11));
        g.store.insert_message(&untitled).expect("message");
        g.store.commit().expect("commit");

        let multi = MultiGroup::new(vec![g]);
        let page = multi.messages_page(2024, 1, 0, 10).expect("page");
        let topics: Vec<(String, String)> = page
            .iter()
            .map(|m| {
                (
                    m.topic_id.as_ref().expect("topic").to_string(),
                    m.topic_title.clone().expect("title"),
                )
            })
            .collect();
        assert_eq!(
            topics,
            vec![
                ("g1-general".to_string(), "Group A / General".to_string()),
                ("g1-9".to_string(), "Group A / Movies".to_string()),
                ("g1-11".to_string(), "Group A / Topic 11".to_string()),
            ]
        );
    }

    #[test]
    fn media_groups_expose_each_store() {
        let mut multi = MultiGroup::new(vec![group("a", None, "", &[]), group("b", None, "", &[])]);
        let keys: Vec<Option<String>> = multi.media_groups().into_iter().map(|g| g.key).collect();
        assert_eq!(keys, vec![Some("a".to_string()), Some("b".to_string())]);
    }

    #[test]
    fn dates_stay_in_the_zone_that_bucketed_them() {
        let new_york: Tz = "America/New_York".parse().expect("tz");
        let multi = MultiGroup::new(vec![
            group_in(new_york, "ny", None, "", &[message(1, at(2024, 2, 1, 3, 0))]),
            group("utc", None, "", &[message(1, at(2024, 1, 31, 12, 0))]),
        ]);

        let months: Vec<String> = multi
            .timeline()
            .expect("timeline")
            .into_iter()
            .map(|m| m.slug)
            .collect();
        assert_eq!(months, vec!["2024-01"]);

        let page = multi.messages_page(2024, 1, 0, 10).expect("page");
        assert_eq!(ids(&page), vec!["utc-1", "ny-1"]);
        let day_slugs: Vec<String> = multi
            .dayline(2024, 1, 10)
            .expect("dayline")
            .into_iter()
            .map(|d| d.slug)
            .collect();
        for m in &page {
            assert_eq!(m.date.format("%Y-%m").to_string(), "2024-01");
            assert!(day_slugs.contains(&m.day_slug()), "{} has no day bucket", m.id);
        }
        assert_eq!(page[1].date.timezone(), new_york);
    }
}
