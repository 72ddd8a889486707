//! The read contract the publisher consumes, the write surface the media
//! migration needs, and the direct single-group adapter.

use crate::archive::config::Settings;
use crate::archive::model::{Day, Message, Month};
use crate::archive::store::Store;
use crate::error::Result;
use serde::Serialize;
use std::path::PathBuf;

pub trait ArchiveSource {
    /// Month buckets, ascending.
    fn timeline(&self) -> Result<Vec<Month>>;

    /// Day buckets of one month, ascending, paginated with `per_page`.
    fn dayline(&self, year: i32, month: u32, per_page: u64) -> Result<Vec<Day>>;

    fn message_count(&self, year: i32, month: u32) -> Result<u64>;

    /// Messages of one month ordered by date then id. Windows past the end
    /// are empty, never an error.
    fn messages_page(&self, year: i32, month: u32, offset: u64, limit: u64)
    -> Result<Vec<Message>>;

    /// Every message carrying media, in no particular order.
    fn media_messages(&self) -> Result<Vec<Message>>;

    /// Per-group stores and media roots, for media migration.
    fn media_groups(&mut self) -> Vec<MediaGroup<'_>>;
}

pub trait MediaPathStore {
    fn media_messages(&self) -> Result<Vec<Message>>;
    fn update_media_paths(&mut self, media_id: i64, url: &str, thumb: Option<&str>) -> Result<()>;
    /// Makes every update since the last commit durable as one unit.
    fn commit(&mut self) -> Result<()>;
}

/// A group's own media layout settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MediaPolicy {
    /// Run the per-topic migration for this group.
    pub migrate: bool,
    pub by_topic: bool,
}

impl MediaPolicy {
    pub fn forced() -> Self {
        Self {
            migrate: true,
            by_topic: true,
        }
    }
}

impl From<&Settings> for MediaPolicy {
    fn from(settings: &Settings) -> Self {
        Self {
            migrate: settings.migrate_media_by_topic,
            by_topic: settings.media_by_topic,
        }
    }
}

pub struct MediaGroup<'a> {
    pub key: Option<String>,
    pub media_dir: PathBuf,
    pub policy: MediaPolicy,
    pub store: &'a mut dyn MediaPathStore,
}

/// One group's store published as-is.
pub struct SingleGroup {
    store: Store,
    media_dir: PathBuf,
    policy: MediaPolicy,
}

impl SingleGroup {
    pub fn new(store: Store, media_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            media_dir: media_dir.into(),
            policy: MediaPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: MediaPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

impl ArchiveSource for SingleGroup {
    fn timeline(&self) -> Result<Vec<Month>> {
        self.store.timeline()
    }

    fn dayline(&self, year: i32, month: u32, per_page: u64) -> Result<Vec<Day>> {
        self.store.dayline(year, month, per_page)
    }

    fn message_count(&self, year: i32, month: u32) -> Result<u64> {
        self.store.message_count(year, month)
    }

    fn messages_page(
        &self,
        year: i32,
        month: u32,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Message>> {
        self.store.messages_page(year, month, offset, limit)
    }

    fn media_messages(&self) -> Result<Vec<Message>> {
        self.store.media_messages()
    }

    fn media_groups(&mut self) -> Vec<MediaGroup<'_>> {
        vec![MediaGroup {
            key: None,
            media_dir: self.media_dir.clone(),
            policy: self.policy,
            store: &mut self.store,
        }]
    }
}
