//! One-time move of media files into per-topic directories.
//!
//! Safe to re-run: a file already sitting at its topic path is adopted
//! instead of moved, and a file whose recorded path is already the topic
//! path is left alone. A different file already occupying the target is
//! never overwritten.

use crate::archive::fsops::{move_file, same_contents};
use crate::archive::paths::{basename, is_remote, topic_dir};
use crate::archive::source::MediaGroup;
use crate::error::{ArchiveError, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationOutcome {
    pub moved: usize,
    pub already_migrated: usize,
    pub missing: usize,
    pub thumbs_moved: usize,
    pub thumbs_missing: usize,
    /// Files left in place because another file holds their topic path.
    pub collisions: usize,
    /// Store records rewritten.
    pub updated: usize,
    pub disabled: bool,
}

impl MigrationOutcome {
    pub fn absorb(&mut self, other: &MigrationOutcome) {
        self.moved += other.moved;
        self.already_migrated += other.already_migrated;
        self.missing += other.missing;
        self.thumbs_moved += other.thumbs_moved;
        self.thumbs_missing += other.thumbs_missing;
        self.collisions += other.collisions;
        self.updated += other.updated;
        self.disabled |= other.disabled;
    }
}

enum Step {
    InPlace,
    Adopt(String),
    Move { from: PathBuf, to: PathBuf, rel: String },
    /// Same bytes at both paths; the old copy goes.
    Duplicate { from: PathBuf, rel: String },
    Collision(PathBuf),
    Missing(PathBuf),
}

fn plan(media_dir: &Path, rel: &str, dir: &str) -> Result<Step> {
    let new_rel = format!("{dir}/{}", basename(rel));
    if new_rel == rel {
        return Ok(Step::InPlace);
    }
    let old_path = media_dir.join(rel);
    let new_path = media_dir.join(&new_rel);
    Ok(match (old_path.exists(), new_path.exists()) {
        (false, true) => Step::Adopt(new_rel),
        (false, false) => Step::Missing(old_path),
        (true, false) => Step::Move {
            from: old_path,
            to: new_path,
            rel: new_rel,
        },
        (true, true) if same_contents(&old_path, &new_path)? => Step::Duplicate {
            from: old_path,
            rel: new_rel,
        },
        (true, true) => Step::Collision(new_path),
    })
}

fn drop_duplicate(path: &Path) -> Result<()> {
    fs::remove_file(path).map_err(|err| ArchiveError::io(path, err))
}

/// Moves one group's local media into topic directories, following the
/// group's `by_topic` policy.
pub fn migrate_media_by_topic(group: MediaGroup<'_>) -> Result<MigrationOutcome> {
    let mut outcome = MigrationOutcome::default();
    let group_key = group.key.as_deref().unwrap_or("-");
    if !group.policy.by_topic {
        warn!(group = group_key, "media_by_topic is disabled; skipping migration");
        outcome.disabled = true;
        return Ok(outcome);
    }

    let media_dir = group.media_dir.as_path();
    let store = group.store;

    for m in store.media_messages()? {
        let Some(media) = m.media.as_ref() else {
            continue;
        };
        let Some(url) = media.local_url() else {
            continue;
        };
        let dir = topic_dir(m.topic_id.as_ref(), m.topic_title.as_deref());

        let new_url = match plan(media_dir, url, &dir)? {
            Step::InPlace => url.to_string(),
            Step::Adopt(rel) => {
                outcome.already_migrated += 1;
                rel
            }
            Step::Duplicate { from, rel } => {
                drop_duplicate(&from)?;
                outcome.already_migrated += 1;
                rel
            }
            Step::Collision(path) => {
                warn!(group = group_key, message = %m.id, path = %path.display(), "different file already at topic path; left in place");
                outcome.collisions += 1;
                continue;
            }
            Step::Missing(path) => {
                warn!(group = group_key, message = %m.id, path = %path.display(), "media file missing");
                outcome.missing += 1;
                continue;
            }
            Step::Move { from, to, rel } => {
                move_file(&from, &to)?;
                outcome.moved += 1;
                rel
            }
        };

        let new_thumb = match media.thumb.as_deref() {
            Some(thumb) if !thumb.is_empty() && !is_remote(thumb) => {
                match plan(media_dir, thumb, &dir)? {
                    Step::InPlace => Some(thumb.to_string()),
                    Step::Adopt(rel) => Some(rel),
                    Step::Duplicate { from, rel } => {
                        drop_duplicate(&from)?;
                        Some(rel)
                    }
                    Step::Collision(path) => {
                        warn!(group = group_key, message = %m.id, path = %path.display(), "different thumbnail already at topic path; left in place");
                        outcome.collisions += 1;
                        Some(thumb.to_string())
                    }
                    Step::Missing(path) => {
                        warn!(group = group_key, message = %m.id, path = %path.display(), "thumbnail missing");
                        outcome.thumbs_missing += 1;
                        Some(thumb.to_string())
                    }
                    Step::Move { from, to, rel } => {
                        move_file(&from, &to)?;
                        outcome.thumbs_moved += 1;
                        Some(rel)
                    }
                }
            }
            other => other.map(str::to_string),
        };

        if new_url != url || new_thumb != media.thumb {
            store.update_media_paths(media.id, &new_url, new_thumb.as_deref())?;
            outcome.updated += 1;
        }
    }

    if outcome.updated > 0 {
        store.commit()?;
    }
    info!(
        group = group_key,
        moved = outcome.moved,
        adopted = outcome.already_migrated,
        missing = outcome.missing,
        collisions = outcome.collisions,
        updated = outcome.updated,
        "media migration complete"
    );
    Ok(outcome)
}
