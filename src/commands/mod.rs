pub mod build;
pub mod migrate_media;
pub mod status;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::path::Path;

use crate::archive::aggregate::{ArchiveGroup, MultiGroup};
use crate::archive::config::{self, ArchiveConfig, parse_timezone};
use crate::archive::source::{ArchiveSource, MediaPolicy, SingleGroup};
use crate::archive::store::Store;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }
}

pub fn load_config(path: &Path) -> Result<ArchiveConfig> {
    config::load(path).with_context(|| format!("failed to load config {}", path.display()))
}

/// How commands open the data files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadWrite,
    ReadOnly,
}

fn open_store(path: &Path, timezone: &str, access: Access) -> Result<Store> {
    if !path.exists() {
        bail!("data file not found: {}", path.display());
    }
    let tz = parse_timezone(timezone)?;
    let store = match access {
        Access::ReadWrite => Store::open(path, tz),
        Access::ReadOnly => Store::open_read_only(path, tz),
    };
    store.with_context(|| format!("failed to open store {}", path.display()))
}

/// Opens every configured group store. `data` is used only without `groups`.
pub fn open_source(
    cfg: &ArchiveConfig,
    data: &Path,
    access: Access,
) -> Result<Box<dyn ArchiveSource>> {
    if !cfg.is_multi_group() {
        let store = open_store(data, &cfg.build.timezone, access)?;
        let source = SingleGroup::new(store, &cfg.build.media_dir)
            .with_policy(MediaPolicy::from(&cfg.build));
        return Ok(Box::new(source));
    }

    let mut groups = Vec::new();
    for (plan, settings) in cfg.group_plans().into_iter().zip(&cfg.groups) {
        let store = open_store(&plan.data, &plan.timezone, access)
            .with_context(|| format!("group `{}`", plan.key))?;
        groups.push(ArchiveGroup {
            key: plan.key,
            label: Some(plan.label),
            media_dir: plan.media_dir,
            media_prefix: plan.media_prefix,
            policy: MediaPolicy::from(settings),
            store,
        });
    }
    Ok(Box::new(MultiGroup::new(groups)))
}
