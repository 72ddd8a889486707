use anyhow::Result;
use std::path::Path;

use crate::archive::migrate::migrate_media_by_topic;
use crate::archive::source::MediaPolicy;
use crate::commands::{Access, CommandReport, load_config, open_source};

/// Moves media into topic directories without publishing. Files that are
/// missing or blocked are reported but do not fail the command.
pub fn run(config: &Path, data: &Path) -> Result<CommandReport> {
    let mut report = CommandReport::new("migrate-media");
    let cfg = load_config(config)?;
    let mut source = open_source(&cfg, data, Access::ReadWrite)?;

    for mut group in source.media_groups() {
        let name = group.key.clone().unwrap_or_else(|| cfg.build.group.clone());
        let dir = group.media_dir.display().to_string();
        group.policy = MediaPolicy::forced();
        let outcome = migrate_media_by_topic(group)?;
        report.detail(format!(
            "group={name} media_dir={dir} moved={} already_migrated={} thumbs_moved={} updated={}",
            outcome.moved, outcome.already_migrated, outcome.thumbs_moved, outcome.updated
        ));
        if outcome.missing > 0 || outcome.thumbs_missing > 0 {
            report.detail(format!(
                "group={name} missing={} thumbs_missing={}",
                outcome.missing, outcome.thumbs_missing
            ));
        }
        if outcome.collisions > 0 {
            report.detail(format!(
                "group={name} collisions={} (left in place)",
                outcome.collisions
            ));
        }
    }
    Ok(report)
}
