use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::commands::{Access, CommandReport, load_config, open_source};

/// Prints the merged timeline and resolved paths. Writes nothing.
pub fn run(config: &Path, data: &Path) -> Result<CommandReport> {
    let mut report = CommandReport::new("status");
    let cfg = load_config(config)?;

    report.detail(format!("publish_dir={}", cfg.build.publish_dir));
    report.detail(format!("media_dir={}", cfg.build.media_dir));
    if cfg.is_multi_group() {
        for plan in cfg.group_plans() {
            report.detail(format!(
                "group={} data={} media_dir={}",
                plan.key,
                plan.data.display(),
                plan.media_dir.display()
            ));
        }
    } else {
        report.detail(format!("data={}", data.display()));
    }

    let missing: Vec<PathBuf> = if cfg.is_multi_group() {
        cfg.group_plans().into_iter().map(|plan| plan.data).collect()
    } else {
        vec![data.to_path_buf()]
    }
    .into_iter()
    .filter(|path| !path.exists())
    .collect();
    if !missing.is_empty() {
        for path in missing {
            report.issue(format!("data file not found: {}", path.display()));
        }
        return Ok(report);
    }

    let source = open_source(&cfg, data, Access::ReadOnly)?;
    let months = source.timeline()?;
    if months.is_empty() {
        report.detail("no messages archived yet");
    }
    let mut total = 0u64;
    for month in &months {
        total += month.count;
        report.detail(format!("{} {} {}", month.slug, month.label, month.count));
    }
    report.detail(format!("messages={total}"));
    Ok(report)
}
