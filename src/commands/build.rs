use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::archive::feed::ExtensionProbe;
use crate::archive::file_templates::{FileTemplate, FileTemplates};
use crate::archive::publish::Publisher;
use crate::archive::render::{AbstractRenderer, MediaRenderer, PageRenderer};
use crate::archive::templates::SiteTemplates;
use crate::commands::{Access, CommandReport, load_config, open_source};

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub config: PathBuf,
    pub data: PathBuf,
    pub symlink: bool,
    pub migrate_media: bool,
    pub feed_abstracts: bool,
    pub template: Option<PathBuf>,
    pub rss_template: Option<PathBuf>,
    pub media_template: Option<PathBuf>,
}

fn load(path: &Path) -> Result<FileTemplate> {
    let template = FileTemplate::load(path)?;
    info!(template = template.name(), "loaded template");
    Ok(template)
}

fn page_renderer(opts: &BuildOptions) -> Result<Box<dyn PageRenderer>> {
    let renderer: Box<dyn PageRenderer> = match &opts.template {
        Some(path) => Box::new(FileTemplates {
            page: Some(load(path)?),
            ..FileTemplates::default()
        }),
        None => Box::new(SiteTemplates),
    };
    Ok(renderer)
}

fn abstract_renderer(opts: &BuildOptions) -> Result<Option<Box<dyn AbstractRenderer>>> {
    let renderer: Box<dyn AbstractRenderer> = match &opts.rss_template {
        Some(path) => Box::new(FileTemplates {
            feed_abstract: Some(load(path)?),
            ..FileTemplates::default()
        }),
        None if opts.feed_abstracts => Box::new(SiteTemplates),
        None => return Ok(None),
    };
    Ok(Some(renderer))
}

fn media_renderer(opts: &BuildOptions) -> Result<Box<dyn MediaRenderer>> {
    let renderer: Box<dyn MediaRenderer> = match &opts.media_template {
        Some(path) => Box::new(FileTemplates {
            media: Some(load(path)?),
            ..FileTemplates::default()
        }),
        None => Box::new(SiteTemplates),
    };
    Ok(renderer)
}

pub fn run(opts: &BuildOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("build");
    let mut cfg = load_config(&opts.config)?;

    if opts.migrate_media {
        for settings in std::iter::once(&mut cfg.build).chain(cfg.groups.iter_mut()) {
            settings.migrate_media_by_topic = true;
            settings.media_by_topic = true;
        }
    }

    // Templates load before anything is opened or written.
    let pages = page_renderer(opts)?;
    let abstracts = abstract_renderer(opts)?;
    let settings = cfg.build.clone();
    let media = if settings.publish_media_index {
        Some(media_renderer(opts)?)
    } else {
        None
    };

    let source = open_source(&cfg, &opts.data, Access::ReadWrite)?;
    let mut publisher = Publisher::new(settings.clone(), source, pages)
        .with_symlink(opts.symlink)
        .with_mime(Box::new(ExtensionProbe));
    if let Some(renderer) = abstracts {
        publisher = publisher.with_abstracts(renderer);
    }
    if let Some(renderer) = media {
        publisher = publisher.with_media_renderer(renderer);
    }

    let outcome = publisher
        .build()
        .with_context(|| format!("failed to build site into {}", settings.publish_dir))?;

    if let Some(migration) = &outcome.migration {
        report.detail(format!(
            "media_migrated={} already_migrated={} missing={} collisions={}",
            migration.moved, migration.already_migrated, migration.missing, migration.collisions
        ));
    }
    if outcome.nothing_to_publish {
        report.detail("no data found to publish site");
        return Ok(report);
    }

    report.detail(format!("publish_dir={}", settings.publish_dir));
    report.detail(format!("pages_written={}", outcome.pages_written));
    if let Some(last) = &outcome.last_page {
        report.detail(format!("index={last}"));
    }
    if settings.publish_rss_feed {
        report.detail(format!("feed_entries={}", outcome.feed_entries));
    }
    if settings.publish_media_index {
        report.detail(format!("media_pages={}", outcome.media_pages));
    }
    info!("published to directory '{}'", settings.publish_dir);
    Ok(report)
}
