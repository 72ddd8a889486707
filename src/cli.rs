use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};
use crate::logging;

#[derive(Debug, Parser)]
#[command(
    name = "tg-archive",
    version,
    about = "Publish an archived chat group as a static site with feeds and a media index"
)]
pub struct Cli {
    /// Print the command report as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Log filter, e.g. `debug` or `tg_archive=trace`. Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct SourceArgs {
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Store file of a single-group archive.
    #[arg(long, default_value = "data.sqlite")]
    data: PathBuf,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build the static site into publish_dir.
    Build {
        #[command(flatten)]
        source: SourceArgs,

        /// Symlink static and media dirs instead of copying them.
        #[arg(long)]
        symlink: bool,

        /// Move media into per-topic directories before building.
        #[arg(long)]
        migrate_media: bool,

        /// Render feed entry bodies with the built-in template.
        #[arg(long)]
        feed_abstracts: bool,

        /// Jinja template for month pages, replacing the built-in one.
        #[arg(short = 't', long)]
        template: Option<PathBuf>,

        /// Jinja template for feed entry bodies.
        #[arg(long)]
        rss_template: Option<PathBuf>,

        /// Jinja template for media index pages.
        #[arg(long)]
        media_template: Option<PathBuf>,
    },
    /// Move media into per-topic directories and update the store.
    MigrateMedia {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Show the archived timeline and resolved paths.
    Status {
        #[command(flatten)]
        source: SourceArgs,
    },
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    let state = if report.ok { "ok" } else { "failed" };
    println!("{}: {state}", report.command);
    for detail in &report.details {
        println!("  {detail}");
    }
    for issue in &report.issues {
        println!("  ! {issue}");
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_level.as_deref())?;

    let report = match cli.command {
        Command::Build {
            source,
            symlink,
            migrate_media,
            feed_abstracts,
            template,
            rss_template,
            media_template,
        } => commands::build::run(&commands::build::BuildOptions {
            config: source.config,
            data: source.data,
            symlink,
            migrate_media,
            feed_abstracts,
            template,
            rss_template,
            media_template,
        })?,
        Command::MigrateMedia { source } => {
            commands::migrate_media::run(&source.config, &source.data)?
        }
        Command::Status { source } => commands::status::run(&source.config, &source.data)?,
    };

    print_report(&report, cli.json)?;
    if !report.ok {
        bail!("{} reported {} issue(s)", report.command, report.issues.len());
    }
    Ok(())
}
