use crate::archive::paths::{media_prefix, slugify_group};
use crate::error::{ArchiveError, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use toml::{Table, Value};

/// Effective settings for one group, or for the build of a multi-group site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub group: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    pub media_dir: String,
    pub media_dirs: Vec<String>,
    pub media_by_topic: bool,
    pub migrate_media_by_topic: bool,
    pub topic_ids: Vec<i64>,
    pub topic_titles: Vec<String>,
    pub publish_rss_feed: bool,
    pub rss_feed_entries: usize,
    pub publish_dir: String,
    pub site_url: String,
    pub static_dir: String,
    pub telegram_url: String,
    pub per_page: u64,
    pub show_sender_fullname: bool,
    pub timezone: String,
    pub site_name: String,
    pub site_description: String,
    pub meta_description: String,
    pub page_title: String,
    pub publish_media_index: bool,
    pub media_pages_dir: String,
    pub publish_media_hashtags: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            group: String::new(),
            name: None,
            data: None,
            media_dir: "media".to_string(),
            media_dirs: Vec::new(),
            media_by_topic: false,
            migrate_media_by_topic: false,
            topic_ids: Vec::new(),
            topic_titles: Vec::new(),
            publish_rss_feed: true,
            rss_feed_entries: 100,
            publish_dir: "site".to_string(),
            site_url: "https://mysite.com".to_string(),
            static_dir: "static".to_string(),
            telegram_url: "https://t.me/{id}".to_string(),
            per_page: 1000,
            show_sender_fullname: false,
            timezone: String::new(),
            site_name: "@{group} (Telegram) archive".to_string(),
            site_description: "Public archive of @{group} Telegram messages.".to_string(),
            meta_description: "@{group} {date} Telegram message archive.".to_string(),
            page_title: "{date} - @{group} Telegram message archive.".to_string(),
            publish_media_index: false,
            media_pages_dir: "media-pages".to_string(),
            publish_media_hashtags: true,
        }
    }
}

impl Settings {
    /// Configured zone; empty means UTC.
    pub fn tz(&self) -> Result<Tz> {
        parse_timezone(&self.timezone)
    }

    pub fn site_title(&self) -> String {
        self.fill(&self.site_name, "")
    }

    pub fn site_subtitle(&self) -> String {
        self.fill(&self.site_description, "")
    }

    pub fn page_heading(&self, date: &str) -> String {
        self.fill(&self.page_title, date)
    }

    pub fn meta_text(&self, date: &str) -> String {
        self.fill(&self.meta_description, date)
    }

    pub fn site_root(&self) -> &str {
        self.site_url.trim_end_matches('/')
    }

    fn fill(&self, pattern: &str, date: &str) -> String {
        pattern.replace("{group}", &self.group).replace("{date}", date)
    }
}

pub fn parse_timezone(raw: &str) -> Result<Tz> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Tz::UTC);
    }
    trimmed
        .parse::<Tz>()
        .map_err(|err| ArchiveError::Config(format!("unknown timezone `{trimmed}`: {err}")))
}

/// One constituent group of a multi-group site, derived from its settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupPlan {
    pub key: String,
    pub label: String,
    pub data: PathBuf,
    pub media_dir: PathBuf,
    pub media_prefix: String,
    pub timezone: String,
}

#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    pub build: Settings,
    pub groups: Vec<Settings>,
}

impl ArchiveConfig {
    pub fn is_multi_group(&self) -> bool {
        !self.groups.is_empty()
    }

    pub fn group_plans(&self) -> Vec<GroupPlan> {
        self.groups
            .iter()
            .map(|g| GroupPlan {
                key: slugify_group(&g.group),
                label: g.name.clone().unwrap_or_else(|| g.group.clone()),
                data: PathBuf::from(g.data.clone().unwrap_or_default()),
                media_dir: PathBuf::from(&g.media_dir),
                media_prefix: media_prefix(&g.media_dir, &self.build.media_dir),
                timezone: if g.timezone.trim().is_empty() {
                    self.build.timezone.clone()
                } else {
                    g.timezone.clone()
                },
            })
            .collect()
    }
}

/// Overlays `over` onto `base`. Nested tables merge key by key; any other
/// value in `over` replaces the one in `base`.
pub fn merge_tables(base: &Table, over: &Table) -> Table {
    let mut out = base.clone();
    for (key, value) in over {
        let merged = match (out.get(key), value) {
            (Some(Value::Table(a)), Value::Table(b)) => Value::Table(merge_tables(a, b)),
            _ => value.clone(),
        };
        out.insert(key.clone(), merged);
    }
    out
}

fn default_table() -> Result<Table> {
    match Value::try_from(Settings::default()) {
        Ok(Value::Table(table)) => Ok(table),
        Ok(_) => Err(ArchiveError::Config("default settings are not a table".into())),
        Err(err) => Err(ArchiveError::Config(format!("default settings: {err}"))),
    }
}

fn settings_from(table: Table) -> Result<Settings> {
    Value::Table(table)
        .try_into()
        .map_err(|err: toml::de::Error| ArchiveError::Config(err.to_string()))
}

fn sub_table(raw: &Table, key: &str) -> Result<Table> {
    match raw.get(key) {
        None => Ok(Table::new()),
        Some(Value::Table(t)) => Ok(t.clone()),
        Some(_) => Err(ArchiveError::Config(format!("`{key}` must be a table"))),
    }
}

fn force_media_by_topic(settings: &mut Settings) {
    if (!settings.topic_ids.is_empty() || !settings.topic_titles.is_empty())
        && !settings.media_by_topic
    {
        settings.media_by_topic = true;
    }
}

/// Resolves a raw config file into effective settings. Pure: reads nothing
/// but its argument.
pub fn resolve(raw: &Table) -> Result<ArchiveConfig> {
    let defaults = default_table()?;

    let Some(groups_raw) = raw.get("groups") else {
        let mut settings = settings_from(merge_tables(&defaults, raw))?;
        if !raw.contains_key("media_dir") && !settings.group.is_empty() {
            settings.media_dir = format!("media/{}", slugify_group(&settings.group));
        }
        force_media_by_topic(&mut settings);
        let cfg = ArchiveConfig {
            build: settings,
            groups: Vec::new(),
        };
        validate(&cfg)?;
        return Ok(cfg);
    };

    let Value::Array(entries) = groups_raw else {
        return Err(ArchiveError::Config("`groups` must be an array of tables".into()));
    };
    let shared = sub_table(raw, "defaults")?;
    let group_defaults = merge_tables(&defaults, &shared);

    let mut groups = Vec::with_capacity(entries.len());
    for entry in entries {
        let Value::Table(entry) = entry else {
            return Err(ArchiveError::Config("each entry in `groups` must be a table".into()));
        };
        let mut settings = settings_from(merge_tables(&group_defaults, entry))?;
        if settings.group.trim().is_empty() {
            return Err(ArchiveError::Config(
                "group is required for each entry in groups".into(),
            ));
        }
        let slug = slugify_group(&settings.group);
        if settings.data.as_deref().is_none_or(str::is_empty) {
            settings.data = Some(format!("data/{slug}.sqlite"));
        }
        let explicit_media = entry.contains_key("media_dir") || shared.contains_key("media_dir");
        if settings.media_dir.is_empty() || !explicit_media {
            settings.media_dir = format!("media/{slug}");
        }
        force_media_by_topic(&mut settings);
        groups.push(settings);
    }

    let mut build = settings_from(merge_tables(&defaults, &sub_table(raw, "build")?))?;
    if build.group.is_empty() {
        build.group = raw
            .get("group_label")
            .and_then(Value::as_str)
            .unwrap_or("multiple")
            .to_string();
    }
    if let Some(url) = raw.get("telegram_url").and_then(Value::as_str) {
        build.telegram_url = url.to_string();
    }
    if let Some(flag) = raw.get("show_sender_fullname").and_then(Value::as_bool) {
        build.show_sender_fullname = flag;
    }
    if let Some(tz) = raw.get("timezone").and_then(Value::as_str) {
        build.timezone = tz.to_string();
    }
    build.media_dirs = groups.iter().map(|g| g.media_dir.clone()).collect();

    let cfg = ArchiveConfig { build, groups };
    validate(&cfg)?;
    Ok(cfg)
}

fn validate(cfg: &ArchiveConfig) -> Result<()> {
    if cfg.build.per_page == 0 {
        return Err(ArchiveError::Config("per_page must be >= 1".into()));
    }
    cfg.build.tz()?;
    let mut keys = BTreeSet::new();
    for group in &cfg.groups {
        group.tz()?;
        let key = slugify_group(&group.group);
        if !keys.insert(key.clone()) {
            return Err(ArchiveError::Config(format!("duplicate group key `{key}`")));
        }
    }
    Ok(())
}

pub fn load(path: &Path) -> Result<ArchiveConfig> {
    let raw = fs::read_to_string(path).map_err(|err| {
        ArchiveError::Config(format!("failed to read {}: {err}", path.display()))
    })?;
    let table: Table = toml::from_str(&raw).map_err(|err| {
        ArchiveError::Config(format!("failed to parse {}: {err}", path.display()))
    })?;
    resolve(&table)
}
