use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use std::fmt;
use std::rc::Rc;

/// Identifier of a message or topic.
///
/// A single store hands out numeric ids; the multi-group view rewrites them
/// to `"{group-key}-{id}"` so ids from different groups never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordId {
    Num(i64),
    Scoped(String),
}

impl RecordId {
    pub fn scoped(key: &str, id: &RecordId) -> Self {
        Self::Scoped(format!("{key}-{id}"))
    }

    pub fn as_num(&self) -> Option<i64> {
        match self {
            Self::Num(n) => Some(*n),
            Self::Scoped(_) => None,
        }
    }

    /// Id 0 (or a missing id) marks the implicit "General" topic.
    pub fn is_general(&self) -> bool {
        matches!(self, Self::Num(0))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Scoped(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self::Num(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub tags: Vec<String>,
    pub avatar: Option<String>,
}

impl User {
    pub fn full_name(&self) -> String {
        let parts = [self.first_name.as_deref(), self.last_name.as_deref()];
        let joined = parts
            .iter()
            .flatten()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if joined.is_empty() {
            self.handle()
        } else {
            joined
        }
    }

    pub fn handle(&self) -> String {
        match self.username.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    pub id: i64,
    pub kind: String,
    pub url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub thumb: Option<String>,
}

impl Media {
    /// The storage-relative URL, when the media has a file on local disk.
    pub fn local_url(&self) -> Option<&str> {
        self.url
            .as_deref()
            .filter(|url| !url.is_empty() && !crate::archive::paths::is_remote(url))
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub id: RecordId,
    pub kind: String,
    pub date: DateTime<Tz>,
    pub edit_date: Option<DateTime<Tz>>,
    pub content: Option<String>,
    pub reply_to: Option<RecordId>,
    pub user: Rc<User>,
    pub media: Option<Media>,
    pub topic_id: Option<RecordId>,
    pub topic_title: Option<String>,
}

impl Message {
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    pub fn day_slug(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub id: i64,
    pub title: String,
}

/// One (year, month) bucket of the timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Month {
    pub date: NaiveDate,
    pub slug: String,
    pub label: String,
    pub count: u64,
}

impl Month {
    pub fn new(date: NaiveDate, count: u64) -> Self {
        Self {
            date,
            slug: date.format("%Y-%m").to_string(),
            label: date.format("%b %Y").to_string(),
            count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Day {
    pub date: NaiveDate,
    pub slug: String,
    pub label: String,
    pub count: u64,
    /// Page of the month on which the day's earliest message appears.
    pub page: u64,
}

impl Day {
    pub fn new(date: NaiveDate, count: u64, page: u64) -> Self {
        Self {
            date,
            slug: date.format("%Y-%m-%d").to_string(),
            label: date.format("%d %b %Y").to_string(),
            count,
            page,
        }
    }
}

/// Assigns page numbers to day buckets that are already in date order.
pub fn paginate_days(days: &mut [Day], per_page: u64) {
    let per_page = per_page.max(1);
    let mut seen = 0u64;
    for day in days {
        day.page = seen / per_page + 1;
        seen += day.count;
    }
}
