//! SQLite-backed store of one group's users, media, messages and topics.
//!
//! Dates are written as RFC 3339 text in the store's configured zone, so
//! the first 7 / 10 characters of a stored date are its local month / day.
//! The text is not ordered across offset changes; sorting goes through
//! `julianday`, which normalizes to UTC.

use crate::archive::model::{Day, Media, Message, Month, RecordId, Topic, User, paginate_days};
use crate::archive::source::MediaPathStore;
use crate::error::{ArchiveError, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat};
use chrono_tz::Tz;
use rusqlite::{Connection, OpenFlags, Params, Row, params};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    username TEXT,
    first_name TEXT,
    last_name TEXT,
    tags TEXT,
    avatar TEXT
);
CREATE TABLE IF NOT EXISTS media (
    id INTEGER PRIMARY KEY,
    type TEXT,
    url TEXT,
    title TEXT,
    description TEXT,
    thumb TEXT
);
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY,
    type TEXT NOT NULL,
    date TEXT NOT NULL,
    edit_date TEXT,
    content TEXT,
    reply_to INTEGER,
    user_id INTEGER,
    media_id INTEGER,
    topic_id INTEGER
);
CREATE TABLE IF NOT EXISTS topics (
    id INTEGER PRIMARY KEY,
    title TEXT
);
CREATE INDEX IF NOT EXISTS idx_messages_date ON messages(date);
CREATE INDEX IF NOT EXISTS idx_messages_media ON messages(media_id);
";

const MESSAGE_SELECT: &str = "
SELECT m.id, m.type, m.date, m.edit_date, m.content, m.reply_to, m.user_id, m.topic_id, t.title,
       u.id, u.username, u.first_name, u.last_name, u.tags, u.avatar,
       md.id, md.type, md.url, md.title, md.description, md.thumb
FROM messages m
LEFT JOIN users u ON u.id = m.user_id
LEFT JOIN media md ON md.id = m.media_id
LEFT JOIN topics t ON t.id = m.topic_id";

struct MessageRow {
    id: i64,
    kind: String,
    date: String,
    edit_date: Option<String>,
    content: Option<String>,
    reply_to: Option<i64>,
    user_id: Option<i64>,
    topic_id: Option<i64>,
    topic_title: Option<String>,
    user: Option<User>,
    tags_raw: Option<String>,
    media: Option<Media>,
}

fn read_message_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    let joined_user: Option<i64> = row.get(9)?;
    let user = match joined_user {
        Some(id) => Some(User {
            id,
            username: row.get(10)?,
            first_name: row.get(11)?,
            last_name: row.get(12)?,
            tags: Vec::new(),
            avatar: row.get(14)?,
        }),
        None => None,
    };
    let media_id: Option<i64> = row.get(15)?;
    let media = match media_id {
        Some(id) => Some(Media {
            id,
            kind: row.get::<_, Option<String>>(16)?.unwrap_or_default(),
            url: row.get(17)?,
            title: row.get(18)?,
            description: row.get(19)?,
            thumb: row.get(20)?,
        }),
        None => None,
    };

    Ok(MessageRow {
        id: row.get(0)?,
        kind: row.get(1)?,
        date: row.get(2)?,
        edit_date: row.get(3)?,
        content: row.get(4)?,
        reply_to: row.get(5)?,
        user_id: row.get(6)?,
        topic_id: row.get(7)?,
        topic_title: row.get(8)?,
        user,
        tags_raw: row.get(13)?,
        media,
    })
}

fn month_key(year: i32, month: u32) -> String {
    format!("{year:04}-{month:02}")
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

pub struct Store {
    conn: Connection,
    path: PathBuf,
    tz: Tz,
    in_tx: bool,
}

impl Store {
    /// Opens (creating if needed) the store at `path`. The parent directory
    /// must already exist.
    pub fn open(path: impl AsRef<Path>, tz: Tz) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(|err| ArchiveError::store(&path, err))?;
        let store = Self {
            conn,
            path,
            tz,
            in_tx: false,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Opens an existing store without creating or altering anything.
    pub fn open_read_only(path: impl AsRef<Path>, tz: Tz) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|err| ArchiveError::store(&path, err))?;
        Ok(Self {
            conn,
            path,
            tz,
            in_tx: false,
        })
    }

    pub fn in_memory(tz: Tz) -> Result<Self> {
        let path = PathBuf::from(":memory:");
        let conn = Connection::open_in_memory().map_err(|err| ArchiveError::store(&path, err))?;
        let store = Self {
            conn,
            path,
            tz,
            in_tx: false,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA)
            .map_err(|err| self.fail(err))
    }

    fn fail(&self, err: rusqlite::Error) -> ArchiveError {
        ArchiveError::store(&self.path, err)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    fn format_date(&self, date: &DateTime<Tz>) -> String {
        date.with_timezone(&self.tz)
            .to_rfc3339_opts(SecondsFormat::AutoSi, false)
    }

    fn parse_date(&self, raw: &str, message_id: i64) -> Result<DateTime<Tz>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|date| date.with_timezone(&self.tz))
            .map_err(|err| {
                ArchiveError::InvalidRecord(format!(
                    "message {message_id} in {}: bad date `{raw}`: {err}",
                    self.path.display()
                ))
            })
    }

    fn begin(&mut self) -> Result<()> {
        if !self.in_tx {
            self.conn
                .execute_batch("BEGIN")
                .map_err(|err| self.fail(err))?;
            self.in_tx = true;
        }
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        if self.in_tx {
            self.conn
                .execute_batch("COMMIT")
                .map_err(|err| self.fail(err))?;
            self.in_tx = false;
        }
        Ok(())
    }

    pub fn timeline(&self) -> Result<Vec<Month>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT substr(date, 1, 7) AS ym, COUNT(*) FROM messages GROUP BY ym ORDER BY ym",
            )
            .map_err(|err| self.fail(err))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(|err| self.fail(err))?;

        let mut out = Vec::new();
        for row in rows {
            let (ym, count) = row.map_err(|err| self.fail(err))?;
            let date = NaiveDate::parse_from_str(&format!("{ym}-01"), "%Y-%m-%d").map_err(|_| {
                ArchiveError::InvalidRecord(format!(
                    "unparseable month `{ym}` in {}",
                    self.path.display()
                ))
            })?;
            out.push(Month::new(date, count.max(0) as u64));
        }
        Ok(out)
    }

    pub fn dayline(&self, year: i32, month: u32, per_page: u64) -> Result<Vec<Day>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT substr(date, 1, 10) AS d, COUNT(*) FROM messages
                 WHERE substr(date, 1, 7) = ?1 GROUP BY d ORDER BY d",
            )
            .map_err(|err| self.fail(err))?;
        let rows = stmt
            .query_map(params![month_key(year, month)], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(|err| self.fail(err))?;

        let mut days = Vec::new();
        for row in rows {
            let (slug, count) = row.map_err(|err| self.fail(err))?;
            let date = NaiveDate::parse_from_str(&slug, "%Y-%m-%d").map_err(|_| {
                ArchiveError::InvalidRecord(format!(
                    "unparseable day `{slug}` in {}",
                    self.path.display()
                ))
            })?;
            days.push(Day::new(date, count.max(0) as u64, 1));
        }
        paginate_days(&mut days, per_page);
        Ok(days)
    }

    pub fn message_count(&self, year: i32, month: u32) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM messages WHERE substr(date, 1, 7) = ?1",
                params![month_key(year, month)],
                |row| row.get(0),
            )
            .map_err(|err| self.fail(err))?;
        Ok(count.max(0) as u64)
    }

    pub fn messages_page(
        &self,
        year: i32,
        month: u32,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Message>> {
        let sql = format!(
            "{MESSAGE_SELECT}
             WHERE substr(m.date, 1, 7) = ?1
             ORDER BY julianday(m.date), m.id
             LIMIT ?2 OFFSET ?3"
        );
        self.load_messages(
            &sql,
            params![month_key(year, month), clamp_i64(limit), clamp_i64(offset)],
        )
    }

    pub fn media_messages(&self) -> Result<Vec<Message>> {
        let sql = format!(
            "{MESSAGE_SELECT}
             WHERE m.media_id IS NOT NULL AND md.id IS NOT NULL
             ORDER BY julianday(m.date), m.id"
        );
        self.load_messages(&sql, [])
    }

    fn load_messages<P: Params>(&self, sql: &str, args: P) -> Result<Vec<Message>> {
        let mut stmt = self.conn.prepare(sql).map_err(|err| self.fail(err))?;
        let rows = stmt
            .query_map(args, read_message_row)
            .map_err(|err| self.fail(err))?;

        let mut users: HashMap<i64, Rc<User>> = HashMap::new();
        let mut out = Vec::new();
        for row in rows {
            let row = row.map_err(|err| self.fail(err))?;
            out.push(self.hydrate(row, &mut users)?);
        }
        Ok(out)
    }

    fn hydrate(&self, row: MessageRow, users: &mut HashMap<i64, Rc<User>>) -> Result<Message> {
        let user_id = row.user.as_ref().map(|u| u.id).or(row.user_id).unwrap_or(0);
        let user = match users.get(&user_id) {
            Some(user) => Rc::clone(user),
            None => {
                let mut user = row.user.unwrap_or(User {
                    id: user_id,
                    username: None,
                    first_name: None,
                    last_name: None,
                    tags: Vec::new(),
                    avatar: None,
                });
                user.tags = row
                    .tags_raw
                    .as_deref()
                    .and_then(|raw| serde_json::from_str(raw).ok())
                    .unwrap_or_default();
                let user = Rc::new(user);
                users.insert(user_id, Rc::clone(&user));
                user
            }
        };

        let edit_date = match row.edit_date.as_deref() {
            Some(raw) if !raw.is_empty() => Some(self.parse_date(raw, row.id)?),
            _ => None,
        };

        Ok(Message {
            id: RecordId::Num(row.id),
            kind: row.kind,
            date: self.parse_date(&row.date, row.id)?,
            edit_date,
            content: row.content,
            reply_to: row.reply_to.map(RecordId::Num),
            user,
            media: row.media,
            topic_id: row.topic_id.map(RecordId::Num),
            topic_title: row.topic_title,
        })
    }

    pub fn insert_user(&mut self, user: &User) -> Result<()> {
        let tags = serde_json::to_string(&user.tags)
            .map_err(|err| ArchiveError::InvalidRecord(format!("user {}: {err}", user.id)))?;
        self.begin()?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO users (id, username, first_name, last_name, tags, avatar)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    user.id,
                    user.username,
                    user.first_name,
                    user.last_name,
                    tags,
                    user.avatar
                ],
            )
            .map_err(|err| self.fail(err))?;
        Ok(())
    }

    pub fn insert_media(&mut self, media: &Media) -> Result<()> {
        self.begin()?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO media (id, type, url, title, description, thumb)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    media.id,
                    media.kind,
                    media.url,
                    media.title,
                    media.description,
                    media.thumb
                ],
            )
            .map_err(|err| self.fail(err))?;
        Ok(())
    }

    pub fn insert_topic(&mut self, topic: &Topic) -> Result<()> {
        self.begin()?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO topics (id, title) VALUES (?1, ?2)",
                params![topic.id, topic.title],
            )
            .map_err(|err| self.fail(err))?;
        Ok(())
    }

    pub fn insert_message(&mut self, message: &Message) -> Result<()> {
        let id = numeric(&message.id, "message id")?;
        let reply_to = message
            .reply_to
            .as_ref()
            .map(|r| numeric(r, "reply_to"))
            .transpose()?;
        let topic_id = message
            .topic_id
            .as_ref()
            .map(|t| numeric(t, "topic id"))
            .transpose()?;
        let date = self.format_date(&message.date);
        let edit_date = message.edit_date.as_ref().map(|d| self.format_date(d));

        self.begin()?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO messages
                 (id, type, date, edit_date, content, reply_to, user_id, media_id, topic_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id,
                    message.kind,
                    date,
                    edit_date,
                    message.content,
                    reply_to,
                    message.user.id,
                    message.media.as_ref().map(|m| m.id),
                    topic_id
                ],
            )
            .map_err(|err| self.fail(err))?;
        Ok(())
    }

    pub fn update_media_paths(&mut self, media_id: i64, url: &str, thumb: Option<&str>) -> Result<()> {
        self.begin()?;
        self.conn
            .execute(
                "UPDATE media SET url = ?1, thumb = ?2 WHERE id = ?3",
                params![url, thumb, media_id],
            )
            .map_err(|err| self.fail(err))?;
        Ok(())
    }
}

fn numeric(id: &RecordId, what: &str) -> Result<i64> {
    id.as_num().ok_or_else(|| {
        ArchiveError::InvalidRecord(format!("{what} `{id}` is not a store-local numeric id"))
    })
}

impl MediaPathStore for Store {
    fn media_messages(&self) -> Result<Vec<Message>> {
        Store::media_messages(self)
    }

    fn update_media_paths(&mut self, media_id: i64, url: &str, thumb: Option<&str>) -> Result<()> {
        Store::update_media_paths(self, media_id, url, thumb)
    }

    fn commit(&mut self) -> Result<()> {
        Store::commit(self)
    }
}
