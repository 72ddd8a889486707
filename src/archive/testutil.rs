use crate::archive::model::{Media, Message, RecordId, User};
use chrono::{DateTime, TimeZone};
use chrono_tz::Tz;
use std::rc::Rc;

pub fn user(id: i64) -> Rc<User> {
    Rc::new(User {
        id,
        username: Some("u".into()),
        first_name: Some("First".into()),
        last_name: None,
        tags: Vec::new(),
        avatar: None,
    })
}

pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Tz> {
    Tz::UTC
        .with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .expect("valid date")
}

pub fn message(id: i64, date: DateTime<Tz>) -> Message {
    Message {
        id: RecordId::Num(id),
        kind: "message".into(),
        date,
        edit_date: None,
        content: Some(format!("message {id}")),
        reply_to: None,
        user: user(1),
        media: None,
        topic_id: None,
        topic_title: None,
    }
}

pub fn with_media(mut m: Message, media_id: i64, url: &str, thumb: Option<&str>) -> Message {
    m.media = Some(Media {
        id: media_id,
        kind: "photo".into(),
        url: Some(url.into()),
        title: Some(format!("media {media_id}")),
        description: None,
        thumb: thumb.map(str::to_string),
    });
    m
}
