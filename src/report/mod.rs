pub mod render;

use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_SOURCE_TITLE: &str = "微博来源";
pub const EMPTY_CONTENT_PLACEHOLDER: &str = "未能生成内容。";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLink {
    pub title: String,
    pub uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub content: String,
    pub sources: Vec<SourceLink>,
    pub generated_at: DateTime<Utc>,
}

impl Report {
    pub fn new(content: String, sources: Vec<SourceLink>, generated_at: DateTime<Utc>) -> Self {
        let content = if content.trim().is_empty() {
            EMPTY_CONTENT_PLACEHOLDER.to_string()
        } else {
            content
        };

        Self {
            content,
            sources: dedupe_sources(sources),
            generated_at,
        }
    }

    /// Calendar day the report was generated on, in the local time zone.
    pub fn local_date(&self) -> NaiveDate {
        self.date_in(&Local)
    }

    pub fn date_in<Tz: TimeZone>(&self, tz: &Tz) -> NaiveDate {
        self.generated_at.with_timezone(tz).date_naive()
    }
}

/// Collapses sources sharing a URI. The entry keeps the position of the first
/// occurrence and the title of the last one.
pub fn dedupe_sources(sources: Vec<SourceLink>) -> Vec<SourceLink> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<SourceLink> = Vec::with_capacity(sources.len());

    for source in sources {
        match positions.get(&source.uri) {
            Some(&index) => unique[index].title = source.title,
            None => {
                positions.insert(source.uri.clone(), unique.len());
                unique.push(source);
            }
        }
    }

    unique
}

/// `2026年10月17日星期六`
pub fn chinese_long_date(date: NaiveDate) -> String {
    let weekday = match date.weekday() {
        Weekday::Mon => "星期一",
        Weekday::Tue => "星期二",
        Weekday::Wed => "星期三",
        Weekday::Thu => "星期四",
        Weekday::Fri => "星期五",
        Weekday::Sat => "星期六",
        Weekday::Sun => "星期日",
    };

    format!(
        "{}年{}月{}日{}",
        date.year(),
        date.month(),
        date.day(),
        weekday
    )
}
