use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Technology,
    Finance,
    Politics,
    Science,
    Health,
    Sports,
    Entertainment,
    Crypto,
    Startups,
    Environment,
}

impl Topic {
    pub const ALL: [Topic; 10] = [
        Self::Technology,
        Self::Finance,
        Self::Politics,
        Self::Science,
        Self::Health,
        Self::Sports,
        Self::Entertainment,
        Self::Crypto,
        Self::Startups,
        Self::Environment,
    ];

    /// Label used in prompts and on the rendered card.
    pub fn label(self) -> &'static str {
        match self {
            Self::Technology => "科技与AI",
            Self::Finance => "金融与市场",
            Self::Politics => "国际政治",
            Self::Science => "科学与航天",
            Self::Health => "健康与养生",
            Self::Sports => "体育",
            Self::Entertainment => "娱乐",
            Self::Crypto => "加密货币",
            Self::Startups => "创业创投",
            Self::Environment => "环境与气候",
        }
    }

    pub fn english_name(self) -> &'static str {
        match self {
            Self::Technology => "Technology & AI",
            Self::Finance => "Finance & Markets",
            Self::Politics => "World Politics",
            Self::Science => "Science & Space",
            Self::Health => "Health & Wellness",
            Self::Sports => "Sports",
            Self::Entertainment => "Entertainment",
            Self::Crypto => "Crypto",
            Self::Startups => "Startups & VC",
            Self::Environment => "Environment & Climate",
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            Self::Technology => "technology",
            Self::Finance => "finance",
            Self::Politics => "politics",
            Self::Science => "science",
            Self::Health => "health",
            Self::Sports => "sports",
            Self::Entertainment => "entertainment",
            Self::Crypto => "crypto",
            Self::Startups => "startups",
            Self::Environment => "environment",
        }
    }
}

impl FromStr for Topic {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let normalized = raw.trim();

        let found = Self::ALL.into_iter().find(|topic| {
            topic.slug().eq_ignore_ascii_case(normalized)
                || topic.english_name().eq_ignore_ascii_case(normalized)
                || topic.label() == normalized
        });

        match found {
            Some(topic) => Ok(topic),
            None => {
                let supported = Self::ALL
                    .iter()
                    .map(|topic| topic.slug())
                    .collect::<Vec<_>>()
                    .join(", ");
                bail!("Unknown topic: {raw}. Supported topics: {supported}")
            }
        }
    }
}

/// Topics chosen for the next report. Unique by value, kept in the order they
/// were first added so the prompt lists them the way the user picked them.
/// Equality ignores that order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Selection {
    topics: Vec<Topic>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the topic if absent, removes it if present. Returns whether the
    /// topic is selected afterwards.
    pub fn toggle(&mut self, topic: Topic) -> bool {
        match self.topics.iter().position(|selected| *selected == topic) {
            Some(index) => {
                self.topics.remove(index);
                false
            }
            None => {
                self.topics.push(topic);
                true
            }
        }
    }

    pub fn contains(&self, topic: Topic) -> bool {
        self.topics.contains(&topic)
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }
}

impl PartialEq for Selection {
    fn eq(&self, other: &Self) -> bool {
        self.topics.len() == other.topics.len()
            && self.topics.iter().all(|topic| other.contains(*topic))
    }
}

impl Eq for Selection {}

impl FromIterator<Topic> for Selection {
    fn from_iter<I: IntoIterator<Item = Topic>>(iter: I) -> Self {
        let mut selection = Self::new();
        for topic in iter {
            if !selection.contains(topic) {
                selection.toggle(topic);
            }
        }
        selection
    }
}
