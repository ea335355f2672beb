use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority '{}'", other)),
        }
    }
}

/// A stored item, owned by exactly one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
}

/// Validated payload for a new item; the owner comes from the session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewItem {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
}

impl NewItem {
    pub fn into_item(self, user_id: Uuid) -> Item {
        Item {
            id: Uuid::new_v4(),
            user_id,
            title: self.title,
            description: self.description,
            priority: self.priority,
            created_at: Utc::now(),
        }
    }
}

/// Inclusive row window `[from, to]`, zero-based
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    pub from: u64,
    pub to: u64,
}

impl RowRange {
    /// Window for `limit` rows starting at `offset`. `None` when `limit` is
    /// zero or the last row would not be addressable.
    pub fn page(limit: u64, offset: u64) -> Option<Self> {
        let last = limit.checked_sub(1)?;
        Some(Self {
            from: offset,
            to: offset.checked_add(last)?,
        })
    }

    pub fn len(&self) -> u64 {
        self.to - self.from + 1
    }

    pub fn offset(&self) -> u64 {
        self.from
    }

    /// `Range` header value understood by the hosted rest dialect
    pub fn header_value(&self) -> String {
        format!("{}-{}", self.from, self.to)
    }
}
