use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Who is reviewing whom. Guests rate the property and its host after
/// checkout; the host rates the guest. One review per (booking, kind).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewKind {
    Property,
    Host,
    Guest,
}

impl fmt::Display for ReviewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewKind::Property => write!(f, "property"),
            ReviewKind::Host => write!(f, "host"),
            ReviewKind::Guest => write!(f, "guest"),
        }
    }
}

impl FromStr for ReviewKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "property" => Ok(ReviewKind::Property),
            "host" => Ok(ReviewKind::Host),
            "guest" => Ok(ReviewKind::Guest),
            other => Err(anyhow::anyhow!("unknown review kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub booking_id: String,
    pub property_id: String,
    pub reviewer_id: String,
    pub reviewed_id: String,
    pub rating: i64,
    pub comment: Option<String>,
    pub kind: ReviewKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewReview {
    pub booking_id: String,
    pub rating: i64,
    pub comment: Option<String>,
    pub kind: ReviewKind,
}
