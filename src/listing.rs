use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Moderation state of a listing. Only approved listings show up in search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyStatus {
    Pending,
    Approved,
    Denied,
}

impl fmt::Display for PropertyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyStatus::Pending => write!(f, "pending"),
            PropertyStatus::Approved => write!(f, "approved"),
            PropertyStatus::Denied => write!(f, "denied"),
        }
    }
}

impl FromStr for PropertyStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "pending" => Ok(PropertyStatus::Pending),
            "approved" => Ok(PropertyStatus::Approved),
            "denied" => Ok(PropertyStatus::Denied),
            other => Err(anyhow::anyhow!("unknown property status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: String,
    pub address: String,
    pub city: String,
    pub country: String,
    pub postal_code: Option<String>,
    pub price_per_night: f64,
    pub max_guests: i64,
    pub bedrooms: i64,
    pub bathrooms: i64,
    pub amenities: Vec<String>,
    pub images: Vec<String>,
    pub is_available: bool,
    pub status: PropertyStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Owner-submitted listing data. New listings always start out pending
/// until an admin approves them.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProperty {
    pub title: String,
    pub description: String,
    pub address: String,
    pub city: String,
    pub country: String,
    pub postal_code: Option<String>,
    pub price_per_night: f64,
    pub max_guests: i64,
    #[serde(default)]
    pub bedrooms: i64,
    #[serde(default)]
    pub bathrooms: i64,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

/// Search bar filters. The destination matches city, country, address or
/// title, case-insensitively.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PropertyFilter {
    pub destination: Option<String>,
    pub guests: Option<i64>,
}
