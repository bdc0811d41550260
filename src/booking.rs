use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reservation lifecycle. Only confirmed bookings occupy calendar dates;
/// a pending request does not reserve anything until the owner or an admin
/// confirms it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingStatus::Pending => write!(f, "pending"),
            BookingStatus::Confirmed => write!(f, "confirmed"),
            BookingStatus::Cancelled => write!(f, "cancelled"),
            BookingStatus::Completed => write!(f, "completed"),
        }
    }
}

impl FromStr for BookingStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "completed" => Ok(BookingStatus::Completed),
            other => Err(anyhow::anyhow!("unknown booking status: {other}")),
        }
    }
}

/// A stay over the half-open range `[check_in_date, check_out_date)`.
/// The checkout day itself is free for the next guest to check in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub property_id: String,
    pub user_id: String,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub guest_count: i64,
    pub total_nights: i64,
    pub total_price: f64,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Guest-submitted reservation request. Dates stay optional here so the
/// service can report "pick your dates" instead of failing to parse.
#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub property_id: String,
    pub check_in_date: Option<NaiveDate>,
    pub check_out_date: Option<NaiveDate>,
    pub guest_count: i64,
}

/// A single day the owner has taken off the calendar by hand,
/// independent of any booking. One row per (property, date).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyBlock {
    pub id: String,
    pub property_id: String,
    pub blocked_date: NaiveDate,
    pub reason: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewBlock {
    pub blocked_date: NaiveDate,
    pub reason: Option<String>,
}
