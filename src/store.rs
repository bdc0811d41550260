use crate::{
    booking::{Booking, BookingStatus, PropertyBlock},
    chat::{Conversation, Message},
    entity::{NewProfile, Profile, Role},
    listing::{NewProperty, Property, PropertyFilter, PropertyStatus},
    review::{Review, ReviewKind},
};
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use sqlx::{sqlite::SqliteConnectOptions, sqlite::SqliteRow, ConnectOptions, Row, SqlitePool};
use std::{path::Path, str::FromStr};
use uuid::Uuid;

/// The one handle to the relational store. Constructed once at startup and
/// passed down explicitly; closed at shutdown.
#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Create a new Store instance.
    /// This will automatically create the database file if it doesn't exist.
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }

        let db_url = format!("sqlite://{}", db_path.to_string_lossy());

        let options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .log_statements(tracing::log::LevelFilter::Trace);

        let pool = SqlitePool::connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        Ok(Self { pool })
    }

    /// A private in-memory database, one connection so every query sees the
    /// same data.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL UNIQUE,
                full_name TEXT NOT NULL,
                email TEXT NOT NULL,
                whatsapp_number TEXT NOT NULL,
                avatar_url TEXT,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_roles (
                user_id TEXT NOT NULL,
                role TEXT NOT NULL,
                created_at DATETIME NOT NULL,
                UNIQUE(user_id, role)
            );

            CREATE TABLE IF NOT EXISTS properties (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                address TEXT NOT NULL,
                city TEXT NOT NULL,
                country TEXT NOT NULL,
                postal_code TEXT,
                price_per_night REAL NOT NULL,
                max_guests INTEGER NOT NULL,
                bedrooms INTEGER NOT NULL DEFAULT 0,
                bathrooms INTEGER NOT NULL DEFAULT 0,
                amenities TEXT NOT NULL DEFAULT '[]',
                images TEXT NOT NULL DEFAULT '[]',
                is_available INTEGER NOT NULL DEFAULT 1,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            );

            CREATE TABLE IF NOT EXISTS bookings (
                id TEXT PRIMARY KEY,
                property_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                check_in_date DATE NOT NULL,
                check_out_date DATE NOT NULL,
                guest_count INTEGER NOT NULL,
                total_nights INTEGER NOT NULL,
                total_price REAL NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_bookings_property_status
                ON bookings(property_id, status);

            CREATE TABLE IF NOT EXISTS property_blocks (
                id TEXT PRIMARY KEY,
                property_id TEXT NOT NULL,
                blocked_date DATE NOT NULL,
                reason TEXT,
                created_by TEXT NOT NULL,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL,
                UNIQUE(property_id, blocked_date)
            );

            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                guest_id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                property_id TEXT,
                booking_id TEXT,
                last_message_at DATETIME NOT NULL,
                UNIQUE(property_id, guest_id)
            );

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                sender_id TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at DATETIME NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_conversation_created
                ON messages(conversation_id, created_at);

            CREATE TABLE IF NOT EXISTS reviews (
                id TEXT PRIMARY KEY,
                booking_id TEXT NOT NULL,
                property_id TEXT NOT NULL,
                reviewer_id TEXT NOT NULL,
                reviewed_id TEXT NOT NULL,
                rating INTEGER NOT NULL,
                comment TEXT,
                kind TEXT NOT NULL,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL,
                UNIQUE(booking_id, kind)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to initialize database schema")?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Profiles & roles
    // ------------------------------------------------------------------

    pub async fn upsert_profile(&self, user_id: &str, profile: &NewProfile) -> Result<Profile> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO profiles (id, user_id, full_name, email, whatsapp_number, avatar_url, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                full_name = excluded.full_name,
                email = excluded.email,
                whatsapp_number = excluded.whatsapp_number,
                avatar_url = excluded.avatar_url,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(&profile.full_name)
        .bind(&profile.email)
        .bind(&profile.whatsapp_number)
        .bind(&profile.avatar_url)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to upsert profile")?;

        self.profile(user_id)
            .await?
            .context("Profile vanished after upsert")
    }

    pub async fn profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let row = sqlx::query("SELECT * FROM profiles WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch profile")?;

        row.map(|r| profile_from_row(&r)).transpose()
    }

    pub async fn grant_role(&self, user_id: &str, role: Role) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id, role) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(role.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to grant role")?;

        Ok(())
    }

    pub async fn has_role(&self, user_id: &str, role: Role) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM user_roles WHERE user_id = ? AND role = ?")
            .bind(user_id)
            .bind(role.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to check role")?;

        Ok(row.is_some())
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    pub async fn insert_property(&self, owner_id: &str, new: &NewProperty) -> Result<Property> {
        let now = Utc::now();
        let property = Property {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            title: new.title.clone(),
            description: new.description.clone(),
            address: new.address.clone(),
            city: new.city.clone(),
            country: new.country.clone(),
            postal_code: new.postal_code.clone(),
            price_per_night: new.price_per_night,
            max_guests: new.max_guests,
            bedrooms: new.bedrooms,
            bathrooms: new.bathrooms,
            amenities: new.amenities.clone(),
            images: new.images.clone(),
            is_available: true,
            status: PropertyStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO properties
                (id, owner_id, title, description, address, city, country, postal_code,
                 price_per_night, max_guests, bedrooms, bathrooms, amenities, images,
                 is_available, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&property.id)
        .bind(&property.owner_id)
        .bind(&property.title)
        .bind(&property.description)
        .bind(&property.address)
        .bind(&property.city)
        .bind(&property.country)
        .bind(&property.postal_code)
        .bind(property.price_per_night)
        .bind(property.max_guests)
        .bind(property.bedrooms)
        .bind(property.bathrooms)
        .bind(serde_json::to_string(&property.amenities)?)
        .bind(serde_json::to_string(&property.images)?)
        .bind(property.is_available)
        .bind(property.status.to_string())
        .bind(property.created_at)
        .bind(property.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert property")?;

        Ok(property)
    }

    pub async fn property(&self, id: &str) -> Result<Option<Property>> {
        let row = sqlx::query("SELECT * FROM properties WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch property")?;

        row.map(|r| property_from_row(&r)).transpose()
    }

    /// Approved, available listings matching the search bar filters.
    pub async fn search_properties(&self, filter: &PropertyFilter) -> Result<Vec<Property>> {
        let destination = filter
            .destination
            .as_ref()
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty());

        let rows = sqlx::query(
            r#"
            SELECT * FROM properties
            WHERE status = 'approved' AND is_available = 1
              AND (?1 IS NULL
                   OR lower(city) LIKE '%' || ?1 || '%'
                   OR lower(country) LIKE '%' || ?1 || '%'
                   OR lower(address) LIKE '%' || ?1 || '%'
                   OR lower(title) LIKE '%' || ?1 || '%')
              AND (?2 IS NULL OR max_guests >= ?2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(destination)
        .bind(filter.guests)
        .fetch_all(&self.pool)
        .await
        .context("Failed to search properties")?;

        rows.iter().map(property_from_row).collect()
    }

    pub async fn properties_for_owner(&self, owner_id: &str) -> Result<Vec<Property>> {
        let rows =
            sqlx::query("SELECT * FROM properties WHERE owner_id = ? ORDER BY created_at DESC")
                .bind(owner_id)
                .fetch_all(&self.pool)
                .await
                .context("Failed to fetch owner properties")?;

        rows.iter().map(property_from_row).collect()
    }

    pub async fn set_property_status(&self, id: &str, status: PropertyStatus) -> Result<u64> {
        let res = sqlx::query("UPDATE properties SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update property status")?;

        Ok(res.rows_affected())
    }

    pub async fn set_property_availability(&self, id: &str, is_available: bool) -> Result<u64> {
        let res = sqlx::query("UPDATE properties SET is_available = ?, updated_at = ? WHERE id = ?")
            .bind(is_available)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update property availability")?;

        Ok(res.rows_affected())
    }

    // ------------------------------------------------------------------
    // Bookings & blocks
    // ------------------------------------------------------------------

    /// Check-in/check-out pairs of every confirmed booking for a property.
    /// This is the occupancy source, so only `confirmed` rows count.
    pub async fn confirmed_booking_ranges(
        &self,
        property_id: &str,
    ) -> Result<Vec<(NaiveDate, NaiveDate)>> {
        let rows = sqlx::query(
            r#"
            SELECT check_in_date, check_out_date
            FROM bookings
            WHERE property_id = ? AND status = 'confirmed'
            "#,
        )
        .bind(property_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch confirmed bookings")?;

        rows.iter()
            .map(|row| {
                Ok((
                    row.try_get::<NaiveDate, _>("check_in_date")?,
                    row.try_get::<NaiveDate, _>("check_out_date")?,
                ))
            })
            .collect()
    }

    pub async fn block_dates(&self, property_id: &str) -> Result<Vec<NaiveDate>> {
        let rows = sqlx::query("SELECT blocked_date FROM property_blocks WHERE property_id = ?")
            .bind(property_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch property blocks")?;

        rows.iter()
            .map(|row| Ok(row.try_get::<NaiveDate, _>("blocked_date")?))
            .collect()
    }

    pub async fn blocks_for_property(&self, property_id: &str) -> Result<Vec<PropertyBlock>> {
        let rows = sqlx::query(
            "SELECT * FROM property_blocks WHERE property_id = ? ORDER BY blocked_date",
        )
        .bind(property_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch property blocks")?;

        rows.iter().map(block_from_row).collect()
    }

    /// Returns false when the day was already blocked.
    pub async fn insert_block(
        &self,
        property_id: &str,
        blocked_date: NaiveDate,
        reason: Option<&str>,
        created_by: &str,
    ) -> Result<bool> {
        let now = Utc::now();
        let res = sqlx::query(
            r#"
            INSERT INTO property_blocks
                (id, property_id, blocked_date, reason, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(property_id, blocked_date) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(property_id)
        .bind(blocked_date)
        .bind(reason)
        .bind(created_by)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to insert property block")?;

        Ok(res.rows_affected() > 0)
    }

    pub async fn delete_block(&self, property_id: &str, blocked_date: NaiveDate) -> Result<bool> {
        let res =
            sqlx::query("DELETE FROM property_blocks WHERE property_id = ? AND blocked_date = ?")
                .bind(property_id)
                .bind(blocked_date)
                .execute(&self.pool)
                .await
                .context("Failed to delete property block")?;

        Ok(res.rows_affected() > 0)
    }

    pub async fn insert_booking(&self, booking: &Booking) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bookings
                (id, property_id, user_id, check_in_date, check_out_date, guest_count,
                 total_nights, total_price, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&booking.id)
        .bind(&booking.property_id)
        .bind(&booking.user_id)
        .bind(booking.check_in_date)
        .bind(booking.check_out_date)
        .bind(booking.guest_count)
        .bind(booking.total_nights)
        .bind(booking.total_price)
        .bind(booking.status.to_string())
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert booking")?;

        Ok(())
    }

    pub async fn booking(&self, id: &str) -> Result<Option<Booking>> {
        let row = sqlx::query("SELECT * FROM bookings WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch booking")?;

        row.map(|r| booking_from_row(&r)).transpose()
    }

    pub async fn bookings_for_user(&self, user_id: &str) -> Result<Vec<Booking>> {
        let rows = sqlx::query("SELECT * FROM bookings WHERE user_id = ? ORDER BY created_at DESC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch user bookings")?;

        rows.iter().map(booking_from_row).collect()
    }

    pub async fn bookings_for_property(&self, property_id: &str) -> Result<Vec<Booking>> {
        let rows =
            sqlx::query("SELECT * FROM bookings WHERE property_id = ? ORDER BY created_at DESC")
                .bind(property_id)
                .fetch_all(&self.pool)
                .await
                .context("Failed to fetch property bookings")?;

        rows.iter().map(booking_from_row).collect()
    }

    pub async fn set_booking_status(&self, id: &str, status: BookingStatus) -> Result<u64> {
        let res = sqlx::query("UPDATE bookings SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update booking status")?;

        Ok(res.rows_affected())
    }

    // ------------------------------------------------------------------
    // Conversations & messages
    // ------------------------------------------------------------------

    /// Read-or-insert the guest's conversation for a property. The unique
    /// (property_id, guest_id) row makes repeat calls converge on one id.
    /// The bool is true when this call created the row.
    pub async fn get_or_create_conversation(
        &self,
        property_id: &str,
        guest_id: &str,
        owner_id: &str,
    ) -> Result<(Conversation, bool)> {
        let res = sqlx::query(
            r#"
            INSERT INTO conversations (id, guest_id, owner_id, property_id, booking_id, last_message_at)
            VALUES (?, ?, ?, ?, NULL, ?)
            ON CONFLICT(property_id, guest_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(guest_id)
        .bind(owner_id)
        .bind(property_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to create conversation")?;

        let created = res.rows_affected() > 0;

        let row =
            sqlx::query("SELECT * FROM conversations WHERE property_id = ? AND guest_id = ?")
                .bind(property_id)
                .bind(guest_id)
                .fetch_one(&self.pool)
                .await
                .context("Failed to fetch conversation after upsert")?;

        Ok((conversation_from_row(&row)?, created))
    }

    pub async fn conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch conversation")?;

        row.map(|r| conversation_from_row(&r)).transpose()
    }

    pub async fn conversations_for(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM conversations
            WHERE guest_id = ?1 OR owner_id = ?1
            ORDER BY last_message_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch conversations")?;

        rows.iter().map(conversation_from_row).collect()
    }

    /// Full history for a conversation, oldest to newest.
    pub async fn messages_for(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, sender_id, body, created_at
            FROM messages
            WHERE conversation_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch messages")?;

        rows.iter().map(message_from_row).collect()
    }

    /// Insert a message and return the authoritative row. Also moves the
    /// parent conversation's `last_message_at` forward.
    pub async fn insert_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        body: &str,
    ) -> Result<Message> {
        let message = Message {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, body, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.id)
        .bind(&message.conversation_id)
        .bind(&message.sender_id)
        .bind(&message.body)
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert message")?;

        sqlx::query("UPDATE conversations SET last_message_at = ? WHERE id = ?")
            .bind(message.created_at)
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .context("Failed to touch conversation")?;

        Ok(message)
    }

    // ------------------------------------------------------------------
    // Reviews
    // ------------------------------------------------------------------

    pub async fn review_exists(&self, booking_id: &str, kind: ReviewKind) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM reviews WHERE booking_id = ? AND kind = ?")
            .bind(booking_id)
            .bind(kind.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to check review")?;

        Ok(row.is_some())
    }

    pub async fn insert_review(&self, review: &Review) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reviews
                (id, booking_id, property_id, reviewer_id, reviewed_id, rating, comment,
                 kind, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&review.id)
        .bind(&review.booking_id)
        .bind(&review.property_id)
        .bind(&review.reviewer_id)
        .bind(&review.reviewed_id)
        .bind(review.rating)
        .bind(&review.comment)
        .bind(review.kind.to_string())
        .bind(review.created_at)
        .bind(review.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert review")?;

        Ok(())
    }

    pub async fn reviews_for_property(&self, property_id: &str) -> Result<Vec<Review>> {
        let rows =
            sqlx::query("SELECT * FROM reviews WHERE property_id = ? ORDER BY created_at DESC")
                .bind(property_id)
                .fetch_all(&self.pool)
                .await
                .context("Failed to fetch property reviews")?;

        rows.iter().map(review_from_row).collect()
    }

    pub async fn reviews_for_booking(&self, booking_id: &str) -> Result<Vec<Review>> {
        let rows = sqlx::query("SELECT * FROM reviews WHERE booking_id = ? ORDER BY created_at")
            .bind(booking_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch booking reviews")?;

        rows.iter().map(review_from_row).collect()
    }
}

// ----------------------------------------------------------------------
// Row decoding. Rows coming back from the store are parsed into typed
// records here, at the boundary, rather than trusted implicitly.
// ----------------------------------------------------------------------

fn profile_from_row(row: &SqliteRow) -> Result<Profile> {
    Ok(Profile {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        full_name: row.try_get("full_name")?,
        email: row.try_get("email")?,
        whatsapp_number: row.try_get("whatsapp_number")?,
        avatar_url: row.try_get("avatar_url")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn property_from_row(row: &SqliteRow) -> Result<Property> {
    let amenities: String = row.try_get("amenities")?;
    let images: String = row.try_get("images")?;
    let status: String = row.try_get("status")?;

    Ok(Property {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        address: row.try_get("address")?,
        city: row.try_get("city")?,
        country: row.try_get("country")?,
        postal_code: row.try_get("postal_code")?,
        price_per_night: row.try_get("price_per_night")?,
        max_guests: row.try_get("max_guests")?,
        bedrooms: row.try_get("bedrooms")?,
        bathrooms: row.try_get("bathrooms")?,
        amenities: serde_json::from_str(&amenities).context("Bad amenities payload")?,
        images: serde_json::from_str(&images).context("Bad images payload")?,
        is_available: row.try_get("is_available")?,
        status: status.parse()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn booking_from_row(row: &SqliteRow) -> Result<Booking> {
    let status: String = row.try_get("status")?;

    Ok(Booking {
        id: row.try_get("id")?,
        property_id: row.try_get("property_id")?,
        user_id: row.try_get("user_id")?,
        check_in_date: row.try_get("check_in_date")?,
        check_out_date: row.try_get("check_out_date")?,
        guest_count: row.try_get("guest_count")?,
        total_nights: row.try_get("total_nights")?,
        total_price: row.try_get("total_price")?,
        status: status.parse()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn block_from_row(row: &SqliteRow) -> Result<PropertyBlock> {
    Ok(PropertyBlock {
        id: row.try_get("id")?,
        property_id: row.try_get("property_id")?,
        blocked_date: row.try_get("blocked_date")?,
        reason: row.try_get("reason")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn conversation_from_row(row: &SqliteRow) -> Result<Conversation> {
    Ok(Conversation {
        id: row.try_get("id")?,
        guest_id: row.try_get("guest_id")?,
        owner_id: row.try_get("owner_id")?,
        property_id: row.try_get("property_id")?,
        booking_id: row.try_get("booking_id")?,
        last_message_at: row.try_get("last_message_at")?,
    })
}

fn message_from_row(row: &SqliteRow) -> Result<Message> {
    Ok(Message {
        id: row.try_get("id")?,
        conversation_id: row.try_get("conversation_id")?,
        sender_id: row.try_get("sender_id")?,
        body: row.try_get("body")?,
        created_at: row.try_get("created_at")?,
    })
}

fn review_from_row(row: &SqliteRow) -> Result<Review> {
    let kind: String = row.try_get("kind")?;

    Ok(Review {
        id: row.try_get("id")?,
        booking_id: row.try_get("booking_id")?,
        property_id: row.try_get("property_id")?,
        reviewer_id: row.try_get("reviewer_id")?,
        reviewed_id: row.try_get("reviewed_id")?,
        rating: row.try_get("rating")?,
        comment: row.try_get("comment")?,
        kind: kind.parse()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
