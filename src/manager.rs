use crate::{
    availability,
    booking::{Booking, BookingRequest, BookingStatus, NewBlock, PropertyBlock},
    bus::{Event, EventBus},
    chat::{Conversation, Message},
    entity::{NewProfile, Profile, Role},
    error::{Error, Result},
    listing::{NewProperty, Property, PropertyFilter, PropertyStatus},
    review::{NewReview, Review, ReviewKind},
    store::Store,
};
use chrono::{NaiveDate, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

/// The marketplace service. Owns the injected store handle and the event
/// bus; every mutation goes through here so the matching change event is
/// published right after the write lands.
pub struct Marketplace {
    store: Arc<Store>,
    bus: Arc<EventBus>,
}

impl Marketplace {
    pub fn new(store: Arc<Store>, bus: Arc<EventBus>) -> Self {
        Self { store, bus }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    async fn is_admin(&self, user_id: &str) -> Result<bool> {
        Ok(self.store.has_role(user_id, Role::Admin).await?)
    }

    // ------------------------------------------------------------------
    // Profiles & roles
    // ------------------------------------------------------------------

    pub async fn register_profile(&self, user_id: &str, profile: NewProfile) -> Result<Profile> {
        Ok(self.store.upsert_profile(user_id, &profile).await?)
    }

    pub async fn grant_role(&self, actor: &str, user_id: &str, role: Role) -> Result<()> {
        if !self.is_admin(actor).await? {
            return Err(Error::auth("only admins can grant roles"));
        }
        Ok(self.store.grant_role(user_id, role).await?)
    }

    // ------------------------------------------------------------------
    // Listings
    // ------------------------------------------------------------------

    pub async fn create_property(&self, owner_id: &str, new: NewProperty) -> Result<Property> {
        if new.title.trim().is_empty() {
            return Err(Error::validation("listing needs a title"));
        }
        if new.price_per_night <= 0.0 {
            return Err(Error::validation("nightly price must be positive"));
        }
        if new.max_guests < 1 {
            return Err(Error::validation("listing must sleep at least one guest"));
        }

        let property = self.store.insert_property(owner_id, &new).await?;
        info!("Listing {} created by {}, pending approval", property.id, owner_id);
        self.bus.publish(Event::PropertyChanged {
            property_id: property.id.clone(),
        });
        Ok(property)
    }

    pub async fn property(&self, id: &str) -> Result<Property> {
        self.store
            .property(id)
            .await?
            .ok_or_else(|| Error::not_found("property"))
    }

    pub async fn search_properties(&self, filter: &PropertyFilter) -> Result<Vec<Property>> {
        Ok(self.store.search_properties(filter).await?)
    }

    pub async fn properties_for_owner(&self, owner_id: &str) -> Result<Vec<Property>> {
        Ok(self.store.properties_for_owner(owner_id).await?)
    }

    /// Admin approval workflow: a listing stays invisible to search until
    /// an admin approves it.
    pub async fn set_property_status(
        &self,
        actor: &str,
        property_id: &str,
        status: PropertyStatus,
    ) -> Result<()> {
        if !self.is_admin(actor).await? {
            return Err(Error::auth("only admins can moderate listings"));
        }
        if self.store.set_property_status(property_id, status).await? == 0 {
            return Err(Error::not_found("property"));
        }
        info!("Listing {} moderated to {} by {}", property_id, status, actor);
        self.bus.publish(Event::PropertyChanged {
            property_id: property_id.to_string(),
        });
        Ok(())
    }

    pub async fn set_property_availability(
        &self,
        actor: &str,
        property_id: &str,
        is_available: bool,
    ) -> Result<()> {
        let property = self.property(property_id).await?;
        if property.owner_id != actor && !self.is_admin(actor).await? {
            return Err(Error::auth("only the owner can change availability"));
        }
        self.store
            .set_property_availability(property_id, is_available)
            .await?;
        self.bus.publish(Event::PropertyChanged {
            property_id: property_id.to_string(),
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Availability & bookings
    // ------------------------------------------------------------------

    /// Fresh occupancy for a listing: confirmed bookings expanded over their
    /// half-open ranges, unioned with owner blocks. Refetched on every call.
    pub async fn occupied_dates_for(&self, property_id: &str) -> Result<HashSet<NaiveDate>> {
        let ranges = self.store.confirmed_booking_ranges(property_id).await?;
        let blocks = self.store.block_dates(property_id).await?;
        Ok(availability::occupied_dates(&ranges, &blocks))
    }

    /// Validate and persist a reservation request. Checks run in order:
    /// identity, date presence, date conflict, capacity. The conflict check
    /// runs against occupancy fetched in this call; there is no store-side
    /// exclusion constraint behind it, so two racing clients can still both
    /// pass on stale data.
    pub async fn create_booking(
        &self,
        actor: Option<&str>,
        request: BookingRequest,
    ) -> Result<Booking> {
        let user_id = actor.ok_or_else(|| Error::auth("sign in to request a booking"))?;

        let (check_in, check_out) = match (request.check_in_date, request.check_out_date) {
            (Some(check_in), Some(check_out)) => (check_in, check_out),
            _ => {
                return Err(Error::validation(
                    "select both check-in and check-out dates",
                ))
            }
        };
        if check_out <= check_in {
            return Err(Error::validation("check-out must be after check-in"));
        }
        if request.guest_count < 1 {
            return Err(Error::validation("at least one guest is required"));
        }

        let property = self.property(&request.property_id).await?;
        if property.status != PropertyStatus::Approved || !property.is_available {
            return Err(Error::validation("this listing is not open for booking"));
        }

        let occupied = self.occupied_dates_for(&property.id).await?;
        if availability::has_date_conflict(check_in, check_out, &occupied) {
            return Err(Error::conflict(
                "the requested dates overlap an existing stay or blocked day",
            ));
        }

        if request.guest_count > property.max_guests {
            return Err(Error::Capacity {
                requested: request.guest_count,
                max: property.max_guests,
            });
        }

        let total_nights = availability::nights_between(check_in, check_out);
        let now = Utc::now();
        let booking = Booking {
            id: Uuid::new_v4().to_string(),
            property_id: property.id.clone(),
            user_id: user_id.to_string(),
            check_in_date: check_in,
            check_out_date: check_out,
            guest_count: request.guest_count,
            total_nights,
            total_price: total_nights as f64 * property.price_per_night,
            status: BookingStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_booking(&booking).await?;

        info!(
            "Booking {} requested for {} ({} to {})",
            booking.id, property.id, check_in, check_out
        );
        self.bus.publish(Event::BookingChanged {
            property_id: property.id,
            booking_id: booking.id.clone(),
        });
        Ok(booking)
    }

    pub async fn bookings_for_user(&self, user_id: &str) -> Result<Vec<Booking>> {
        Ok(self.store.bookings_for_user(user_id).await?)
    }

    /// The owner's view of requests against one of their listings.
    pub async fn bookings_for_property(
        &self,
        actor: &str,
        property_id: &str,
    ) -> Result<Vec<Booking>> {
        let property = self.property(property_id).await?;
        if property.owner_id != actor && !self.is_admin(actor).await? {
            return Err(Error::auth("only the owner can list booking requests"));
        }
        Ok(self.store.bookings_for_property(property_id).await?)
    }

    /// Owner or admin moves a booking through its lifecycle. Confirming is
    /// what starts blocking the calendar; availability readers refetch on
    /// the published event.
    pub async fn set_booking_status(
        &self,
        actor: &str,
        booking_id: &str,
        status: BookingStatus,
    ) -> Result<Booking> {
        let booking = self
            .store
            .booking(booking_id)
            .await?
            .ok_or_else(|| Error::not_found("booking"))?;
        let property = self.property(&booking.property_id).await?;

        if property.owner_id != actor && !self.is_admin(actor).await? {
            return Err(Error::auth("only the owner or an admin can update this booking"));
        }

        self.store.set_booking_status(booking_id, status).await?;
        info!("Booking {} moved to {} by {}", booking_id, status, actor);
        self.bus.publish(Event::BookingChanged {
            property_id: booking.property_id.clone(),
            booking_id: booking_id.to_string(),
        });

        self.store
            .booking(booking_id)
            .await?
            .ok_or_else(|| Error::not_found("booking"))
    }

    /// Once a booking is confirmed the two parties get each other's contact
    /// details.
    pub async fn booking_contact(&self, actor: &str, booking_id: &str) -> Result<Profile> {
        let booking = self
            .store
            .booking(booking_id)
            .await?
            .ok_or_else(|| Error::not_found("booking"))?;
        if booking.status != BookingStatus::Confirmed {
            return Err(Error::validation(
                "contact details are shared once the booking is confirmed",
            ));
        }

        let property = self.property(&booking.property_id).await?;
        let counterpart = if actor == booking.user_id {
            &property.owner_id
        } else if actor == property.owner_id || self.is_admin(actor).await? {
            &booking.user_id
        } else {
            return Err(Error::auth("not a party to this booking"));
        };

        self.store
            .profile(counterpart)
            .await?
            .ok_or_else(|| Error::not_found("profile"))
    }

    // ------------------------------------------------------------------
    // Owner calendar blocks
    // ------------------------------------------------------------------

    pub async fn add_block(
        &self,
        actor: &str,
        property_id: &str,
        block: NewBlock,
    ) -> Result<()> {
        let property = self.property(property_id).await?;
        if property.owner_id != actor && !self.is_admin(actor).await? {
            return Err(Error::auth("only the owner can block dates"));
        }

        let created = self
            .store
            .insert_block(
                property_id,
                block.blocked_date,
                block.reason.as_deref(),
                actor,
            )
            .await?;
        if !created {
            return Err(Error::conflict("that day is already blocked"));
        }
        self.bus.publish(Event::BlockChanged {
            property_id: property_id.to_string(),
        });
        Ok(())
    }

    pub async fn remove_block(
        &self,
        actor: &str,
        property_id: &str,
        blocked_date: NaiveDate,
    ) -> Result<()> {
        let property = self.property(property_id).await?;
        if property.owner_id != actor && !self.is_admin(actor).await? {
            return Err(Error::auth("only the owner can unblock dates"));
        }

        if !self.store.delete_block(property_id, blocked_date).await? {
            return Err(Error::not_found("block"));
        }
        self.bus.publish(Event::BlockChanged {
            property_id: property_id.to_string(),
        });
        Ok(())
    }

    pub async fn blocks_for_property(
        &self,
        actor: &str,
        property_id: &str,
    ) -> Result<Vec<PropertyBlock>> {
        let property = self.property(property_id).await?;
        if property.owner_id != actor && !self.is_admin(actor).await? {
            return Err(Error::auth("only the owner can list blocks"));
        }
        Ok(self.store.blocks_for_property(property_id).await?)
    }

    // ------------------------------------------------------------------
    // Conversations & messages
    // ------------------------------------------------------------------

    /// One conversation per (listing, guest). Repeat calls return the same
    /// row; creation notifies listeners so conversation lists refresh.
    pub async fn get_or_create_conversation_for_property(
        &self,
        guest_id: &str,
        property_id: &str,
    ) -> Result<Conversation> {
        let property = self.property(property_id).await?;
        if property.owner_id == guest_id {
            return Err(Error::validation("you already own this listing"));
        }

        let (conversation, created) = self
            .store
            .get_or_create_conversation(property_id, guest_id, &property.owner_id)
            .await?;
        if created {
            self.bus.publish(Event::ConversationTouched {
                conversation_id: conversation.id.clone(),
                last_message_at: conversation.last_message_at,
            });
        }
        Ok(conversation)
    }

    pub async fn conversations_for(&self, user_id: &str) -> Result<Vec<Conversation>> {
        Ok(self.store.conversations_for(user_id).await?)
    }

    pub async fn messages_for(&self, actor: &str, conversation_id: &str) -> Result<Vec<Message>> {
        let conversation = self
            .store
            .conversation(conversation_id)
            .await?
            .ok_or_else(|| Error::not_found("conversation"))?;
        if !conversation.involves(actor) {
            return Err(Error::auth("not a participant of this conversation"));
        }
        Ok(self.store.messages_for(conversation_id).await?)
    }

    /// Persist a message and fan the inserted row out on the bus. This is
    /// the single write path used both by the HTTP surface and by the
    /// optimistic channel.
    pub async fn post_message(
        &self,
        sender_id: &str,
        conversation_id: &str,
        body: &str,
    ) -> Result<Message> {
        let body = body.trim();
        if body.is_empty() {
            return Err(Error::validation("message body is empty"));
        }

        let conversation = self
            .store
            .conversation(conversation_id)
            .await?
            .ok_or_else(|| Error::not_found("conversation"))?;
        if !conversation.involves(sender_id) {
            return Err(Error::auth("not a participant of this conversation"));
        }

        let message = self
            .store
            .insert_message(conversation_id, sender_id, body)
            .await?;
        self.bus.publish(Event::MessageInserted(message.clone()));
        self.bus.publish(Event::ConversationTouched {
            conversation_id: conversation_id.to_string(),
            last_message_at: message.created_at,
        });
        Ok(message)
    }

    // ------------------------------------------------------------------
    // Reviews
    // ------------------------------------------------------------------

    pub async fn leave_review(&self, actor: &str, new: NewReview) -> Result<Review> {
        if !(1..=5).contains(&new.rating) {
            return Err(Error::validation("rating must be between 1 and 5"));
        }

        let booking = self
            .store
            .booking(&new.booking_id)
            .await?
            .ok_or_else(|| Error::not_found("booking"))?;
        if booking.status != BookingStatus::Confirmed {
            return Err(Error::validation("only confirmed stays can be reviewed"));
        }
        if booking.check_out_date >= Utc::now().date_naive() {
            return Err(Error::validation("reviews open after check-out"));
        }

        let property = self.property(&booking.property_id).await?;
        let reviewed_id = match new.kind {
            ReviewKind::Property | ReviewKind::Host => {
                if actor != booking.user_id {
                    return Err(Error::auth("only the guest can review the stay"));
                }
                property.owner_id.clone()
            }
            ReviewKind::Guest => {
                if actor != property.owner_id {
                    return Err(Error::auth("only the host can review the guest"));
                }
                booking.user_id.clone()
            }
        };

        if self.store.review_exists(&new.booking_id, new.kind).await? {
            return Err(Error::conflict("this stay was already reviewed"));
        }

        let now = Utc::now();
        let review = Review {
            id: Uuid::new_v4().to_string(),
            booking_id: new.booking_id,
            property_id: booking.property_id,
            reviewer_id: actor.to_string(),
            reviewed_id,
            rating: new.rating,
            comment: new.comment,
            kind: new.kind,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_review(&review).await?;
        Ok(review)
    }

    pub async fn reviews_for_property(&self, property_id: &str) -> Result<Vec<Review>> {
        Ok(self.store.reviews_for_property(property_id).await?)
    }

    pub async fn reviews_for_booking(&self, booking_id: &str) -> Result<Vec<Review>> {
        Ok(self.store.reviews_for_booking(booking_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn marketplace() -> Marketplace {
        let store = Arc::new(Store::in_memory().await.unwrap());
        Marketplace::new(store, Arc::new(EventBus::new()))
    }

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn listing(max_guests: i64) -> NewProperty {
        NewProperty {
            title: "Sea view flat".into(),
            description: "Two rooms near the beach".into(),
            address: "Rua das Flores 1".into(),
            city: "Florianopolis".into(),
            country: "Brazil".into(),
            postal_code: None,
            price_per_night: 120.0,
            max_guests,
            bedrooms: 2,
            bathrooms: 1,
            amenities: vec!["wifi".into()],
            images: vec![],
        }
    }

    async fn approved_listing(m: &Marketplace, owner: &str) -> Property {
        let property = m.create_property(owner, listing(4)).await.unwrap();
        m.store.grant_role("admin", Role::Admin).await.unwrap();
        m.set_property_status("admin", &property.id, PropertyStatus::Approved)
            .await
            .unwrap();
        m.property(&property.id).await.unwrap()
    }

    fn request(property_id: &str, check_in: &str, check_out: &str, guests: i64) -> BookingRequest {
        BookingRequest {
            property_id: property_id.to_string(),
            check_in_date: Some(d(check_in)),
            check_out_date: Some(d(check_out)),
            guest_count: guests,
        }
    }

    #[tokio::test]
    async fn booking_requires_identity_and_dates() {
        let m = marketplace().await;
        let property = approved_listing(&m, "owner-1").await;

        let err = m
            .create_booking(None, request(&property.id, "2030-03-10", "2030-03-13", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(_)));

        let err = m
            .create_booking(
                Some("guest-1"),
                BookingRequest {
                    property_id: property.id.clone(),
                    check_in_date: Some(d("2030-03-10")),
                    check_out_date: None,
                    guest_count: 2,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn pending_bookings_do_not_occupy_dates() {
        let m = marketplace().await;
        let property = approved_listing(&m, "owner-1").await;

        m.create_booking(Some("guest-1"), request(&property.id, "2030-03-10", "2030-03-13", 2))
            .await
            .unwrap();

        let occupied = m.occupied_dates_for(&property.id).await.unwrap();
        assert!(occupied.is_empty());

        // A second guest can still request the same range.
        m.create_booking(Some("guest-2"), request(&property.id, "2030-03-10", "2030-03-13", 2))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn confirmed_booking_blocks_its_nights_but_not_checkout() {
        let m = marketplace().await;
        let property = approved_listing(&m, "owner-1").await;

        let booking = m
            .create_booking(Some("guest-1"), request(&property.id, "2030-03-10", "2030-03-13", 2))
            .await
            .unwrap();
        m.set_booking_status("owner-1", &booking.id, BookingStatus::Confirmed)
            .await
            .unwrap();

        let occupied = m.occupied_dates_for(&property.id).await.unwrap();
        assert!(occupied.contains(&d("2030-03-10")));
        assert!(occupied.contains(&d("2030-03-11")));
        assert!(occupied.contains(&d("2030-03-12")));
        assert!(!occupied.contains(&d("2030-03-13")));

        let err = m
            .create_booking(Some("guest-2"), request(&property.id, "2030-03-12", "2030-03-14", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        // Back-to-back stay starting on the checkout day is fine.
        m.create_booking(Some("guest-2"), request(&property.id, "2030-03-13", "2030-03-15", 2))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn owner_blocks_conflict_bookings() {
        let m = marketplace().await;
        let property = approved_listing(&m, "owner-1").await;

        m.add_block(
            "owner-1",
            &property.id,
            NewBlock {
                blocked_date: d("2030-03-11"),
                reason: Some("maintenance".into()),
            },
        )
        .await
        .unwrap();

        let err = m
            .create_booking(Some("guest-1"), request(&property.id, "2030-03-10", "2030-03-13", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        // Repeat block on the same day is rejected, not duplicated.
        let err = m
            .add_block(
                "owner-1",
                &property.id,
                NewBlock {
                    blocked_date: d("2030-03-11"),
                    reason: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        m.remove_block("owner-1", &property.id, d("2030-03-11"))
            .await
            .unwrap();
        m.create_booking(Some("guest-1"), request(&property.id, "2030-03-10", "2030-03-13", 2))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn capacity_is_checked_after_conflicts() {
        let m = marketplace().await;
        let property = approved_listing(&m, "owner-1").await;

        let err = m
            .create_booking(Some("guest-1"), request(&property.id, "2030-03-10", "2030-03-13", 9))
            .await
            .unwrap_err();
        match err {
            Error::Capacity { requested, max } => {
                assert_eq!(requested, 9);
                assert_eq!(max, 4);
            }
            other => panic!("expected capacity error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn booking_totals_follow_nights_and_price() {
        let m = marketplace().await;
        let property = approved_listing(&m, "owner-1").await;

        let booking = m
            .create_booking(Some("guest-1"), request(&property.id, "2030-03-10", "2030-03-13", 2))
            .await
            .unwrap();
        assert_eq!(booking.total_nights, 3);
        assert_eq!(booking.total_price, 360.0);
        assert_eq!(booking.status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn moderation_is_admin_only() {
        let m = marketplace().await;
        let property = m.create_property("owner-1", listing(4)).await.unwrap();

        let err = m
            .set_property_status("owner-1", &property.id, PropertyStatus::Approved)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(_)));

        // Unapproved listings cannot be booked.
        let err = m
            .create_booking(Some("guest-1"), request(&property.id, "2030-03-10", "2030-03-12", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn search_matches_destination_and_capacity() {
        let m = marketplace().await;
        approved_listing(&m, "owner-1").await;

        let hits = m
            .search_properties(&PropertyFilter {
                destination: Some("florianopolis".into()),
                guests: Some(3),
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let none = m
            .search_properties(&PropertyFilter {
                destination: Some("reykjavik".into()),
                guests: None,
            })
            .await
            .unwrap();
        assert!(none.is_empty());

        let too_many = m
            .search_properties(&PropertyFilter {
                destination: None,
                guests: Some(9),
            })
            .await
            .unwrap();
        assert!(too_many.is_empty());
    }

    #[tokio::test]
    async fn conversation_bootstrap_is_idempotent() {
        let m = marketplace().await;
        let property = approved_listing(&m, "owner-1").await;

        let first = m
            .get_or_create_conversation_for_property("guest-1", &property.id)
            .await
            .unwrap();
        let second = m
            .get_or_create_conversation_for_property("guest-1", &property.id)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);

        let other_guest = m
            .get_or_create_conversation_for_property("guest-2", &property.id)
            .await
            .unwrap();
        assert_ne!(first.id, other_guest.id);

        let err = m
            .get_or_create_conversation_for_property("owner-1", &property.id)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn posting_messages_touches_the_conversation() {
        let m = marketplace().await;
        let property = approved_listing(&m, "owner-1").await;
        let conversation = m
            .get_or_create_conversation_for_property("guest-1", &property.id)
            .await
            .unwrap();

        m.post_message("guest-1", &conversation.id, "is it free in March?")
            .await
            .unwrap();
        m.post_message("owner-1", &conversation.id, "it is")
            .await
            .unwrap();

        let err = m
            .post_message("stranger", &conversation.id, "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(_)));

        let messages = m.messages_for("guest-1", &conversation.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].body, "is it free in March?");

        let listed = m.conversations_for("owner-1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].last_message_at, messages[1].created_at);
    }

    #[tokio::test]
    async fn reviews_open_only_after_checkout_of_a_confirmed_stay() {
        let m = marketplace().await;
        let property = approved_listing(&m, "owner-1").await;

        // A stay that already ended.
        let past = m
            .create_booking(Some("guest-1"), request(&property.id, "2025-01-10", "2025-01-12", 2))
            .await
            .unwrap();

        // Still pending: not reviewable.
        let err = m
            .leave_review(
                "guest-1",
                NewReview {
                    booking_id: past.id.clone(),
                    rating: 5,
                    comment: None,
                    kind: ReviewKind::Property,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        m.set_booking_status("owner-1", &past.id, BookingStatus::Confirmed)
            .await
            .unwrap();

        let review = m
            .leave_review(
                "guest-1",
                NewReview {
                    booking_id: past.id.clone(),
                    rating: 5,
                    comment: Some("great stay".into()),
                    kind: ReviewKind::Property,
                },
            )
            .await
            .unwrap();
        assert_eq!(review.reviewed_id, "owner-1");

        // Same (booking, kind) twice is a conflict.
        let err = m
            .leave_review(
                "guest-1",
                NewReview {
                    booking_id: past.id.clone(),
                    rating: 4,
                    comment: None,
                    kind: ReviewKind::Property,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        // The host reviews the guest, not the other way around.
        let err = m
            .leave_review(
                "guest-1",
                NewReview {
                    booking_id: past.id.clone(),
                    rating: 4,
                    comment: None,
                    kind: ReviewKind::Guest,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(_)));

        m.leave_review(
            "owner-1",
            NewReview {
                booking_id: past.id.clone(),
                rating: 5,
                comment: None,
                kind: ReviewKind::Guest,
            },
        )
        .await
        .unwrap();

        // A stay that has not ended yet cannot be reviewed.
        let future = m
            .create_booking(Some("guest-1"), request(&property.id, "2030-03-10", "2030-03-12", 2))
            .await
            .unwrap();
        m.set_booking_status("owner-1", &future.id, BookingStatus::Confirmed)
            .await
            .unwrap();
        let err = m
            .leave_review(
                "guest-1",
                NewReview {
                    booking_id: future.id,
                    rating: 5,
                    comment: None,
                    kind: ReviewKind::Property,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        assert_eq!(m.reviews_for_booking(&past.id).await.unwrap().len(), 2);
        assert_eq!(
            m.reviews_for_property(&property.id).await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn contact_is_revealed_only_once_confirmed() {
        let m = marketplace().await;
        let property = approved_listing(&m, "owner-1").await;
        m.register_profile(
            "owner-1",
            NewProfile {
                full_name: "Olivia Owner".into(),
                email: "olivia@example.com".into(),
                whatsapp_number: "+55 48 9999-0000".into(),
                avatar_url: None,
            },
        )
        .await
        .unwrap();

        let booking = m
            .create_booking(Some("guest-1"), request(&property.id, "2030-03-10", "2030-03-12", 2))
            .await
            .unwrap();

        let err = m.booking_contact("guest-1", &booking.id).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        m.set_booking_status("owner-1", &booking.id, BookingStatus::Confirmed)
            .await
            .unwrap();
        let contact = m.booking_contact("guest-1", &booking.id).await.unwrap();
        assert_eq!(contact.user_id, "owner-1");

        let err = m.booking_contact("stranger", &booking.id).await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[tokio::test]
    async fn overlap_scenario_from_occupancy_set() {
        let m = marketplace().await;
        let property = approved_listing(&m, "owner-1").await;

        m.add_block(
            "owner-1",
            &property.id,
            NewBlock {
                blocked_date: d("2030-03-11"),
                reason: None,
            },
        )
        .await
        .unwrap();

        let occupied = m.occupied_dates_for(&property.id).await.unwrap();
        assert!(availability::has_date_conflict(
            d("2030-03-10"),
            d("2030-03-13"),
            &occupied
        ));
        assert!(!availability::has_date_conflict(
            d("2030-03-10"),
            d("2030-03-13"),
            &HashSet::new()
        ));
    }
}
