use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event as SseEvent, Sse},
        IntoResponse, Response,
    },
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::{
    booking::{Booking, BookingRequest, BookingStatus, NewBlock, PropertyBlock},
    chat::{Conversation, Message},
    entity::{NewProfile, Profile, Role},
    error::Error,
    listing::{NewProperty, Property, PropertyFilter, PropertyStatus},
    manager::Marketplace,
    review::{NewReview, Review},
};

// -----------------------------------------------------------------------------
// Server State
// -----------------------------------------------------------------------------

pub struct ApiState {
    pub marketplace: Arc<Marketplace>,
}

pub struct ApiServer {
    marketplace: Arc<Marketplace>,
}

impl ApiServer {
    pub fn new(marketplace: Arc<Marketplace>) -> Self {
        Self { marketplace }
    }

    pub fn router(&self) -> Router {
        let state = Arc::new(ApiState {
            marketplace: self.marketplace.clone(),
        });

        Router::new()
            .route("/properties", get(search_properties).post(create_property))
            .route("/properties/mine", get(my_properties))
            .route("/properties/:id", get(get_property))
            .route(
                "/properties/:id/availability",
                get(occupied_dates).post(set_availability),
            )
            .route("/properties/:id/status", post(set_property_status))
            .route("/properties/:id/blocks", get(list_blocks).post(add_block))
            .route("/properties/:id/blocks/:date", delete(remove_block))
            .route("/properties/:id/bookings", get(property_bookings))
            .route("/properties/:id/reviews", get(property_reviews))
            .route("/bookings", get(my_bookings).post(create_booking))
            .route("/bookings/:id/status", post(set_booking_status))
            .route("/bookings/:id/contact", get(booking_contact))
            .route("/bookings/:id/reviews", get(booking_reviews))
            .route("/profile", put(upsert_profile))
            .route("/roles", post(grant_role))
            .route(
                "/conversations",
                get(list_conversations).post(open_conversation),
            )
            .route(
                "/conversations/:id/messages",
                get(list_messages).post(post_message),
            )
            .route("/reviews", post(leave_review))
            .route("/events", get(events_handler))
            .with_state(state)
            .layer(CorsLayer::permissive())
    }
}

// -----------------------------------------------------------------------------
// Error & identity plumbing
// -----------------------------------------------------------------------------

struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Capacity { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Auth(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Store call failed: {:#}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// The authentication collaborator lives outside this service; requests
/// arrive with the already-resolved identity in a header.
fn identity(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}

fn require_identity(headers: &HeaderMap) -> Result<String, ApiError> {
    identity(headers).ok_or_else(|| ApiError(Error::auth("missing x-user-id header")))
}

// -----------------------------------------------------------------------------
// Listings
// -----------------------------------------------------------------------------

async fn search_properties(
    State(state): State<Arc<ApiState>>,
    Query(filter): Query<PropertyFilter>,
) -> Result<Json<Vec<Property>>, ApiError> {
    Ok(Json(state.marketplace.search_properties(&filter).await?))
}

async fn create_property(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(new): Json<NewProperty>,
) -> Result<Json<Property>, ApiError> {
    let owner = require_identity(&headers)?;
    Ok(Json(state.marketplace.create_property(&owner, new).await?))
}

async fn get_property(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<Property>, ApiError> {
    Ok(Json(state.marketplace.property(&id).await?))
}

async fn my_properties(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Property>>, ApiError> {
    let owner = require_identity(&headers)?;
    Ok(Json(state.marketplace.properties_for_owner(&owner).await?))
}

#[derive(Deserialize)]
struct PropertyStatusBody {
    status: PropertyStatus,
}

async fn set_property_status(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<PropertyStatusBody>,
) -> Result<StatusCode, ApiError> {
    let actor = require_identity(&headers)?;
    state
        .marketplace
        .set_property_status(&actor, &id, body.status)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct AvailabilityBody {
    is_available: bool,
}

async fn set_availability(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<AvailabilityBody>,
) -> Result<StatusCode, ApiError> {
    let actor = require_identity(&headers)?;
    state
        .marketplace
        .set_property_availability(&actor, &id, body.is_available)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// The dates a picker should disable, sorted. Recomputed from live data on
/// every call.
async fn occupied_dates(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<NaiveDate>>, ApiError> {
    let mut dates: Vec<NaiveDate> = state
        .marketplace
        .occupied_dates_for(&id)
        .await?
        .into_iter()
        .collect();
    dates.sort();
    Ok(Json(dates))
}

// -----------------------------------------------------------------------------
// Blocks
// -----------------------------------------------------------------------------

async fn list_blocks(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<PropertyBlock>>, ApiError> {
    let actor = require_identity(&headers)?;
    Ok(Json(state.marketplace.blocks_for_property(&actor, &id).await?))
}

async fn add_block(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(block): Json<NewBlock>,
) -> Result<StatusCode, ApiError> {
    let actor = require_identity(&headers)?;
    state.marketplace.add_block(&actor, &id, block).await?;
    Ok(StatusCode::CREATED)
}

async fn remove_block(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path((id, date)): Path<(String, NaiveDate)>,
) -> Result<StatusCode, ApiError> {
    let actor = require_identity(&headers)?;
    state.marketplace.remove_block(&actor, &id, date).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -----------------------------------------------------------------------------
// Bookings
// -----------------------------------------------------------------------------

async fn create_booking(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(request): Json<BookingRequest>,
) -> Result<Json<Booking>, ApiError> {
    let actor = identity(&headers);
    Ok(Json(
        state
            .marketplace
            .create_booking(actor.as_deref(), request)
            .await?,
    ))
}

async fn my_bookings(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Booking>>, ApiError> {
    let actor = require_identity(&headers)?;
    Ok(Json(state.marketplace.bookings_for_user(&actor).await?))
}

async fn property_bookings(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<Booking>>, ApiError> {
    let actor = require_identity(&headers)?;
    Ok(Json(
        state.marketplace.bookings_for_property(&actor, &id).await?,
    ))
}

#[derive(Deserialize)]
struct BookingStatusBody {
    status: BookingStatus,
}

async fn set_booking_status(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<BookingStatusBody>,
) -> Result<Json<Booking>, ApiError> {
    let actor = require_identity(&headers)?;
    Ok(Json(
        state
            .marketplace
            .set_booking_status(&actor, &id, body.status)
            .await?,
    ))
}

async fn booking_contact(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Profile>, ApiError> {
    let actor = require_identity(&headers)?;
    Ok(Json(state.marketplace.booking_contact(&actor, &id).await?))
}

// -----------------------------------------------------------------------------
// Profiles & roles
// -----------------------------------------------------------------------------

async fn upsert_profile(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(profile): Json<NewProfile>,
) -> Result<Json<Profile>, ApiError> {
    let actor = require_identity(&headers)?;
    Ok(Json(state.marketplace.register_profile(&actor, profile).await?))
}

#[derive(Deserialize)]
struct RoleBody {
    user_id: String,
    role: Role,
}

async fn grant_role(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(body): Json<RoleBody>,
) -> Result<StatusCode, ApiError> {
    let actor = require_identity(&headers)?;
    state
        .marketplace
        .grant_role(&actor, &body.user_id, body.role)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// -----------------------------------------------------------------------------
// Conversations & messages
// -----------------------------------------------------------------------------

#[derive(Deserialize)]
struct OpenConversationBody {
    property_id: String,
}

async fn open_conversation(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(body): Json<OpenConversationBody>,
) -> Result<Json<Conversation>, ApiError> {
    let actor = require_identity(&headers)?;
    Ok(Json(
        state
            .marketplace
            .get_or_create_conversation_for_property(&actor, &body.property_id)
            .await?,
    ))
}

async fn list_conversations(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    let actor = require_identity(&headers)?;
    Ok(Json(state.marketplace.conversations_for(&actor).await?))
}

async fn list_messages(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let actor = require_identity(&headers)?;
    Ok(Json(state.marketplace.messages_for(&actor, &id).await?))
}

#[derive(Deserialize)]
struct MessageBody {
    body: String,
}

async fn post_message(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<MessageBody>,
) -> Result<Json<Message>, ApiError> {
    let actor = require_identity(&headers)?;
    Ok(Json(
        state.marketplace.post_message(&actor, &id, &body.body).await?,
    ))
}

// -----------------------------------------------------------------------------
// Reviews
// -----------------------------------------------------------------------------

async fn leave_review(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(review): Json<NewReview>,
) -> Result<Json<Review>, ApiError> {
    let actor = require_identity(&headers)?;
    Ok(Json(state.marketplace.leave_review(&actor, review).await?))
}

async fn property_reviews(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Review>>, ApiError> {
    Ok(Json(state.marketplace.reviews_for_property(&id).await?))
}

async fn booking_reviews(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Review>>, ApiError> {
    Ok(Json(state.marketplace.reviews_for_booking(&id).await?))
}

// -----------------------------------------------------------------------------
// Realtime feed
// -----------------------------------------------------------------------------

async fn events_handler(
    State(state): State<Arc<ApiState>>,
) -> Sse<impl Stream<Item = Result<SseEvent, axum::BoxError>>> {
    info!("New realtime listener connected");

    // Create a new receiver for this connection
    let mut rx = state.marketplace.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(payload) => yield Ok(SseEvent::default().data(payload)),
                    Err(e) => error!("Failed to encode event: {}", e),
                },
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    // Handle lag if necessary
                }
                Err(broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(axum::response::sse::KeepAlive::default())
}
