//! Optimistic message channel.
//!
//! One channel instance backs one open conversation view. Messages the
//! local user sends show up in the list immediately, as provisional
//! entries, and are reconciled against the store-confirmed event stream:
//! promoted in place on confirmation, removed again if the write fails.

use crate::{bus::Event, chat::Message, error::Result, manager::Marketplace};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Default)]
struct ChannelState {
    conversation_id: Option<String>,
    messages: Vec<Message>,
    loading: bool,
}

pub struct MessageChannel {
    marketplace: Arc<Marketplace>,
    local_user: String,
    state: Arc<Mutex<ChannelState>>,
    // Bumped on every open(); a fetch or listener holding an older value
    // must not touch state anymore.
    generation: Arc<AtomicU64>,
    listener: Option<JoinHandle<()>>,
}

impl MessageChannel {
    pub fn new(marketplace: Arc<Marketplace>, local_user: impl Into<String>) -> Self {
        Self {
            marketplace,
            local_user: local_user.into(),
            state: Arc::new(Mutex::new(ChannelState::default())),
            generation: Arc::new(AtomicU64::new(0)),
            listener: None,
        }
    }

    /// Bind the channel to a conversation (or to none). Tears down the
    /// previous subscription, replaces the message list with a fresh fetch
    /// and opens exactly one new subscription for inserted rows. A fetch
    /// that comes back after the channel has moved on is discarded.
    pub async fn open(&mut self, conversation_id: Option<String>) -> Result<()> {
        if let Some(handle) = self.listener.take() {
            handle.abort();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let Some(conversation_id) = conversation_id else {
            let mut state = self.state.lock().unwrap();
            state.conversation_id = None;
            state.messages.clear();
            state.loading = false;
            return Ok(());
        };

        {
            let mut state = self.state.lock().unwrap();
            state.conversation_id = Some(conversation_id.clone());
            state.messages.clear();
            state.loading = true;
        }

        // Subscribe before the history fetch so rows inserted mid-fetch
        // still reach us; duplicates are dropped by id on apply.
        let mut rx = self.marketplace.subscribe();
        let state = self.state.clone();
        let generations = self.generation.clone();
        let conversation = conversation_id.clone();
        self.listener = Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(Event::MessageInserted(message))
                        if message.conversation_id == conversation =>
                    {
                        if generations.load(Ordering::SeqCst) != generation {
                            break;
                        }
                        let mut state = state.lock().unwrap();
                        apply_incoming(&mut state, message);
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Message listener lagged, skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));

        let fetched = self
            .marketplace
            .messages_for(&self.local_user, &conversation_id)
            .await;

        let mut state = self.state.lock().unwrap();
        if self.generation.load(Ordering::SeqCst) != generation {
            // The channel was re-bound while we were fetching.
            return Ok(());
        }
        state.loading = false;
        match fetched {
            Ok(messages) => {
                state.messages = messages;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Append a provisional message synchronously, then persist it. On
    /// success the provisional entry is promoted to the confirmed row; on
    /// failure it is removed again and the error handed back to the caller.
    /// No retry happens here.
    pub async fn send_message(&self, body: &str) -> Result<()> {
        let body = body.trim();
        if body.is_empty() {
            return Ok(());
        }
        let Some(conversation_id) = self.conversation_id() else {
            return Ok(());
        };

        let provisional = Message::provisional(&conversation_id, &self.local_user, body);
        let temp_id = provisional.id.clone();
        self.state.lock().unwrap().messages.push(provisional);

        match self
            .marketplace
            .post_message(&self.local_user, &conversation_id, body)
            .await
        {
            Ok(confirmed) => {
                let mut state = self.state.lock().unwrap();
                let already_present = state.messages.iter().any(|m| m.id == confirmed.id);
                if let Some(pos) = state.messages.iter().position(|m| m.id == temp_id) {
                    if already_present {
                        state.messages.remove(pos);
                    } else {
                        state.messages[pos] = confirmed;
                    }
                }
                // If the temp id is gone, the realtime event beat us to the
                // promotion; nothing left to do.
                Ok(())
            }
            Err(e) => {
                self.state
                    .lock()
                    .unwrap()
                    .messages
                    .retain(|m| m.id != temp_id);
                Err(e)
            }
        }
    }

    pub fn conversation_id(&self) -> Option<String> {
        self.state.lock().unwrap().conversation_id.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state.lock().unwrap().messages.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().unwrap().loading
    }
}

impl Drop for MessageChannel {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.take() {
            handle.abort();
        }
    }
}

/// Fold one confirmed row into channel state. Applying the same row twice
/// is a no-op, and a provisional entry with the same body is promoted in
/// place rather than duplicated. The body match is a best-effort key; the
/// temp id never reaches the store so there is nothing stronger to match on.
fn apply_incoming(state: &mut ChannelState, message: Message) {
    if state.messages.iter().any(|m| m.id == message.id) {
        return;
    }
    if let Some(slot) = state
        .messages
        .iter_mut()
        .find(|m| m.is_provisional() && m.body == message.body)
    {
        *slot = message;
        return;
    }
    state.messages.push(message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bus::EventBus,
        chat::PROVISIONAL_PREFIX,
        entity::Role,
        error::Error,
        listing::{NewProperty, PropertyStatus},
        store::Store,
    };
    use chrono::Utc;
    use std::time::Duration;

    struct Fixture {
        marketplace: Arc<Marketplace>,
        store: Arc<Store>,
        bus: Arc<EventBus>,
        conversation_id: String,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(Store::in_memory().await.unwrap());
        let bus = Arc::new(EventBus::new());
        let marketplace = Arc::new(Marketplace::new(store.clone(), bus.clone()));

        let property = marketplace
            .create_property(
                "owner-1",
                NewProperty {
                    title: "Loft downtown".into(),
                    description: "Bright loft".into(),
                    address: "Av. Central 10".into(),
                    city: "Curitiba".into(),
                    country: "Brazil".into(),
                    postal_code: None,
                    price_per_night: 90.0,
                    max_guests: 2,
                    bedrooms: 1,
                    bathrooms: 1,
                    amenities: vec![],
                    images: vec![],
                },
            )
            .await
            .unwrap();
        store.grant_role("admin", Role::Admin).await.unwrap();
        marketplace
            .set_property_status("admin", &property.id, PropertyStatus::Approved)
            .await
            .unwrap();
        let conversation = marketplace
            .get_or_create_conversation_for_property("guest-1", &property.id)
            .await
            .unwrap();

        Fixture {
            marketplace,
            store,
            bus,
            conversation_id: conversation.id,
        }
    }

    async fn settle() {
        // Give the listener task a chance to drain the bus.
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    fn confirmed(conversation_id: &str, sender: &str, body: &str) -> Message {
        Message {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            sender_id: sender.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn load_replaces_state_with_history() {
        let fx = fixture().await;
        fx.marketplace
            .post_message("guest-1", &fx.conversation_id, "first")
            .await
            .unwrap();
        fx.marketplace
            .post_message("owner-1", &fx.conversation_id, "second")
            .await
            .unwrap();

        let mut channel = MessageChannel::new(fx.marketplace.clone(), "guest-1");
        channel.open(Some(fx.conversation_id.clone())).await.unwrap();

        let messages = channel.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].body, "first");
        assert_eq!(messages[1].body, "second");
        assert!(!channel.is_loading());

        channel.open(None).await.unwrap();
        assert!(channel.messages().is_empty());
        assert!(!channel.is_loading());
    }

    #[tokio::test]
    async fn duplicate_events_apply_once() {
        let fx = fixture().await;
        let mut channel = MessageChannel::new(fx.marketplace.clone(), "guest-1");
        channel.open(Some(fx.conversation_id.clone())).await.unwrap();

        let row = confirmed(&fx.conversation_id, "owner-1", "hi there");
        fx.bus.publish(Event::MessageInserted(row.clone()));
        fx.bus.publish(Event::MessageInserted(row.clone()));
        settle().await;

        let messages = channel.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, row.id);
    }

    #[tokio::test]
    async fn send_round_trip_leaves_exactly_one_message() {
        let fx = fixture().await;
        let mut channel = MessageChannel::new(fx.marketplace.clone(), "guest-1");
        channel.open(Some(fx.conversation_id.clone())).await.unwrap();

        channel.send_message("hello").await.unwrap();
        settle().await;

        let messages = channel.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].body, "hello");
        assert!(!messages[0].is_provisional());

        // The store really has the row.
        let persisted = fx.store.messages_for(&fx.conversation_id).await.unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].id, messages[0].id);
    }

    #[tokio::test]
    async fn failed_send_rolls_the_provisional_back() {
        let fx = fixture().await;
        let mut channel = MessageChannel::new(fx.marketplace.clone(), "guest-1");
        channel.open(Some(fx.conversation_id.clone())).await.unwrap();

        fx.store.close().await;

        let err = channel.send_message("lost words").await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));

        let messages = channel.messages();
        assert!(messages.iter().all(|m| m.body != "lost words"));
        assert!(!messages.iter().any(|m| m.id.starts_with(PROVISIONAL_PREFIX)));
    }

    #[tokio::test]
    async fn concurrent_sends_keep_call_order_and_resolve_independently() {
        let fx = fixture().await;
        let mut channel = MessageChannel::new(fx.marketplace.clone(), "guest-1");
        channel.open(Some(fx.conversation_id.clone())).await.unwrap();

        let first = channel.send_message("one");
        let second = channel.send_message("two");
        let (r1, r2) = tokio::join!(first, second);
        r1.unwrap();
        r2.unwrap();
        settle().await;

        let messages = channel.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].body, "one");
        assert_eq!(messages[1].body, "two");
        assert!(messages.iter().all(|m| !m.is_provisional()));
        assert_ne!(messages[0].id, messages[1].id);
    }

    #[tokio::test]
    async fn rebinding_drops_the_old_subscription() {
        let fx = fixture().await;
        // Reuse the same property for a second guest's thread.
        let conversation = fx
            .store
            .conversation(&fx.conversation_id)
            .await
            .unwrap()
            .unwrap();
        let property_id = conversation.property_id.unwrap();
        let other = fx
            .marketplace
            .get_or_create_conversation_for_property("guest-2", &property_id)
            .await
            .unwrap();

        let mut channel = MessageChannel::new(fx.marketplace.clone(), "guest-2");
        channel.open(Some(fx.conversation_id.clone())).await.ok();
        channel.open(Some(other.id.clone())).await.unwrap();

        // An insert into the previous conversation must not leak in.
        fx.bus.publish(Event::MessageInserted(confirmed(
            &fx.conversation_id,
            "guest-1",
            "stale",
        )));
        settle().await;

        assert!(channel.messages().is_empty());
        assert_eq!(channel.conversation_id().as_deref(), Some(other.id.as_str()));
    }

    #[tokio::test]
    async fn provisional_promotes_in_place_when_event_arrives_first() {
        let fx = fixture().await;
        let mut channel = MessageChannel::new(fx.marketplace.clone(), "guest-1");
        channel.open(Some(fx.conversation_id.clone())).await.unwrap();

        // Seed a neighbour so in-place promotion is observable.
        fx.bus.publish(Event::MessageInserted(confirmed(
            &fx.conversation_id,
            "owner-1",
            "welcome",
        )));
        settle().await;

        let mut state = channel.state.lock().unwrap();
        let provisional = Message::provisional(&fx.conversation_id, "guest-1", "thanks");
        state.messages.insert(1, provisional);
        let row = confirmed(&fx.conversation_id, "guest-1", "thanks");
        apply_incoming(&mut state, row.clone());

        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[1].id, row.id);
        assert_eq!(state.messages[1].body, "thanks");
        drop(state);

        // Availability events on the same bus are ignored by the channel.
        fx.bus.publish(Event::BlockChanged {
            property_id: "unrelated".into(),
        });
        settle().await;
        assert_eq!(channel.messages().len(), 2);
    }
}
