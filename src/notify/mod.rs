use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_channel::{Receiver, Sender, TrySendError};
use tokio::sync::RwLock;

use crate::entities::Notification;
use crate::error::{unexpected_error, Error};

const CHANNEL_CAPACITY: usize = 32;

pub type Channel = Sender<String>;

/// Handle of one registration; a later registration of the same identity
/// gets a different one.
pub type Registration = u64;

struct Client {
    registration: Registration,
    channel: Channel,
}

/// Identity → live push channel. Scoped to this process: replicas do not see
/// each other's registrations, and nothing is queued for absent identities.
#[derive(Default)]
pub struct Hub {
    clients: RwLock<HashMap<String, Client>>,
    next_registration: AtomicU64,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel() -> (Channel, Receiver<String>) {
        async_channel::bounded(CHANNEL_CAPACITY)
    }

    /// Last registration wins; the displaced channel is closed so whoever
    /// drains it stops.
    #[tracing::instrument(skip(self, channel))]
    pub async fn register(&self, identity: &str, channel: Channel) -> Registration {
        let registration = self.next_registration.fetch_add(1, Ordering::Relaxed);
        let previous = self.clients.write().await.insert(
            identity.to_string(),
            Client {
                registration,
                channel,
            },
        );

        if let Some(previous) = previous {
            previous.channel.close();
            tracing::info!("push channel replaced");
        } else {
            tracing::info!("push channel registered");
        }

        registration
    }

    #[tracing::instrument(skip(self))]
    pub async fn unregister(&self, identity: &str) -> bool {
        let removed = self.clients.write().await.remove(identity).is_some();
        if removed {
            tracing::info!("push channel unregistered");
        }
        removed
    }

    /// Unregisters `identity` only while `registration` is still its current one.
    #[tracing::instrument(skip(self))]
    pub async fn unregister_if_current(&self, identity: &str, registration: Registration) -> bool {
        let mut clients = self.clients.write().await;

        let bound = clients
            .get(identity)
            .map_or(false, |current| current.registration == registration);
        if !bound {
            return false;
        }

        clients.remove(identity);
        tracing::info!("push channel unregistered");
        true
    }

    pub async fn is_registered(&self, identity: &str) -> bool {
        self.clients.read().await.contains_key(identity)
    }

    /// Absent identities are a silent no-op; a full or closed channel is an error.
    pub async fn send(&self, identity: &str, message: String) -> Result<(), Error> {
        let clients = self.clients.read().await;

        let Some(client) = clients.get(identity) else {
            tracing::debug!(identity, "no push channel, dropping message");
            return Ok(());
        };

        client.channel.try_send(message).map_err(|err| {
            let reason = match err {
                TrySendError::Full(_) => "full",
                TrySendError::Closed(_) => "closed",
            };
            tracing::warn!(identity, reason, "push channel rejected message");
            unexpected_error()
        })
    }

    /// Best-effort delivery of one notification; failures are only logged.
    pub async fn notify(&self, identity: &str, notification: &Notification) {
        let message = match notification.to_text() {
            Ok(message) => message,
            Err(err) => {
                tracing::error!(error = %err, "failed to encode notification");
                return;
            }
        };

        let _ = self.send(identity, message).await;
    }

    pub async fn notify_all(&self, identities: &[String], notification: &Notification) {
        for identity in identities {
            self.notify(identity, notification).await;
        }
    }
}

#[tokio::test]
async fn send_to_absent_identity_is_noop() {
    let hub = Hub::new();
    assert!(hub.send("nobody", "hello".into()).await.is_ok());
}

#[tokio::test]
async fn send_reaches_registered_channel() {
    let hub = Hub::new();
    let (tx, rx) = Hub::channel();
    hub.register("driver-1", tx).await;

    hub.send("driver-1", "hello".into()).await.unwrap();
    assert_eq!(rx.recv().await.unwrap(), "hello");
}

#[tokio::test]
async fn last_registration_wins() {
    let hub = Hub::new();
    let (first_tx, first_rx) = Hub::channel();
    let (second_tx, second_rx) = Hub::channel();

    let first = hub.register("driver-1", first_tx).await;
    let second = hub.register("driver-1", second_tx).await;
    assert_ne!(first, second);

    hub.send("driver-1", "hello".into()).await.unwrap();
    assert_eq!(second_rx.recv().await.unwrap(), "hello");
    assert!(first_rx.is_closed());

    // the displaced socket going away must not evict the newer one
    assert!(!hub.unregister_if_current("driver-1", first).await);
    assert!(hub.is_registered("driver-1").await);

    assert!(hub.unregister_if_current("driver-1", second).await);
    assert!(!hub.is_registered("driver-1").await);
}

#[tokio::test]
async fn unregister_removes_channel() {
    let hub = Hub::new();
    let (tx, rx) = Hub::channel();
    hub.register("driver-1", tx).await;

    assert!(hub.unregister("driver-1").await);
    assert!(!hub.unregister("driver-1").await);

    hub.send("driver-1", "hello".into()).await.unwrap();
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn notify_serializes_event() {
    let hub = Hub::new();
    let (tx, rx) = Hub::channel();
    hub.register("driver-2", tx).await;

    hub.notify_all(
        &["driver-1".to_string(), "driver-2".to_string()],
        &Notification::BidConfirmedByOther {
            bid_id: "BID-1".into(),
        },
    )
    .await;

    let value: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
    assert_eq!(value["event"], "bid_confirmed_by_other");
    assert_eq!(value["bidID"], "BID-1");
}
