//! Authoritative values with change broadcast, and their read-only mirrors
//!
//! Only the authoritative role holds [`Authoritative`] values; a write diffs
//! against the current value and publishes the change through the [`Outbox`].
//! Observers hold [`Mirror`]s that change only by applying inbound diffs.

use std::fmt;

use tokio::sync::broadcast;
use tracing::trace;

use crate::ws::protocol::{Audience, Envelope, ParticipantId, ServerMsg};

/// Fan-out of outbound messages from the authoritative loop
#[derive(Clone)]
pub struct Outbox {
    tx: broadcast::Sender<Envelope>,
}

impl Outbox {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    pub fn send(&self, audience: Audience, msg: ServerMsg) {
        // No subscribers is fine: delivery is best-effort.
        if self.tx.send(Envelope { audience, msg }).is_err() {
            trace!("Outbound message dropped, no subscribers");
        }
    }

    pub fn broadcast(&self, msg: ServerMsg) {
        self.send(Audience::All, msg);
    }

    pub fn send_to(&self, participant_id: ParticipantId, msg: ServerMsg) {
        self.send(Audience::Only(participant_id), msg);
    }

    pub fn send_except(&self, participant_id: ParticipantId, msg: ServerMsg) {
        self.send(Audience::AllExcept(participant_id), msg);
    }
}

impl fmt::Debug for Outbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outbox")
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}

type Encoder<T> = Box<dyn Fn(&T) -> ServerMsg + Send + Sync>;

/// Value owned by the authoritative role; every effective write is broadcast
pub struct Authoritative<T> {
    value: T,
    outbox: Outbox,
    encode: Encoder<T>,
}

impl<T: Clone + PartialEq> Authoritative<T> {
    pub fn new<F>(value: T, outbox: Outbox, encode: F) -> Self
    where
        F: Fn(&T) -> ServerMsg + Send + Sync + 'static,
    {
        Self {
            value,
            outbox,
            encode: Box::new(encode),
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    /// Write and broadcast. Returns false (and sends nothing) when the value is unchanged.
    pub fn set(&mut self, value: T) -> bool {
        if self.value == value {
            return false;
        }
        self.value = value;
        self.outbox.broadcast((self.encode)(&self.value));
        true
    }

    /// Re-publish the current value without changing it
    pub fn rebroadcast(&self) {
        self.outbox.broadcast((self.encode)(&self.value));
    }
}

impl<T: fmt::Debug> fmt::Debug for Authoritative<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Authoritative").field(&self.value).finish()
    }
}

/// Read-only replica held by observers
#[derive(Debug, Clone, PartialEq)]
pub struct Mirror<T> {
    value: T,
}

impl<T> Mirror<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    /// Apply an inbound diff from the authority
    pub fn apply(&mut self, value: T) {
        self.value = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn write_broadcasts_only_on_change() {
        let outbox = Outbox::new(16);
        let mut rx = outbox.subscribe();
        let id = Uuid::new_v4();

        let mut health = Authoritative::new(10.0_f32, outbox, move |h| ServerMsg::HealthChanged {
            participant_id: id,
            health: *h,
        });

        assert!(!health.set(10.0));
        assert!(rx.try_recv().is_err());

        assert!(health.set(7.0));
        let envelope = rx.try_recv().expect("diff broadcast");
        assert_eq!(envelope.audience, Audience::All);
        assert_eq!(
            envelope.msg,
            ServerMsg::HealthChanged {
                participant_id: id,
                health: 7.0
            }
        );
    }

    #[test]
    fn mirror_follows_applied_diffs() {
        let mut mirror = Mirror::new(0_i64);
        mirror.apply(3);
        assert_eq!(*mirror.get(), 3);
    }

    #[test]
    fn outbox_without_subscribers_does_not_fail() {
        let outbox = Outbox::new(4);
        outbox.broadcast(ServerMsg::MatchStarted);
    }
}
