use metrics::{counter, gauge};
use shared::models::{Message, PresenceUpdate, ServerEvent};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::presence::SharedPresenceRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Receiver had no open connection. The message stays in storage.
    Offline,
    /// The write failed and the receiver's entry was removed.
    Evicted,
}

impl DeliveryOutcome {
    fn label(self) -> &'static str {
        match self {
            DeliveryOutcome::Delivered => "delivered",
            DeliveryOutcome::Offline => "offline",
            DeliveryOutcome::Evicted => "evicted",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Online set that was sent, sorted.
    pub online: Vec<Uuid>,
    pub delivered: usize,
    pub evicted: Vec<Uuid>,
}

/// Pushes new messages and presence changes to connected peers.
///
/// Writes never block: a peer whose queue is full or closed is evicted and the
/// failure is not surfaced to the caller. Every eviction is followed by a
/// presence broadcast, so the rest of the room learns about it without waiting
/// for the evicted connection to wind down.
#[derive(Debug, Clone)]
pub struct DeliveryDispatcher {
    presence: SharedPresenceRegistry,
}

impl DeliveryDispatcher {
    pub fn new(presence: SharedPresenceRegistry) -> Self {
        Self { presence }
    }

    pub fn presence(&self) -> &SharedPresenceRegistry {
        &self.presence
    }

    #[instrument(name = "dispatch.notify", skip(self, message), fields(message_id = %message.id))]
    pub async fn notify(&self, receiver_id: Uuid, message: &Message) -> DeliveryOutcome {
        let outcome = match self.presence.channel_for(receiver_id).await {
            None => DeliveryOutcome::Offline,
            Some(channel) => match channel.deliver(ServerEvent::from(message.view())) {
                Ok(()) => DeliveryOutcome::Delivered,
                Err(err) => {
                    warn!(user_id = %receiver_id, error = %err, "message push failed");
                    if self.evict(receiver_id, channel.connection_id()).await {
                        self.broadcast_presence().await;
                    }
                    DeliveryOutcome::Evicted
                }
            },
        };

        counter!("parley_deliveries_total", "outcome" => outcome.label()).increment(1);
        debug!(user_id = %receiver_id, outcome = outcome.label(), "message dispatched");
        outcome
    }

    /// Sends the current online set to every connected peer.
    ///
    /// The fan-out runs under one read guard; failed peers are collected and
    /// evicted afterwards so one bad connection never aborts the broadcast.
    /// Evictions shrink the online set, so the survivors get another round
    /// until one completes cleanly. `online` and `delivered` describe that
    /// last round.
    #[instrument(name = "dispatch.broadcast_presence", skip(self))]
    pub async fn broadcast_presence(&self) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        loop {
            let mut delivered = 0;
            let mut failed = Vec::new();

            {
                let peers = self.presence.read().await;
                let mut online: Vec<Uuid> = peers.keys().copied().collect();
                online.sort_unstable();
                let event = ServerEvent::from(PresenceUpdate::online_users(online.clone()));

                for (user_id, channel) in peers.iter() {
                    match channel.deliver(event.clone()) {
                        Ok(()) => delivered += 1,
                        Err(err) => {
                            warn!(user_id = %user_id, error = %err, "presence push failed");
                            failed.push((*user_id, channel.connection_id()));
                        }
                    }
                }
                report.online = online;
                report.delivered = delivered;
            }

            counter!("parley_presence_broadcasts_total").increment(1);

            let mut evicted_any = false;
            for (user_id, connection_id) in failed {
                if self.evict(user_id, connection_id).await {
                    report.evicted.push(user_id);
                    evicted_any = true;
                }
            }
            if !evicted_any {
                break;
            }
        }

        #[allow(clippy::cast_precision_loss)]
        gauge!("parley_online_users").set(self.presence.len().await as f64);
        report
    }

    async fn evict(&self, user_id: Uuid, connection_id: Uuid) -> bool {
        let removed = self
            .presence
            .disconnect_connection(user_id, connection_id)
            .await;
        if removed {
            counter!("parley_presence_evictions_total").increment(1);
            debug!(%user_id, %connection_id, "evicted stale peer");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::presence::{PeerChannel, PresenceRegistry};
    use shared::models::{PresenceEventKind, Timestamp};
    use std::sync::Arc;

    fn dispatcher() -> DeliveryDispatcher {
        DeliveryDispatcher::new(Arc::new(PresenceRegistry::new()))
    }

    fn message(sender_id: Uuid) -> Message {
        let now = Timestamp::now();
        Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            sender_id,
            body: "hi".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn notify_connected_receiver_writes_once() {
        let dispatcher = dispatcher();
        let bob = Uuid::new_v4();
        let (channel, mut rx) = PeerChannel::bounded(4);
        dispatcher.presence().connect(bob, channel).await;

        let sent = message(Uuid::new_v4());
        assert_eq!(
            dispatcher.notify(bob, &sent).await,
            DeliveryOutcome::Delivered
        );

        match rx.try_recv().unwrap() {
            ServerEvent::NewMessage(view) => {
                assert_eq!(view.id, sent.id);
                assert_eq!(view.body, "hi");
                assert_eq!(view.sender_id, sent.sender_id);
                assert_eq!(view.created_at, sent.created_at);
            }
            other @ ServerEvent::Presence(_) => panic!("unexpected event {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn notify_absent_receiver_is_silent() {
        let dispatcher = dispatcher();
        let outcome = dispatcher.notify(Uuid::new_v4(), &message(Uuid::new_v4())).await;
        assert_eq!(outcome, DeliveryOutcome::Offline);
    }

    #[tokio::test]
    async fn notify_failure_evicts_only_receiver() {
        let dispatcher = dispatcher();
        let bob = Uuid::new_v4();
        let carol = Uuid::new_v4();
        let (bob_channel, bob_rx) = PeerChannel::bounded(4);
        let (carol_channel, _carol_rx) = PeerChannel::bounded(4);
        dispatcher.presence().connect(bob, bob_channel).await;
        dispatcher.presence().connect(carol, carol_channel).await;
        drop(bob_rx);

        let outcome = dispatcher.notify(bob, &message(Uuid::new_v4())).await;

        assert_eq!(outcome, DeliveryOutcome::Evicted);
        assert_eq!(dispatcher.presence().snapshot().await, vec![carol]);
    }

    #[tokio::test]
    async fn eviction_on_notify_announces_new_online_set() {
        let dispatcher = dispatcher();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let (alice_channel, mut alice_rx) = PeerChannel::bounded(4);
        let (bob_channel, _bob_rx) = PeerChannel::bounded(1);
        dispatcher.presence().connect(alice, alice_channel).await;
        dispatcher.presence().connect(bob, bob_channel).await;

        assert_eq!(
            dispatcher.notify(bob, &message(alice)).await,
            DeliveryOutcome::Delivered
        );
        assert_eq!(
            dispatcher.notify(bob, &message(alice)).await,
            DeliveryOutcome::Evicted
        );

        match alice_rx.try_recv().unwrap() {
            ServerEvent::Presence(update) => assert_eq!(update.content, vec![alice]),
            other @ ServerEvent::NewMessage(_) => panic!("unexpected event {other:?}"),
        }
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn offline_receiver_triggers_no_broadcast() {
        let dispatcher = dispatcher();
        let alice = Uuid::new_v4();
        let (alice_channel, mut alice_rx) = PeerChannel::bounded(4);
        dispatcher.presence().connect(alice, alice_channel).await;

        let outcome = dispatcher.notify(Uuid::new_v4(), &message(alice)).await;

        assert_eq!(outcome, DeliveryOutcome::Offline);
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_counts_as_failed_write() {
        let dispatcher = dispatcher();
        let bob = Uuid::new_v4();
        let (channel, _rx) = PeerChannel::bounded(1);
        dispatcher.presence().connect(bob, channel).await;

        let first = dispatcher.notify(bob, &message(Uuid::new_v4())).await;
        let second = dispatcher.notify(bob, &message(Uuid::new_v4())).await;

        assert_eq!(first, DeliveryOutcome::Delivered);
        assert_eq!(second, DeliveryOutcome::Evicted);
        assert!(dispatcher.presence().is_empty().await);
    }

    #[tokio::test]
    async fn broadcast_sends_online_set_to_everyone() {
        let dispatcher = dispatcher();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let (alice_channel, mut alice_rx) = PeerChannel::bounded(4);
        let (bob_channel, mut bob_rx) = PeerChannel::bounded(4);
        dispatcher.presence().connect(alice, alice_channel).await;
        dispatcher.presence().connect(bob, bob_channel).await;

        let report = dispatcher.broadcast_presence().await;

        let mut expected = vec![alice, bob];
        expected.sort_unstable();
        assert_eq!(report.online, expected);
        assert_eq!(report.delivered, 2);
        assert!(report.evicted.is_empty());

        for rx in [&mut alice_rx, &mut bob_rx] {
            match rx.try_recv().unwrap() {
                ServerEvent::Presence(update) => {
                    assert_eq!(update.kind, PresenceEventKind::OnlineUsers);
                    assert_eq!(update.content, expected);
                }
                other @ ServerEvent::NewMessage(_) => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn broadcast_evicts_failed_peer_and_continues() {
        let dispatcher = dispatcher();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let carol = Uuid::new_v4();
        let (alice_channel, mut alice_rx) = PeerChannel::bounded(4);
        let (bob_channel, bob_rx) = PeerChannel::bounded(4);
        let (carol_channel, mut carol_rx) = PeerChannel::bounded(4);
        dispatcher.presence().connect(alice, alice_channel).await;
        dispatcher.presence().connect(bob, bob_channel).await;
        dispatcher.presence().connect(carol, carol_channel).await;
        drop(bob_rx);

        let report = dispatcher.broadcast_presence().await;

        let mut everyone = vec![alice, bob, carol];
        everyone.sort_unstable();
        let mut remaining = vec![alice, carol];
        remaining.sort_unstable();

        assert_eq!(report.delivered, 2);
        assert_eq!(report.evicted, vec![bob]);
        assert_eq!(report.online, remaining);

        for rx in [&mut alice_rx, &mut carol_rx] {
            let frames: Vec<Vec<Uuid>> = std::iter::from_fn(|| rx.try_recv().ok())
                .map(|event| match event {
                    ServerEvent::Presence(update) => update.content,
                    other @ ServerEvent::NewMessage(_) => panic!("unexpected event {other:?}"),
                })
                .collect();
            assert_eq!(frames, vec![everyone.clone(), remaining.clone()]);
        }

        assert_eq!(dispatcher.presence().snapshot().await, remaining);
    }

    #[tokio::test]
    async fn broadcast_with_nobody_online_is_a_no_op() {
        let report = dispatcher().broadcast_presence().await;
        assert_eq!(report, BroadcastReport::default());
    }
}
