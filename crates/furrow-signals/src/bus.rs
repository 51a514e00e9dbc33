//! The run-scoped signal bus.
//!
//! One bus exists per simulation run and is scoped to that run's kiosk.
//! Participants connect with a [`SubscriberId`] to the [`SignalKind`]s they
//! handle. Senders queue a [`Signal`]; the owner of the run (the engine)
//! pumps the queue at fixed checkpoints with [`SignalBus::next_delivery`],
//! handing each signal to the subscribers connected at that moment. Signals
//! sent while a delivery is being handled are queued behind it and delivered
//! in the same pump, so delivery stays synchronous from the point of view of
//! the simulated day.
//!
//! Scoping is structural: a bus only ever delivers to subscribers connected
//! to it, and a subscriber can only connect with the kiosk id of its run.

use std::collections::{BTreeMap, VecDeque};

use furrow_types::{KioskId, Signal, SignalKind, SubscriberId};
use tracing::debug;

use crate::SignalError;

/// A signal paired with the subscribers it must reach.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// The signal with its payload.
    pub signal: Signal,
    /// Subscribers connected to the signal kind, in connection order.
    pub recipients: Vec<SubscriberId>,
}

/// Publish/subscribe bus for one simulation run.
#[derive(Debug)]
pub struct SignalBus {
    /// The kiosk that scopes this bus.
    kiosk: KioskId,
    /// Connected subscribers per signal kind, in connection order.
    subscribers: BTreeMap<SignalKind, Vec<SubscriberId>>,
    /// Signals sent but not yet delivered.
    pending: VecDeque<Signal>,
    /// Number of signals sent, per kind.
    sent: BTreeMap<SignalKind, u64>,
}

impl SignalBus {
    /// Create a bus scoped to the given kiosk.
    pub fn for_kiosk(kiosk: KioskId) -> Self {
        Self {
            kiosk,
            subscribers: BTreeMap::new(),
            pending: VecDeque::new(),
            sent: BTreeMap::new(),
        }
    }

    /// The kiosk this bus is scoped to.
    pub const fn kiosk(&self) -> KioskId {
        self.kiosk
    }

    /// Connect `subscriber` to `kind`.
    ///
    /// Connecting twice to the same kind is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::ForeignKiosk`] if `kiosk` is not the kiosk of
    /// this bus.
    pub fn connect(
        &mut self,
        kiosk: KioskId,
        subscriber: SubscriberId,
        kind: SignalKind,
    ) -> Result<(), SignalError> {
        if kiosk != self.kiosk {
            return Err(SignalError::ForeignKiosk {
                expected: self.kiosk,
                found: kiosk,
            });
        }
        let list = self.subscribers.entry(kind).or_default();
        if !list.contains(&subscriber) {
            list.push(subscriber);
        }
        Ok(())
    }

    /// Connect `subscriber` to every kind in `kinds`.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::ForeignKiosk`] if `kiosk` is not the kiosk of
    /// this bus.
    pub fn connect_all(
        &mut self,
        kiosk: KioskId,
        subscriber: SubscriberId,
        kinds: &[SignalKind],
    ) -> Result<(), SignalError> {
        for kind in kinds {
            self.connect(kiosk, subscriber, *kind)?;
        }
        Ok(())
    }

    /// Disconnect `subscriber` from `kind`.
    pub fn disconnect(&mut self, subscriber: SubscriberId, kind: SignalKind) {
        if let Some(list) = self.subscribers.get_mut(&kind) {
            list.retain(|s| *s != subscriber);
        }
    }

    /// Disconnect `subscriber` from every kind.
    pub fn disconnect_all(&mut self, subscriber: SubscriberId) {
        for list in self.subscribers.values_mut() {
            list.retain(|s| *s != subscriber);
        }
    }

    /// Whether `subscriber` is connected to `kind`.
    pub fn is_connected(&self, subscriber: SubscriberId, kind: SignalKind) -> bool {
        self.subscribers
            .get(&kind)
            .is_some_and(|list| list.contains(&subscriber))
    }

    /// Subscribers connected to `kind`.
    pub fn subscribers(&self, kind: SignalKind) -> &[SubscriberId] {
        self.subscribers
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Queue `signal` for delivery.
    pub fn send(&mut self, signal: Signal) {
        let kind = signal.kind();
        debug!(
            signal = %kind,
            receivers = self.subscribers(kind).len(),
            "Signal sent"
        );
        let count = self.sent.entry(kind).or_insert(0);
        *count = count.saturating_add(1);
        self.pending.push_back(signal);
    }

    /// Take the oldest queued signal together with its current recipients.
    pub fn next_delivery(&mut self) -> Option<Delivery> {
        let signal = self.pending.pop_front()?;
        let recipients = self.subscribers(signal.kind()).to_vec();
        Some(Delivery { signal, recipients })
    }

    /// Whether signals are waiting for delivery.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Number of `kind` signals sent since the bus was created.
    pub fn sent_count(&self, kind: SignalKind) -> u64 {
        self.sent.get(&kind).copied().unwrap_or(0)
    }
}
