//! Error types for the `furrow-signals` crate.

use furrow_types::{KioskId, SignalKind};

/// Errors raised while wiring the bus or building signal payloads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalError {
    /// A subscriber tried to connect to the bus of another run.
    #[error("subscriber belongs to kiosk {found}, bus is scoped to kiosk {expected}")]
    ForeignKiosk {
        /// The kiosk the bus is scoped to.
        expected: KioskId,
        /// The kiosk of the subscriber.
        found: KioskId,
    },

    /// The signal is produced by the kernel and cannot be scheduled.
    #[error("signal '{signal}' cannot be scheduled as an agromanagement event")]
    NotSchedulable {
        /// The signal kind.
        signal: SignalKind,
    },

    /// A required payload parameter is absent.
    #[error("signal '{signal}' requires parameter '{name}'")]
    MissingParameter {
        /// The signal kind.
        signal: SignalKind,
        /// The missing parameter name.
        name: String,
    },

    /// A parameter does not belong to the signal payload.
    #[error("signal '{signal}' does not accept parameter '{name}'")]
    UnknownParameter {
        /// The signal kind.
        signal: SignalKind,
        /// The unexpected parameter name.
        name: String,
    },
}
