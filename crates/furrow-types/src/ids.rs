//! Type-safe identifier wrappers around [`Uuid`].
//!
//! The kernel never identifies a participant by memory address. Every
//! container that writes to the kiosk carries an [`OwnerId`], every kiosk
//! carries a [`KioskId`] that scopes its signal bus, and every signal
//! subscriber carries a [`SubscriberId`]. All IDs use UUID v7.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

define_id! {
    /// Identity of a state or rate container writing to the kiosk.
    OwnerId
}

define_id! {
    /// Identity of one variable kiosk, and therefore of one simulation run.
    KioskId
}

define_id! {
    /// Identity of a participant connected to a signal bus.
    SubscriberId
}
