//! Shared type definitions for the Furrow simulation kernel.
//!
//! This crate is the single source of truth for the vocabulary used across
//! the workspace: variable values, identifiers and signals.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for owners, kiosks and subscribers
//! - [`value`] -- Variable values, their declared kinds and state/rate kinds
//! - [`signal`] -- Signal names, typed payloads and crop cycle enums

pub mod ids;
pub mod signal;
pub mod value;

pub use ids::{KioskId, OwnerId, SubscriberId};
pub use signal::{
    CropEndType, CropStartType, EventParams, FinishType, Signal, SignalKind, SnominApplication,
    UnknownName,
};
pub use value::{Value, ValueKind, VarKind};
