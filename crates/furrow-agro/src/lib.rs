//! Agromanagement for the Furrow simulation kernel.
//!
//! Decides on which simulated day agronomic actions happen: sowing and
//! harvest through crop calendars, fertilization, irrigation and mowing
//! through timed events (fixed dates) and state events (thresholds on a
//! published model state).
//!
//! # Modules
//!
//! - [`definition`] -- Agromanagement YAML definitions
//! - [`calendar`] -- [`CropCalendar`] and campaign window checks
//! - [`timed`] -- [`TimedEventDispatcher`]
//! - [`state_events`] -- [`StateEventDispatcher`] and zero-crossing detection
//! - [`manager`] -- [`AgroManager`]: campaign sequencing and run termination
//! - [`error`] -- [`AgroError`]

pub mod calendar;
pub mod definition;
pub mod error;
pub mod manager;
pub mod state_events;
pub mod timed;

pub use calendar::{CropCalendar, check_date_range};
pub use definition::{
    AgroManagementDef, CampaignDef, CampaignEntry, CropCalendarDef, SingleEntry, StateEventDef,
    Threshold, TimedEventDef,
};
pub use error::AgroError;
pub use manager::{AGROMANAGER_SIGNALS, AgroManager, Campaign};
pub use state_events::{StateEventDispatcher, ZeroCondition, crossing_sign};
pub use timed::TimedEventDispatcher;
