//! Error types for the `furrow-agro` crate.
//!
//! All variants are configuration errors detected while building the
//! agromanagement schedule, except [`AgroError::NonNumericState`] which is
//! raised while evaluating state events.

use chrono::NaiveDate;
use furrow_signals::SignalError;
use furrow_types::CropEndType;

/// Errors raised while loading, building or running agromanagement.
#[derive(Debug, thiserror::Error)]
pub enum AgroError {
    /// Campaign start dates are not strictly increasing.
    #[error("the agricultural campaigns are not sequential: {date} does not follow {previous}")]
    CampaignsNotSequential {
        /// The offending campaign start date.
        date: NaiveDate,
        /// The start date of the campaign before it.
        previous: NaiveDate,
    },

    /// No campaign provides a crop calendar or timed events.
    #[error("empty agromanagement definition: no campaigns with crop calendars or timed events provided")]
    EmptyDefinition,

    /// The last campaign has state events but no trailing empty campaign.
    #[error(
        "the last campaign with start date {start} contains StateEvents; the end date must be given by a trailing empty campaign"
    )]
    StateEventsWithoutEndDate {
        /// Start date of the last campaign.
        start: NaiveDate,
    },

    /// A harvest or earliest crop calendar has no end date.
    #[error("crop calendar for '{crop}' has end type '{end_type}' but no crop_end_date")]
    MissingCropEndDate {
        /// The crop name.
        crop: String,
        /// The configured end type.
        end_type: CropEndType,
    },

    /// The crop end date is not after the crop start date.
    #[error("crop_end_date ({end}) before or equal to crop_start_date ({start}) for crop '{crop}'")]
    CropEndBeforeStart {
        /// The crop name.
        crop: String,
        /// The crop start date.
        start: NaiveDate,
        /// The effective crop end date.
        end: NaiveDate,
    },

    /// The crop start date lies outside its campaign window.
    #[error(
        "start date ({start}) for crop '{crop}' variety '{variety}' not within campaign window ({campaign_start} - {next:?})"
    )]
    CropStartOutsideCampaign {
        /// The crop name.
        crop: String,
        /// The variety name.
        variety: String,
        /// The crop start date.
        start: NaiveDate,
        /// Start of the campaign.
        campaign_start: NaiveDate,
        /// Start of the next campaign, if any.
        next: Option<NaiveDate>,
    },

    /// A timed event lies outside its campaign window.
    #[error("timed event at day {day} not in campaign interval ({campaign_start} - {next:?})")]
    TimedEventOutsideCampaign {
        /// The event date.
        day: NaiveDate,
        /// Start of the campaign.
        campaign_start: NaiveDate,
        /// Start of the next campaign, if any.
        next: Option<NaiveDate>,
    },

    /// An events table has more than one event on the same date.
    #[error("found days with more than 1 event for events table '{table}' on days: {days:?}")]
    DuplicateEventDates {
        /// Name of the events table.
        table: String,
        /// The duplicated dates.
        days: Vec<NaiveDate>,
    },

    /// An events table has more than one event for the same threshold.
    #[error("found states with more than 1 event for events table '{table}' for state: {states:?}")]
    DuplicateEventStates {
        /// Name of the events table.
        table: String,
        /// The duplicated thresholds.
        states: Vec<f64>,
    },

    /// The event signal name is not part of the signal vocabulary.
    #[error("signal '{name}' not defined")]
    UnknownSignal {
        /// The unknown name.
        name: String,
    },

    /// A date computed from a start date and a duration is not representable.
    #[error("date overflow computing {start} + {days} days")]
    DateOverflow {
        /// The start date.
        start: NaiveDate,
        /// The number of days added.
        days: u32,
    },

    /// The observed state variable holds a non-numeric value.
    #[error("state variable '{name}' observed by a state event is not numeric")]
    NonNumericState {
        /// The variable name.
        name: String,
    },

    /// An event's parameters do not form a valid signal payload.
    #[error("invalid event: {source}")]
    Signal {
        /// The underlying signal error.
        #[from]
        source: SignalError,
    },

    /// Failed to read an agromanagement file from disk.
    #[error("failed to read agromanagement file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse agromanagement YAML.
    #[error("failed to parse agromanagement YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for AgroError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}
