//! Agromanagement definitions as read from YAML.
//!
//! An agromanagement definition is an ordered list of campaigns. Each list
//! item is a single-key map from the campaign start date to its content:
//!
//! ```yaml
//! AgroManagement:
//! - 2000-01-01:
//!     CropCalendar:
//!         crop_name: wheat
//!         variety_name: winter-wheat
//!         crop_start_date: 2000-03-01
//!         crop_start_type: sowing
//!         crop_end_date: 2000-06-01
//!         crop_end_type: harvest
//!         max_duration: 200
//!     TimedEvents:
//!     -   event_signal: irrigate
//!         name: Timed irrigation events
//!         events_table:
//!         - 2000-04-01: {irrigation_amount: 2.0}
//!     StateEvents:
//! - 2000-09-01:
//! ```
//!
//! The top-level `AgroManagement` key is optional. A campaign whose three
//! entries are all null, or whose value is null, is an empty campaign.

use std::marker::PhantomData;
use std::path::Path;

use chrono::NaiveDate;
use furrow_types::{CropEndType, CropStartType, EventParams};
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};

use crate::AgroError;
use crate::state_events::ZeroCondition;

/// A map with exactly one entry, used for list items keyed by a date or a
/// threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SingleEntry<K, V> {
    /// The entry key.
    pub key: K,
    /// The entry value.
    pub value: V,
}

impl<'de, K, V> Deserialize<'de> for SingleEntry<K, V>
where
    K: Deserialize<'de>,
    V: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SingleEntryVisitor<K, V>(PhantomData<(K, V)>);

        impl<'de, K, V> Visitor<'de> for SingleEntryVisitor<K, V>
        where
            K: Deserialize<'de>,
            V: Deserialize<'de>,
        {
            type Value = SingleEntry<K, V>;

            fn expecting(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str("a map with exactly one entry")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let Some((key, value)) = map.next_entry::<K, V>()? else {
                    return Err(de::Error::invalid_length(0, &self));
                };
                if map.next_key::<de::IgnoredAny>()?.is_some() {
                    return Err(de::Error::invalid_length(2, &self));
                }
                Ok(SingleEntry { key, value })
            }
        }

        deserializer.deserialize_map(SingleEntryVisitor(PhantomData))
    }
}

/// A state-event threshold: a number, possibly written as a string key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Threshold(pub f64);

impl<'de> Deserialize<'de> for Threshold {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ThresholdVisitor;

        impl Visitor<'_> for ThresholdVisitor {
            type Value = Threshold;

            fn expecting(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str("a numeric threshold")
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Threshold, E> {
                Ok(Threshold(v))
            }

            #[allow(clippy::cast_precision_loss)]
            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Threshold, E> {
                Ok(Threshold(v as f64))
            }

            #[allow(clippy::cast_precision_loss)]
            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Threshold, E> {
                Ok(Threshold(v as f64))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Threshold, E> {
                v.trim()
                    .parse::<f64>()
                    .map(Threshold)
                    .map_err(|e| de::Error::custom(format!("invalid threshold '{v}': {e}")))
            }
        }

        deserializer.deserialize_any(ThresholdVisitor)
    }
}

/// Crop calendar of one campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropCalendarDef {
    /// Crop name, used to select crop parameters.
    pub crop_name: String,
    /// Variety name, used to select crop parameters.
    pub variety_name: String,
    /// Day the crop cycle starts.
    pub crop_start_date: NaiveDate,
    /// Sowing or emergence.
    pub crop_start_type: CropStartType,
    /// Harvest date; required for `harvest` and `earliest`.
    #[serde(default)]
    pub crop_end_date: Option<NaiveDate>,
    /// Scheduled end condition.
    pub crop_end_type: CropEndType,
    /// Maximum length of the crop cycle in days.
    pub max_duration: u32,
}

/// A table of events keyed by date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedEventDef {
    /// Name of the signal dispatched for each event.
    pub event_signal: String,
    /// Table name, used in log messages.
    #[serde(default)]
    pub name: String,
    /// Free comment.
    #[serde(default)]
    pub comment: String,
    /// One single-entry map per event: date to signal parameters.
    pub events_table: Vec<SingleEntry<NaiveDate, Option<EventParams>>>,
}

/// A table of events keyed by the value of a model state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEventDef {
    /// Name of the signal dispatched for each event.
    pub event_signal: String,
    /// Name of the published state variable that triggers the events.
    pub event_state: String,
    /// Direction of the zero crossing that triggers an event.
    pub zero_condition: ZeroCondition,
    /// Table name, used in log messages.
    #[serde(default)]
    pub name: String,
    /// Free comment.
    #[serde(default)]
    pub comment: String,
    /// One single-entry map per event: threshold to signal parameters.
    pub events_table: Vec<SingleEntry<Threshold, Option<EventParams>>>,
}

/// Content of one campaign.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignDef {
    /// Crop calendar, if a crop is grown.
    #[serde(rename = "CropCalendar", default)]
    pub crop_calendar: Option<CropCalendarDef>,
    /// Timed event tables.
    #[serde(rename = "TimedEvents", default)]
    pub timed_events: Option<Vec<TimedEventDef>>,
    /// State event tables.
    #[serde(rename = "StateEvents", default)]
    pub state_events: Option<Vec<StateEventDef>>,
}

impl CampaignDef {
    /// Whether the campaign defines nothing at all.
    pub const fn is_empty(&self) -> bool {
        self.crop_calendar.is_none() && self.timed_events.is_none() && self.state_events.is_none()
    }
}

/// One list item: campaign start date to campaign content.
pub type CampaignEntry = SingleEntry<NaiveDate, Option<CampaignDef>>;

#[derive(Deserialize)]
#[serde(untagged)]
enum AgroFile {
    Wrapped {
        #[serde(rename = "AgroManagement")]
        agro_management: Vec<CampaignEntry>,
    },
    Bare(Vec<CampaignEntry>),
}

/// The full agromanagement definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AgroManagementDef {
    /// Campaigns in file order.
    pub campaigns: Vec<CampaignEntry>,
}

impl<'de> Deserialize<'de> for AgroManagementDef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let campaigns = match AgroFile::deserialize(deserializer)? {
            AgroFile::Wrapped { agro_management } => agro_management,
            AgroFile::Bare(list) => list,
        };
        Ok(Self { campaigns })
    }
}

impl AgroManagementDef {
    /// Load an agromanagement definition from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`AgroError::Io`] if the file cannot be read, or
    /// [`AgroError::Yaml`] if the content is not a valid definition.
    pub fn from_file(path: &Path) -> Result<Self, AgroError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse an agromanagement definition from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`AgroError::Yaml`] if the string is not a valid definition.
    pub fn parse(yaml: &str) -> Result<Self, AgroError> {
        let def: Self = serde_yml::from_str(yaml)?;
        Ok(def)
    }
}
