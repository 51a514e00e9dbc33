//! The signal vocabulary shared by the scheduler, the engine and components.
//!
//! Every signal carries a typed payload. Agronomic signals that can be
//! scheduled from an agromanagement file (`apply_n`, `apply_n_snomin`,
//! `irrigate`, `mowing`) are built from an [`EventParams`] table by the
//! signal bus crate; the remaining signals are produced by the kernel itself.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Keyword parameters attached to one scheduled event.
pub type EventParams = BTreeMap<String, f64>;

/// How a crop cycle begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropStartType {
    /// The simulation starts at sowing; emergence is simulated.
    Sowing,
    /// The simulation starts at emergence.
    Emergence,
}

/// How a crop cycle is scheduled to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropEndType {
    /// The crop ends at physiological maturity.
    Maturity,
    /// The crop ends at the harvest date.
    Harvest,
    /// The crop ends at maturity or harvest, whichever comes first.
    Earliest,
}

/// Why a crop cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishType {
    /// The harvest date of the crop calendar was reached.
    Harvest,
    /// The crop cycle hit its maximum duration.
    MaxDuration,
    /// The crop reached physiological maturity.
    Maturity,
    /// The crop died before completing its cycle.
    Death,
}

macro_rules! name_enum {
    ($ty:ty { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// Canonical lower-case name.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $name),+
                }
            }
        }

        impl core::fmt::Display for $ty {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl core::str::FromStr for $ty {
            type Err = UnknownName;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Self::$variant),)+
                    other => Err(UnknownName(other.to_owned())),
                }
            }
        }
    };
}

/// A name that does not match any variant of the target enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownName(pub String);

impl core::fmt::Display for UnknownName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "unknown name '{}'", self.0)
    }
}

impl std::error::Error for UnknownName {}

name_enum!(CropStartType { Sowing => "sowing", Emergence => "emergence" });
name_enum!(CropEndType { Maturity => "maturity", Harvest => "harvest", Earliest => "earliest" });
name_enum!(FinishType {
    Harvest => "harvest",
    MaxDuration => "max_duration",
    Maturity => "maturity",
    Death => "death",
});

/// The name of a signal, without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// A crop cycle starts.
    CropStart,
    /// A crop cycle ends.
    CropFinish,
    /// The whole run ends.
    Terminate,
    /// Snapshot the output variables.
    Output,
    /// Snapshot the summary variables.
    SummaryOutput,
    /// Mineral nitrogen application.
    ApplyN,
    /// Nitrogen application for the SNOMIN soil nitrogen model.
    ApplyNSnomin,
    /// Irrigation.
    Irrigate,
    /// Mowing of a grass sward.
    Mowing,
}

name_enum!(SignalKind {
    CropStart => "crop_start",
    CropFinish => "crop_finish",
    Terminate => "terminate",
    Output => "output",
    SummaryOutput => "summary_output",
    ApplyN => "apply_n",
    ApplyNSnomin => "apply_n_snomin",
    Irrigate => "irrigate",
    Mowing => "mowing",
});

/// Payload of an `apply_n_snomin` signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnominApplication {
    /// Amount of material applied (kg/ha).
    pub amount: f64,
    /// Depth of incorporation (cm).
    pub application_depth: f64,
    /// C:N ratio of the organic fraction.
    pub cnratio: f64,
    /// Initial apparent age of the organic material (y).
    pub initial_age: f64,
    /// Ammonium fraction.
    pub f_nh4n: f64,
    /// Nitrate fraction.
    pub f_no3n: f64,
    /// Organic matter fraction.
    pub f_orgmat: f64,
}

/// A signal with its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum Signal {
    /// A crop cycle starts.
    CropStart {
        /// Day of the start.
        day: NaiveDate,
        /// Crop name from the crop calendar.
        crop_name: String,
        /// Variety name from the crop calendar.
        variety_name: String,
        /// Sowing or emergence.
        crop_start_type: CropStartType,
        /// Scheduled end condition.
        crop_end_type: CropEndType,
    },
    /// A crop cycle ends.
    CropFinish {
        /// Day of the finish.
        day: NaiveDate,
        /// Reason the cycle ended.
        finish_type: FinishType,
        /// Whether the crop component must be unmounted.
        crop_delete: bool,
    },
    /// The whole run ends.
    Terminate,
    /// Snapshot the output variables.
    Output,
    /// Snapshot the summary variables.
    SummaryOutput,
    /// Mineral nitrogen application.
    ApplyN {
        /// Amount of N applied (kg/ha).
        n_amount: f64,
        /// Recovery fraction of the applied N.
        n_recovery: f64,
    },
    /// Nitrogen application for the SNOMIN soil nitrogen model.
    ApplyNSnomin(SnominApplication),
    /// Irrigation.
    Irrigate {
        /// Amount of water (cm).
        amount: f64,
        /// Application efficiency.
        efficiency: f64,
    },
    /// Mowing of a grass sward.
    Mowing {
        /// Biomass left on the field after mowing (kg/ha).
        biomass_remaining: f64,
    },
}

impl Signal {
    /// The kind of this signal.
    pub const fn kind(&self) -> SignalKind {
        match self {
            Self::CropStart { .. } => SignalKind::CropStart,
            Self::CropFinish { .. } => SignalKind::CropFinish,
            Self::Terminate => SignalKind::Terminate,
            Self::Output => SignalKind::Output,
            Self::SummaryOutput => SignalKind::SummaryOutput,
            Self::ApplyN { .. } => SignalKind::ApplyN,
            Self::ApplyNSnomin(_) => SignalKind::ApplyNSnomin,
            Self::Irrigate { .. } => SignalKind::Irrigate,
            Self::Mowing { .. } => SignalKind::Mowing,
        }
    }
}
