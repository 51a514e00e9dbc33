//! Mass balance verification for components.
//!
//! A component that tracks a conserved quantity checks at the end of its
//! life that everything that came in either went out or is still stored:
//!
//! ```text
//! checksum = inputs - outputs - storage_change
//! ```
//!
//! A checksum larger than the tolerance in absolute value aborts the run.

use chrono::NaiveDate;
use tracing::debug;

/// Tolerance used by the reference water balance (cm).
pub const WATER_BALANCE_TOLERANCE: f64 = 0.0001;

/// The conserved quantity being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceKind {
    /// Carbon or biomass.
    Carbon,
    /// Water.
    Water,
    /// Nitrogen, phosphorus or potassium.
    Nutrient,
}

impl core::fmt::Display for BalanceKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Carbon => f.write_str("carbon"),
            Self::Water => f.write_str("water"),
            Self::Nutrient => f.write_str("nutrient"),
        }
    }
}

/// A balance that failed to close.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error(
    "{kind} balance of '{component}' does not close on {day}: checksum {checksum} \
     (inputs {inputs}, outputs {outputs}, storage change {storage_change})"
)]
pub struct BalanceError {
    /// The checked quantity.
    pub kind: BalanceKind,
    /// The component that owns the balance.
    pub component: String,
    /// Day of the check.
    pub day: NaiveDate,
    /// `inputs - outputs - storage_change`.
    pub checksum: f64,
    /// Total inputs.
    pub inputs: f64,
    /// Total outputs.
    pub outputs: f64,
    /// Change in storage.
    pub storage_change: f64,
}

/// One balance check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Balance<'a> {
    /// The checked quantity.
    pub kind: BalanceKind,
    /// The component that owns the balance.
    pub component: &'a str,
    /// Total inputs.
    pub inputs: f64,
    /// Total outputs.
    pub outputs: f64,
    /// Change in storage.
    pub storage_change: f64,
}

impl Balance<'_> {
    /// `inputs - outputs - storage_change`.
    pub const fn checksum(&self) -> f64 {
        self.inputs - self.outputs - self.storage_change
    }
}

/// Verify that `balance` closes within `tolerance`.
///
/// # Errors
///
/// Returns [`BalanceError`] if `|checksum| > tolerance`.
pub fn check_balance(balance: &Balance<'_>, day: NaiveDate, tolerance: f64) -> Result<(), BalanceError> {
    let checksum = balance.checksum();
    if checksum.abs() > tolerance {
        return Err(BalanceError {
            kind: balance.kind,
            component: balance.component.to_owned(),
            day,
            checksum,
            inputs: balance.inputs,
            outputs: balance.outputs,
            storage_change: balance.storage_change,
        });
    }
    debug!(
        kind = %balance.kind,
        component = balance.component,
        %day,
        checksum,
        "Balance closed"
    );
    Ok(())
}
