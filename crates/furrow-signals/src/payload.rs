//! Building typed signals from agromanagement event parameters.
//!
//! Timed and state events carry a flat table of numeric parameters. The
//! table is turned into a typed [`Signal`] once, when the event table is
//! built, so a malformed event is a configuration error rather than a
//! surprise on the day it fires.

use furrow_types::{EventParams, Signal, SignalKind, SnominApplication};

use crate::SignalError;

/// Default irrigation efficiency when the event does not specify one.
pub const DEFAULT_IRRIGATION_EFFICIENCY: f64 = 1.0;

/// Parameter reader that tracks which keys were consumed.
struct Params<'a> {
    signal: SignalKind,
    params: &'a EventParams,
    used: Vec<&'a str>,
}

impl<'a> Params<'a> {
    const fn new(signal: SignalKind, params: &'a EventParams) -> Self {
        Self {
            signal,
            params,
            used: Vec::new(),
        }
    }

    /// First present key among `names`.
    fn optional(&mut self, names: &[&str]) -> Option<f64> {
        for name in names {
            if let Some((key, value)) = self.params.get_key_value(*name) {
                self.used.push(key.as_str());
                return Some(*value);
            }
        }
        None
    }

    fn required(&mut self, names: &[&str]) -> Result<f64, SignalError> {
        self.optional(names)
            .ok_or_else(|| SignalError::MissingParameter {
                signal: self.signal,
                name: names.first().copied().unwrap_or_default().to_owned(),
            })
    }

    /// Reject any key that no accessor consumed.
    fn finish(self) -> Result<(), SignalError> {
        match self
            .params
            .keys()
            .find(|key| !self.used.contains(&key.as_str()))
        {
            Some(key) => Err(SignalError::UnknownParameter {
                signal: self.signal,
                name: key.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Build the typed signal for a scheduled event.
///
/// Accepted parameters per signal:
///
/// - `apply_n`: `N_amount` (or `amount`), `N_recovery` (or `recovery`)
/// - `apply_n_snomin`: `amount`, `application_depth`, `cnratio`,
///   `initial_age`, `f_NH4N`, `f_NO3N`, `f_orgmat`
/// - `irrigate`: `amount` (or `irrigation_amount`), optional `efficiency`
///   defaulting to [`DEFAULT_IRRIGATION_EFFICIENCY`]
/// - `mowing`: `biomass_remaining`
/// - `output`, `summary_output`: no parameters
///
/// # Errors
///
/// Returns [`SignalError::NotSchedulable`] for signals produced by the
/// kernel itself, and [`SignalError::MissingParameter`] or
/// [`SignalError::UnknownParameter`] when `params` does not match the
/// payload.
pub fn build_signal(kind: SignalKind, params: &EventParams) -> Result<Signal, SignalError> {
    let mut p = Params::new(kind, params);
    let signal = match kind {
        SignalKind::ApplyN => Signal::ApplyN {
            n_amount: p.required(&["N_amount", "amount"])?,
            n_recovery: p.required(&["N_recovery", "recovery"])?,
        },
        SignalKind::ApplyNSnomin => Signal::ApplyNSnomin(SnominApplication {
            amount: p.required(&["amount"])?,
            application_depth: p.required(&["application_depth"])?,
            cnratio: p.required(&["cnratio"])?,
            initial_age: p.required(&["initial_age"])?,
            f_nh4n: p.required(&["f_NH4N"])?,
            f_no3n: p.required(&["f_NO3N"])?,
            f_orgmat: p.required(&["f_orgmat"])?,
        }),
        SignalKind::Irrigate => Signal::Irrigate {
            amount: p.required(&["amount", "irrigation_amount"])?,
            efficiency: p
                .optional(&["efficiency"])
                .unwrap_or(DEFAULT_IRRIGATION_EFFICIENCY),
        },
        SignalKind::Mowing => Signal::Mowing {
            biomass_remaining: p.required(&["biomass_remaining"])?,
        },
        SignalKind::Output => Signal::Output,
        SignalKind::SummaryOutput => Signal::SummaryOutput,
        SignalKind::CropStart | SignalKind::CropFinish | SignalKind::Terminate => {
            return Err(SignalError::NotSchedulable { signal: kind });
        }
    };
    p.finish()?;
    Ok(signal)
}
