//! State events: signals dispatched when a published state crosses a
//! threshold.
//!
//! Each row of the events table tracks the sign of
//! `observed - threshold` from the previous evaluation. An event fires when
//! that sign changes in the configured direction, including reaching zero
//! exactly. The first evaluation of a row only records the sign.

use core::cmp::Ordering;

use chrono::NaiveDate;
use furrow_kiosk::VariableKiosk;
use furrow_signals::{SignalBus, build_signal};
use furrow_types::{Signal, SignalKind};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::AgroError;
use crate::definition::StateEventDef;

/// Direction of the zero crossing that triggers an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZeroCondition {
    /// From negative to zero or positive.
    Rising,
    /// From positive to zero or negative.
    Falling,
    /// Either of the above.
    Either,
}

impl ZeroCondition {
    /// Whether moving from `previous` to `current` fires an event.
    pub fn fires(self, previous: Ordering, current: Ordering) -> bool {
        let rising = previous == Ordering::Less && current != Ordering::Less;
        let falling = previous == Ordering::Greater && current != Ordering::Greater;
        match self {
            Self::Rising => rising,
            Self::Falling => falling,
            Self::Either => rising || falling,
        }
    }
}

/// Sign of `value - threshold`; NaN compares as zero.
pub fn crossing_sign(value: f64, threshold: f64) -> Ordering {
    (value - threshold)
        .partial_cmp(&0.0)
        .unwrap_or(Ordering::Equal)
}

#[derive(Debug, Clone)]
struct StateEventRow {
    threshold: f64,
    signal: Signal,
    previous_sign: Option<Ordering>,
}

/// Dispatches one signal kind when a published state crosses thresholds.
#[derive(Debug, Clone)]
pub struct StateEventDispatcher {
    signal: SignalKind,
    event_state: String,
    zero_condition: ZeroCondition,
    name: String,
    comment: String,
    rows: Vec<StateEventRow>,
}

impl StateEventDispatcher {
    /// Build a dispatcher from its definition.
    ///
    /// # Errors
    ///
    /// Returns [`AgroError::UnknownSignal`] for an unknown signal name,
    /// [`AgroError::DuplicateEventStates`] when a threshold occurs more
    /// than once, and [`AgroError::Signal`] when an event's parameters do
    /// not match the signal payload.
    pub fn new(def: StateEventDef) -> Result<Self, AgroError> {
        let signal: SignalKind = def
            .event_signal
            .parse()
            .map_err(|e: furrow_types::UnknownName| AgroError::UnknownSignal { name: e.0 })?;

        let mut thresholds: Vec<f64> = def.events_table.iter().map(|e| e.key.0).collect();
        thresholds.sort_by(f64::total_cmp);
        let mut states: Vec<f64> = thresholds
            .windows(2)
            .filter_map(|pair| match pair {
                [a, b] if a.total_cmp(b) == Ordering::Equal => Some(*a),
                _ => None,
            })
            .collect();
        states.dedup_by(|a, b| a.total_cmp(b) == Ordering::Equal);
        if !states.is_empty() {
            return Err(AgroError::DuplicateEventStates {
                table: def.name,
                states,
            });
        }

        let mut rows = Vec::with_capacity(def.events_table.len());
        for entry in def.events_table {
            let params = entry.value.unwrap_or_default();
            rows.push(StateEventRow {
                threshold: entry.key.0,
                signal: build_signal(signal, &params)?,
                previous_sign: None,
            });
        }

        Ok(Self {
            signal,
            event_state: def.event_state,
            zero_condition: def.zero_condition,
            name: def.name,
            comment: def.comment,
            rows,
        })
    }

    /// Evaluate every row against the current value of the observed state.
    ///
    /// When the state has no value in the kiosk the day is skipped: nothing
    /// fires and no sign is recorded.
    ///
    /// # Errors
    ///
    /// Returns [`AgroError::NonNumericState`] when the observed value is not
    /// numeric.
    pub fn step(
        &mut self,
        day: NaiveDate,
        kiosk: &VariableKiosk,
        bus: &mut SignalBus,
    ) -> Result<(), AgroError> {
        let Some(value) = kiosk.get(&self.event_state) else {
            warn!(
                variable = %self.event_state,
                %day,
                "State variable not (yet) available in kiosk"
            );
            return Ok(());
        };
        let current = value.as_f64().ok_or_else(|| AgroError::NonNumericState {
            name: self.event_state.clone(),
        })?;

        for row in &mut self.rows {
            let sign = crossing_sign(current, row.threshold);
            let fires = row
                .previous_sign
                .is_some_and(|previous| self.zero_condition.fires(previous, sign));
            if fires {
                info!(
                    table = %self.name,
                    state = %self.event_state,
                    threshold = row.threshold,
                    %day,
                    "State event dispatched"
                );
                bus.send(row.signal.clone());
            }
            row.previous_sign = Some(sign);
        }
        Ok(())
    }

    /// The dispatched signal kind.
    pub const fn signal(&self) -> SignalKind {
        self.signal
    }

    /// Name of the observed state variable.
    pub fn event_state(&self) -> &str {
        &self.event_state
    }

    /// The configured crossing direction.
    pub const fn zero_condition(&self) -> ZeroCondition {
        self.zero_condition
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table comment.
    pub fn comment(&self) -> &str {
        &self.comment
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use furrow_types::{EventParams, OwnerId, Value, VarKind};

    use super::*;
    use crate::definition::{SingleEntry, Threshold};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2000, 5, 1).unwrap()
    }

    fn n_table(condition: ZeroCondition, thresholds: &[f64]) -> StateEventDef {
        StateEventDef {
            event_signal: "apply_n".to_owned(),
            event_state: "DVS".to_owned(),
            zero_condition: condition,
            name: "DVS-based N application table".to_owned(),
            comment: String::new(),
            events_table: thresholds
                .iter()
                .map(|t| SingleEntry {
                    key: Threshold(*t),
                    value: Some(EventParams::from([
                        ("N_amount".to_owned(), *t * 10.0),
                        ("N_recovery".to_owned(), 0.7),
                    ])),
                })
                .collect(),
        }
    }

    struct Fixture {
        kiosk: VariableKiosk,
        bus: SignalBus,
        owner: OwnerId,
    }

    impl Fixture {
        fn new() -> Self {
            let mut kiosk = VariableKiosk::new();
            let owner = OwnerId::new();
            kiosk.register(owner, "DVS", VarKind::State, true).unwrap();
            let bus = SignalBus::for_kiosk(kiosk.id());
            Self { kiosk, bus, owner }
        }

        /// Feed `values` one per day, returning the number of signals per day.
        fn feed(&mut self, se: &mut StateEventDispatcher, values: &[f64]) -> Vec<usize> {
            values
                .iter()
                .map(|v| {
                    self.kiosk.set(self.owner, "DVS", Value::Float(*v)).unwrap();
                    se.step(day(), &self.kiosk, &mut self.bus).unwrap();
                    std::iter::from_fn(|| self.bus.next_delivery()).count()
                })
                .collect()
        }
    }

    #[test]
    fn rising_crossing_fires_exactly_once() {
        let mut fx = Fixture::new();
        let mut se = StateEventDispatcher::new(n_table(ZeroCondition::Rising, &[0.3])).unwrap();
        let fired = fx.feed(&mut se, &[0.0, 0.1, 0.2, 0.35, 0.5, 0.9, 1.5]);
        assert_eq!(fired, vec![0, 0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn first_evaluation_never_fires() {
        let mut fx = Fixture::new();
        let mut se = StateEventDispatcher::new(n_table(ZeroCondition::Either, &[0.3])).unwrap();
        let fired = fx.feed(&mut se, &[0.3, 0.5]);
        assert_eq!(fired, vec![0, 0]);
    }

    #[test]
    fn reaching_threshold_exactly_fires() {
        let mut fx = Fixture::new();
        let mut se = StateEventDispatcher::new(n_table(ZeroCondition::Rising, &[0.5])).unwrap();
        let fired = fx.feed(&mut se, &[0.25, 0.5, 0.75]);
        assert_eq!(fired, vec![0, 1, 0]);
    }

    #[test]
    fn falling_ignores_rising_states() {
        let mut fx = Fixture::new();
        let mut se = StateEventDispatcher::new(n_table(ZeroCondition::Falling, &[0.3])).unwrap();
        assert_eq!(fx.feed(&mut se, &[0.0, 0.5, 1.0]), vec![0, 0, 0]);
        assert_eq!(fx.feed(&mut se, &[0.2]), vec![1]);
    }

    #[test]
    fn either_fires_in_both_directions() {
        let mut fx = Fixture::new();
        let mut se = StateEventDispatcher::new(n_table(ZeroCondition::Either, &[0.3])).unwrap();
        assert_eq!(fx.feed(&mut se, &[0.25, 0.5, 0.125, 0.25]), vec![0, 1, 1, 0]);
    }

    #[test]
    fn rows_track_signs_independently() {
        let mut fx = Fixture::new();
        let mut se =
            StateEventDispatcher::new(n_table(ZeroCondition::Rising, &[0.3, 0.6, 1.12])).unwrap();
        let fired = fx.feed(&mut se, &[0.0, 0.5, 1.5]);
        assert_eq!(fired, vec![0, 1, 2]);
    }

    #[test]
    fn missing_state_skips_without_recording() {
        let mut fx = Fixture::new();
        let mut se = StateEventDispatcher::new(n_table(ZeroCondition::Rising, &[0.3])).unwrap();

        se.step(day(), &fx.kiosk, &mut fx.bus).unwrap();
        assert!(!fx.bus.has_pending());

        // the first value seen is still only recorded
        assert_eq!(fx.feed(&mut se, &[0.5]), vec![0]);
        fx.kiosk.flush_states();
        se.step(day(), &fx.kiosk, &mut fx.bus).unwrap();
        assert_eq!(fx.feed(&mut se, &[0.1, 0.4]), vec![0, 1]);
    }

    #[test]
    fn non_numeric_state_is_an_error() {
        let mut fx = Fixture::new();
        let mut se = StateEventDispatcher::new(n_table(ZeroCondition::Rising, &[0.3])).unwrap();
        fx.kiosk.set(fx.owner, "DVS", Value::from("early")).unwrap();
        assert!(matches!(
            se.step(day(), &fx.kiosk, &mut fx.bus).unwrap_err(),
            AgroError::NonNumericState { .. }
        ));
    }

    #[test]
    fn duplicate_thresholds_are_rejected() {
        let err = StateEventDispatcher::new(n_table(ZeroCondition::Rising, &[0.3, 0.6, 0.3]))
            .unwrap_err();
        assert!(matches!(err, AgroError::DuplicateEventStates { states, .. } if states.len() == 1));
    }

    #[test]
    fn sign_of_nan_is_zero() {
        assert_eq!(crossing_sign(f64::NAN, 0.3), Ordering::Equal);
        assert_eq!(crossing_sign(0.1, 0.3), Ordering::Less);
    }
}
