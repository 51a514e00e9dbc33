//! Timed events: signals dispatched on fixed calendar dates.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use furrow_signals::{SignalBus, build_signal};
use furrow_types::{Signal, SignalKind};
use tracing::info;

use crate::AgroError;
use crate::calendar::check_date_range;
use crate::definition::TimedEventDef;

/// Dispatches one signal kind on the dates of its events table.
#[derive(Debug, Clone)]
pub struct TimedEventDispatcher {
    signal: SignalKind,
    name: String,
    comment: String,
    events: BTreeMap<NaiveDate, Signal>,
}

impl TimedEventDispatcher {
    /// Build a dispatcher from its definition.
    ///
    /// # Errors
    ///
    /// Returns [`AgroError::UnknownSignal`] for an unknown signal name,
    /// [`AgroError::DuplicateEventDates`] when a date occurs more than once,
    /// and [`AgroError::Signal`] when an event's parameters do not match the
    /// signal payload.
    pub fn new(def: TimedEventDef) -> Result<Self, AgroError> {
        let signal: SignalKind = def
            .event_signal
            .parse()
            .map_err(|e: furrow_types::UnknownName| AgroError::UnknownSignal { name: e.0 })?;

        let mut seen: BTreeMap<NaiveDate, usize> = BTreeMap::new();
        for entry in &def.events_table {
            let count = seen.entry(entry.key).or_insert(0);
            *count = count.saturating_add(1);
        }
        let days: Vec<NaiveDate> = seen
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(day, _)| day)
            .collect();
        if !days.is_empty() {
            return Err(AgroError::DuplicateEventDates {
                table: def.name,
                days,
            });
        }

        let mut events = BTreeMap::new();
        for entry in def.events_table {
            let params = entry.value.unwrap_or_default();
            events.insert(entry.key, build_signal(signal, &params)?);
        }

        Ok(Self {
            signal,
            name: def.name,
            comment: def.comment,
            events,
        })
    }

    /// Check that every event falls inside the campaign window.
    ///
    /// # Errors
    ///
    /// Returns [`AgroError::TimedEventOutsideCampaign`] for the first event
    /// outside `[campaign_start, next_campaign_start)`.
    pub fn validate(
        &self,
        campaign_start: NaiveDate,
        next_campaign_start: Option<NaiveDate>,
    ) -> Result<(), AgroError> {
        match self
            .events
            .keys()
            .find(|day| !check_date_range(**day, campaign_start, next_campaign_start))
        {
            Some(day) => Err(AgroError::TimedEventOutsideCampaign {
                day: *day,
                campaign_start,
                next: next_campaign_start,
            }),
            None => Ok(()),
        }
    }

    /// Dispatch the event scheduled for `day`, if any.
    pub fn step(&self, day: NaiveDate, bus: &mut SignalBus) {
        if let Some(signal) = self.events.get(&day) {
            info!(table = %self.name, %day, signal = %self.signal, "Timed event dispatched");
            bus.send(signal.clone());
        }
    }

    /// Date of the last event, or `None` for an empty table.
    pub fn end_date(&self) -> Option<NaiveDate> {
        self.events.keys().next_back().copied()
    }

    /// The dispatched signal kind.
    pub const fn signal(&self) -> SignalKind {
        self.signal
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
    use furrow_types::{EventParams, KioskId};

    use super::*;
    use crate::definition::SingleEntry;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn irrigation(days: &[NaiveDate]) -> TimedEventDef {
        TimedEventDef {
            event_signal: "irrigate".to_owned(),
            name: "Timed irrigation events".to_owned(),
            comment: String::new(),
            events_table: days
                .iter()
                .map(|day| SingleEntry {
                    key: *day,
                    value: Some(EventParams::from([("amount".to_owned(), 2.0)])),
                })
                .collect(),
        }
    }

    #[test]
    fn fires_exactly_on_table_dates() {
        let te = TimedEventDispatcher::new(irrigation(&[d(2000, 5, 1), d(2000, 6, 21)])).unwrap();
        let mut bus = SignalBus::for_kiosk(KioskId::new());

        te.step(d(2000, 4, 30), &mut bus);
        assert!(!bus.has_pending());
        te.step(d(2000, 5, 1), &mut bus);
        let delivered = bus.next_delivery().unwrap();
        assert_eq!(
            delivered.signal,
            Signal::Irrigate {
                amount: 2.0,
                efficiency: 1.0
            }
        );
        assert_eq!(te.end_date(), Some(d(2000, 6, 21)));
    }

    #[test]
    fn duplicate_dates_are_rejected() {
        let err = TimedEventDispatcher::new(irrigation(&[
            d(2000, 5, 1),
            d(2000, 6, 1),
            d(2000, 5, 1),
        ]))
        .unwrap_err();
        assert!(
            matches!(err, AgroError::DuplicateEventDates { days, .. } if days == vec![d(2000, 5, 1)])
        );
    }

    #[test]
    fn unknown_signal_is_rejected() {
        let mut def = irrigation(&[d(2000, 5, 1)]);
        def.event_signal = "sprinkle".to_owned();
        assert!(matches!(
            TimedEventDispatcher::new(def).unwrap_err(),
            AgroError::UnknownSignal { .. }
        ));
    }

    #[test]
    fn bad_payload_is_rejected_at_build_time() {
        let mut def = irrigation(&[d(2000, 5, 1)]);
        def.event_signal = "mowing".to_owned();
        assert!(matches!(
            TimedEventDispatcher::new(def).unwrap_err(),
            AgroError::Signal { .. }
        ));
    }

    #[test]
    fn events_must_fall_inside_campaign() {
        let te = TimedEventDispatcher::new(irrigation(&[d(2000, 5, 1), d(2001, 1, 1)])).unwrap();
        te.validate(d(2000, 1, 1), None).unwrap();
        assert!(matches!(
            te.validate(d(2000, 1, 1), Some(d(2001, 1, 1))).unwrap_err(),
            AgroError::TimedEventOutsideCampaign { .. }
        ));
    }
}
