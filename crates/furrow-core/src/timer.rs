//! Simulation timer: advances the model day and requests outputs.
//!
//! The timer is the single source of truth for the current simulated day.
//! The first call returns the start date unchanged; every later call moves
//! one day forward. After moving, the timer sends `output` when the output
//! interval says so and `terminate` once the end date is reached.

use chrono::{Datelike, NaiveDate};
use furrow_signals::SignalBus;
use furrow_types::Signal;
use tracing::{debug, info};

use crate::config::{ModelConfig, OutputInterval};

/// Length of one time step in days.
pub const TIME_STEP_DAYS: f64 = 1.0;

/// Errors that can occur during timer operations.
#[derive(Debug, thiserror::Error)]
pub enum TimerError {
    /// The next day is not representable.
    #[error("cannot advance the timer beyond {day}")]
    DateOverflow {
        /// The last representable day.
        day: NaiveDate,
    },

    /// The end date lies before the start date.
    #[error("timer end date {end} lies before start date {start}")]
    EndBeforeStart {
        /// Start date.
        start: NaiveDate,
        /// End date.
        end: NaiveDate,
    },
}

/// Whether `day` falls on `weekday` (0 = Monday).
pub fn is_a_week(day: NaiveDate, weekday: u32) -> bool {
    day.weekday().num_days_from_monday() == weekday
}

/// Whether `day` is the last day of its month.
pub fn is_a_month(day: NaiveDate) -> bool {
    day.succ_opt().is_none_or(|next| next.month() != day.month())
}

/// Whether `day` closes a dekad: the 10th, the 20th or the last day of
/// the month.
pub fn is_a_dekad(day: NaiveDate) -> bool {
    matches!(day.day(), 10 | 20) || is_a_month(day)
}

/// Day counter with output scheduling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timer {
    start_date: NaiveDate,
    end_date: NaiveDate,
    current_date: NaiveDate,
    interval: OutputInterval,
    interval_days: u32,
    output_weekday: u32,
    /// No `output` is sent when there are no output variables.
    generate_output: bool,
    /// Days advanced since the start date.
    day_counter: u32,
    first_call: bool,
}

impl Timer {
    /// Create a timer running from `start_date` to `end_date`.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::EndBeforeStart`] if `end_date < start_date`.
    pub fn new(
        start_date: NaiveDate,
        end_date: NaiveDate,
        config: &ModelConfig,
    ) -> Result<Self, TimerError> {
        if end_date < start_date {
            return Err(TimerError::EndBeforeStart {
                start: start_date,
                end: end_date,
            });
        }
        Ok(Self {
            start_date,
            end_date,
            current_date: start_date,
            interval: config.output_interval,
            interval_days: config.output_interval_days.max(1),
            output_weekday: config.output_weekday,
            generate_output: !config.output_vars.is_empty(),
            day_counter: 0,
            first_call: true,
        })
    }

    /// Advance to the next day and return it with the time step.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::DateOverflow`] if the calendar cannot advance.
    pub fn tick(&mut self, bus: &mut SignalBus) -> Result<(NaiveDate, f64), TimerError> {
        if self.first_call {
            self.first_call = false;
            debug!(day = %self.current_date, "Model time at first call");
        } else {
            self.current_date = self
                .current_date
                .succ_opt()
                .ok_or(TimerError::DateOverflow {
                    day: self.current_date,
                })?;
            self.day_counter = self.day_counter.saturating_add(1);
            debug!(day = %self.current_date, "Model time updated");
        }

        if self.output_due() {
            bus.send(Signal::Output);
        }

        if self.current_date >= self.end_date {
            info!(
                day = %self.current_date,
                end_date = %self.end_date,
                "Reached end of simulation period"
            );
            bus.send(Signal::Terminate);
        }

        Ok((self.current_date, TIME_STEP_DAYS))
    }

    fn output_due(&self) -> bool {
        if !self.generate_output {
            return false;
        }
        match self.interval {
            OutputInterval::Daily => self
                .day_counter
                .checked_rem(self.interval_days)
                .is_some_and(|rem| rem == 0),
            OutputInterval::Weekly => is_a_week(self.current_date, self.output_weekday),
            OutputInterval::Dekadal => is_a_dekad(self.current_date),
            OutputInterval::Monthly => is_a_month(self.current_date),
        }
    }

    /// First simulated day.
    pub const fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    /// Last simulated day.
    pub const fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    /// Current simulated day.
    pub const fn current_date(&self) -> NaiveDate {
        self.current_date
    }

    /// Days advanced since the start date.
    pub const fn day_counter(&self) -> u32 {
        self.day_counter
    }
}
