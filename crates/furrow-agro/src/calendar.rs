//! Crop calendar: starts and ends one crop cycle within a campaign.

use chrono::{Days, NaiveDate};
use furrow_signals::SignalBus;
use furrow_types::{CropEndType, CropStartType, FinishType, Signal};
use tracing::info;

use crate::AgroError;
use crate::definition::CropCalendarDef;

/// Whether `day` lies in `[start, end)`, or `[start, ..)` when `end` is
/// `None`.
pub fn check_date_range(day: NaiveDate, start: NaiveDate, end: Option<NaiveDate>) -> bool {
    match end {
        Some(end) => start <= day && day < end,
        None => start <= day,
    }
}

/// Add `days` days to `start`.
pub(crate) fn add_days(start: NaiveDate, days: u32) -> Result<NaiveDate, AgroError> {
    start
        .checked_add_days(Days::new(u64::from(days)))
        .ok_or(AgroError::DateOverflow { start, days })
}

/// Crop calendar of one campaign.
///
/// Called once per day. Sends `crop_start` on the start date and
/// `crop_finish` when the harvest date or the maximum duration is reached.
#[derive(Debug, Clone)]
pub struct CropCalendar {
    crop_name: String,
    variety_name: String,
    crop_start_date: NaiveDate,
    crop_start_type: CropStartType,
    crop_end_date: Option<NaiveDate>,
    crop_end_type: CropEndType,
    max_duration: u32,
    /// Last day of the cycle as scheduled.
    end_date: NaiveDate,
    /// Days since the cycle started.
    duration: u32,
    in_crop_cycle: bool,
}

impl CropCalendar {
    /// Build a calendar from its definition.
    ///
    /// # Errors
    ///
    /// Returns [`AgroError::MissingCropEndDate`] when a `harvest` or
    /// `earliest` calendar has no end date, and [`AgroError::DateOverflow`]
    /// when the start date plus the maximum duration is not representable.
    pub fn new(def: CropCalendarDef) -> Result<Self, AgroError> {
        let end_date = match (def.crop_end_type, def.crop_end_date) {
            (CropEndType::Harvest | CropEndType::Earliest, Some(end)) => end,
            (CropEndType::Harvest | CropEndType::Earliest, None) => {
                return Err(AgroError::MissingCropEndDate {
                    crop: def.crop_name,
                    end_type: def.crop_end_type,
                });
            }
            (CropEndType::Maturity, _) => add_days(def.crop_start_date, def.max_duration)?,
        };
        Ok(Self {
            crop_name: def.crop_name,
            variety_name: def.variety_name,
            crop_start_date: def.crop_start_date,
            crop_start_type: def.crop_start_type,
            crop_end_date: def.crop_end_date,
            crop_end_type: def.crop_end_type,
            max_duration: def.max_duration,
            end_date,
            duration: 0,
            in_crop_cycle: false,
        })
    }

    /// Check the calendar against its campaign window.
    ///
    /// # Errors
    ///
    /// Returns [`AgroError::CropEndBeforeStart`] when the effective end date
    /// does not follow the start date, and
    /// [`AgroError::CropStartOutsideCampaign`] when the start date lies
    /// outside `[campaign_start, next_campaign_start)`.
    pub fn validate(
        &self,
        campaign_start: NaiveDate,
        next_campaign_start: Option<NaiveDate>,
    ) -> Result<(), AgroError> {
        if self.crop_start_date >= self.end_date {
            return Err(AgroError::CropEndBeforeStart {
                crop: self.crop_name.clone(),
                start: self.crop_start_date,
                end: self.end_date,
            });
        }
        if !check_date_range(self.crop_start_date, campaign_start, next_campaign_start) {
            return Err(AgroError::CropStartOutsideCampaign {
                crop: self.crop_name.clone(),
                variety: self.variety_name.clone(),
                start: self.crop_start_date,
                campaign_start,
                next: next_campaign_start,
            });
        }
        Ok(())
    }

    /// Advance the calendar by one day, sending crop signals as needed.
    pub fn step(&mut self, day: NaiveDate, bus: &mut SignalBus) {
        if self.in_crop_cycle {
            self.duration = self.duration.saturating_add(1);
        }

        if day == self.crop_start_date {
            self.duration = 0;
            self.in_crop_cycle = true;
            info!(
                crop = %self.crop_name,
                variety = %self.variety_name,
                %day,
                "Starting crop"
            );
            bus.send(Signal::CropStart {
                day,
                crop_name: self.crop_name.clone(),
                variety_name: self.variety_name.clone(),
                crop_start_type: self.crop_start_type,
                crop_end_type: self.crop_end_type,
            });
        }

        if !self.in_crop_cycle {
            return;
        }
        let mut finish_type = None;
        if matches!(
            self.crop_end_type,
            CropEndType::Harvest | CropEndType::Earliest
        ) && Some(day) == self.crop_end_date
        {
            finish_type = Some(FinishType::Harvest);
        }
        // the duration cap wins over a harvest on the same day
        if self.duration == self.max_duration {
            finish_type = Some(FinishType::MaxDuration);
        }
        if let Some(finish_type) = finish_type {
            self.in_crop_cycle = false;
            info!(crop = %self.crop_name, %day, %finish_type, "Crop cycle finished");
            bus.send(Signal::CropFinish {
                day,
                finish_type,
                crop_delete: true,
            });
        }
    }

    /// Record that the crop cycle ended, whoever ended it.
    pub const fn on_crop_finish(&mut self) {
        self.in_crop_cycle = false;
    }

    /// Scheduled end of the cycle: the harvest date for `harvest` and
    /// `earliest`, otherwise the start date plus the maximum duration.
    pub const fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    /// Start of the cycle.
    pub const fn start_date(&self) -> NaiveDate {
        self.crop_start_date
    }

    /// Days since the cycle started.
    pub const fn duration(&self) -> u32 {
        self.duration
    }

    /// Whether the crop cycle is running.
    pub const fn in_crop_cycle(&self) -> bool {
        self.in_crop_cycle
    }

    /// Crop name.
    pub fn crop_name(&self) -> &str {
        &self.crop_name
    }

    /// Variety name.
    pub fn variety_name(&self) -> &str {
        &self.variety_name
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use furrow_types::{KioskId, SignalKind};

    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn def(end_type: CropEndType, end: Option<NaiveDate>, max_duration: u32) -> CropCalendarDef {
        CropCalendarDef {
            crop_name: "wheat".to_owned(),
            variety_name: "winter-wheat".to_owned(),
            crop_start_date: d(2000, 3, 1),
            crop_start_type: CropStartType::Sowing,
            crop_end_date: end,
            crop_end_type: end_type,
            max_duration,
        }
    }

    fn drain(bus: &mut SignalBus) -> Vec<Signal> {
        std::iter::from_fn(|| bus.next_delivery().map(|dl| dl.signal)).collect()
    }

    fn run(cc: &mut CropCalendar, from: NaiveDate, to: NaiveDate) -> Vec<(NaiveDate, Signal)> {
        let mut bus = SignalBus::for_kiosk(KioskId::new());
        let mut out = Vec::new();
        let mut day = from;
        while day <= to {
            cc.step(day, &mut bus);
            out.extend(drain(&mut bus).into_iter().map(|s| (day, s)));
            day = day.succ_opt().unwrap();
        }
        out
    }

    #[test]
    fn harvest_calendar_starts_and_finishes_once() {
        let mut cc = CropCalendar::new(def(CropEndType::Harvest, Some(d(2000, 6, 1)), 200)).unwrap();
        let signals = run(&mut cc, d(2000, 1, 1), d(2000, 12, 31));

        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].0, d(2000, 3, 1));
        assert_eq!(signals[0].1.kind(), SignalKind::CropStart);
        assert_eq!(signals[1].0, d(2000, 6, 1));
        assert_eq!(
            signals[1].1,
            Signal::CropFinish {
                day: d(2000, 6, 1),
                finish_type: FinishType::Harvest,
                crop_delete: true
            }
        );
        assert!(!cc.in_crop_cycle());
    }

    #[test]
    fn maturity_calendar_ends_at_max_duration() {
        let mut cc = CropCalendar::new(def(CropEndType::Maturity, None, 10)).unwrap();
        assert_eq!(cc.end_date(), d(2000, 3, 11));
        let signals = run(&mut cc, d(2000, 3, 1), d(2000, 4, 1));
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[1].0, d(2000, 3, 11));
        assert!(matches!(
            signals[1].1,
            Signal::CropFinish {
                finish_type: FinishType::MaxDuration,
                ..
            }
        ));
    }

    #[test]
    fn max_duration_overrides_later_harvest() {
        let mut cc = CropCalendar::new(def(CropEndType::Harvest, Some(d(2000, 6, 1)), 5)).unwrap();
        let signals = run(&mut cc, d(2000, 3, 1), d(2000, 6, 30));
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[1].0, d(2000, 3, 6));
        assert!(matches!(
            signals[1].1,
            Signal::CropFinish {
                finish_type: FinishType::MaxDuration,
                ..
            }
        ));
    }

    #[test]
    fn duration_counts_days_in_cycle() {
        let mut cc = CropCalendar::new(def(CropEndType::Maturity, None, 100)).unwrap();
        run(&mut cc, d(2000, 2, 20), d(2000, 3, 11));
        assert!(cc.in_crop_cycle());
        assert_eq!(cc.duration(), 10);
        cc.on_crop_finish();
        assert!(!cc.in_crop_cycle());
    }

    #[test]
    fn validation_rejects_bad_windows() {
        let cc = CropCalendar::new(def(CropEndType::Harvest, Some(d(2000, 3, 1)), 200)).unwrap();
        assert!(matches!(
            cc.validate(d(2000, 1, 1), None).unwrap_err(),
            AgroError::CropEndBeforeStart { .. }
        ));

        let cc = CropCalendar::new(def(CropEndType::Harvest, Some(d(2000, 6, 1)), 200)).unwrap();
        cc.validate(d(2000, 1, 1), None).unwrap();
        cc.validate(d(2000, 3, 1), Some(d(2000, 3, 2))).unwrap();
        assert!(matches!(
            cc.validate(d(2000, 1, 1), Some(d(2000, 3, 1))).unwrap_err(),
            AgroError::CropStartOutsideCampaign { .. }
        ));
        assert!(matches!(
            cc.validate(d(2000, 3, 2), None).unwrap_err(),
            AgroError::CropStartOutsideCampaign { .. }
        ));
    }

    #[test]
    fn harvest_without_end_date_fails() {
        let err = CropCalendar::new(def(CropEndType::Earliest, None, 200)).unwrap_err();
        assert!(matches!(err, AgroError::MissingCropEndDate { .. }));
    }

    #[test]
    fn date_range_is_half_open() {
        assert!(check_date_range(d(2000, 1, 1), d(2000, 1, 1), Some(d(2000, 2, 1))));
        assert!(!check_date_range(d(2000, 2, 1), d(2000, 1, 1), Some(d(2000, 2, 1))));
        assert!(check_date_range(d(2030, 1, 1), d(2000, 1, 1), None));
        assert!(!check_date_range(d(1999, 12, 31), d(2000, 1, 1), None));
    }
}
