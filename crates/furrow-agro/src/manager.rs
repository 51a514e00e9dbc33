//! The agromanager: a sequence of campaigns, each with at most one crop
//! calendar and any number of timed and state event tables.
//!
//! Campaigns are consumed in order. When the simulated day reaches the
//! start of the next campaign, the current campaign's calendar and event
//! tables are dropped and can no longer send signals.
//!
//! The agromanager also decides when the run ends: its end date is fixed
//! when it is built, and whenever a crop finishes it checks whether anything
//! could still happen. If nothing can, it sends `terminate`.

use std::collections::VecDeque;

use chrono::NaiveDate;
use furrow_kiosk::VariableKiosk;
use furrow_signals::SignalBus;
use furrow_types::{Signal, SignalKind, SubscriberId};
use tracing::{debug, info};

use crate::AgroError;
use crate::calendar::CropCalendar;
use crate::definition::{AgroManagementDef, CampaignDef};
use crate::state_events::StateEventDispatcher;
use crate::timed::TimedEventDispatcher;

/// Signals the agromanager reacts to.
pub const AGROMANAGER_SIGNALS: &[SignalKind] = &[SignalKind::CropFinish];

/// Built content of one campaign.
#[derive(Debug, Clone, Default)]
pub struct Campaign {
    /// Crop calendar, if a crop is grown.
    pub crop_calendar: Option<CropCalendar>,
    /// Timed event tables, if any were given.
    pub timed_events: Option<Vec<TimedEventDispatcher>>,
    /// State event tables, if any were given.
    pub state_events: Option<Vec<StateEventDispatcher>>,
}

impl Campaign {
    fn build(
        def: CampaignDef,
        campaign_start: NaiveDate,
        next: Option<NaiveDate>,
    ) -> Result<Self, AgroError> {
        let crop_calendar = match def.crop_calendar {
            Some(cc_def) => {
                let cc = CropCalendar::new(cc_def)?;
                cc.validate(campaign_start, next)?;
                Some(cc)
            }
            None => None,
        };
        let timed_events = match def.timed_events {
            Some(defs) => {
                let mut tables = Vec::with_capacity(defs.len());
                for te_def in defs {
                    let te = TimedEventDispatcher::new(te_def)?;
                    te.validate(campaign_start, next)?;
                    tables.push(te);
                }
                Some(tables)
            }
            None => None,
        };
        let state_events = match def.state_events {
            Some(defs) => Some(
                defs.into_iter()
                    .map(StateEventDispatcher::new)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            None => None,
        };
        Ok(Self {
            crop_calendar,
            timed_events,
            state_events,
        })
    }

    /// Latest date among the timed event tables.
    fn timed_end_date(&self) -> Option<NaiveDate> {
        self.timed_events
            .iter()
            .flatten()
            .filter_map(TimedEventDispatcher::end_date)
            .max()
    }
}

/// Runs campaigns, crop calendars and event tables day by day.
#[derive(Debug)]
pub struct AgroManager {
    subscriber: SubscriberId,
    /// Campaign start dates in order.
    start_dates: Vec<NaiveDate>,
    /// Remaining campaigns; the front is the current one. `None` marks an
    /// empty campaign.
    campaigns: VecDeque<Option<Campaign>>,
    /// Index of the current campaign in `start_dates`.
    icampaign: usize,
    end_date: NaiveDate,
}

impl AgroManager {
    /// Build the agromanager from its definition.
    ///
    /// The end date of the run is resolved here, so a definition whose end
    /// cannot be decided is rejected up front.
    ///
    /// # Errors
    ///
    /// Returns [`AgroError::CampaignsNotSequential`] for unordered campaign
    /// dates, [`AgroError::EmptyDefinition`] when there is nothing to
    /// schedule, [`AgroError::StateEventsWithoutEndDate`] when the last
    /// campaign has state events, and any calendar or event table error.
    pub fn new(def: AgroManagementDef) -> Result<Self, AgroError> {
        let start_dates: Vec<NaiveDate> = def.campaigns.iter().map(|c| c.key).collect();
        for pair in start_dates.windows(2) {
            match pair {
                [previous, date] if date <= previous => {
                    return Err(AgroError::CampaignsNotSequential {
                        date: *date,
                        previous: *previous,
                    });
                }
                _ => {}
            }
        }

        let mut campaigns = VecDeque::with_capacity(def.campaigns.len());
        for (i, entry) in def.campaigns.into_iter().enumerate() {
            let next = start_dates.get(i.saturating_add(1)).copied();
            let campaign = match entry.value {
                Some(campaign_def) if !campaign_def.is_empty() => {
                    Some(Campaign::build(campaign_def, entry.key, next)?)
                }
                _ => None,
            };
            campaigns.push_back(campaign);
        }

        let end_date = resolve_end_date(&start_dates, &campaigns)?;
        let Some(start_date) = start_dates.first().copied() else {
            return Err(AgroError::EmptyDefinition);
        };
        info!(
            %start_date,
            %end_date,
            campaigns = start_dates.len(),
            "Agromanagement initialized"
        );

        Ok(Self {
            subscriber: SubscriberId::new(),
            start_dates,
            campaigns,
            icampaign: 0,
            end_date,
        })
    }

    /// Bus identity of the agromanager.
    pub const fn subscriber(&self) -> SubscriberId {
        self.subscriber
    }

    /// First simulation day: the start of the first campaign.
    pub fn start_date(&self) -> NaiveDate {
        self.start_dates.first().copied().unwrap_or(self.end_date)
    }

    /// Last simulation day.
    pub const fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    /// Start of the campaign after the current one, if any.
    pub fn next_campaign_start(&self) -> Option<NaiveDate> {
        self.start_dates
            .get(self.icampaign.saturating_add(1))
            .copied()
    }

    /// Index of the current campaign.
    pub const fn campaign_index(&self) -> usize {
        self.icampaign
    }

    /// The current campaign, `None` when it is empty.
    pub fn current_campaign(&self) -> Option<&Campaign> {
        self.campaigns.front().and_then(Option::as_ref)
    }

    fn current_campaign_mut(&mut self) -> Option<&mut Campaign> {
        self.campaigns.front_mut().and_then(Option::as_mut)
    }

    /// Switch to the next campaign when `day` is its start date.
    pub fn advance_campaign(&mut self, day: NaiveDate) {
        if self.next_campaign_start() == Some(day) {
            self.icampaign = self.icampaign.saturating_add(1);
            self.campaigns.pop_front();
            info!(%day, campaign = self.icampaign, "Switching to next campaign");
        }
    }

    /// Run the crop calendar of the current campaign.
    pub fn run_crop_calendar(&mut self, day: NaiveDate, bus: &mut SignalBus) {
        if let Some(cc) = self
            .current_campaign_mut()
            .and_then(|c| c.crop_calendar.as_mut())
        {
            cc.step(day, bus);
        }
    }

    /// Run the timed event tables of the current campaign.
    pub fn run_timed_events(&self, day: NaiveDate, bus: &mut SignalBus) {
        for te in self
            .current_campaign()
            .and_then(|c| c.timed_events.as_ref())
            .into_iter()
            .flatten()
        {
            te.step(day, bus);
        }
    }

    /// Run the state event tables of the current campaign.
    ///
    /// # Errors
    ///
    /// Returns [`AgroError::NonNumericState`] when an observed state is not
    /// numeric.
    pub fn run_state_events(
        &mut self,
        day: NaiveDate,
        kiosk: &VariableKiosk,
        bus: &mut SignalBus,
    ) -> Result<(), AgroError> {
        if let Some(tables) = self
            .current_campaign_mut()
            .and_then(|c| c.state_events.as_mut())
        {
            for se in tables {
                se.step(day, kiosk, bus)?;
            }
        }
        Ok(())
    }

    /// Handle a delivered signal.
    ///
    /// On `crop_finish` the current calendar stops its cycle and `terminate`
    /// is sent when no further campaign is defined, the current campaign has
    /// no state events, and no timed event lies after `day`.
    pub fn on_signal(&mut self, signal: &Signal, bus: &mut SignalBus) {
        let Signal::CropFinish { day, .. } = signal else {
            return;
        };
        if let Some(cc) = self
            .current_campaign_mut()
            .and_then(|c| c.crop_calendar.as_mut())
        {
            cc.on_crop_finish();
        }

        if self.next_campaign_start().is_some() {
            debug!(%day, "Crop finished; next campaign pending");
            return;
        }
        let campaign = self.current_campaign();
        if campaign.is_some_and(|c| c.state_events.is_some()) {
            debug!(%day, "Crop finished; state events still active");
            return;
        }
        if campaign
            .and_then(Campaign::timed_end_date)
            .is_some_and(|last| last > *day)
        {
            debug!(%day, "Crop finished; timed events still scheduled");
            return;
        }
        info!(%day, "No further agromanagement; terminating");
        bus.send(Signal::Terminate);
    }

    /// Days elapsed in the current crop cycle, zero without a calendar.
    pub fn ndays_in_crop_cycle(&self) -> u32 {
        self.current_campaign()
            .and_then(|c| c.crop_calendar.as_ref())
            .map_or(0, CropCalendar::duration)
    }
}

/// Decide the last simulation day.
///
/// An empty last campaign ends the run on its start date. Otherwise the
/// last campaign must not have state events and the run ends on the latest
/// crop calendar or timed event date of all campaigns.
fn resolve_end_date(
    start_dates: &[NaiveDate],
    campaigns: &VecDeque<Option<Campaign>>,
) -> Result<NaiveDate, AgroError> {
    let (Some(last_start), Some(last)) = (start_dates.last(), campaigns.back()) else {
        return Err(AgroError::EmptyDefinition);
    };
    let Some(last) = last else {
        return Ok(*last_start);
    };
    if last.state_events.is_some() {
        return Err(AgroError::StateEventsWithoutEndDate { start: *last_start });
    }

    campaigns
        .iter()
        .flatten()
        .flat_map(|c| {
            c.crop_calendar
                .as_ref()
                .map(CropCalendar::end_date)
                .into_iter()
                .chain(c.timed_end_date())
        })
        .max()
        .ok_or(AgroError::EmptyDefinition)
}
