//! Temperature-sum phenology.
//!
//! Development runs through four stages. From sowing the crop emerges once
//! the emergence temperature sum `TSUMEM` is reached, with the daily
//! contribution limited to `[0, TEFFMX - TBASEM]`. After emergence the
//! daily temperature sum comes from the `DTSMTB` table: `TSUM1` degree-days
//! lead to anthesis (`DVS = 1`) and `TSUM2` more to maturity
//! (`DVS = DVSEND`). Reaching maturity sends `crop_finish` when the crop
//! calendar ends the cycle at maturity or at the earliest of maturity and
//! harvest.

use chrono::NaiveDate;
use furrow_core::{
    ComponentParts, Context, DrivingVariables, KernelError, ParameterProvider, SimulationObject,
};
use furrow_kiosk::{FieldSpec, RateVars, StateVars, VariableKiosk};
use furrow_types::{CropEndType, CropStartType, FinishType, Signal, SignalKind, SubscriberId, Value};
use tracing::{debug, info, warn};

use crate::afgen::{Afgen, limit};

/// Component name of the phenology.
pub const PHENOLOGY: &str = "phenology";

/// Development stage at sowing.
const DVS_AT_SOWING: f64 = -0.1;

const STATES: &[FieldSpec] = &[
    FieldSpec::float("DVS"),
    FieldSpec::float("TSUM"),
    FieldSpec::float("TSUME"),
    FieldSpec::text("STAGE"),
];

const RATES: &[FieldSpec] = &[
    FieldSpec::float("DTSUME"),
    FieldSpec::float("DTSUM"),
    FieldSpec::float("DVR"),
];

/// Phenological stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Sown, not yet emerged.
    Emerging,
    /// Emergence to anthesis.
    Vegetative,
    /// Anthesis to maturity.
    Reproductive,
    /// Physiologically mature.
    Mature,
}

impl Stage {
    /// Lower-case stage name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Emerging => "emerging",
            Self::Vegetative => "vegetative",
            Self::Reproductive => "reproductive",
            Self::Mature => "mature",
        }
    }
}

/// Days on which the crop entered each stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageDates {
    /// Day of sowing.
    pub sowing: Option<NaiveDate>,
    /// Day of emergence.
    pub emergence: Option<NaiveDate>,
    /// Day of anthesis.
    pub anthesis: Option<NaiveDate>,
    /// Day of maturity.
    pub maturity: Option<NaiveDate>,
    /// Day of harvest.
    pub harvest: Option<NaiveDate>,
}

/// Phenology parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PhenologyParams {
    /// Temperature sum from sowing to emergence.
    pub tsumem: f64,
    /// Base temperature for emergence.
    pub tbasem: f64,
    /// Maximum effective temperature for emergence.
    pub teffmx: f64,
    /// Temperature sum from emergence to anthesis.
    pub tsum1: f64,
    /// Temperature sum from anthesis to maturity.
    pub tsum2: f64,
    /// Development stage at emergence.
    pub dvsi: f64,
    /// Development stage at maturity.
    pub dvsend: f64,
    /// Daily temperature sum as a function of the mean temperature.
    pub dtsmtb: Afgen,
    /// How the cycle started.
    pub crop_start_type: CropStartType,
    /// How the cycle ends.
    pub crop_end_type: CropEndType,
}

impl PhenologyParams {
    /// Read the parameters, including the start and end types written by
    /// the active crop calendar.
    pub fn from_provider(params: &ParameterProvider) -> Result<Self, KernelError> {
        let dtsmtb = Afgen::new(params.get_table("DTSMTB")?)
            .map_err(|e| invalid(format!("DTSMTB: {e}")))?;
        let p = Self {
            tsumem: params.get_f64("TSUMEM")?,
            tbasem: params.get_f64("TBASEM")?,
            teffmx: params.get_f64("TEFFMX")?,
            tsum1: params.get_f64("TSUM1")?,
            tsum2: params.get_f64("TSUM2")?,
            dvsi: params.get_f64("DVSI")?,
            dvsend: params.get_f64("DVSEND")?,
            dtsmtb,
            crop_start_type: parse_text(params, "CROP_START_TYPE")?,
            crop_end_type: parse_text(params, "CROP_END_TYPE")?,
        };
        if p.tsumem <= 0.0 || p.tsum1 <= 0.0 || p.tsum2 <= 0.0 {
            return Err(invalid(format!(
                "temperature sums must be positive, got TSUMEM={} TSUM1={} TSUM2={}",
                p.tsumem, p.tsum1, p.tsum2
            )));
        }
        if p.dvsend <= 1.0 {
            return Err(invalid(format!("DVSEND must exceed 1, got {}", p.dvsend)));
        }
        Ok(p)
    }
}

fn parse_text<T>(params: &ParameterProvider, name: &str) -> Result<T, KernelError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    let text = params.require(name)?.as_str().unwrap_or_default();
    text.parse().map_err(|e| invalid(format!("{name}: {e}")))
}

fn invalid(message: String) -> KernelError {
    KernelError::Component {
        component: PHENOLOGY.to_owned(),
        message,
    }
}

/// Development stage bookkeeping of a crop.
#[derive(Debug)]
pub struct Phenology {
    id: SubscriberId,
    params: PhenologyParams,
    states: StateVars,
    rates: RateVars,
    stage: Stage,
    dates: StageDates,
}

impl Phenology {
    /// Start the phenology on `day` according to the crop start type.
    pub fn new(
        day: NaiveDate,
        params: PhenologyParams,
        kiosk: &mut VariableKiosk,
    ) -> Result<Self, KernelError> {
        let mut dates = StageDates::default();
        let (stage, dvs) = match params.crop_start_type {
            CropStartType::Emergence => {
                dates.emergence = Some(day);
                info!(%day, "Crop emerged");
                (Stage::Vegetative, params.dvsi)
            }
            CropStartType::Sowing => {
                dates.sowing = Some(day);
                (Stage::Emerging, DVS_AT_SOWING)
            }
        };
        let states = StateVars::builder(STATES)
            .value("DVS", dvs)
            .value("TSUM", 0.0)
            .value("TSUME", 0.0)
            .value("STAGE", stage.as_str())
            .publish("DVS")
            .build(kiosk)?;
        let rates = match RateVars::new(kiosk, RATES, &[]) {
            Ok(rates) => rates,
            Err(e) => {
                if let Err(rollback) = states.release(kiosk) {
                    warn!(error = %rollback, "Failed to release phenology states");
                }
                return Err(e.into());
            }
        };
        Ok(Self {
            id: SubscriberId::new(),
            params,
            states,
            rates,
            stage,
            dates,
        })
    }

    /// Current stage.
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    /// Stage dates recorded so far.
    pub const fn dates(&self) -> &StageDates {
        &self.dates
    }

    /// Current development stage.
    pub fn dvs(&self) -> Result<f64, KernelError> {
        Ok(self.states.get_f64("DVS")?)
    }

    /// Today's temperature sum increment after emergence.
    pub fn dtsum(&self) -> Result<f64, KernelError> {
        Ok(self.rates.get_f64("DTSUM")?)
    }

    /// Deregister the containers after a failed crop build.
    pub(crate) fn discard(self, kiosk: &mut VariableKiosk) {
        if let Err(e) = self.states.release(kiosk) {
            warn!(error = %e, "Failed to release phenology states");
        }
        if let Err(e) = self.rates.release(kiosk) {
            warn!(error = %e, "Failed to release phenology rates");
        }
    }

    /// Move to the next stage. Returns the signal to send, if any.
    fn advance_stage(&mut self, day: NaiveDate) -> Option<Signal> {
        let from = self.stage;
        let mut signal = None;
        self.stage = match from {
            Stage::Emerging => {
                self.dates.emergence = Some(day);
                Stage::Vegetative
            }
            Stage::Vegetative => {
                self.dates.anthesis = Some(day);
                Stage::Reproductive
            }
            Stage::Reproductive | Stage::Mature => {
                self.dates.maturity = Some(day);
                if matches!(
                    self.params.crop_end_type,
                    CropEndType::Maturity | CropEndType::Earliest
                ) {
                    signal = Some(Signal::CropFinish {
                        day,
                        finish_type: FinishType::Maturity,
                        crop_delete: true,
                    });
                }
                Stage::Mature
            }
        };
        info!(
            from = from.as_str(),
            to = self.stage.as_str(),
            %day,
            "Phenological stage changed"
        );
        signal
    }
}

impl SimulationObject for Phenology {
    fn name(&self) -> &str {
        PHENOLOGY
    }

    fn subscriber(&self) -> SubscriberId {
        self.id
    }

    fn signals(&self) -> &'static [SignalKind] {
        &[SignalKind::CropFinish]
    }

    fn calc_rates(
        &mut self,
        day: NaiveDate,
        drv: &DrivingVariables,
        ctx: &mut Context<'_>,
    ) -> Result<(), KernelError> {
        let p = &self.params;
        let temp = drv.require("TEMP")?;
        let (dtsume, dtsum, dvr) = match self.stage {
            Stage::Emerging => {
                let dtsume = limit(0.0, p.teffmx - p.tbasem, temp - p.tbasem);
                (dtsume, 0.0, 0.1 * dtsume / p.tsumem)
            }
            Stage::Vegetative => {
                let dtsum = p.dtsmtb.eval(temp);
                (0.0, dtsum, dtsum / p.tsum1)
            }
            Stage::Reproductive => {
                let dtsum = p.dtsmtb.eval(temp);
                (0.0, dtsum, dtsum / p.tsum2)
            }
            Stage::Mature => (0.0, 0.0, 0.0),
        };
        self.rates.update(ctx.kiosk, |r| {
            r.set("DTSUME", dtsume)?;
            r.set("DTSUM", dtsum)?;
            r.set("DVR", dvr)
        })?;
        debug!(%day, stage = self.stage.as_str(), dvr, "Phenology rates calculated");
        Ok(())
    }

    fn integrate(
        &mut self,
        day: NaiveDate,
        delt: f64,
        ctx: &mut Context<'_>,
    ) -> Result<(), KernelError> {
        let tsume = self.states.get_f64("TSUME")? + self.rates.get_f64("DTSUME")? * delt;
        let tsum = self.states.get_f64("TSUM")? + self.rates.get_f64("DTSUM")? * delt;
        let mut dvs = self.states.get_f64("DVS")? + self.rates.get_f64("DVR")? * delt;

        let bound = match self.stage {
            Stage::Emerging => Some(0.0),
            Stage::Vegetative => Some(1.0),
            Stage::Reproductive => Some(self.params.dvsend),
            Stage::Mature => None,
        };
        if let Some(bound) = bound.filter(|bound| dvs >= *bound) {
            dvs = bound;
            if let Some(signal) = self.advance_stage(day) {
                ctx.bus.send(signal);
            }
        }

        let stage = self.stage.as_str();
        self.states.update(ctx.kiosk, |s| {
            s.set("DVS", dvs)?;
            s.set("TSUM", tsum)?;
            s.set("TSUME", tsume)?;
            s.set("STAGE", Value::from(stage))
        })?;
        Ok(())
    }

    fn on_signal(&mut self, signal: &Signal, _ctx: &mut Context<'_>) -> Result<(), KernelError> {
        if let Signal::CropFinish {
            day,
            finish_type: FinishType::Harvest,
            ..
        } = signal
        {
            self.dates.harvest = Some(*day);
        }
        Ok(())
    }

    fn states(&self) -> Option<&StateVars> {
        Some(&self.states)
    }

    fn states_mut(&mut self) -> Option<&mut StateVars> {
        Some(&mut self.states)
    }

    fn rates(&self) -> Option<&RateVars> {
        Some(&self.rates)
    }

    fn rates_mut(&mut self) -> Option<&mut RateVars> {
        Some(&mut self.rates)
    }

    fn into_parts(self: Box<Self>) -> ComponentParts {
        ComponentParts {
            states: Some(self.states),
            rates: Some(self.rates),
            children: Vec::new(),
        }
    }
}
