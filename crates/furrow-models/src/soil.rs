//! Single-layer water bucket for freely draining soils.
//!
//! The bucket spans the rootable depth `RDMSOL`. Rain and effective
//! irrigation infiltrate completely; water above field capacity percolates
//! at up to `SOPE` cm per day and water above saturation runs off. Soil
//! evaporation decays with the number of days since the last wet day and
//! crop transpiration is read from the kiosk (`TRA`) when a crop publishes
//! it. Both are limited to the water held above wilting point.
//!
//! # Parameters
//!
//! | Name     | Meaning                                      | Unit      |
//! |----------|----------------------------------------------|-----------|
//! | `SMW`    | Soil moisture content at wilting point       | -         |
//! | `SMFCF`  | Soil moisture content at field capacity      | -         |
//! | `SM0`    | Soil porosity                                | -         |
//! | `RDMSOL` | Rootable depth of the soil                   | cm        |
//! | `SOPE`   | Maximum percolation rate                     | cm/day    |
//! | `WAV`    | Initial water above wilting point            | cm        |
//!
//! # Driving variables
//!
//! `RAIN` (cm/day) and `ES0` (potential soil evaporation, cm/day). Both
//! default to zero when absent.

use chrono::NaiveDate;
use furrow_core::{
    Balance, BalanceKind, ComponentFactory, ComponentParts, Context, DrivingVariables, Increments,
    KernelError, ParameterProvider, SimulationObject, WATER_BALANCE_TOLERANCE, check_balance,
};
use furrow_kiosk::{FieldSpec, RateVars, StateVars, VariableKiosk};
use furrow_types::{Signal, SignalKind, SubscriberId, Value};
use tracing::{debug, info};

use crate::afgen::limit;

/// Component name of the bucket.
pub const BUCKET_SOIL: &str = "bucket_soil";

const STATES: &[FieldSpec] = &[
    FieldSpec::float("SM"),
    FieldSpec::float("W"),
    FieldSpec::float("WI"),
    FieldSpec::float("RAINT"),
    FieldSpec::float("TOTIRR"),
    FieldSpec::float("EVST"),
    FieldSpec::float("WTRAT"),
    FieldSpec::float("PERCT"),
    FieldSpec::float("RNOFFT"),
    FieldSpec::float("WBAL"),
];

const RATES: &[FieldSpec] = &[
    FieldSpec::float("RAIN"),
    FieldSpec::float("RIRR"),
    FieldSpec::float("EVS"),
    FieldSpec::float("WTRA"),
    FieldSpec::float("PERC"),
    FieldSpec::float("RNOFF"),
];

/// Wet-day threshold for soil evaporation (cm).
const WET_DAY_INFILTRATION: f64 = 1.0;

/// Soil physical parameters of the bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketParams {
    /// Wilting point.
    pub smw: f64,
    /// Field capacity.
    pub smfcf: f64,
    /// Porosity.
    pub sm0: f64,
    /// Rootable depth (cm).
    pub rdmsol: f64,
    /// Maximum percolation rate (cm/day).
    pub sope: f64,
    /// Initial water above wilting point (cm).
    pub wav: f64,
}

impl BucketParams {
    /// Read and check the parameters.
    pub fn from_provider(params: &ParameterProvider) -> Result<Self, KernelError> {
        let p = Self {
            smw: params.get_f64("SMW")?,
            smfcf: params.get_f64("SMFCF")?,
            sm0: params.get_f64("SM0")?,
            rdmsol: params.get_f64("RDMSOL")?,
            sope: params.get_f64("SOPE")?,
            wav: params.get_f64("WAV")?,
        };
        let ordered = p.smw >= 0.0 && p.smw < p.smfcf && p.smfcf <= p.sm0 && p.sm0 <= 1.0;
        if !ordered {
            return Err(invalid(format!(
                "soil moisture constants must satisfy 0 <= SMW < SMFCF <= SM0 <= 1, \
                 got SMW={} SMFCF={} SM0={}",
                p.smw, p.smfcf, p.sm0
            )));
        }
        if p.rdmsol <= 0.0 || p.sope < 0.0 || p.wav < 0.0 {
            return Err(invalid(format!(
                "RDMSOL must be positive and SOPE, WAV non-negative, \
                 got RDMSOL={} SOPE={} WAV={}",
                p.rdmsol, p.sope, p.wav
            )));
        }
        Ok(p)
    }
}

fn invalid(message: String) -> KernelError {
    KernelError::Component {
        component: BUCKET_SOIL.to_owned(),
        message,
    }
}

/// Single-layer soil water balance.
#[derive(Debug)]
pub struct BucketSoil {
    id: SubscriberId,
    params: BucketParams,
    states: StateVars,
    rates: RateVars,
    /// Effective irrigation received since the last rate calculation.
    pending_irrigation: f64,
    /// Days since the last wet day.
    dslr: f64,
    /// Infiltration of the previous day.
    infiltration_old: f64,
    /// Net water added by out-of-band edits of `SM`.
    w_increments: f64,
}

impl BucketSoil {
    /// Register the bucket in `kiosk` with the initial water content.
    pub fn new(params: BucketParams, kiosk: &mut VariableKiosk) -> Result<Self, KernelError> {
        let sm = limit(params.smw, params.sm0, params.smw + params.wav / params.rdmsol);
        let w = sm * params.rdmsol;
        let states = StateVars::builder(STATES)
            .value("SM", sm)
            .value("W", w)
            .value("WI", w)
            .values(
                ["RAINT", "TOTIRR", "EVST", "WTRAT", "PERCT", "RNOFFT", "WBAL"]
                    .into_iter()
                    .map(|name| (name, Value::Float(0.0))),
            )
            .publish("SM")
            .build(kiosk)?;
        let rates = RateVars::new(kiosk, RATES, &["EVS"])?;

        // A moist surface starts the evaporation decay from day one.
        let dslr = if sm >= params.smw + 0.5 * (params.smfcf - params.smw) {
            1.0
        } else {
            5.0
        };

        Ok(Self {
            id: SubscriberId::new(),
            params,
            states,
            rates,
            pending_irrigation: 0.0,
            dslr,
            infiltration_old: 0.0,
            w_increments: 0.0,
        })
    }

    /// Current volumetric soil moisture.
    pub fn soil_moisture(&self) -> Result<f64, KernelError> {
        Ok(self.states.get_f64("SM")?)
    }

    fn soil_evaporation(&mut self, evsmx: f64) -> f64 {
        if self.infiltration_old >= WET_DAY_INFILTRATION {
            self.dslr = 1.0;
            evsmx
        } else {
            let evsmxt = evsmx * ((self.dslr + 1.0).sqrt() - self.dslr.sqrt());
            self.dslr += 1.0;
            evsmx.min(evsmxt + self.infiltration_old)
        }
    }
}

impl SimulationObject for BucketSoil {
    fn name(&self) -> &str {
        BUCKET_SOIL
    }

    fn subscriber(&self) -> SubscriberId {
        self.id
    }

    fn signals(&self) -> &'static [SignalKind] {
        &[SignalKind::Irrigate]
    }

    fn calc_rates(
        &mut self,
        _day: NaiveDate,
        drv: &DrivingVariables,
        ctx: &mut Context<'_>,
    ) -> Result<(), KernelError> {
        let p = self.params;
        let rirr = core::mem::take(&mut self.pending_irrigation);
        let rain = drv.get("RAIN").unwrap_or(0.0);
        let infiltration = rain + rirr;

        let evs = self.soil_evaporation(drv.get("ES0").unwrap_or(0.0));
        self.infiltration_old = infiltration;

        let w = self.states.get_f64("W")?;
        let available = (w - p.smw * p.rdmsol).max(0.0);
        let tra = ctx.kiosk.get_f64("TRA").unwrap_or(0.0);
        let wtra = limit(0.0, available, tra);
        let evs = limit(0.0, available - wtra, evs);

        let after_uptake = w + infiltration - evs - wtra;
        let perc = limit(0.0, p.sope, after_uptake - p.smfcf * p.rdmsol);
        let rnoff = (after_uptake - perc - p.sm0 * p.rdmsol).max(0.0);

        self.rates.update(ctx.kiosk, |r| {
            r.set("RAIN", rain)?;
            r.set("RIRR", rirr)?;
            r.set("EVS", evs)?;
            r.set("WTRA", wtra)?;
            r.set("PERC", perc)?;
            r.set("RNOFF", rnoff)
        })?;
        Ok(())
    }

    fn integrate(
        &mut self,
        _day: NaiveDate,
        delt: f64,
        ctx: &mut Context<'_>,
    ) -> Result<(), KernelError> {
        let r = &self.rates;
        let rain = r.get_f64("RAIN")? * delt;
        let rirr = r.get_f64("RIRR")? * delt;
        let evs = r.get_f64("EVS")? * delt;
        let wtra = r.get_f64("WTRA")? * delt;
        let perc = r.get_f64("PERC")? * delt;
        let rnoff = r.get_f64("RNOFF")? * delt;
        let rdmsol = self.params.rdmsol;

        self.states.update(ctx.kiosk, |s| {
            let w = s.get_f64("W")? + rain + rirr - evs - wtra - perc - rnoff;
            s.set("W", w)?;
            s.set("SM", w / rdmsol)?;
            for (total, amount) in [
                ("RAINT", rain),
                ("TOTIRR", rirr),
                ("EVST", evs),
                ("WTRAT", wtra),
                ("PERCT", perc),
                ("RNOFFT", rnoff),
            ] {
                let sum = s.get_f64(total)? + amount;
                s.set(total, sum)?;
            }
            Ok::<(), furrow_kiosk::ContainerError>(())
        })?;
        Ok(())
    }

    fn on_finalize(&mut self, day: NaiveDate, ctx: &mut Context<'_>) -> Result<(), KernelError> {
        let s = &self.states;
        let balance = Balance {
            kind: BalanceKind::Water,
            component: BUCKET_SOIL,
            inputs: s.get_f64("RAINT")? + s.get_f64("TOTIRR")? + self.w_increments,
            outputs: s.get_f64("EVST")?
                + s.get_f64("WTRAT")?
                + s.get_f64("PERCT")?
                + s.get_f64("RNOFFT")?,
            storage_change: s.get_f64("W")? - s.get_f64("WI")?,
        };
        let checksum = balance.checksum();
        self.states.update(ctx.kiosk, |s| s.set("WBAL", checksum))?;
        check_balance(&balance, day, WATER_BALANCE_TOLERANCE)?;
        Ok(())
    }

    fn on_signal(&mut self, signal: &Signal, _ctx: &mut Context<'_>) -> Result<(), KernelError> {
        if let Signal::Irrigate { amount, efficiency } = signal {
            self.pending_irrigation += amount * efficiency;
            debug!(
                amount,
                efficiency,
                pending = self.pending_irrigation,
                "Irrigation received"
            );
        }
        Ok(())
    }

    fn override_variable(
        &mut self,
        name: &str,
        value: f64,
        kiosk: &mut VariableKiosk,
    ) -> Result<Option<Increments>, KernelError> {
        if name != "SM" {
            return Ok(None);
        }
        let old_sm = self.states.get_f64("SM")?;
        let old_w = self.states.get_f64("W")?;
        let new_w = value * self.params.rdmsol;
        self.states.update(kiosk, |s| {
            s.set("SM", value)?;
            s.set("W", new_w)
        })?;
        self.w_increments += new_w - old_w;
        info!(old = old_sm, new = value, "Soil moisture overridden");
        Ok(Some(Increments::from([
            ("SM".to_owned(), value - old_sm),
            ("W".to_owned(), new_w - old_w),
        ])))
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

/// Builds a [`BucketSoil`] from the soil parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct BucketSoilFactory;

impl ComponentFactory for BucketSoilFactory {
    fn name(&self) -> &str {
        BUCKET_SOIL
    }

    fn build(
        &self,
        _day: NaiveDate,
        kiosk: &mut VariableKiosk,
        params: &ParameterProvider,
    ) -> Result<Box<dyn SimulationObject>, KernelError> {
        let params = BucketParams::from_provider(params)?;
        Ok(Box::new(BucketSoil::new(params, kiosk)?))
    }
}
