//! Thermal-time crop.
//!
//! Above-ground biomass `TAGP` grows in proportion to the daily temperature
//! sum of the [`Phenology`] sub-component, reduced by a nitrogen factor that
//! rises with the effective nitrogen applied. The crop publishes its
//! potential transpiration `TRA` for the soil water balance and handles
//! `apply_n` and `mowing` events.

pub mod phenology;

use chrono::NaiveDate;
use furrow_core::{
    Balance, BalanceKind, ComponentFactory, ComponentParts, Context, DrivingVariables, Increments,
    KernelError, ParameterProvider, SimulationObject, check_balance,
};
use furrow_kiosk::{ContainerError, FieldSpec, RateVars, StateVars, VariableKiosk};
use furrow_types::{Signal, SignalKind, SubscriberId};
use tracing::{info, warn};

pub use phenology::{Phenology, PhenologyParams, Stage, StageDates};

use crate::afgen::limit;

/// Component name of the crop.
pub const THERMAL_TIME_CROP: &str = "thermal_time_crop";

/// Tolerance of the biomass balance (kg/ha).
pub const BIOMASS_BALANCE_TOLERANCE: f64 = 0.0001;

const STATES: &[FieldSpec] = &[
    FieldSpec::float("TAGP"),
    FieldSpec::float("GASST"),
    FieldSpec::float("MOWT"),
    FieldSpec::float("NAPPT"),
];

const RATES: &[FieldSpec] = &[
    FieldSpec::float("GASS"),
    FieldSpec::float("RNAPP"),
    FieldSpec::float("TRA"),
];

/// Growth and water use parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropParams {
    /// Initial above-ground biomass (kg/ha).
    pub tdwi: f64,
    /// Biomass produced per degree-day (kg/ha/°C d).
    pub cvf: f64,
    /// Relative growth without applied nitrogen.
    pub nfac0: f64,
    /// Effective nitrogen for unlimited growth (kg/ha).
    pub nopt: f64,
    /// Potential transpiration relative to `ET0` at full cover.
    pub cfet: f64,
}

impl CropParams {
    /// Read and check the parameters.
    pub fn from_provider(params: &ParameterProvider) -> Result<Self, KernelError> {
        let p = Self {
            tdwi: params.get_f64("TDWI")?,
            cvf: params.get_f64("CVF")?,
            nfac0: params.get_f64("NFAC0")?,
            nopt: params.get_f64("NOPT")?,
            cfet: params.get_f64("CFET")?,
        };
        if p.nopt <= 0.0 {
            return Err(KernelError::Component {
                component: THERMAL_TIME_CROP.to_owned(),
                message: format!("NOPT must be positive, got {}", p.nopt),
            });
        }
        Ok(p)
    }
}

fn register(
    kiosk: &mut VariableKiosk,
    tdwi: f64,
) -> Result<(StateVars, RateVars), ContainerError> {
    let states = StateVars::builder(STATES)
        .value("TAGP", tdwi)
        .value("GASST", 0.0)
        .value("MOWT", 0.0)
        .value("NAPPT", 0.0)
        .publish("TAGP")
        .build(kiosk)?;
    match RateVars::new(kiosk, RATES, &["TRA"]) {
        Ok(rates) => Ok((states, rates)),
        Err(e) => {
            if let Err(rollback) = states.release(kiosk) {
                warn!(error = %rollback, "Failed to release crop states");
            }
            Err(e)
        }
    }
}

/// Crop with temperature-driven development and growth.
#[derive(Debug)]
pub struct ThermalTimeCrop {
    id: SubscriberId,
    params: CropParams,
    states: StateVars,
    rates: RateVars,
    phenology: Phenology,
    /// Effective nitrogen received since the last rate calculation.
    pending_n: f64,
    /// Biomass to leave after the next integration.
    pending_mowing: Option<f64>,
    /// Net biomass added by out-of-band edits of `TAGP`.
    tagp_increments: f64,
}

impl ThermalTimeCrop {
    /// Register the crop and its phenology in `kiosk`.
    pub fn new(
        day: NaiveDate,
        params: CropParams,
        phenology: PhenologyParams,
        kiosk: &mut VariableKiosk,
    ) -> Result<Self, KernelError> {
        let phenology = Phenology::new(day, phenology, kiosk)?;
        let (states, rates) = match register(kiosk, params.tdwi) {
            Ok(containers) => containers,
            Err(e) => {
                phenology.discard(kiosk);
                return Err(e.into());
            }
        };
        Ok(Self {
            id: SubscriberId::new(),
            params,
            states,
            rates,
            phenology,
            pending_n: 0.0,
            pending_mowing: None,
            tagp_increments: 0.0,
        })
    }

    /// The phenology sub-component.
    pub const fn phenology(&self) -> &Phenology {
        &self.phenology
    }
}

impl SimulationObject for ThermalTimeCrop {
    fn name(&self) -> &str {
        THERMAL_TIME_CROP
    }

    fn subscriber(&self) -> SubscriberId {
        self.id
    }

    fn signals(&self) -> &'static [SignalKind] {
        &[SignalKind::ApplyN, SignalKind::Mowing]
    }

    fn calc_rates(
        &mut self,
        day: NaiveDate,
        drv: &DrivingVariables,
        ctx: &mut Context<'_>,
    ) -> Result<(), KernelError> {
        self.phenology.calc_rates(day, drv, ctx)?;

        let p = self.params;
        let nfac = limit(0.0, 1.0, p.nfac0 + self.states.get_f64("NAPPT")? / p.nopt);
        let gass = p.cvf * self.phenology.dtsum()? * nfac;
        let cover = limit(0.0, 1.0, self.phenology.dvs()?);
        let tra = p.cfet * drv.get("ET0").unwrap_or(0.0) * cover;
        let rnapp = core::mem::take(&mut self.pending_n);

        self.rates.update(ctx.kiosk, |r| {
            r.set("GASS", gass)?;
            r.set("RNAPP", rnapp)?;
            r.set("TRA", tra)
        })?;
        Ok(())
    }

    fn integrate(
        &mut self,
        day: NaiveDate,
        delt: f64,
        ctx: &mut Context<'_>,
    ) -> Result<(), KernelError> {
        self.phenology.integrate(day, delt, ctx)?;

        let gass = self.rates.get_f64("GASS")? * delt;
        let rnapp = self.rates.get_f64("RNAPP")? * delt;
        let mut tagp = self.states.get_f64("TAGP")? + gass;
        let mut mowt = self.states.get_f64("MOWT")?;
        if let Some(remaining) = self.pending_mowing.take().filter(|left| tagp > *left) {
            info!(%day, removed = tagp - remaining, "Crop mowed");
            mowt += tagp - remaining;
            tagp = remaining;
        }

        self.states.update(ctx.kiosk, |s| {
            let gasst = s.get_f64("GASST")? + gass;
            let nappt = s.get_f64("NAPPT")? + rnapp;
            s.set("TAGP", tagp)?;
            s.set("GASST", gasst)?;
            s.set("MOWT", mowt)?;
            s.set("NAPPT", nappt)
        })?;
        Ok(())
    }

    fn on_finalize(&mut self, day: NaiveDate, _ctx: &mut Context<'_>) -> Result<(), KernelError> {
        let tagp = self.states.get_f64("TAGP")?;
        let balance = Balance {
            kind: BalanceKind::Carbon,
            component: THERMAL_TIME_CROP,
            inputs: self.states.get_f64("GASST")? + self.tagp_increments,
            outputs: self.states.get_f64("MOWT")?,
            storage_change: tagp - self.params.tdwi,
        };
        check_balance(&balance, day, BIOMASS_BALANCE_TOLERANCE)?;
        info!(
            %day,
            tagp,
            dvs = self.phenology.dvs()?,
            stage = self.phenology.stage().as_str(),
            "Crop finalized"
        );
        Ok(())
    }

    fn on_signal(&mut self, signal: &Signal, _ctx: &mut Context<'_>) -> Result<(), KernelError> {
        match signal {
            Signal::ApplyN {
                n_amount,
                n_recovery,
            } => {
                self.pending_n += n_amount * n_recovery;
                info!(n_amount, n_recovery, "Nitrogen applied");
            }
            Signal::Mowing { biomass_remaining } => {
                self.pending_mowing = Some(*biomass_remaining);
            }
            _ => {}
        }
        Ok(())
    }

    fn override_variable(
        &mut self,
        name: &str,
        value: f64,
        kiosk: &mut VariableKiosk,
    ) -> Result<Option<Increments>, KernelError> {
        if name != "TAGP" {
            return Ok(None);
        }
        let old = self.states.get_f64("TAGP")?;
        self.states.update(kiosk, |s| s.set("TAGP", value))?;
        self.tagp_increments += value - old;
        Ok(Some(Increments::from([("TAGP".to_owned(), value - old)])))
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

    fn children(&self) -> Vec<&dyn SimulationObject> {
        vec![&self.phenology as &dyn SimulationObject]
    }

    fn children_mut(&mut self) -> Vec<&mut dyn SimulationObject> {
        vec![&mut self.phenology as &mut dyn SimulationObject]
    }

    fn into_parts(self: Box<Self>) -> ComponentParts {
        ComponentParts {
            states: Some(self.states),
            rates: Some(self.rates),
            children: vec![Box::new(self.phenology) as Box<dyn SimulationObject>],
        }
    }
}

/// Builds a [`ThermalTimeCrop`] when a crop calendar starts a cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThermalTimeCropFactory;

impl ComponentFactory for ThermalTimeCropFactory {
    fn name(&self) -> &str {
        THERMAL_TIME_CROP
    }

    fn build(
        &self,
        day: NaiveDate,
        kiosk: &mut VariableKiosk,
        params: &ParameterProvider,
    ) -> Result<Box<dyn SimulationObject>, KernelError> {
        let crop = CropParams::from_provider(params)?;
        let phenology = PhenologyParams::from_provider(params)?;
        Ok(Box::new(ThermalTimeCrop::new(day, crop, phenology, kiosk)?))
    }
}
