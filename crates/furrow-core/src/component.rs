//! The component trait and the recursive operations over component trees.
//!
//! A pluggable process module (a crop, a soil, or a nested part of either)
//! implements [`SimulationObject`]. The engine owns components as boxed
//! trait objects and never reaches into their fields directly. Operations
//! that must reach every nested sub-component are free functions in this
//! module that walk [`SimulationObject::children_mut`]: [`zerofy`],
//! [`touch`], [`finalize`], [`get_variable`], [`set_variable`], [`connect`],
//! [`deliver`] and [`release`].
//!
//! Components are built by a [`ComponentFactory`] handed to the engine.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use furrow_kiosk::{RateVars, StateVars, VariableKiosk};
use furrow_signals::{Delivery, SignalBus, SignalError};
use furrow_types::{KioskId, Signal, SignalKind, SubscriberId, Value};

use crate::error::KernelError;
use crate::params::ParameterProvider;
use crate::weather::DrivingVariables;

/// Secondary state changes caused by an out-of-band state edit, as
/// `new - old` per variable.
pub type Increments = BTreeMap<String, f64>;

/// Mutable access to the run-wide kiosk and signal bus.
#[derive(Debug)]
pub struct Context<'a> {
    /// The kiosk of the run.
    pub kiosk: &'a mut VariableKiosk,
    /// The signal bus of the run.
    pub bus: &'a mut SignalBus,
}

/// The containers and sub-components of a component being torn down.
#[derive(Debug, Default)]
pub struct ComponentParts {
    /// State container, if any.
    pub states: Option<StateVars>,
    /// Rate container, if any.
    pub rates: Option<RateVars>,
    /// Nested sub-components.
    pub children: Vec<Box<dyn SimulationObject>>,
}

/// A pluggable process module with a daily rate/integrate lifecycle.
///
/// Only [`calc_rates`](Self::calc_rates), [`integrate`](Self::integrate),
/// the identity methods and [`into_parts`](Self::into_parts) are required.
/// Containers and children default to none.
pub trait SimulationObject: core::fmt::Debug {
    /// Component name used in logs and errors.
    fn name(&self) -> &str;

    /// Identity of the component on the signal bus.
    fn subscriber(&self) -> SubscriberId;

    /// Signal kinds the component wants delivered to
    /// [`on_signal`](Self::on_signal).
    fn signals(&self) -> &'static [SignalKind] {
        &[]
    }

    /// Compute today's rates from today's states and driving variables.
    fn calc_rates(
        &mut self,
        day: NaiveDate,
        drv: &DrivingVariables,
        ctx: &mut Context<'_>,
    ) -> Result<(), KernelError>;

    /// Integrate yesterday's rates into today's states.
    fn integrate(
        &mut self,
        day: NaiveDate,
        delt: f64,
        ctx: &mut Context<'_>,
    ) -> Result<(), KernelError>;

    /// Final bookkeeping before the component is summarized or dropped.
    /// Sub-components are finalized after this returns.
    fn on_finalize(&mut self, _day: NaiveDate, _ctx: &mut Context<'_>) -> Result<(), KernelError> {
        Ok(())
    }

    /// Handle a signal this component is connected to.
    fn on_signal(&mut self, _signal: &Signal, _ctx: &mut Context<'_>) -> Result<(), KernelError> {
        Ok(())
    }

    /// Force `name` to `value` from outside the day loop.
    ///
    /// Returns `None` when this component has no mutator for `name`, and
    /// the increments of every state it changed otherwise.
    fn override_variable(
        &mut self,
        _name: &str,
        _value: f64,
        _kiosk: &mut VariableKiosk,
    ) -> Result<Option<Increments>, KernelError> {
        Ok(None)
    }

    /// State container, if the component has one.
    fn states(&self) -> Option<&StateVars> {
        None
    }

    /// Mutable state container.
    fn states_mut(&mut self) -> Option<&mut StateVars> {
        None
    }

    /// Rate container, if the component has one.
    fn rates(&self) -> Option<&RateVars> {
        None
    }

    /// Mutable rate container.
    fn rates_mut(&mut self) -> Option<&mut RateVars> {
        None
    }

    /// Nested sub-components.
    fn children(&self) -> Vec<&dyn SimulationObject> {
        Vec::new()
    }

    /// Mutable nested sub-components.
    fn children_mut(&mut self) -> Vec<&mut dyn SimulationObject> {
        Vec::new()
    }

    /// Split the component into its containers and sub-components.
    fn into_parts(self: Box<Self>) -> ComponentParts;
}

/// Builds a component when the engine mounts it.
pub trait ComponentFactory {
    /// Name of the component this factory builds.
    fn name(&self) -> &str;

    /// Build the component for a run starting or mounting on `day`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when parameters are missing or the containers
    /// cannot be registered.
    fn build(
        &self,
        day: NaiveDate,
        kiosk: &mut VariableKiosk,
        params: &ParameterProvider,
    ) -> Result<Box<dyn SimulationObject>, KernelError>;
}

/// Reset the rates of `obj` and all its sub-components.
pub fn zerofy(obj: &mut dyn SimulationObject) {
    if let Some(rates) = obj.rates_mut() {
        rates.zerofy();
    }
    for child in obj.children_mut() {
        zerofy(child);
    }
}

/// Re-publish the states of `obj` and all its sub-components.
///
/// # Errors
///
/// Returns container errors from [`StateVars::touch`].
pub fn touch(obj: &mut dyn SimulationObject, kiosk: &mut VariableKiosk) -> Result<(), KernelError> {
    if let Some(states) = obj.states_mut() {
        states.touch(kiosk)?;
    }
    for child in obj.children_mut() {
        touch(child, kiosk)?;
    }
    Ok(())
}

/// Finalize `obj`, then its sub-components.
///
/// # Errors
///
/// Returns the first error raised by a component.
pub fn finalize(
    obj: &mut dyn SimulationObject,
    day: NaiveDate,
    ctx: &mut Context<'_>,
) -> Result<(), KernelError> {
    obj.on_finalize(day, ctx)?;
    for child in obj.children_mut() {
        finalize(child, day, ctx)?;
    }
    Ok(())
}

/// Value of `name` in the states, then the rates of `obj`, then its
/// sub-components. The name is matched exactly.
pub fn get_variable(obj: &dyn SimulationObject, name: &str) -> Option<Value> {
    if let Some(value) = obj.states().and_then(|s| s.get(name)) {
        return Some(value.clone());
    }
    if let Some(value) = obj.rates().and_then(|r| r.get(name)) {
        return Some(value.clone());
    }
    obj.children()
        .into_iter()
        .find_map(|child| get_variable(child, name))
}

/// Offer `name = value` to `obj` and every sub-component, merging the
/// returned increments into `increments`.
///
/// # Errors
///
/// Returns the first error raised by a mutator.
pub fn set_variable(
    obj: &mut dyn SimulationObject,
    name: &str,
    value: f64,
    kiosk: &mut VariableKiosk,
    increments: &mut Increments,
) -> Result<(), KernelError> {
    if let Some(changed) = obj.override_variable(name, value, kiosk)? {
        increments.extend(changed);
    }
    for child in obj.children_mut() {
        set_variable(child, name, value, kiosk, increments)?;
    }
    Ok(())
}

/// Connect `obj` and its sub-components to the signals they handle.
///
/// # Errors
///
/// Returns [`SignalError::ForeignKiosk`] if `kiosk` does not scope `bus`.
pub fn connect(
    obj: &dyn SimulationObject,
    kiosk: KioskId,
    bus: &mut SignalBus,
) -> Result<(), SignalError> {
    bus.connect_all(kiosk, obj.subscriber(), obj.signals())?;
    for child in obj.children() {
        connect(child, kiosk, bus)?;
    }
    Ok(())
}

/// Hand `delivery` to every component in the tree it is addressed to.
///
/// # Errors
///
/// Returns the first error raised by a handler.
pub fn deliver(
    obj: &mut dyn SimulationObject,
    delivery: &Delivery,
    ctx: &mut Context<'_>,
) -> Result<(), KernelError> {
    if delivery.recipients.contains(&obj.subscriber()) {
        obj.on_signal(&delivery.signal, ctx)?;
    }
    for child in obj.children_mut() {
        deliver(child, delivery, ctx)?;
    }
    Ok(())
}

fn disconnect(obj: &dyn SimulationObject, bus: &mut SignalBus) {
    bus.disconnect_all(obj.subscriber());
    for child in obj.children() {
        disconnect(child, bus);
    }
}

/// Tear down `obj`: disconnect the tree from the bus and deregister every
/// container from the kiosk.
///
/// # Errors
///
/// Returns container errors if a variable is no longer registered to its
/// container.
pub fn release(
    obj: Box<dyn SimulationObject>,
    kiosk: &mut VariableKiosk,
    bus: &mut SignalBus,
) -> Result<(), KernelError> {
    disconnect(obj.as_ref(), bus);
    release_parts(obj.into_parts(), kiosk)
}

fn release_parts(parts: ComponentParts, kiosk: &mut VariableKiosk) -> Result<(), KernelError> {
    if let Some(states) = parts.states {
        states.release(kiosk)?;
    }
    if let Some(rates) = parts.rates {
        rates.release(kiosk)?;
    }
    for child in parts.children {
        release_parts(child.into_parts(), kiosk)?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use furrow_kiosk::FieldSpec;

    use super::*;

    const LEAF_STATES: &[FieldSpec] = &[FieldSpec::float("LEAF")];
    const LEAF_RATES: &[FieldSpec] = &[FieldSpec::float("GROWTH")];
    const ROOT_STATES: &[FieldSpec] = &[FieldSpec::float("TOTAL")];

    #[derive(Debug)]
    struct Leaf {
        id: SubscriberId,
        states: StateVars,
        rates: RateVars,
        irrigated: f64,
        finalized: bool,
    }

    impl SimulationObject for Leaf {
        fn name(&self) -> &str {
            "leaf"
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
            _drv: &DrivingVariables,
            ctx: &mut Context<'_>,
        ) -> Result<(), KernelError> {
            self.rates.update(ctx.kiosk, |w| w.set("GROWTH", 0.5))?;
            Ok(())
        }

        fn integrate(
            &mut self,
            _day: NaiveDate,
            _delt: f64,
            _ctx: &mut Context<'_>,
        ) -> Result<(), KernelError> {
            Ok(())
        }

        fn on_finalize(&mut self, _day: NaiveDate, _ctx: &mut Context<'_>) -> Result<(), KernelError> {
            self.finalized = true;
            Ok(())
        }

        fn on_signal(&mut self, signal: &Signal, _ctx: &mut Context<'_>) -> Result<(), KernelError> {
            if let Signal::Irrigate { amount, .. } = signal {
                self.irrigated += amount;
            }
            Ok(())
        }

        fn override_variable(
            &mut self,
            name: &str,
            value: f64,
            kiosk: &mut VariableKiosk,
        ) -> Result<Option<Increments>, KernelError> {
            if name != "LEAF" {
                return Ok(None);
            }
            let old = self.states.get_f64("LEAF")?;
            self.states.update(kiosk, |w| w.set("LEAF", value))?;
            Ok(Some(Increments::from([("LEAF".to_owned(), value - old)])))
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

    #[derive(Debug)]
    struct Root {
        id: SubscriberId,
        states: StateVars,
        leaf: Leaf,
    }

    impl SimulationObject for Root {
        fn name(&self) -> &str {
            "root"
        }

        fn subscriber(&self) -> SubscriberId {
            self.id
        }

        fn calc_rates(
            &mut self,
            day: NaiveDate,
            drv: &DrivingVariables,
            ctx: &mut Context<'_>,
        ) -> Result<(), KernelError> {
            self.leaf.calc_rates(day, drv, ctx)
        }

        fn integrate(
            &mut self,
            _day: NaiveDate,
            _delt: f64,
            _ctx: &mut Context<'_>,
        ) -> Result<(), KernelError> {
            Ok(())
        }

        fn states(&self) -> Option<&StateVars> {
            Some(&self.states)
        }

        fn states_mut(&mut self) -> Option<&mut StateVars> {
            Some(&mut self.states)
        }

        fn children(&self) -> Vec<&dyn SimulationObject> {
            vec![&self.leaf as &dyn SimulationObject]
        }

        fn children_mut(&mut self) -> Vec<&mut dyn SimulationObject> {
            vec![&mut self.leaf as &mut dyn SimulationObject]
        }

        fn into_parts(self: Box<Self>) -> ComponentParts {
            ComponentParts {
                states: Some(self.states),
                rates: None,
                children: vec![Box::new(self.leaf) as Box<dyn SimulationObject>],
            }
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()
    }

    fn tree(kiosk: &mut VariableKiosk) -> Root {
        let leaf = Leaf {
            id: SubscriberId::new(),
            states: StateVars::builder(LEAF_STATES)
                .value("LEAF", 1.0)
                .publish("LEAF")
                .build(kiosk)
                .unwrap(),
            rates: RateVars::new(kiosk, LEAF_RATES, &["GROWTH"]).unwrap(),
            irrigated: 0.0,
            finalized: false,
        };
        Root {
            id: SubscriberId::new(),
            states: StateVars::builder(ROOT_STATES)
                .value("TOTAL", 3.0)
                .build(kiosk)
                .unwrap(),
            leaf,
        }
    }

    #[test]
    fn lookup_recurses_into_children() {
        let mut kiosk = VariableKiosk::new();
        let root = tree(&mut kiosk);
        assert_eq!(get_variable(&root, "TOTAL"), Some(Value::Float(3.0)));
        assert_eq!(get_variable(&root, "LEAF"), Some(Value::Float(1.0)));
        assert_eq!(get_variable(&root, "GROWTH"), Some(Value::Float(0.0)));
        assert_eq!(get_variable(&root, "leaf"), None);
    }

    #[test]
    fn zerofy_and_finalize_reach_children() {
        let mut kiosk = VariableKiosk::new();
        let mut bus = SignalBus::for_kiosk(kiosk.id());
        let mut root = tree(&mut kiosk);
        let drv = DrivingVariables::new(day());
        let mut ctx = Context {
            kiosk: &mut kiosk,
            bus: &mut bus,
        };
        root.calc_rates(day(), &drv, &mut ctx).unwrap();
        assert_eq!(root.leaf.rates.get_f64("GROWTH").unwrap(), 0.5);

        zerofy(&mut root);
        assert_eq!(root.leaf.rates.get_f64("GROWTH").unwrap(), 0.0);

        finalize(&mut root, day(), &mut ctx).unwrap();
        assert!(root.leaf.finalized);
    }

    #[test]
    fn set_variable_merges_increments() {
        let mut kiosk = VariableKiosk::new();
        let mut root = tree(&mut kiosk);
        let mut increments = Increments::new();
        set_variable(&mut root, "LEAF", 4.0, &mut kiosk, &mut increments).unwrap();
        assert_eq!(increments.get("LEAF"), Some(&3.0));
        assert_eq!(kiosk.get_f64("LEAF"), Some(4.0));

        let mut none = Increments::new();
        set_variable(&mut root, "TOTAL", 1.0, &mut kiosk, &mut none).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn signals_reach_connected_children_only_until_release() {
        let mut kiosk = VariableKiosk::new();
        let mut bus = SignalBus::for_kiosk(kiosk.id());
        let mut root = tree(&mut kiosk);
        connect(&root, kiosk.id(), &mut bus).unwrap();
        assert!(bus.is_connected(root.leaf.id, SignalKind::Irrigate));

        bus.send(Signal::Irrigate {
            amount: 2.0,
            efficiency: 1.0,
        });
        let delivery = bus.next_delivery().unwrap();
        let mut ctx = Context {
            kiosk: &mut kiosk,
            bus: &mut bus,
        };
        deliver(&mut root, &delivery, &mut ctx).unwrap();
        assert_eq!(root.leaf.irrigated, 2.0);

        let leaf_id = root.leaf.id;
        release(Box::new(root), &mut kiosk, &mut bus).unwrap();
        assert!(!bus.is_connected(leaf_id, SignalKind::Irrigate));
        assert!(!kiosk.exists("LEAF"));
        assert!(!kiosk.exists("GROWTH"));
        assert!(!kiosk.exists("TOTAL"));
    }

    #[test]
    fn touch_republishes_states() {
        let mut kiosk = VariableKiosk::new();
        let mut root = tree(&mut kiosk);
        kiosk.flush_states();
        assert!(kiosk.get("LEAF").is_none());
        touch(&mut root, &mut kiosk).unwrap();
        assert_eq!(kiosk.get_f64("LEAF"), Some(1.0));
    }
}
