//! Locked state and rate containers.
//!
//! A container owns a fixed set of fields declared by a static
//! [`FieldSpec`] schema. Construction registers every field with the
//! [`VariableKiosk`], publishes the requested subset, and seals the
//! container. From then on a declared field can only be written while the
//! container is unlocked, which components do through [`StateVars::update`]
//! and [`RateVars::update`].
//!
//! Names starting with [`PRIVATE_PREFIX`] are bookkeeping, not modelled
//! variables: they are never registered and ignore the lock.

use std::collections::{BTreeMap, BTreeSet};

use furrow_types::{OwnerId, Value, ValueKind, VarKind};
use tracing::{info, warn};

use crate::{ContainerError, VariableKiosk};

/// Prefix of private bookkeeping fields.
pub const PRIVATE_PREFIX: char = '_';

/// Declaration of one container field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Variable name, unique across the whole model.
    pub name: &'static str,
    /// Declared value kind.
    pub kind: ValueKind,
}

impl FieldSpec {
    /// Declare a field of any kind.
    pub const fn new(name: &'static str, kind: ValueKind) -> Self {
        Self { name, kind }
    }

    /// Declare a float field.
    pub const fn float(name: &'static str) -> Self {
        Self::new(name, ValueKind::Float)
    }

    /// Declare an integer field.
    pub const fn int(name: &'static str) -> Self {
        Self::new(name, ValueKind::Int)
    }

    /// Declare a boolean field.
    pub const fn boolean(name: &'static str) -> Self {
        Self::new(name, ValueKind::Bool)
    }

    /// Declare a date field.
    pub const fn date(name: &'static str) -> Self {
        Self::new(name, ValueKind::Date)
    }

    /// Declare a text field.
    pub const fn text(name: &'static str) -> Self {
        Self::new(name, ValueKind::Text)
    }

    /// Declare a table field.
    pub const fn table(name: &'static str) -> Self {
        Self::new(name, ValueKind::Table)
    }
}

/// Field storage shared by states and rates.
#[derive(Debug)]
struct Fields {
    owner: OwnerId,
    var_kind: VarKind,
    schema: &'static [FieldSpec],
    values: BTreeMap<&'static str, Value>,
    published: BTreeSet<&'static str>,
    private: BTreeMap<String, Value>,
    locked: bool,
}

impl Fields {
    fn new(var_kind: VarKind, schema: &'static [FieldSpec]) -> Self {
        Self {
            owner: OwnerId::new(),
            var_kind,
            schema,
            values: BTreeMap::new(),
            published: BTreeSet::new(),
            private: BTreeMap::new(),
            locked: false,
        }
    }

    fn spec(&self, name: &str) -> Option<&'static FieldSpec> {
        self.schema.iter().find(|field| field.name == name)
    }

    /// Register every declared field; roll back on the first failure.
    fn register(
        &mut self,
        kiosk: &mut VariableKiosk,
        publish: &[String],
    ) -> Result<(), ContainerError> {
        let unknown: Vec<String> = publish
            .iter()
            .filter(|name| self.spec(name).is_none())
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(ContainerError::UnknownPublish { names: unknown });
        }

        let mut done: Vec<&'static str> = Vec::with_capacity(self.schema.len());
        for field in self.schema {
            let publish_it = publish.iter().any(|name| name == field.name);
            if let Err(e) = kiosk.register(self.owner, field.name, self.var_kind, publish_it) {
                for name in done {
                    if let Err(rollback) = kiosk.deregister(self.owner, name) {
                        warn!(
                            variable = name,
                            error = %rollback,
                            "Failed to roll back variable registration"
                        );
                    }
                }
                self.published.clear();
                return Err(e.into());
            }
            done.push(field.name);
            if publish_it {
                self.published.insert(field.name);
            }
        }
        Ok(())
    }

    /// Write a declared field, forwarding published values to the kiosk.
    fn assign(
        &mut self,
        kiosk: &mut VariableKiosk,
        name: &str,
        value: Value,
    ) -> Result<(), ContainerError> {
        let Some(spec) = self.spec(name) else {
            return Err(ContainerError::UndeclaredField {
                name: name.to_owned(),
            });
        };
        let found = value.kind();
        let value = spec
            .kind
            .coerce(value)
            .ok_or_else(|| ContainerError::TypeMismatch {
                name: name.to_owned(),
                expected: spec.kind,
                found,
            })?;
        if self.published.contains(spec.name) {
            kiosk.set(self.owner, spec.name, value.clone())?;
        }
        self.values.insert(spec.name, value);
        Ok(())
    }

    fn set_field(
        &mut self,
        kiosk: &mut VariableKiosk,
        name: &str,
        value: Value,
    ) -> Result<(), ContainerError> {
        if name.starts_with(PRIVATE_PREFIX) {
            self.private.insert(name.to_owned(), value);
            return Ok(());
        }
        if self.spec(name).is_none() {
            return Err(ContainerError::UndeclaredField {
                name: name.to_owned(),
            });
        }
        if self.locked {
            return Err(ContainerError::Locked {
                name: name.to_owned(),
            });
        }
        self.assign(kiosk, name, value)
    }

    fn get(&self, name: &str) -> Option<&Value> {
        if name.starts_with(PRIVATE_PREFIX) {
            return self.private.get(name);
        }
        self.values.get(name)
    }

    fn get_f64(&self, name: &str) -> Result<f64, ContainerError> {
        let Some(spec) = self.spec(name) else {
            return Err(ContainerError::UndeclaredField {
                name: name.to_owned(),
            });
        };
        let value = self.values.get(name).ok_or_else(|| ContainerError::Unset {
            name: name.to_owned(),
        })?;
        value.as_f64().ok_or(ContainerError::TypeMismatch {
            name: name.to_owned(),
            expected: ValueKind::Float,
            found: spec.kind,
        })
    }

    fn get_bool(&self, name: &str) -> Result<bool, ContainerError> {
        let Some(spec) = self.spec(name) else {
            return Err(ContainerError::UndeclaredField {
                name: name.to_owned(),
            });
        };
        let value = self.values.get(name).ok_or_else(|| ContainerError::Unset {
            name: name.to_owned(),
        })?;
        value.as_bool().ok_or(ContainerError::TypeMismatch {
            name: name.to_owned(),
            expected: ValueKind::Bool,
            found: spec.kind,
        })
    }

    fn snapshot(&self) -> BTreeMap<String, Value> {
        self.values
            .iter()
            .map(|(name, value)| ((*name).to_owned(), value.clone()))
            .collect()
    }

    fn release(self, kiosk: &mut VariableKiosk) -> Result<(), ContainerError> {
        for field in self.schema {
            kiosk.deregister(self.owner, field.name)?;
        }
        Ok(())
    }
}

/// Write access to a container inside an unlocked bracket.
#[derive(Debug)]
pub struct FieldWriter<'a> {
    fields: &'a mut Fields,
    kiosk: &'a mut VariableKiosk,
}

impl FieldWriter<'_> {
    /// Write a field; published fields are forwarded to the kiosk.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError`] for undeclared fields, kind mismatches and
    /// rejected kiosk writes.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ContainerError> {
        self.fields.set_field(self.kiosk, name, value.into())
    }

    /// Current value of a field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Current value of a numeric field.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError`] if the field is undeclared, unset or not
    /// numeric.
    pub fn get_f64(&self, name: &str) -> Result<f64, ContainerError> {
        self.fields.get_f64(name)
    }
}

/// Run `f` with the container unlocked and restore the previous lock state.
fn bracket<T, E>(
    fields: &mut Fields,
    kiosk: &mut VariableKiosk,
    f: impl FnOnce(&mut FieldWriter<'_>) -> Result<T, E>,
) -> Result<T, E> {
    let was_locked = fields.locked;
    fields.locked = false;
    let result = {
        let mut writer = FieldWriter {
            fields: &mut *fields,
            kiosk,
        };
        f(&mut writer)
    };
    fields.locked = was_locked;
    result
}

/// Container for state variables.
///
/// Built with [`StateVars::builder`]; every declared field needs an
/// initial value.
#[derive(Debug)]
pub struct StateVars {
    fields: Fields,
}

/// Builder collecting initial values and publish names for [`StateVars`].
#[derive(Debug)]
pub struct StatesBuilder {
    schema: &'static [FieldSpec],
    values: BTreeMap<String, Value>,
    publish: Vec<String>,
}

impl StatesBuilder {
    /// Supply the initial value of a field.
    #[must_use]
    pub fn value(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.values.insert(name.to_owned(), value.into());
        self
    }

    /// Supply several initial values.
    #[must_use]
    pub fn values<I, K>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.values
            .extend(values.into_iter().map(|(name, value)| (name.into(), value)));
        self
    }

    /// Publish a field through the kiosk.
    #[must_use]
    pub fn publish(mut self, name: &str) -> Self {
        self.publish.push(name.to_owned());
        self
    }

    /// Publish several fields through the kiosk.
    #[must_use]
    pub fn publish_all(mut self, names: &[&str]) -> Self {
        self.publish.extend(names.iter().map(|name| (*name).to_owned()));
        self
    }

    /// Register, assign the initial values and lock.
    ///
    /// Unknown initial values are logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::MissingInitialValue`] if a declared field
    /// has no value, [`ContainerError::UnknownPublish`] for unknown publish
    /// names, and kiosk errors for duplicate names.
    pub fn build(mut self, kiosk: &mut VariableKiosk) -> Result<StateVars, ContainerError> {
        if let Some(missing) = self
            .schema
            .iter()
            .find(|field| !self.values.contains_key(field.name))
        {
            return Err(ContainerError::MissingInitialValue {
                name: missing.name.to_owned(),
            });
        }
        for name in self.values.keys() {
            if !self.schema.iter().any(|field| field.name == name) {
                warn!(variable = %name, "Initial value specified for unknown state variable");
            }
        }

        let mut fields = Fields::new(VarKind::State, self.schema);
        fields.register(kiosk, &self.publish)?;
        for field in self.schema {
            let Some(value) = self.values.remove(field.name) else {
                continue;
            };
            if let Err(e) = fields.assign(kiosk, field.name, value) {
                if let Err(rollback) = fields.release(kiosk) {
                    warn!(
                        error = %rollback,
                        "Failed to release state container after a rejected initial value"
                    );
                }
                return Err(e);
            }
        }
        fields.locked = true;
        Ok(StateVars { fields })
    }
}

impl StateVars {
    /// Start building a state container for `schema`.
    pub fn builder(schema: &'static [FieldSpec]) -> StatesBuilder {
        StatesBuilder {
            schema,
            values: BTreeMap::new(),
            publish: Vec::new(),
        }
    }

    /// Kiosk identity of this container.
    pub const fn owner(&self) -> OwnerId {
        self.fields.owner
    }

    /// Declared fields.
    pub const fn schema(&self) -> &'static [FieldSpec] {
        self.fields.schema
    }

    /// Whether `name` is a declared field.
    pub fn declares(&self, name: &str) -> bool {
        self.fields.spec(name).is_some()
    }

    /// Whether `name` is published through the kiosk.
    pub fn is_published(&self, name: &str) -> bool {
        self.fields.published.contains(name)
    }

    /// Write one field.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::Locked`] while locked,
    /// [`ContainerError::UndeclaredField`] for undeclared names and
    /// [`ContainerError::TypeMismatch`] for values of the wrong kind.
    pub fn set_field(
        &mut self,
        kiosk: &mut VariableKiosk,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<(), ContainerError> {
        self.fields.set_field(kiosk, name, value.into())
    }

    /// Run `f` with the container unlocked, then restore the lock.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns.
    pub fn update<T, E>(
        &mut self,
        kiosk: &mut VariableKiosk,
        f: impl FnOnce(&mut FieldWriter<'_>) -> Result<T, E>,
    ) -> Result<T, E> {
        bracket(&mut self.fields, kiosk, f)
    }

    /// Current value of a field, private fields included.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Current value of a numeric field.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError`] if the field is undeclared, unset or not
    /// numeric.
    pub fn get_f64(&self, name: &str) -> Result<f64, ContainerError> {
        self.fields.get_f64(name)
    }

    /// Current value of a boolean field.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError`] if the field is undeclared, unset or not
    /// boolean.
    pub fn get_bool(&self, name: &str) -> Result<bool, ContainerError> {
        self.fields.get_bool(name)
    }

    /// Unlock the container.
    pub const fn unlock(&mut self) {
        self.fields.locked = false;
    }

    /// Lock the container.
    pub const fn lock(&mut self) {
        self.fields.locked = true;
    }

    /// Whether the container is locked.
    pub const fn is_locked(&self) -> bool {
        self.fields.locked
    }

    /// Re-assign every field to itself so published values reach the kiosk
    /// again. Values are unchanged; the container is left locked, also when
    /// a write fails.
    ///
    /// # Errors
    ///
    /// Returns kiosk errors if a published value cannot be written.
    pub fn touch(&mut self, kiosk: &mut VariableKiosk) -> Result<(), ContainerError> {
        self.fields.locked = false;
        let current: Vec<(&'static str, Value)> = self
            .fields
            .values
            .iter()
            .map(|(name, value)| (*name, value.clone()))
            .collect();
        let result = current
            .into_iter()
            .try_for_each(|(name, value)| self.fields.assign(kiosk, name, value));
        self.fields.locked = true;
        result
    }

    /// Copy of all declared field values.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.fields.snapshot()
    }

    /// Deregister every field from the kiosk and drop the container.
    ///
    /// # Errors
    ///
    /// Returns kiosk errors if a field is no longer registered to this
    /// container.
    pub fn release(self, kiosk: &mut VariableKiosk) -> Result<(), ContainerError> {
        self.fields.release(kiosk)
    }
}

/// Container for rate variables.
///
/// Fields start at the zero of their kind. Kinds without a zero stay unset
/// until written and are skipped by [`RateVars::zerofy`].
#[derive(Debug)]
pub struct RateVars {
    fields: Fields,
    zeros: BTreeMap<&'static str, Value>,
}

impl RateVars {
    /// Register `schema`, publish `publish`, zero every field and lock.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::UnknownPublish`] for unknown publish names
    /// and kiosk errors for duplicate names.
    pub fn new(
        kiosk: &mut VariableKiosk,
        schema: &'static [FieldSpec],
        publish: &[&str],
    ) -> Result<Self, ContainerError> {
        let publish: Vec<String> = publish.iter().map(|name| (*name).to_owned()).collect();
        let mut fields = Fields::new(VarKind::Rate, schema);
        fields.register(kiosk, &publish)?;

        let mut zeros = BTreeMap::new();
        for field in schema {
            if let Some(zero) = field.kind.zero() {
                zeros.insert(field.name, zero);
            } else {
                info!(
                    variable = field.name,
                    kind = %field.kind,
                    "Rate variable has no zero value and will not be treated by zerofy"
                );
            }
        }

        let mut rates = Self { fields, zeros };
        rates.zerofy();
        rates.fields.locked = true;
        Ok(rates)
    }

    /// Kiosk identity of this container.
    pub const fn owner(&self) -> OwnerId {
        self.fields.owner
    }

    /// Declared fields.
    pub const fn schema(&self) -> &'static [FieldSpec] {
        self.fields.schema
    }

    /// Whether `name` is a declared field.
    pub fn declares(&self, name: &str) -> bool {
        self.fields.spec(name).is_some()
    }

    /// Whether `name` is published through the kiosk.
    pub fn is_published(&self, name: &str) -> bool {
        self.fields.published.contains(name)
    }

    /// Write one field.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::Locked`] while locked,
    /// [`ContainerError::UndeclaredField`] for undeclared names and
    /// [`ContainerError::TypeMismatch`] for values of the wrong kind.
    pub fn set_field(
        &mut self,
        kiosk: &mut VariableKiosk,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<(), ContainerError> {
        self.fields.set_field(kiosk, name, value.into())
    }

    /// Run `f` with the container unlocked, then restore the lock.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns.
    pub fn update<T, E>(
        &mut self,
        kiosk: &mut VariableKiosk,
        f: impl FnOnce(&mut FieldWriter<'_>) -> Result<T, E>,
    ) -> Result<T, E> {
        bracket(&mut self.fields, kiosk, f)
    }

    /// Current value of a field, private fields included.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Current value of a numeric field.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError`] if the field is undeclared, unset or not
    /// numeric.
    pub fn get_f64(&self, name: &str) -> Result<f64, ContainerError> {
        self.fields.get_f64(name)
    }

    /// Current value of a boolean field.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError`] if the field is undeclared, unset or not
    /// boolean.
    pub fn get_bool(&self, name: &str) -> Result<bool, ContainerError> {
        self.fields.get_bool(name)
    }

    /// Unlock the container.
    pub const fn unlock(&mut self) {
        self.fields.locked = false;
    }

    /// Lock the container.
    pub const fn lock(&mut self) {
        self.fields.locked = true;
    }

    /// Whether the container is locked.
    pub const fn is_locked(&self) -> bool {
        self.fields.locked
    }

    /// Reset every zeroable field to `0`, `0.0` or `false`.
    ///
    /// The kiosk is not updated; published rates are flushed from it
    /// separately.
    pub fn zerofy(&mut self) {
        for (name, zero) in &self.zeros {
            self.fields.values.insert(name, zero.clone());
        }
    }

    /// Copy of all declared field values.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.fields.snapshot()
    }

    /// Deregister every field from the kiosk and drop the container.
    ///
    /// # Errors
    ///
    /// Returns kiosk errors if a field is no longer registered to this
    /// container.
    pub fn release(self, kiosk: &mut VariableKiosk) -> Result<(), ContainerError> {
        self.fields.release(kiosk)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp, clippy::arithmetic_side_effects)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::KioskError;

    const STATES: &[FieldSpec] = &[
        FieldSpec::float("DVS"),
        FieldSpec::float("LAI"),
        FieldSpec::boolean("MATURE"),
    ];

    const RATES: &[FieldSpec] = &[
        FieldSpec::float("DVR"),
        FieldSpec::int("COUNT"),
        FieldSpec::boolean("FLAG"),
        FieldSpec::date("DOM"),
    ];

    fn states(kiosk: &mut VariableKiosk) -> StateVars {
        StateVars::builder(STATES)
            .value("DVS", 0.0)
            .value("LAI", 0.1)
            .value("MATURE", false)
            .publish_all(&["DVS", "LAI"])
            .build(kiosk)
            .unwrap()
    }

    #[test]
    fn complete_states_are_locked_and_published() {
        let mut kiosk = VariableKiosk::new();
        let mut s = states(&mut kiosk);

        assert!(s.is_locked());
        assert_eq!(kiosk.get_f64("LAI"), Some(0.1));
        assert!(kiosk.exists("MATURE"));
        assert!(!kiosk.is_published("MATURE"));

        let err = s.set_field(&mut kiosk, "LAI", 2.0).unwrap_err();
        assert!(matches!(err, ContainerError::Locked { .. }));
        assert_eq!(s.get_f64("LAI").unwrap(), 0.1);
    }

    #[test]
    fn missing_initial_value_fails_without_registering() {
        let mut kiosk = VariableKiosk::new();
        let err = StateVars::builder(STATES)
            .value("DVS", 0.0)
            .value("MATURE", false)
            .build(&mut kiosk)
            .unwrap_err();
        assert_eq!(
            err,
            ContainerError::MissingInitialValue {
                name: "LAI".to_owned()
            }
        );
        assert!(!kiosk.exists("DVS"));
    }

    #[test]
    fn unknown_extra_values_are_not_fatal() {
        let mut kiosk = VariableKiosk::new();
        let s = StateVars::builder(STATES)
            .value("DVS", 0.0)
            .value("LAI", 0.1)
            .value("MATURE", false)
            .value("WHATEVER", 3.0)
            .build(&mut kiosk)
            .unwrap();
        assert!(s.get("WHATEVER").is_none());
        assert!(!kiosk.exists("WHATEVER"));
    }

    #[test]
    fn unknown_publish_name_fails() {
        let mut kiosk = VariableKiosk::new();
        let err = RateVars::new(&mut kiosk, RATES, &["DVR", "NOPE"]).unwrap_err();
        assert_eq!(
            err,
            ContainerError::UnknownPublish {
                names: vec!["NOPE".to_owned()]
            }
        );
        assert!(!kiosk.exists("DVR"));
    }

    #[test]
    fn undeclared_and_mistyped_writes_fail() {
        let mut kiosk = VariableKiosk::new();
        let mut s = states(&mut kiosk);
        s.unlock();

        let err = s.set_field(&mut kiosk, "TAGP", 1.0).unwrap_err();
        assert!(matches!(err, ContainerError::UndeclaredField { .. }));
        let err = s.set_field(&mut kiosk, "MATURE", 1.0).unwrap_err();
        assert!(matches!(err, ContainerError::TypeMismatch { .. }));

        s.set_field(&mut kiosk, "DVS", 1_i64).unwrap();
        assert_eq!(s.get("DVS"), Some(&Value::Float(1.0)));
    }

    #[test]
    fn private_fields_ignore_the_lock() {
        let mut kiosk = VariableKiosk::new();
        let mut s = states(&mut kiosk);
        assert!(s.is_locked());

        s.set_field(&mut kiosk, "_counter", 3_i64).unwrap();
        assert_eq!(s.get("_counter"), Some(&Value::Int(3)));
        assert!(!kiosk.exists("_counter"));
    }

    #[test]
    fn update_bracket_publishes_and_relocks() {
        let mut kiosk = VariableKiosk::new();
        let mut s = states(&mut kiosk);

        s.update(&mut kiosk, |w| {
            let dvs = w.get_f64("DVS")?;
            w.set("DVS", dvs + 0.5)
        })
        .unwrap();

        assert!(s.is_locked());
        assert_eq!(kiosk.get_f64("DVS"), Some(0.5));

        let res: Result<(), ContainerError> = s.update(&mut kiosk, |w| w.set("NOPE", 1.0));
        assert!(res.is_err());
        assert!(s.is_locked());
    }

    #[test]
    fn touch_republishes_without_changing_values() {
        let mut kiosk = VariableKiosk::new();
        let mut s = states(&mut kiosk);
        let before = s.snapshot();
        let writes = kiosk.write_count();

        kiosk.flush_states();
        assert!(kiosk.get("DVS").is_none());

        s.touch(&mut kiosk).unwrap();
        assert_eq!(s.snapshot(), before);
        assert_eq!(kiosk.write_count(), writes + 2);
        assert_eq!(kiosk.get_f64("DVS"), Some(0.0));
        assert!(s.is_locked());
    }

    #[test]
    fn failed_touch_keeps_container_locked() {
        let mut kiosk = VariableKiosk::new();
        let mut other = VariableKiosk::new();
        let mut s = states(&mut kiosk);

        let err = s.touch(&mut other).unwrap_err();
        assert!(matches!(err, ContainerError::Kiosk { .. }));
        assert!(s.is_locked());

        let err = s.set_field(&mut kiosk, "LAI", 5.0).unwrap_err();
        assert!(matches!(err, ContainerError::Locked { .. }));
        assert_eq!(s.get_f64("LAI").unwrap(), 0.1);
    }

    #[test]
    fn rates_start_at_zero_and_zerofy_resets() {
        let mut kiosk = VariableKiosk::new();
        let mut r = RateVars::new(&mut kiosk, RATES, &["DVR"]).unwrap();

        assert!(r.is_locked());
        assert_eq!(r.get("DVR"), Some(&Value::Float(0.0)));
        assert_eq!(r.get("COUNT"), Some(&Value::Int(0)));
        assert_eq!(r.get("FLAG"), Some(&Value::Bool(false)));
        assert!(r.get("DOM").is_none());
        assert!(kiosk.get("DVR").is_none());

        let dom = NaiveDate::from_ymd_opt(2000, 8, 1).unwrap();
        r.update(&mut kiosk, |w| {
            w.set("DVR", 0.02)?;
            w.set("COUNT", 4_i64)?;
            w.set("FLAG", true)?;
            w.set("DOM", dom)
        })
        .unwrap();
        assert_eq!(kiosk.get_f64("DVR"), Some(0.02));

        r.zerofy();
        assert_eq!(r.get_f64("DVR").unwrap(), 0.0);
        assert_eq!(r.get("COUNT"), Some(&Value::Int(0)));
        assert!(!r.get_bool("FLAG").unwrap());
        assert_eq!(r.get("DOM"), Some(&Value::Date(dom)));
        // zerofy does not publish
        assert_eq!(kiosk.get_f64("DVR"), Some(0.02));
    }

    #[test]
    fn release_deregisters_every_field() {
        let mut kiosk = VariableKiosk::new();
        let before = kiosk.to_string();
        let s = states(&mut kiosk);
        let r = RateVars::new(&mut kiosk, RATES, &["DVR"]).unwrap();

        s.release(&mut kiosk).unwrap();
        r.release(&mut kiosk).unwrap();
        assert_eq!(kiosk.to_string(), before);
        assert!(!kiosk.exists("LAI"));
    }

    #[test]
    fn duplicate_name_across_containers_rolls_back() {
        const CLASH: &[FieldSpec] = &[FieldSpec::float("RD"), FieldSpec::float("LAI")];
        let mut kiosk = VariableKiosk::new();
        let _s = states(&mut kiosk);

        let err = StateVars::builder(CLASH)
            .value("RD", 10.0)
            .value("LAI", 0.0)
            .build(&mut kiosk)
            .unwrap_err();
        assert!(matches!(
            err,
            ContainerError::Kiosk {
                source: KioskError::DuplicateVariable { .. }
            }
        ));
        assert!(!kiosk.exists("RD"));
    }

    #[test]
    fn rejected_initial_value_releases_registrations() {
        let mut kiosk = VariableKiosk::new();
        let err = StateVars::builder(STATES)
            .value("DVS", 0.0)
            .value("LAI", 0.1)
            .value("MATURE", "yes")
            .publish("DVS")
            .build(&mut kiosk)
            .unwrap_err();
        assert!(matches!(err, ContainerError::TypeMismatch { .. }));
        assert!(!kiosk.exists("DVS"));
        assert!(!kiosk.exists("MATURE"));

        // the names are free again
        let _s = states(&mut kiosk);
        assert_eq!(kiosk.get_f64("DVS"), Some(0.0));
    }
}
