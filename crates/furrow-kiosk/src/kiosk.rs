//! The variable kiosk: a run-wide registry of variable names and owners.
//!
//! Every state and rate variable in a simulation is registered here by the
//! container that declares it. Registration guarantees that a name is unique
//! across the whole model. A subset of the registered variables is
//! *published*: their current values are visible to every component through
//! [`VariableKiosk::get`], but only the publishing owner may write them.
//!
//! # Invariants
//!
//! - A name is registered at most once, regardless of its [`VarKind`].
//! - Only the registering owner may deregister a name.
//! - Only the publishing owner may set a published value.
//! - Flushing removes values, never registrations.

use std::collections::BTreeMap;

use furrow_types::{KioskId, OwnerId, Value, VarKind};

use crate::KioskError;

/// Registration record for one variable name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    /// The container that registered the name.
    pub owner: OwnerId,
    /// State or rate.
    pub kind: VarKind,
    /// Whether the value is visible through the kiosk.
    pub published: bool,
}

/// Run-wide registry of state and rate variables.
#[derive(Debug)]
pub struct VariableKiosk {
    /// Identity of this kiosk; scopes the signal bus of the run.
    id: KioskId,
    /// All registrations, by name.
    registered: BTreeMap<String, Registration>,
    /// Current values of published variables.
    values: BTreeMap<String, Value>,
    /// Number of successful `set` calls since creation.
    writes: u64,
}

impl VariableKiosk {
    /// Create an empty kiosk with a fresh identity.
    pub fn new() -> Self {
        Self {
            id: KioskId::new(),
            registered: BTreeMap::new(),
            values: BTreeMap::new(),
            writes: 0,
        }
    }

    /// Identity of this kiosk.
    pub const fn id(&self) -> KioskId {
        self.id
    }

    /// Register `name` on behalf of `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`KioskError::DuplicateVariable`] if the name is already
    /// registered by anyone.
    pub fn register(
        &mut self,
        owner: OwnerId,
        name: &str,
        kind: VarKind,
        publish: bool,
    ) -> Result<(), KioskError> {
        if self.registered.contains_key(name) {
            return Err(KioskError::DuplicateVariable {
                name: name.to_owned(),
            });
        }
        self.registered.insert(
            name.to_owned(),
            Registration {
                owner,
                kind,
                published: publish,
            },
        );
        Ok(())
    }

    /// Remove the registration of `name` and any stored value.
    ///
    /// # Errors
    ///
    /// Returns [`KioskError::NotRegistered`] for unknown names and
    /// [`KioskError::WrongOwner`] if `owner` did not register the name.
    pub fn deregister(&mut self, owner: OwnerId, name: &str) -> Result<(), KioskError> {
        let Some(registration) = self.registered.get(name) else {
            return Err(KioskError::NotRegistered {
                name: name.to_owned(),
            });
        };
        if registration.owner != owner {
            return Err(KioskError::WrongOwner {
                name: name.to_owned(),
            });
        }
        self.registered.remove(name);
        self.values.remove(name);
        Ok(())
    }

    /// Store `value` for the published variable `name`.
    ///
    /// # Errors
    ///
    /// Returns [`KioskError::NotPublished`] if the name is not registered as
    /// published and [`KioskError::AccessDenied`] if `owner` is not the
    /// publishing owner.
    pub fn set(&mut self, owner: OwnerId, name: &str, value: Value) -> Result<(), KioskError> {
        match self.registered.get(name) {
            Some(reg) if reg.published => {
                if reg.owner != owner {
                    return Err(KioskError::AccessDenied {
                        name: name.to_owned(),
                    });
                }
            }
            _ => {
                return Err(KioskError::NotPublished {
                    name: name.to_owned(),
                });
            }
        }
        self.values.insert(name.to_owned(), value);
        self.writes = self.writes.saturating_add(1);
        Ok(())
    }

    /// Current value of a published variable, if one is stored.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Current value of a published variable as a float.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(Value::as_f64)
    }

    /// Whether `name` is registered, published or not.
    pub fn exists(&self, name: &str) -> bool {
        self.registered.contains_key(name)
    }

    /// Whether a value is currently stored for `name`.
    pub fn has_value(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Whether `name` is registered and published.
    pub fn is_published(&self, name: &str) -> bool {
        self.registered.get(name).is_some_and(|reg| reg.published)
    }

    /// The registration record of `name`.
    pub fn registration(&self, name: &str) -> Option<&Registration> {
        self.registered.get(name)
    }

    /// Remove the stored values of all published state variables.
    pub fn flush_states(&mut self) {
        self.flush(VarKind::State);
    }

    /// Remove the stored values of all published rate variables.
    pub fn flush_rates(&mut self) {
        self.flush(VarKind::Rate);
    }

    /// Remove the stored values of all published variables of `kind`.
    pub fn flush(&mut self, kind: VarKind) {
        let registered = &self.registered;
        self.values
            .retain(|name, _| registered.get(name).is_none_or(|reg| reg.kind != kind));
    }

    /// Number of registered variables of `kind`.
    pub fn registered_count(&self, kind: VarKind) -> usize {
        self.registered.values().filter(|reg| reg.kind == kind).count()
    }

    /// Names of the published variables of `kind`, in name order.
    pub fn published(&self, kind: VarKind) -> impl Iterator<Item = &str> {
        self.registered
            .iter()
            .filter(move |(_, reg)| reg.published && reg.kind == kind)
            .map(|(name, _)| name.as_str())
    }

    /// Number of successful writes since the kiosk was created.
    pub const fn write_count(&self) -> u64 {
        self.writes
    }
}

impl Default for VariableKiosk {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for VariableKiosk {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "Contents of VariableKiosk:")?;
        for (kind, label) in [(VarKind::State, "state"), (VarKind::Rate, "rate")] {
            let published: Vec<&str> = self.published(kind).collect();
            writeln!(
                f,
                " * Registered {label} variables: {}",
                self.registered_count(kind)
            )?;
            writeln!(
                f,
                " * Published {label} variables: {} with values:",
                published.len()
            )?;
            for name in published {
                match self.values.get(name) {
                    Some(value) => writeln!(f, "  - variable {name}, value: {value}")?,
                    None => writeln!(f, "  - variable {name}, value: undefined")?,
                }
            }
        }
        Ok(())
    }
}
