//! Parameter lookup across site, timer, soil and crop parameter sets.
//!
//! Lookups walk an ordered chain of maps: override, site, timer, soil,
//! crop, derived. The first map holding the name wins, so an override
//! shadows every other value. Names must be unique across the site, timer,
//! soil and crop maps.

use std::collections::{BTreeMap, BTreeSet};

use furrow_types::{CropEndType, CropStartType, Value};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A named set of parameter values.
pub type ParameterSet = BTreeMap<String, Value>;

/// Errors raised by parameter lookup and overrides.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParameterError {
    /// A name occurs in more than one of the site, timer, soil and crop sets.
    #[error("duplicate parameter found: {name}")]
    Duplicate {
        /// The duplicated name.
        name: String,
    },

    /// No parameter set holds the name.
    #[error("parameter not found: {name}")]
    NotFound {
        /// The requested name.
        name: String,
    },

    /// An override for a name that does not exist was rejected.
    #[error("cannot override '{name}', parameter does not already exist")]
    CannotOverride {
        /// The rejected name.
        name: String,
    },

    /// Clearing an override that was never set.
    #[error("cannot clear '{name}' from overrides")]
    NotOverridden {
        /// The requested name.
        name: String,
    },

    /// Only overrides can be removed.
    #[error("cannot delete default parameter: {name}")]
    CannotDeleteDefault {
        /// The requested name.
        name: String,
    },

    /// A parameter has a value of the wrong kind.
    #[error("parameter {name} is not a {expected}")]
    WrongType {
        /// The parameter name.
        name: String,
        /// The expected kind.
        expected: &'static str,
    },

    /// The crop library has no parameters for a crop and variety.
    #[error("no crop parameters for crop '{crop}', variety '{variety}'")]
    UnknownCrop {
        /// Crop name.
        crop: String,
        /// Variety name.
        variety: String,
    },
}

/// Parameter sets for several crops and varieties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CropLibrary {
    /// Crop name to variety name to parameters.
    pub crops: BTreeMap<String, BTreeMap<String, ParameterSet>>,
}

impl CropLibrary {
    /// Parameters of one crop and variety.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::UnknownCrop`] if the library has no such
    /// crop or variety.
    pub fn select(&self, crop: &str, variety: &str) -> Result<&ParameterSet, ParameterError> {
        self.crops
            .get(crop)
            .and_then(|varieties| varieties.get(variety))
            .ok_or_else(|| ParameterError::UnknownCrop {
                crop: crop.to_owned(),
                variety: variety.to_owned(),
            })
    }
}

/// Source of crop parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CropData {
    /// A library supporting crop rotations.
    Library(CropLibrary),
    /// One parameter set used for every crop.
    Single(ParameterSet),
}

impl Default for CropData {
    fn default() -> Self {
        Self::Single(ParameterSet::new())
    }
}

/// Ordered parameter lookup with overrides.
#[derive(Debug, Clone, Default)]
pub struct ParameterProvider {
    overrides: ParameterSet,
    site: ParameterSet,
    timer: ParameterSet,
    soil: ParameterSet,
    crop_data: CropData,
    /// Parameters of the active crop.
    crop: ParameterSet,
    derived: ParameterSet,
    crops_activated: u32,
}

impl ParameterProvider {
    /// Build a provider from its parameter sets.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::Duplicate`] if a name occurs in more than
    /// one set.
    pub fn new(
        site: ParameterSet,
        timer: ParameterSet,
        soil: ParameterSet,
        crop_data: CropData,
    ) -> Result<Self, ParameterError> {
        let crop = match &crop_data {
            CropData::Single(set) => set.clone(),
            CropData::Library(_) => ParameterSet::new(),
        };
        let provider = Self {
            overrides: ParameterSet::new(),
            site,
            timer,
            soil,
            crop_data,
            crop,
            derived: ParameterSet::new(),
            crops_activated: 0,
        };
        provider.check_uniqueness()?;
        Ok(provider)
    }

    fn chain(&self) -> [&ParameterSet; 6] {
        [
            &self.overrides,
            &self.site,
            &self.timer,
            &self.soil,
            &self.crop,
            &self.derived,
        ]
    }

    fn check_uniqueness(&self) -> Result<(), ParameterError> {
        let mut seen = BTreeSet::new();
        for set in [&self.site, &self.timer, &self.soil, &self.crop] {
            for name in set.keys() {
                if !seen.insert(name.as_str()) {
                    return Err(ParameterError::Duplicate { name: name.clone() });
                }
            }
        }
        Ok(())
    }

    /// Activate the parameters of a new crop.
    ///
    /// Writes `CROP_START_TYPE` and `CROP_END_TYPE` into the timer
    /// parameters. With a crop library the crop parameter set is switched;
    /// without one, a second activation keeps the single set and logs a
    /// warning.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::UnknownCrop`] if the library lacks the crop
    /// and [`ParameterError::Duplicate`] if the new set clashes with another.
    pub fn set_active_crop(
        &mut self,
        crop_name: &str,
        variety_name: &str,
        crop_start_type: CropStartType,
        crop_end_type: CropEndType,
    ) -> Result<(), ParameterError> {
        self.timer.insert(
            "CROP_START_TYPE".to_owned(),
            Value::from(crop_start_type.as_str()),
        );
        self.timer.insert(
            "CROP_END_TYPE".to_owned(),
            Value::from(crop_end_type.as_str()),
        );

        match &self.crop_data {
            CropData::Library(library) => {
                self.crop = library.select(crop_name, variety_name)?.clone();
            }
            CropData::Single(_) => {
                if self.crops_activated > 0 {
                    warn!(
                        crop = crop_name,
                        variety = variety_name,
                        "A second crop was scheduled but the crop parameters do not support rotations; \
                         only rotations of the same crop will work"
                    );
                }
            }
        }
        self.crops_activated = self.crops_activated.saturating_add(1);
        self.check_uniqueness()
    }

    /// Value of `name`, searching the chain override-first.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.chain().into_iter().find_map(|set| set.get(name))
    }

    /// Value of `name`, or an error when absent.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::NotFound`] if no set holds `name`.
    pub fn require(&self, name: &str) -> Result<&Value, ParameterError> {
        self.get(name).ok_or_else(|| ParameterError::NotFound {
            name: name.to_owned(),
        })
    }

    /// Numeric value of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::NotFound`] if absent and
    /// [`ParameterError::WrongType`] if not numeric.
    pub fn get_f64(&self, name: &str) -> Result<f64, ParameterError> {
        self.require(name)?
            .as_f64()
            .ok_or_else(|| ParameterError::WrongType {
                name: name.to_owned(),
                expected: "number",
            })
    }

    /// Table value of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::NotFound`] if absent and
    /// [`ParameterError::WrongType`] if not a table.
    pub fn get_table(&self, name: &str) -> Result<&[f64], ParameterError> {
        self.require(name)?
            .as_table()
            .ok_or_else(|| ParameterError::WrongType {
                name: name.to_owned(),
                expected: "table",
            })
    }

    /// Whether any set holds `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Override an existing parameter.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::CannotOverride`] if `name` does not exist.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), ParameterError> {
        self.set_override(name, value, true)
    }

    /// Override `name`; with `check` the name must already exist.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::CannotOverride`] if `check` is set and
    /// `name` does not exist.
    pub fn set_override(
        &mut self,
        name: &str,
        value: Value,
        check: bool,
    ) -> Result<(), ParameterError> {
        if check && !self.contains(name) {
            return Err(ParameterError::CannotOverride {
                name: name.to_owned(),
            });
        }
        self.overrides.insert(name.to_owned(), value);
        Ok(())
    }

    /// Clear one override, or all of them when `name` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::NotOverridden`] if `name` has no override.
    pub fn clear_override(&mut self, name: Option<&str>) -> Result<(), ParameterError> {
        match name {
            None => {
                self.overrides.clear();
                Ok(())
            }
            Some(name) => self
                .overrides
                .remove(name)
                .map(drop)
                .ok_or_else(|| ParameterError::NotOverridden {
                    name: name.to_owned(),
                }),
        }
    }

    /// Remove an override, restoring the original value.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::CannotDeleteDefault`] for a name that exists
    /// without override and [`ParameterError::NotFound`] for an unknown name.
    pub fn remove(&mut self, name: &str) -> Result<Value, ParameterError> {
        if let Some(value) = self.overrides.remove(name) {
            return Ok(value);
        }
        if self.contains(name) {
            Err(ParameterError::CannotDeleteDefault {
                name: name.to_owned(),
            })
        } else {
            Err(ParameterError::NotFound {
                name: name.to_owned(),
            })
        }
    }

    /// Add a parameter derived from other parameters.
    pub fn set_derived(&mut self, name: &str, value: Value) {
        self.derived.insert(name.to_owned(), value);
    }

    /// Sorted unique parameter names, overrides included.
    pub fn names(&self) -> BTreeSet<&str> {
        self.chain()
            .into_iter()
            .flat_map(|set| set.keys().map(String::as_str))
            .collect()
    }

    /// Number of unique parameter names.
    pub fn len(&self) -> usize {
        self.names().len()
    }

    /// Whether no parameters are defined.
    pub fn is_empty(&self) -> bool {
        self.chain().iter().all(|set| set.is_empty())
    }

    /// Number of overridden parameters.
    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }
}

impl core::fmt::Display for ParameterProvider {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let overridden: Vec<&str> = self.overrides.keys().map(String::as_str).collect();
        write!(
            f,
            "ParameterProvider providing {} parameters, {} parameters overridden: {overridden:?}.",
            self.len(),
            self.overrides.len(),
        )
    }
}
