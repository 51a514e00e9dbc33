//! Error types for the `furrow-kiosk` crate.
//!
//! Every variant is a wiring error: it means the model composition is
//! broken, not that the simulated data is unusual. Callers propagate these
//! and abort the run.

use furrow_types::ValueKind;

/// Errors raised by the [`VariableKiosk`](crate::VariableKiosk).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KioskError {
    /// The variable name is already registered, by any owner and of any kind.
    #[error("duplicate state/rate variable '{name}' encountered")]
    DuplicateVariable {
        /// The offending variable name.
        name: String,
    },

    /// Deregistration of a name that was never registered.
    #[error("failed to deregister variable '{name}': not registered")]
    NotRegistered {
        /// The variable name.
        name: String,
    },

    /// Deregistration by an owner that did not register the name.
    #[error("wrong owner tried to deregister variable '{name}'")]
    WrongOwner {
        /// The variable name.
        name: String,
    },

    /// A value was written by an owner that did not publish the name.
    #[error("unregistered owner tried to set the value of variable '{name}': access denied")]
    AccessDenied {
        /// The variable name.
        name: String,
    },

    /// A value was written to a variable that is not published.
    #[error("variable '{name}' not published in the kiosk")]
    NotPublished {
        /// The variable name.
        name: String,
    },
}

/// Errors raised by [`StateVars`](crate::StateVars) and
/// [`RateVars`](crate::RateVars).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContainerError {
    /// A state was declared without an initial value.
    #[error("initial value for state '{name}' missing")]
    MissingInitialValue {
        /// The state name.
        name: String,
    },

    /// A write targeted a field that the container does not declare.
    #[error("assignment to undeclared field '{name}' prevented")]
    UndeclaredField {
        /// The field name.
        name: String,
    },

    /// A write targeted a declared field while the container was locked.
    #[error("container is locked: cannot assign field '{name}'")]
    Locked {
        /// The field name.
        name: String,
    },

    /// A value of the wrong kind was assigned to a field.
    #[error("field '{name}' expects a {expected} value, got {found}")]
    TypeMismatch {
        /// The field name.
        name: String,
        /// The declared kind.
        expected: ValueKind,
        /// The kind of the rejected value.
        found: ValueKind,
    },

    /// A field has no value yet (non-zeroable rate never assigned).
    #[error("field '{name}' has no value")]
    Unset {
        /// The field name.
        name: String,
    },

    /// The publish list names fields that the container does not declare.
    #[error("unknown variable(s) specified with the publish keyword: {names:?}")]
    UnknownPublish {
        /// The unknown names.
        names: Vec<String>,
    },

    /// The underlying kiosk rejected a registration or a write.
    #[error("kiosk error: {source}")]
    Kiosk {
        /// The underlying kiosk error.
        #[from]
        source: KioskError,
    },
}
