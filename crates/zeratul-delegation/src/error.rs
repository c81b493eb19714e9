//! error types for delegation accounting

use thiserror::Error;

use crate::delegation::DelegationState;
use crate::types::{Amount, DelegationId, Epoch, ValidatorId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClockError {
    #[error("timestamp {timestamp} is before the epoch origin {origin}")]
    BeforeOrigin { timestamp: u64, origin: u64 },

    #[error("timestamp {0} cannot be represented as a date")]
    InvalidTimestamp(u64),

    #[error("epoch duration must be non-zero")]
    ZeroDuration,

    #[error("invalid calendar origin {year}-{month:02}")]
    InvalidOrigin { year: i32, month: u32 },

    #[error("epoch {0} is outside the representable time range")]
    OutOfRange(Epoch),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceError {
    #[error("epoch {requested} is before the resolved epoch {resolved}")]
    EpochInPast { requested: Epoch, resolved: Epoch },

    #[error("reducing coefficient {numerator}/{denominator} would increase the sequence")]
    IncreasingReduction { numerator: Amount, denominator: Amount },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Error class, used by callers to decide whether to adjust input, switch
/// identity, or re-read state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or out-of-range input
    Validation,
    /// Caller lacks the role or relationship for the transition
    Authorization,
    /// Transition illegal from the current (lazily resolved) state
    StateConflict,
    /// Referenced delegation does not exist
    NotFound,
    /// Clock, ledger or configuration failure
    Internal,
}

#[derive(Debug, Error)]
pub enum DelegationError {
    // validation
    #[error("validator {0} does not exist")]
    UnknownValidator(ValidatorId),

    #[error("validator {0} is not authorized to accept delegation requests")]
    ValidatorNotAuthorized(ValidatorId),

    #[error("validator {0} is not currently accepting new requests")]
    ValidatorNotAcceptingRequests(ValidatorId),

    #[error("delegation period {0} is not allowed")]
    PeriodNotAllowed(u64),

    #[error("amount {amount} does not meet the minimum delegation amount {minimum}")]
    AmountBelowMinimum { amount: Amount, minimum: Amount },

    #[error("limit of {limit} validators per holder is reached")]
    TooManyValidators { limit: usize },

    #[error("not enough unlocked tokens: requested {requested}, available {available}")]
    InsufficientUnlockedTokens { requested: Amount, available: Amount },

    #[error("not enough slashed tokens: requested {requested}, available {available}")]
    NotEnoughSlashed { requested: Amount, available: Amount },

    #[error("token transfer failed: {0}")]
    Token(#[from] crate::tokens::TokenError),

    // authorization
    #[error("caller is not a registered validator address")]
    UnknownValidatorAddress,

    #[error("no permission to accept delegation {0}")]
    NotAuthorized(DelegationId),

    #[error("only the token holder can cancel delegation {0}")]
    NotHolder(DelegationId),

    #[error("permission denied to request undelegation of {0}")]
    PermissionDenied(DelegationId),

    // state conflicts
    #[error("only proposed delegations can be canceled, {id} is {state}")]
    NotProposed { id: DelegationId, state: DelegationState },

    #[error("delegation {0} has been canceled by the token holder")]
    DelegationCanceled(DelegationId),

    #[error("delegation {0} has already been accepted")]
    AlreadyAccepted(DelegationId),

    #[error("delegation request {0} is outdated")]
    RequestOutdated(DelegationId),

    #[error("cannot request undelegation of {id} while it is {state}")]
    NotDelegated { id: DelegationId, state: DelegationState },

    #[error("undelegation of {id} must be requested before the notice window of epoch {finished}")]
    UndelegationWindowClosed { id: DelegationId, finished: Epoch },

    #[error("tokens are locked: requested {requested}, transferable {transferable}")]
    TokensLocked { requested: Amount, transferable: Amount },

    // not found
    #[error("delegation {0} does not exist")]
    DelegationNotFound(DelegationId),

    // internal
    #[error("clock error: {0}")]
    Clock(#[from] ClockError),

    #[error("ledger error: {0}")]
    Sequence(#[from] SequenceError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl DelegationError {
    pub fn kind(&self) -> ErrorKind {
        use DelegationError::*;
        match self {
            UnknownValidator(_)
            | ValidatorNotAuthorized(_)
            | ValidatorNotAcceptingRequests(_)
            | PeriodNotAllowed(_)
            | AmountBelowMinimum { .. }
            | TooManyValidators { .. }
            | InsufficientUnlockedTokens { .. }
            | NotEnoughSlashed { .. }
            | Token(_) => ErrorKind::Validation,
            UnknownValidatorAddress | NotAuthorized(_) | NotHolder(_) | PermissionDenied(_) => {
                ErrorKind::Authorization
            }
            NotProposed { .. }
            | DelegationCanceled(_)
            | AlreadyAccepted(_)
            | RequestOutdated(_)
            | NotDelegated { .. }
            | UndelegationWindowClosed { .. }
            | TokensLocked { .. } => ErrorKind::StateConflict,
            DelegationNotFound(_) => ErrorKind::NotFound,
            Clock(_) | Sequence(_) | Config(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, DelegationError>;
