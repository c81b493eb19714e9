//! Validator registry as seen by delegation
//!
//! Registration and enabling workflows live elsewhere. The controller only
//! needs to look validators up, resolve a caller address to the validator it
//! controls, and ask whether a validator may receive new requests.
//! [`InMemoryValidators`] is a small registry with a trusted-validator
//! whitelist, enough to drive the controller in tests and scenario replays.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use tracing::info;

use crate::types::{short_address, Address, Amount, ValidatorId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorInfo {
    pub id: ValidatorId,
    /// Controller address, the identity that accepts requests
    pub address: Address,
    pub name: String,
    /// Per-validator floor on top of the global minimum
    pub minimum_delegation_amount: Amount,
    pub accepting_new_requests: bool,
}

/// Read access to the validator registry
pub trait ValidatorDirectory {
    fn validator(&self, id: ValidatorId) -> Option<ValidatorInfo>;

    fn validator_id_by_address(&self, address: &Address) -> Option<ValidatorId>;

    /// Whether the validator passes the registry's admission policy
    fn is_authorized_for_delegation(&self, id: ValidatorId) -> bool;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("address is already registered as validator {0}")]
    AddressAlreadyRegistered(ValidatorId),

    #[error("validator {0} does not exist")]
    UnknownValidator(ValidatorId),

    #[error("validator {0} is already trusted")]
    AlreadyEnabled(ValidatorId),

    #[error("validator {0} is not trusted")]
    AlreadyDisabled(ValidatorId),
}

#[derive(Debug, Clone)]
pub struct InMemoryValidators {
    validators: HashMap<ValidatorId, ValidatorInfo>,
    by_address: HashMap<Address, ValidatorId>,
    trusted: BTreeSet<ValidatorId>,
    /// When false every registered validator is authorized
    use_whitelist: bool,
    next_id: ValidatorId,
}

impl Default for InMemoryValidators {
    fn default() -> Self {
        Self {
            validators: HashMap::new(),
            by_address: HashMap::new(),
            trusted: BTreeSet::new(),
            use_whitelist: true,
            next_id: 1,
        }
    }
}

impl InMemoryValidators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a validator, ids start at 1
    pub fn register(
        &mut self,
        address: Address,
        name: impl Into<String>,
        minimum_delegation_amount: Amount,
    ) -> Result<ValidatorId, RegistryError> {
        if let Some(existing) = self.by_address.get(&address) {
            return Err(RegistryError::AddressAlreadyRegistered(*existing));
        }

        let id = self.next_id;
        self.next_id += 1;

        let name = name.into();
        info!(validator = id, address = %short_address(&address), %name, "validator registered");

        self.validators.insert(
            id,
            ValidatorInfo {
                id,
                address,
                name,
                minimum_delegation_amount,
                accepting_new_requests: true,
            },
        );
        self.by_address.insert(address, id);
        Ok(id)
    }

    /// Add a validator to the trusted whitelist
    pub fn enable(&mut self, id: ValidatorId) -> Result<(), RegistryError> {
        self.ensure_exists(id)?;
        if !self.trusted.insert(id) {
            return Err(RegistryError::AlreadyEnabled(id));
        }
        Ok(())
    }

    pub fn disable(&mut self, id: ValidatorId) -> Result<(), RegistryError> {
        self.ensure_exists(id)?;
        if !self.trusted.remove(&id) {
            return Err(RegistryError::AlreadyDisabled(id));
        }
        Ok(())
    }

    /// Open delegation to every registered validator
    pub fn disable_whitelist(&mut self) {
        self.use_whitelist = false;
    }

    pub fn set_accepting_new_requests(
        &mut self,
        id: ValidatorId,
        accepting: bool,
    ) -> Result<(), RegistryError> {
        let validator = self
            .validators
            .get_mut(&id)
            .ok_or(RegistryError::UnknownValidator(id))?;
        validator.accepting_new_requests = accepting;
        Ok(())
    }

    pub fn trusted_validators(&self) -> Vec<ValidatorId> {
        self.trusted.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    fn ensure_exists(&self, id: ValidatorId) -> Result<(), RegistryError> {
        if self.validators.contains_key(&id) {
            Ok(())
        } else {
            Err(RegistryError::UnknownValidator(id))
        }
    }
}

impl ValidatorDirectory for InMemoryValidators {
    fn validator(&self, id: ValidatorId) -> Option<ValidatorInfo> {
        self.validators.get(&id).cloned()
    }

    fn validator_id_by_address(&self, address: &Address) -> Option<ValidatorId> {
        self.by_address.get(address).copied()
    }

    fn is_authorized_for_delegation(&self, id: ValidatorId) -> bool {
        self.validators.contains_key(&id) && (!self.use_whitelist || self.trusted.contains(&id))
    }
}
