//! Trusted stores: typed key/value mappings for `POL`/`ID`/`CAPS` (§4.9).
//!
//! Writes go through the router's `assert_may_write` check; reads are
//! unrestricted within the process.

use std::collections::HashMap;

use custodian_router::{assert_may_write, RouterError};
use custodian_types::{PayloadType, SourceClass};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrustedStoreError {
    #[error("trusted-store write rejected: {0}")]
    Rejected(#[from] RouterError),

    #[error("unsupported trusted-store type: {0}")]
    UnsupportedType(PayloadType),
}

/// Three typed maps — `POL`, `ID`, `CAPS` — each write-gated through the
/// typed boundary router (§3, §4.9).
#[derive(Debug, Default)]
pub struct TrustedStores {
    policy_store: HashMap<String, Value>,
    identity_store: HashMap<String, Value>,
    capability_store: HashMap<String, Value>,
}

impl TrustedStores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `key` → `value` into the store named by `store_type`, after
    /// confirming `source_class` may write that payload type.
    pub fn write(
        &mut self,
        source_class: SourceClass,
        store_type: PayloadType,
        key: impl Into<String>,
        value: Value,
    ) -> Result<(), TrustedStoreError> {
        assert_may_write(source_class, store_type)?;
        let store = self.store_mut(store_type)?;
        store.insert(key.into(), value);
        tracing::debug!(store_type = %store_type, "trusted-store write");
        Ok(())
    }

    /// Reads are unrestricted within the process.
    pub fn read(&self, store_type: PayloadType, key: &str) -> Result<Option<&Value>, TrustedStoreError> {
        Ok(self.store(store_type)?.get(key))
    }

    fn store(&self, store_type: PayloadType) -> Result<&HashMap<String, Value>, TrustedStoreError> {
        match store_type {
            PayloadType::Pol => Ok(&self.policy_store),
            PayloadType::Id => Ok(&self.identity_store),
            PayloadType::Caps => Ok(&self.capability_store),
            other => Err(TrustedStoreError::UnsupportedType(other)),
        }
    }

    fn store_mut(&mut self, store_type: PayloadType) -> Result<&mut HashMap<String, Value>, TrustedStoreError> {
        match store_type {
            PayloadType::Pol => Ok(&mut self.policy_store),
            PayloadType::Id => Ok(&mut self.identity_store),
            PayloadType::Caps => Ok(&mut self.capability_store),
            other => Err(TrustedStoreError::UnsupportedType(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trusted_internal_may_write_policy_store() {
        let mut stores = TrustedStores::new();
        stores
            .write(
                SourceClass::TrustedInternal,
                PayloadType::Pol,
                "default_policy",
                Value::from("allow"),
            )
            .unwrap();
        assert_eq!(
            stores.read(PayloadType::Pol, "default_policy").unwrap(),
            Some(&Value::from("allow"))
        );
    }

    #[test]
    fn untrusted_source_write_is_rejected() {
        let mut stores = TrustedStores::new();
        let err = stores
            .write(SourceClass::User, PayloadType::Caps, "k", Value::from(1))
            .unwrap_err();
        assert!(matches!(err, TrustedStoreError::Rejected(_)));
    }

    #[test]
    fn reads_are_unrestricted() {
        let mut stores = TrustedStores::new();
        stores
            .write(
                SourceClass::TrustedInternal,
                PayloadType::Id,
                "op",
                Value::from("operator-1"),
            )
            .unwrap();
        assert!(stores.read(PayloadType::Id, "op").unwrap().is_some());
        assert!(stores.read(PayloadType::Id, "missing").unwrap().is_none());
    }
}
