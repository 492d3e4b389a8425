use std::collections::BTreeMap;
use std::sync::Arc;

use common_auth::{AuthRecord, AuthResult, ClassConfig, StorageNamespace, UserClass};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::storage::KeyValueStorage;

/// Per-class presence of a non-expired record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveClasses(BTreeMap<UserClass, bool>);

impl ActiveClasses {
    pub fn is_active(&self, class: UserClass) -> bool {
        self.0.get(&class).copied().unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (UserClass, bool)> + '_ {
        self.0.iter().map(|(class, active)| (*class, *active))
    }

    /// Classes active in `self` but no longer active in `after`.
    pub fn lost_in(&self, after: &ActiveClasses) -> Vec<UserClass> {
        self.iter()
            .filter(|(class, active)| *active && !after.is_active(*class))
            .map(|(class, _)| class)
            .collect()
    }
}

/// Typed repository of auth records, one slot per class.
#[derive(Clone)]
pub struct TokenStore {
    volatile: Arc<dyn KeyValueStorage>,
    durable: Arc<dyn KeyValueStorage>,
    admin: ClassConfig,
    lawyer: ClassConfig,
    clock: Arc<dyn Clock>,
}

impl TokenStore {
    pub fn new(volatile: Arc<dyn KeyValueStorage>, durable: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            volatile,
            durable,
            admin: ClassConfig::admin(),
            lawyer: ClassConfig::lawyer(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_class_config(mut self, config: ClassConfig) -> Self {
        match config.class {
            UserClass::Admin => self.admin = config,
            UserClass::Lawyer => self.lawyer = config,
        }
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn class_config(&self, class: UserClass) -> &ClassConfig {
        match class {
            UserClass::Admin => &self.admin,
            UserClass::Lawyer => &self.lawyer,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn slot(&self, class: UserClass) -> (&dyn KeyValueStorage, &str) {
        let config = self.class_config(class);
        let storage = match config.namespace {
            StorageNamespace::Volatile => self.volatile.as_ref(),
            StorageNamespace::Durable => self.durable.as_ref(),
        };
        (storage, config.storage_key.as_str())
    }

    /// Stored record for `class`; unreadable or malformed data reads as absent.
    pub fn get(&self, class: UserClass) -> Option<AuthRecord> {
        let (storage, key) = self.slot(class);
        let raw = match storage.get_item(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(%class, error = %err, "failed to read auth record");
                return None;
            }
        };

        match AuthRecord::from_json(&raw) {
            Ok(record) => Some(record),
            Err(err) => {
                debug!(%class, error = %err, "ignoring malformed auth record");
                None
            }
        }
    }

    /// Stored record for `class` unless its expiry has passed.
    pub fn get_active(&self, class: UserClass) -> Option<AuthRecord> {
        let now = self.clock.now();
        self.get(class).filter(|record| !record.is_expired_at(now))
    }

    pub fn set(&self, class: UserClass, record: &AuthRecord) -> AuthResult<()> {
        let (storage, key) = self.slot(class);
        let raw = record.to_json()?;
        storage.set_item(key, &raw)?;
        debug!(%class, expires_at = ?record.expires_at, "stored auth record");
        Ok(())
    }

    pub fn clear(&self, class: UserClass) -> AuthResult<()> {
        let (storage, key) = self.slot(class);
        storage.remove_item(key)?;
        debug!(%class, "cleared auth record");
        Ok(())
    }

    pub fn list_active(&self) -> ActiveClasses {
        ActiveClasses(
            UserClass::ALL
                .iter()
                .map(|class| (*class, self.get_active(*class).is_some()))
                .collect(),
        )
    }

    /// Removes expired and malformed records, returning the classes whose
    /// expired record was evicted. Storage failures are logged and skipped.
    pub fn cleanup_expired_tokens(&self) -> Vec<UserClass> {
        let now = self.clock.now();
        let mut evicted = Vec::new();

        for class in UserClass::ALL {
            let (storage, key) = self.slot(class);
            let raw = match storage.get_item(key) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(err) => {
                    warn!(%class, error = %err, "skipping unreadable auth record during cleanup");
                    continue;
                }
            };

            let expired = match AuthRecord::from_json(&raw) {
                Ok(record) if record.is_expired_at(now) => true,
                Ok(_) => continue,
                Err(_) => false,
            };

            match storage.remove_item(key) {
                Ok(()) if expired => {
                    debug!(%class, "evicted expired auth record");
                    evicted.push(class);
                }
                Ok(()) => debug!(%class, "removed malformed auth record"),
                Err(err) => warn!(%class, error = %err, "failed to evict auth record"),
            }
        }

        evicted
    }
}
