//! Process-wide protocol registry
//!
//! Maps protocol ids (magic numbers) to protocol names so that peers agree
//! on how to identify the discovery protocol. Entries are never removed.

use blobping_common::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Name under which the object-storage protocol registers
pub const BLOB_PING: &str = "BLOB_PING";

/// Default magic number of [`BLOB_PING`]
pub const DEFAULT_MAGIC_NUMBER: u16 = 1077;

/// Environment variable overriding [`DEFAULT_MAGIC_NUMBER`]
pub const MAGIC_NUMBER_ENV: &str = "BLOBPING_MAGIC_NUMBER";

/// Registry of protocol ids
#[derive(Debug, Default)]
pub struct ProtocolRegistry {
    protocols: RwLock<HashMap<u16, &'static str>>,
}

impl ProtocolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` under `id`
    ///
    /// Registering the same pair again is a no-op. An id already taken by a
    /// different protocol is a configuration error.
    pub fn register(&self, id: u16, name: &'static str) -> Result<()> {
        let mut protocols = self.protocols.write();
        match protocols.get(&id) {
            Some(existing) if *existing == name => Ok(()),
            Some(existing) => Err(Error::configuration(format!(
                "protocol id {id} is already registered to {existing}, cannot register {name}"
            ))),
            None => {
                protocols.insert(id, name);
                debug!("Registered protocol {} with id {}", name, id);
                Ok(())
            }
        }
    }

    /// Protocol registered under `id`
    #[must_use]
    pub fn lookup(&self, id: u16) -> Option<&'static str> {
        self.protocols.read().get(&id).copied()
    }

    /// Id a protocol is registered under
    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<u16> {
        self.protocols
            .read()
            .iter()
            .find(|(_, registered)| **registered == name)
            .map(|(id, _)| *id)
    }
}

static PROTOCOL_REGISTRY: OnceLock<ProtocolRegistry> = OnceLock::new();

/// Get the global protocol registry
pub fn protocol_registry() -> &'static ProtocolRegistry {
    PROTOCOL_REGISTRY.get_or_init(ProtocolRegistry::new)
}

/// Resolve the magic number from an optional override
///
/// Unparseable overrides are logged and ignored.
#[must_use]
pub fn magic_number_from(value: Option<&str>) -> u16 {
    let Some(value) = value else {
        return DEFAULT_MAGIC_NUMBER;
    };
    match value.trim().parse::<u16>() {
        Ok(id) => id,
        Err(e) => {
            warn!(
                "Could not read {} '{}' ({}), using default {}",
                MAGIC_NUMBER_ENV, value, e, DEFAULT_MAGIC_NUMBER
            );
            DEFAULT_MAGIC_NUMBER
        }
    }
}

/// Register [`BLOB_PING`] in the global registry, returning its id
pub fn register_blob_ping() -> Result<u16> {
    let id = magic_number_from(std::env::var(MAGIC_NUMBER_ENV).ok().as_deref());
    protocol_registry().register(id, BLOB_PING)?;
    Ok(id)
}
