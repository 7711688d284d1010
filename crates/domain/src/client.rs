//! Client identification: source address to (name, group) mapping.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

pub const DEFAULT_GROUP: &str = "default";

pub fn default_group() -> String {
    DEFAULT_GROUP.to_string()
}

#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub name: Arc<str>,
    pub group_id: Arc<str>,
}

impl ClientIdentity {
    pub fn unknown() -> Self {
        Self {
            name: Arc::from("unknown"),
            group_id: Arc::from(DEFAULT_GROUP),
        }
    }
}

/// Hot-reloadable `ip -> identity` table. Replaced whole on reload, per
/// §4.6: the pipeline never observes a partially-updated table.
#[derive(Debug, Clone, Default)]
pub struct ClientTable {
    entries: HashMap<IpAddr, ClientIdentity>,
}

impl ClientTable {
    pub fn new(entries: HashMap<IpAddr, ClientIdentity>) -> Self {
        Self { entries }
    }

    /// Builds a table from the `client_identification` config section.
    /// An entry's absence means every subsequent lookup falls back to
    /// [`ClientIdentity::unknown`] — disabling the feature is just an empty
    /// table, not a different code path.
    pub fn build(cfg: &crate::config::ClientIdentificationConfig) -> Self {
        if !cfg.enabled {
            return Self::default();
        }
        let entries = cfg
            .clients
            .iter()
            .map(|c| {
                (
                    c.ip,
                    ClientIdentity {
                        name: Arc::from(c.name.as_str()),
                        group_id: Arc::from(c.group_id.as_str()),
                    },
                )
            })
            .collect();
        Self { entries }
    }

    pub fn identify(&self, addr: IpAddr) -> ClientIdentity {
        self.entries
            .get(&addr)
            .cloned()
            .unwrap_or_else(ClientIdentity::unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_client_gets_default_group() {
        let table = ClientTable::default();
        let id = table.identify("10.0.0.5".parse().unwrap());
        assert_eq!(&*id.group_id, DEFAULT_GROUP);
    }

    #[test]
    fn known_client_resolves_to_its_group() {
        let ip: IpAddr = "10.0.0.5".parse().unwrap();
        let mut entries = HashMap::new();
        entries.insert(
            ip,
            ClientIdentity {
                name: Arc::from("laptop"),
                group_id: Arc::from("kids"),
            },
        );
        let table = ClientTable::new(entries);
        let id = table.identify(ip);
        assert_eq!(&*id.name, "laptop");
        assert_eq!(&*id.group_id, "kids");
    }
}
