//! Hot-reloadable snapshots for the two trivial lookup tables (§4.6).
//!
//! Both are plain data with a single sane adapter (an atomically-swapped
//! pointer), so unlike the cache/dispatcher/blocklist they don't need a
//! trait port — just a shared-ownership wrapper per the "ambient runtime
//! structures become explicit" design note (§9).

use arc_swap::ArcSwap;
use sentrydns_domain::{ClientIdentity, ClientTable, LocalRecordsTable, RecordType};
use std::net::IpAddr;
use std::sync::Arc;

#[derive(Default)]
pub struct ClientRegistry {
    table: ArcSwap<ClientTable>,
}

impl ClientRegistry {
    pub fn new(table: ClientTable) -> Self {
        Self {
            table: ArcSwap::from_pointee(table),
        }
    }

    pub fn identify(&self, addr: IpAddr) -> ClientIdentity {
        self.table.load().identify(addr)
    }

    pub fn apply_config(&self, table: ClientTable) {
        self.table.store(Arc::new(table));
    }
}

#[derive(Default)]
pub struct LocalRecordsRegistry {
    table: ArcSwap<LocalRecordsTable>,
}

impl LocalRecordsRegistry {
    pub fn new(table: LocalRecordsTable) -> Self {
        Self {
            table: ArcSwap::from_pointee(table),
        }
    }

    pub fn lookup(&self, qname: &str, qtype: RecordType) -> Option<Vec<String>> {
        self.table.load().lookup(qname, qtype).map(|s| s.to_vec())
    }

    pub fn apply_config(&self, table: LocalRecordsTable) {
        self.table.store(Arc::new(table));
    }
}
