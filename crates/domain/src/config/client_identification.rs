//! `client_identification` section (§6): the static `ip -> (name, group_id)` map.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientEntry {
    pub ip: IpAddr,
    pub name: String,
    #[serde(default = "crate::client::default_group")]
    pub group_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ClientIdentificationConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub clients: Vec<ClientEntry>,
}
