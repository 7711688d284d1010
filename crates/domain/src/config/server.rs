use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: Vec<String>,

    #[serde(default = "default_reuse_port_listeners")]
    pub reuse_port_listeners: usize,

    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// TTL handed out for answers served straight from the local-records
    /// table (§4.1 step 3, §4.6). These bypass the cache entirely, so the
    /// value isn't part of the `cache` section.
    #[serde(default = "default_local_ttl")]
    pub local_ttl_secs: u32,

    /// Where the control-surface router (§2 component #10) binds. Its own
    /// routes are out of scope; this is just the boundary the composition
    /// root needs to stand the thing up somewhere.
    #[serde(default = "default_control_listen")]
    pub control_listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            reuse_port_listeners: default_reuse_port_listeners(),
            read_timeout_ms: default_read_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            local_ttl_secs: default_local_ttl(),
            control_listen: default_control_listen(),
        }
    }
}

fn default_listen() -> Vec<String> {
    vec!["0.0.0.0:53".to_string()]
}

fn default_reuse_port_listeners() -> usize {
    1
}

fn default_read_timeout_ms() -> u64 {
    2000
}

fn default_write_timeout_ms() -> u64 {
    2000
}

fn default_local_ttl() -> u32 {
    300
}

fn default_control_listen() -> String {
    "127.0.0.1:8080".to_string()
}
