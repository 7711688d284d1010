//! Static local-records answer table. Bypasses cache entirely.

use crate::question::RecordType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub value: String,
}

#[derive(Debug, Clone, Default)]
pub struct LocalRecordsTable {
    entries: HashMap<(String, u16), Vec<String>>,
}

impl LocalRecordsTable {
    pub fn build(records: &[LocalRecord]) -> Self {
        let mut entries: HashMap<(String, u16), Vec<String>> = HashMap::new();
        for r in records {
            let Ok(rtype) = r.record_type.parse::<RecordType>() else {
                continue;
            };
            let key = (crate::question::normalize(&r.name), rtype.to_u16());
            entries.entry(key).or_default().push(r.value.clone());
        }
        Self { entries }
    }

    pub fn lookup(&self, qname: &str, qtype: RecordType) -> Option<&[String]> {
        self.entries
            .get(&(qname.to_string(), qtype.to_u16()))
            .map(|v| v.as_slice())
    }
}
