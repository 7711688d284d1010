//! `local_records[]` section (§6). Reuses [`crate::local_records::LocalRecord`]
//! directly rather than a parallel config-shaped struct, since the config
//! entries feed [`crate::local_records::LocalRecordsTable::build`] verbatim.

pub use crate::local_records::LocalRecord;
