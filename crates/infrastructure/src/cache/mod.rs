mod l0;
mod l1;

pub use l0::LruL0Cache;
pub use l1::DashMapL1Store;
