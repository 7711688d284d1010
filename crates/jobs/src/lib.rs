//! Background maintenance jobs (§4.5, §4.4): the sweeper and the SERVFAIL
//! pruner, each a `tokio::select!`-driven timer loop over a
//! `CancellationToken`, per the teacher's job shape.

mod runner;
mod servfail_pruner;
mod sweeper;

pub use runner::JobRunner;
pub use servfail_pruner::ServfailPrunerJob;
pub use sweeper::SweeperJob;
