//! Sentry DNS application layer: ports (traits the infrastructure crate
//! implements) plus the use-case orchestration that depends only on those
//! ports and the domain crate's pure types.

pub mod pipeline;
pub mod ports;
pub mod reload;
pub mod refresh;
pub mod stats;

pub use pipeline::{BlockedKind, PipelineConfig, PipelineOutcome, ResolutionPipeline};
pub use refresh::{RefreshCoordinator, RefreshCoordinatorConfig, SweepAction};
pub use reload::{ClientRegistry, LocalRecordsRegistry};
pub use stats::{StatsRegistry, StatsSnapshot};
