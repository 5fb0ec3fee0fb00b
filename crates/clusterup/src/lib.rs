//! clusterup - single-node control plane bootstrap
//!
//! Brings up a containerized cluster control plane on a container host:
//!
//! - Port pre-check against the host's `/proc/net/tcp*` tables
//! - Configuration generation or reuse, staged locally and patched
//! - Launch of the long-running control plane container
//! - TCP listen check followed by HTTPS readiness polling
//!
//! The container runtime, host file transfer and health client are traits
//! from `clusterup-common`, so the whole sequence runs against fakes in
//! tests.

pub mod dial;
pub mod error;
pub mod master_config;
pub mod observer;
pub mod options;
pub mod orchestrator;
pub mod patcher;
pub mod policy;
pub mod ports;
pub mod readiness;
pub mod stager;

pub use dial::{wait_for_dial, DialPolicy};
pub use error::{MasterConfigError, ReadinessCause, StartupError, StartupResult};
pub use master_config::MasterConfig;
pub use observer::{ConsoleObserver, NoopObserver, Stage, StartupObserver, TracingObserver};
pub use options::StartOptions;
pub use orchestrator::Orchestrator;
pub use patcher::{routing_subdomain, ConfigPatcher};
pub use policy::StartupPolicy;
pub use ports::check_ports_in_use;
pub use readiness::{classify, ReadinessPoller, Verdict};
pub use stager::{ConfigStager, StagedConfig};
