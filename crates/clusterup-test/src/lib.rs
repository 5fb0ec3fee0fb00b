//! Test infrastructure for clusterup
//!
//! Provides:
//! - A scripted in-memory container runtime
//! - Host file transfer backed by a local scratch directory
//! - Canned health endpoint responses
//! - Sample configuration and `/proc/net/tcp` fixtures
//! - Verification helpers over recorded container invocations

pub mod fixtures;
mod runtime_env;
mod verification;

pub use fixtures::*;
pub use runtime_env::{
    CannedHealth, CannedHealthFactory, FakeHost, FakeRuntime, Invocation, InvocationKind,
};
pub use verification::*;
