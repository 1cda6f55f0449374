//! DigitalOcean Kubernetes cluster driver.
//!
//! The driver is a stateless adapter between an orchestration host and the
//! DigitalOcean Kubernetes API. The host calls one lifecycle operation at a
//! time and carries the persisted cluster reference between calls.

pub mod api;
pub mod config;
pub mod driver;
pub mod error;
pub mod flags;
pub mod gateway;
pub mod kubeconfig;
pub mod resize;
pub mod shutdown;
pub mod state;
pub mod wait;

pub use driver::{Driver, KubernetesVersion, NodeCount};
pub use error::DriverError;
