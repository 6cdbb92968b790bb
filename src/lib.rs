//! Control plane of a reverse proxy: configuration snapshots, runtime state
//! reconciliation, destination selection and active health checking.

pub mod config;
pub mod health;
pub mod load_balancer;
pub mod observability;
pub mod runtime;

pub use config::{ConfigBuilder, ConfigManager};
pub use health::ProberFactory;
pub use load_balancer::{LoadBalancer, LoadBalancingMode};
