//! Runtime state subsystem.
//!
//! # Data Flow
//! ```text
//! ConfigSnapshot (immutable)
//!     → ConfigManager reconciles into:
//!         BackendManager  (backend id → BackendInfo)
//!             └─ EndpointManager per backend (endpoint id → EndpointInfo)
//!         RouteManager    (route id → RouteInfo)
//!     → RouteTable published via ArcSwap
//!
//! Request path (external):
//!     BackendInfo::dynamic_state() → LoadBalancer → EndpointInfo
//! ```
//!
//! # Design Decisions
//! - Wrappers are identity-stable; only their embedded config is swapped
//! - Endpoint lists are published copy-on-write, readers never lock
//! - Map locks are per shard and never held across I/O

pub mod backend;
pub mod endpoint;
pub mod manager;
pub mod route;

pub use backend::{BackendInfo, BackendManager};
pub use endpoint::{DynamicState, EndpointInfo, EndpointManager, RequestGuard};
pub use manager::ItemManager;
pub use route::{RouteInfo, RouteManager, RouteTable};
