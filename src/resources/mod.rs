//! # Resource Pools
//!
//! Account and proxy leases: storage, selection strategies, upstream
//! provisioning and the pool manager that ties them together.

pub mod pool_manager;
pub mod provisioner;
pub mod selection;
pub mod store;

pub use pool_manager::{Acquisition, PoolStats, ResourcePoolManager};
pub use provisioner::{HttpProxyProvisioner, NullProvisioner, ResourceProvisioner};
pub use selection::LeaseSelector;
pub use store::{InMemoryLeaseStore, LeaseStore};
