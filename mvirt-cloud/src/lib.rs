//! mvirt-cloud: reconciles cluster networking on a cloud provider.
//!
//! The declared [`cluster::Cluster`] is compared against what the provider
//! reports, and the provider is converged with idempotent create and delete
//! calls. Provider objects are correlated through tags only (see [`tags`]), so
//! actual state can always be re-derived after a restart.

pub mod cluster;
pub mod compare;
pub mod config;
pub mod provider;
pub mod reconciler;
pub mod resource;
pub mod tags;

pub use cluster::{Cluster, PublicSubnet};
pub use provider::{Ec2, MemoryEc2};
pub use reconciler::{PlanAction, Reconciler};
pub use resource::{PublicRouteTable, Resource, ResourceError};
