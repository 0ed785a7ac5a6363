//! Cloud provider gateway.
//!
//! The [`Ec2`] trait is the only way reconcilers talk to the provider. It mirrors
//! the subset of the EC2 networking API used for public route tables. A client
//! is passed into every reconciliation call, so tests can swap in [`MemoryEc2`].

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::{Call, Inventory, MemoryEc2, Operation};

/// Errors returned by a provider client.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider rejected the request.
    #[error("{operation}: {code}: {message}")]
    Api {
        operation: &'static str,
        code: String,
        message: String,
    },

    /// The referenced provider object does not exist.
    #[error("{operation}: {kind} [{id}] not found")]
    NotFound {
        operation: &'static str,
        kind: &'static str,
        id: String,
    },

    /// The request never reached the provider.
    #[error("transport: {0}")]
    Transport(String),

    /// A local inventory file could not be read or written.
    #[error("inventory {path}: {message}")]
    Inventory { path: String, message: String },
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// A single key/value tag on a provider object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A describe filter, e.g. `tag:Name` = `["public-a"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub name: String,
    pub values: Vec<String>,
}

impl Filter {
    /// Whether an object carrying `tags` passes this filter.
    ///
    /// Only `tag:<key>` filters are understood; anything else never matches.
    pub fn matches(&self, tags: &[Tag]) -> bool {
        let Some(key) = self.name.strip_prefix("tag:") else {
            return false;
        };
        tags.iter()
            .any(|t| t.key == key && self.values.iter().any(|v| *v == t.value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub destination_cidr_block: String,
    pub gateway_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTableAssociation {
    pub route_table_association_id: String,
    pub route_table_id: String,
    pub subnet_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTable {
    pub route_table_id: String,
    pub vpc_id: String,
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub associations: Vec<RouteTableAssociation>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternetGateway {
    pub internet_gateway_id: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// Networking operations consumed from the provider.
///
/// Every call is a single request; implementations do not retry.
#[async_trait]
pub trait Ec2: Send + Sync {
    /// List route tables matching all `filters`.
    async fn describe_route_tables(&self, filters: &[Filter]) -> Result<Vec<RouteTable>>;

    /// Create an empty route table in the given network.
    async fn create_route_table(&self, vpc_id: &str) -> Result<RouteTable>;

    /// List internet gateways matching all `filters`.
    async fn describe_internet_gateways(&self, filters: &[Filter])
    -> Result<Vec<InternetGateway>>;

    async fn create_route(
        &self,
        route_table_id: &str,
        destination_cidr_block: &str,
        gateway_id: &str,
    ) -> Result<()>;

    /// Associate a route table with a subnet, returning the association ID.
    async fn associate_route_table(&self, route_table_id: &str, subnet_id: &str)
    -> Result<String>;

    async fn disassociate_route_table(&self, association_id: &str) -> Result<()>;

    async fn delete_route_table(&self, route_table_id: &str) -> Result<()>;

    /// Apply all `tags` to every object in `resources`.
    async fn create_tags(&self, resources: &[String], tags: &[Tag]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matches_tag_value() {
        let filter = Filter {
            name: "tag:KubernetesCluster".to_string(),
            values: vec!["demo".to_string(), "other".to_string()],
        };
        assert!(filter.matches(&[Tag::new("KubernetesCluster", "demo")]));
        assert!(filter.matches(&[Tag::new("Name", "x"), Tag::new("KubernetesCluster", "other")]));
        assert!(!filter.matches(&[Tag::new("KubernetesCluster", "prod")]));
        assert!(!filter.matches(&[Tag::new("Name", "demo")]));
        assert!(!filter.matches(&[]));
    }

    #[test]
    fn test_filter_ignores_non_tag_names() {
        let filter = Filter {
            name: "vpc-id".to_string(),
            values: vec!["vpc-1".to_string()],
        };
        assert!(!filter.matches(&[Tag::new("vpc-id", "vpc-1")]));
    }
}
