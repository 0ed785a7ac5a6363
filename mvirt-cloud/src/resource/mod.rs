//! Reconcilable cloud resources.
//!
//! Every resource kind implements the same four state functions:
//! - `actual`: what exists on the provider right now
//! - `expected`: what should exist, derived from the cluster alone
//! - `apply`: converge the provider from actual toward expected
//! - `delete`: tear the provider object down
//!
//! Each function takes the current cluster snapshot and returns the snapshot
//! for the next step together with a freshly built resource value.

pub mod public_route_table;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::cluster::Cluster;
use crate::compare::{self, CompareError};
use crate::provider::{Ec2, ProviderError, Tag};

pub use public_route_table::PublicRouteTable;

/// Errors from a reconciliation phase.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Compare(#[from] CompareError),

    /// A lookup that needs exactly one match found zero or several.
    #[error("found [{count}] {kind} for {filter} [{value}]")]
    Ambiguous {
        kind: &'static str,
        filter: String,
        value: String,
        count: usize,
    },

    /// The operation needs a provider ID the resource does not have.
    #[error("unable to {operation} {kind} resource without ID [{name}]")]
    MissingIdentifier {
        operation: &'static str,
        kind: &'static str,
        name: String,
    },

    /// A sibling resource needed by this one has no known ID.
    #[error("unable to find {kind} ID for [{name}]")]
    UnresolvedDependency { kind: &'static str, name: String },

    #[error("unable to tag new {kind}: {source}")]
    Tagging {
        kind: &'static str,
        #[source]
        source: Box<ResourceError>,
    },
}

pub type Result<T> = std::result::Result<T, ResourceError>;

/// Fields common to every resource kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shared {
    /// Logical name, stable across reconciliations.
    pub name: String,
    /// Provider ID, empty until the object is known to exist.
    pub identifier: String,
    pub tags: HashMap<String, String>,
}

impl Shared {
    /// Apply `tags` to the object in a single provider call. `kind` is the
    /// display name used in errors.
    ///
    /// Tags are sent sorted by key.
    pub async fn tag(
        &self,
        ec2: &dyn Ec2,
        kind: &'static str,
        tags: &HashMap<String, String>,
    ) -> Result<()> {
        debug!("Tagging {} [{}]", kind, self.identifier);
        if self.identifier.is_empty() {
            return Err(ResourceError::MissingIdentifier {
                operation: "tag",
                kind,
                name: self.name.clone(),
            });
        }
        let mut pairs: Vec<Tag> = tags
            .iter()
            .map(|(key, value)| {
                debug!("Registering {} tag [{}] {}", kind, key, value);
                Tag::new(key.as_str(), value.as_str())
            })
            .collect();
        pairs.sort();
        ec2.create_tags(std::slice::from_ref(&self.identifier), &pairs)
            .await?;
        Ok(())
    }
}

/// The reconciliation protocol implemented by each resource kind.
#[async_trait]
pub trait Resource: Serialize + Sized + Send + Sync {
    /// Kind name used in debug logs, e.g. `publicroutetable.Apply`.
    const KIND: &'static str;

    /// Human readable kind name used in errors and info logs.
    const DISPLAY_NAME: &'static str;

    fn shared(&self) -> &Shared;

    /// Observe the provider. Returns a resource with an empty identifier when
    /// nothing exists yet.
    async fn actual(&self, ec2: &dyn Ec2, immutable: &Arc<Cluster>)
    -> Result<(Arc<Cluster>, Self)>;

    /// Desired state, computed without touching the provider.
    fn expected(&self, immutable: &Arc<Cluster>) -> Result<(Arc<Cluster>, Self)>;

    async fn apply(
        &self,
        ec2: &dyn Ec2,
        actual: &Self,
        expected: &Self,
        immutable: &Arc<Cluster>,
    ) -> Result<(Arc<Cluster>, Self)>;

    async fn delete(
        &self,
        ec2: &dyn Ec2,
        actual: &Self,
        immutable: &Arc<Cluster>,
    ) -> Result<(Arc<Cluster>, Self)>;

    /// Whether apply has nothing to do. A resource without an identifier is
    /// never converged, whatever the comparison says.
    fn converged(actual: &Self, expected: &Self) -> Result<bool> {
        if actual.shared().identifier.is_empty() {
            return Ok(false);
        }
        Ok(compare::is_equal(actual, expected)?)
    }

    /// Fold a phase outcome into the snapshot used by the next step.
    fn render(&self, _outcome: &Self, immutable: &Arc<Cluster>) -> Arc<Cluster> {
        debug!("{}.Render", Self::KIND);
        Arc::clone(immutable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Call, MemoryEc2};

    #[tokio::test]
    async fn test_tag_without_identifier_makes_no_call() {
        let ec2 = MemoryEc2::new();
        let shared = Shared {
            name: "public-a".to_string(),
            ..Default::default()
        };

        let err = shared
            .tag(&ec2, "Public Route Table", &HashMap::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ResourceError::MissingIdentifier { .. }));
        assert!(ec2.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_tag_sends_all_pairs_in_one_call() {
        let ec2 = MemoryEc2::new();
        let id = ec2.add_route_table("vpc-1", vec![]).await;
        let shared = Shared {
            name: "public-a".to_string(),
            identifier: id.clone(),
            tags: HashMap::new(),
        };
        let tags: HashMap<String, String> = [("b", "2"), ("a", "1")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        shared.tag(&ec2, "Public Route Table", &tags).await.unwrap();

        assert_eq!(
            ec2.calls().await,
            vec![Call::CreateTags {
                resources: vec![id],
                tags: vec![Tag::new("a", "1"), Tag::new("b", "2")],
            }]
        );
    }

    #[tokio::test]
    async fn test_tag_surfaces_provider_error() {
        let ec2 = MemoryEc2::new();
        let shared = Shared {
            name: "public-a".to_string(),
            identifier: "rtb-gone".to_string(),
            tags: HashMap::new(),
        };
        let mut tags = HashMap::new();
        tags.insert("Name".to_string(), "public-a".to_string());

        let err = shared.tag(&ec2, "Public Route Table", &tags).await.unwrap_err();
        assert!(matches!(
            err,
            ResourceError::Provider(ProviderError::NotFound { .. })
        ));
    }
}
