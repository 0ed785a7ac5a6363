//! Reconciliation driver.
//!
//! Sequences the state functions of a [`Resource`]: actual, expected, compare,
//! apply for convergence and actual, delete for teardown. Calls are issued one
//! after another; nothing here runs concurrently. The cluster snapshot returned
//! by one step is the input to the next.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cluster::Cluster;
use crate::provider::Ec2;
use crate::resource::{PublicRouteTable, Resource, Result};

/// What `apply` would do for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanAction {
    /// Actual matches expected.
    Noop,
    /// Provider changes are needed.
    Apply,
}

/// Drives resources through their lifecycle against one provider.
pub struct Reconciler {
    ec2: Arc<dyn Ec2>,
}

impl Reconciler {
    pub fn new(ec2: Arc<dyn Ec2>) -> Self {
        Self { ec2 }
    }

    /// Converge a single resource: actual, expected, then apply.
    pub async fn reconcile<R: Resource>(
        &self,
        resource: &R,
        cluster: Arc<Cluster>,
    ) -> Result<(Arc<Cluster>, R)> {
        info!("Reconciling {} {}", R::KIND, resource.shared().name);
        let (cluster, actual) = resource.actual(self.ec2.as_ref(), &cluster).await?;
        let (cluster, expected) = resource.expected(&cluster)?;
        resource
            .apply(self.ec2.as_ref(), &actual, &expected, &cluster)
            .await
    }

    /// Tear a single resource down.
    ///
    /// A resource that is not found on the provider is left alone.
    pub async fn destroy<R: Resource>(
        &self,
        resource: &R,
        cluster: Arc<Cluster>,
    ) -> Result<(Arc<Cluster>, R)> {
        info!("Destroying {} {}", R::KIND, resource.shared().name);
        let (cluster, actual) = resource.actual(self.ec2.as_ref(), &cluster).await?;
        if actual.shared().identifier.is_empty() {
            warn!(
                "{} {} not found on provider, nothing to delete",
                R::KIND,
                actual.shared().name
            );
            return Ok((cluster, actual));
        }
        resource.delete(self.ec2.as_ref(), &actual, &cluster).await
    }

    /// Report whether `reconcile` would change anything. Read-only.
    pub async fn plan<R: Resource>(&self, resource: &R, cluster: &Arc<Cluster>) -> Result<PlanAction> {
        debug!("Planning {} {}", R::KIND, resource.shared().name);
        let (cluster, actual) = resource.actual(self.ec2.as_ref(), cluster).await?;
        let (_, expected) = resource.expected(&cluster)?;
        if R::converged(&actual, &expected)? {
            Ok(PlanAction::Noop)
        } else {
            Ok(PlanAction::Apply)
        }
    }

    /// Reconcile every public route table of the cluster in declaration
    /// order. Stops at the first failure.
    pub async fn apply_cluster(
        &self,
        cluster: Arc<Cluster>,
    ) -> Result<(Arc<Cluster>, Vec<PublicRouteTable>)> {
        let mut cluster = cluster;
        let mut applied = Vec::new();
        for route_table in PublicRouteTable::for_cluster(&cluster) {
            let (next, resource) = self.reconcile(&route_table, cluster).await?;
            cluster = next;
            applied.push(resource);
        }
        Ok((cluster, applied))
    }

    /// Destroy every public route table of the cluster in reverse
    /// declaration order. Stops at the first failure.
    pub async fn destroy_cluster(
        &self,
        cluster: Arc<Cluster>,
    ) -> Result<(Arc<Cluster>, Vec<PublicRouteTable>)> {
        let mut cluster = cluster;
        let mut destroyed = Vec::new();
        for route_table in PublicRouteTable::for_cluster(&cluster).into_iter().rev() {
            let (next, resource) = self.destroy(&route_table, cluster).await?;
            cluster = next;
            destroyed.push(resource);
        }
        Ok((cluster, destroyed))
    }

    /// Plan every public route table of the cluster, keyed by name.
    pub async fn plan_cluster(&self, cluster: &Arc<Cluster>) -> Result<Vec<(String, PlanAction)>> {
        let mut plan = Vec::new();
        for route_table in PublicRouteTable::for_cluster(cluster) {
            let action = self.plan(&route_table, cluster).await?;
            plan.push((route_table.shared.name, action));
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::PublicSubnet;
    use crate::provider::{MemoryEc2, Tag};
    use crate::tags;

    #[tokio::test]
    async fn test_destroy_absent_resource_makes_only_lookups() {
        let ec2 = Arc::new(MemoryEc2::new());
        let reconciler = Reconciler::new(ec2.clone());
        let cluster = Arc::new(Cluster::new(
            "demo",
            "vpc-1",
            vec![PublicSubnet::new("public-a", "subnet-a")],
        ));
        let rt = PublicRouteTable::new(PublicSubnet::new("public-a", "subnet-a"));

        let (_, resource) = reconciler.destroy(&rt, cluster).await.unwrap();

        assert!(resource.shared.identifier.is_empty());
        assert!(ec2.calls().await.iter().all(|c| !c.is_mutation()));
    }

    #[tokio::test]
    async fn test_plan_reports_apply_then_noop() {
        let ec2 = Arc::new(MemoryEc2::new());
        ec2.add_internet_gateway(vec![Tag::new(tags::INTERNET_GATEWAY_NAME, "demo")])
            .await;
        let reconciler = Reconciler::new(ec2.clone());
        let cluster = Arc::new(Cluster::new(
            "demo",
            "vpc-1",
            vec![PublicSubnet::new("public-a", "subnet-a")],
        ));
        let rt = PublicRouteTable::new(PublicSubnet::new("public-a", "subnet-a"));

        assert_eq!(reconciler.plan(&rt, &cluster).await.unwrap(), PlanAction::Apply);
        reconciler.reconcile(&rt, Arc::clone(&cluster)).await.unwrap();
        assert_eq!(reconciler.plan(&rt, &cluster).await.unwrap(), PlanAction::Noop);
    }
}
