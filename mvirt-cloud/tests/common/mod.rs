//! Shared test utilities for mvirt-cloud integration tests.

use std::sync::Arc;

use mvirt_cloud::provider::{Call, Tag};
use mvirt_cloud::tags;
use mvirt_cloud::{Cluster, MemoryEc2, PublicSubnet, Reconciler};

/// A reconciler wired to a fresh in-memory provider.
pub struct TestEnv {
    pub ec2: Arc<MemoryEc2>,
    pub reconciler: Reconciler,
}

impl TestEnv {
    /// Provider that already holds the cluster's internet gateway.
    pub async fn with_gateway(cluster: &str) -> Self {
        let env = Self::from_provider(Arc::new(MemoryEc2::new()));
        env.ec2
            .add_internet_gateway(vec![Tag::new(tags::INTERNET_GATEWAY_NAME, cluster)])
            .await;
        env
    }

    pub fn from_provider(ec2: Arc<MemoryEc2>) -> Self {
        let reconciler = Reconciler::new(ec2.clone());
        Self { ec2, reconciler }
    }

    /// Calls that changed provider state since the journal was last cleared.
    pub async fn mutations(&self) -> Vec<Call> {
        self.ec2
            .calls()
            .await
            .into_iter()
            .filter(Call::is_mutation)
            .collect()
    }
}

/// Cluster `demo` in `vpc-1` with existing subnets `public-<x>`.
pub fn cluster(subnets: &[&str]) -> Arc<Cluster> {
    Arc::new(Cluster::new(
        "demo",
        "vpc-1",
        subnets
            .iter()
            .map(|s| PublicSubnet::new(format!("public-{}", s), format!("subnet-{}", s)))
            .collect(),
    ))
}
