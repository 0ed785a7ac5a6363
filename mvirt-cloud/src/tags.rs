//! Tag convention shared with the provider.
//!
//! These keys are part of the wire contract: they are written on creation and
//! read back as describe filters, so they must never change.

use crate::provider::Filter;

/// Human readable name tag.
pub const NAME: &str = "Name";

/// Cluster ownership tag.
pub const KUBERNETES_CLUSTER: &str = "KubernetesCluster";

/// Correlates a public route table with the public subnet it serves.
pub const PUBLIC_ROUTE_TABLE_SUBNET_PAIR: &str = "kubicorn-public-route-table-subnet-pair";

/// Correlates an internet gateway with its cluster.
pub const INTERNET_GATEWAY_NAME: &str = "kubicorn-internet-gateway-name";

/// Describe filter selecting objects tagged `key` = `value`.
pub fn filter(key: &str, value: &str) -> Filter {
    Filter {
        name: format!("tag:{}", key),
        values: vec![value.to_string()],
    }
}
