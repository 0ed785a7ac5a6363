//! Immutable cluster description.
//!
//! A [`Cluster`] is never mutated once built. Reconcilers receive it behind an
//! `Arc` and hand back an `Arc` for the next step, which may point at the same
//! value or at a fresh copy.

use serde::{Deserialize, Serialize};

/// Declared (and partially observed) topology of a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    pub provider_config: ProviderConfig,
}

/// Provider specific part of the cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub network: Network,
}

/// The provider network (VPC) the cluster lives in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// Provider assigned network ID.
    pub identifier: String,
    /// Public subnets in declaration order.
    #[serde(default)]
    pub public_subnets: Vec<PublicSubnet>,
}

/// A public subnet record. `identifier` stays empty until the subnet exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicSubnet {
    pub name: String,
    #[serde(default)]
    pub identifier: String,
}

impl PublicSubnet {
    pub fn new(name: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
        }
    }
}

impl Cluster {
    pub fn new(
        name: impl Into<String>,
        network_identifier: impl Into<String>,
        public_subnets: Vec<PublicSubnet>,
    ) -> Self {
        Self {
            name: name.into(),
            provider_config: ProviderConfig {
                network: Network {
                    identifier: network_identifier.into(),
                    public_subnets,
                },
            },
        }
    }

    pub fn provider_config(&self) -> &ProviderConfig {
        &self.provider_config
    }

    /// Find a public subnet by its logical name.
    pub fn public_subnet(&self, name: &str) -> Option<&PublicSubnet> {
        self.provider_config
            .network
            .public_subnets
            .iter()
            .find(|s| s.name == name)
    }

    /// Copy of this cluster with the public subnet of the same name replaced,
    /// or appended when no subnet carries that name. `self` is left as is.
    pub fn with_public_subnet(&self, subnet: PublicSubnet) -> Self {
        let mut cluster = self.clone();
        let subnets = &mut cluster.provider_config.network.public_subnets;
        match subnets.iter_mut().find(|s| s.name == subnet.name) {
            Some(existing) => *existing = subnet,
            None => subnets.push(subnet),
        }
        cluster
    }
}
