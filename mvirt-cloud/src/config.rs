//! Cluster declaration loading.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::cluster::Cluster;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse cluster declaration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Cluster name is required")]
    ClusterNameRequired,

    #[error("Network identifier required")]
    NetworkIdRequired,

    #[error("Public subnet name is required")]
    SubnetNameRequired,

    #[error("Public subnet '{0}' is declared more than once")]
    DuplicateSubnet(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Parse and validate a cluster declaration from JSON.
pub fn parse_cluster(raw: &str) -> Result<Arc<Cluster>> {
    let cluster: Cluster = serde_json::from_str(raw)?;
    validate(&cluster)?;
    Ok(Arc::new(cluster))
}

/// Read a cluster declaration file.
pub fn load_cluster(path: &Path) -> Result<Arc<Cluster>> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_cluster(&raw)
}

fn validate(cluster: &Cluster) -> Result<()> {
    if cluster.name.is_empty() {
        return Err(ConfigError::ClusterNameRequired);
    }
    let network = &cluster.provider_config().network;
    if network.identifier.is_empty() {
        return Err(ConfigError::NetworkIdRequired);
    }
    let mut seen = HashSet::new();
    for subnet in &network.public_subnets {
        if subnet.name.is_empty() {
            return Err(ConfigError::SubnetNameRequired);
        }
        if !seen.insert(subnet.name.as_str()) {
            return Err(ConfigError::DuplicateSubnet(subnet.name.clone()));
        }
    }
    Ok(())
}
