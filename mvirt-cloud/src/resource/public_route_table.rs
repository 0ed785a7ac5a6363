//! Public route table - one per public subnet, routing 0.0.0.0/0 to the
//! cluster's internet gateway.
//!
//! Route tables carry no foreign key to their subnet on the provider side, so
//! they are found again through the `kubicorn-public-route-table-subnet-pair`
//! tag. The lookup is tolerant in `actual` (first match wins, none is fine) and
//! strict in `delete` (exactly one match).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use super::{Resource, ResourceError, Result, Shared};
use crate::cluster::{Cluster, PublicSubnet};
use crate::provider::Ec2;
use crate::tags;

/// Destination of the default route towards the internet gateway.
pub const DEFAULT_ROUTE_CIDR: &str = "0.0.0.0/0";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublicRouteTable {
    #[serde(flatten)]
    pub shared: Shared,
    /// The subnet this table is associated with.
    #[serde(skip)]
    pub public_subnet: PublicSubnet,
}

impl PublicRouteTable {
    pub fn new(public_subnet: PublicSubnet) -> Self {
        Self {
            shared: Shared {
                name: public_subnet.name.clone(),
                ..Default::default()
            },
            public_subnet,
        }
    }

    /// One route table per public subnet, in declaration order.
    pub fn for_cluster(cluster: &Cluster) -> Vec<Self> {
        cluster
            .provider_config()
            .network
            .public_subnets
            .iter()
            .cloned()
            .map(Self::new)
            .collect()
    }

    fn derive(&self, shared: Shared) -> Self {
        Self {
            shared,
            public_subnet: self.public_subnet.clone(),
        }
    }

    async fn tag(&self, ec2: &dyn Ec2, tags: &HashMap<String, String>) -> Result<()> {
        self.shared.tag(ec2, Self::DISPLAY_NAME, tags).await
    }
}

#[async_trait]
impl Resource for PublicRouteTable {
    const KIND: &'static str = "publicroutetable";
    const DISPLAY_NAME: &'static str = "Public Route Table";

    fn shared(&self) -> &Shared {
        &self.shared
    }

    async fn actual(
        &self,
        ec2: &dyn Ec2,
        immutable: &Arc<Cluster>,
    ) -> Result<(Arc<Cluster>, Self)> {
        debug!("publicroutetable.Actual");
        let mut resource = self.derive(Shared {
            name: self.shared.name.clone(),
            ..Default::default()
        });

        if !self.public_subnet.identifier.is_empty() {
            let filter = tags::filter(
                tags::PUBLIC_ROUTE_TABLE_SUBNET_PAIR,
                &self.public_subnet.name,
            );
            let route_tables = ec2.describe_route_tables(&[filter]).await?;
            if let Some(rt) = route_tables.first() {
                resource.shared.tags = rt
                    .tags
                    .iter()
                    .map(|t| (t.key.clone(), t.value.clone()))
                    .collect();
                resource.shared.name = self.public_subnet.name.clone();
                resource.shared.identifier = self.public_subnet.name.clone();
            }
        }

        let cluster = self.render(&resource, immutable);
        Ok((cluster, resource))
    }

    fn expected(&self, immutable: &Arc<Cluster>) -> Result<(Arc<Cluster>, Self)> {
        debug!("publicroutetable.Expected");
        let tags = HashMap::from([
            (tags::NAME.to_string(), self.shared.name.clone()),
            (tags::KUBERNETES_CLUSTER.to_string(), immutable.name.clone()),
            (
                tags::PUBLIC_ROUTE_TABLE_SUBNET_PAIR.to_string(),
                self.public_subnet.name.clone(),
            ),
        ]);
        let resource = self.derive(Shared {
            name: self.public_subnet.name.clone(),
            identifier: self.public_subnet.name.clone(),
            tags,
        });
        let cluster = self.render(&resource, immutable);
        Ok((cluster, resource))
    }

    async fn apply(
        &self,
        ec2: &dyn Ec2,
        actual: &Self,
        expected: &Self,
        immutable: &Arc<Cluster>,
    ) -> Result<(Arc<Cluster>, Self)> {
        debug!("publicroutetable.Apply");
        if Self::converged(actual, expected)? {
            return Ok((Arc::clone(immutable), expected.clone()));
        }

        let network_id = &immutable.provider_config().network.identifier;
        let route_table = ec2.create_route_table(network_id).await?;
        let route_table_id = route_table.route_table_id;
        info!("Created Public Route Table [{}]", route_table_id);

        let filter = tags::filter(tags::INTERNET_GATEWAY_NAME, &immutable.name);
        let gateways = ec2.describe_internet_gateways(&[filter.clone()]).await?;
        let [gateway] = gateways.as_slice() else {
            return Err(ResourceError::Ambiguous {
                kind: "internet gateways",
                filter: filter.name,
                value: immutable.name.clone(),
                count: gateways.len(),
            });
        };
        info!(
            "Mapping Public Route Table [{}] to Internet Gateway [{}]",
            route_table_id, gateway.internet_gateway_id
        );

        ec2.create_route(
            &route_table_id,
            DEFAULT_ROUTE_CIDR,
            &gateway.internet_gateway_id,
        )
        .await?;

        let subnet_id = immutable
            .public_subnet(&self.shared.name)
            .map(|s| s.identifier.as_str())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ResourceError::UnresolvedDependency {
                kind: "public subnet",
                name: self.shared.name.clone(),
            })?;

        ec2.associate_route_table(&route_table_id, subnet_id)
            .await?;
        info!(
            "Associated Route Table [{}] with Public Subnet [{}]",
            route_table_id, subnet_id
        );

        let resource = self.derive(Shared {
            name: expected.shared.name.clone(),
            identifier: route_table_id,
            tags: expected.shared.tags.clone(),
        });
        resource
            .tag(ec2, &expected.shared.tags)
            .await
            .map_err(|e| ResourceError::Tagging {
                kind: Self::DISPLAY_NAME,
                source: Box::new(e),
            })?;

        let cluster = self.render(&resource, immutable);
        Ok((cluster, resource))
    }

    async fn delete(
        &self,
        ec2: &dyn Ec2,
        actual: &Self,
        immutable: &Arc<Cluster>,
    ) -> Result<(Arc<Cluster>, Self)> {
        debug!("publicroutetable.Delete");
        if actual.shared.identifier.is_empty() {
            return Err(ResourceError::MissingIdentifier {
                operation: "delete",
                kind: Self::DISPLAY_NAME,
                name: actual.shared.name.clone(),
            });
        }

        let filter = tags::filter(
            tags::PUBLIC_ROUTE_TABLE_SUBNET_PAIR,
            &self.public_subnet.name,
        );
        let route_tables = ec2.describe_route_tables(&[filter.clone()]).await?;
        let [route_table] = route_tables.as_slice() else {
            return Err(ResourceError::Ambiguous {
                kind: "public route tables",
                filter: filter.name,
                value: self.public_subnet.name.clone(),
                count: route_tables.len(),
            });
        };

        match route_table.associations.first() {
            Some(association) => {
                ec2.disassociate_route_table(&association.route_table_association_id)
                    .await?;
            }
            None => debug!(
                "Public Route Table [{}] has no association",
                route_table.route_table_id
            ),
        }

        ec2.delete_route_table(&route_table.route_table_id).await?;
        info!("Deleted Public Route Table [{}]", route_table.route_table_id);

        let resource = self.derive(Shared {
            name: actual.shared.name.clone(),
            identifier: String::new(),
            tags: actual.shared.tags.clone(),
        });
        let cluster = self.render(&resource, immutable);
        Ok((cluster, resource))
    }
}
