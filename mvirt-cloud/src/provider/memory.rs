//! In-process provider backend.
//!
//! Keeps route tables and internet gateways in memory and behaves like the EC2
//! networking API for the calls in [`Ec2`]: generated IDs, tag filters, a
//! subnet takes a single route table association, and a route table cannot be
//! deleted while it is still associated. Every call is
//! recorded in a journal, and a single operation can be made to fail, so tests
//! can assert exactly what a reconciler did.
//!
//! The inventory can be loaded from and saved to a JSON file, which is what the
//! `mvirt-cloud` binary uses as its local backend.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{
    Ec2, Filter, InternetGateway, ProviderError, Result, Route, RouteTable,
    RouteTableAssociation, Tag,
};

/// Provider objects held by [`MemoryEc2`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub route_tables: Vec<RouteTable>,
    #[serde(default)]
    pub internet_gateways: Vec<InternetGateway>,
}

/// Provider operation names, used for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    DescribeRouteTables,
    CreateRouteTable,
    DescribeInternetGateways,
    CreateRoute,
    AssociateRouteTable,
    DisassociateRouteTable,
    DeleteRouteTable,
    CreateTags,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::DescribeRouteTables => "DescribeRouteTables",
            Operation::CreateRouteTable => "CreateRouteTable",
            Operation::DescribeInternetGateways => "DescribeInternetGateways",
            Operation::CreateRoute => "CreateRoute",
            Operation::AssociateRouteTable => "AssociateRouteTable",
            Operation::DisassociateRouteTable => "DisassociateRouteTable",
            Operation::DeleteRouteTable => "DeleteRouteTable",
            Operation::CreateTags => "CreateTags",
        }
    }
}

/// One recorded provider call with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    DescribeRouteTables {
        filters: Vec<Filter>,
    },
    CreateRouteTable {
        vpc_id: String,
    },
    DescribeInternetGateways {
        filters: Vec<Filter>,
    },
    CreateRoute {
        route_table_id: String,
        destination_cidr_block: String,
        gateway_id: String,
    },
    AssociateRouteTable {
        route_table_id: String,
        subnet_id: String,
    },
    DisassociateRouteTable {
        association_id: String,
    },
    DeleteRouteTable {
        route_table_id: String,
    },
    CreateTags {
        resources: Vec<String>,
        tags: Vec<Tag>,
    },
}

impl Call {
    pub fn operation(&self) -> Operation {
        match self {
            Call::DescribeRouteTables { .. } => Operation::DescribeRouteTables,
            Call::CreateRouteTable { .. } => Operation::CreateRouteTable,
            Call::DescribeInternetGateways { .. } => Operation::DescribeInternetGateways,
            Call::CreateRoute { .. } => Operation::CreateRoute,
            Call::AssociateRouteTable { .. } => Operation::AssociateRouteTable,
            Call::DisassociateRouteTable { .. } => Operation::DisassociateRouteTable,
            Call::DeleteRouteTable { .. } => Operation::DeleteRouteTable,
            Call::CreateTags { .. } => Operation::CreateTags,
        }
    }

    /// Whether the call changes provider state.
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Call::DescribeRouteTables { .. } | Call::DescribeInternetGateways { .. }
        )
    }
}

#[derive(Default)]
struct State {
    inventory: Inventory,
    journal: Vec<Call>,
    fail_on: Option<Operation>,
}

impl State {
    /// Record the call, then fail it if it was armed.
    fn record(&mut self, call: Call) -> Result<()> {
        let operation = call.operation();
        self.journal.push(call);
        if self.fail_on == Some(operation) {
            self.fail_on = None;
            return Err(ProviderError::Api {
                operation: operation.as_str(),
                code: "InjectedFailure".to_string(),
                message: "failure injected by test".to_string(),
            });
        }
        Ok(())
    }

    fn route_table_mut(
        &mut self,
        operation: Operation,
        route_table_id: &str,
    ) -> Result<&mut RouteTable> {
        self.inventory
            .route_tables
            .iter_mut()
            .find(|rt| rt.route_table_id == route_table_id)
            .ok_or_else(|| ProviderError::NotFound {
                operation: operation.as_str(),
                kind: "route table",
                id: route_table_id.to_string(),
            })
    }
}

fn new_id(prefix: &str) -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &raw[..17])
}

fn inventory_error(path: &Path, action: &str, e: impl std::fmt::Display) -> ProviderError {
    ProviderError::Inventory {
        path: path.display().to_string(),
        message: format!("{}: {}", action, e),
    }
}

fn matches_all(filters: &[Filter], tags: &[Tag]) -> bool {
    filters.iter().all(|f| f.matches(tags))
}

/// In-memory [`Ec2`] implementation.
#[derive(Default)]
pub struct MemoryEc2 {
    state: Mutex<State>,
}

impl MemoryEc2 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inventory(inventory: Inventory) -> Self {
        Self {
            state: Mutex::new(State {
                inventory,
                ..Default::default()
            }),
        }
    }

    /// Load an inventory file, starting empty if it does not exist yet.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No inventory at {}, starting empty", path.display());
                return Ok(Self::new());
            }
            Err(e) => return Err(inventory_error(path, "read", e)),
        };
        let inventory: Inventory =
            serde_json::from_str(&raw).map_err(|e| inventory_error(path, "parse", e))?;
        Ok(Self::with_inventory(inventory))
    }

    /// Write the current inventory as pretty JSON.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let inventory = self.inventory().await;
        let raw = serde_json::to_string_pretty(&inventory)
            .map_err(|e| inventory_error(path, "encode", e))?;
        tokio::fs::write(path, raw)
            .await
            .map_err(|e| inventory_error(path, "write", e))
    }

    /// Register an internet gateway, returning its ID.
    pub async fn add_internet_gateway(&self, tags: Vec<Tag>) -> String {
        let id = new_id("igw");
        self.state
            .lock()
            .await
            .inventory
            .internet_gateways
            .push(InternetGateway {
                internet_gateway_id: id.clone(),
                tags,
            });
        id
    }

    /// Register a route table without going through the journal.
    pub async fn add_route_table(&self, vpc_id: &str, tags: Vec<Tag>) -> String {
        let id = new_id("rtb");
        self.state
            .lock()
            .await
            .inventory
            .route_tables
            .push(RouteTable {
                route_table_id: id.clone(),
                vpc_id: vpc_id.to_string(),
                routes: vec![],
                associations: vec![],
                tags,
            });
        id
    }

    /// Make the next call of `operation` fail with an API error.
    pub async fn fail_on(&self, operation: Operation) {
        self.state.lock().await.fail_on = Some(operation);
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.state.lock().await.journal.clone()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.journal.clear();
    }

    pub async fn inventory(&self) -> Inventory {
        self.state.lock().await.inventory.clone()
    }
}

#[async_trait]
impl Ec2 for MemoryEc2 {
    async fn describe_route_tables(&self, filters: &[Filter]) -> Result<Vec<RouteTable>> {
        let mut state = self.state.lock().await;
        state.record(Call::DescribeRouteTables {
            filters: filters.to_vec(),
        })?;
        Ok(state
            .inventory
            .route_tables
            .iter()
            .filter(|rt| matches_all(filters, &rt.tags))
            .cloned()
            .collect())
    }

    async fn create_route_table(&self, vpc_id: &str) -> Result<RouteTable> {
        let mut state = self.state.lock().await;
        state.record(Call::CreateRouteTable {
            vpc_id: vpc_id.to_string(),
        })?;
        let route_table = RouteTable {
            route_table_id: new_id("rtb"),
            vpc_id: vpc_id.to_string(),
            routes: vec![],
            associations: vec![],
            tags: vec![],
        };
        state.inventory.route_tables.push(route_table.clone());
        Ok(route_table)
    }

    async fn describe_internet_gateways(
        &self,
        filters: &[Filter],
    ) -> Result<Vec<InternetGateway>> {
        let mut state = self.state.lock().await;
        state.record(Call::DescribeInternetGateways {
            filters: filters.to_vec(),
        })?;
        Ok(state
            .inventory
            .internet_gateways
            .iter()
            .filter(|ig| matches_all(filters, &ig.tags))
            .cloned()
            .collect())
    }

    async fn create_route(
        &self,
        route_table_id: &str,
        destination_cidr_block: &str,
        gateway_id: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(Call::CreateRoute {
            route_table_id: route_table_id.to_string(),
            destination_cidr_block: destination_cidr_block.to_string(),
            gateway_id: gateway_id.to_string(),
        })?;
        if !state
            .inventory
            .internet_gateways
            .iter()
            .any(|ig| ig.internet_gateway_id == gateway_id)
        {
            return Err(ProviderError::NotFound {
                operation: Operation::CreateRoute.as_str(),
                kind: "internet gateway",
                id: gateway_id.to_string(),
            });
        }
        let route_table = state.route_table_mut(Operation::CreateRoute, route_table_id)?;
        if route_table
            .routes
            .iter()
            .any(|r| r.destination_cidr_block == destination_cidr_block)
        {
            return Err(ProviderError::Api {
                operation: Operation::CreateRoute.as_str(),
                code: "RouteAlreadyExists".to_string(),
                message: format!(
                    "route {} already exists in {}",
                    destination_cidr_block, route_table_id
                ),
            });
        }
        route_table.routes.push(Route {
            destination_cidr_block: destination_cidr_block.to_string(),
            gateway_id: gateway_id.to_string(),
        });
        Ok(())
    }

    async fn associate_route_table(
        &self,
        route_table_id: &str,
        subnet_id: &str,
    ) -> Result<String> {
        let mut state = self.state.lock().await;
        state.record(Call::AssociateRouteTable {
            route_table_id: route_table_id.to_string(),
            subnet_id: subnet_id.to_string(),
        })?;
        if let Some(existing) = state
            .inventory
            .route_tables
            .iter()
            .flat_map(|rt| rt.associations.iter())
            .find(|a| a.subnet_id == subnet_id)
        {
            return Err(ProviderError::Api {
                operation: Operation::AssociateRouteTable.as_str(),
                code: "Resource.AlreadyAssociated".to_string(),
                message: format!(
                    "subnet {} is already associated with {}",
                    subnet_id, existing.route_table_id
                ),
            });
        }
        let association_id = new_id("rtbassoc");
        let route_table = state.route_table_mut(Operation::AssociateRouteTable, route_table_id)?;
        route_table.associations.push(RouteTableAssociation {
            route_table_association_id: association_id.clone(),
            route_table_id: route_table_id.to_string(),
            subnet_id: subnet_id.to_string(),
        });
        Ok(association_id)
    }

    async fn disassociate_route_table(&self, association_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(Call::DisassociateRouteTable {
            association_id: association_id.to_string(),
        })?;
        for route_table in state.inventory.route_tables.iter_mut() {
            let before = route_table.associations.len();
            route_table
                .associations
                .retain(|a| a.route_table_association_id != association_id);
            if route_table.associations.len() != before {
                return Ok(());
            }
        }
        Err(ProviderError::NotFound {
            operation: Operation::DisassociateRouteTable.as_str(),
            kind: "route table association",
            id: association_id.to_string(),
        })
    }

    async fn delete_route_table(&self, route_table_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(Call::DeleteRouteTable {
            route_table_id: route_table_id.to_string(),
        })?;
        let route_table = state.route_table_mut(Operation::DeleteRouteTable, route_table_id)?;
        if !route_table.associations.is_empty() {
            return Err(ProviderError::Api {
                operation: Operation::DeleteRouteTable.as_str(),
                code: "DependencyViolation".to_string(),
                message: format!(
                    "route table {} has {} associations",
                    route_table_id,
                    route_table.associations.len()
                ),
            });
        }
        state
            .inventory
            .route_tables
            .retain(|rt| rt.route_table_id != route_table_id);
        Ok(())
    }

    async fn create_tags(&self, resources: &[String], tags: &[Tag]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(Call::CreateTags {
            resources: resources.to_vec(),
            tags: tags.to_vec(),
        })?;
        let inventory = &mut state.inventory;
        for id in resources {
            let target = if let Some(rt) = inventory
                .route_tables
                .iter_mut()
                .find(|rt| rt.route_table_id == *id)
            {
                &mut rt.tags
            } else if let Some(ig) = inventory
                .internet_gateways
                .iter_mut()
                .find(|ig| ig.internet_gateway_id == *id)
            {
                &mut ig.tags
            } else {
                return Err(ProviderError::NotFound {
                    operation: Operation::CreateTags.as_str(),
                    kind: "resource",
                    id: id.clone(),
                });
            };
            for tag in tags {
                match target.iter_mut().find(|t| t.key == tag.key) {
                    Some(existing) => existing.value = tag.value.clone(),
                    None => target.push(tag.clone()),
                }
            }
        }
        Ok(())
    }
}
