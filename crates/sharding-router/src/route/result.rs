//! Routing output.

use std::fmt;

use serde::Serialize;

use crate::core::DataNode;

/// Why a table was routed where it was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RouteSource {
    /// Computed by the table's own strategies.
    Sharded,
    /// Copied from another member of the table's binding group.
    Binding { primary: String },
    /// Every node of a broadcast table.
    Broadcast,
    /// Unsharded table on the default data source.
    Default,
    /// Data source forced through the hint context.
    Hinted,
}

impl fmt::Display for RouteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteSource::Sharded => write!(f, "sharded"),
            RouteSource::Binding { primary } => write!(f, "binding({})", primary),
            RouteSource::Broadcast => write!(f, "broadcast"),
            RouteSource::Default => write!(f, "default"),
            RouteSource::Hinted => write!(f, "hinted"),
        }
    }
}

/// The nodes one logic table resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRoute {
    pub logic_table: String,
    pub nodes: Vec<DataNode>,
    pub source: RouteSource,
}

/// The physical targets of one statement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouteResult {
    pub table_routes: Vec<TableRoute>,
    /// Reads must go to the primary; consumed by read/write splitting.
    pub write_route_only: bool,
}

impl RouteResult {
    /// Route of one logic table, matched case-insensitively.
    pub fn route_for(&self, logic_table: &str) -> Option<&TableRoute> {
        self.table_routes
            .iter()
            .find(|r| r.logic_table.eq_ignore_ascii_case(logic_table))
    }

    /// Nodes of one logic table (empty if it was not routed).
    pub fn nodes_for(&self, logic_table: &str) -> &[DataNode] {
        self.route_for(logic_table)
            .map(|r| r.nodes.as_slice())
            .unwrap_or(&[])
    }

    /// Every node of every table, in routing order, without duplicates.
    pub fn nodes(&self) -> Vec<&DataNode> {
        let mut nodes: Vec<&DataNode> = Vec::new();
        for node in self.table_routes.iter().flat_map(|r| &r.nodes) {
            if !nodes.contains(&node) {
                nodes.push(node);
            }
        }
        nodes
    }

    /// Distinct data sources the statement touches, in routing order.
    pub fn data_sources(&self) -> Vec<&str> {
        let mut sources: Vec<&str> = Vec::new();
        for node in self.table_routes.iter().flat_map(|r| &r.nodes) {
            if !sources.contains(&node.data_source.as_str()) {
                sources.push(&node.data_source);
            }
        }
        sources
    }

    /// True if the statement can run on one data source as is.
    pub fn is_single_data_source(&self) -> bool {
        self.data_sources().len() == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nodes_and_data_sources_are_distinct() {
        let result = RouteResult {
            table_routes: vec![
                TableRoute {
                    logic_table: "t_order".into(),
                    nodes: vec![DataNode::new("ds_1", "t_order_0"), DataNode::new("ds_0", "t_order_0")],
                    source: RouteSource::Sharded,
                },
                TableRoute {
                    logic_table: "t_dict".into(),
                    nodes: vec![DataNode::new("ds_0", "t_dict"), DataNode::new("ds_1", "t_dict")],
                    source: RouteSource::Broadcast,
                },
            ],
            write_route_only: false,
        };
        assert_eq!(result.data_sources(), vec!["ds_1", "ds_0"]);
        assert_eq!(result.nodes().len(), 4);
        assert_eq!(result.nodes_for("T_DICT").len(), 2);
        assert!(result.nodes_for("t_user").is_empty());
        assert!(!result.is_single_data_source());
    }

    #[test]
    fn test_serializes_route_source_tag() {
        let route = TableRoute {
            logic_table: "t_order_item".into(),
            nodes: vec![DataNode::new("ds_0", "t_order_item_1")],
            source: RouteSource::Binding {
                primary: "t_order".into(),
            },
        };
        let json = serde_json::to_value(&route).unwrap();
        assert_eq!(json["source"]["kind"], "binding");
        assert_eq!(json["source"]["primary"], "t_order");
        assert_eq!(json["nodes"][0]["table"], "t_order_item_1");
    }
}
