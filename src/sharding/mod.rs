//! Sharding rules and broadcast routing
//!
//! `ShardingRule` is built from the TOML configuration and answers where a
//! logical table lives. The broadcast routing engines turn a statement into
//! route units, and the binding resolver keeps bound tables aligned within a
//! unit.

pub mod binding;
pub mod broadcast;
pub mod inline;
pub mod router;
pub mod rule;
pub mod table;

pub use binding::BindingTableResolver;
pub use broadcast::{
    DataSourceGroupBroadcastRoutingEngine, InstanceBroadcastRoutingEngine,
    TableBroadcastRoutingEngine,
};
pub use router::{RouteEngineSelector, RouteResult, RouteUnit, RoutingEngine, TableUnit};
pub use rule::{BindingTableRule, ShardingRule};
pub use table::{DataNode, TableRule};
