pub mod bridge_flows;
pub mod engine_flows;
