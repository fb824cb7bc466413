pub mod cli;
pub mod config;
pub mod dispatch;
pub mod logging;
pub mod node;

pub use config::NodeConfig;
pub use dispatch::{dispatch, TxRequest, TxResponse};
pub use node::{FedlNode, InspectReport, ReplaySummary};
