//! Datachannel - data channel topology controller
//!
//! Reconciles `ChannelTopology` resources into worker clusters that move
//! data between independently managed database clusters.

pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod expression;
pub mod graph;
pub mod ledger;
pub mod reconciler;
pub mod store;
pub mod utils;

pub use error::{ControllerError, Result};
