// Risk management module
pub mod model;

pub use model::{RiskModel, RiskThresholds};
