// Risk management module
pub mod limiter;

pub use limiter::{RiskLevel, RiskLimiter, RiskState};
