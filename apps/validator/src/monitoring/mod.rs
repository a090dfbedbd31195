pub mod checker;
pub mod executor;
pub mod validation;

pub use checker::{Checker, HttpChecker, Probe};
pub use executor::{CheckReport, MonitoringExecutor, classify};
pub use validation::validate_target;
