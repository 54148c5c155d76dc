pub mod aggregate;
pub mod cache;
pub mod classify;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod export;
pub mod load;
pub mod ratio;
pub mod stats;

pub use aggregate::{Level, Metric, RegionYear};
pub use classify::{classify, Affordability};
pub use config::Config;
pub use dashboard::{Dashboard, Outcome};
pub use error::{Error, ErrorKind, Result};
pub use load::{Observation, Source, Table};
pub use ratio::ratio;
