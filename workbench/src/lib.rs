pub mod actions;
pub mod config;
pub mod coords;
pub mod data_files;
pub mod derive;
pub mod error;
pub mod hdu_state;
pub mod job_flows;
pub mod jobs;
pub mod layout;
pub mod marker;
pub mod panels;
pub mod runtime;
pub mod sources;
pub mod store;
pub mod sync;
pub mod tools;
pub mod transform;
pub mod wcs;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;

pub use config::WorkbenchConfig;
pub use error::{Result, WorkbenchError};
pub use actions::{Action, Effect};
pub use runtime::WorkbenchRuntime;
pub use store::{Workbench, WorkbenchState};
