//! # pkgqa-pipeline
//!
//! Check runners and the scan scheduler.
//!
//! [`plug`] wires sources to checks, grouping the resulting [`CheckRunner`]s
//! by scope. A [`Pipeline`] drives them through their lifecycle under a
//! strategy chosen from the scan scope and pushes findings into a results
//! channel consumed by a single reader.

mod check;
mod error;
mod git;
mod plug;
mod results;
mod runner;
mod scheduler;

pub use check::{Check, CheckResult};
pub use error::{CheckError, PipelineError};
pub use git::GitPipeline;
pub use plug::{Pipes, plug};
pub use results::{ResultsMessage, ResultsReceiver, ResultsSender, results_channel};
pub use runner::{CheckRunner, Phase};
pub use scheduler::{Pipeline, PipelineOptions, Strategy};
