//! Run configuration and fragment loading for IPC schema merges.
//!
//! A run is described by a YAML [`RunConfig`] listing, per revision, the
//! server and client fragment files to merge. [`run_merge_file`] reads the
//! configuration, feeds every fragment through the engine in revision order
//! and returns a [`MergeRun`] ready to be rendered.
//!
//! # Quick start
//!
//! ```no_run
//! use ipc_schema_loader::run_merge_file;
//!
//! let run = run_merge_file("fragments/run.yml").unwrap();
//! println!("{}", run.to_idl().unwrap());
//! ```

mod config;
mod error;
mod pipeline;

pub use config::{ClientFragment, RevisionConfig, RunConfig};
pub use error::{LoaderError, Result};
pub use pipeline::{
    MergeRun, load_client_fragment, load_server_fragment, run_merge, run_merge_file,
};
