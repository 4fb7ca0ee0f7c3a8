//! Reading fragment files and folding them into one merge run.

use std::io::BufReader;
use std::path::{Path, PathBuf};

use ipc_schema_core::{
    ClientDocument, Context, EmitOptions, Revision, SchemaSnapshot, ServerDocument,
    emit_idl, ingest_client_document, ingest_server_document, render_dump,
};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::config::RunConfig;
use crate::error::{LoaderError, Result};

/// Reads a server fragment.
///
/// # Errors
///
/// Returns [`LoaderError::Io`] or [`LoaderError::Json`].
pub fn load_server_fragment(path: impl AsRef<Path>) -> Result<ServerDocument> {
    read_json(path.as_ref())
}

/// Reads a client fragment.
///
/// # Errors
///
/// Returns [`LoaderError::Io`] or [`LoaderError::Json`].
pub fn load_client_fragment(path: impl AsRef<Path>) -> Result<ClientDocument> {
    read_json(path.as_ref())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

/// The outcome of a successful merge run.
#[derive(Debug)]
pub struct MergeRun {
    pub context: Context,
    /// Revisions whose type sizes decorate `type` blocks.
    pub type_scope: Vec<Revision>,
    /// Number of fragment files ingested.
    pub fragments: usize,
}

impl MergeRun {
    pub fn emit_options(&self) -> EmitOptions {
        EmitOptions {
            type_scope: Some(self.type_scope.clone()),
        }
    }

    /// Renders the merged interface definitions.
    ///
    /// # Errors
    ///
    /// Propagates rendering failures from the engine.
    pub fn to_idl(&self) -> Result<String> {
        Ok(emit_idl(&self.context, &self.emit_options())?)
    }

    pub fn to_dump(&self) -> String {
        render_dump(&self.context)
    }

    /// Captures a serializable snapshot stamped with `generated_at`.
    ///
    /// # Errors
    ///
    /// Propagates rendering failures from the engine.
    pub fn snapshot(&self, generated_at: impl Into<String>) -> Result<SchemaSnapshot> {
        Ok(SchemaSnapshot::from_context(&self.context, generated_at)?)
    }
}

/// Loads the configuration at `path` and runs the merge it describes.
///
/// # Errors
///
/// Fails on invalid configuration and on the first fragment that cannot be
/// read or merged. Fragment failures carry the fragment's path.
pub fn run_merge_file(path: impl AsRef<Path>) -> Result<MergeRun> {
    let path = path.as_ref();
    let config = RunConfig::load(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    run_merge(&config, base_dir)
}

/// Runs the merge described by `config`, resolving fragment paths against
/// `base_dir`.
///
/// Revisions are processed in order; within a revision the server fragment
/// comes before the client fragment.
///
/// # Errors
///
/// Fails on invalid configuration and on the first fragment that cannot be
/// read or merged.
pub fn run_merge(config: &RunConfig, base_dir: &Path) -> Result<MergeRun> {
    config.validate()?;
    let mut context = Context::new();
    let mut fragments = 0;

    for entry in &config.revisions {
        let revision = &entry.revision;
        debug!(%revision, "Merging revision");

        if let Some(server) = &entry.server {
            let path = base_dir.join(server);
            with_path(&path, || {
                let doc = load_server_fragment(&path)?;
                ingest_server_document(&mut context, revision, &doc, &config.skip_interfaces)?;
                Ok(())
            })?;
            fragments += 1;
        }

        if let Some(client) = &entry.client {
            let path = base_dir.join(&client.path);
            with_path(&path, || {
                let doc = load_client_fragment(&path)?;
                ingest_client_document(
                    &mut context,
                    revision,
                    &client.label,
                    &doc,
                    &config.skip_interfaces,
                )?;
                Ok(())
            })?;
            fragments += 1;
        }
    }

    info!(
        fragments,
        interfaces = context.interfaces().count(),
        "Merge complete"
    );
    Ok(MergeRun {
        context,
        type_scope: config.type_scope(),
        fragments,
    })
}

fn with_path<T>(path: &Path, f: impl FnOnce() -> Result<T>) -> Result<T> {
    f().map_err(|source| LoaderError::Fragment {
        path: PathBuf::from(path),
        source: Box::new(source),
    })
}
