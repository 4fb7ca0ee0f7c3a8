//! Run configuration: which fragments make up a merge, in revision order.
//!
//! # Example YAML
//!
//! ```yaml
//! version: "1.0"
//! skip_interfaces:
//!   - nns::hosbinder::IHOSBinderDriver
//! revisions:
//!   - revision: "1.0.0"
//!     type_info: false
//!     server: server/data1.json
//!     client:
//!       path: client/data1.json
//!       label: 0.16.29-from-flog
//!   - revision: "2.0.0"
//!     server: server/data2.json
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use ipc_schema_core::{DEFAULT_SKIPPED_INTERFACE, Revision};
use serde::{Deserialize, Serialize};

use crate::error::{LoaderError, Result};

/// A client fragment and the name of the trace it was captured from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientFragment {
    pub path: PathBuf,
    pub label: String,
}

/// The fragments observed at one revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionConfig {
    pub revision: Revision,
    /// Whether type sizes observed at this revision are trusted when
    /// decorating `type` blocks.
    #[serde(default = "default_type_info")]
    pub type_info: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientFragment>,
}

fn default_type_info() -> bool {
    true
}

fn default_skip_interfaces() -> Vec<String> {
    vec![DEFAULT_SKIPPED_INTERFACE.to_string()]
}

/// Top-level merge run configuration.
///
/// Fragment paths are relative to the directory holding the configuration
/// file.
///
/// # Examples
///
/// ```
/// use ipc_schema_core::Revision;
/// use ipc_schema_loader::RunConfig;
///
/// let config: RunConfig = serde_yaml::from_str(r#"
/// version: "1.0"
/// revisions:
///   - revision: "1.0.0"
///     type_info: false
///     server: server/data1.json
///   - revision: "2.0.0"
///     server: server/data2.json
/// "#).unwrap();
/// config.validate().unwrap();
///
/// assert_eq!(config.skip_interfaces, vec!["nns::hosbinder::IHOSBinderDriver"]);
/// assert_eq!(config.type_scope(), vec!["2.0.0".parse::<Revision>().unwrap()]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Configuration format version (e.g. `"1.0"`).
    pub version: String,
    /// Interfaces ignored in every fragment.
    #[serde(default = "default_skip_interfaces")]
    pub skip_interfaces: Vec<String>,
    /// Revisions in strictly increasing order.
    pub revisions: Vec<RevisionConfig>,
}

impl RunConfig {
    /// Loads and validates configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::Io`] if the file cannot be read,
    /// [`LoaderError::Yaml`] if parsing fails and
    /// [`LoaderError::InvalidConfig`] if validation fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config: Self = serde_yaml::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::Io`] if the file cannot be written, or
    /// [`LoaderError::Yaml`] if serialization fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Checks that the configuration describes a usable run.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::InvalidConfig`] when the version is empty, no
    /// revision is listed, revisions are not strictly increasing, or a
    /// revision names no fragment.
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(LoaderError::InvalidConfig("version must not be empty".into()));
        }
        if self.revisions.is_empty() {
            return Err(LoaderError::InvalidConfig("no revisions listed".into()));
        }
        for pair in self.revisions.windows(2) {
            if pair[0].revision >= pair[1].revision {
                return Err(LoaderError::InvalidConfig(format!(
                    "revision {} must come after {}",
                    pair[1].revision, pair[0].revision
                )));
            }
        }
        if let Some(empty) = self
            .revisions
            .iter()
            .find(|r| r.server.is_none() && r.client.is_none())
        {
            return Err(LoaderError::InvalidConfig(format!(
                "revision {} has no server or client fragment",
                empty.revision
            )));
        }
        Ok(())
    }

    /// Returns `true` if `interface` is ignored.
    pub fn is_skipped(&self, interface: &str) -> bool {
        self.skip_interfaces.iter().any(|s| s == interface)
    }

    /// Revisions whose type sizes decorate `type` blocks.
    pub fn type_scope(&self) -> Vec<Revision> {
        self.revisions
            .iter()
            .filter(|r| r.type_info)
            .map(|r| r.revision.clone())
            .collect()
    }
}
