//! Program registry backed by `Anchor.toml`
//!
//! Maps workspace program names to their deployed ids per cluster and
//! loads each program's IDL from `target/idl/<name>.json` when it exists.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::config::cluster_name;
use crate::error::ClientError;
use crate::idl::Idl;
use crate::instruction::to_snake_case;
use crate::program::Program;
use crate::provider::Provider;
use crate::pubkey::Pubkey;

pub const MANIFEST_FILE: &str = "Anchor.toml";
pub const DEFAULT_CLUSTER: &str = "localnet";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub programs: BTreeMap<String, BTreeMap<String, ProgramEntry>>,
    pub provider: Option<ProviderSection>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ProgramEntry {
    Address(String),
    Detailed { address: String, idl: Option<String> },
}

impl ProgramEntry {
    fn address(&self) -> &str {
        match self {
            Self::Address(address) => address,
            Self::Detailed { address, .. } => address,
        }
    }

    fn idl(&self) -> Option<&str> {
        match self {
            Self::Address(_) => None,
            Self::Detailed { idl, .. } => idl.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSection {
    pub cluster: String,
    pub wallet: String,
}

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    manifest: Manifest,
}

impl Workspace {
    /// Find the nearest `Anchor.toml` at or above `start_dir`
    pub fn discover(start_dir: &Path) -> Result<Self> {
        let mut dir = Some(start_dir);
        while let Some(current) = dir {
            if current.join(MANIFEST_FILE).is_file() {
                return Self::from_dir(current);
            }
            dir = current.parent();
        }

        anyhow::bail!(
            "No {} found in {} or any parent directory",
            MANIFEST_FILE,
            start_dir.display()
        )
    }

    pub fn from_dir(root: &Path) -> Result<Self> {
        let path = root.join(MANIFEST_FILE);
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let manifest: Manifest =
            toml::from_str(&contents).with_context(|| format!("Invalid {}", path.display()))?;

        debug!("Loaded workspace manifest from {}", path.display());

        Ok(Self {
            root: root.to_path_buf(),
            manifest,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Cluster whose `[programs.*]` table is used by default
    ///
    /// The provider cluster when it names (or is the URL of) a cluster with
    /// a `[programs.*]` table, `localnet` otherwise.
    pub fn default_cluster(&self) -> String {
        self.manifest
            .provider
            .as_ref()
            .map(|p| {
                cluster_name(&p.cluster)
                    .map(str::to_string)
                    .unwrap_or_else(|| p.cluster.trim().to_lowercase())
            })
            .filter(|c| self.manifest.programs.contains_key(c))
            .unwrap_or_else(|| DEFAULT_CLUSTER.to_string())
    }

    /// Program names registered for `cluster`
    pub fn program_names(&self, cluster: &str) -> Vec<String> {
        self.manifest
            .programs
            .get(cluster)
            .map(|programs| programs.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn entry(&self, name: &str, cluster: &str) -> Result<(&str, &ProgramEntry)> {
        let wanted = to_snake_case(name);
        self.manifest
            .programs
            .get(cluster)
            .and_then(|programs| {
                programs
                    .iter()
                    .find(|(key, _)| to_snake_case(key) == wanted)
                    .map(|(key, entry)| (key.as_str(), entry))
            })
            .ok_or_else(|| {
                ClientError::UnknownProgram {
                    name: name.to_string(),
                    known: self.program_names(cluster).join(", "),
                }
                .into()
            })
    }

    /// Deployed id of program `name` on `cluster`
    ///
    /// `name` may be snake_case, kebab-case or CamelCase.
    pub fn program_id(&self, name: &str, cluster: Option<&str>) -> Result<Pubkey> {
        let cluster = cluster.map(str::to_lowercase).unwrap_or_else(|| self.default_cluster());
        let (key, entry) = self.entry(name, &cluster)?;

        entry
            .address()
            .parse()
            .with_context(|| format!("Invalid address for program '{}' in [programs.{}]", key, cluster))
    }

    pub fn idl_path(&self, name: &str, cluster: Option<&str>) -> PathBuf {
        let cluster = cluster.map(str::to_lowercase).unwrap_or_else(|| self.default_cluster());
        let configured = self
            .entry(name, &cluster)
            .ok()
            .and_then(|(_, entry)| entry.idl().map(|p| self.root.join(p)));

        configured.unwrap_or_else(|| {
            self.root
                .join("target")
                .join("idl")
                .join(format!("{}.json", to_snake_case(name)))
        })
    }

    /// IDL of program `name`; a missing file is `None`, a malformed one an error
    pub fn load_idl(&self, name: &str, cluster: Option<&str>) -> Result<Option<Idl>> {
        let path = self.idl_path(name, cluster);
        if !path.is_file() {
            debug!("No IDL for '{}' at {}", name, path.display());
            return Ok(None);
        }
        Idl::from_file(&path).map(Some)
    }

    /// Typed handle for program `name` on the default cluster
    pub fn program(&self, name: &str, provider: Arc<Provider>) -> Result<Program> {
        let program_id = self.program_id(name, None)?;
        let idl = self.load_idl(name, None)?;

        if let Some(address) = idl.as_ref().and_then(|idl| idl.address) {
            if address != program_id {
                anyhow::bail!(
                    "IDL address {} of '{}' does not match {} entry {}",
                    address,
                    name,
                    MANIFEST_FILE,
                    program_id
                );
            }
        }

        Ok(Program::new(program_id, idl, provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
[toolchain]

[features]
resolution = true
skip-lint = false

[programs.localnet]
desirium_contract = "CzY7h2jY3Fq8Rw3rSSi8PZksgbtZzn44aQR6EeYm2bMo"

[programs.devnet]
desirium_contract = { address = "11111111111111111111111111111111", idl = "idl/devnet.json" }

[registry]
url = "https://api.apr.dev"

[provider]
cluster = "Localnet"
wallet = "~/.config/solana/id.json"
"#;

    fn workspace_in(dir: &Path) -> Workspace {
        fs::write(dir.join(MANIFEST_FILE), MANIFEST).unwrap();
        Workspace::from_dir(dir).unwrap()
    }

    #[test]
    fn test_program_id_lookup_any_casing() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace_in(dir.path());

        let expected: Pubkey = "CzY7h2jY3Fq8Rw3rSSi8PZksgbtZzn44aQR6EeYm2bMo".parse().unwrap();
        assert_eq!(ws.program_id("DesiriumContract", None).unwrap(), expected);
        assert_eq!(ws.program_id("desirium-contract", None).unwrap(), expected);
        assert_eq!(ws.program_id("desirium_contract", Some("localnet")).unwrap(), expected);
        assert_eq!(
            ws.program_id("desirium_contract", Some("Devnet")).unwrap(),
            Pubkey::default()
        );
    }

    #[test]
    fn test_unknown_program_lists_known_names() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace_in(dir.path());

        let err = ws.program_id("Other", None).unwrap_err();
        match err.downcast_ref::<ClientError>() {
            Some(ClientError::UnknownProgram { name, known }) => {
                assert_eq!(name, "Other");
                assert_eq!(known, "desirium_contract");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_discover_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        workspace_in(dir.path());
        let nested = dir.path().join("client").join("tests");
        fs::create_dir_all(&nested).unwrap();

        let ws = Workspace::discover(&nested).unwrap();
        assert_eq!(ws.root(), dir.path());
        assert_eq!(ws.default_cluster(), "localnet");
        assert_eq!(ws.manifest().provider.as_ref().unwrap().cluster, "Localnet");
    }

    #[test]
    fn test_default_cluster_from_provider_url() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = MANIFEST.replace(
            r#"cluster = "Localnet""#,
            r#"cluster = "https://api.devnet.solana.com/""#,
        );
        fs::write(dir.path().join(MANIFEST_FILE), manifest).unwrap();
        let ws = Workspace::from_dir(dir.path()).unwrap();

        assert_eq!(ws.default_cluster(), "devnet");
        assert_eq!(ws.program_id("desirium_contract", None).unwrap(), Pubkey::default());

        // Unknown URLs fall back to localnet
        let manifest = MANIFEST.replace(
            r#"cluster = "Localnet""#,
            r#"cluster = "http://10.0.0.5:8899""#,
        );
        fs::write(dir.path().join(MANIFEST_FILE), manifest).unwrap();
        let ws = Workspace::from_dir(dir.path()).unwrap();
        assert_eq!(ws.default_cluster(), "localnet");
    }

    #[test]
    fn test_discover_fails_without_manifest() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Workspace::discover(dir.path()).is_err());
    }

    #[test]
    fn test_idl_paths() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace_in(dir.path());

        assert_eq!(
            ws.idl_path("DesiriumContract", None),
            dir.path().join("target/idl/desirium_contract.json")
        );
        assert_eq!(
            ws.idl_path("desirium_contract", Some("devnet")),
            dir.path().join("idl/devnet.json")
        );
    }

    #[test]
    fn test_missing_idl_is_none_malformed_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace_in(dir.path());
        assert!(ws.load_idl("desirium_contract", None).unwrap().is_none());

        let idl_dir = dir.path().join("target").join("idl");
        fs::create_dir_all(&idl_dir).unwrap();
        fs::write(idl_dir.join("desirium_contract.json"), "not json").unwrap();
        assert!(ws.load_idl("desirium_contract", None).is_err());
    }
}
