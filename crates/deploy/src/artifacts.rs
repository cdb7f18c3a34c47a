//! Compiled contract artifacts: interface descriptions and creation bytecode.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use alloy_core::{json_abi::JsonAbi, primitives::Bytes};
use serde::{Deserialize, Serialize};

use crate::contracts::ContractName;

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("{0} artifact not found. Run: npx hardhat compile")]
    NotFound(ContractName),

    #[error("Artifacts directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),

    #[error("Failed to parse {name} artifact: {reason}")]
    Malformed { name: ContractName, reason: String },

    #[error("{0} artifact has no creation bytecode (abstract contract or interface?)")]
    NotDeployable(ContractName),

    #[error("{name} interface does not expose `{entry_point}`")]
    MissingEntryPoint {
        name: ContractName,
        entry_point: &'static str,
    },
}

impl ArtifactError {
    /// The contract the failure is about, if any.
    pub fn contract(&self) -> Option<ContractName> {
        match self {
            ArtifactError::NotFound(name)
            | ArtifactError::NotDeployable(name)
            | ArtifactError::Malformed { name, .. }
            | ArtifactError::MissingEntryPoint { name, .. } => Some(*name),
            ArtifactError::MissingDirectory(_) => None,
        }
    }
}

/// Interface and creation code of one compiled contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub abi: JsonAbi,
    pub bytecode: Bytes,
}

impl Artifact {
    /// Creation code followed by ABI-encoded constructor arguments.
    pub fn init_code(&self, constructor_args: &[u8]) -> Bytes {
        let mut code = Vec::with_capacity(self.bytecode.len() + constructor_args.len());
        code.extend_from_slice(&self.bytecode);
        code.extend_from_slice(constructor_args);
        code.into()
    }

    /// Reject artifacts that cannot be constructed or lack entry points the deployment calls.
    pub fn validate(&self, name: ContractName) -> Result<(), ArtifactError> {
        if self.bytecode.is_empty() {
            return Err(ArtifactError::NotDeployable(name));
        }

        for &entry_point in name.required_entry_points() {
            if self.abi.function(entry_point).is_none() {
                return Err(ArtifactError::MissingEntryPoint {
                    name,
                    entry_point,
                });
            }
        }

        Ok(())
    }
}

/// Supplies compiled artifacts by contract name.
pub trait ArtifactSource: Send + Sync {
    fn artifact(&self, name: ContractName) -> Result<Artifact, ArtifactError>;
}

/// Artifacts held in memory, e.g. embedded in the binary or loaded ahead of time.
#[derive(Debug, Clone, Default)]
pub struct InMemoryArtifacts {
    artifacts: HashMap<ContractName, Artifact>,
}

impl InMemoryArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: ContractName, artifact: Artifact) -> Self {
        self.artifacts.insert(name, artifact);
        self
    }
}

impl ArtifactSource for InMemoryArtifacts {
    fn artifact(&self, name: ContractName) -> Result<Artifact, ArtifactError> {
        self.artifacts
            .get(&name)
            .cloned()
            .ok_or(ArtifactError::NotFound(name))
    }
}

/// Hardhat `artifacts/` output directory.
///
/// Each contract lives somewhere below the root as `<ContractName>.json`, nested under
/// the path of the source file that declared it.
#[derive(Debug, Clone)]
pub struct HardhatArtifacts {
    root: PathBuf,
}

/// The subset of a Hardhat artifact file we read.
#[derive(Deserialize)]
struct HardhatArtifactFile {
    abi: JsonAbi,
    bytecode: Bytes,
}

impl HardhatArtifacts {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Depth-first search for `<name>.json` below `dir`.
    fn find(dir: &Path, file_name: &str) -> Option<PathBuf> {
        let entries = std::fs::read_dir(dir).ok()?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if let Some(found) = Self::find(&path, file_name) {
                    return Some(found);
                }
            } else if path.file_name().is_some_and(|f| f == file_name) {
                return Some(path);
            }
        }

        None
    }
}

impl ArtifactSource for HardhatArtifacts {
    fn artifact(&self, name: ContractName) -> Result<Artifact, ArtifactError> {
        if !self.root.is_dir() {
            return Err(ArtifactError::MissingDirectory(self.root.clone()));
        }

        let file_name = format!("{}.json", name.artifact_name());
        let path = Self::find(&self.root, &file_name).ok_or(ArtifactError::NotFound(name))?;

        let content = std::fs::read_to_string(&path).map_err(|e| ArtifactError::Malformed {
            name,
            reason: e.to_string(),
        })?;
        let file: HardhatArtifactFile =
            serde_json::from_str(&content).map_err(|e| ArtifactError::Malformed {
                name,
                reason: e.to_string(),
            })?;

        tracing::debug!(contract = %name, path = %path.display(), "Loaded artifact");

        Ok(Artifact {
            abi: file.abi,
            bytecode: file.bytecode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    const GATEWAY_ABI: &str = r#"[
        {"type":"function","name":"setPublicDeploymentStatus","inputs":[{"name":"_isEnabled","type":"bool"}],"outputs":[],"stateMutability":"nonpayable"},
        {"type":"function","name":"getPublicDeploymentStatus","inputs":[],"outputs":[{"name":"","type":"bool"}],"stateMutability":"view"},
        {"type":"function","name":"isDeployer","inputs":[{"name":"deployer","type":"address"}],"outputs":[{"name":"","type":"bool"}],"stateMutability":"view"},
        {"type":"function","name":"deployTREXSuite","inputs":[],"outputs":[],"stateMutability":"nonpayable"}
    ]"#;

    fn write_artifact(dir: &Path, name: &str, abi: &str, bytecode: &str) {
        std::fs::create_dir_all(dir).unwrap();
        let content = format!(
            r#"{{"_format":"hh-sol-artifact-1","contractName":"{name}","abi":{abi},"bytecode":"{bytecode}"}}"#
        );
        std::fs::write(dir.join(format!("{name}.json")), content).unwrap();
    }

    #[test]
    fn test_finds_nested_artifact() {
        let temp_dir = TempDir::new("trexup-artifacts").unwrap();
        let nested = temp_dir.path().join("contracts/gateway/TREXGateway.sol");
        write_artifact(&nested, "TREXGateway", GATEWAY_ABI, "0x6080");

        let source = HardhatArtifacts::new(temp_dir.path());
        let artifact = source.artifact(ContractName::TrexGateway).unwrap();

        assert_eq!(artifact.bytecode.as_ref(), &[0x60, 0x80]);
        assert!(artifact.validate(ContractName::TrexGateway).is_ok());
    }

    #[test]
    fn test_missing_artifact_names_contract() {
        let temp_dir = TempDir::new("trexup-artifacts").unwrap();
        let source = HardhatArtifacts::new(temp_dir.path());

        let err = source.artifact(ContractName::IdFactory).unwrap_err();
        assert_eq!(err.contract(), Some(ContractName::IdFactory));
        assert!(err.to_string().contains("IdFactory"));
    }

    #[test]
    fn test_missing_directory() {
        let source = HardhatArtifacts::new("/nonexistent/trexup/artifacts");
        assert!(matches!(
            source.artifact(ContractName::Token),
            Err(ArtifactError::MissingDirectory(_))
        ));
    }

    #[test]
    fn test_corrupted_artifact_is_malformed() {
        let temp_dir = TempDir::new("trexup-artifacts").unwrap();
        std::fs::write(temp_dir.path().join("Token.json"), "{ invalid json }").unwrap();

        let source = HardhatArtifacts::new(temp_dir.path());
        assert!(matches!(
            source.artifact(ContractName::Token),
            Err(ArtifactError::Malformed { name: ContractName::Token, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_empty_bytecode_and_missing_entry_points() {
        let abi: JsonAbi = serde_json::from_str("[]").unwrap();

        let interface = Artifact {
            abi: abi.clone(),
            bytecode: Bytes::new(),
        };
        assert!(matches!(
            interface.validate(ContractName::Token),
            Err(ArtifactError::NotDeployable(ContractName::Token))
        ));

        let gateway = Artifact {
            abi,
            bytecode: Bytes::from_static(&[0x60]),
        };
        assert!(matches!(
            gateway.validate(ContractName::TrexGateway),
            Err(ArtifactError::MissingEntryPoint {
                entry_point: "setPublicDeploymentStatus",
                ..
            })
        ));
    }

    #[test]
    fn test_init_code_appends_constructor_args() {
        let artifact = Artifact {
            abi: JsonAbi::default(),
            bytecode: Bytes::from_static(&[0xaa, 0xbb]),
        };
        assert_eq!(artifact.init_code(&[0x01]).as_ref(), &[0xaa, 0xbb, 0x01]);
    }
}
