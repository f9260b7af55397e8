//! Contract artifacts in, deployment artifacts out
//!
//! Input: compiled contracts (`abi` + creation `bytecode`) looked up by name.
//! Output, under the configured directory:
//! - `contract-addresses.json`: unit name to address, in deployment order
//! - `interfaces/<Unit>.json`: one interface document per component
//! - `interfaces.json`: every interface document, keyed by unit name
//! - `verification-report.json`: outcome of the last verification run
//!
//! Every output file is written to a temporary file in the same directory
//! and renamed into place, so readers never observe a partial document.

use crate::abi::{AbiItem, InterfaceDescriptor, InterfaceSet};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::plan::is_valid_unit_name;
use crate::registry::AddressRegistry;
use crate::types::{Address, HexBytes, TxHash};
use crate::verify::VerificationReport;
use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

pub const ADDRESSES_FILE: &str = "contract-addresses.json";
pub const INTERFACES_DIR: &str = "interfaces";
pub const INTERFACES_FILE: &str = "interfaces.json";
pub const REPORT_FILE: &str = "verification-report.json";

// ==================== Compiled contracts ====================

/// Compiled contract as produced by the Solidity toolchain
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractArtifact {
    pub contract_name: String,
    pub abi: Vec<AbiItem>,
    #[serde(default)]
    pub bytecode: HexBytes,
}

impl ContractArtifact {
    pub fn interface(&self) -> InterfaceDescriptor {
        InterfaceDescriptor::new(&self.contract_name, self.abi.clone())
    }
}

/// Where compiled contracts come from
pub trait ArtifactSource: Send + Sync {
    fn load(&self, contract: &str) -> OrchestratorResult<ContractArtifact>;
}

/// Hardhat-style artifact tree: `<root>/**/<Name>.sol/<Name>.json`
pub struct HardhatArtifacts {
    root: PathBuf,
}

impl HardhatArtifacts {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn find(&self, contract: &str) -> OrchestratorResult<PathBuf> {
        let wanted = format!("{}.json", contract);
        let matches: Vec<PathBuf> = WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.file_name().to_string_lossy() == wanted)
            .map(|e| e.into_path())
            .collect();

        match matches.as_slice() {
            [] => Err(OrchestratorError::Artifact(format!(
                "no compiled artifact for {} under {}",
                contract,
                self.root.display()
            ))),
            [only] => Ok(only.clone()),
            many => Err(OrchestratorError::Artifact(format!(
                "{} artifacts named {} under {}; set `contract` to disambiguate",
                many.len(),
                contract,
                self.root.display()
            ))),
        }
    }
}

impl ArtifactSource for HardhatArtifacts {
    fn load(&self, contract: &str) -> OrchestratorResult<ContractArtifact> {
        let path = self.find(contract)?;
        debug!(contract, path = %path.display(), "loading contract artifact");
        let contents = fs::read_to_string(&path).map_err(|e| {
            OrchestratorError::Artifact(format!("failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            OrchestratorError::Artifact(format!("malformed artifact {}: {}", path.display(), e))
        })
    }
}

/// Artifacts held in memory
#[derive(Default)]
pub struct StaticArtifacts {
    artifacts: HashMap<String, ContractArtifact>,
}

impl StaticArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, artifact: ContractArtifact) {
        self.artifacts
            .insert(artifact.contract_name.clone(), artifact);
    }

    pub fn with(mut self, artifact: ContractArtifact) -> Self {
        self.insert(artifact);
        self
    }
}

impl ArtifactSource for StaticArtifacts {
    fn load(&self, contract: &str) -> OrchestratorResult<ContractArtifact> {
        self.artifacts
            .get(contract)
            .cloned()
            .ok_or_else(|| OrchestratorError::Artifact(format!("no artifact for {}", contract)))
    }
}

// ==================== Deployment outputs ====================

/// Published interface of one deployed component
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentInterfaceDocument {
    pub contract_name: String,
    pub address: Address,
    pub chain_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<TxHash>,
    pub abi: Vec<AbiItem>,
}

impl ComponentInterfaceDocument {
    pub fn descriptor(&self) -> InterfaceDescriptor {
        InterfaceDescriptor::new(&self.contract_name, self.abi.clone())
    }
}

/// Writes deployment outputs atomically under one directory
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    output_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn addresses_path(&self) -> PathBuf {
        self.output_dir.join(ADDRESSES_FILE)
    }

    pub fn interfaces_path(&self) -> PathBuf {
        self.output_dir.join(INTERFACES_FILE)
    }

    pub fn interface_path(&self, unit: &str) -> PathBuf {
        self.output_dir
            .join(INTERFACES_DIR)
            .join(format!("{}.json", unit))
    }

    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join(REPORT_FILE)
    }

    /// Write `path` through a temporary sibling file renamed into place.
    /// On any error the previous content of `path` is left untouched.
    pub fn write_atomic_with<F>(&self, path: &Path, write: F) -> OrchestratorResult<()>
    where
        F: FnOnce(&mut dyn Write) -> io::Result<()>,
    {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|e| {
            OrchestratorError::Artifact(format!("failed to create {}: {}", parent.display(), e))
        })?;

        let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|e| {
            OrchestratorError::Artifact(format!("failed to create temp file in {}: {}", parent.display(), e))
        })?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            write(&mut writer)
                .and_then(|_| writer.flush())
                .map_err(|e| {
                    OrchestratorError::Artifact(format!("failed to write {}: {}", path.display(), e))
                })?;
        }
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| {
            OrchestratorError::Artifact(format!("failed to finalize {}: {}", path.display(), e.error))
        })?;
        Ok(())
    }

    pub fn write_json_atomic<T: Serialize>(&self, path: &Path, value: &T) -> OrchestratorResult<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_atomic_with(path, |w| {
            w.write_all(&bytes)?;
            w.write_all(b"\n")
        })
    }

    pub fn write_addresses(&self, registry: &AddressRegistry) -> OrchestratorResult<PathBuf> {
        let path = self.addresses_path();
        self.write_json_atomic(&path, &registry.to_map())?;
        info!(path = %path.display(), count = registry.len(), "Contract addresses written");
        Ok(path)
    }

    /// One document per component plus the combined `interfaces.json`
    pub fn write_interfaces(
        &self,
        documents: &IndexMap<String, ComponentInterfaceDocument>,
    ) -> OrchestratorResult<()> {
        if let Some(unit) = documents.keys().find(|unit| !is_valid_unit_name(unit)) {
            return Err(OrchestratorError::Artifact(format!(
                "unit name '{}' cannot be used as a file name",
                unit
            )));
        }
        for (unit, document) in documents {
            self.write_json_atomic(&self.interface_path(unit), document)?;
        }
        self.write_json_atomic(&self.interfaces_path(), documents)?;
        info!(
            path = %self.interfaces_path().display(),
            count = documents.len(),
            "Interface documents written"
        );
        Ok(())
    }

    pub fn write_report(&self, report: &VerificationReport) -> OrchestratorResult<PathBuf> {
        let path = self.report_path();
        self.write_json_atomic(&path, report)?;
        info!(path = %path.display(), "Verification report written");
        Ok(path)
    }

    /// Persist an in-progress report after a step
    pub fn checkpoint_report(&self, report: &VerificationReport) -> OrchestratorResult<()> {
        let path = self.report_path();
        self.write_json_atomic(&path, report)?;
        debug!(path = %path.display(), steps = report.results.len(), "Verification progress saved");
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> OrchestratorResult<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)?;
        serde_json::from_str(&contents).map(Some).map_err(|e| {
            OrchestratorError::Artifact(format!("malformed {}: {}", path.display(), e))
        })
    }

    /// Registry recorded by the last successful deployment
    pub fn load_addresses(&self) -> OrchestratorResult<AddressRegistry> {
        let path = self.addresses_path();
        let entries: IndexMap<String, Address> = self.read_json(&path)?.ok_or_else(|| {
            OrchestratorError::Artifact(format!(
                "{} not found; run deploy first",
                path.display()
            ))
        })?;
        AddressRegistry::from_entries(entries)
    }

    pub fn load_interface_documents(
        &self,
    ) -> OrchestratorResult<IndexMap<String, ComponentInterfaceDocument>> {
        let path = self.interfaces_path();
        self.read_json(&path)?.ok_or_else(|| {
            OrchestratorError::Artifact(format!(
                "{} not found; run deploy first",
                path.display()
            ))
        })
    }

    pub fn load_interfaces(&self) -> OrchestratorResult<InterfaceSet> {
        Ok(self
            .load_interface_documents()?
            .into_iter()
            .map(|(unit, doc)| (unit, doc.descriptor()))
            .collect())
    }

    /// Report of the previous verification run, if any
    pub fn load_report(&self) -> OrchestratorResult<Option<VerificationReport>> {
        self.read_json(&self.report_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::AbiParam;
    use tempfile::tempdir;

    fn address(byte: u8) -> Address {
        Address::from_slice(&[byte; 20]).unwrap()
    }

    #[test]
    fn test_failed_write_leaves_previous_file_intact() {
        let dir = tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path());
        let path = writer.addresses_path();
        fs::write(&path, "{\"Old\": \"kept\"}").unwrap();

        let result = writer.write_atomic_with(&path, |w| {
            w.write_all(b"{\"Partial\":")?;
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        });

        assert_eq!(result.unwrap_err().kind(), "ArtifactError");
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"Old\": \"kept\"}");
        // No temporary debris left next to the target
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_addresses_round_trip_in_deployment_order() {
        let dir = tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path().join("out"));
        let mut registry = AddressRegistry::new();
        registry.set("Zeta", address(1)).unwrap();
        registry.set("Alpha", address(2)).unwrap();

        writer.write_addresses(&registry).unwrap();
        let loaded = writer.load_addresses().unwrap();
        let names: Vec<&str> = loaded.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["Zeta", "Alpha"]);
        assert_eq!(loaded.get("Alpha").unwrap(), address(2));
    }

    #[test]
    fn test_missing_addresses_is_artifact_error() {
        let dir = tempdir().unwrap();
        let err = ArtifactWriter::new(dir.path()).load_addresses().unwrap_err();
        assert_eq!(err.kind(), "ArtifactError");
        assert!(err.to_string().contains("run deploy first"));
    }

    #[test]
    fn test_interfaces_written_per_component_and_combined() {
        let dir = tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path());
        let mut documents = IndexMap::new();
        documents.insert(
            "MockToken".to_string(),
            ComponentInterfaceDocument {
                contract_name: "MockToken".to_string(),
                address: address(3),
                chain_id: 57054,
                transaction_hash: None,
                abi: vec![AbiItem::function(
                    "approve",
                    vec![AbiParam::new("spender", "address"), AbiParam::new("amount", "uint256")],
                    vec![AbiParam::new("", "bool")],
                )],
            },
        );

        writer.write_interfaces(&documents).unwrap();
        assert!(writer.interface_path("MockToken").exists());

        let interfaces = writer.load_interfaces().unwrap();
        let token = interfaces.get("MockToken").unwrap();
        assert!(token.function("approve", 2).is_ok());
    }

    #[test]
    fn test_hardhat_artifacts_lookup() {
        let dir = tempdir().unwrap();
        let contract_dir = dir.path().join("contracts").join("BerryManager.sol");
        fs::create_dir_all(&contract_dir).unwrap();
        fs::write(
            contract_dir.join("BerryManager.json"),
            r#"{
                "_format": "hh-sol-artifact-1",
                "contractName": "BerryManager",
                "sourceName": "contracts/BerryManager.sol",
                "abi": [{"type": "constructor", "inputs": [{"name": "agent", "type": "address"}]}],
                "bytecode": "0x6080",
                "deployedBytecode": "0x6080"
            }"#,
        )
        .unwrap();
        fs::write(contract_dir.join("BerryManager.dbg.json"), "{}").unwrap();

        let source = HardhatArtifacts::new(dir.path());
        let artifact = source.load("BerryManager").unwrap();
        assert_eq!(artifact.bytecode.0, vec![0x60, 0x80]);
        assert_eq!(artifact.interface().constructor_inputs().len(), 1);

        assert_eq!(source.load("Missing").unwrap_err().kind(), "ArtifactError");
    }

    #[test]
    fn test_unsafe_unit_name_not_written() {
        let dir = tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path().join("out"));
        let mut documents = IndexMap::new();
        documents.insert(
            "../escape".to_string(),
            ComponentInterfaceDocument {
                contract_name: "MockToken".to_string(),
                address: address(4),
                chain_id: 57054,
                transaction_hash: None,
                abi: vec![],
            },
        );

        let err = writer.write_interfaces(&documents).unwrap_err();
        assert_eq!(err.kind(), "ArtifactError");
        assert!(!dir.path().join("escape.json").exists());
        assert!(!writer.interfaces_path().exists());
    }
}
