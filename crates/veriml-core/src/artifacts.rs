//! Per-task artifact layout on durable storage.
//!
//! Every path is a pure function of the artifacts root and the task ID, so
//! paths can be re-derived at any time (status queries, artifact fetches)
//! without lookup state.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest accepted task identifier.
pub const MAX_TASK_ID_LEN: usize = 128;

/// Prefix of files staged in a task directory before an atomic rename.
/// They are never served and are swept by `purge`.
pub const STAGING_PREFIX: &str = ".staging-";

/// Errors from artifact addressing and retrieval.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("invalid task id {0:?}: use 1-128 characters from [A-Za-z0-9._-]")]
    InvalidTaskId(String),

    #[error("invalid artifact name {0:?}")]
    InvalidArtifactName(String),

    #[error("artifact {name} not found for task {task_id}")]
    NotFound { task_id: String, name: String },

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ArtifactError>;

/// Role of a file within a task directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactRole {
    Model,
    Settings,
    Calibration,
    Compiled,
    Srs,
    Witness,
    Input,
    Pk,
    Vk,
    Proof,
    Status,
    VerifierSol,
    VerifierAbi,
}

impl ArtifactRole {
    pub const ALL: [ArtifactRole; 13] = [
        ArtifactRole::Model,
        ArtifactRole::Settings,
        ArtifactRole::Calibration,
        ArtifactRole::Compiled,
        ArtifactRole::Srs,
        ArtifactRole::Witness,
        ArtifactRole::Input,
        ArtifactRole::Pk,
        ArtifactRole::Vk,
        ArtifactRole::Proof,
        ArtifactRole::Status,
        ArtifactRole::VerifierSol,
        ArtifactRole::VerifierAbi,
    ];

    /// Key used in result maps.
    pub fn key(&self) -> &'static str {
        match self {
            ArtifactRole::Model => "model",
            ArtifactRole::Settings => "settings",
            ArtifactRole::Calibration => "calibration",
            ArtifactRole::Compiled => "compiled",
            ArtifactRole::Srs => "srs",
            ArtifactRole::Witness => "witness",
            ArtifactRole::Input => "input",
            ArtifactRole::Pk => "pk",
            ArtifactRole::Vk => "vk",
            ArtifactRole::Proof => "proof",
            ArtifactRole::Status => "status",
            ArtifactRole::VerifierSol => "verifier_sol",
            ArtifactRole::VerifierAbi => "verifier_abi",
        }
    }

    /// File name inside the task directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactRole::Model => "network.onnx",
            ArtifactRole::Settings => "settings.json",
            ArtifactRole::Calibration => "calibration.json",
            ArtifactRole::Compiled => "network.ezkl",
            ArtifactRole::Srs => "kzg.srs",
            ArtifactRole::Witness => "witness.json",
            ArtifactRole::Input => "input.json",
            ArtifactRole::Pk => "test.pk",
            ArtifactRole::Vk => "test.vk",
            ArtifactRole::Proof => "test.pf",
            ArtifactRole::Status => "status.json",
            ArtifactRole::VerifierSol => "Verifier.sol",
            ArtifactRole::VerifierAbi => "Verifier.abi",
        }
    }
}

impl fmt::Display for ArtifactRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// The fixed set of artifact paths for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    task_id: String,
    base: PathBuf,
}

impl ArtifactSet {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// The task directory.
    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn path(&self, role: ArtifactRole) -> PathBuf {
        self.base.join(role.file_name())
    }

    /// Role key → path, plus `base`.
    pub fn to_map(&self) -> BTreeMap<String, PathBuf> {
        let mut map: BTreeMap<String, PathBuf> = ArtifactRole::ALL
            .iter()
            .map(|role| (role.key().to_string(), self.path(*role)))
            .collect();
        map.insert("base".to_string(), self.base.clone());
        map
    }
}

/// Filesystem root under which every task owns one directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Derive the artifact set for `task_id` without touching the filesystem.
    pub fn layout(&self, task_id: &str) -> Result<ArtifactSet> {
        validate_task_id(task_id)?;
        Ok(ArtifactSet {
            task_id: task_id.to_string(),
            base: self.root.join(task_id),
        })
    }

    /// Derive the artifact set and create the task directory if absent.
    /// Idempotent: existing files are left untouched.
    pub fn resolve(&self, task_id: &str) -> Result<ArtifactSet> {
        let set = self.layout(task_id)?;
        fs::create_dir_all(set.base())?;
        Ok(set)
    }

    /// Remove the files a previous run under the same ID may have left,
    /// except the status record, which the new run overwrites immediately.
    /// Staging files left by an interrupted write go too.
    pub fn purge(&self, set: &ArtifactSet) -> io::Result<()> {
        for role in ArtifactRole::ALL {
            if role == ArtifactRole::Status {
                continue;
            }
            remove_if_present(&set.path(role))?;
        }
        for entry in fs::read_dir(set.base())? {
            let entry = entry?;
            let staged = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(STAGING_PREFIX));
            if staged && entry.file_type()?.is_file() {
                remove_if_present(&entry.path())?;
            }
        }
        Ok(())
    }

    /// Read a file from a task directory. The name must be a plain file name
    /// and the resolved file must stay inside the task directory.
    pub fn fetch(&self, task_id: &str, name: &str) -> Result<Vec<u8>> {
        let set = self.layout(task_id)?;
        validate_artifact_name(name)?;

        let not_found = || ArtifactError::NotFound {
            task_id: task_id.to_string(),
            name: name.to_string(),
        };

        let candidate = set.base().join(name);
        if !candidate.is_file() {
            return Err(not_found());
        }
        let base = set.base().canonicalize()?;
        let resolved = candidate.canonicalize()?;
        if !resolved.starts_with(&base) {
            return Err(ArtifactError::InvalidArtifactName(name.to_string()));
        }
        fs::read(&resolved).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                not_found()
            } else {
                ArtifactError::Io(e)
            }
        })
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// A task ID must be a single safe path component.
pub fn validate_task_id(task_id: &str) -> Result<()> {
    let valid = !task_id.is_empty()
        && task_id.len() <= MAX_TASK_ID_LEN
        && task_id != "."
        && task_id != ".."
        && task_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(ArtifactError::InvalidTaskId(task_id.to_string()))
    }
}

fn validate_artifact_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.starts_with(STAGING_PREFIX)
        || name.contains(['/', '\\', '\0'])
        || Path::new(name).is_absolute();
    if invalid {
        Err(ArtifactError::InvalidArtifactName(name.to_string()))
    } else {
        Ok(())
    }
}
