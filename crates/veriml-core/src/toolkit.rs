//! Proving toolkit seam.
//!
//! Every operation takes input paths and writes output paths; the pipeline
//! never looks inside circuit, key or SRS files. `EzklCli` drives the `ezkl`
//! binary, one process per operation.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ToolkitError {
    #[error("cannot start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {}: {stderr}", .code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ToolkitError>;

/// Visibility policy baked into generated settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visibility {
    pub input: &'static str,
    pub output: &'static str,
    pub param: &'static str,
}

impl Default for Visibility {
    /// Private inputs, public outputs, fixed parameters.
    fn default() -> Self {
        Self {
            input: "private",
            output: "public",
            param: "fixed",
        }
    }
}

/// Calibration search bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationTarget {
    pub target: &'static str,
    pub max_logrows: u32,
    pub scales: Vec<u32>,
}

impl Default for CalibrationTarget {
    fn default() -> Self {
        Self {
            target: "resources",
            max_logrows: 15,
            scales: vec![2],
        }
    }
}

#[async_trait]
pub trait ProvingToolkit: Send + Sync {
    async fn gen_settings(&self, model: &Path, settings: &Path, visibility: &Visibility)
        -> Result<()>;

    async fn calibrate_settings(
        &self,
        data: &Path,
        model: &Path,
        settings: &Path,
        target: &CalibrationTarget,
    ) -> Result<()>;

    async fn compile_circuit(&self, model: &Path, compiled: &Path, settings: &Path) -> Result<()>;

    /// May block on network I/O.
    async fn get_srs(&self, settings: &Path, srs: &Path) -> Result<()>;

    async fn gen_witness(&self, input: &Path, compiled: &Path, witness: &Path) -> Result<()>;

    async fn setup(&self, compiled: &Path, srs: &Path, vk: &Path, pk: &Path) -> Result<()>;

    async fn prove(
        &self,
        witness: &Path,
        compiled: &Path,
        pk: &Path,
        srs: &Path,
        proof: &Path,
    ) -> Result<()>;

    /// `Ok(false)` means the toolkit ran and rejected the proof.
    async fn verify(&self, proof: &Path, settings: &Path, vk: &Path, srs: &Path) -> Result<bool>;

    /// May block on network I/O.
    async fn create_evm_verifier(
        &self,
        vk: &Path,
        srs: &Path,
        settings: &Path,
        sol: &Path,
        abi: &Path,
    ) -> Result<()>;
}

/// `ezkl` command-line driver.
#[derive(Debug, Clone)]
pub struct EzklCli {
    binary: PathBuf,
}

impl EzklCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run one subcommand; stdout on success, `Failed` with stderr otherwise.
    async fn run(&self, subcommand: &str, args: Vec<OsString>) -> Result<String> {
        let command = format!("{} {subcommand}", self.binary.display());
        let start = Instant::now();

        let child = Command::new(&self.binary)
            .arg(subcommand)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ToolkitError::Spawn {
                command: command.clone(),
                source,
            })?;
        let output = child.wait_with_output().await?;

        debug!(
            command = %command,
            duration_ms = start.elapsed().as_millis() as u64,
            code = ?output.status.code(),
            "toolkit command finished"
        );
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ToolkitError::Failed {
                command,
                code: output.status.code(),
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

fn args<const N: usize>(pairs: [(&str, &Path); N]) -> Vec<OsString> {
    pairs
        .into_iter()
        .flat_map(|(flag, path)| [OsString::from(flag), path.as_os_str().to_owned()])
        .collect()
}

#[async_trait]
impl ProvingToolkit for EzklCli {
    async fn gen_settings(
        &self,
        model: &Path,
        settings: &Path,
        visibility: &Visibility,
    ) -> Result<()> {
        let mut argv = args([("-M", model), ("-O", settings)]);
        for (flag, value) in [
            ("--input-visibility", visibility.input),
            ("--output-visibility", visibility.output),
            ("--param-visibility", visibility.param),
        ] {
            argv.push(flag.into());
            argv.push(value.into());
        }
        self.run("gen-settings", argv).await.map(drop)
    }

    async fn calibrate_settings(
        &self,
        data: &Path,
        model: &Path,
        settings: &Path,
        target: &CalibrationTarget,
    ) -> Result<()> {
        let mut argv = args([("-D", data), ("-M", model), ("-O", settings)]);
        argv.push("--target".into());
        argv.push(target.target.into());
        argv.push("--max-logrows".into());
        argv.push(target.max_logrows.to_string().into());
        let scales = target
            .scales
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        argv.push("--scales".into());
        argv.push(scales.into());
        self.run("calibrate-settings", argv).await.map(drop)
    }

    async fn compile_circuit(&self, model: &Path, compiled: &Path, settings: &Path) -> Result<()> {
        let argv = args([
            ("-M", model),
            ("--compiled-circuit", compiled),
            ("-S", settings),
        ]);
        self.run("compile-circuit", argv).await.map(drop)
    }

    async fn get_srs(&self, settings: &Path, srs: &Path) -> Result<()> {
        let argv = args([("-S", settings), ("--srs-path", srs)]);
        self.run("get-srs", argv).await.map(drop)
    }

    async fn gen_witness(&self, input: &Path, compiled: &Path, witness: &Path) -> Result<()> {
        let argv = args([("-D", input), ("-M", compiled), ("-O", witness)]);
        self.run("gen-witness", argv).await.map(drop)
    }

    async fn setup(&self, compiled: &Path, srs: &Path, vk: &Path, pk: &Path) -> Result<()> {
        let argv = args([
            ("-M", compiled),
            ("--srs-path", srs),
            ("--vk-path", vk),
            ("--pk-path", pk),
        ]);
        self.run("setup", argv).await.map(drop)
    }

    async fn prove(
        &self,
        witness: &Path,
        compiled: &Path,
        pk: &Path,
        srs: &Path,
        proof: &Path,
    ) -> Result<()> {
        let argv = args([
            ("-W", witness),
            ("-M", compiled),
            ("--pk-path", pk),
            ("--srs-path", srs),
            ("--proof-path", proof),
        ]);
        self.run("prove", argv).await.map(drop)
    }

    async fn verify(&self, proof: &Path, settings: &Path, vk: &Path, srs: &Path) -> Result<bool> {
        let argv = args([
            ("--proof-path", proof),
            ("--settings-path", settings),
            ("--vk-path", vk),
            ("--srs-path", srs),
        ]);
        let stdout = self.run("verify", argv).await?;
        Ok(!stdout.contains("verified: false"))
    }

    async fn create_evm_verifier(
        &self,
        vk: &Path,
        srs: &Path,
        settings: &Path,
        sol: &Path,
        abi: &Path,
    ) -> Result<()> {
        let argv = args([
            ("--vk-path", vk),
            ("--srs-path", srs),
            ("--settings-path", settings),
            ("--sol-code-path", sol),
            ("--abi-path", abi),
        ]);
        self.run("create-evm-verifier", argv).await.map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policies() {
        let v = Visibility::default();
        assert_eq!((v.input, v.output, v.param), ("private", "public", "fixed"));
        let c = CalibrationTarget::default();
        assert_eq!(c.target, "resources");
        assert_eq!(c.max_logrows, 15);
        assert_eq!(c.scales, vec![2]);
    }

    #[test]
    fn flag_pairs_keep_order() {
        let argv = args([("-M", Path::new("a.onnx")), ("-O", Path::new("s.json"))]);
        assert_eq!(argv, vec!["-M", "a.onnx", "-O", "s.json"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn echo_stands_in_for_a_successful_toolkit() {
        let cli = EzklCli::new("echo");
        let ok = cli
            .verify(
                Path::new("p.pf"),
                Path::new("s.json"),
                Path::new("k.vk"),
                Path::new("kzg.srs"),
            )
            .await
            .unwrap();
        assert!(ok);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_a_failure() {
        let err = EzklCli::new("false")
            .get_srs(Path::new("s.json"), Path::new("kzg.srs"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolkitError::Failed { code: Some(1), .. }));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let err = EzklCli::new("/nonexistent/ezkl")
            .get_srs(Path::new("s.json"), Path::new("kzg.srs"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolkitError::Spawn { .. }));
    }
}
