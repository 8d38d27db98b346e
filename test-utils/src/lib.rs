//! Helpers for driving the built `sly` binary from integration tests.

use std::{
    error::Error,
    path::{Path, PathBuf},
    process::{Command, Output},
    str,
    sync::OnceLock,
};

const SLY_PATH: &str = "./target/debug/sly";

pub struct Expected<'a> {
    pub stdout: &'a str,
    pub stderr: &'a str,
}

impl<'a> Expected<'a> {
    pub fn assert_matches(&self, output: &Output) -> Result<(), Box<dyn Error>> {
        assert_eq!(str::from_utf8(&output.stdout)?, self.stdout);
        assert_eq!(str::from_utf8(&output.stderr)?, self.stderr);
        Ok(())
    }
}

/// Sandbox runs need a host interpreter; skip those tests where none exists.
pub fn python_available() -> bool {
    static AVAILABLE: OnceLock<bool> = OnceLock::new();
    *AVAILABLE.get_or_init(|| {
        Command::new("python3")
            .arg("--version")
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    })
}

pub fn run_sly(args: &[&str]) -> Result<Output, Box<dyn Error>> {
    Ok(Command::new(SLY_PATH).args(args).output()?)
}

pub fn run_sly_with_env(
    args: &[&str],
    env: &[(&str, &str)],
) -> Result<Output, Box<dyn Error>> {
    let mut command = Command::new(SLY_PATH);
    command.args(args);
    for (key, value) in env {
        command.env(key, value);
    }
    Ok(command.output()?)
}

/// Run a demo program in the sandbox and compare its captured output.
pub fn check_run(src_path: &Path, expected: Expected) -> Result<(), Box<dyn Error>> {
    let output = run_sly(&["run", &src_path.to_string_lossy()])?;
    let stderr = str::from_utf8(&output.stderr)?;
    assert!(
        output.status.success(),
        "sly run '{}' exited with {:?}: {stderr}",
        src_path.display(),
        output.status.code()
    );
    expected.assert_matches(&output)
}

/// Copy a demo into a scratch directory so compiled artifacts land there.
pub fn stage_demo(src_path: &Path) -> Result<(tempfile::TempDir, PathBuf), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let file_name = src_path
        .file_name()
        .ok_or("demo path has no file name")?
        .to_owned();
    let staged = dir.path().join(file_name);
    std::fs::copy(src_path, &staged)?;
    Ok((dir, staged))
}
