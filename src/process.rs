//! Subprocess helpers for subject scripts and external tools.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, error};

/// Environment entries passed explicitly to every child process.
/// Workers never mutate their own environment; subject-specific
/// variables travel through this map instead.
pub type EnvMap = Vec<(String, String)>;

/// Run a subject bash script in `working_dir`. Returns the exit code;
/// a missing script is a configuration failure, not a tool failure.
pub fn run_script(script: &Path, working_dir: &Path, envs: &EnvMap) -> Result<i32> {
    if !script.exists() {
        bail!("script does not exist: {}", script.display());
    }
    let output = Command::new("bash")
        .arg(script)
        .current_dir(working_dir)
        .envs(envs.iter().map(|(k, v)| (k, v)))
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .with_context(|| format!("spawn bash {}", script.display()))?;

    let code = output.status.code().unwrap_or(-1);
    if code == 0 {
        debug!(script = %script.display(), "script succeeded");
    } else {
        error!(
            script = %script.display(),
            code,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "script failed"
        );
    }
    Ok(code)
}

/// Run an arbitrary command, discarding stdout. Returns the exit code.
pub fn run_command(program: &str, args: &[&str], working_dir: &Path, envs: &EnvMap) -> Result<i32> {
    let output = Command::new(program)
        .args(args)
        .current_dir(working_dir)
        .envs(envs.iter().map(|(k, v)| (k, v)))
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .with_context(|| format!("spawn {program}"))?;

    let code = output.status.code().unwrap_or(-1);
    if code != 0 {
        error!(
            command = %format!("{program} {}", args.join(" ")),
            code,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "command failed"
        );
    }
    Ok(code)
}

/// Run a command and capture stdout as lines. Used for tools whose
/// output we parse (gdb backtraces).
pub fn run_capturing(
    program: &str,
    args: &[&str],
    working_dir: &Path,
    envs: &EnvMap,
) -> Result<Vec<String>> {
    let output = Command::new(program)
        .args(args)
        .current_dir(working_dir)
        .envs(envs.iter().map(|(k, v)| (k, v)))
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .with_context(|| format!("spawn {program}"))?;

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_owned)
        .collect())
}

/// Run a test-case script from its own directory under `timeout(1)`.
/// The raw exit code is the outcome signal: 0 pass, 1 fail, anything
/// else (including the timeout sentinel 124) crashed.
pub fn run_test_script(tc_script: &Path, timeout: Duration, envs: &EnvMap) -> Result<i32> {
    let tc_dir = tc_script
        .parent()
        .with_context(|| format!("test script {} has no parent dir", tc_script.display()))?;
    let output = Command::new("timeout")
        .arg(format!("{}s", timeout.as_secs().max(1)))
        .arg("bash")
        .arg(tc_script)
        .current_dir(tc_dir)
        .envs(envs.iter().map(|(k, v)| (k, v)))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .with_context(|| format!("spawn test {}", tc_script.display()))?;
    Ok(output.status.code().unwrap_or(-1))
}
