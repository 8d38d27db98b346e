use std::{error::Error, str, time::Instant};

use test_utils::{python_available, run_sly_with_env};

#[test]
fn wall_timeout_terminates_the_child() -> Result<(), Box<dyn Error>> {
    if !python_available() {
        return Ok(());
    }

    let started = Instant::now();
    let output = run_sly_with_env(
        &["run", "./demos/spin.sly", "--json"],
        &[("SANDBOX_TIMEOUT_MS", "600")],
    )?;
    assert_eq!(output.status.code(), Some(3));
    // terminated shortly after the limit, not at the default timeout
    assert!(started.elapsed().as_secs() < 8);

    let stdout = str::from_utf8(&output.stdout)?;
    let result: serde_json::Value = serde_json::from_str(stdout)?;
    assert_eq!(result["status"], "timeout");
    assert!(result["usage"]["wall_ms"].as_u64().unwrap() >= 600);
    Ok(())
}

#[test]
fn run_result_reports_usage() -> Result<(), Box<dyn Error>> {
    if !python_available() {
        return Ok(());
    }

    let output = run_sly_with_env(&["run", "./demos/arithmetic.sly", "--json"], &[])?;
    assert_eq!(output.status.code(), Some(0));

    let stdout = str::from_utf8(&output.stdout)?;
    let result: serde_json::Value = serde_json::from_str(stdout)?;
    assert_eq!(result["status"], "ok");
    assert_eq!(result["stdout"], "7\n");
    assert_eq!(result["globals"]["x"], 7);
    assert!(result["usage"]["wall_ms"].as_u64().is_some());
    Ok(())
}
