use std::{error::Error, str};

use test_utils::run_sly;

#[test]
fn analyze_flags_eval_as_critical() -> Result<(), Box<dyn Error>> {
    let output = run_sly(&["analyze", "./demos/eval.sly"])?;
    assert_eq!(output.status.code(), Some(1));

    let stderr = str::from_utf8(&output.stderr)?;
    assert!(stderr.contains("critical"), "{stderr}");
    assert!(stderr.contains("CWE-95"), "{stderr}");
    Ok(())
}

#[test]
fn analyze_json_report_shape() -> Result<(), Box<dyn Error>> {
    let output = run_sly(&["analyze", "./demos/eval.sly", "--json"])?;
    let stdout = str::from_utf8(&output.stdout)?;
    let reports: serde_json::Value = serde_json::from_str(stdout)?;

    let first = &reports[0];
    assert_eq!(first["severity"], "critical");
    assert_eq!(first["cwe"], "CWE-95");
    assert_eq!(first["line"], 1);
    assert!(first["file"].as_str().unwrap().ends_with("eval.sly"));
    Ok(())
}

#[test]
fn strict_mode_blocks_compilation() -> Result<(), Box<dyn Error>> {
    let output = run_sly(&["compile", "./demos/eval.sly"])?;
    assert_eq!(output.status.code(), Some(1));
    Ok(())
}

#[test]
fn regex_compile_is_not_a_dangerous_call() -> Result<(), Box<dyn Error>> {
    let output = run_sly(&["analyze", "./demos/regex.sly"])?;
    assert_eq!(output.status.code(), Some(0));
    Ok(())
}

#[test]
fn check_accepts_clean_program() -> Result<(), Box<dyn Error>> {
    let output = run_sly(&["check", "./demos/fib.sly"])?;
    assert_eq!(output.status.code(), Some(0));
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() -> Result<(), Box<dyn Error>> {
    let output = run_sly(&["check", "./demos/no_such_file.sly"])?;
    assert_eq!(output.status.code(), Some(4));
    Ok(())
}
