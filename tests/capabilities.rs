use std::{error::Error, str};

use test_utils::{python_available, run_sly};

#[test]
fn regex_without_capability_fails_at_runtime() -> Result<(), Box<dyn Error>> {
    if !python_available() {
        return Ok(());
    }
    // static analysis is clean, but running still demands `regex.match`
    let output = run_sly(&["run", "./demos/regex.sly"])?;
    assert_eq!(output.status.code(), Some(3));

    let stderr = str::from_utf8(&output.stderr)?;
    assert!(stderr.contains("CapabilityError"), "{stderr}");
    assert!(stderr.contains("regex.match"), "{stderr}");
    Ok(())
}

#[test]
fn declared_capability_block_grants_access() -> Result<(), Box<dyn Error>> {
    if !python_available() {
        return Ok(());
    }
    let output = run_sly(&["run", "./demos/regex_cap.sly"])?;
    let stderr = str::from_utf8(&output.stderr)?;
    assert_eq!(output.status.code(), Some(0), "{stderr}");
    assert_eq!(str::from_utf8(&output.stdout)?, "123\n");
    Ok(())
}

#[test]
fn granted_token_also_works() -> Result<(), Box<dyn Error>> {
    if !python_available() {
        return Ok(());
    }
    let output = run_sly(&["run", "./demos/regex.sly", "--grant", "regex.match"])?;
    let stderr = str::from_utf8(&output.stderr)?;
    assert_eq!(output.status.code(), Some(0), "{stderr}");
    assert_eq!(str::from_utf8(&output.stdout)?, "123\n");
    Ok(())
}

#[test]
fn introspection_api_reports_declared_capabilities() -> Result<(), Box<dyn Error>> {
    if !python_available() {
        return Ok(());
    }
    let output = run_sly(&["run", "./demos/introspection.sly"])?;
    let stderr = str::from_utf8(&output.stderr)?;
    assert_eq!(output.status.code(), Some(0), "{stderr}");
    assert_eq!(
        str::from_utf8(&output.stdout)?,
        "true\nfalse\n[\"fs.read\"]\ntrue\n"
    );
    Ok(())
}
