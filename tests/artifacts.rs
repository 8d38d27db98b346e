use std::{error::Error, path::Path, str};

use test_utils::{run_sly, stage_demo};

#[test]
fn compile_writes_module_and_source_map() -> Result<(), Box<dyn Error>> {
    let (dir, staged) = stage_demo(Path::new("./demos/fib.sly"))?;
    let output = run_sly(&["compile", &staged.to_string_lossy()])?;
    assert_eq!(
        output.status.code(),
        Some(0),
        "{}",
        str::from_utf8(&output.stderr)?
    );

    let code = std::fs::read_to_string(dir.path().join("fib.py"))?;
    assert!(code.contains("def f(n):"), "{code}");

    let map: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("fib.sly.map"))?)?;
    assert_eq!(map["version"], 1);
    assert!(map["sources"][0].as_str().unwrap().ends_with("fib.sly"));
    assert!(!map["mappings"].as_array().unwrap().is_empty());

    // the recursive returns of fib appear in the debug metadata
    let ranges = map["debugInfo"]["functionRanges"].as_array().unwrap();
    assert_eq!(ranges[0]["name"], "f");
    let mapped_return = map["mappings"]
        .as_array()
        .unwrap()
        .iter()
        .any(|mapping| mapping[5] == "return");
    assert!(mapped_return);
    Ok(())
}

#[test]
fn recompile_is_byte_identical() -> Result<(), Box<dyn Error>> {
    let (dir, staged) = stage_demo(Path::new("./demos/fib.sly"))?;
    let staged = staged.to_string_lossy().into_owned();

    run_sly(&["compile", &staged])?;
    let first_code = std::fs::read(dir.path().join("fib.py"))?;
    let first_map = std::fs::read(dir.path().join("fib.sly.map"))?;

    run_sly(&["compile", &staged, "--force"])?;
    let second_code = std::fs::read(dir.path().join("fib.py"))?;
    let second_map = std::fs::read(dir.path().join("fib.sly.map"))?;

    assert_eq!(first_code, second_code);
    assert_eq!(first_map, second_map);
    Ok(())
}

#[test]
fn fresh_artifacts_are_not_rewritten() -> Result<(), Box<dyn Error>> {
    let (_dir, staged) = stage_demo(Path::new("./demos/arithmetic.sly"))?;
    let staged = staged.to_string_lossy().into_owned();

    let output = run_sly(&["compile", &staged])?;
    assert!(str::from_utf8(&output.stdout)?.contains("compiled"));

    let output = run_sly(&["compile", &staged])?;
    assert!(str::from_utf8(&output.stdout)?.contains("up to date"));
    Ok(())
}
