use std::{error::Error, path::Path, str};

use test_utils::{run_sly, stage_demo};

#[test]
fn fmt_output_is_reparse_stable() -> Result<(), Box<dyn Error>> {
    let output = run_sly(&["fmt", "./demos/fib.sly", "--stdout"])?;
    assert_eq!(output.status.code(), Some(0));
    let formatted = str::from_utf8(&output.stdout)?.to_owned();
    assert!(formatted.contains("function f(n) {"), "{formatted}");

    // formatting the formatted output changes nothing
    let (_dir, staged) = stage_demo(Path::new("./demos/fib.sly"))?;
    std::fs::write(&staged, &formatted)?;
    let again = run_sly(&["fmt", &staged.to_string_lossy(), "--stdout"])?;
    assert_eq!(str::from_utf8(&again.stdout)?, formatted);
    Ok(())
}

#[test]
fn fmt_rejects_broken_source() -> Result<(), Box<dyn Error>> {
    let (_dir, staged) = stage_demo(Path::new("./demos/fib.sly"))?;
    std::fs::write(&staged, "function broken( {")?;
    let output = run_sly(&["fmt", &staged.to_string_lossy()])?;
    assert_eq!(output.status.code(), Some(2));
    Ok(())
}
