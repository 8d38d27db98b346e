use std::{error::Error, path::Path};

use test_utils::{check_run, python_available, Expected};

#[test]
fn run_arithmetic() -> Result<(), Box<dyn Error>> {
    if !python_available() {
        return Ok(());
    }
    check_run(
        Path::new("./demos/arithmetic.sly"),
        Expected {
            stdout: "7\n",
            stderr: "",
        },
    )
}

#[test]
fn run_fib() -> Result<(), Box<dyn Error>> {
    if !python_available() {
        return Ok(());
    }
    check_run(
        Path::new("./demos/fib.sly"),
        Expected {
            stdout: "55\n",
            stderr: "",
        },
    )
}

#[test]
fn run_try_finally() -> Result<(), Box<dyn Error>> {
    if !python_available() {
        return Ok(());
    }
    // `finally` runs although the `try` block returns, before the caller
    // prints the returned value
    check_run(
        Path::new("./demos/try_finally.sly"),
        Expected {
            stdout: "done\n1\n",
            stderr: "",
        },
    )
}

#[test]
fn run_collections() -> Result<(), Box<dyn Error>> {
    if !python_available() {
        return Ok(());
    }
    check_run(
        Path::new("./demos/collections.sly"),
        Expected {
            stdout: "99\n42\n3\n[2, 3]\n",
            stderr: "",
        },
    )
}

#[test]
fn run_closure_with_nonlocal() -> Result<(), Box<dyn Error>> {
    if !python_available() {
        return Ok(());
    }
    check_run(
        Path::new("./demos/closure.sly"),
        Expected {
            stdout: "3\n",
            stderr: "",
        },
    )
}
