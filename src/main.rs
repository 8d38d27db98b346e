use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::error;

use sly_lang::analyzer::{Severity, Violation};
use sly_lang::capability::CapabilityToken;
use sly_lang::pipeline::{Pipeline, PipelineError, PipelineOptions};
use sly_lang::sandbox::SandboxStatus;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Additional module search paths.
    #[arg(long = "ext-path", global = true)]
    extension_paths: Vec<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile FILE to a Python module and a source map.
    Compile {
        file: PathBuf,
        /// Regenerate artifacts even when they are up to date.
        #[arg(long)]
        force: bool,
    },
    /// Compile FILE and execute it in the sandbox.
    Run {
        file: PathBuf,
        /// Print the full sandbox result as JSON.
        #[arg(long)]
        json: bool,
        /// Grant an unrestricted capability token of the given type.
        #[arg(long = "grant")]
        grants: Vec<String>,
    },
    /// Run the security analyses over FILE and report violations.
    Analyze {
        file: PathBuf,
        /// Machine-readable violation report.
        #[arg(long)]
        json: bool,
    },
    /// Parse, analyze and lower FILE without writing artifacts.
    Check { file: PathBuf },
    /// Reformat FILE to canonical style.
    Fmt {
        file: PathBuf,
        /// Print the formatted source instead of rewriting the file.
        #[arg(long)]
        stdout: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::Level::Warn,
        1 => log::Level::Info,
        2 => log::Level::Debug,
        _ => log::Level::Trace,
    };
    if let Err(error) = simple_logger::init_with_level(level) {
        eprintln!("could not initialize logging: {error}");
    }

    let mut options = PipelineOptions::from_env();
    options.extension_paths = cli.extension_paths.clone();
    if let Command::Compile { force, .. } = &cli.command {
        options.force = *force;
    }
    let pipeline = Pipeline::new(options);

    let code = match &cli.command {
        Command::Compile { file, .. } => compile(&pipeline, file),
        Command::Run { file, json, grants } => run(&pipeline, file, *json, grants),
        Command::Analyze { file, json } => analyze(&pipeline, file, *json),
        Command::Check { file } => check(&pipeline, file),
        Command::Fmt { file, stdout } => fmt(file, *stdout),
    };
    ExitCode::from(code)
}

fn compile(pipeline: &Pipeline, file: &PathBuf) -> u8 {
    match pipeline.compile_file(file) {
        Ok((compiled, wrote)) => {
            print_violations(&compiled.violations);
            if wrote {
                println!("compiled '{}'", file.display());
            } else {
                println!("'{}' is up to date", file.display());
            }
            0
        }
        Err(error) => report(error),
    }
}

fn run(pipeline: &Pipeline, file: &PathBuf, json: bool, grants: &[String]) -> u8 {
    let tokens: Vec<CapabilityToken> = grants
        .iter()
        .map(|grant| CapabilityToken::unrestricted(grant.as_str()))
        .collect();

    match pipeline.run_file(file, &tokens) {
        Ok((compiled, result)) => {
            print_violations(&compiled.violations);
            if json {
                match serde_json::to_string_pretty(&result) {
                    Ok(rendered) => println!("{rendered}"),
                    Err(error) => {
                        error!("could not render result: {error}");
                        return 3;
                    }
                }
            } else {
                print!("{}", result.stdout);
                eprint!("{}", result.stderr);
            }
            if result.status == SandboxStatus::Ok {
                0
            } else {
                3
            }
        }
        Err(error) => report(error),
    }
}

fn analyze(pipeline: &Pipeline, file: &PathBuf, json: bool) -> u8 {
    let unit = match sly_lang::ast::SourceUnit::from_file(file) {
        Ok(unit) => unit,
        Err(error) => {
            eprintln!("{}: {error}", "io error".red());
            return 4;
        }
    };

    match pipeline.analyze_source(&unit) {
        Ok(analysis) => {
            if json {
                let reports: Vec<_> = analysis
                    .violations
                    .iter()
                    .map(Violation::report)
                    .collect();
                match serde_json::to_string_pretty(&reports) {
                    Ok(rendered) => println!("{rendered}"),
                    Err(error) => {
                        error!("could not render report: {error}");
                        return 4;
                    }
                }
            } else if analysis.violations.is_empty() {
                println!("no violations in '{}'", file.display());
            } else {
                for violation in &analysis.violations {
                    print_violations(std::slice::from_ref(violation));
                    if let Some(excerpt) = render_excerpt(
                        &unit.text,
                        violation.position.line,
                        violation.position.column,
                    ) {
                        eprintln!("{excerpt}");
                    }
                }
            }

            if analysis.blocks_codegen() {
                1
            } else {
                0
            }
        }
        Err(error) => report(error),
    }
}

fn check(pipeline: &Pipeline, file: &PathBuf) -> u8 {
    let unit = match sly_lang::ast::SourceUnit::from_file(file) {
        Ok(unit) => unit,
        Err(error) => {
            eprintln!("{}: {error}", "io error".red());
            return 4;
        }
    };

    match pipeline.compile_source(unit) {
        Ok(compiled) => {
            print_violations(&compiled.violations);
            println!("'{}' is ok", file.display());
            0
        }
        Err(error) => report(error),
    }
}

fn fmt(file: &PathBuf, to_stdout: bool) -> u8 {
    let unit = match sly_lang::ast::SourceUnit::from_file(file) {
        Ok(unit) => unit,
        Err(error) => {
            eprintln!("{}: {error}", "io error".red());
            return 4;
        }
    };

    let ast = match sly_lang::ast::parse(&unit) {
        Ok(ast) => ast,
        Err(error) => {
            eprintln!("{}", error.render(&unit.text));
            return 2;
        }
    };

    let formatted = ast.to_source();
    if to_stdout {
        print!("{formatted}");
        return 0;
    }
    if formatted == unit.text {
        return 0;
    }
    if let Err(error) = std::fs::write(file, formatted) {
        eprintln!("{}: {error}", "io error".red());
        return 4;
    }
    println!("reformatted '{}'", file.display());
    0
}

/// Quote the offending source line under a violation, caret included.
fn render_excerpt(source: &str, line: usize, column: usize) -> Option<String> {
    let text = source.lines().nth(line.saturating_sub(1))?;
    let margin = " ".repeat(format!("{line}").len());
    let padding = " ".repeat(column.saturating_sub(1));
    Some(format!(
        "{margin} |\n{line} | {text}\n{margin} | {padding}{}",
        "^".red()
    ))
}

fn print_violations(violations: &[Violation]) {
    for violation in violations {
        let severity = match violation.severity {
            Severity::Critical => "critical".red().bold(),
            Severity::Error => "error".red(),
            Severity::Warning => "warning".yellow(),
            Severity::Info => "info".blue(),
        };
        eprintln!(
            "{severity}: {} ({})",
            violation.message, violation.position
        );
        if let Some(cwe) = &violation.cwe {
            eprintln!("    {}", cwe.dimmed());
        }
        if let Some(suggestion) = &violation.suggestion {
            eprintln!("    hint: {suggestion}");
        }
    }
}

fn report(error: PipelineError) -> u8 {
    if let PipelineError::Analysis(violations) = &error {
        print_violations(violations);
    }
    eprintln!("{}: {error}", "error".red().bold());
    error.exit_code() as u8
}
