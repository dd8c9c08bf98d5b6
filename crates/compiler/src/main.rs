//! CLI entry point for the Layerlab compiler and CPU simulator.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use compiler::{compile_with_progress, LocalBackend};
use simulator_core::{
    hierarchy, Backend, BackendClient, CompilationResult, CpuState, PipelineOptions,
    SimulatorConfig,
};
#[cfg(test)]
use rstest as _;
#[cfg(test)]
use tempfile as _;
use thiserror as _;
use tracing::{debug, Level};

/// Layered-systems teaching simulator: compile a C subset and watch it run.
#[derive(Parser, Debug)]
#[command(name = "layerlab", author, version, about)]
struct Cli {
    /// TOML file with simulator settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Compile a source file and print the generated program.
    Compile {
        /// Source file; the configured initial source when omitted.
        input: Option<PathBuf>,
        /// Source language tag.
        #[arg(short, long)]
        language: Option<String>,
        /// Print the compilation result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Compile, load and step the CPU one micro-stage at a time.
    Run {
        /// Source file; the configured initial source when omitted.
        input: Option<PathBuf>,
        /// Source language tag.
        #[arg(short, long)]
        language: Option<String>,
        /// Stop after this many micro-steps.
        #[arg(long)]
        max_steps: Option<usize>,
    },
    /// Print the system layer catalog.
    Layers {
        /// Print the catalog as JSON.
        #[arg(long)]
        json: bool,
    },
}

const fn log_level(verbose: u8) -> Level {
    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn load_config(path: Option<&Path>) -> Result<SimulatorConfig, String> {
    let Some(path) = path else {
        return Ok(SimulatorConfig::default());
    };
    let text = fs::read_to_string(path)
        .map_err(|e| format!("failed to read config {}: {e}", path.display()))?;
    let config: SimulatorConfig =
        toml::from_str(&text).map_err(|e| format!("invalid config {}: {e}", path.display()))?;
    config
        .validate()
        .map_err(|e| format!("invalid config {}: {e}", path.display()))?;
    debug!(path = %path.display(), "config loaded");
    Ok(config)
}

fn read_source(input: Option<&Path>, config: &SimulatorConfig) -> Result<String, String> {
    input.map_or_else(
        || Ok(config.initial_source.clone()),
        |path| {
            fs::read_to_string(path)
                .map_err(|e| format!("failed to read {}: {e}", path.display()))
        },
    )
}

fn options(config: &SimulatorConfig) -> PipelineOptions {
    PipelineOptions {
        pacing: config.stage_pacing,
        ..PipelineOptions::default()
    }
}

fn compile(
    input: Option<&Path>,
    language: Option<&str>,
    config: &SimulatorConfig,
    show_progress: bool,
) -> Result<CompilationResult, i32> {
    let source = read_source(input, config).map_err(|e| {
        eprintln!("error: {e}");
        1
    })?;
    let language = language.unwrap_or_else(|| config.language.as_str());
    let result = compile_with_progress(&source, language, options(config), |step| {
        if show_progress {
            match step.duration_ms() {
                Some(ms) => println!("[{}] {} ({ms} ms)", step.status().as_str(), step.name_en()),
                None => println!("[{}] {}", step.status().as_str(), step.name_en()),
            }
        }
    });
    Ok(result)
}

fn report_failure(result: &CompilationResult) {
    for error in &result.errors {
        eprintln!("error: {error}");
    }
}

fn print_warnings(result: &CompilationResult) {
    for warning in &result.warnings {
        eprintln!("{warning}");
    }
}

fn run_compile(
    input: Option<&Path>,
    language: Option<&str>,
    json: bool,
    config: &SimulatorConfig,
) -> Result<(), i32> {
    let result = compile(input, language, config, !json)?;
    if json {
        let text = serde_json::to_string_pretty(&result).map_err(|e| {
            eprintln!("error: failed to serialize result: {e}");
            1
        })?;
        println!("{text}");
        return if result.success { Ok(()) } else { Err(1) };
    }

    print_warnings(&result);
    if !result.success {
        report_failure(&result);
        return Err(1);
    }
    println!();
    for instruction in &result.instructions {
        println!(
            "{:<10} {:<22} {:<20} ; {}",
            instruction.id(),
            instruction.machine_code(),
            instruction.assembly(),
            instruction.description()
        );
    }
    println!(
        "Compiled {} instructions in {} ms",
        result.instructions.len(),
        result.compilation_time
    );
    Ok(())
}

fn print_state(state: &CpuState) {
    let registers: Vec<String> = state
        .registers
        .general_entries()
        .chain(state.registers.special_entries())
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    println!("registers: {}", registers.join(" "));
    let flags = state.flags;
    println!(
        "flags: ZF={} CF={} OF={} SF={} PF={}",
        u8::from(flags.zero),
        u8::from(flags.carry),
        u8::from(flags.overflow),
        u8::from(flags.negative),
        u8::from(flags.parity)
    );
    for (address, value) in &state.memory.data {
        println!("[{address}] = {value}");
    }
}

fn run_program(
    input: Option<&Path>,
    language: Option<&str>,
    max_steps: Option<usize>,
    config: &SimulatorConfig,
) -> Result<(), i32> {
    let result = compile(input, language, config, false)?;
    print_warnings(&result);
    if !result.success {
        report_failure(&result);
        return Err(1);
    }

    let backend = BackendClient::new(LocalBackend::new());
    backend.load_instructions(&result.instructions).map_err(|e| {
        eprintln!("error: {e}");
        1
    })?;

    let limit = max_steps.unwrap_or(6 * result.instructions.len());
    for _ in 0..limit {
        let step = backend.step_execution().map_err(|e| {
            eprintln!("error: {e}");
            2
        })?;
        if step.instruction.is_none() {
            break;
        }
        println!(
            "{:>5} {:<13} {}",
            step.cycle_count,
            step.stage.as_str(),
            step.message
        );
    }

    let state = backend.get_cpu_state().map_err(|e| {
        eprintln!("error: {e}");
        1
    })?;
    print_state(&state);
    Ok(())
}

fn run_layers(json: bool) -> Result<(), i32> {
    let data = hierarchy();
    if json {
        let text = serde_json::to_string_pretty(data).map_err(|e| {
            eprintln!("error: failed to serialize catalog: {e}");
            1
        })?;
        println!("{text}");
        return Ok(());
    }
    println!("{}", data.description);
    for layer in &data.layers {
        println!();
        println!("L{} {} ({})", layer.level, layer.name_en, layer.name);
        println!("   {}", layer.description);
        for concept in layer.concepts {
            println!("   - {}: {}", concept.name_en, concept.description);
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(log_level(cli.verbose))
        .with_writer(std::io::stderr)
        .init();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let outcome = match &cli.command {
        Command::Compile {
            input,
            language,
            json,
        } => run_compile(input.as_deref(), language.as_deref(), *json, &config),
        Command::Run {
            input,
            language,
            max_steps,
        } => run_program(input.as_deref(), language.as_deref(), *max_steps, &config),
        Command::Layers { json } => run_layers(*json),
    };

    std::process::exit(match outcome {
        Ok(()) => 0,
        Err(code) => code,
    });
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::{CommandFactory, Parser};
    use tracing::Level;

    use super::{log_level, Cli, Command};

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_compile_command() {
        let cli = Cli::try_parse_from(["layerlab", "compile", "prog.c", "--json", "-vv"])
            .expect("parses");
        assert_eq!(cli.verbose, 2);
        assert_eq!(
            cli.command,
            Command::Compile {
                input: Some(PathBuf::from("prog.c")),
                language: None,
                json: true,
            }
        );
    }

    #[test]
    fn parses_run_with_step_bound_and_config() {
        let cli = Cli::try_parse_from([
            "layerlab",
            "--config",
            "sim.toml",
            "run",
            "--max-steps",
            "12",
            "-l",
            "cpp",
        ])
        .expect("parses");
        assert_eq!(cli.config, Some(PathBuf::from("sim.toml")));
        assert_eq!(
            cli.command,
            Command::Run {
                input: None,
                language: Some("cpp".into()),
                max_steps: Some(12),
            }
        );
    }

    #[test]
    fn rejects_unknown_command() {
        assert!(Cli::try_parse_from(["layerlab", "assemble", "x"]).is_err());
    }

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(log_level(0), Level::WARN);
        assert_eq!(log_level(1), Level::INFO);
        assert_eq!(log_level(2), Level::DEBUG);
        assert_eq!(log_level(9), Level::TRACE);
    }
}
