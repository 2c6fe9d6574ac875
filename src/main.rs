//! StepFlow CLI Entry Point
//!
//! Runs a set of demonstration pipelines on a reactor and reports the
//! results and reactor counters.
//!
//! # Usage
//!
//! ```bash
//! # Run the demo pipelines with input 5
//! stepflow 5
//!
//! # Use pool sizes from a configuration file
//! stepflow --config reactor.yaml
//!
//! # Override pool sizes and print metrics as JSON
//! stepflow 10 --compute 2 --blocking 8 --json
//! ```

use std::env;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use colored::Colorize;
use log::{debug, info};

use stepflow::config::load_config;
use stepflow::{BoxError, Flow, Reactor, ReactorConfig, Record, Step};
use stepflow::{APP_NAME, VERSION};

/// Input used when none is given.
const DEFAULT_INPUT: i64 = 5;

/// Simulated latency of the blocking demo step.
const BLOCKING_DELAY: Duration = Duration::from_millis(20);

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Config {
    input: i64,
    config_path: Option<String>,
    compute_threads: Option<usize>,
    blocking_threads: Option<usize>,
    json: bool,
    verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: DEFAULT_INPUT,
            config_path: None,
            compute_threads: None,
            blocking_threads: None,
            json: false,
            verbose: false,
        }
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME.bold(), VERSION);
    println!("Staged Pipeline Execution Engine");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: stepflow [OPTIONS] [INPUT]");
    println!();
    println!("Arguments:");
    println!("  [INPUT]             Integer fed to the demo pipelines (default: {})", DEFAULT_INPUT);
    println!();
    println!("Options:");
    println!("  --config PATH       Load reactor settings from a YAML file");
    println!("  --compute N         Number of compute worker threads");
    println!("  --blocking N        Number of blocking worker threads");
    println!("  --json              Print reactor metrics as JSON");
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Examples:");
    println!("  stepflow 5");
    println!("  stepflow --config reactor.yaml");
    println!("  stepflow 10 --compute 2 --blocking 8 --json");
}

fn parse_count(flag: &str, value: Option<&String>) -> Result<usize, String> {
    let value = value.ok_or_else(|| format!("{} requires a number argument", flag))?;
    value
        .parse()
        .map_err(|_| format!("Invalid {} value: {}", flag, value))
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut positional_index = 0;
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--json" => {
                config.json = true;
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--config" => {
                i += 1;
                let path = args
                    .get(i)
                    .ok_or_else(|| "--config requires a path argument".to_string())?;
                config.config_path = Some(path.clone());
            }
            "--compute" => {
                i += 1;
                config.compute_threads = Some(parse_count("--compute", args.get(i))?);
            }
            "--blocking" => {
                i += 1;
                config.blocking_threads = Some(parse_count("--blocking", args.get(i))?);
            }
            arg if arg.starts_with("--") => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                match positional_index {
                    0 => {
                        config.input = arg
                            .parse()
                            .map_err(|_| format!("Invalid input value: {}", arg))?;
                    }
                    _ => return Err(format!("Unexpected argument: {}", arg)),
                }
                positional_index += 1;
            }
        }
        i += 1;
    }

    Ok(config)
}

/// Builds the reactor settings from file and command-line overrides.
fn reactor_config(config: &Config) -> Result<ReactorConfig, Box<dyn std::error::Error>> {
    let mut reactor_config = match &config.config_path {
        Some(path) => load_config(path)?,
        None => ReactorConfig::default(),
    };

    if let Some(n) = config.compute_threads {
        reactor_config.compute_threads = n;
    }
    if let Some(n) = config.blocking_threads {
        reactor_config.blocking_threads = n;
    }

    reactor_config.validate()?;
    Ok(reactor_config)
}

fn int(record: &Record) -> i64 {
    record.first::<i64>().copied().unwrap_or_default()
}

/// Prints one scenario outcome and passes `ok` through.
fn report(name: &str, outcome: &str, ok: bool, started: Instant) -> bool {
    let status = if ok { "ok".green() } else { "failed".red() };
    println!(
        "  {:<12} {:<8} {:<24} ({} ms)",
        name,
        status,
        outcome,
        started.elapsed().as_millis()
    );
    ok
}

/// compute(+1) -> blocking(*2) -> detached(audit log)
fn run_pipeline(reactor: &Reactor, input: i64) -> Result<i64, Box<dyn std::error::Error>> {
    let flow = Flow::builder()
        .then(Step::compute(|r: &Record| Ok(Record::of(int(r) + 1))).named("increment"))
        .then(
            Step::blocking(|r: &Record| {
                thread::sleep(BLOCKING_DELAY);
                Ok(Record::of(int(r) * 2))
            })
            .named("double"),
        )
        .then(
            Step::detached(|r: &Record| {
                info!("Detached audit saw value {}", int(r));
                Ok(r.clone())
            })
            .named("audit"),
        )
        .build();

    let record = reactor.run(&flow, Record::of(input))?;
    Ok(int(&record))
}

/// A failing step recovered by its handler, followed by +1.
fn run_recovery(reactor: &Reactor, input: i64) -> Result<i64, Box<dyn std::error::Error>> {
    let flow = Flow::builder()
        .then(
            Step::compute(|_: &Record| Err("boom".into()))
                .with_handler(|e| {
                    debug!("Recovering from: {}", e);
                    Record::of(0_i64)
                })
                .named("explode"),
        )
        .compute(|r: &Record| Ok(Record::of(int(r) + 1)))
        .build();

    let record = reactor.run(&flow, Record::of(input))?;
    Ok(int(&record))
}

type Supplier = Box<dyn Fn() -> Result<&'static str, BoxError> + Send + Sync>;

/// Two sleeping suppliers racing on one promise.
fn run_race(reactor: &Reactor) -> Option<&'static str> {
    let suppliers: Vec<Supplier> = vec![
        Box::new(|| {
            thread::sleep(Duration::from_millis(50));
            Ok("a")
        }),
        Box::new(|| {
            thread::sleep(Duration::from_millis(5));
            Ok("b")
        }),
    ];
    reactor.await_any(suppliers)
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    // Setup logging
    setup_logging(config.verbose);

    // Print banner
    print_banner();

    let reactor_config = reactor_config(&config)?;
    info!(
        "Pools: {} compute, {} blocking (poll {} ms)",
        reactor_config.compute_threads,
        reactor_config.blocking_threads,
        reactor_config.poll_interval_ms
    );

    let reactor = Reactor::new(reactor_config)?;
    let input = config.input;

    println!("Scenarios (input {}):", input);

    let mut outcomes = Vec::new();

    let started = Instant::now();
    outcomes.push(match run_pipeline(&reactor, input) {
        Ok(value) => report("pipeline", &value.to_string(), value == (input + 1) * 2, started),
        Err(e) => report("pipeline", &e.to_string(), false, started),
    });

    let started = Instant::now();
    outcomes.push(match run_recovery(&reactor, input) {
        Ok(value) => report("recovery", &value.to_string(), value == 1, started),
        Err(e) => report("recovery", &e.to_string(), false, started),
    });

    let started = Instant::now();
    let winner = run_race(&reactor);
    outcomes.push(report("race", winner.unwrap_or("none"), winner == Some("b"), started));

    let failures = outcomes.iter().filter(|ok| !**ok).count();

    println!();
    let metrics = reactor.metrics();
    if config.json {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    } else {
        println!("{}", metrics);
    }

    reactor.shutdown();

    if failures > 0 {
        return Err(format!("{} scenario(s) failed", failures).into());
    }
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("stepflow")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_defaults() {
        let config = parse_arguments(&args(&[])).unwrap();
        assert_eq!(config.input, DEFAULT_INPUT);
        assert!(config.config_path.is_none());
        assert!(!config.json);
    }

    #[test]
    fn test_parse_options() {
        let config =
            parse_arguments(&args(&["7", "--compute", "2", "--blocking", "8", "--json"])).unwrap();
        assert_eq!(config.input, 7);
        assert_eq!(config.compute_threads, Some(2));
        assert_eq!(config.blocking_threads, Some(8));
        assert!(config.json);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_arguments(&args(&["--compute"])).is_err());
        assert!(parse_arguments(&args(&["--blocking", "many"])).is_err());
        assert!(parse_arguments(&args(&["--unknown"])).is_err());
        assert!(parse_arguments(&args(&["1", "2"])).is_err());
        assert!(parse_arguments(&args(&["abc"])).is_err());
    }

    #[test]
    fn test_overrides_are_validated() {
        let config = parse_arguments(&args(&["--compute", "0"])).unwrap();
        assert!(reactor_config(&config).is_err());
    }
}
