//! docstore CLI: run optimistic-concurrency race scenarios.
//!
//! ```text
//! docstore run [scenario|all] [--iterations N] [--workers N] [--config PATH] [--timeout-ms N]
//! docstore list
//! docstore init-config [PATH]
//! ```
//!
//! Exit code is 1 if any run violated exclusivity or failed outright.

mod commands;
mod format;

use std::path::Path;
use std::process;
use std::time::Duration;

use clap::ArgMatches;
use docstore_core::Result;
use docstore_engine::{Scenario, ScenarioRunner, StoreConfig};
use tracing_subscriber::EnvFilter;

use commands::build_cli;
use format::{format_summaries, OutputMode, ScenarioSummary};

fn main() {
    init_tracing();

    let matches = build_cli().get_matches();
    let mode = if matches.get_flag("json") {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let exit_code = match matches.subcommand() {
        Some(("run", sub)) => run(sub, mode),
        Some(("list", _)) => {
            list();
            0
        }
        Some(("init-config", sub)) => init_config(sub),
        _ => 2,
    };
    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn list() {
    for scenario in Scenario::all() {
        if scenario.is_experimental() {
            println!("{}  [experimental]", scenario);
        } else {
            println!("{}", scenario);
        }
    }
}

fn init_config(matches: &ArgMatches) -> i32 {
    let path = matches
        .get_one::<String>("path")
        .map(String::as_str)
        .unwrap_or(docstore_engine::CONFIG_FILE_NAME);
    match StoreConfig::write_default_if_missing(Path::new(path)) {
        Ok(()) => {
            println!("{}", path);
            0
        }
        Err(e) => {
            eprintln!("Failed to write config: {}", e);
            1
        }
    }
}

fn load_config(matches: &ArgMatches) -> Result<StoreConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => StoreConfig::from_file(Path::new(path))?,
        None => StoreConfig::in_memory(),
    };
    if let Some(ms) = matches.get_one::<u64>("timeout-ms") {
        config = config.with_barrier_timeout(Some(Duration::from_millis(*ms)));
    }
    config.validate()?;
    Ok(config)
}

fn selected_scenarios(name: &str) -> std::result::Result<Vec<Scenario>, String> {
    if name.eq_ignore_ascii_case("all") {
        return Ok(Scenario::all().to_vec());
    }
    name.parse::<Scenario>()
        .map(|scenario| vec![scenario])
        .map_err(|e| {
            let known: Vec<_> = Scenario::all().iter().map(|s| s.name()).collect();
            format!("{}; expected 'all' or one of: {}", e, known.join(", "))
        })
}

fn run(matches: &ArgMatches, mode: OutputMode) -> i32 {
    let config = match load_config(matches) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return 1;
        }
    };

    let name = matches
        .get_one::<String>("scenario")
        .map(String::as_str)
        .unwrap_or("all");
    let scenarios = match selected_scenarios(name) {
        Ok(scenarios) => scenarios,
        Err(e) => {
            eprintln!("{}", e);
            return 1;
        }
    };

    let iterations = matches.get_one::<usize>("iterations").copied().unwrap_or(1);
    let workers = matches.get_one::<usize>("workers").copied().unwrap_or(2);
    let runner = ScenarioRunner::new(config)
        .with_workers(workers)
        .with_jitter(!matches.get_flag("no-jitter"));

    let mut summaries = Vec::with_capacity(scenarios.len());
    for scenario in scenarios {
        let mut summary = ScenarioSummary::new(scenario);
        for iteration in 0..iterations {
            match runner.run(scenario) {
                Ok(report) => summary.record(iteration, &report),
                Err(e) => summary.record_error(iteration, e),
            }
        }
        summaries.push(summary);
    }

    println!("{}", format_summaries(&summaries, mode));
    if summaries.iter().all(ScenarioSummary::is_clean) {
        0
    } else {
        1
    }
}
