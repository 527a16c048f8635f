//! Clap command tree definition.

use clap::{value_parser, Arg, ArgAction, Command};

/// Build the complete CLI command tree.
pub fn build_cli() -> Command {
    Command::new("docstore")
        .about("Run optimistic-concurrency race scenarios against the document store")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("json")
                .long("json")
                .help("JSON output mode")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(build_run())
        .subcommand(build_list())
        .subcommand(build_init_config())
}

fn build_run() -> Command {
    Command::new("run")
        .about("Run one scenario, or all of them, and check exclusivity")
        .arg(
            Arg::new("scenario")
                .help("Scenario name, or 'all'")
                .default_value("all"),
        )
        .arg(
            Arg::new("iterations")
                .long("iterations")
                .short('n')
                .help("Runs per scenario")
                .value_parser(value_parser!(usize))
                .default_value("1"),
        )
        .arg(
            Arg::new("workers")
                .long("workers")
                .short('w')
                .help("Concurrent workers per run")
                .value_parser(value_parser!(usize))
                .default_value("2"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("Path to a docstore.toml (default: in-memory store)"),
        )
        .arg(
            Arg::new("timeout-ms")
                .long("timeout-ms")
                .help("Barrier wait bound in milliseconds, overriding the config")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("no-jitter")
                .long("no-jitter")
                .help("Start every worker immediately")
                .action(ArgAction::SetTrue),
        )
}

fn build_list() -> Command {
    Command::new("list").about("List available scenarios")
}

fn build_init_config() -> Command {
    Command::new("init-config")
        .about("Write a default docstore.toml if none exists")
        .arg(
            Arg::new("path")
                .help("Destination file")
                .default_value("docstore.toml"),
        )
}
