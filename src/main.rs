use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;

use devbot::commands;

fn build_cli() -> Command {
    Command::new("devbot")
        .version(env!("CARGO_PKG_VERSION"))
        .about("In-process runtime diagnostics: crashes, logs, performance, database and network")
        .disable_version_flag(true)
        .arg(
            Arg::new("version")
                .short('v')
                .short_alias('V')
                .long("version")
                .help("Print version information")
                .action(ArgAction::SetTrue)
        )
        .subcommand(
            Command::new("version")
                .about("Shows version information")
        )
        .subcommand(
            Command::new("watch")
                .about("Run every monitor and print diagnostic events until Ctrl+C")
                .arg(
                    Arg::new("command")
                        .short('c')
                        .long("command")
                        .value_name("CMD")
                        .help("Log stream command (default: logcat)")
                )
                .arg(
                    Arg::new("arg")
                        .short('a')
                        .long("arg")
                        .value_name("ARG")
                        .help("Argument for the log command (repeatable, replaces the defaults)")
                        .action(ArgAction::Append)
                        .allow_hyphen_values(true)
                )
                .arg(
                    Arg::new("filter")
                        .short('f')
                        .long("filter")
                        .value_name("TEXT")
                        .help("Only parse log lines containing TEXT (e.g. a pid)")
                )
                .arg(
                    Arg::new("max-lines")
                        .long("max-lines")
                        .value_name("N")
                        .help("Log lines processed per second, 0 for no limit (default: 100)")
                        .value_parser(clap::value_parser!(u32))
                )
                .arg(
                    Arg::new("no-crash-handler")
                        .long("no-crash-handler")
                        .help("Do not install the panic hook")
                        .action(ArgAction::SetTrue)
                )
                .arg(
                    Arg::new("export")
                        .short('e')
                        .long("export")
                        .value_name("FILE")
                        .help("Write a JSON export of the observed events on exit")
                        .value_parser(clap::value_parser!(PathBuf))
                )
        )
        .subcommand(
            Command::new("crashes")
                .about("Inspect the persisted crash history (use 'devbot crashes --help' for subcommands)")
                .arg(
                    Arg::new("file")
                        .long("file")
                        .value_name("PATH")
                        .help("Crash history file (default: platform data directory)")
                        .value_parser(clap::value_parser!(PathBuf))
                        .global(true)
                )
                .subcommand(
                    Command::new("show")
                        .about("Show every recorded crash, newest first")
                )
                .subcommand(
                    Command::new("last")
                        .about("Show the most recent crash")
                )
                .subcommand(
                    Command::new("clear")
                        .about("Delete the crash history")
                )
        )
        .subcommand(
            Command::new("sample")
                .about("Sample process and system memory once per second")
                .arg(
                    Arg::new("seconds")
                        .short('s')
                        .long("seconds")
                        .value_name("N")
                        .help("Number of samples to take (default: 5)")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("5")
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Print samples and issues as JSON lines")
                        .action(ArgAction::SetTrue)
                )
        )
        .subcommand(
            Command::new("config")
                .about("Manage the configuration file (use 'devbot config --help' for subcommands)")
                .subcommand_required(true)
                .arg_required_else_help(true)
                .subcommand(
                    Command::new("show")
                        .about("Print the effective configuration")
                )
                .subcommand(
                    Command::new("path")
                        .about("Print the configuration file location")
                )
                .subcommand(
                    Command::new("init")
                        .about("Write the default configuration file")
                        .arg(
                            Arg::new("force")
                                .long("force")
                                .help("Overwrite an existing file")
                                .action(ArgAction::SetTrue)
                        )
                )
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .help("Shell to generate completions for (bash, zsh, fish, powershell, elvish)")
                        .required(true)
                        .index(1)
                )
        )
}

fn main() -> Result<()> {
    devbot::init_logging();

    let matches = build_cli().get_matches();

    if matches.get_flag("version") {
        return commands::version();
    }

    match matches.subcommand() {
        Some(("version", _)) => commands::version()?,
        Some(("watch", sub_matches)) => commands::watch::execute(sub_matches)?,
        Some(("crashes", sub_matches)) => commands::crashes::execute(sub_matches)?,
        Some(("sample", sub_matches)) => commands::sample::execute(sub_matches)?,
        Some(("config", sub_matches)) => commands::config::execute(sub_matches)?,
        Some(("completions", sub_matches)) => {
            commands::completions::execute(sub_matches, &mut build_cli())?
        }
        _ => {
            println!("Welcome to devbot!");
            println!("Use 'devbot --help' for more information.");
        }
    }

    Ok(())
}
