use anyhow::Result;
use clap::ArgMatches;
use colored::Colorize;
use commands::command_argument_builder;
use kbnav::handlers::*;
use tracing::Level;

mod commands;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let matches = cmd.get_matches();

    let Some((name, sub)) = matches.subcommand() else {
        unreachable!("clap should ensure we don't get here")
    };

    // The terminal browser owns the screen; log lines would corrupt it.
    if name != "ui" {
        init_logging(matches.get_flag("quiet"), matches.get_flag("verbose"));
    }

    if let Err(e) = dispatch(&matches, name, sub).await {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(quiet: bool, verbose: bool) {
    let level = if quiet {
        Level::ERROR
    } else if verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn dispatch(matches: &ArgMatches, name: &str, sub: &ArgMatches) -> Result<()> {
    match name {
        "init" => handle_init(matches, sub),
        "resolve" => handle_resolve(&load_config(matches)?, sub),
        "ui" => handle_ui(&load_config(matches)?).await,
        _ => {
            let config = load_config(matches)?;
            let mut state = connect(&config).await?;
            match name {
                "tree" => handle_tree(&state),
                "graph" => handle_graph(&state),
                "open" => handle_open(&mut state, sub).await,
                "backlinks" => handle_backlinks(&mut state, sub).await,
                "search" => handle_search(&mut state, sub).await,
                "write" => handle_write(&mut state, sub).await,
                "delete" => handle_delete(&mut state, sub).await,
                _ => unreachable!("clap should ensure we don't get here"),
            }
        }
    }
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
