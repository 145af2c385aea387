use crate::CLAP_STYLING;
use clap::{arg, command};
use kbnav_core::config::DEFAULT_CONFIG_PATH;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("kbnav")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("kbnav")
        .about("Browse, edit and navigate a markdown knowledge base")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Only log errors")
                .required(false)
                .global(true)
                .conflicts_with("verbose"),
        )
        .arg(
            arg!(-v --"verbose" "Log debug output to stderr")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-c --"config" <PATH>)
                .required(false)
                .global(true)
                .help("Path to the config file")
                .default_value(DEFAULT_CONFIG_PATH),
        )
        .arg(
            arg!(-s --"server" <URL>)
                .required(false)
                .global(true)
                .env("KBNAV_SERVER")
                .help("Base URL of the knowledge base server"),
        )
        .arg(
            arg!(-u --"user" <USERNAME>)
                .required(false)
                .global(true)
                .env("KBNAV_USER")
                .help("Username for HTTP basic auth"),
        )
        .arg(
            arg!(-p --"password" <PASSWORD>)
                .required(false)
                .global(true)
                .env("KBNAV_PASSWORD")
                .hide_env_values(true)
                .help("Password for HTTP basic auth"),
        )
        .subcommand_required(true)
        .subcommand(
            command!("init")
                .about("Writes a default config file")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Where to write the config (defaults to --config)"),
                )
                .arg(
                    arg!(-f - -"force")
                        .help("Overwrite an existing config file")
                        .required(false),
                ),
        )
        .subcommand(command!("tree").about("Prints the file tree"))
        .subcommand(command!("graph").about("Prints the reference graph"))
        .subcommand(
            command!("open")
                .about("Renders a document and prints it with its links")
                .arg(arg!(<PATH>).required(true).help("Document path, e.g. notes/idea.md"))
                .arg(
                    arg!(--"html")
                        .required(false)
                        .help("Print the display HTML instead of text")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(
            command!("resolve")
                .about("Classifies a link the way the browser would follow it")
                .arg(arg!(<HREF>).required(true).help("The raw href")),
        )
        .subcommand(
            command!("backlinks")
                .about("Lists documents linking to PATH")
                .arg(arg!(<PATH>).required(true)),
        )
        .subcommand(
            command!("search")
                .about("Full-text search")
                .arg(arg!(<QUERY>).required(true)),
        )
        .subcommand(
            command!("write")
                .about("Writes a document")
                .arg(arg!(<PATH>).required(true))
                .arg(
                    arg!(--"content" <TEXT>)
                        .required(false)
                        .help("Document content")
                        .conflicts_with("file"),
                )
                .arg(
                    arg!(--"file" <FILE>)
                        .required(false)
                        .help("Read document content from a local file")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .group(
                    clap::ArgGroup::new("source")
                        .args(["content", "file"])
                        .required(true),
                ),
        )
        .subcommand(
            command!("delete")
                .about("Deletes a document")
                .arg(arg!(<PATH>).required(true)),
        )
        .subcommand(command!("ui").about("Starts the interactive terminal browser"))
}
