use crate::CLAP_STYLING;
use clap::{arg, command};
use url::Url;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("wayfarer")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("wayfarer")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .subcommand_required(false)
        .subcommand(
            command!("crawl")
                .about(
                    "Discover the navigable structure of a running application and \
                write it out as a semantic graph.",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(true)
                        .help("The URL to start discovery from")
                        .value_parser(clap::value_parser!(Url)),
                )
                .arg(
                    arg!(-d --"depth" <DEPTH>)
                        .required(false)
                        .help("Maximum link depth to follow")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("3"),
                )
                .arg(
                    arg!(-g --"graph" <PATH>)
                        .required(false)
                        .help("Where to write the graph artifact")
                        .default_value("wayfarer-graph.json"),
                )
                .arg(
                    arg!(-p --"persona" <NAME>)
                        .required(false)
                        .help("Persona name; the graph is written as a per-persona variant"),
                )
                .arg(
                    arg!(--"max-pages" <N>)
                        .required(false)
                        .help("Stop after this many discovered pages")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("200"),
                )
                .arg(
                    arg!(--"allow-side-effects")
                        .required(false)
                        .help(
                            "Let discovery fill and submit forms it reveals. Injects \
                        synthetic writes into the target application; use only against \
                        sandboxed environments.",
                        )
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"reasoning-url" <URL>)
                        .required(false)
                        .help("Chat-completions endpoint used for semantic labeling"),
                )
                .arg(
                    arg!(--"reasoning-model" <MODEL>)
                        .required(false)
                        .help("Model name passed to the reasoning service")
                        .default_value("gpt-4o-mini"),
                ),
        )
        .subcommand(
            command!("run")
                .about("Execute a mission against a discovered graph and write the report.")
                .arg(
                    arg!(-m --"mission" <PATH>)
                        .required(true)
                        .help("Path to the mission artifact")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-g --"graph" <PATH>)
                        .required(false)
                        .help("Path to the graph artifact")
                        .default_value("wayfarer-graph.json"),
                )
                .arg(
                    arg!(-p --"persona" <NAME>)
                        .required(false)
                        .help("Persona name; a per-persona graph variant is preferred"),
                )
                .arg(
                    arg!(--"db" <PATH>)
                        .required(false)
                        .help("SQLite database for the storage layer of the triple check")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-r --"report" <PATH>)
                        .required(false)
                        .help("Where to write the report artifact")
                        .default_value("wayfarer-report.json"),
                )
                .arg(
                    arg!(--"reasoning-url" <URL>)
                        .required(false)
                        .help("Chat-completions endpoint used for selector resolution"),
                )
                .arg(
                    arg!(--"reasoning-model" <MODEL>)
                        .required(false)
                        .help("Model name passed to the reasoning service")
                        .default_value("gpt-4o-mini"),
                ),
        )
        .subcommand(
            command!("graph")
                .about("Inspect a stored graph artifact")
                .subcommand_required(true)
                .subcommand(
                    command!("show").about("Print nodes, edges and components").arg(
                        arg!(-g --"graph" <PATH>)
                            .required(false)
                            .help("Path to the graph artifact")
                            .default_value("wayfarer-graph.json"),
                    ),
                ),
        )
}
