use crate::CLAP_STYLING;
use clap::{Arg, arg, command};

pub const DEFAULT_DB_PATH: &str = "~/.config/pagewarden/pagewarden.db";

fn format_arg() -> Arg {
    arg!(--"format" <FORMAT>)
        .required(false)
        .help("Output format: text, json")
        .value_parser(["text", "json"])
        .default_value("text")
}

/// Worker pool and engine limits, each overridable from the environment.
fn engine_args() -> Vec<Arg> {
    vec![
        arg!(-w --"workers" <NUM_WORKERS>)
            .required(false)
            .help("The number of async workers in the worker pool")
            .env("PAGEWARDEN_WORKERS")
            .value_parser(clap::value_parser!(usize))
            .default_value("10"),
        arg!(--"queue-size" <SIZE>)
            .required(false)
            .help("Maximum number of queued jobs before submissions are rejected")
            .env("PAGEWARDEN_QUEUE_SIZE")
            .value_parser(clap::value_parser!(usize))
            .default_value("100"),
        arg!(--"retries" <COUNT>)
            .required(false)
            .help("Retries for a failed page fetch")
            .env("PAGEWARDEN_RETRIES")
            .value_parser(clap::value_parser!(u32))
            .default_value("3"),
        arg!(--"timeout" <SECONDS>)
            .required(false)
            .help("Page request timeout in seconds")
            .env("PAGEWARDEN_TIMEOUT")
            .value_parser(clap::value_parser!(u64))
            .default_value("30"),
        arg!(--"job-timeout" <SECONDS>)
            .required(false)
            .help("Overall time limit per page job; defaults to 30, raised to fit --timeout")
            .env("PAGEWARDEN_JOB_TIMEOUT")
            .value_parser(clap::value_parser!(u64)),
        arg!(--"max-redirects" <COUNT>)
            .required(false)
            .help("Redirects to follow before giving up on a page")
            .env("PAGEWARDEN_MAX_REDIRECTS")
            .value_parser(clap::value_parser!(usize))
            .default_value("5"),
        arg!(--"max-bytes" <BYTES>)
            .required(false)
            .help("Response body size cap; larger pages are truncated")
            .env("PAGEWARDEN_MAX_BYTES")
            .value_parser(clap::value_parser!(usize))
            .default_value("10485760"),
        arg!(--"probe-concurrency" <NUM>)
            .required(false)
            .help("Concurrent link liveness probes per page")
            .env("PAGEWARDEN_PROBE_CONCURRENCY")
            .value_parser(clap::value_parser!(usize))
            .default_value("10"),
    ]
}

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("pagewarden")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("pagewarden")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner and non-essential output")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-v --"verbose" "Enable debug logging")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(--"db" <PATH>)
                .required(false)
                .global(true)
                .help("Location of the pagewarden database")
                .env("PAGEWARDEN_DB")
                .default_value(DEFAULT_DB_PATH),
        )
        .subcommand_required(false)
        .subcommand(
            command!("init")
                .about("Initializes the pagewarden database on your filesystem")
                .arg(
                    arg!(-f --"force")
                        .help("Overwrite any existing database at the specified location")
                        .required(false),
                ),
        )
        .subcommand(
            command!("add")
                .about("Submit one or more URLs for analysis")
                .arg(
                    arg!([URL] ...)
                        .required(false)
                        .help("URLs to add")
                        .conflicts_with("file"),
                )
                .arg(
                    arg!(-f --"file" <PATH>)
                        .required(false)
                        .help("Path to a newline-delimited file of URLs")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                ),
        )
        .subcommand(
            command!("analyze")
                .about("Analyze stored URLs and wait for the results")
                .arg(
                    arg!(<ID> ...)
                        .help("Ids of the URLs to analyze")
                        .value_parser(clap::value_parser!(i64)),
                )
                .args(engine_args())
                .arg(format_arg()),
        )
        .subcommand(
            command!("check")
                .about("Add a URL, analyze it and print the report in one step")
                .arg(arg!(<URL>).help("The URL to check"))
                .args(engine_args())
                .arg(format_arg()),
        )
        .subcommand(
            command!("list")
                .about("List stored URLs")
                .arg(
                    arg!(-s --"search" <TEXT>)
                        .required(false)
                        .help("Match against url, title or html version"),
                )
                .arg(
                    arg!(--"status" <STATUS>)
                        .required(false)
                        .help("Only show URLs in this state")
                        .value_parser(["queued", "processing", "completed", "error"]),
                )
                .arg(
                    arg!(--"page" <PAGE>)
                        .required(false)
                        .value_parser(clap::value_parser!(u32))
                        .default_value("1"),
                )
                .arg(
                    arg!(--"limit" <LIMIT>)
                        .required(false)
                        .help("Rows per page (1-100)")
                        .value_parser(clap::value_parser!(u32))
                        .default_value("10"),
                )
                .arg(
                    arg!(--"sort" <FIELD>)
                        .required(false)
                        .help("Sort field (default: newest first)")
                        .value_parser([
                            "title",
                            "url",
                            "html_version",
                            "internal_links",
                            "external_links",
                            "broken_links",
                            "has_login_form",
                            "status",
                            "created_at",
                            "updated_at",
                        ]),
                )
                .arg(arg!(--"desc" "Sort descending").required(false))
                .arg(format_arg()),
        )
        .subcommand(
            command!("show")
                .about("Show a stored URL and its broken links")
                .arg(arg!(<ID>).value_parser(clap::value_parser!(i64)))
                .arg(format_arg()),
        )
        .subcommand(
            command!("delete")
                .about("Delete stored URLs")
                .arg(arg!(<ID> ...).value_parser(clap::value_parser!(i64))),
        )
}
