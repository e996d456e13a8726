use colored::Colorize;
use pagewarden::commands::command_argument_builder;
use pagewarden::handlers::{
    RunStatus, handle_add, handle_analyze, handle_check, handle_delete, handle_init, handle_list,
    handle_show, resolve_db_path,
};
use pagewarden_core::print_banner;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");
    let verbose = chosen_command.get_flag("verbose");

    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    let Some((name, primary_command)) = chosen_command.subcommand() else {
        // No subcommand provided, just show the banner
        return ExitCode::SUCCESS;
    };

    let db_path = resolve_db_path(
        chosen_command
            .get_one::<String>("db")
            .map(String::as_str)
            .unwrap_or(pagewarden::commands::DEFAULT_DB_PATH),
    );

    let result = match name {
        "init" => handle_init(primary_command, &db_path, quiet),
        "add" => handle_add(primary_command, &db_path, quiet).await,
        "analyze" => handle_analyze(primary_command, &db_path, quiet).await,
        "check" => handle_check(primary_command, &db_path, quiet).await,
        "list" => handle_list(primary_command, &db_path).await,
        "show" => handle_show(primary_command, &db_path).await,
        "delete" => handle_delete(primary_command, &db_path, quiet).await,
        _ => unreachable!("clap should ensure we don't get here"),
    };

    match result {
        Ok(status) => ExitCode::from(status.code()),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::from(RunStatus::Failed.code())
        }
    }
}
