//! Purpose: Hold top-level CLI command dispatch for `airlookup`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Config errors surface before any socket is bound or request is sent.

use super::*;
use airlookup::api::RecordFetcher;

pub(super) fn dispatch_command(command: Command, color_mode: ColorMode) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "airlookup", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Check {
            airtable,
            run,
            json,
        } => {
            let config = serve_config_from_run_args(airtable, run)?;
            let table_url = check_table_url(&config)?;
            if json {
                emit_json(check_report_json(&config, &table_url));
            } else {
                let use_color = color_mode.use_color(io::stdout().is_terminal());
                for line in check_report_lines(&config, &table_url, use_color) {
                    println!("{line}");
                }
            }
            Ok(RunOutcome::ok())
        }
        Command::Fetch { email, airtable } => {
            let config = airtable_config_from_args(airtable)?;
            let fetcher = RecordFetcher::airtable(&config)?;
            let records = fetcher.fetch_records_for(&email)?;
            let value = serde_json::to_value(&records).map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to encode records")
                    .with_source(err)
            })?;
            emit_json(value);
            Ok(RunOutcome::ok())
        }
        Command::Serve { airtable, run } => {
            let config = serve_config_from_run_args(airtable, run)?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to start runtime")
                        .with_source(err)
                })?;
            runtime.block_on(serve::serve(config))?;
            Ok(RunOutcome::ok())
        }
    }
}
