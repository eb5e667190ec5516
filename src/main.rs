//! Purpose: `airlookup` CLI entry point and command dispatch.
//! Role: Binary crate root; parses args, resolves config, runs commands.
//! Invariants: Configuration comes from flags or environment, resolved once at startup.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::io::{self, IsTerminal};
use std::net::SocketAddr;

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;

mod command_dispatch;
mod serve;

use airlookup::api::{
    AirtableClient, AirtableConfig, DEFAULT_API_URL, DEFAULT_EMAIL_FIELD, Error, ErrorKind,
    FieldSelection, MAX_PAGE_SIZE, to_exit_code,
};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::InvalidInput)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Try `airlookup --help`."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let color_mode = cli.color;
    command_dispatch::dispatch_command(cli.command, color_mode).map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "airlookup",
    version,
    about = "Look up Airtable records by email",
    long_about = None,
    after_help = r#"EXAMPLES
  $ export AIRTABLE_API_KEY=pat... AIRTABLE_BASE_ID=app... AIRTABLE_TABLE_NAME=Contacts
  $ airlookup serve                                 # http://127.0.0.1:5000/?email=...
  $ airlookup fetch test1@test1.com                 # print matching records as JSON
  $ airlookup check                                 # validate configuration"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize human-readable output"
    )]
    color: ColorMode,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Serve the lookup API and viewer over HTTP",
        after_help = r#"EXAMPLES
  $ airlookup serve
  $ airlookup serve --bind 0.0.0.0:8080 --cors-origin https://portal.example.com
  $ airlookup serve --field Email --field Name --field Phone

ENDPOINTS
  GET /api/airtable?email=<address>   JSON array of { email, data }
  GET /?email=<address>               HTML viewer
  GET /healthz                        liveness"#
    )]
    Serve {
        #[command(flatten)]
        airtable: AirtableArgs,
        #[command(flatten)]
        run: ServeRunArgs,
    },
    #[command(about = "Validate configuration without binding sockets")]
    Check {
        #[command(flatten)]
        airtable: AirtableArgs,
        #[command(flatten)]
        run: ServeRunArgs,
        #[arg(long, help = "Emit the resolved settings as JSON")]
        json: bool,
    },
    #[command(
        arg_required_else_help = true,
        about = "Fetch records for one email and print them as JSON"
    )]
    Fetch {
        #[arg(help = "Email address to look up")]
        email: String,
        #[command(flatten)]
        airtable: AirtableArgs,
    },
    #[command(about = "Generate shell completions")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Clone)]
struct AirtableArgs {
    #[arg(
        long,
        env = "AIRTABLE_API_KEY",
        hide_env_values = true,
        help = "Airtable personal access token",
        help_heading = "Airtable"
    )]
    api_key: Option<String>,
    #[arg(
        long,
        env = "AIRTABLE_BASE_ID",
        help = "Airtable base id (app...)",
        help_heading = "Airtable"
    )]
    base_id: Option<String>,
    #[arg(
        long,
        env = "AIRTABLE_TABLE_NAME",
        help = "Airtable table name or id",
        help_heading = "Airtable"
    )]
    table: Option<String>,
    #[arg(
        long,
        env = "AIRTABLE_API_URL",
        default_value = DEFAULT_API_URL,
        help = "Airtable API origin",
        help_heading = "Airtable"
    )]
    api_url: String,
    #[arg(
        long,
        default_value = DEFAULT_EMAIL_FIELD,
        help = "Field matched against the email",
        help_heading = "Airtable"
    )]
    email_field: String,
    #[arg(
        long = "field",
        value_name = "NAME",
        help = "Only return these fields (repeatable; default: all fields)",
        help_heading = "Airtable"
    )]
    fields: Vec<String>,
    #[arg(
        long,
        default_value_t = MAX_PAGE_SIZE,
        help = "Rows requested from the first page (1-100)",
        help_heading = "Airtable"
    )]
    page_size: u32,
}

#[derive(Args, Debug, Clone)]
struct ServeRunArgs {
    #[arg(long, default_value = "127.0.0.1:5000", help = "Address to listen on")]
    bind: String,
    #[arg(
        long = "cors-origin",
        value_name = "ORIGIN",
        help = "Allowed CORS origin (repeatable; default: *)"
    )]
    cors_origin: Vec<String>,
    #[arg(
        long,
        default_value = "*",
        help = "Content-Security-Policy frame-ancestors value"
    )]
    frame_ancestors: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

fn airtable_config_from_args(args: AirtableArgs) -> Result<AirtableConfig, Error> {
    let config = AirtableConfig::new(
        args.api_key.unwrap_or_default(),
        args.base_id.unwrap_or_default(),
        args.table.unwrap_or_default(),
    )
    .with_api_url(args.api_url)
    .with_email_field(args.email_field)
    .with_fields(FieldSelection::from_list(args.fields))
    .with_page_size(args.page_size);
    config.validate()?;
    Ok(config)
}

fn serve_config_from_run_args(
    airtable: AirtableArgs,
    run: ServeRunArgs,
) -> Result<serve::ServeConfig, Error> {
    let bind: SocketAddr = run.bind.parse().map_err(|_| {
        Error::new(ErrorKind::Config)
            .with_message("invalid bind address")
            .with_hint("Use a host:port value like 127.0.0.1:5000.")
    })?;
    let cors_allowed_origins = if run.cors_origin.is_empty() {
        vec!["*".to_string()]
    } else {
        run.cors_origin
    };
    let config = serve::ServeConfig {
        bind,
        airtable: airtable_config_from_args(airtable)?,
        cors_allowed_origins,
        frame_ancestors: run.frame_ancestors,
    };
    serve::validate_config(&config)?;
    Ok(config)
}

fn check_report_json(config: &serve::ServeConfig, table_url: &str) -> Value {
    let fields = match &config.airtable.fields {
        FieldSelection::All => Value::String("all".to_string()),
        FieldSelection::Only(fields) => json!(fields),
    };
    json!({
        "check": {
            "bind": config.bind.to_string(),
            "table_url": table_url,
            "base_id": config.airtable.base_id,
            "table": config.airtable.table,
            "email_field": config.airtable.email_field,
            "fields": fields,
            "page_size": config.airtable.page_size,
            "api_key": "<redacted>",
            "cors_origins": config.cors_allowed_origins,
            "frame_ancestors": config.frame_ancestors,
        }
    })
}

fn check_report_lines(config: &serve::ServeConfig, table_url: &str, use_color: bool) -> Vec<String> {
    let fields = match &config.airtable.fields {
        FieldSelection::All => "all".to_string(),
        FieldSelection::Only(fields) => fields.join(", "),
    };
    vec![
        colorize_label("Configuration OK", use_color, AnsiColor::Green),
        String::new(),
        format!("  Listen:      http://{}", config.bind),
        format!("  Table URL:   {table_url}"),
        format!("  Match field: {}", config.airtable.email_field),
        format!("  Fields:      {fields}"),
        format!("  Page size:   {}", config.airtable.page_size),
        format!("  CORS:        {}", config.cors_allowed_origins.join(" ")),
        format!("  Frames:      frame-ancestors {}", config.frame_ancestors),
    ]
}

fn check_table_url(config: &serve::ServeConfig) -> Result<String, Error> {
    Ok(AirtableClient::new(&config.airtable)?
        .table_url()
        .to_string())
}

fn emit_json(value: Value) {
    let pretty = io::stdout().is_terminal();
    let json = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Green,
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Green => "32",
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\x1b[1;{code}m{label}\x1b[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    err.message()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{:?}", err.kind()))
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut current = StdError::source(err);
    while let Some(cause) = current {
        causes.push(cause.to_string());
        current = cause.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(status) = err.status() {
        inner.insert("status".to_string(), json!(status));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));
    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}
