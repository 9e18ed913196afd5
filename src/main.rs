//! Purpose: `cardfile` CLI entry point and command dispatch.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Commands emit stable JSON on stdout; errors are JSON envelopes on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: Transient client notices go to stderr and never alter stdout payloads.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use serde_json::{Map, Value, json};

mod serve;

use cardfile::api::{
    Error, ErrorKind, ItemDraft, RemoteClient, SyncController, filter_items, to_exit_code,
};
use cardfile::config;
use cardfile::notice::{Notice, notice_json};
use serve::ServeConfig;

#[derive(Parser)]
#[command(
    name = "cardfile",
    version,
    about = "Shared item records over HTTP/JSON with live update broadcasts",
    after_help = r#"EXAMPLES
  $ cardfile serve
  $ cardfile add "Pen" --description "Blue ink"
  $ cardfile list --filter pen
  $ cardfile watch                  # re-prints the list on every update
  $ cardfile remove 64f0c2ab9d1e4b7f3a5c8d21"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        help = "Server base URL for client commands (default: http://127.0.0.1:5000, env CARDFILE_URL)"
    )]
    url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Run the HTTP server")]
    Serve {
        #[arg(long, help = "Listen address (default: 127.0.0.1:5000, env CARDFILE_BIND)")]
        bind: Option<SocketAddr>,
        #[arg(
            long,
            help = "Store file path (default: ~/.cardfile/items.json, env CARDFILE_STORE)"
        )]
        store: Option<PathBuf>,
        #[arg(
            long = "cors-origin",
            help = "Allowed browser origin, repeatable (default: any; env CARDFILE_CORS_ORIGIN)"
        )]
        cors_origin: Vec<String>,
    },
    #[command(about = "List items as a JSON array")]
    List {
        #[arg(long, help = "Case-insensitive substring match on item names")]
        filter: Option<String>,
    },
    #[command(arg_required_else_help = true, about = "Create an item")]
    Add {
        #[arg(help = "Item name (required, non-empty)")]
        name: String,
        #[arg(long, help = "Optional description")]
        description: Option<String>,
    },
    #[command(
        arg_required_else_help = true,
        about = "Replace an item's name and description"
    )]
    Edit {
        #[arg(help = "Item id")]
        id: String,
        #[arg(help = "New name (required, non-empty)")]
        name: String,
        #[arg(long, help = "New description; omitting it clears the field")]
        description: Option<String>,
    },
    #[command(arg_required_else_help = true, about = "Delete an item (idempotent)")]
    Remove {
        #[arg(help = "Item id")]
        id: String,
    },
    #[command(about = "Follow update signals and print the list on every change")]
    Watch {
        #[arg(long, help = "Case-insensitive substring match on item names")]
        filter: Option<String>,
    },
    #[command(about = "Broadcast a bare update signal to all connected clients")]
    Nudge,
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum, help = "Target shell")]
        shell: Shell,
    },
}

fn main() {
    let exit_code = match run() {
        Ok(()) => 0,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<(), Error> {
    let cli = Cli::parse();
    let base_url = cli.url.unwrap_or_else(config::default_base_url);

    match cli.command {
        Command::Serve {
            bind,
            store,
            cors_origin,
        } => {
            let config = ServeConfig {
                bind: bind.unwrap_or_else(config::default_bind),
                store_path: store.unwrap_or_else(config::default_store_path),
                cors_origins: if cors_origin.is_empty() {
                    config::default_cors_origins()
                } else {
                    cors_origin
                },
            };
            run_server(config)
        }
        Command::List { filter } => {
            let client = RemoteClient::new(base_url)?;
            let items = client.list_items()?;
            let filtered = filter_items(&items, filter.as_deref().unwrap_or(""));
            emit_json(serde_json::to_value(&filtered).unwrap_or_else(|_| json!([])));
            Ok(())
        }
        Command::Add { name, description } => {
            let client = RemoteClient::new(base_url)?;
            let mut draft = ItemDraft::new(name);
            if let Some(description) = description {
                draft = draft.with_description(description);
            }
            let item = client.create_item(&draft)?;
            emit_json(serde_json::to_value(&item).unwrap_or_default());
            Ok(())
        }
        Command::Edit {
            id,
            name,
            description,
        } => {
            let client = RemoteClient::new(base_url)?;
            let mut draft = ItemDraft::new(name);
            if let Some(description) = description {
                draft = draft.with_description(description);
            }
            let item = client.update_item(&id, &draft)?;
            emit_json(serde_json::to_value(&item).unwrap_or_default());
            Ok(())
        }
        Command::Remove { id } => {
            let client = RemoteClient::new(base_url)?;
            client.delete_item(&id)?;
            emit_json(json!({ "ok": true, "id": id }));
            Ok(())
        }
        Command::Watch { filter } => {
            let client = RemoteClient::new(base_url)?;
            watch(client, filter.as_deref().unwrap_or(""))
        }
        Command::Nudge => {
            let client = RemoteClient::new(base_url)?;
            client.emit_update()?;
            emit_json(json!({ "ok": true }));
            Ok(())
        }
        Command::Completions { shell } => {
            let mut command = Cli::command();
            generate(shell, &mut command, "cardfile", &mut io::stdout());
            Ok(())
        }
    }
}

fn run_server(config: ServeConfig) -> Result<(), Error> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to start async runtime")
                .with_source(err)
        })?;
    runtime.block_on(serve::serve(config))
}

/// The watch loop: print the snapshot once on start, then once per update
/// signal. Fetch failures keep the previous snapshot and surface a notice.
fn watch(client: RemoteClient, filter: &str) -> Result<(), Error> {
    let mut events = client.events()?;
    let mut controller = SyncController::new(client.clone());

    controller.refresh();
    report_snapshot(&mut controller, filter);

    while events.next_update()?.is_some() {
        controller.handle_update();
        report_snapshot(&mut controller, filter);
    }
    Ok(())
}

fn report_snapshot(controller: &mut SyncController<RemoteClient>, filter: &str) {
    if let Some(message) = controller.take_notice() {
        emit_notice(&Notice::fetch_failed("watch", message));
        return;
    }
    let value = serde_json::to_value(controller.filtered(filter)).unwrap_or_else(|_| json!([]));
    emit_json(value);
}

fn emit_json(value: Value) {
    let json = serde_json::to_string(&value).unwrap_or_else(|_| "null".to_string());
    println!("{json}");
}

fn emit_notice(notice: &Notice) {
    let value = notice_json(notice);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"notice\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn emit_error(err: &Error) {
    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_json(err: &Error) -> Value {
    let mut body = Map::new();
    body.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    body.insert(
        "message".to_string(),
        json!(err.message().unwrap_or("error")),
    );
    if let Some(hint) = err.hint() {
        body.insert("hint".to_string(), json!(hint));
    }
    if let Some(id) = err.id() {
        body.insert("id".to_string(), json!(id));
    }
    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(body));
    Value::Object(outer)
}
