use std::{path::PathBuf, str::FromStr, sync::Arc};

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use labsync::{
    cache::{DocFlag, FileSessionStore, SessionStore},
    client::ApiClient,
    config::{self, SyncConfig},
    events::{self, EventSender},
    models::{CatalogEntry, DocumentKind, Module, Record},
    search::SearchFields,
    services::{
        enter_inventory, enter_requests, CollectionService, InventorySession, SessionDeps,
        SessionSettings,
    },
};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize(cli.session_dir.clone())?;

    match cli.command {
        Commands::Search(args) => handle_search(&context, args, cli.json).await?,
        Commands::NextCode(args) => handle_next_code(&context, args, cli.json).await?,
        Commands::Docs(args) => handle_docs(&context, args, cli.json).await?,
        Commands::Adjust(args) => handle_adjust(&context, args, cli.json).await?,
        Commands::Delete(args) => handle_delete(&context, args, cli.json).await?,
        Commands::FrontCodes => handle_front_codes(&context, cli.json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "labsync", about = "Laboratory catalog and inventory sync tool", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[arg(long, global = true, help = "Directory for cached document availability")]
    session_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search a module's records or catalog
    Search(SearchArgs),
    /// Suggest the next free code for a prefix
    NextCode(NextCodeArgs),
    /// Resolve attached document availability for catalog codes
    Docs(DocsArgs),
    /// Apply a signed stock delta to an inventory record
    Adjust(AdjustArgs),
    /// Delete a record, or a catalog entry with --catalog
    Delete(DeleteArgs),
    /// List the front-facing codes of service requests
    FrontCodes,
}

#[derive(Args)]
struct SearchArgs {
    #[arg(value_parser = parse_module)]
    module: Module,
    #[arg(long, help = "Filter by code")]
    id: Option<String>,
    #[arg(long, help = "Filter by name")]
    name: Option<String>,
    #[arg(long, action = ArgAction::SetTrue, help = "Search the catalog instead of the records")]
    catalog: bool,
}

#[derive(Args)]
struct NextCodeArgs {
    #[arg(value_parser = parse_module)]
    module: Module,
    prefix: String,
}

#[derive(Args)]
struct DocsArgs {
    #[arg(value_parser = parse_module)]
    module: Module,
    #[arg(required = true)]
    codes: Vec<String>,
}

#[derive(Args)]
struct AdjustArgs {
    #[arg(value_parser = parse_module)]
    module: Module,
    id: i64,
    #[arg(allow_hyphen_values = true, help = "Signed quantity, e.g. -2.5")]
    delta: Decimal,
}

#[derive(Args)]
struct DeleteArgs {
    #[arg(value_parser = parse_module)]
    module: Module,
    id: String,
    #[arg(long, action = ArgAction::SetTrue, help = "Delete the catalog entry with this code")]
    catalog: bool,
}

fn parse_module(value: &str) -> std::result::Result<Module, String> {
    Module::from_str(value).map_err(|_| format!("unknown module '{}'", value))
}

struct CliContext {
    config: SyncConfig,
    client: ApiClient,
    store: Arc<dyn SessionStore>,
    event_sender: EventSender,
}

impl CliContext {
    fn initialize(session_dir: Option<PathBuf>) -> Result<Self> {
        let config = config::load_config().context("failed to load configuration")?;
        config::init_tracing(&config.log_level, config.log_json);

        let mut client = ApiClient::new(&config.api_base_url, config.request_timeout())
            .context("failed to build API client")?;
        if let Some(token) = &config.api_token {
            client = client.with_token(token.clone());
        }

        let dir = session_dir.unwrap_or_else(|| config.session_dir());
        debug!(dir = %dir.display(), "using file session store");
        let store: Arc<dyn SessionStore> = Arc::new(FileSessionStore::new(dir));

        let (event_sender, event_rx) = EventSender::channel(config.event_channel_capacity);
        tokio::spawn(events::process_events(event_rx));

        Ok(Self {
            config,
            client,
            store,
            event_sender,
        })
    }

    fn deps(&self) -> SessionDeps {
        SessionDeps {
            client: self.client.clone(),
            store: Arc::clone(&self.store),
            events: Some(self.event_sender.clone()),
            settings: SessionSettings::from(&self.config),
        }
    }

    async fn inventory(&self, module: Module) -> Result<InventorySession> {
        enter_inventory(module, self.deps())
            .await
            .with_context(|| format!("failed to open module {}", module))
    }

    async fn catalog_service(&self, module: Module) -> Result<CollectionService<CatalogEntry>> {
        if module == Module::Requests {
            Ok(enter_requests(self.deps()).await?.catalog().clone())
        } else {
            Ok(self.inventory(module).await?.catalog().clone())
        }
    }
}

fn fields(id: Option<String>, name: Option<String>) -> SearchFields {
    SearchFields { by_id: id, by_name: name }
}

async fn handle_search(context: &CliContext, args: SearchArgs, json: bool) -> Result<()> {
    let fields = fields(args.id, args.name);

    if args.module == Module::Requests {
        let session = enter_requests(context.deps()).await?;
        let rows = if args.catalog {
            render_rows(&session.search_catalog(&fields).await?, json)?
        } else {
            let requests = session.requests();
            let found = session.search_records(&fields).await?;
            if json {
                print_json(&found)?;
            } else {
                let codes = requests.front_codes();
                for request in &found {
                    let front = codes.get(&request.id).map(String::as_str).unwrap_or("-");
                    println!("- {} • {} • {} • {}", front, request.id, request.name, request.requested_on);
                }
            }
            found.len()
        };
        session.dispose().await;
        if !json {
            println!("{} result(s)", rows);
        }
        return Ok(());
    }

    let session = context.inventory(args.module).await?;
    let rows = if args.catalog {
        render_rows(&session.search_catalog(&fields).await?, json)?
    } else {
        render_rows(&session.search_records(&fields).await?, json)?
    };
    session.dispose().await;
    if !json {
        println!("{} result(s)", rows);
    }
    Ok(())
}

async fn handle_next_code(context: &CliContext, args: NextCodeArgs, json: bool) -> Result<()> {
    let code = if args.module == Module::Requests {
        let session = enter_requests(context.deps()).await?;
        let code = session.next_code(&args.prefix);
        session.dispose().await;
        code
    } else {
        let session = context.inventory(args.module).await?;
        let code = session.next_code(&args.prefix);
        session.dispose().await;
        code
    };

    if json {
        print_json(&serde_json::json!({ "prefix": args.prefix, "code": code }))?;
    } else {
        println!("{}", code);
    }
    Ok(())
}

#[derive(Serialize)]
struct DocsRow<'a> {
    code: &'a str,
    technical_sheet: DocFlag,
    safety_sheet: DocFlag,
}

async fn handle_docs(context: &CliContext, args: DocsArgs, json: bool) -> Result<()> {
    let session = context.inventory(args.module).await?;
    let availability = session.availability();
    let batch = session.settings().preload_batch;
    // one batch per call; keep going until every requested code is resolved
    while availability.preload(&args.codes, batch).await > 0 {}

    let rows: Vec<DocsRow<'_>> = args
        .codes
        .iter()
        .map(|code| {
            let entry = availability.get(code);
            DocsRow {
                code,
                technical_sheet: entry.flag(DocumentKind::TechnicalSheet),
                safety_sheet: entry.flag(DocumentKind::SafetySheet),
            }
        })
        .collect();

    if json {
        print_json(&rows)?;
    } else {
        for row in &rows {
            println!(
                "- {} • technical sheet: {:?} • safety sheet: {:?}",
                row.code, row.technical_sheet, row.safety_sheet
            );
        }
    }
    session.dispose().await;
    Ok(())
}

async fn handle_adjust(context: &CliContext, args: AdjustArgs, json: bool) -> Result<()> {
    let session = context.inventory(args.module).await?;
    let quantity = session
        .records()
        .adjust_stock(args.id, args.delta)
        .await
        .map_err(|e| anyhow!(e.user_message()))
        .with_context(|| format!("failed to adjust record {}", args.id))?;
    session.dispose().await;

    if json {
        print_json(&serde_json::json!({ "id": args.id, "existing_quantity": quantity }))?;
    } else {
        println!("Record {} now holds {}", args.id, quantity);
    }
    Ok(())
}

async fn handle_delete(context: &CliContext, args: DeleteArgs, json: bool) -> Result<()> {
    let (module, id) = (args.module, args.id);
    let settled = if args.catalog {
        let session = context.catalog_service(module).await?;
        let outcome = session.delete(id.clone()).await.map_err(|e| anyhow!(e.user_message()))?;
        outcome.settled().await
    } else if module == Module::Requests {
        let session = enter_requests(context.deps()).await?;
        let numeric = parse_id(&id)?;
        let outcome = session
            .records()
            .delete(numeric)
            .await
            .map_err(|e| anyhow!(e.user_message()))?;
        outcome.settled().await
    } else {
        let session = context.inventory(module).await?;
        let numeric = parse_id(&id)?;
        let outcome = session
            .records()
            .delete(numeric)
            .await
            .map_err(|e| anyhow!(e.user_message()))?;
        outcome.settled().await
    };
    if let Err(e) = settled {
        debug!(error = %e, "refresh after delete failed");
    }

    if json {
        print_json(&serde_json::json!({ "module": module, "deleted": id }))?;
    } else {
        println!("Deleted {} from {}", id, module);
    }
    Ok(())
}

async fn handle_front_codes(context: &CliContext, json: bool) -> Result<()> {
    let session = enter_requests(context.deps()).await?;
    let codes = session.requests().front_codes();
    let mut rows: Vec<(i64, String)> = codes.into_iter().collect();
    rows.sort();

    if json {
        let map: Vec<_> = rows
            .iter()
            .map(|(id, code)| serde_json::json!({ "id": id, "code": code }))
            .collect();
        print_json(&map)?;
    } else {
        for (id, code) in &rows {
            println!("- {} • request {}", code, id);
        }
    }
    session.dispose().await;
    Ok(())
}

fn parse_id(value: &str) -> Result<i64> {
    value
        .parse::<i64>()
        .with_context(|| format!("record id must be numeric, got '{}'", value))
}

fn render_rows<T: Record>(rows: &[T], json: bool) -> Result<usize> {
    if json {
        print_json(&rows)?;
    } else {
        for row in rows {
            println!("- {} • {}", row.code(), row.display_name());
        }
    }
    Ok(rows.len())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
