//! lotecache - inventory sync jobs and vehicle queries from the command line.

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lotecache_core::api::airtable::status_formula;
use lotecache_core::api::{HttpImageFetcher, SupabaseFavorites, SupabaseInventory};
use lotecache_core::auth::{CredentialStore, Secret};
use lotecache_core::cache::CacheManager;
use lotecache_core::sync::{run_every, sync_inventory, DataSyncOptions, ImageMirror};
use lotecache_core::{
    AirtableClient, Config, FavoritesError, FavoritesService, SupabaseClient, VehicleFilters,
    VehicleService,
};

#[derive(Debug, Parser)]
#[command(name = "lotecache")]
#[command(about = "Sync the dealership inventory and query cached listings")]
struct Cli {
    /// Also write logs to daily-rotated files in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Copy purchased vehicles from Airtable into the inventory table
    SyncData,
    /// Mirror listing photos into the storage bucket
    SyncImages {
        /// Run a single pass and exit
        #[arg(long)]
        once: bool,
        /// Minutes between passes (defaults to the configured interval)
        #[arg(long)]
        every: Option<u64>,
    },
    /// One page of listings
    Vehicles {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value_t = 1)]
        page: u64,
    },
    /// A single listing by slug
    Vehicle { slug: String },
    /// Every listed slug
    Slugs,
    /// Values available to each filter
    FilterOptions,
    /// Vehicles viewed recently on this machine
    Recent,
    /// A user's saved vehicles
    Favorites {
        /// Act as the signed-in user (their Supabase access token) instead
        /// of with the service key
        #[arg(long)]
        access_token: Option<String>,
        #[command(subcommand)]
        action: FavoritesAction,
    },
    /// Manage API keys in the OS keychain
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
}

#[derive(Debug, Subcommand)]
enum FavoritesAction {
    List {
        #[arg(long)]
        user: Option<String>,
    },
    Toggle {
        #[arg(long)]
        user: Option<String>,
        vehicle_id: i64,
    },
}

#[derive(Debug, Subcommand)]
enum AuthAction {
    /// Store a key read from stdin (`airtable` or `supabase`)
    Store { service: String },
    Clear { service: String },
}

#[derive(Debug, Args)]
struct FilterArgs {
    #[arg(long)]
    marca: Vec<String>,
    #[arg(long = "year")]
    autoano: Vec<i64>,
    #[arg(long)]
    transmision: Vec<String>,
    #[arg(long)]
    combustible: Vec<String>,
    #[arg(long)]
    garantia: Vec<String>,
    #[arg(long)]
    carroceria: Vec<String>,
    /// Branch name, e.g. Monterrey
    #[arg(long)]
    ubicacion: Vec<String>,
    #[arg(long)]
    promotion: Vec<String>,
    #[arg(long)]
    min_price: Option<f64>,
    #[arg(long)]
    max_price: Option<f64>,
    #[arg(long)]
    enganche_min: Option<f64>,
    #[arg(long)]
    max_enganche: Option<f64>,
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    hide_separado: bool,
    /// e.g. price-asc, year-desc, mileage-asc
    #[arg(long)]
    orderby: Option<String>,
}

impl From<FilterArgs> for VehicleFilters {
    fn from(args: FilterArgs) -> Self {
        VehicleFilters {
            marca: args.marca,
            autoano: args.autoano,
            transmision: args.transmision,
            combustible: args.combustible,
            garantia: args.garantia,
            carroceria: args.carroceria,
            ubicacion: args.ubicacion,
            promotion: args.promotion,
            min_price: args.min_price,
            max_price: args.max_price,
            enganchemin: args.enganche_min,
            max_enganche: args.max_enganche,
            search: args.search,
            hide_separado: args.hide_separado,
            orderby: args.orderby,
        }
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "lotecache.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn supabase_client(config: &Config) -> Result<SupabaseClient> {
    let key = CredentialStore::resolve(Secret::SupabaseServiceKey)?;
    SupabaseClient::new(config.require_supabase_url()?, key)
}

fn airtable_client(config: &Config) -> Result<AirtableClient> {
    let key = CredentialStore::resolve(Secret::AirtableApiKey)?;
    AirtableClient::new(
        key,
        config.require_airtable_base()?.to_string(),
        config.require_airtable_table()?.to_string(),
    )
}

fn vehicle_service(config: &Config) -> Result<VehicleService> {
    let backend = SupabaseInventory::new(supabase_client(config)?, config.inventory_table.clone());
    let cache = CacheManager::new(config.cache_dir()?)?;
    Ok(VehicleService::new(Arc::new(backend), cache).with_ttl(config.cache_ttl()))
}

async fn sync_data(config: &Config) -> Result<()> {
    let airtable = airtable_client(config)?;
    let supabase = supabase_client(config)?;
    let options = DataSyncOptions {
        table: config.inventory_table.clone(),
        formula: status_formula("OrdenStatus", &config.listed_status),
        page_delay: Duration::from_millis(config.page_delay_ms),
    };
    let summary = sync_inventory(&airtable, &supabase, &options).await?;
    print_json(&summary)
}

fn schedule_period(minutes: u64) -> Result<Duration> {
    if minutes == 0 {
        bail!("--every must be at least 1 minute");
    }
    match minutes.checked_mul(60) {
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => bail!("--every {} minutes is too long", minutes),
    }
}

async fn sync_images(config: &Config, once: bool, every: Option<u64>) -> Result<()> {
    let airtable = airtable_client(config)?;
    let supabase = supabase_client(config)?;
    let mirror = Arc::new(ImageMirror::new(
        Arc::new(supabase.clone()),
        Arc::new(HttpImageFetcher::new()?),
        config.bucket.clone(),
    ));
    let table = config.inventory_table.clone();
    let formula = status_formula("OrdenStatus", &config.listed_status);
    let delay = Duration::from_millis(config.page_delay_ms);

    if once {
        let summary = mirror.run(&airtable, &supabase, &table, &formula, delay).await?;
        return print_json(&summary);
    }

    let minutes = every.unwrap_or(config.image_sync_minutes);
    let period = schedule_period(minutes)?;
    info!(minutes = minutes, "Scheduling image sync");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Could not listen for Ctrl-C");
        }
    };
    run_every(period, shutdown, move || {
        let (mirror, airtable, supabase) = (mirror.clone(), airtable.clone(), supabase.clone());
        let (table, formula) = (table.clone(), formula.clone());
        async move {
            match mirror.run(&airtable, &supabase, &table, &formula, delay).await {
                Ok(summary) => info!(
                    records = summary.records,
                    uploaded = summary.uploaded,
                    "Scheduled image sync complete"
                ),
                Err(e) => error!(error = %e, "Scheduled image sync failed"),
            }
        }
    })
    .await;
    Ok(())
}

async fn favorites(config: &Config, access_token: Option<String>, action: FavoritesAction) -> Result<()> {
    let mut client = supabase_client(config)?;
    if let Some(token) = access_token {
        client = client.with_access_token(token);
    }
    let backend = SupabaseFavorites::new(client, config.favorites_table.clone());
    let service = FavoritesService::new(Arc::new(backend));

    match action {
        FavoritesAction::List { user } => {
            let ids = service.load(user.as_deref()).await?;
            print_json(&ids)
        }
        FavoritesAction::Toggle { user, vehicle_id } => {
            service.load(user.as_deref()).await?;
            match service.toggle(user.as_deref(), vehicle_id).await {
                Ok(favorite) => print_json(&json!({ "vehicle_id": vehicle_id, "favorite": favorite })),
                Err(FavoritesError::NotSignedIn) => bail!("--user is required to change favorites"),
                Err(e) => Err(e.into()),
            }
        }
    }
}

fn auth(action: AuthAction) -> Result<()> {
    match action {
        AuthAction::Store { service } => {
            let secret: Secret = service.parse()?;
            eprintln!("Paste the {} key and press Enter:", secret);
            let mut line = String::new();
            io::stdin()
                .lock()
                .read_line(&mut line)
                .context("Failed to read key from stdin")?;
            let key = line.trim();
            if key.is_empty() {
                bail!("No key entered");
            }
            CredentialStore::store(secret, key)?;
            eprintln!("Stored {} key in the keychain", secret);
        }
        AuthAction::Clear { service } => {
            let secret: Secret = service.parse()?;
            CredentialStore::delete(secret)?;
            eprintln!("Removed {} key from the keychain", secret);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_dir.as_deref());
    let config = Config::load()?;

    match cli.command {
        Commands::SyncData => sync_data(&config).await?,
        Commands::SyncImages { once, every } => sync_images(&config, once, every).await?,
        Commands::Vehicles { filters, page } => {
            let service = vehicle_service(&config)?;
            let page = service.get_all_vehicles(&filters.into(), page).await?;
            print_json(&page)?;
        }
        Commands::Vehicle { slug } => {
            let service = vehicle_service(&config)?;
            let vehicle = service.get_vehicle_by_slug(&slug).await;
            service.flush_view_updates().await;
            match vehicle {
                Some(vehicle) => print_json(&vehicle)?,
                None => {
                    warn!(slug = %slug, "Vehicle not found");
                    bail!("No vehicle with slug '{}'", slug);
                }
            }
        }
        Commands::Slugs => {
            let service = vehicle_service(&config)?;
            print_json(&service.get_all_vehicle_slugs().await)?;
        }
        Commands::FilterOptions => {
            let service = vehicle_service(&config)?;
            print_json(&service.get_filter_options().await)?;
        }
        Commands::Recent => {
            let cache = CacheManager::new(config.cache_dir()?)?;
            let views = lotecache_core::cache::ViewTracker::new(cache);
            print_json(&views.recently_viewed())?;
        }
        Commands::Favorites { access_token, action } => favorites(&config, access_token, action).await?,
        Commands::Auth { action } => auth(action)?,
    }

    Ok(())
}
