use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use tourbook_server::db::{create_pool, migrations};
use tourbook_server::{dataset, load_dotenv, AppConfig, AppState, ServerConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "tourbook",
    author,
    version,
    about = "Tour booking backend: JSON API, server-rendered pages and dev data tools"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server
    Serve(ServeArgs),
    /// Create or update the database schema
    Migrate(DatabaseArgs),
    /// Load tours, users and reviews from the dev data folder
    Import(ImportArgs),
    /// Delete every tour, user and review
    Delete(DatabaseArgs),
}

#[derive(Args, Debug)]
struct DatabaseArgs {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on (defaults to 0.0.0.0:$PORT)
    #[arg(long, value_name = "ADDR")]
    bind: Option<SocketAddr>,

    /// PostgreSQL connection string, overriding DATABASE_URL
    #[arg(long)]
    database_url: Option<String>,

    /// Development mode: plain cookies and permissive CORS
    #[arg(long)]
    development: bool,

    /// Run migrations before serving
    #[arg(long)]
    migrate: bool,
}

#[derive(Args, Debug)]
struct ImportArgs {
    #[command(flatten)]
    db: DatabaseArgs,

    /// Folder holding tours.json, users.json and reviews.json
    #[arg(long, env = "DATA_FOLDER", default_value = "dev-data/data", value_name = "DIR")]
    data_dir: PathBuf,
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| anyhow!(err))
}

/// Environment configuration with the command line flags on top.
fn load_config(args: &ServeArgs) -> Result<AppConfig> {
    let mut config = AppConfig::from_lookup(|key| match key {
        "DATABASE_URL" if args.database_url.is_some() => args.database_url.clone(),
        "ENVIRONMENT" if args.development => Some("development".to_owned()),
        _ => std::env::var(key).ok(),
    })
    .context("invalid configuration")?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    Ok(config)
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = load_config(&args)?;
    tracing::info!(environment = ?config.environment, "starting tourbook");

    let pool = config
        .pool
        .connect(&config.database_url)
        .await
        .context("failed to connect to the database")?;
    if args.migrate {
        migrations::run(&pool).await.context("migrations failed")?;
    }

    let state = AppState::new(pool, config).context("failed to set up mail")?;
    let server = ServerConfig::from_state(&state);
    tourbook_server::run_server(state, server).await?;
    Ok(())
}

async fn run_migrate(args: DatabaseArgs) -> Result<()> {
    let pool = create_pool(&args.database_url).await?;
    migrations::run(&pool).await.context("migrations failed")?;
    tracing::info!("database schema is up to date");
    Ok(())
}

async fn run_import(args: ImportArgs) -> Result<()> {
    let pool = create_pool(&args.db.database_url).await?;
    let counts = dataset::import(&pool, &args.data_dir)
        .await
        .with_context(|| format!("import from {} failed", args.data_dir.display()))?;
    tracing::info!(
        tours = counts.tours,
        users = counts.users,
        reviews = counts.reviews,
        "data successfully loaded"
    );
    Ok(())
}

async fn run_delete(args: DatabaseArgs) -> Result<()> {
    let pool = create_pool(&args.database_url).await?;
    let counts = dataset::delete(&pool).await?;
    tracing::info!(
        tours = counts.tours,
        users = counts.users,
        reviews = counts.reviews,
        "data successfully deleted"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing().ok();
    load_dotenv();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => run_serve(args).await?,
        Commands::Migrate(args) => run_migrate(args).await?,
        Commands::Import(args) => run_import(args).await?,
        Commands::Delete(args) => run_delete(args).await?,
    }

    Ok(())
}
