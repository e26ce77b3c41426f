use clap::{Parser, ValueEnum};
use potluck_core::{CategoryOrder, StoreConfig};
use potluck_service::{build_router, ServiceConfig, ServiceState};
use std::net::SocketAddr;
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StoreMode {
    Auto,
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CategoryOrderArg {
    Position,
    Id,
    Name,
}

impl From<CategoryOrderArg> for CategoryOrder {
    fn from(arg: CategoryOrderArg) -> Self {
        match arg {
            CategoryOrderArg::Position => CategoryOrder::Position,
            CategoryOrderArg::Id => CategoryOrder::Id,
            CategoryOrderArg::Name => CategoryOrder::Name,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "potluckd", version, about = "Potluck planner REST service")]
struct Cli {
    /// Socket address to bind, e.g. 127.0.0.1:8094
    #[arg(long, default_value = "127.0.0.1:8094")]
    listen: SocketAddr,
    /// Store backend. `auto` picks postgres when a database url is configured.
    #[arg(long, value_enum, default_value_t = StoreMode::Auto, env = "POTLUCK_STORE")]
    store: StoreMode,
    /// PostgreSQL url for planner persistence.
    #[arg(long, env = "POTLUCK_DATABASE_URL")]
    database_url: Option<String>,
    /// Max PostgreSQL pool connections.
    #[arg(long, default_value_t = 5, env = "POTLUCK_PG_MAX_CONNECTIONS")]
    pg_max_connections: u32,
    /// Category sort key for the board and dashboard.
    #[arg(long, value_enum, default_value_t = CategoryOrderArg::Position, env = "POTLUCK_CATEGORY_ORDER")]
    category_order: CategoryOrderArg,
    /// Skip seeding the demo dataset on the memory backend.
    #[arg(long, default_value_t = false)]
    no_seed: bool,
}

fn resolve_store(cli: &Cli) -> anyhow::Result<StoreConfig> {
    let resolved_url = cli
        .database_url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok());

    let store = match cli.store {
        StoreMode::Memory => StoreConfig::Memory,
        StoreMode::Postgres => {
            let database_url = resolved_url.ok_or_else(|| {
                anyhow::anyhow!("store=postgres requires --database-url or DATABASE_URL")
            })?;
            StoreConfig::postgres(database_url, cli.pg_max_connections)
        }
        StoreMode::Auto => {
            if let Some(database_url) = resolved_url {
                StoreConfig::postgres(database_url, cli.pg_max_connections)
            } else {
                StoreConfig::Memory
            }
        }
    };

    Ok(store)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "potluck_service=info,info".to_string()),
        )
        .init();

    let cli = Cli::parse();
    let store = resolve_store(&cli)?;
    let config = ServiceConfig {
        store,
        category_order: cli.category_order.into(),
        seed_demo: !cli.no_seed,
    };

    let state = ServiceState::bootstrap(config).await?;
    info!(
        backend = state.engine.backend_label(),
        "potluck store ready"
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!("potluck-service listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
