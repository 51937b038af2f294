use chrono::Utc;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parkpasses::api::middleware::session::{create_session_layer, AppState};
use parkpasses::config::Config;
use parkpasses::db;
use parkpasses::jobs::{scheduler, Command, JobContext};
use parkpasses::services::mailer::Mailer;

/// Park pass sales and management
#[derive(Parser, Debug)]
#[command(name = "parkpasses")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the web server and job scheduler (default)
    Serve,

    /// Email vouchers due to be delivered today
    SendVoucherEmails {
        /// Log what would be sent without sending
        #[arg(long)]
        test: bool,
    },

    /// Send expiry, auto-renewal and missing vehicle notices
    SendPassNotifications {
        /// Log what would be sent without sending
        #[arg(long)]
        test: bool,
    },

    /// Reissue auto-renewing passes that expire today
    RenewPasses {
        /// Log what would be renewed without renewing
        #[arg(long)]
        test: bool,
    },

    /// Write retailer invoices and reports for last month
    GenerateRetailerInvoices {
        /// Report on the current month instead
        #[arg(long)]
        test: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parkpasses=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    tracing::info!("Database ready");

    let mailer = Mailer::from_config(&config);

    let (command, test) = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => return serve(pool, config, mailer).await,
        Commands::SendVoucherEmails { test } => (Command::SendVoucherEmails, test),
        Commands::SendPassNotifications { test } => (Command::SendPassNotifications, test),
        Commands::RenewPasses { test } => (Command::RenewPasses, test),
        Commands::GenerateRetailerInvoices { test } => (Command::GenerateRetailerInvoices, test),
    };

    let ctx = JobContext::new(pool, config, mailer);
    let summary = command.run(&ctx, Utc::now().date_naive(), test).await?;
    println!("{}: {}", command.name(), summary);

    Ok(())
}

async fn serve(pool: sqlx::PgPool, config: Config, mailer: Mailer) -> anyhow::Result<()> {
    tracing::info!("Starting Park Passes server...");

    let secure = config.base_url.starts_with("https://");
    let session_layer = create_session_layer(pool.clone(), secure).await?;
    tracing::info!("Session layer initialized");

    let mut jobs = scheduler::start(JobContext::new(
        pool.clone(),
        config.clone(),
        mailer.clone(),
    ))
    .await?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let state = AppState::new(pool, config, mailer);

    let app = parkpasses::api::app(state)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    jobs.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, cleaning up...");
}
