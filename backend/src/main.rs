//! CarbonSmart Backend Service
//!
//! Main entry point for the CarbonSmart backend.
//! This service provides:
//! - REST API for the browser client
//! - WebSocket server for live activity and marketplace events
//! - Carbon credit minting and transfers on the ERC-721 contract

use carbonsmart_backend::chain::{ledger_from_config, ChainConfig};
use carbonsmart_backend::database::{create_pool, run_migrations};
use carbonsmart_backend::services::{AiEngineClient, AuditTrailService};
use carbonsmart_backend::{create_router, AppConfig, AppError, AppResult, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load environment variables first
    dotenv::dotenv().ok();

    // Load configuration
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        AppError::Config(e)
    })?;

    // Initialize tracing/logging with config
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "carbonsmart_backend={},sqlx=warn,tower_http=info",
            config.log_level
        )
        .into()
    });
    if config.json_logs() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║         CarbonSmart Backend Service Starting             ║");
    info!("╚══════════════════════════════════════════════════════════╝");
    info!("Environment: {}", config.environment);
    info!("Log level: {}", config.log_level);
    info!("HTTP port: {}", config.http_port);
    if let Some(ws_port) = config.ws_port {
        info!("WebSocket port: {}", ws_port);
    }

    // =========================================================================
    // DATABASE SETUP
    // =========================================================================
    info!("Connecting to database...");

    let pool = create_pool(&config.database).await.map_err(|e| {
        error!("Failed to create database pool: {}", e);
        AppError::Database(e)
    })?;

    info!("Database connection pool created successfully");
    info!("Max connections: {}", config.database.max_connections);

    info!("Running database migrations...");
    run_migrations(&pool).await.map_err(|e| {
        error!("Database migration failed: {}", e);
        AppError::Database(e)
    })?;

    info!("Database migrations completed successfully");

    // =========================================================================
    // CORE SERVICES INITIALIZATION
    // =========================================================================
    info!("Initializing core services...");

    let chain_config = ChainConfig::from_env().map_err(AppError::Config)?;
    info!("Ethereum RPC: {}", chain_config.rpc_url);
    info!("Carbon credit contract: {}", chain_config.contract_address);

    let simulation = chain_config.simulation;
    let ledger = ledger_from_config(chain_config)?;
    match ledger.connect().await {
        Ok(chain_id) => info!("✓ Chain client connected (chain id {})", chain_id),
        Err(e) => warn!("Chain node not reachable yet: {}", e),
    }
    if simulation && config.is_production() {
        warn!("CHAIN_SIMULATION enabled in production - credits are kept in memory only");
    } else if simulation {
        info!("CHAIN_SIMULATION enabled - credits are kept in memory");
    }
    match ledger.operator_address() {
        Some(operator) => info!("Marketplace operator: {}", operator),
        None => warn!("PRIVATE_KEY not set - minting and transfers are disabled"),
    }

    let predictor = AiEngineClient::new(&config.predictor)
        .map_err(|e| AppError::ExternalService(e.to_string()))?;
    info!("✓ AI engine client initialized ({})", config.predictor.ai_engine_url);

    let audit_trail = AuditTrailService::new(config.audit_log_dir.clone()).map_err(|e| {
        error!("Failed to initialize audit trail: {}", e);
        AppError::Message(format!("Audit trail initialization failed: {}", e))
    })?;
    info!("✓ Audit trail service initialized");

    let app_state = Arc::new(AppState::new(
        config.clone(),
        pool,
        ledger,
        Arc::new(predictor),
        audit_trail,
    ));
    info!("✓ Application state initialized with repositories");

    // =========================================================================
    // START SERVERS
    // =========================================================================
    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port)
        .parse()
        .map_err(|e| AppError::Config(format!("Invalid HTTP address: {}", e)))?;

    info!("Starting HTTP server on {}...", http_addr);

    let http_listener = TcpListener::bind(http_addr)
        .await
        .map_err(|e| AppError::Message(format!("Failed to bind HTTP server: {}", e)))?;
    let router = create_router(app_state.clone());

    let http_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(http_listener, router).await {
            error!("HTTP server error: {}", e);
        }
    });

    info!("✓ HTTP server started on {}", http_addr);

    // Start WebSocket server (if WS port is configured)
    let ws_handle = if let Some(ws_port) = config.ws_port {
        let ws_addr: SocketAddr = format!("0.0.0.0:{}", ws_port)
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid WebSocket address: {}", e)))?;

        info!("Starting WebSocket server on {}...", ws_addr);

        let ws_server = app_state.ws_server.clone();
        let listener = TcpListener::bind(ws_addr).await.map_err(|e| {
            AppError::Message(format!("Failed to bind WebSocket server: {}", e))
        })?;

        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        info!("New WebSocket connection from {}", addr);
                        let ws = ws_server.clone();
                        tokio::spawn(async move {
                            if let Err(e) = ws.handle_connection(stream).await {
                                error!("WebSocket connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("WebSocket accept error: {}", e);
                    }
                }
            }
        });

        info!("✓ WebSocket server started on {}", ws_addr);
        Some(handle)
    } else {
        warn!("WS_PORT not configured - WebSocket server not started");
        None
    };

    // =========================================================================
    // READY
    // =========================================================================
    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║           CarbonSmart Backend Service Ready!             ║");
    info!("╠══════════════════════════════════════════════════════════╣");
    info!("║  REST API:     0.0.0.0:{}                              ║", config.http_port);
    if let Some(ws_port) = config.ws_port {
        info!("║  WebSocket:    0.0.0.0:{}                              ║", ws_port);
    }
    info!("║  Environment:  {}                                    ║", config.environment);
    info!("╚══════════════════════════════════════════════════════════╝");
    info!("Press Ctrl+C to shutdown gracefully");

    // =========================================================================
    // SHUTDOWN HANDLING
    // =========================================================================
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, shutting down gracefully...");
        }
        _ = http_handle => {
            error!("HTTP server exited unexpectedly");
        }
        _ = async {
            if let Some(handle) = ws_handle {
                handle.await.ok();
            } else {
                // Never completes if WebSocket is not running
                futures::future::pending::<()>().await;
            }
        } => {
            error!("WebSocket server exited unexpectedly");
        }
    }

    app_state.ledger.disconnect().await;
    info!("CarbonSmart backend service shutdown complete");
    Ok(())
}
