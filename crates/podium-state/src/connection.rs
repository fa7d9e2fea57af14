//! SurrealDB connection setup
//!
//! Supports in-memory, remote (WebSocket) and local file-backed connections.
//! Every connection runs the schema migrations before it is handed out.

use crate::error::StateError;
use crate::migrations;
use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{info, instrument};

const DEFAULT_NAMESPACE: &str = "podium";
const DEFAULT_DATABASE: &str = "main";
const LOCAL_DB_PATH: &str = ".podium/db";

/// Configuration for a remote SurrealDB connection
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// WebSocket endpoint URL (e.g., "wss://xxx.aws-use1.surrealdb.cloud")
    pub endpoint: String,
    /// Database username
    pub username: String,
    /// Database password
    pub password: String,
    /// Namespace (default: "podium")
    pub namespace: String,
    /// Database name (default: "main")
    pub database: String,
    /// Whether this is a root user (true) or database user (false)
    pub is_root: bool,
}

impl StoreConfig {
    /// Create a new configuration for a database user
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            is_root: false,
        }
    }

    /// Set custom namespace
    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    /// Set custom database
    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    /// Set whether this is a root user
    pub fn with_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - PODIUM_DB_ENDPOINT (required)
    /// - PODIUM_DB_USERNAME (required)
    /// - PODIUM_DB_PASSWORD (required)
    /// - PODIUM_DB_NAMESPACE (optional, default: "podium")
    /// - PODIUM_DB_DATABASE (optional, default: "main")
    /// - PODIUM_DB_ROOT (optional, default: "false")
    pub fn from_env() -> std::result::Result<Self, String> {
        let endpoint =
            std::env::var("PODIUM_DB_ENDPOINT").map_err(|_| "PODIUM_DB_ENDPOINT not set")?;
        let username =
            std::env::var("PODIUM_DB_USERNAME").map_err(|_| "PODIUM_DB_USERNAME not set")?;
        let password =
            std::env::var("PODIUM_DB_PASSWORD").map_err(|_| "PODIUM_DB_PASSWORD not set")?;
        let namespace = std::env::var("PODIUM_DB_NAMESPACE")
            .unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string());
        let database =
            std::env::var("PODIUM_DB_DATABASE").unwrap_or_else(|_| DEFAULT_DATABASE.to_string());
        let is_root = std::env::var("PODIUM_DB_ROOT")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            endpoint,
            username,
            password,
            namespace,
            database,
            is_root,
        })
    }
}

/// Connect to an in-memory database and set up the schema.
#[instrument(skip_all)]
pub async fn connect_in_memory() -> Result<Surreal<Any>> {
    connect_url("mem://").await
}

/// Connect to any SurrealDB URL (`mem://`, `surrealkv://path`, `ws://...`)
/// without authentication, using the default namespace and database.
#[instrument]
pub async fn connect_url(url: &str) -> Result<Surreal<Any>> {
    let db = surrealdb::engine::any::connect(url)
        .await
        .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

    db.use_ns(DEFAULT_NAMESPACE)
        .use_db(DEFAULT_DATABASE)
        .await
        .map_err(|e| StateError::Connection(e.to_string()))?;

    migrations::init_schema(&db).await?;
    info!("SurrealDB connected ({})", url);
    Ok(db)
}

/// Connect to a remote SurrealDB with credentials.
#[instrument(
    skip(config),
    fields(
        endpoint = %config.endpoint,
        namespace = %config.namespace,
        database = %config.database,
    )
)]
pub async fn connect(config: &StoreConfig) -> Result<Surreal<Any>> {
    info!("Connecting to SurrealDB (root={})", config.is_root);

    let db = surrealdb::engine::any::connect(&config.endpoint)
        .await
        .map_err(|e| {
            StateError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
        })?;

    if config.is_root {
        db.signin(Root {
            username: &config.username,
            password: &config.password,
        })
        .await
        .map_err(|e| StateError::Connection(format!("Root authentication failed: {}", e)))?;
    } else {
        db.signin(Database {
            namespace: &config.namespace,
            database: &config.database,
            username: &config.username,
            password: &config.password,
        })
        .await
        .map_err(|e| StateError::Connection(format!("Database authentication failed: {}", e)))?;
    }

    db.use_ns(&config.namespace)
        .use_db(&config.database)
        .await
        .map_err(|e| {
            StateError::Connection(format!("Failed to select namespace/database: {}", e))
        })?;

    migrations::init_schema(&db).await?;
    info!("SurrealDB connected and schema initialized");
    Ok(db)
}

/// Connect using environment variables
///
/// If PODIUM_DB_ENDPOINT is set, connects with credentials.
/// If SURREALDB_URL is set, connects to that URL.
/// Otherwise, falls back to local persistence in `.podium/db`.
#[instrument(skip_all)]
pub async fn connect_from_env() -> Result<Surreal<Any>> {
    if let Ok(config) = StoreConfig::from_env() {
        return connect(&config).await;
    }

    if let Ok(url) = std::env::var("SURREALDB_URL") {
        return connect_url(&url).await;
    }

    std::fs::create_dir_all(LOCAL_DB_PATH).map_err(|e| {
        StateError::Connection(format!(
            "Failed to create database directory {}: {}",
            LOCAL_DB_PATH, e
        ))
    })?;
    let url = format!("surrealkv://{}", LOCAL_DB_PATH);
    info!("No remote config found, using local persistence: {}", url);
    connect_url(&url).await
}
