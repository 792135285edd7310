//! CLI argument parsing, validation, and startup helpers.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::ServerConfig;
use crate::clock::SystemClock;
use crate::db::{Database, NewAccount, Role};
use crate::jwt::{MAX_ACCESS_TOKEN_TTL_SECS, MAX_REFRESH_TOKEN_TTL_SECS};
use crate::password::hash_password;
use crate::rate_limit::RateLimitConfig;

const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Signing key used only when running in development without a secret.
const DEVELOPMENT_JWT_SECRET: &str = "tenant-guard-development-only-signing-key";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Deployment environment. Anything but development is treated as production.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    Development,
    #[default]
    Production,
}

/// Where the client IP for rate limiting comes from.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClientIpSource {
    /// Socket peer address
    #[default]
    ConnectInfo,
    /// First entry of X-Forwarded-For (only behind a trusted proxy)
    XForwardedFor,
    /// X-Real-IP (only behind a trusted proxy)
    XRealIp,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tenant-guard",
    about = "Multi-tenant session security and authorization service"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "7291")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE_PATH", default_value = "tenant-guard.db")]
    pub database: String,

    /// Deployment environment, controls cookie attributes and secret fallback
    #[arg(short, long, env = "APP_ENV", value_enum, default_value = "production")]
    pub environment: Environment,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Access token lifetime in seconds (at most 24 hours)
    #[arg(long, default_value_t = MAX_ACCESS_TOKEN_TTL_SECS)]
    pub access_token_ttl: u64,

    /// Refresh token lifetime in seconds (at most 7 days)
    #[arg(long, default_value_t = MAX_REFRESH_TOKEN_TTL_SECS)]
    pub refresh_token_ttl: u64,

    /// Disable self-registration of tenant members
    #[arg(long)]
    pub no_signup: bool,

    /// Client IP source for rate limiting. Header sources require a trusted proxy
    #[arg(long, value_enum, default_value = "connect-info")]
    pub client_ip_source: ClientIpSource,

    /// Create a platform admin with this username on startup (password from ADMIN_PASSWORD)
    #[arg(long, value_name = "USERNAME")]
    pub create_admin: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format. `RUST_LOG` overrides the default level.
pub fn init_logging(format: &LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
///
/// Production refuses to start without a secret of at least
/// `MIN_JWT_SECRET_LENGTH` characters. Development falls back to a fixed key.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>, environment: Environment) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        Some(secret)
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => Some(content.trim().to_string()),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        None
    };

    match (secret, environment) {
        (Some(secret), _) if secret.len() >= MIN_JWT_SECRET_LENGTH => Some(secret),
        (Some(_), Environment::Production) => {
            error!(
                "JWT secret is shorter than {} characters. Use a longer secret",
                MIN_JWT_SECRET_LENGTH
            );
            None
        }
        (None, Environment::Production) => {
            error!(
                "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
            );
            None
        }
        (_, Environment::Development) => {
            warn!("No usable JWT secret, using the development key. Never do this in production");
            Some(DEVELOPMENT_JWT_SECRET.to_string())
        }
    }
}

/// Handle `--create-admin`: create a platform admin if the username is free.
/// Returns false if startup should abort.
pub async fn handle_create_admin(db: &Database, username: &str) -> bool {
    let Ok(password) = std::env::var("ADMIN_PASSWORD") else {
        error!("--create-admin requires the ADMIN_PASSWORD environment variable");
        return false;
    };
    // SAFETY: still single-threaded startup, see load_jwt_secret
    unsafe { std::env::remove_var("ADMIN_PASSWORD") };

    match db.users().find_by_username(username).await {
        Ok(Some(_)) => {
            info!(username = %username, "Admin user already exists");
            return true;
        }
        Ok(None) => {}
        Err(e) => {
            error!(error = %e, "Failed to check for existing admin");
            return false;
        }
    }

    let hash = match hash_password(&password) {
        Ok(hash) => hash,
        Err(e) => {
            error!(error = %e, "Failed to hash admin password");
            return false;
        }
    };

    let id = Uuid::new_v4().to_string();
    let account = NewAccount {
        id: &id,
        username,
        display_name: username,
        password_hash: &hash,
        role: Role::PlatformAdmin,
        tenant_id: None,
        job_category_id: None,
    };
    match db.users().create(&account).await {
        Ok(()) => {
            info!(username = %username, user_id = %id, "Admin user created");
            true
        }
        Err(e) => {
            error!(error = %e, "Failed to create admin user");
            false
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database, jwt_secret: String) -> ServerConfig {
    ServerConfig {
        db,
        jwt_secret: jwt_secret.into_bytes(),
        environment: args.environment,
        access_token_ttl_secs: args.access_token_ttl,
        refresh_token_ttl_secs: args.refresh_token_ttl,
        no_signup: args.no_signup,
        client_ip_source: args.client_ip_source,
        rate_limits: RateLimitConfig::new(args.client_ip_source),
        clock: Arc::new(SystemClock),
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
