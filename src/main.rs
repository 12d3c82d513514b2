use std::fs;
use std::sync::Arc;

use anyhow::bail;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use studyconnect::auth::TokenGenerator;
use studyconnect::config::ServerConfig;
use studyconnect::server::{AppState, create_router};
use studyconnect::store::{SqliteStore, Store};
use studyconnect::types::{Role, Session, User};

const ADMIN_USERNAME: &str = "admin";
const ADMIN_EMAIL: &str = "admin@studyconnect.local";

fn create_session(
    generator: &TokenGenerator,
    user_id: String,
) -> anyhow::Result<(Session, String)> {
    let (raw_token, lookup, hash) = generator.generate()?;
    let session = Session {
        id: Uuid::new_v4().to_string(),
        token_hash: hash,
        token_lookup: lookup,
        user_id,
        created_at: Utc::now(),
        expires_at: None,
        last_used_at: None,
    };
    Ok((session, raw_token))
}

#[cfg(unix)]
fn set_restrictive_permissions(path: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::warn!("Failed to set permissions on {}: {e}", path.display());
    }
}

#[derive(Parser)]
#[command(name = "studyconnect")]
#[command(about = "A task and study-group collaboration server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(long, short, default_value = "8080")]
        port: u16,

        /// Data directory for the database
        #[arg(long, default_value = "./data")]
        data_dir: String,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Initialize the server (create database and admin account)
    Init {
        /// Data directory for the database
        #[arg(long, default_value = "./data")]
        data_dir: String,
    },
}

fn run_init(data_dir: String) -> anyhow::Result<()> {
    let data_path: std::path::PathBuf = data_dir.into();
    fs::create_dir_all(&data_path)?;

    let db_path = data_path.join("studyconnect.db");
    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;

    let token_file = data_path.join(".admin_token");

    if store.has_admin_user()? {
        bail!(
            "Server already initialized. Admin token exists at: {}",
            token_file.display()
        );
    }

    let generator = TokenGenerator::new();

    // The admin password is random and printed exactly once; the bearer
    // token is what the CLI and tests actually authenticate with.
    let (_, admin_password, _) = generator.generate()?;
    let now = Utc::now();
    let admin = User {
        id: Uuid::new_v4().to_string(),
        email: ADMIN_EMAIL.to_string(),
        username: ADMIN_USERNAME.to_string(),
        password_hash: generator.hash(&admin_password)?,
        role: Role::Admin,
        points: 0,
        badges: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    store.create_user(&admin)?;

    let (session, raw_token) = create_session(&generator, admin.id)?;
    store.create_session(&session)?;
    fs::write(&token_file, &raw_token)?;

    #[cfg(unix)]
    set_restrictive_permissions(&token_file);

    println!();
    println!("========================================");
    println!("Admin account '{ADMIN_USERNAME}' <{ADMIN_EMAIL}>");
    println!();
    println!("Password (save this, it won't be shown again):");
    println!();
    println!("  {admin_password}");
    println!();
    println!("Admin token (save this, it won't be shown again):");
    println!();
    println!("  {raw_token}");
    println!();
    println!("Token also written to: {}", token_file.display());
    println!("========================================");
    println!();

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("studyconnect=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init { data_dir } => {
                run_init(data_dir)?;
            }
        },
        Commands::Serve {
            host,
            port,
            data_dir,
        } => {
            let config = ServerConfig {
                host,
                port,
                data_dir: data_dir.into(),
            };

            let token_file = config.data_dir.join(".admin_token");
            if !token_file.exists() {
                bail!(
                    "Server not initialized. Run 'studyconnect admin init' first to create the database and admin account."
                );
            }

            let store = SqliteStore::new(config.db_path())?;
            if !store.has_admin_user()? {
                bail!(
                    "Server not initialized. Run 'studyconnect admin init' first to create the database and admin account."
                );
            }

            info!("Admin token available at {}", token_file.display());

            let state = Arc::new(AppState::new(Arc::new(store)));

            let app = create_router(state);
            let addr = config.socket_addr()?;

            info!("Starting server on {}", addr);

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
