use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use livesync_server::sessions::save_dirty_sessions;
use livesync_server::state::AppState;
use livesync_server::storage::{FileStorage, S3Storage, S3StorageConfig, Storage};
use tracing::{error, info};

#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,
    #[arg(long)]
    session_dir: Option<PathBuf>,
    #[arg(long)]
    public_dir: Option<PathBuf>,
    /// Enable debug logging (RUST_LOG wins when set)
    #[arg(short, long)]
    verbose: bool,
    #[arg(long, env = "LIVESYNC_TLS_CERT", requires = "tls_key")]
    tls_cert: Option<PathBuf>,
    #[arg(long, env = "LIVESYNC_TLS_KEY", requires = "tls_cert")]
    tls_key: Option<PathBuf>,
    /// Store sessions in this S3 bucket instead of the session dir
    #[arg(long, env = "LIVESYNC_S3_BUCKET")]
    s3_bucket: Option<String>,
    #[arg(long, env = "LIVESYNC_S3_PREFIX")]
    s3_prefix: Option<String>,
    #[arg(long, env = "LIVESYNC_S3_REGION")]
    s3_region: Option<String>,
    #[arg(long, env = "LIVESYNC_S3_ENDPOINT_URL")]
    s3_endpoint_url: Option<String>,
    #[arg(long, env = "LIVESYNC_S3_FORCE_PATH_STYLE")]
    s3_force_path_style: bool,
    #[arg(long, env = "LIVESYNC_S3_ACCESS_KEY_ID")]
    s3_access_key_id: Option<String>,
    #[arg(long, env = "LIVESYNC_S3_SECRET_ACCESS_KEY")]
    s3_secret_access_key: Option<String>,
}

async fn build_storage(args: &Args) -> Arc<dyn Storage> {
    if let Some(bucket) = args.s3_bucket.clone() {
        info!(bucket = %bucket, "Using S3 session storage");
        let mut config = S3StorageConfig::new(bucket);
        config.prefix = args.s3_prefix.clone();
        config.region = args.s3_region.clone();
        config.endpoint_url = args.s3_endpoint_url.clone();
        config.force_path_style = args.s3_force_path_style;
        config.access_key_id = args.s3_access_key_id.clone();
        config.secret_access_key = args.s3_secret_access_key.clone();
        return Arc::new(S3Storage::new(config).await);
    }
    let session_dir = args
        .session_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../sessions"));
    if let Err(error) = tokio::fs::create_dir_all(&session_dir).await {
        error!(%error, path = %session_dir.display(), "Failed to create session dir");
    }
    info!(path = %session_dir.display(), "Using file session storage");
    Arc::new(FileStorage::new(session_dir))
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let storage = build_storage(&args).await;
    let public_dir = args
        .public_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../public"));
    let state = AppState::new(storage, public_dir.join("index.html"));
    let backup_state = state.clone();
    let app = livesync_server::router(state, public_dir);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            save_dirty_sessions(&backup_state).await;
        }
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));

    if let (Some(cert), Some(key)) = (&args.tls_cert, &args.tls_key) {
        let tls = match RustlsConfig::from_pem_file(cert, key).await {
            Ok(tls) => tls,
            Err(error) => {
                error!(%error, "Failed to load TLS certificate");
                std::process::exit(1);
            }
        };
        info!("LiveSync running at https://localhost:{}", args.port);
        if let Err(error) = axum_server::bind_rustls(addr, tls)
            .serve(app.into_make_service())
            .await
        {
            error!(%error, "Server crashed");
        }
        return;
    }

    info!("LiveSync running at http://localhost:{}", args.port);
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(error) => {
            error!(%error, %addr, "Failed to bind server");
            std::process::exit(1);
        }
    };
    if let Err(error) = axum::serve(listener, app).await {
        error!(%error, "Server crashed");
    }
}
