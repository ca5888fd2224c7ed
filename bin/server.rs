use clap::{Arg, Command};
use csv_upload::config::{ServerConfig, DEFAULT_MONGO_DB, DEFAULT_UPLOAD_DIR};
use csv_upload::http::{create_router, serve, AppState};
use csv_upload::store::RecordStore;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("server")
        .about("CSV upload service")
        .arg(
            Arg::new("port")
                .long("port")
                .env("PORT")
                .help("Listen port [default: 3001]")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("bind")
                .long("bind")
                .env("BIND_ADDR")
                .help("Listen address [default: 0.0.0.0]")
                .value_parser(clap::value_parser!(IpAddr)),
        )
        .arg(
            Arg::new("upload-dir")
                .long("upload-dir")
                .env("UPLOAD_DIR")
                .default_value(DEFAULT_UPLOAD_DIR)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("max-upload-bytes")
                .long("max-upload-bytes")
                .env("MAX_UPLOAD_BYTES")
                .help("Upload request body ceiling [default: 10 MiB]")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("mongo-uri")
                .long("mongo-uri")
                .env("MONGO_URI")
                .help("MongoDB connection string (feature: mongo); in-memory store when absent"),
        )
        .arg(
            Arg::new("mongo-db")
                .long("mongo-db")
                .env("MONGO_DB")
                .default_value(DEFAULT_MONGO_DB),
        )
        .get_matches();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("csv_upload=info,server=info,tower_http=info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let defaults = ServerConfig::default();
    let config = ServerConfig {
        bind: matches.get_one::<IpAddr>("bind").copied().unwrap_or(defaults.bind),
        port: matches.get_one::<u16>("port").copied().unwrap_or(defaults.port),
        upload_dir: matches
            .get_one::<PathBuf>("upload-dir")
            .cloned()
            .unwrap_or(defaults.upload_dir),
        max_upload_bytes: matches
            .get_one::<usize>("max-upload-bytes")
            .copied()
            .unwrap_or(defaults.max_upload_bytes),
        mongo_uri: matches.get_one::<String>("mongo-uri").cloned(),
        mongo_db: matches
            .get_one::<String>("mongo-db")
            .cloned()
            .unwrap_or(defaults.mongo_db),
    };

    tokio::fs::create_dir_all(&config.upload_dir).await?;
    let store = open_store(&config).await?;

    let state = AppState {
        store,
        upload_dir: config.upload_dir.clone(),
        max_upload_bytes: config.max_upload_bytes,
    };
    serve(create_router(state), config.socket_addr()).await?;
    Ok(())
}

#[cfg(feature = "mongo")]
async fn open_store(config: &ServerConfig) -> anyhow::Result<Arc<dyn RecordStore>> {
    match &config.mongo_uri {
        Some(uri) => Ok(Arc::new(
            csv_upload::store::MongoStore::connect(uri, &config.mongo_db).await?,
        )),
        None => {
            tracing::warn!("no MONGO_URI configured; records are kept in memory only");
            Ok(Arc::new(csv_upload::MemoryStore::new()))
        }
    }
}

#[cfg(not(feature = "mongo"))]
async fn open_store(config: &ServerConfig) -> anyhow::Result<Arc<dyn RecordStore>> {
    if config.mongo_uri.is_some() {
        anyhow::bail!("MONGO_URI is set but this build lacks the `mongo` feature");
    }
    tracing::warn!("built without the `mongo` feature; records are kept in memory only");
    Ok(Arc::new(csv_upload::MemoryStore::new()))
}
