use courier_core::cachekey;
use courier_core::store::SeqUserStore;
use courier_postgres::PgStore;
use log::{info, warn};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const SCAN_BATCH: usize = 100;

#[derive(thiserror::Error, Debug)]
enum ToolError {
    #[error("usage: courier-readseq -c <config-dir>")]
    Usage,
    #[error("config: {0}")]
    Config(String),
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("store: {0}")]
    Store(#[from] courier_core::error::CoreError),
}

#[derive(Deserialize)]
struct ToolConfig {
    redis: RedisSection,
    postgres: PostgresSection,
}

#[derive(Deserialize)]
struct RedisSection {
    url: String,
}

#[derive(Deserialize)]
struct PostgresSection {
    dsn: String,
}

fn load_config(dir: &Path) -> Result<ToolConfig, ToolError> {
    let path = dir.join("courier-pushd.toml");
    let content = std::fs::read_to_string(&path)
        .map_err(|e| ToolError::Config(format!("{}: {}", path.display(), e)))?;
    toml::from_str::<ToolConfig>(&content).map_err(|e| ToolError::Config(e.to_string()))
}

// Key layout: SEQ_USER_READ_SEQ:<conversation>:<user>, value in hash field
// "seq". Everything the cache holds is at least as fresh as the store, so a
// plain overwrite is safe.
fn split_key(key: &str) -> Option<(&str, &str)> {
    let rest = key.strip_prefix(cachekey::SEQ_USER_READ_SEQ)?;
    let (conversation_id, user_id) = rest.rsplit_once(':')?;
    if conversation_id.is_empty() || user_id.is_empty() {
        return None;
    }
    Some((conversation_id, user_id))
}

#[tokio::main]
async fn main() -> Result<(), ToolError> {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
    let argv: Vec<String> = std::env::args().collect();
    let mut dir = PathBuf::from(".");
    let mut i = 1;
    let mut seen_dir = false;
    while i < argv.len() {
        match argv[i].as_str() {
            "-c" | "--config" => {
                i += 1;
                dir = PathBuf::from(argv.get(i).ok_or(ToolError::Usage)?);
                seen_dir = true;
            }
            _ => return Err(ToolError::Usage),
        }
        i += 1;
    }
    if !seen_dir {
        return Err(ToolError::Usage);
    }
    let cfg = load_config(&dir)?;

    let client = redis::Client::open(cfg.redis.url.as_str())?;
    let mut conn = client.get_multiplexed_async_connection().await?;
    let store = PgStore::connect(&cfg.postgres.dsn).await?;
    store.migrate().await?;

    let pattern = format!("{}*", cachekey::SEQ_USER_READ_SEQ);
    let mut cursor: u64 = 0;
    let mut migrated = 0u64;
    loop {
        let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(&pattern)
            .arg("COUNT")
            .arg(SCAN_BATCH)
            .query_async(&mut conn)
            .await?;
        for key in keys {
            let Some((conversation_id, user_id)) = split_key(&key) else {
                warn!("skipping malformed key {}", key);
                continue;
            };
            let seq: Option<i64> = redis::cmd("HGET")
                .arg(&key)
                .arg("seq")
                .query_async(&mut conn)
                .await?;
            let Some(seq) = seq else { continue };
            store.set_read_seq(conversation_id, user_id, seq).await?;
            migrated += 1;
        }
        cursor = next;
        if cursor == 0 {
            break;
        }
    }
    info!("migrated {} read seqs", migrated);
    Ok(())
}
