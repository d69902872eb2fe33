use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use clap::Parser;
use log::{info, LevelFilter};
use crate::storage::StorageConfig;

pub const DEFAULT_LISTEN_ADDR: &str = "[::]:1698";

#[derive(Parser, Debug)]
#[command(name = "minigallery", about = "Media gallery storage engine with an HTTP front end")]
pub struct FlatConfig {
    #[arg(long, env = "GALLERY_STORAGE_PATH", help = "Directory holding one folder per user [default: ~/.minigallery]")]
    storage_path: Option<PathBuf>,

    #[arg(long, env = "GALLERY_LISTEN_ADDR", default_value = DEFAULT_LISTEN_ADDR, help = "Address the HTTP API binds to")]
    listen_addr: SocketAddr,

    #[arg(long, env = "GALLERY_LOG_LEVEL", default_value = "info", help = "off, error, warn, info, debug or trace")]
    log_level: LevelFilter,
}

#[derive(Debug)]
pub struct Config {
    pub storage: StorageConfig,
    pub api: ApiConfiguration,
    pub log_level: LevelFilter, // GALLERY_LOG_LEVEL
}

#[derive(Debug, Clone)]
pub struct ApiConfiguration {
    pub listen_addr: SocketAddr, // GALLERY_LISTEN_ADDR
}

impl From<FlatConfig> for Config {
    fn from(value: FlatConfig) -> Self {
        let root = value.storage_path.unwrap_or_else(default_storage_path);
        Config {
            storage: StorageConfig::new(root),
            api: ApiConfiguration {
                listen_addr: value.listen_addr,
            },
            log_level: value.log_level,
        }
    }
}

impl Config {
    pub fn parse() -> Self {
        FlatConfig::parse().into()
    }
}

fn default_storage_path() -> PathBuf {
    home::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".minigallery")
}

/// Makes sure the storage root exists and is a directory, returning its canonical path.
pub fn get_or_create_storage_root(root: &Path) -> anyhow::Result<PathBuf> {
    info!("storage root: {}", root.display());
    if !root.exists() {
        std::fs::create_dir_all(root)?;
    }
    if !root.is_dir() {
        anyhow::bail!("storage root {} is not a directory", root.display());
    }
    Ok(root.canonicalize()?)
}
