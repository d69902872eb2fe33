use fern::colors::{Color, ColoredLevelConfig};
use log::{info, LevelFilter};
use minigallery_lib::api;
use minigallery_lib::config::{get_or_create_storage_root, Config};
use minigallery_lib::storage::StorageConfig;
use minigallery_lib::Gallery;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    setup_logger(config.log_level)?;
    info!("{:?}", &config);

    let root = get_or_create_storage_root(&config.storage.root)?;
    let gallery = Gallery::new(StorageConfig::new(root));
    api::serve(gallery, config.api).await?;
    Ok(())
}

fn setup_logger(level: LevelFilter) -> anyhow::Result<()> {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue)
        .trace(Color::BrightBlack);
    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} {} [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .level(level)
        .level_for("hyper", LevelFilter::Warn)
        .chain(std::io::stdout())
        .apply()?;
    Ok(())
}
