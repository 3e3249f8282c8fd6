// vidmesh - plays video streams onto rotatable 3D meshes

use anyhow::Context;

use vidmesh::app::App;
use vidmesh::config::{AppConfig, ObjectConfig};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    vidmesh::init_media()?;

    let config_path = AppConfig::default_path().context("Failed to resolve config path")?;
    let mut config = match AppConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("Could not load configuration: {}", e);
            AppConfig::default()
        }
    };

    // A URL on the command line plays that stream on a single default
    // object instead of whatever the config file describes.
    if let Some(url) = std::env::args().nth(1) {
        config.objects = vec![ObjectConfig {
            url,
            ..ObjectConfig::default()
        }];
    }

    if config.objects.is_empty() {
        log::warn!("No video objects configured, pass a URL or edit {}", config_path.display());
    }

    App::run(config_path, config)
}
