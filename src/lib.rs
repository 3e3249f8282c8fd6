// Video-on-mesh demo player
// Main library entry point

pub mod app;
pub mod config;
pub mod material;
pub mod player;
pub mod scene;

use once_cell::sync::OnceCell;

/// Set once GStreamer initialized successfully.
static GST_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Initializes GStreamer. Safe to call more than once; only the first
/// call does work.
pub fn init_media() -> anyhow::Result<()> {
    GST_INITIALIZED.get_or_try_init(|| {
        gstreamer::init().map_err(|e| anyhow::anyhow!("Failed to initialize GStreamer: {}", e))
    })?;
    Ok(())
}
