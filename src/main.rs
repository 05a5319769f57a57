// src/main.rs

mod app_logic;
mod core;

use crate::app_logic::{DockSession, SessionEvent};
use crate::core::{
    BookmarksProvider, CoreSettingsRegistry, CoreVolumeMonitor, MountsProvider, Preferences,
    SettingsRegistryOperations, default_bookmarks_file, path_utils, watch_debounced,
};
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use time::macros::format_description;

const APP_NAME: &str = "docky";
const SETTINGS_FILENAME: &str = "settings.json";

/// How long the bookmarks file must stay quiet before a reload.
const BOOKMARKS_SETTLE: Duration = Duration::from_millis(500);
const MOUNT_POLL_INTERVAL: Duration = Duration::from_secs(2);

fn init_logging() {
    let config = ConfigBuilder::new()
        .set_time_format_custom(format_description!(
            "[hour]:[minute]:[second].[subsecond digits:3]"
        ))
        .build();
    if let Err(e) = TermLogger::init(
        LevelFilter::Debug,
        config,
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ) {
        eprintln!("Failed to initialize logger: {e}");
    }
}

fn main() {
    init_logging();
    log::info!("Docky starting");

    let settings_path =
        path_utils::get_app_config_local_dir(APP_NAME).map(|dir| dir.join(SETTINGS_FILENAME));
    if settings_path.is_none() {
        log::warn!("No config directory available, settings will not persist");
    }
    let registry: Arc<dyn SettingsRegistryOperations> =
        Arc::new(CoreSettingsRegistry::new(settings_path));

    let bookmarks_path = default_bookmarks_file().unwrap_or_else(|| PathBuf::from("bookmarks"));
    let bookmarks = Arc::new(BookmarksProvider::new(bookmarks_path.clone()));
    if let Err(e) = bookmarks.reload() {
        log::warn!("Initial bookmarks load failed: {e}");
    }

    let monitor = Arc::new(CoreVolumeMonitor::new(MOUNT_POLL_INTERVAL));
    let mounts_preferences = Preferences::for_owner(registry.clone(), "mounts");
    let mounts = Arc::new(MountsProvider::new(monitor.clone(), &mounts_preferences));
    mounts.prime();

    let (session, events) = DockSession::new(bookmarks, mounts);

    // The watcher callback and the mount relay both marshal onto the session
    // channel; the session thread is the only place item state changes.
    let watcher_events = events.clone();
    let _watcher = match watch_debounced(&bookmarks_path, BOOKMARKS_SETTLE, move || {
        let _ = watcher_events.send(SessionEvent::BookmarksSettled);
    }) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            log::warn!("Bookmarks watcher unavailable: {e}");
            None
        }
    };
    DockSession::attach_volume_monitor(monitor.as_ref(), events);

    session.run();
    log::info!("Docky exiting");
}
