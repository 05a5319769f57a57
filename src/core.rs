/*
 * This module consolidates the core, platform-agnostic logic of the dock:
 * the dock-item model, the preference store layered over the settings
 * registry (with its secure-credential bridge), the external-list
 * reconciler, and the bookmark/mount providers together with their change
 * sources (file watcher, volume monitor). Each collaborator is exposed
 * through an `…Operations` trait with a `Core…` implementation so the
 * session layer and tests can inject doubles.
 */
pub mod bookmarks;
pub mod file_watcher;
pub mod items;
pub mod mounts;
pub mod path_utils;
pub mod preferences;
pub mod reconciler;
pub mod secure_store;
pub mod settings_registry;
pub mod volume_monitor;

// Re-export the item model
pub use items::{DockItem, ItemKind, ItemSnapshot};

// Re-export preference-store related items
pub use preferences::Preferences;
pub use settings_registry::{
    CoreSettingsRegistry, NotifyId, SettingValue, SettingsRegistryOperations,
};

// Re-export secure-store related items
pub use secure_store::{CoreSecretStore, SecretServiceBridge, SecretStoreOperations};

// Re-export provider related items
pub use bookmarks::{BookmarksProvider, default_bookmarks_file};
pub use file_watcher::watch_debounced;
pub use mounts::MountsProvider;
pub use reconciler::SourceEntry;
pub use volume_monitor::{
    CoreVolumeMonitor, MountEvent, MountHandle, VolumeMonitorOperations,
};
