/*
 * Utility functions for resolving the directories Docky stores state in:
 * the per-user application configuration directory (settings registry file)
 * and the user's home directory (default bookmarks location).
 */
use directories::{BaseDirs, ProjectDirs};
use std::fs;
use std::path::PathBuf;

/*
 * Retrieves Docky's local configuration directory for the given application
 * name, creating it if it does not exist yet. Returns `None` when the
 * platform directory cannot be determined or created; callers fall back to
 * in-memory-only operation in that case.
 */
pub fn get_app_config_local_dir(app_name: &str) -> Option<PathBuf> {
    log::trace!("PathUtils: Resolving config local dir for '{app_name}'");
    ProjectDirs::from("", "", app_name).and_then(|proj_dirs| {
        let config_path = proj_dirs.config_local_dir();
        if !config_path.exists() {
            if let Err(e) = fs::create_dir_all(config_path) {
                log::error!("PathUtils: Failed to create config directory {config_path:?}: {e}");
                return None;
            }
            log::debug!("PathUtils: Created config directory: {config_path:?}");
        }
        Some(config_path.to_path_buf())
    })
}

/// The user's home directory, if the platform can report one.
pub fn home_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}
