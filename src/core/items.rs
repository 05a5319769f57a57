use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/*
 * The dock-item data model. Items are identified by a stable key (the
 * bookmark URI, or the mount's root path) so that providers can preserve
 * object identity across reconciliation passes: UI layers hold `Arc<DockItem>`
 * references, and an item that is still present in the external source must
 * remain the same allocation, not a freshly constructed copy.
 */

// A published snapshot of a provider's items. Providers replace the whole
// snapshot in a single assignment so observers never see a half-updated list.
pub type ItemSnapshot = Arc<Vec<Arc<DockItem>>>;

// What kind of entity an item represents. Kept as a tagged variant rather
// than an inheritance-style hierarchy; capabilities that differ per kind
// (menus, drop handling) branch on this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKind {
    Bookmark { uri: String },
    Mount { root: PathBuf, device: String },
}

#[derive(Debug)]
pub struct DockItem {
    key: String,
    display_name: String,
    icon_name: String,
    kind: ItemKind,
    // Set by reconciliation when the external source carries a custom label.
    display_override: Mutex<Option<String>>,
    disposed: AtomicBool,
}

impl DockItem {
    pub fn new(key: String, display_name: String, icon_name: String, kind: ItemKind) -> Self {
        DockItem {
            key,
            display_name,
            icon_name,
            kind,
            display_override: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> &ItemKind {
        &self.kind
    }

    pub fn icon_name(&self) -> &str {
        &self.icon_name
    }

    /// The label to show: the external override if one is set, else the base name.
    pub fn display_name(&self) -> String {
        let override_guard = self.display_override.lock().unwrap_or_else(|e| e.into_inner());
        match override_guard.as_ref() {
            Some(name) => name.clone(),
            None => self.display_name.clone(),
        }
    }

    pub fn set_display_override(&self, name: Option<String>) {
        let mut override_guard = self.display_override.lock().unwrap_or_else(|e| e.into_inner());
        *override_guard = name;
    }

    /*
     * Marks the item disposed. Disposal happens exactly once: the first call
     * returns true, every later call is a no-op returning false. Providers
     * call this for items that vanished from the external source.
     */
    pub fn dispose(&self) -> bool {
        let first = !self.disposed.swap(true, Ordering::SeqCst);
        if first {
            log::debug!("DockItem: Disposed item '{}'", self.key);
        } else {
            log::trace!("DockItem: Ignoring repeated dispose of '{}'", self.key);
        }
        first
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}
