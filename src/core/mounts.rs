/*
 * The mounts provider. Unlike bookmarks, reconciliation here is event-driven:
 * the volume monitor pushes add/remove events and the provider applies them
 * to its published snapshot, under the same rules as the list reconciler:
 * a mount that is already represented keeps its item identity, a vanished
 * mount's item is disposed, and every snapshot replacement is a single
 * assignment.
 *
 * Transient and virtual mounts (the trash mount, pseudo-filesystem roots) are
 * filtered by a suppression predicate before insertion. The patterns come
 * from the provider's preferences so users can extend the list.
 */
use super::items::{DockItem, ItemKind, ItemSnapshot};
use super::preferences::Preferences;
use super::volume_monitor::{MountEvent, MountHandle, VolumeMonitorOperations};
use glob::Pattern;
use std::sync::{Arc, RwLock};

/// Preference key holding the `;`-separated suppression patterns.
pub const SUPPRESSED_MOUNTS_KEY: &str = "suppressed_mounts";

/// Matched against both the mount root and the device path.
pub const DEFAULT_SUPPRESSED_MOUNTS: &str = "*/.Trash*;/boot*;/var/snap/*";

pub fn parse_suppress_patterns(raw: &str) -> Vec<Pattern> {
    raw.split(';')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .filter_map(|p| match Pattern::new(p) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                log::warn!("MountsProvider: Ignoring invalid suppression pattern '{p}': {e}");
                None
            }
        })
        .collect()
}

pub struct MountsProvider {
    monitor: Arc<dyn VolumeMonitorOperations>,
    items: RwLock<ItemSnapshot>,
    suppress_patterns: Vec<Pattern>,
}

impl MountsProvider {
    /*
     * Creates the provider. The suppression pattern list is read from the
     * owner's preferences, auto-created with the defaults on first use.
     */
    pub fn new(monitor: Arc<dyn VolumeMonitorOperations>, preferences: &Preferences) -> Self {
        let raw = preferences.get_string(SUPPRESSED_MOUNTS_KEY, DEFAULT_SUPPRESSED_MOUNTS);
        MountsProvider {
            monitor,
            items: RwLock::new(Arc::new(Vec::new())),
            suppress_patterns: parse_suppress_patterns(&raw),
        }
    }

    pub fn items(&self) -> ItemSnapshot {
        self.items.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn is_suppressed(&self, handle: &MountHandle) -> bool {
        let root = handle.root.to_string_lossy();
        self.suppress_patterns
            .iter()
            .any(|pattern| pattern.matches(&root) || pattern.matches(&handle.device))
    }

    fn build_item(handle: &MountHandle) -> DockItem {
        DockItem::new(
            handle.key(),
            handle.display_name.clone(),
            handle.icon_name.clone(),
            ItemKind::Mount {
                root: handle.root.clone(),
                device: handle.device.clone(),
            },
        )
    }

    /*
     * Seeds the item list from the monitor's current snapshot. Priming twice
     * behaves like a reconciliation pass: mounts still present keep their
     * items, mounts that disappeared between calls are disposed.
     */
    pub fn prime(&self) {
        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
        let previous = items.clone();
        let mut next: Vec<Arc<DockItem>> = Vec::new();

        for handle in self.monitor.mounts() {
            if self.is_suppressed(&handle) {
                log::debug!("MountsProvider: Suppressing mount at {:?}", handle.root);
                continue;
            }
            let key = handle.key();
            match previous.iter().find(|item| item.key() == key) {
                Some(existing) => next.push(existing.clone()),
                None => next.push(Arc::new(Self::build_item(&handle))),
            }
        }

        for old in previous.iter() {
            if !next.iter().any(|item| item.key() == old.key()) {
                old.dispose();
            }
        }

        log::debug!("MountsProvider: Primed with {} mounts", next.len());
        *items = Arc::new(next);
    }

    pub fn handle_event(&self, event: MountEvent) {
        match event {
            MountEvent::Added(handle) => self.on_added(handle),
            MountEvent::Removed(key) => self.on_removed(&key),
        }
    }

    fn on_added(&self, handle: MountHandle) {
        if self.is_suppressed(&handle) {
            log::debug!("MountsProvider: Suppressing mount at {:?}", handle.root);
            return;
        }
        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
        let key = handle.key();
        if items.iter().any(|item| item.key() == key) {
            log::trace!("MountsProvider: Mount at '{key}' already present, keeping item");
            return;
        }
        let mut next: Vec<Arc<DockItem>> = items.iter().cloned().collect();
        next.push(Arc::new(Self::build_item(&handle)));
        log::debug!("MountsProvider: Added mount item '{key}'");
        *items = Arc::new(next);
    }

    fn on_removed(&self, key: &str) {
        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
        let Some(removed) = items.iter().find(|item| item.key() == key).cloned() else {
            log::trace!("MountsProvider: Remove event for unknown mount '{key}'");
            return;
        };
        let next: Vec<Arc<DockItem>> = items
            .iter()
            .filter(|item| item.key() != key)
            .cloned()
            .collect();
        *items = Arc::new(next);
        removed.dispose();
        log::debug!("MountsProvider: Removed mount item '{key}'");
    }

    /*
     * Requests an unmount of the volume behind the item with `key`. The
     * operation completes asynchronously through the callback; an unknown key
     * completes immediately with failure.
     */
    pub fn unmount(&self, key: &str, on_complete: Box<dyn FnOnce(bool) + Send>) {
        let handle = self
            .monitor
            .mounts()
            .into_iter()
            .find(|handle| handle.key() == key);
        match handle {
            Some(handle) => self.monitor.unmount(&handle, on_complete),
            None => {
                log::warn!("MountsProvider: Unmount requested for unknown mount '{key}'");
                on_complete(false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::settings_registry::CoreSettingsRegistry;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::mpsc;

    struct MockVolumeMonitor {
        mounts: Mutex<Vec<MountHandle>>,
        unmount_calls: Mutex<Vec<String>>,
        unmount_result: bool,
    }

    impl MockVolumeMonitor {
        fn new(mounts: Vec<MountHandle>) -> Self {
            MockVolumeMonitor {
                mounts: Mutex::new(mounts),
                unmount_calls: Mutex::new(Vec::new()),
                unmount_result: true,
            }
        }

        fn set_mounts(&self, mounts: Vec<MountHandle>) {
            *self.mounts.lock().unwrap() = mounts;
        }
    }

    impl VolumeMonitorOperations for MockVolumeMonitor {
        fn mounts(&self) -> Vec<MountHandle> {
            self.mounts.lock().unwrap().clone()
        }
        fn subscribe(&self, _sender: mpsc::Sender<MountEvent>) {}
        fn unmount(&self, handle: &MountHandle, on_complete: Box<dyn FnOnce(bool) + Send>) {
            self.unmount_calls.lock().unwrap().push(handle.key());
            on_complete(self.unmount_result);
        }
    }

    fn usb_handle() -> MountHandle {
        MountHandle {
            device: "/dev/sdb1".to_string(),
            root: PathBuf::from("/mnt/usb"),
            display_name: "usb".to_string(),
            icon_name: "drive-removable-media".to_string(),
        }
    }

    fn trash_handle() -> MountHandle {
        MountHandle {
            device: "/dev/sdb1".to_string(),
            root: PathBuf::from("/home/user/.Trash-1000"),
            display_name: ".Trash-1000".to_string(),
            icon_name: "drive-harddisk".to_string(),
        }
    }

    fn preferences() -> Preferences {
        Preferences::for_owner(Arc::new(CoreSettingsRegistry::in_memory()), "mounts")
    }

    #[test]
    fn test_prime_seeds_items_and_suppresses_trash() {
        let monitor = Arc::new(MockVolumeMonitor::new(vec![usb_handle(), trash_handle()]));
        let provider = MountsProvider::new(monitor, &preferences());

        provider.prime();

        let items = provider.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].key(), "/mnt/usb");
    }

    #[test]
    fn test_prime_twice_preserves_identity_and_disposes_gone_mounts() {
        let monitor = Arc::new(MockVolumeMonitor::new(vec![usb_handle()]));
        let provider = MountsProvider::new(monitor.clone(), &preferences());

        provider.prime();
        let before = provider.items()[0].clone();

        provider.prime();
        let after = provider.items()[0].clone();
        assert!(Arc::ptr_eq(&before, &after));

        monitor.set_mounts(Vec::new());
        provider.prime();
        assert!(provider.items().is_empty());
        assert!(before.is_disposed());
    }

    #[test]
    fn test_added_and_removed_events_update_snapshot() {
        let monitor = Arc::new(MockVolumeMonitor::new(Vec::new()));
        let provider = MountsProvider::new(monitor, &preferences());

        provider.handle_event(MountEvent::Added(usb_handle()));
        let items = provider.items();
        assert_eq!(items.len(), 1);
        let item = items[0].clone();

        // A repeated Added for the same root keeps the existing item.
        provider.handle_event(MountEvent::Added(usb_handle()));
        assert_eq!(provider.items().len(), 1);
        assert!(Arc::ptr_eq(&provider.items()[0], &item));

        provider.handle_event(MountEvent::Removed("/mnt/usb".to_string()));
        assert!(provider.items().is_empty());
        assert!(item.is_disposed());
    }

    #[test]
    fn test_added_event_for_suppressed_mount_is_dropped() {
        let monitor = Arc::new(MockVolumeMonitor::new(Vec::new()));
        let provider = MountsProvider::new(monitor, &preferences());

        provider.handle_event(MountEvent::Added(trash_handle()));
        assert!(provider.items().is_empty());
    }

    #[test]
    fn test_suppression_patterns_come_from_preferences() {
        let prefs = preferences();
        prefs.set_string(SUPPRESSED_MOUNTS_KEY, "/mnt/usb");

        let monitor = Arc::new(MockVolumeMonitor::new(vec![usb_handle()]));
        let provider = MountsProvider::new(monitor, &prefs);
        provider.prime();
        assert!(provider.items().is_empty());
    }

    #[test]
    fn test_unmount_delegates_to_monitor() {
        let monitor = Arc::new(MockVolumeMonitor::new(vec![usb_handle()]));
        let provider = MountsProvider::new(monitor.clone(), &preferences());
        provider.prime();

        let (tx, rx) = mpsc::channel();
        provider.unmount("/mnt/usb", Box::new(move |ok| tx.send(ok).unwrap()));
        assert_eq!(rx.recv().unwrap(), true);
        assert_eq!(*monitor.unmount_calls.lock().unwrap(), vec!["/mnt/usb"]);
    }

    #[test]
    fn test_unmount_unknown_key_completes_with_failure() {
        let monitor = Arc::new(MockVolumeMonitor::new(Vec::new()));
        let provider = MountsProvider::new(monitor, &preferences());

        let (tx, rx) = mpsc::channel();
        provider.unmount("/mnt/ghost", Box::new(move |ok| tx.send(ok).unwrap()));
        assert_eq!(rx.recv().unwrap(), false);
    }

    #[test]
    fn test_parse_suppress_patterns_skips_invalid() {
        let patterns = parse_suppress_patterns("*/.Trash*; ; /boot*;[invalid");
        assert_eq!(patterns.len(), 2);
    }
}
