/*
 * Reconciliation of an externally-observed entry list against the previous
 * in-memory item list. The external source (a bookmarks file, a set of
 * mounts) can change at any time; after every read the provider calls
 * `reconcile_items` to produce the next published list. Items still present
 * externally keep their exact `Arc` identity so UI-held references survive,
 * items that vanished are disposed, and entries pointing at resources that no
 * longer exist are skipped without touching the source.
 */
use super::items::DockItem;
use std::collections::HashSet;
use std::sync::Arc;

/// One entry as read from the external source: a stable identifier and an
/// optional display label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub key: String,
    pub display_name: Option<String>,
}

impl SourceEntry {
    pub fn new(key: impl Into<String>, display_name: Option<String>) -> Self {
        SourceEntry {
            key: key.into(),
            display_name,
        }
    }
}

/*
 * Merges `entries` into `previous` and returns the next item list.
 *
 * Duplicate keys in the source collapse to the last occurrence (value and
 * position). For each surviving entry: a key match against the previous list
 * reuses that item (same allocation) with its display override refreshed; an
 * unmatched entry is validated first (invalid entries are logged and
 * skipped) and otherwise built fresh via `build`. Previous items that
 * matched nothing are disposed before returning.
 *
 * Running this twice over an unchanged source is a no-op: same identities,
 * same order, nothing disposed.
 */
pub fn reconcile_items(
    previous: &[Arc<DockItem>],
    entries: &[SourceEntry],
    mut is_valid: impl FnMut(&SourceEntry) -> bool,
    mut build: impl FnMut(&SourceEntry) -> DockItem,
) -> Vec<Arc<DockItem>> {
    // Last-seen-wins: walk backwards keeping the first sighting of each key,
    // then restore source order.
    let mut seen_keys: HashSet<&str> = HashSet::new();
    let mut collapsed: Vec<&SourceEntry> = Vec::with_capacity(entries.len());
    for entry in entries.iter().rev() {
        if seen_keys.insert(entry.key.as_str()) {
            collapsed.push(entry);
        }
    }
    collapsed.reverse();

    let mut old_working: Vec<Arc<DockItem>> = previous.to_vec();
    let mut next: Vec<Arc<DockItem>> = Vec::with_capacity(collapsed.len());

    for entry in collapsed {
        if let Some(pos) = old_working.iter().position(|item| item.key() == entry.key) {
            let item = old_working.remove(pos);
            item.set_display_override(entry.display_name.clone());
            next.push(item);
        } else if !is_valid(entry) {
            log::warn!("Reconciler: Skipping stale entry '{}'", entry.key);
        } else {
            let item = Arc::new(build(entry));
            item.set_display_override(entry.display_name.clone());
            log::debug!("Reconciler: Added item '{}'", entry.key);
            next.push(item);
        }
    }

    for leftover in old_working {
        leftover.dispose();
    }

    next
}
