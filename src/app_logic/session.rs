/*
 * `DockSession` is the main-context owner of the dock's item state. All
 * UI-visible mutation happens on the thread pumping the session's event
 * channel; background watchers (the bookmarks file watcher, the volume
 * monitor) only ever send events into that channel, never touch the
 * providers directly. This keeps every published snapshot mutation on one
 * context while the change sources stay free-running.
 */
use crate::core::volume_monitor::{MountEvent, VolumeMonitorOperations};
use crate::core::{BookmarksProvider, DockItem, MountsProvider};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

#[derive(Debug)]
pub enum SessionEvent {
    /// The bookmarks file stopped changing; reload and reconcile.
    BookmarksSettled,
    Mount(MountEvent),
}

pub struct DockSession {
    bookmarks: Arc<BookmarksProvider>,
    mounts: Arc<MountsProvider>,
    events: mpsc::Receiver<SessionEvent>,
}

impl DockSession {
    /*
     * Creates the session and its event channel. The returned sender is what
     * watchers and monitors use to marshal changes onto the session context;
     * the session ends when every sender is dropped.
     */
    pub fn new(
        bookmarks: Arc<BookmarksProvider>,
        mounts: Arc<MountsProvider>,
    ) -> (Self, mpsc::Sender<SessionEvent>) {
        let (sender, events) = mpsc::channel();
        (
            DockSession {
                bookmarks,
                mounts,
                events,
            },
            sender,
        )
    }

    pub fn handle_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::BookmarksSettled => {
                if let Err(e) = self.bookmarks.reload() {
                    log::warn!("DockSession: Bookmarks reload failed: {e}");
                }
            }
            SessionEvent::Mount(mount_event) => self.mounts.handle_event(mount_event),
        }
    }

    /// The combined dock-item list: bookmarks first, then mounts.
    pub fn dock_items(&self) -> Vec<Arc<DockItem>> {
        let mut items: Vec<Arc<DockItem>> = self.bookmarks.items().iter().cloned().collect();
        items.extend(self.mounts.items().iter().cloned());
        items
    }

    /// Drains and handles every queued event without blocking; returns how
    /// many were processed. Used by tests and by callers embedding the
    /// session into an existing loop.
    pub fn pump_pending(&self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Blocks handling events until the last sender is dropped.
    pub fn run(&self) {
        log::info!(
            "DockSession: Running with {} dock items",
            self.dock_items().len()
        );
        for event in self.events.iter() {
            self.handle_event(event);
            log::debug!("DockSession: {} dock items", self.dock_items().len());
        }
        log::info!("DockSession: Event channel closed, session ending");
    }

    /*
     * Subscribes to a volume monitor and forwards its events into the
     * session channel on a small relay thread. The relay ends when either
     * side hangs up.
     */
    pub fn attach_volume_monitor(
        monitor: &dyn VolumeMonitorOperations,
        session_sender: mpsc::Sender<SessionEvent>,
    ) {
        let (mount_sender, mount_events) = mpsc::channel();
        monitor.subscribe(mount_sender);
        let spawn_result = thread::Builder::new()
            .name("docky-mount-relay".to_string())
            .spawn(move || {
                for event in mount_events.iter() {
                    if session_sender.send(SessionEvent::Mount(event)).is_err() {
                        break;
                    }
                }
                log::debug!("DockSession: Mount relay thread exiting");
            });
        if let Err(e) = spawn_result {
            log::error!("DockSession: Failed to spawn mount relay thread: {e}");
        }
    }
}
