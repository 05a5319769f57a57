use super::session::{DockSession, SessionEvent};

use crate::core::settings_registry::CoreSettingsRegistry;
use crate::core::volume_monitor::{MountEvent, MountHandle, VolumeMonitorOperations};
use crate::core::{BookmarksProvider, MountsProvider, Preferences, bookmarks};

use std::fs;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/*
 * Unit tests for `DockSession`. Providers are real (over temp files and a
 * mock volume monitor) so the tests cover the whole marshal-then-reconcile
 * path: an event sent into the session channel, pumped on the test thread,
 * must land in the published dock-item list.
 */

struct MockVolumeMonitor {
    mounts: Mutex<Vec<MountHandle>>,
    subscribers: Mutex<Vec<mpsc::Sender<MountEvent>>>,
}

impl MockVolumeMonitor {
    fn new() -> Self {
        MockVolumeMonitor {
            mounts: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    fn emit(&self, event: MountEvent) {
        for sender in self.subscribers.lock().unwrap().iter() {
            sender.send(event.clone()).unwrap();
        }
    }
}

impl VolumeMonitorOperations for MockVolumeMonitor {
    fn mounts(&self) -> Vec<MountHandle> {
        self.mounts.lock().unwrap().clone()
    }
    fn subscribe(&self, sender: mpsc::Sender<MountEvent>) {
        self.subscribers.lock().unwrap().push(sender);
    }
    fn unmount(&self, _handle: &MountHandle, on_complete: Box<dyn FnOnce(bool) + Send>) {
        on_complete(true);
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

struct SessionFixture {
    _temp_dir: TempDir,
    bookmarks_path: PathBuf,
    monitor: Arc<MockVolumeMonitor>,
    session: DockSession,
    sender: mpsc::Sender<SessionEvent>,
}

fn build_session() -> SessionFixture {
    let temp_dir = TempDir::new().expect("Failed to create temp dir for test");
    let bookmarks_path = temp_dir.path().join("bookmarks");
    fs::write(&bookmarks_path, "").unwrap();

    let registry = Arc::new(CoreSettingsRegistry::in_memory());
    let bookmarks = Arc::new(BookmarksProvider::new(bookmarks_path.clone()));
    let monitor = Arc::new(MockVolumeMonitor::new());
    let mounts = Arc::new(MountsProvider::new(
        monitor.clone(),
        &Preferences::for_owner(registry, "mounts"),
    ));

    let (session, sender) = DockSession::new(bookmarks, mounts);
    SessionFixture {
        _temp_dir: temp_dir,
        bookmarks_path,
        monitor,
        session,
        sender,
    }
}

#[test]
fn test_bookmarks_settled_event_reloads_provider() {
    // Arrange
    let fixture = build_session();
    let dir = fixture._temp_dir.path().join("Music");
    fs::create_dir(&dir).unwrap();
    fs::write(
        &fixture.bookmarks_path,
        format!("{}\n", bookmarks::path_to_file_uri(&dir)),
    )
    .unwrap();

    // Act
    fixture.sender.send(SessionEvent::BookmarksSettled).unwrap();
    let handled = fixture.session.pump_pending();

    // Assert
    assert_eq!(handled, 1);
    let items = fixture.session.dock_items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].display_name(), "Music");
}

#[test]
fn test_mount_events_flow_into_dock_items() {
    let fixture = build_session();

    fixture
        .sender
        .send(SessionEvent::Mount(MountEvent::Added(usb_handle())))
        .unwrap();
    fixture.session.pump_pending();
    assert_eq!(fixture.session.dock_items().len(), 1);

    fixture
        .sender
        .send(SessionEvent::Mount(MountEvent::Removed(
            "/mnt/usb".to_string(),
        )))
        .unwrap();
    fixture.session.pump_pending();
    assert!(fixture.session.dock_items().is_empty());
}

#[test]
fn test_dock_items_lists_bookmarks_before_mounts() {
    let fixture = build_session();
    let dir = fixture._temp_dir.path().join("Projects");
    fs::create_dir(&dir).unwrap();
    fs::write(
        &fixture.bookmarks_path,
        format!("{}\n", bookmarks::path_to_file_uri(&dir)),
    )
    .unwrap();

    fixture.sender.send(SessionEvent::BookmarksSettled).unwrap();
    fixture
        .sender
        .send(SessionEvent::Mount(MountEvent::Added(usb_handle())))
        .unwrap();
    fixture.session.pump_pending();

    let items = fixture.session.dock_items();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].display_name(), "Projects");
    assert_eq!(items[1].key(), "/mnt/usb");
}

#[test]
fn test_attached_monitor_events_are_marshalled_to_session() {
    let fixture = build_session();
    DockSession::attach_volume_monitor(fixture.monitor.as_ref(), fixture.sender.clone());

    fixture.monitor.emit(MountEvent::Added(usb_handle()));

    // The relay thread forwards asynchronously; wait for the event to arrive.
    let mut handled = 0;
    for _ in 0..50 {
        handled += fixture.session.pump_pending();
        if handled > 0 {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
    }
    assert_eq!(handled, 1);
    assert_eq!(fixture.session.dock_items().len(), 1);
}

#[test]
fn test_pump_pending_with_no_events_is_noop() {
    let fixture = build_session();
    assert_eq!(fixture.session.pump_pending(), 0);
    assert!(fixture.session.dock_items().is_empty());
}
