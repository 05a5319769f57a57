/*
 * Push-based mount monitoring. `VolumeMonitorOperations` is the external
 * collaborator surface: a current-mounts snapshot, add/removed events pushed
 * to subscribed channels, and asynchronous unmount with a completion
 * callback. `CoreVolumeMonitor` is the Linux implementation: it polls the
 * kernel mount table, diffs successive snapshots, and emits events on a
 * background thread. Tests substitute a mock monitor.
 */
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

pub const MOUNTS_TABLE_PATH: &str = "/proc/self/mounts";

/// An opaque handle to one mounted volume. The mount root is the stable key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountHandle {
    pub device: String,
    pub root: PathBuf,
    pub display_name: String,
    pub icon_name: String,
}

impl MountHandle {
    pub fn key(&self) -> String {
        self.root.to_string_lossy().into_owned()
    }
}

#[derive(Debug, Clone)]
pub enum MountEvent {
    Added(MountHandle),
    Removed(String),
}

pub trait VolumeMonitorOperations: Send + Sync {
    /// The current set of mounted volumes.
    fn mounts(&self) -> Vec<MountHandle>;
    /// Registers a channel that receives every subsequent add/remove event.
    fn subscribe(&self, sender: mpsc::Sender<MountEvent>);
    /// Unmounts asynchronously; the callback reports success or failure.
    fn unmount(&self, handle: &MountHandle, on_complete: Box<dyn FnOnce(bool) + Send>);
}

/*
 * The kernel mount table escapes whitespace and backslashes in paths as
 * 3-digit octal sequences (`\040` for space). Decode them so mount roots
 * compare equal to real filesystem paths.
 */
fn decode_mount_field(field: &str) -> String {
    fn octal_digit(byte: u8) -> Option<u32> {
        (b'0'..=b'7').contains(&byte).then(|| u32::from(byte - b'0'))
    }

    let bytes = field.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 4 <= bytes.len()
            && let (Some(a), Some(b), Some(c)) = (
                octal_digit(bytes[i + 1]),
                octal_digit(bytes[i + 2]),
                octal_digit(bytes[i + 3]),
            )
        {
            decoded.push((a * 64 + b * 8 + c) as u8);
            i += 4;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

fn icon_for_fstype(fstype: &str) -> &'static str {
    match fstype {
        "iso9660" | "udf" => "media-optical",
        "vfat" | "exfat" | "msdos" => "drive-removable-media",
        _ => "drive-harddisk",
    }
}

/*
 * Parses a mount table in `/proc/self/mounts` format, keeping only entries
 * backed by a block device. Virtual filesystems (proc, sysfs, tmpfs, ...)
 * never reach the provider layer.
 */
fn read_mount_table(table: &Path) -> io::Result<Vec<MountHandle>> {
    let contents = fs::read_to_string(table)?;
    let mut handles = Vec::new();
    for line in contents.lines() {
        let mut fields = line.split_whitespace();
        let (Some(device), Some(mountpoint), Some(fstype)) =
            (fields.next(), fields.next(), fields.next())
        else {
            log::warn!("CoreVolumeMonitor: Malformed mount table line: '{line}'");
            continue;
        };
        if !device.starts_with("/dev/") {
            continue;
        }
        let root = PathBuf::from(decode_mount_field(mountpoint));
        let display_name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "/".to_string());
        handles.push(MountHandle {
            device: decode_mount_field(device),
            root,
            display_name,
            icon_name: icon_for_fstype(fstype).to_string(),
        });
    }
    Ok(handles)
}

struct MonitorShared {
    table_path: PathBuf,
    known: Mutex<Vec<MountHandle>>,
    subscribers: Mutex<Vec<mpsc::Sender<MountEvent>>>,
}

impl MonitorShared {
    fn broadcast(&self, event: &MountEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        // Drop subscribers whose receiving end is gone.
        subscribers.retain(|sender| sender.send(event.clone()).is_ok());
    }

    /// Diffs the freshly-read table against the known set and pushes events.
    fn poll_once(&self) {
        let current = match read_mount_table(&self.table_path) {
            Ok(current) => current,
            Err(e) => {
                log::warn!(
                    "CoreVolumeMonitor: Failed to read mount table {:?}: {e}",
                    self.table_path
                );
                return;
            }
        };

        let previous = {
            let mut known = self.known.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *known, current.clone())
        };

        for handle in &current {
            if !previous.iter().any(|p| p.root == handle.root) {
                log::debug!("CoreVolumeMonitor: Mount added at {:?}", handle.root);
                self.broadcast(&MountEvent::Added(handle.clone()));
            }
        }
        for handle in &previous {
            if !current.iter().any(|c| c.root == handle.root) {
                log::debug!("CoreVolumeMonitor: Mount removed at {:?}", handle.root);
                self.broadcast(&MountEvent::Removed(handle.key()));
            }
        }
    }
}

pub struct CoreVolumeMonitor {
    shared: Arc<MonitorShared>,
    stop: Arc<AtomicBool>,
}

impl CoreVolumeMonitor {
    pub fn new(poll_interval: Duration) -> Self {
        Self::with_mounts_table(PathBuf::from(MOUNTS_TABLE_PATH), poll_interval)
    }

    /// Monitors an arbitrary mounts-format file; tests point this at fixtures.
    pub fn with_mounts_table(table_path: PathBuf, poll_interval: Duration) -> Self {
        let initial = read_mount_table(&table_path).unwrap_or_else(|e| {
            log::warn!("CoreVolumeMonitor: Initial mount table read failed: {e}");
            Vec::new()
        });
        log::debug!(
            "CoreVolumeMonitor: Starting with {} mounts from {table_path:?}",
            initial.len()
        );

        let shared = Arc::new(MonitorShared {
            table_path,
            known: Mutex::new(initial),
            subscribers: Mutex::new(Vec::new()),
        });
        let stop = Arc::new(AtomicBool::new(false));

        let poll_shared = shared.clone();
        let poll_stop = stop.clone();
        let spawn_result = thread::Builder::new()
            .name("docky-volume-monitor".to_string())
            .spawn(move || {
                const SLICE: Duration = Duration::from_millis(100);
                while !poll_stop.load(Ordering::SeqCst) {
                    let mut slept = Duration::ZERO;
                    while slept < poll_interval && !poll_stop.load(Ordering::SeqCst) {
                        let step = SLICE.min(poll_interval - slept);
                        thread::sleep(step);
                        slept += step;
                    }
                    if poll_stop.load(Ordering::SeqCst) {
                        break;
                    }
                    poll_shared.poll_once();
                }
                log::debug!("CoreVolumeMonitor: Poll thread exiting");
            });
        if let Err(e) = spawn_result {
            log::error!("CoreVolumeMonitor: Failed to spawn poll thread: {e}");
        }

        CoreVolumeMonitor { shared, stop }
    }
}

impl Drop for CoreVolumeMonitor {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

impl VolumeMonitorOperations for CoreVolumeMonitor {
    fn mounts(&self) -> Vec<MountHandle> {
        self.shared
            .known
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn subscribe(&self, sender: mpsc::Sender<MountEvent>) {
        self.shared
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(sender);
    }

    /*
     * Unmounting blocks on the umount binary, so it runs on a one-shot worker
     * thread and reports the outcome through the completion callback.
     */
    fn unmount(&self, handle: &MountHandle, on_complete: Box<dyn FnOnce(bool) + Send>) {
        let root = handle.root.clone();
        let spawn_result = thread::Builder::new()
            .name("docky-unmount".to_string())
            .spawn(move || {
                let succeeded = match Command::new("umount").arg(&root).status() {
                    Ok(status) => status.success(),
                    Err(e) => {
                        log::warn!("CoreVolumeMonitor: Failed to run umount for {root:?}: {e}");
                        false
                    }
                };
                if !succeeded {
                    log::warn!("CoreVolumeMonitor: Unmount of {root:?} failed");
                }
                on_complete(succeeded);
            });
        if let Err(e) = spawn_result {
            log::error!("CoreVolumeMonitor: Failed to spawn unmount thread: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_decode_mount_field_octal_escapes() {
        assert_eq!(decode_mount_field("/mnt/usb\\040drive"), "/mnt/usb drive");
        assert_eq!(decode_mount_field("/plain/path"), "/plain/path");
        assert_eq!(decode_mount_field("a\\134b"), "a\\b");
        // A trailing backslash without digits is passed through.
        assert_eq!(decode_mount_field("odd\\"), "odd\\");
    }

    #[test]
    fn test_read_mount_table_keeps_only_block_devices() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir for test");
        let table = temp_dir.path().join("mounts");
        fs::write(
            &table,
            "proc /proc proc rw 0 0\n\
             /dev/sda2 / ext4 rw 0 0\n\
             tmpfs /run tmpfs rw 0 0\n\
             /dev/sdb1 /mnt/usb\\040drive vfat rw 0 0\n",
        )
        .unwrap();

        let handles = read_mount_table(&table).unwrap();
        assert_eq!(handles.len(), 2);
        assert_eq!(handles[0].root, PathBuf::from("/"));
        assert_eq!(handles[0].display_name, "/");
        assert_eq!(handles[0].icon_name, "drive-harddisk");
        assert_eq!(handles[1].root, PathBuf::from("/mnt/usb drive"));
        assert_eq!(handles[1].icon_name, "drive-removable-media");
    }

    #[test]
    fn test_poll_emits_added_and_removed_events() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir for test");
        let table = temp_dir.path().join("mounts");
        fs::write(&table, "/dev/sda2 / ext4 rw 0 0\n").unwrap();

        let monitor = CoreVolumeMonitor::with_mounts_table(table.clone(), Duration::from_millis(50));
        let (tx, rx) = mpsc::channel();
        monitor.subscribe(tx);

        // A new line in the table shows up as an Added event.
        fs::write(
            &table,
            "/dev/sda2 / ext4 rw 0 0\n/dev/sdb1 /mnt/usb vfat rw 0 0\n",
        )
        .unwrap();
        match rx.recv_timeout(Duration::from_secs(5)) {
            Ok(MountEvent::Added(handle)) => assert_eq!(handle.root, PathBuf::from("/mnt/usb")),
            other => panic!("Expected Added event, got {other:?}"),
        }

        // Dropping the line again shows up as Removed.
        fs::write(&table, "/dev/sda2 / ext4 rw 0 0\n").unwrap();
        match rx.recv_timeout(Duration::from_secs(5)) {
            Ok(MountEvent::Removed(key)) => assert_eq!(key, "/mnt/usb"),
            other => panic!("Expected Removed event, got {other:?}"),
        }
    }
}
