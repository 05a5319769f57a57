/*
 * Debounced file-change notification for the bookmarks file. Raw watcher
 * events arrive for every intermediate write an editor makes; providers only
 * want one "changes settled" signal once the file has been quiet for a settle
 * period. Events are captured by a `notify` watcher on the file's parent
 * directory and fed to a debounce thread that fires the callback after the
 * quiet period elapses.
 *
 * Dropping the returned `FileWatcher` unregisters the watch; the debounce
 * thread notices the disconnected channel and exits.
 */
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

// While no change is pending there is nothing to time out on; wake rarely
// just to re-check for disconnection.
const IDLE_WAIT: Duration = Duration::from_secs(3600);

pub struct FileWatcher {
    // Held for its Drop: deregisters the OS watch and closes the event
    // channel, which stops the debounce thread.
    _watcher: RecommendedWatcher,
}

/*
 * Watches `path` and invokes `on_settled` once per burst of changes, after
 * `settle` has elapsed without further events. The parent directory is
 * watched (non-recursively) rather than the file itself so the
 * rename-over-the-original rewrite sequence is observed as a change too.
 */
pub fn watch_debounced(
    path: &Path,
    settle: Duration,
    on_settled: impl Fn() + Send + 'static,
) -> notify::Result<FileWatcher> {
    let target: PathBuf = path.to_path_buf();
    let watch_dir = target
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let (event_tx, event_rx) = mpsc::channel::<notify::Result<Event>>();
    let mut watcher = notify::recommended_watcher(move |result| {
        let _ = event_tx.send(result);
    })?;
    watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;
    log::debug!("FileWatcher: Watching {watch_dir:?} for changes to {target:?}");

    let debounce_target = target.clone();
    thread::Builder::new()
        .name("docky-file-watch".to_string())
        .spawn(move || {
            let mut pending = false;
            loop {
                let wait = if pending { settle } else { IDLE_WAIT };
                match event_rx.recv_timeout(wait) {
                    Ok(Ok(event)) => {
                        if event.paths.is_empty()
                            || event.paths.iter().any(|p| p == &debounce_target)
                        {
                            pending = true;
                        }
                    }
                    Ok(Err(e)) => {
                        log::warn!("FileWatcher: Watch error for {debounce_target:?}: {e}");
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        if pending {
                            pending = false;
                            log::trace!("FileWatcher: Changes settled for {debounce_target:?}");
                            on_settled();
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            log::debug!("FileWatcher: Debounce thread for {debounce_target:?} exiting");
        })
        .map_err(notify::Error::io)?;

    Ok(FileWatcher { _watcher: watcher })
}
