/*
 * The bookmarks provider. It mirrors a line-oriented bookmarks file (one
 * `<uri> <optional display name>` per line, the GTK bookmarks convention)
 * into a list of dock items. Reloads are full re-reads reconciled against the
 * previous list so surviving bookmarks keep their item identity; entries
 * whose local target no longer exists are skipped with a warning but left
 * untouched in the file.
 *
 * Mutations (add/remove) never edit the file in place: the surviving lines
 * are written to a temp file in the same directory which is then renamed over
 * the original, so an interrupted write leaves the old file intact.
 */
use super::items::{DockItem, ItemKind, ItemSnapshot};
use super::path_utils;
use super::reconciler::{SourceEntry, reconcile_items};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

#[derive(Debug)]
pub enum BookmarkError {
    Io(io::Error),
    TargetMissing(PathBuf),
}

impl From<io::Error> for BookmarkError {
    fn from(err: io::Error) -> Self {
        BookmarkError::Io(err)
    }
}

impl std::fmt::Display for BookmarkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookmarkError::Io(e) => write!(f, "Bookmarks I/O error: {e}"),
            BookmarkError::TargetMissing(path) => {
                write!(f, "Bookmark target does not exist: {path:?}")
            }
        }
    }
}

impl std::error::Error for BookmarkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BookmarkError::Io(e) => Some(e),
            BookmarkError::TargetMissing(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BookmarkError>;

fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~' | b'/')
}

fn percent_encode(input: &str) -> String {
    let mut encoded = String::with_capacity(input.len());
    for byte in input.bytes() {
        if is_unreserved(byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && let (Some(hi), Some(lo)) = (
                (bytes[i + 1] as char).to_digit(16),
                (bytes[i + 2] as char).to_digit(16),
            )
        {
            decoded.push((hi * 16 + lo) as u8);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

/// Encodes a local path as a `file://` URI.
pub fn path_to_file_uri(path: &Path) -> String {
    format!("file://{}", percent_encode(&path.to_string_lossy()))
}

/// Decodes a `file://` URI back to a local path; `None` for any other scheme.
pub fn file_uri_to_path(uri: &str) -> Option<PathBuf> {
    let rest = uri.strip_prefix("file://")?;
    Some(PathBuf::from(percent_decode(rest)))
}

/*
 * Parses one bookmarks-file line. The first whitespace-delimited token is the
 * URI, the remainder (if any) the user's display name for it. Blank lines
 * yield `None` and are ignored by the caller.
 */
pub fn parse_bookmark_line(line: &str) -> Option<SourceEntry> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.split_once(' ') {
        Some((uri, name)) => {
            let name = name.trim();
            let display_name = if name.is_empty() {
                None
            } else {
                Some(name.to_string())
            };
            Some(SourceEntry::new(uri, display_name))
        }
        None => Some(SourceEntry::new(trimmed, None)),
    }
}

fn read_bookmark_entries(path: &Path) -> io::Result<Vec<SourceEntry>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::trace!("BookmarksProvider: No bookmarks file at {path:?}");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };
    let reader = BufReader::new(file);
    let mut entries = Vec::new();
    for line_result in reader.lines() {
        let line = line_result?;
        if let Some(entry) = parse_bookmark_line(&line) {
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// The conventional per-user bookmarks file location.
pub fn default_bookmarks_file() -> Option<PathBuf> {
    path_utils::home_dir().map(|home| home.join(".config/gtk-3.0/bookmarks"))
}

pub struct BookmarksProvider {
    bookmarks_path: PathBuf,
    items: RwLock<ItemSnapshot>,
    // Reconcile passes are serialized; triggers arriving mid-pass set the
    // rerun flag and coalesce into one follow-up pass.
    reconcile_gate: Mutex<()>,
    rerun_requested: AtomicBool,
}

impl BookmarksProvider {
    pub fn new(bookmarks_path: PathBuf) -> Self {
        BookmarksProvider {
            bookmarks_path,
            items: RwLock::new(Arc::new(Vec::new())),
            reconcile_gate: Mutex::new(()),
            rerun_requested: AtomicBool::new(false),
        }
    }

    pub fn bookmarks_path(&self) -> &Path {
        &self.bookmarks_path
    }

    /// The currently published snapshot.
    pub fn items(&self) -> ItemSnapshot {
        self.items.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /*
     * Re-reads the bookmarks file and reconciles it into the published list.
     * Only one pass runs at a time: a reload requested while another is in
     * flight returns immediately, and the running pass picks the request up
     * as one extra iteration before releasing the gate.
     */
    pub fn reload(&self) -> Result<()> {
        self.rerun_requested.store(true, Ordering::SeqCst);
        let mut result = Ok(());
        loop {
            let Ok(guard) = self.reconcile_gate.try_lock() else {
                log::trace!("BookmarksProvider: Reconcile in flight, coalescing trigger");
                return Ok(());
            };
            while self.rerun_requested.swap(false, Ordering::SeqCst) {
                result = self.reload_once();
            }
            drop(guard);
            // A trigger can land between the last flag check and the gate
            // release; it bounced off the held gate, so it is ours to run.
            if !self.rerun_requested.load(Ordering::SeqCst) {
                break;
            }
        }
        result
    }

    fn reload_once(&self) -> Result<()> {
        let entries = read_bookmark_entries(&self.bookmarks_path)?;
        let previous = self.items();

        let next = reconcile_items(
            &previous,
            &entries,
            |entry| match file_uri_to_path(&entry.key) {
                Some(path) => path.exists(),
                None => true, // remote URIs cannot be checked locally
            },
            Self::build_item,
        );

        log::debug!(
            "BookmarksProvider: Reconciled {} entries into {} items",
            entries.len(),
            next.len()
        );
        *self.items.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(next);
        Ok(())
    }

    fn build_item(entry: &SourceEntry) -> DockItem {
        let (base_name, icon_name) = match file_uri_to_path(&entry.key) {
            Some(path) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "/".to_string());
                (name, "folder".to_string())
            }
            None => {
                let name = entry
                    .key
                    .rsplit('/')
                    .find(|segment| !segment.is_empty())
                    .unwrap_or(&entry.key)
                    .to_string();
                (name, "folder-remote".to_string())
            }
        };
        DockItem::new(
            entry.key.clone(),
            base_name,
            icon_name,
            ItemKind::Bookmark {
                uri: entry.key.clone(),
            },
        )
    }

    /*
     * Adds a bookmark for `target`. The target must exist; its URI is
     * appended as a new line through the rewrite sequence, then the item list
     * is reloaded.
     */
    pub fn add_bookmark(&self, target: &Path) -> Result<()> {
        if !target.exists() {
            return Err(BookmarkError::TargetMissing(target.to_path_buf()));
        }
        let uri = path_to_file_uri(target);
        log::debug!("BookmarksProvider: Adding bookmark '{uri}'");
        self.rewrite_file(|lines| {
            let mut lines = lines;
            lines.push(uri.clone());
            lines
        })?;
        self.reload()
    }

    /*
     * Removes every line whose URI token matches. Untouched lines, stale ones
     * included, are copied verbatim so nothing else in the file changes.
     */
    pub fn remove_bookmark(&self, uri: &str) -> Result<()> {
        log::debug!("BookmarksProvider: Removing bookmark '{uri}'");
        self.rewrite_file(|lines| {
            lines
                .into_iter()
                .filter(|line| line.split_whitespace().next() != Some(uri))
                .collect()
        })?;
        self.reload()
    }

    /*
     * The read-temp-write-rename sequence: existing lines are read, `edit`
     * produces the new line set, and the result lands in a temp file that is
     * atomically renamed over the original. An interruption before the rename
     * leaves the bookmarks file as it was.
     */
    fn rewrite_file(&self, edit: impl FnOnce(Vec<String>) -> Vec<String>) -> Result<()> {
        let lines = match File::open(&self.bookmarks_path) {
            Ok(file) => BufReader::new(file)
                .lines()
                .collect::<io::Result<Vec<String>>>()?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let new_lines = edit(lines);

        if let Some(parent) = self.bookmarks_path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.bookmarks_path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&temp_path)?);
            for line in &new_lines {
                writeln!(writer, "{line}")?;
            }
            writer.flush()?;
        }
        fs::rename(&temp_path, &self.bookmarks_path)?;
        log::trace!(
            "BookmarksProvider: Rewrote {:?} with {} lines",
            self.bookmarks_path,
            new_lines.len()
        );
        Ok(())
    }
}
