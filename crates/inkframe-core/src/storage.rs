//! Application-side view of the shared storage volume.

use heapless::{String, Vec};

/// Names starting with this marker are never shown.
pub const HIDDEN_FILE_MARKER: char = '.';
/// Longest file name kept in a directory listing.
pub const FILE_NAME_BYTES: usize = 64;
/// Most entries kept from one directory pass.
pub const DIRECTORY_MAX_ENTRIES: usize = 128;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StorageError {
    /// Storage is exposed to the host, the application may not touch it.
    Unavailable,
    NotFound,
    Io,
}

impl StorageError {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unavailable => "storage_unavailable",
            Self::NotFound => "not_found",
            Self::Io => "io",
        }
    }
}

/// Volume geometry reported by the card.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Capacity {
    pub sector_count: u64,
    pub sector_size: u32,
}

impl Capacity {
    pub const fn total_bytes(self) -> u64 {
        self.sector_count * self.sector_size as u64
    }

    pub const fn megabytes(self) -> u64 {
        self.total_bytes() / (1024 * 1024)
    }
}

/// Flat file access to the root directory of the volume.
///
/// Implementations do raw I/O only. Whether the application is allowed to
/// call them is decided by [`crate::arbiter::StorageArbiter`].
pub trait FileStore {
    /// Visits root directory file names in on-disk order.
    fn list_root(&mut self, visit: &mut dyn FnMut(&str)) -> Result<(), StorageError>;

    /// Size of a root file in bytes.
    fn file_len(&mut self, name: &str) -> Result<usize, StorageError>;

    /// Reads from the start of a root file into `out`, returning bytes read.
    fn read_file(&mut self, name: &str, out: &mut [u8]) -> Result<usize, StorageError>;

    /// Creates a root file holding `contents` unless it already exists.
    ///
    /// Returns `true` when the file was created.
    fn create_if_absent(&mut self, name: &str, contents: &[u8]) -> Result<bool, StorageError>;

    fn capacity(&mut self) -> Result<Capacity, StorageError>;

    /// Releases the storage subsystem. Later calls may fail with `Io`.
    fn release(&mut self) {}
}

pub fn is_hidden(name: &str) -> bool {
    name.starts_with(HIDDEN_FILE_MARKER)
}

/// Ordered visible file names from one directory pass.
///
/// A cursor is built fresh for every pass and never reused, because files may
/// come and go while the host has the card.
#[derive(Debug, Default)]
pub struct DirectoryCursor {
    names: Vec<String<FILE_NAME_BYTES>, DIRECTORY_MAX_ENTRIES>,
    position: usize,
    skipped_hidden: u16,
    dropped: u16,
}

impl DirectoryCursor {
    /// Lists the root directory, dropping hidden names.
    pub fn collect<S: FileStore + ?Sized>(store: &mut S) -> Result<Self, StorageError> {
        let mut cursor = Self::default();
        store.list_root(&mut |name| cursor.push(name))?;

        if cursor.dropped > 0 {
            log::warn!(
                "storage: listing truncated dropped={} kept={}",
                cursor.dropped,
                cursor.names.len()
            );
        }

        Ok(cursor)
    }

    fn push(&mut self, name: &str) {
        if is_hidden(name) {
            self.skipped_hidden = self.skipped_hidden.saturating_add(1);
            return;
        }

        let mut owned = String::new();
        if owned.push_str(name).is_err() || self.names.push(owned).is_err() {
            self.dropped = self.dropped.saturating_add(1);
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn skipped_hidden(&self) -> u16 {
        self.skipped_hidden
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Takes the next name in listing order, `None` once the pass is done.
    pub fn advance(&mut self) -> Option<String<FILE_NAME_BYTES>> {
        let name = self.names.get(self.position)?.clone();
        self.position += 1;
        Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;

    #[test]
    fn hidden_marker_is_prefix_only() {
        assert!(is_hidden(".hidden.jpg"));
        assert!(is_hidden("."));
        assert!(!is_hidden("a.jpg"));
        assert!(!is_hidden(""));
    }

    #[test]
    fn cursor_keeps_listing_order_and_skips_hidden() {
        let mut store = MemoryStore::new()
            .with_file("b.jpg", b"b")
            .with_file(".hidden.jpg", b"h")
            .with_file("a.jpg", b"a");

        let mut cursor = DirectoryCursor::collect(&mut store).unwrap();

        assert_eq!(cursor.len(), 2);
        assert_eq!(cursor.skipped_hidden(), 1);
        assert_eq!(cursor.advance().as_deref(), Some("b.jpg"));
        assert_eq!(cursor.advance().as_deref(), Some("a.jpg"));
        assert_eq!(cursor.advance(), None);
    }

    #[test]
    fn overlong_names_are_dropped() {
        let long = "x".repeat(FILE_NAME_BYTES + 1);
        let mut store = MemoryStore::new()
            .with_file(&long, b"x")
            .with_file("ok.jpg", b"o");

        let cursor = DirectoryCursor::collect(&mut store).unwrap();

        assert_eq!(cursor.names().collect::<std::vec::Vec<_>>(), ["ok.jpg"]);
    }

    #[test]
    fn capacity_reports_megabytes() {
        let capacity = Capacity {
            sector_count: 4 * 2048,
            sector_size: 512,
        };

        assert_eq!(capacity.total_bytes(), 4 * 1024 * 1024);
        assert_eq!(capacity.megabytes(), 4);
    }
}
