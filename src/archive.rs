//! [`Archive`]: an open header/data file pair and everything you can do with it.
//!
//! ```no_run
//! use arhpak::archive::Archive;
//!
//! let ar = Archive::open("bf2.arh", "bf2.ard")?;
//! let data = ar.read_by_name("/common/bdat_common.bdat")?;
//! let report = ar.extract_all("out")?;
//! println!("{}/{} extracted, {} bytes in first file", report.succeeded, report.attempted, data.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! An `Archive` value only exists once opening succeeded, so a failed open
//! leaves nothing behind. While open, the data file is held under an
//! exclusive lock, so a second `open` of the same pair fails with `Io`.
//! [`Archive::close`] releases the data file and its lock; every operation
//! after that fails with [`ArchiveError::ArchiveClosed`].

use std::fmt;
use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::codec::{Codec, ZstdCodec};
use crate::diagnostics::{DiagnosticSink, Severity, TracingSink};
use crate::error::{ArchiveError, Result};
use crate::header::{self, DecodedHeader, HeaderInfo};
use crate::index::TrieIndex;
use crate::pattern::{has_prefix_ignore_case, GlobPattern};
use crate::payload;
use crate::table::{self, FileEntry};

// ── ArchiveOptions ────────────────────────────────────────────────────────────

/// Configuration for [`Archive::open_with`].
#[derive(Clone)]
pub struct ArchiveOptions {
    /// Zstd level used when recompressing replacements.
    pub compression_level: i32,
    pub sink:              Arc<dyn DiagnosticSink>,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            compression_level: ZstdCodec.max_level(),
            sink:              Arc::new(TracingSink),
        }
    }
}

impl fmt::Debug for ArchiveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveOptions")
            .field("compression_level", &self.compression_level)
            .finish_non_exhaustive()
    }
}

// ── ExtractReport ─────────────────────────────────────────────────────────────

/// Outcome of a bulk extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    pub attempted: usize,
    pub succeeded: usize,
    /// `(filename, reason)` for every entry that was skipped.
    pub failed:    Vec<(String, String)>,
}

impl ExtractReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

// ── Archive ───────────────────────────────────────────────────────────────────

pub struct Archive {
    header_path: PathBuf,
    data_path:   PathBuf,
    /// Header file exactly as on disk (protected regions still encrypted).
    raw_header:  Vec<u8>,
    header:      DecodedHeader,
    index:       TrieIndex,
    entries:     Vec<FileEntry>,
    data:        Option<File>,
    data_len:    u64,
    options:     ArchiveOptions,
}

impl Archive {
    // ── Constructors ─────────────────────────────────────────────────────────

    pub fn open<H: AsRef<Path>, D: AsRef<Path>>(header_path: H, data_path: D) -> Result<Self> {
        Self::open_with(header_path, data_path, ArchiveOptions::default())
    }

    pub fn open_with<H: AsRef<Path>, D: AsRef<Path>>(
        header_path: H,
        data_path:   D,
        options:     ArchiveOptions,
    ) -> Result<Self> {
        let header_path = header_path.as_ref().to_owned();
        let data_path = data_path.as_ref().to_owned();

        let raw_header = fs::read(&header_path)?;
        let header = header::decode(&raw_header)?;
        let index = TrieIndex::from_header(&header.bytes, &header.info)?;
        let mut entries = table::parse_file_table(&header.bytes, &header.info)?;
        let named = index.resolve_names(&mut entries, |terminal, entry, e| {
            options.sink.report(Severity::Warning, &format!(
                "file {} left unnamed, node {terminal}: {e}",
                entry.id,
            ));
        })?;

        let data = OpenOptions::new().read(true).write(true).open(&data_path)?;
        lock_exclusive(&data, &data_path)?;
        let data_len = data.metadata()?.len();

        options.sink.report(Severity::Debug, &format!(
            "opened {}: {} nodes, {} entries ({} named), data file {} B",
            header_path.display(),
            index.len(),
            entries.len(),
            named,
            data_len,
        ));

        Ok(Self {
            header_path,
            data_path,
            raw_header,
            header,
            index,
            entries,
            data: Some(data),
            data_len,
            options,
        })
    }

    /// Release the data file. Later operations fail with `ArchiveClosed`.
    pub fn close(&mut self) {
        self.data = None;
    }

    pub fn is_open(&self) -> bool {
        self.data.is_some()
    }

    // ── Lookup ───────────────────────────────────────────────────────────────

    /// Walk the trie for `name`. A miss is `Ok(None)`.
    pub fn lookup(&self, name: &str) -> Result<Option<&FileEntry>> {
        self.handle()?;
        Ok(self
            .index
            .lookup(name)
            .and_then(|id| usize::try_from(id).ok())
            .and_then(|i| self.entries.get(i)))
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.lookup(name)?.is_some())
    }

    /// Entries whose name starts with `prefix` (ASCII case-insensitive).
    pub fn children(&self, prefix: &str) -> Result<Vec<&FileEntry>> {
        self.handle()?;
        Ok(self
            .named_entries()
            .filter(|(_, name)| has_prefix_ignore_case(name, prefix))
            .map(|(e, _)| e)
            .collect())
    }

    /// Entries whose name matches the glob `pattern` (case-insensitive).
    pub fn find_by_pattern(&self, pattern: &str) -> Result<Vec<&FileEntry>> {
        self.handle()?;
        let glob = GlobPattern::new(pattern)?;
        Ok(self
            .named_entries()
            .filter(|(_, name)| glob.matches(name))
            .map(|(e, _)| e)
            .collect())
    }

    // ── Read ─────────────────────────────────────────────────────────────────

    pub fn read(&self, entry: &FileEntry) -> Result<Vec<u8>> {
        let mut handle = self.handle()?;
        payload::read_entry(&mut handle, self.data_len, entry)
    }

    pub fn read_by_name(&self, name: &str) -> Result<Vec<u8>> {
        let entry = self
            .lookup(name)?
            .ok_or_else(|| ArchiveError::EntryNotFound(name.to_owned()))?;
        self.read(entry)
    }

    /// Decode `entry` into `out`, returning the number of bytes written.
    pub fn write_entry_to<W: Write>(&self, entry: &FileEntry, out: &mut W) -> Result<u64> {
        let data = self.read(entry)?;
        out.write_all(&data)?;
        Ok(data.len() as u64)
    }

    // ── Replace ──────────────────────────────────────────────────────────────

    /// Recompress `data` into the slot `entry` already owns.
    ///
    /// The header file is rewritten first, then the data file slot. There
    /// is no journal: a failure between the two steps leaves the header
    /// describing a payload the data file does not hold.
    pub fn replace(&mut self, entry: &FileEntry, data: &[u8]) -> Result<()> {
        self.handle()?;
        let slot = self
            .entries
            .iter()
            .position(|e| e.header_offset == entry.header_offset)
            .ok_or_else(|| ArchiveError::EntryNotFound(entry.display_name()))?;

        let staged = payload::stage_replacement(&self.entries[slot], data, self.options.compression_level)?;

        // In-memory header copies only change once the new image is on disk.
        let mut raw_header = self.raw_header.clone();
        staged.commit_header(&mut raw_header)?;
        fs::write(&self.header_path, &raw_header)?;
        self.raw_header = raw_header;
        staged.commit_header(&mut self.header.bytes)?;
        staged.apply_to(&mut self.entries[slot]);

        let mut handle = self.handle()?;
        staged.commit_data(&mut handle)?;

        self.options.sink.report(Severity::Debug, &format!(
            "replaced {}: {} B -> {} B compressed",
            staged.name,
            data.len(),
            staged.compressed_size(),
        ));
        Ok(())
    }

    pub fn replace_by_name(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let entry = self
            .lookup(name)?
            .cloned()
            .ok_or_else(|| ArchiveError::EntryNotFound(name.to_owned()))?;
        self.replace(&entry, data)
    }

    // ── Extract ──────────────────────────────────────────────────────────────

    /// Extract every named entry below `dest`.
    ///
    /// Per-entry failures are reported to the sink, their partial output is
    /// removed and extraction moves on.
    pub fn extract_all<P: AsRef<Path>>(&self, dest: P) -> Result<ExtractReport> {
        self.handle()?;
        let targets: Vec<(&FileEntry, &str)> = self.named_entries().collect();
        self.extract_entries(dest.as_ref(), targets)
    }

    /// Like [`Archive::extract_all`], restricted to names matching `pattern`.
    pub fn extract_matching<P: AsRef<Path>>(&self, dest: P, pattern: &str) -> Result<ExtractReport> {
        self.handle()?;
        let glob = GlobPattern::new(pattern)?;
        let targets: Vec<(&FileEntry, &str)> =
            self.named_entries().filter(|(_, name)| glob.matches(name)).collect();
        self.extract_entries(dest.as_ref(), targets)
    }

    fn extract_entries(&self, dest: &Path, targets: Vec<(&FileEntry, &str)>) -> Result<ExtractReport> {
        fs::create_dir_all(dest)?;
        let mut report = ExtractReport { attempted: targets.len(), ..Default::default() };

        let total = targets.len();
        for (n, (entry, name)) in targets.into_iter().enumerate() {
            self.options.sink.report(Severity::Debug, &format!("extracting {}/{total}: {name}", n + 1));
            let target = match output_path(dest, name) {
                Some(t) => t,
                None => {
                    let reason = "name escapes the output directory".to_string();
                    self.options.sink.report(Severity::Error, &format!("Unable to output file {name}: {reason}"));
                    report.failed.push((name.to_owned(), reason));
                    continue;
                }
            };

            match self.extract_one(entry, &target) {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    self.options.sink.report(Severity::Error, &format!("Unable to output file {name}: {e}"));
                    match fs::remove_file(&target) {
                        Ok(()) => {}
                        Err(cleanup) if cleanup.kind() == io::ErrorKind::NotFound => {}
                        Err(cleanup) => self.options.sink.report(Severity::Warning, &format!(
                            "could not remove {}: {cleanup}",
                            target.display(),
                        )),
                    }
                    report.failed.push((name.to_owned(), e.to_string()));
                }
            }
        }

        self.options.sink.report(Severity::Info, &format!(
            "extracted {}/{} entries to {}",
            report.succeeded,
            report.attempted,
            dest.display(),
        ));
        Ok(report)
    }

    fn extract_one(&self, entry: &FileEntry, target: &Path) -> Result<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(File::create(target)?);
        self.write_entry_to(entry, &mut out)?;
        out.flush()?;
        Ok(())
    }

    // ── Metadata ─────────────────────────────────────────────────────────────

    pub fn header(&self) -> &HeaderInfo {
        &self.header.info
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn header_path(&self) -> &Path {
        &self.header_path
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    // ── helpers ──────────────────────────────────────────────────────────────

    fn handle(&self) -> Result<&File> {
        self.data.as_ref().ok_or(ArchiveError::ArchiveClosed)
    }

    fn named_entries(&self) -> impl Iterator<Item = (&FileEntry, &str)> + '_ {
        self.entries.iter().filter_map(|e| {
            e.filename
                .as_deref()
                .filter(|n| !n.trim().is_empty())
                .map(|n| (e, n))
        })
    }
}

/// Hold an exclusive advisory lock on the data file for as long as `file`
/// stays open.
fn lock_exclusive(file: &File, path: &Path) -> Result<()> {
    match file.try_lock() {
        Ok(()) => Ok(()),
        Err(TryLockError::WouldBlock) => Err(ArchiveError::Io(io::Error::new(
            io::ErrorKind::WouldBlock,
            format!("{} is already open elsewhere", path.display()),
        ))),
        Err(TryLockError::Error(e)) => Err(e.into()),
    }
}

/// Map an archive name onto a path below `dest`, refusing anything that
/// would land outside it.
fn output_path(dest: &Path, name: &str) -> Option<PathBuf> {
    let relative = Path::new(name.trim_start_matches('/'));
    let mut out = dest.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(c) => out.push(c),
            Component::CurDir    => {}
            _                    => return None,
        }
    }
    (out.as_path() != dest).then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_strips_leading_slash() {
        let p = output_path(Path::new("out"), "/common/item.bdat").unwrap();
        assert_eq!(p, Path::new("out").join("common").join("item.bdat"));
    }

    #[test]
    fn output_path_rejects_traversal() {
        assert!(output_path(Path::new("out"), "../etc/passwd").is_none());
        assert!(output_path(Path::new("out"), "a/../../b").is_none());
        assert!(output_path(Path::new("out"), "/").is_none());
    }

    #[test]
    fn default_options_use_maximum_level() {
        let opts = ArchiveOptions::default();
        assert_eq!(opts.compression_level, *zstd::compression_level_range().end());
        assert!(format!("{opts:?}").contains("compression_level"));
    }
}
