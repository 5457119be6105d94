//! Recursive disk-usage scanner feeding two top-N selections.
//!
//! Post-order walk: files land in the file heap as they are seen, each
//! directory lands in the directory heap after its subtree has been summed.
//! Unreadable directories are swallowed (their subtree contributes zero) and
//! counted; cancellation is checked at every directory entry and fails the
//! whole scan.

use crate::heap::TopHeap;
use crate::{Error, Result};
use spectra_metrics::{DiskUsageTopReport, TopEntry};
use std::path::Path;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

struct Scanner<'a> {
    cancel: &'a CancellationToken,
    dir_heap: TopHeap,
    file_heap: TopHeap,
    scanned_dirs: u64,
    scanned_files: u64,
    error_count: u64,
}

impl Scanner<'_> {
    /// Walk one directory, returning its accumulated (size, file count).
    fn walk(&mut self, dir: &Path) -> Result<(u64, u64)> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::debug!("skipping unreadable directory {}: {}", dir.display(), e);
                self.error_count += 1;
                return Ok((0, 0));
            }
        };
        self.scanned_dirs += 1;

        let mut size = 0u64;
        let mut files = 0u64;

        for entry in entries {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(_) => {
                    self.error_count += 1;
                    continue;
                }
            };

            // Never follow symlinks
            let meta = match entry.path().symlink_metadata() {
                Ok(meta) => meta,
                Err(_) => {
                    self.error_count += 1;
                    continue;
                }
            };

            if meta.file_type().is_symlink() {
                continue;
            }

            let path = entry.path();
            if meta.is_dir() {
                let (sub_size, sub_files) = self.walk(&path)?;
                size += sub_size;
                files += sub_files;
            } else if meta.is_file() {
                self.scanned_files += 1;
                files += 1;
                size += meta.len();
                self.file_heap.push(TopEntry::file(path.to_string_lossy(), meta.len()));
            }
        }

        if size > 0 {
            self.dir_heap.push(TopEntry::dir(dir.to_string_lossy(), size, files));
        }

        Ok((size, files))
    }
}

/// Scan `root`, retaining the `top_dirs_n` largest directories and the
/// `top_files_n` largest files.
///
/// On cancellation the scan fails with [`Error::Cancelled`]; no partial
/// report is emitted. `partial` in the report is reserved for a future scan
/// quota and stays false.
pub fn scan_top(
    root: &Path,
    top_dirs_n: usize,
    top_files_n: usize,
    cancel: &CancellationToken,
) -> Result<DiskUsageTopReport> {
    let started = Instant::now();

    let mut scanner = Scanner {
        cancel,
        dir_heap: TopHeap::new(top_dirs_n),
        file_heap: TopHeap::new(top_files_n),
        scanned_dirs: 0,
        scanned_files: 0,
        error_count: 0,
    };

    scanner.walk(root)?;

    Ok(DiskUsageTopReport {
        root: root.to_string_lossy().into_owned(),
        top_dirs: scanner.dir_heap.drain_sorted(),
        top_files: scanner.file_heap.drain_sorted(),
        scanned_dirs: scanner.scanned_dirs,
        scanned_files: scanner.scanned_files,
        error_count: scanner.error_count,
        partial: false,
        duration_ms: started.elapsed().as_millis() as u64,
        scanned_at: chrono::Utc::now().timestamp(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_file(path: &Path, size: usize) {
        fs::write(path, vec![b'x'; size]).unwrap();
    }

    #[test]
    fn scans_nested_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        write_file(&root.join("small.txt"), 100);
        fs::create_dir(root.join("sub")).unwrap();
        write_file(&root.join("sub/medium.txt"), 500);
        write_file(&root.join("sub/large.txt"), 1000);

        let report = scan_top(root, 2, 2, &CancellationToken::new()).unwrap();

        assert_eq!(report.scanned_files, 3);
        assert_eq!(report.scanned_dirs, 2);
        assert_eq!(report.error_count, 0);
        assert!(!report.partial);
        assert!(report.scanned_at > 0);

        let files: Vec<(String, u64)> =
            report.top_files.iter().map(|e| (e.path.clone(), e.size)).collect();
        assert!(files[0].0.ends_with("large.txt"));
        assert_eq!(files[0].1, 1000);
        assert!(files[1].0.ends_with("medium.txt"));
        assert_eq!(files[1].1, 500);

        assert_eq!(report.top_dirs.len(), 2);
        assert_eq!(report.top_dirs[0].size, 1600);
        assert_eq!(report.top_dirs[0].count, Some(3));
        assert_eq!(report.top_dirs[1].size, 1500);
        assert_eq!(report.top_dirs[1].count, Some(2));
        assert!(report.top_dirs[1].path.ends_with("sub"));
    }

    #[test]
    fn empty_directories_are_not_reported() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("hollow")).unwrap();

        let report = scan_top(tmp.path(), 10, 10, &CancellationToken::new()).unwrap();
        assert!(report.top_dirs.is_empty());
        assert!(report.top_files.is_empty());
        assert_eq!(report.scanned_dirs, 2);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        write_file(&root.join("real.txt"), 64);
        std::os::unix::fs::symlink(root.join("real.txt"), root.join("link.txt")).unwrap();
        std::os::unix::fs::symlink(root, root.join("loop")).unwrap();

        let report = scan_top(root, 5, 5, &CancellationToken::new()).unwrap();
        assert_eq!(report.scanned_files, 1);
        assert_eq!(report.top_files.len(), 1);
        assert_eq!(report.top_dirs[0].size, 64);
    }

    #[test]
    fn cancelled_scan_surfaces_cancelled() {
        let tmp = tempfile::tempdir().unwrap();
        write_file(&tmp.path().join("a.txt"), 10);

        let cancel = CancellationToken::new();
        cancel.cancel();

        match scan_top(tmp.path(), 5, 5, &cancel) {
            Err(Error::Cancelled) => {}
            other => panic!("expected Cancelled, got {:?}", other.map(|r| r.scanned_files)),
        }
    }

    #[test]
    fn missing_root_counts_one_error() {
        let tmp = tempfile::tempdir().unwrap();
        let gone = tmp.path().join("nope");

        let report = scan_top(&gone, 5, 5, &CancellationToken::new()).unwrap();
        assert_eq!(report.error_count, 1);
        assert_eq!(report.scanned_dirs, 0);
        assert!(report.top_files.is_empty());
    }
}
