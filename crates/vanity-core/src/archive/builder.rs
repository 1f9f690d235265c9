//! Deterministic module zip writer.
//!
//! The walk is fully planned before the first byte is written: exclusions,
//! file type checks, case collisions and size ceilings all fail the build
//! with nothing emitted.

use std::collections::{BTreeSet, HashMap};
use std::io::{Seek, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::ArchiveLimits;
use crate::context::FetchContext;
use crate::error::{Error, ErrorKind, Result, ResultExt, WrapOp};
use crate::git::{CodeHost, EntryKind, RevInfo, TreeEntry};
use crate::manifest::MANIFEST_FILE;

const OP: &str = "archive.build";

/// Version control metadata directories never shipped in a module.
const VCS_DIRS: &[&str] = &[".git", ".hg", ".svn", ".bzr"];

/// Repository-root license copied into subdirectory modules that lack one.
const LICENSE_FILE: &str = "LICENSE";

/// Larger root licenses are treated as absent.
const MAX_LICENSE: usize = 16 << 20;

/// Files selected for one archive.
struct Plan {
    /// Tree entries, sorted by path
    files: Vec<TreeEntry>,
    /// Root `LICENSE` contents when the module has none of its own
    license: Option<Vec<u8>>,
}

/// Writes the module zip for one resolved revision.
pub struct ArchiveBuilder<'a> {
    host: &'a dyn CodeHost,
    ctx: &'a FetchContext,
    limits: ArchiveLimits,
}

impl<'a> ArchiveBuilder<'a> {
    pub fn new(host: &'a dyn CodeHost, ctx: &'a FetchContext) -> Self {
        Self {
            host,
            ctx,
            limits: ArchiveLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: ArchiveLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Write the tree beneath `subdir` at `revision` to `out`, with every
    /// entry named `<module>@<version>/<path relative to subdir>`.
    ///
    /// Returns the sink after the zip central directory has been written.
    pub fn build<W: Write + Seek>(
        &self,
        module: &str,
        version: &str,
        subdir: &str,
        revision: &RevInfo,
        out: W,
    ) -> Result<W> {
        self.ctx.check(OP)?;
        let Plan { files, license } = self.plan(subdir, revision)?;

        let root = format!("{}@{}", module, version);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default())
            .unix_permissions(0o644);

        let split = files.partition_point(|e| e.path.as_str() < LICENSE_FILE);
        let mut zip = ZipWriter::new(out);
        for entry in &files[..split] {
            self.write_entry(&mut zip, &root, entry, options)?;
        }
        if let Some(data) = &license {
            zip.start_file(format!("{}/{}", root, LICENSE_FILE), options)
                .op(OP)?;
            zip.write_all(data).op(OP)?;
        }
        for entry in &files[split..] {
            self.write_entry(&mut zip, &root, entry, options)?;
        }
        let out = zip.finish().op(OP)?;

        tracing::debug!(
            module,
            version,
            revision = %revision.id,
            files = files.len(),
            root_license = license.is_some(),
            "Built module archive"
        );
        Ok(out)
    }

    fn write_entry<W: Write + Seek>(
        &self,
        zip: &mut ZipWriter<W>,
        root: &str,
        entry: &TreeEntry,
        options: SimpleFileOptions,
    ) -> Result<()> {
        self.ctx.check(OP)?;
        let data = self.host.read_blob(entry).wrap(OP)?;
        zip.start_file(format!("{}/{}", root, entry.path), options)
            .op(OP)?;
        zip.write_all(&data).op(OP)
    }

    /// Select, validate and order the files to archive.
    fn plan(&self, subdir: &str, revision: &RevInfo) -> Result<Plan> {
        let Some(entries) = self.host.walk_tree(&revision.id, subdir).wrap(OP)? else {
            return Err(Error::new(
                OP,
                ErrorKind::RevisionNotFound {
                    query: revision.id.clone(),
                    detail: format!("module directory '{}' absent at revision", subdir),
                },
            ));
        };

        let nested = nested_modules(&entries);
        let mut files: Vec<TreeEntry> = entries
            .into_iter()
            .filter(|e| {
                !has_vcs_component(&e.path)
                    && !is_vendored_package(&e.path)
                    && !in_nested_module(&e.path, &nested)
            })
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let license = if subdir.is_empty() || files.iter().any(|e| e.path == LICENSE_FILE) {
            None
        } else {
            self.root_license(revision)?
        };

        let mut folded: HashMap<String, &str> = HashMap::new();
        let mut total: u64 = 0;
        let sizes = files
            .iter()
            .map(|e| (e.path.as_str(), e.size, Some(e)))
            .chain(license.as_ref().map(|l| (LICENSE_FILE, l.len() as u64, None)));
        for (path, size, entry) in sizes {
            if let Some(entry) = entry {
                check_entry(entry)?;
            }
            for name in path_and_parents(path) {
                if let Some(existing) = folded.insert(name.to_lowercase(), name)
                    && existing != name
                {
                    return Err(Error::new(
                        OP,
                        ErrorKind::CaseCollision {
                            first: existing.to_string(),
                            second: name.to_string(),
                        },
                    ));
                }
            }
            if size > self.limits.max_file {
                return Err(too_large(format!(
                    "{} is {} bytes, limit is {}",
                    path, size, self.limits.max_file
                )));
            }
            total = total.saturating_add(size);
            if total > self.limits.max_total {
                return Err(too_large(format!(
                    "module content exceeds {} bytes",
                    self.limits.max_total
                )));
            }
        }
        Ok(Plan { files, license })
    }

    fn root_license(&self, revision: &RevInfo) -> Result<Option<Vec<u8>>> {
        match self.host.read_file(&revision.id, LICENSE_FILE) {
            Ok(data) => Ok(data.filter(|d| d.len() <= MAX_LICENSE)),
            Err(err) if matches!(err.kind(), ErrorKind::UnsupportedFileType { .. }) => Ok(None),
            Err(err) => Err(err.op(OP)),
        }
    }
}

fn too_large(detail: String) -> Error {
    Error::new(OP, ErrorKind::ArchiveTooLarge { detail })
}

fn check_entry(entry: &TreeEntry) -> Result<()> {
    if entry.kind != EntryKind::File {
        return Err(Error::new(
            OP,
            ErrorKind::UnsupportedFileType {
                path: entry.path.clone(),
                file_type: entry.kind.describe(),
            },
        ));
    }
    let base = entry.path.rsplit('/').next().unwrap_or(&entry.path);
    if base != MANIFEST_FILE && base.eq_ignore_ascii_case(MANIFEST_FILE) {
        return Err(Error::new(
            OP,
            ErrorKind::InvalidPath {
                path: entry.path.clone(),
                reason: "module file must be spelled go.mod".to_string(),
            },
        ));
    }
    if entry.path.contains('\\') {
        return Err(Error::new(
            OP,
            ErrorKind::InvalidPath {
                path: entry.path.clone(),
                reason: "backslash in file name".to_string(),
            },
        ));
    }
    Ok(())
}

/// Directories below the module root that contain their own `go.mod`.
fn nested_modules(entries: &[TreeEntry]) -> BTreeSet<String> {
    entries
        .iter()
        .filter_map(|e| e.path.strip_suffix(MANIFEST_FILE))
        .filter_map(|dir| dir.strip_suffix('/'))
        .filter(|dir| !dir.is_empty())
        .map(str::to_string)
        .collect()
}

fn in_nested_module(path: &str, nested: &BTreeSet<String>) -> bool {
    parents(path).any(|dir| nested.contains(dir))
}

/// Packages vendored below a `vendor/` directory; files directly in it
/// (such as `vendor/modules.txt`) are kept.
///
/// For a nested `vendor/` the remainder is taken at the same offset as the Go
/// toolchain's check, which archive hashes depend on.
fn is_vendored_package(path: &str) -> bool {
    let start = if path.starts_with("vendor/") {
        "vendor/".len()
    } else if path.contains("/vendor/") {
        "/vendor/".len()
    } else {
        return false;
    };
    path.get(start..).is_some_and(|rest| rest.contains('/'))
}

fn has_vcs_component(path: &str) -> bool {
    path.split('/').any(|c| VCS_DIRS.contains(&c))
}

/// `a/b/c` yields `a/b` then `a`.
fn parents(path: &str) -> impl Iterator<Item = &str> {
    let mut current = path;
    std::iter::from_fn(move || {
        let (dir, _) = current.rsplit_once('/')?;
        current = dir;
        Some(dir)
    })
}

fn path_and_parents(path: &str) -> impl Iterator<Item = &str> {
    std::iter::once(path).chain(parents(path))
}
