use std::fs::{self, File, Permissions};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::OffsetWriter;

/// A complete replacement for a file, built beside it and swapped in on commit.
///
/// The original file is never written to. Until [`commit`](Self::commit)
/// succeeds it keeps its previous contents, and dropping an uncommitted
/// replacement removes the temporary file.
pub struct ReplacementFile {
    temp: NamedTempFile,
    target: PathBuf,
    permissions: Option<Permissions>,
}

impl ReplacementFile {
    /// Create an empty temporary file in the same directory as `target`.
    pub fn new(target: &Path) -> io::Result<Self> {
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let temp = tempfile::Builder::new()
            .prefix(".rezip-")
            .suffix(".tmp")
            .tempfile_in(dir)?;
        let permissions = match fs::metadata(target) {
            Ok(meta) => Some(meta.permissions()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => default_permissions(),
            Err(e) => return Err(e),
        };
        Ok(Self {
            temp,
            target: target.to_path_buf(),
            permissions,
        })
    }

    /// Buffered writer positioned at the start of the replacement.
    pub fn writer(&self) -> OffsetWriter<BufWriter<&File>> {
        OffsetWriter::new(BufWriter::new(self.temp.as_file()), 0)
    }

    /// Swap the replacement in place of the target.
    ///
    /// Falls back to copy-then-delete when the rename is refused, e.g. when
    /// the target lives on another filesystem.
    ///
    /// The target keeps its permissions. A new target gets mode 0644 on unix
    /// rather than the private mode of the temporary file.
    pub fn commit(self) -> io::Result<()> {
        if let Some(permissions) = self.permissions {
            self.temp.as_file().set_permissions(permissions)?;
        }
        self.temp.as_file().sync_all()?;
        let target = self.target;
        match self.temp.persist(&target) {
            Ok(_) => {
                log::debug!("replaced {}", target.display());
                Ok(())
            }
            Err(err) => {
                log::warn!(
                    "rename onto {} failed ({}), copying instead",
                    target.display(),
                    err.error
                );
                fs::copy(err.file.path(), &target)?;
                Ok(())
            }
        }
    }
}

#[cfg(unix)]
fn default_permissions() -> Option<Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_permissions() -> Option<Permissions> {
    None
}
