//! Zip extraction that restores Unix permission bits.
//!
//! Zip readers do not restore the executable bit on their own, which leaves
//! the toolchain's `gn` and `ninja` binaries unrunnable after extraction. The
//! mode stored in the upper 16 bits of each entry's external attributes is
//! re-applied after the entry is written. Entries without permission bits
//! keep whatever mode the file was created with.
//!
//! The attributes are read straight from the central directory rather than
//! through [`zip::read::ZipFile::unix_mode`], which invents a mode for
//! DOS-made entries.
//!
//! How each entry maps onto the filesystem is decided by an [`EntryPolicy`];
//! [`PreserveUnixMode`] is the default and rejects entries that would land
//! outside the destination directory.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};

use crate::error::{BootstrapError, Result};

/// Metadata of one archive entry, as presented to an [`EntryPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveEntry<'a> {
    /// Raw entry name as stored in the archive.
    pub name: &'a str,
    pub is_dir: bool,
    /// Raw 32-bit external-attributes field from the central directory.
    pub external_attributes: u32,
}

impl ArchiveEntry<'_> {
    /// The Unix mode in the upper 16 bits of the external attributes, or
    /// `None` when they are zero.
    pub fn unix_mode(&self) -> Option<u32> {
        Some(self.external_attributes >> 16).filter(|mode| *mode != 0)
    }
}

/// Where an entry is written and which permission bits to apply afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPlan {
    pub target: PathBuf,
    /// `None` leaves the mode the file or directory was created with.
    pub mode: Option<u32>,
}

/// Decides the target path and permission bits for each entry.
///
/// Returning `Err(reason)` aborts the extraction with
/// [`BootstrapError::Extraction`].
pub trait EntryPolicy {
    fn plan(&self, destination: &Path, entry: &ArchiveEntry<'_>) -> std::result::Result<EntryPlan, String>;
}

impl<F> EntryPolicy for F
where
    F: Fn(&Path, &ArchiveEntry<'_>) -> std::result::Result<EntryPlan, String>,
{
    fn plan(&self, destination: &Path, entry: &ArchiveEntry<'_>) -> std::result::Result<EntryPlan, String> {
        self(destination, entry)
    }
}

/// Default policy: keep the archive layout, confine every entry to the
/// destination, and restore non-zero permission bits.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreserveUnixMode;

impl EntryPolicy for PreserveUnixMode {
    fn plan(&self, destination: &Path, entry: &ArchiveEntry<'_>) -> std::result::Result<EntryPlan, String> {
        let relative = contained_path(entry.name).ok_or_else(|| {
            format!("entry '{}' escapes the destination directory", entry.name)
        })?;
        if relative.as_os_str().is_empty() && !entry.is_dir {
            return Err(format!("entry '{}' has an empty path", entry.name));
        }
        Ok(EntryPlan {
            target: destination.join(relative),
            mode: permission_bits(entry.unix_mode()),
        })
    }
}

/// Permission bits worth applying: the low 12 bits of the stored mode, or
/// `None` when the archive stores no mode or a mode with no permission bits.
pub fn permission_bits(unix_mode: Option<u32>) -> Option<u32> {
    unix_mode.map(|mode| mode & 0o7777).filter(|bits| *bits != 0)
}

/// Turns an entry name into a relative path that cannot leave the
/// destination. Absolute paths, drive prefixes and `..` are refused.
pub fn contained_path(name: &str) -> Option<PathBuf> {
    if name.contains('\0') {
        return None;
    }
    let mut out = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

/// Extracts `archive` into `destination` with [`PreserveUnixMode`].
///
/// Returns the number of entries written.
pub fn extract(archive: &Path, destination: &Path) -> Result<usize> {
    extract_with(archive, destination, &PreserveUnixMode)
}

/// Extracts `archive` into `destination` using a custom policy.
///
/// On failure the destination is left partially populated; callers must not
/// treat it as valid.
pub fn extract_with(archive: &Path, destination: &Path, policy: &dyn EntryPolicy) -> Result<usize> {
    let fail = |reason: String| BootstrapError::Extraction {
        archive: archive.to_path_buf(),
        reason,
    };

    let file = File::open(archive).map_err(|e| fail(format!("cannot open archive: {e}")))?;
    let mut zip =
        zip::ZipArchive::new(file).map_err(|e| fail(format!("not a readable zip archive: {e}")))?;
    let mut headers =
        File::open(archive).map_err(|e| fail(format!("cannot open archive: {e}")))?;

    fs::create_dir_all(destination)
        .map_err(|e| fail(format!("cannot create {}: {e}", destination.display())))?;

    // Directory modes go on last so a read-only directory cannot block
    // writing the entries inside it.
    let mut dir_modes: Vec<(PathBuf, u32)> = Vec::new();

    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|e| fail(format!("cannot read entry #{index}: {e}")))?;

        let is_dir = entry.is_dir();
        let external_attributes = read_external_attributes(&mut headers, entry.central_header_start())
            .map_err(|e| fail(format!("cannot read attributes of '{}': {e}", entry.name())))?;
        let plan = {
            let meta = ArchiveEntry {
                name: entry.name(),
                is_dir,
                external_attributes,
            };
            policy.plan(destination, &meta).map_err(&fail)?
        };

        if is_dir {
            fs::create_dir_all(&plan.target)
                .map_err(|e| fail(format!("cannot create {}: {e}", plan.target.display())))?;
            if let Some(mode) = plan.mode {
                dir_modes.push((plan.target, mode));
            }
            continue;
        }

        if let Some(parent) = plan.target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| fail(format!("cannot create {}: {e}", parent.display())))?;
        }
        let mut out = File::create(&plan.target)
            .map_err(|e| fail(format!("cannot create {}: {e}", plan.target.display())))?;
        io::copy(&mut entry, &mut out)
            .map_err(|e| fail(format!("cannot write {}: {e}", plan.target.display())))?;
        drop(out);

        if let Some(mode) = plan.mode {
            apply_mode(&plan.target, mode)
                .map_err(|e| fail(format!("cannot chmod {}: {e}", plan.target.display())))?;
        }
    }

    for (dir, mode) in dir_modes.iter().rev() {
        apply_mode(dir, *mode).map_err(|e| fail(format!("cannot chmod {}: {e}", dir.display())))?;
    }

    Ok(zip.len())
}

const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4b50;

/// Offset of the external-attributes field in a central directory header.
const EXTERNAL_ATTRIBUTES_OFFSET: usize = 38;

/// Reads the external-attributes field of the central directory header at
/// `header_start`.
fn read_external_attributes<R: Read + Seek>(reader: &mut R, header_start: u64) -> io::Result<u32> {
    let mut header = [0u8; EXTERNAL_ATTRIBUTES_OFFSET + 4];
    reader.seek(SeekFrom::Start(header_start))?;
    reader.read_exact(&mut header)?;

    let signature = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if signature != CENTRAL_HEADER_SIGNATURE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("no central directory header at offset {header_start}"),
        ));
    }
    let field = &header[EXTERNAL_ATTRIBUTES_OFFSET..];
    Ok(u32::from_le_bytes([field[0], field[1], field[2], field[3]]))
}

/// Extracts, then deletes the archive.
///
/// The archive is only removed after a successful extraction; on failure it
/// stays on disk for inspection.
pub fn extract_and_remove(archive: &Path, destination: &Path) -> Result<usize> {
    let count = extract(archive, destination)?;
    fs::remove_file(archive).map_err(|e| BootstrapError::io(archive, e))?;
    Ok(count)
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

// No Unix permission model to restore into.
#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
