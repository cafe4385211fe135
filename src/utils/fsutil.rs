use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Normalize an environment directory argument: relative paths resolve against the
/// current working directory, and an absent/blank value falls back to `./ledgerlite-data`.
#[must_use]
pub fn normalize_env_path(name_or_path: Option<&str>) -> PathBuf {
    let raw = match name_or_path {
        Some(s) if !s.trim().is_empty() => PathBuf::from(s),
        _ => PathBuf::from("ledgerlite-data"),
    };
    if raw.is_absolute() {
        raw
    } else {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join(raw)
    }
}

/// Create a file with restrictive permissions where supported.
///
/// On Unix, this maps to 0o600. On Windows, the default inherits ACLs; we just avoid
/// world-writable flags.
///
/// # Errors
/// Returns an error if the file cannot be created/opened.
pub fn create_secure(path: &Path) -> io::Result<File> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        OpenOptions::new().read(true).write(true).create(true).truncate(false).mode(0o600).open(path)
    }
    #[cfg(not(unix))]
    {
        OpenOptions::new().read(true).write(true).create(true).truncate(false).open(path)
    }
}

/// Open a file for read/write without truncation, creating it if absent.
///
/// # Errors
/// Returns an error if the file cannot be opened.
pub fn open_rw_no_trunc(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).write(true).create(true).truncate(false).open(path)
}

/// Atomically replace `dest` with the contents currently at `tmp`, via rename.
///
/// On Windows, `std::fs::rename` does not replace an existing destination, so we
/// fall back to `MoveFileExW` with `MOVEFILE_REPLACE_EXISTING` (same approach the
/// storage engine uses for manifest swaps).
///
/// # Errors
/// Returns an error if the underlying rename/move fails.
pub fn replace_file(tmp: &Path, dest: &Path) -> io::Result<()> {
    #[cfg(not(target_os = "windows"))]
    {
        if dest.exists() {
            let _ = std::fs::remove_file(dest);
        }
        std::fs::rename(tmp, dest)
    }
    #[cfg(target_os = "windows")]
    {
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::winbase::{MOVEFILE_REPLACE_EXISTING, MoveFileExW};
        let wide = |p: &Path| -> Vec<u16> {
            p.as_os_str().encode_wide().chain(std::iter::once(0)).collect()
        };
        let src_w = wide(tmp);
        let dst_w = wide(dest);
        let ok = unsafe {
            MoveFileExW(src_w.as_ptr(), dst_w.as_ptr(), MOVEFILE_REPLACE_EXISTING)
        };
        if ok == 0 { Err(io::Error::last_os_error()) } else { Ok(()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_relative_path() {
        let p = normalize_env_path(Some("foo"));
        assert!(p.is_absolute());
        assert!(p.ends_with("foo"));
    }

    #[test]
    fn defaults_when_empty() {
        let p = normalize_env_path(Some("  "));
        assert!(p.ends_with("ledgerlite-data"));
    }

    #[test]
    fn create_secure_then_replace() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = dir.path().join("a.tmp");
        let dest = dir.path().join("a.dat");
        {
            let mut f = create_secure(&tmp).unwrap();
            use std::io::Write;
            f.write_all(b"hello").unwrap();
        }
        replace_file(&tmp, &dest).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello");
        assert!(!tmp.exists());
    }
}
