use crate::archive::paths::relative_path;
use crate::error::{ArchiveError, Result};
use std::fs::{self, File};
use std::io::{self, BufReader, ErrorKind, Read};
use std::path::Path;
use walkdir::WalkDir;

pub fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| ArchiveError::io(parent, err))?;
    }
    Ok(())
}

/// Renames `from` to `to`, falling back to copy + remove across devices.
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    if from == to {
        return Ok(());
    }
    ensure_parent(to)?;

    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            if matches!(
                rename_err.kind(),
                ErrorKind::CrossesDevices | ErrorKind::PermissionDenied
            ) {
                fs::copy(from, to).map_err(|err| ArchiveError::io(to, err))?;
                fs::remove_file(from).map_err(|err| ArchiveError::io(from, err))?;
                Ok(())
            } else {
                Err(ArchiveError::io(from, rename_err))
            }
        }
    }
}

/// True when both files hold the same bytes.
pub fn same_contents(a: &Path, b: &Path) -> Result<bool> {
    let len_a = fs::metadata(a).map_err(|err| ArchiveError::io(a, err))?.len();
    let len_b = fs::metadata(b).map_err(|err| ArchiveError::io(b, err))?.len();
    if len_a != len_b {
        return Ok(false);
    }

    let mut ra = BufReader::new(File::open(a).map_err(|err| ArchiveError::io(a, err))?);
    let mut rb = BufReader::new(File::open(b).map_err(|err| ArchiveError::io(b, err))?);
    let mut buf_a = [0u8; 8192];
    let mut buf_b = [0u8; 8192];
    loop {
        let n = ra.read(&mut buf_a).map_err(|err| ArchiveError::io(a, err))?;
        if n == 0 {
            return Ok(true);
        }
        rb.read_exact(&mut buf_b[..n])
            .map_err(|err| ArchiveError::io(b, err))?;
        if buf_a[..n] != buf_b[..n] {
            return Ok(false);
        }
    }
}

/// Removes `dir` with everything under it and creates it empty.
pub fn recreate_dir(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(ArchiveError::io(dir, err)),
    }
    fs::create_dir_all(dir).map_err(|err| ArchiveError::io(dir, err))
}

pub fn write_file(path: &Path, contents: &str) -> Result<()> {
    ensure_parent(path)?;
    fs::write(path, contents).map_err(|err| ArchiveError::io(path, err))
}

/// Recursive copy of `src` into `dst`, merging with whatever is already there.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<u64> {
    let mut copied = 0u64;
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry.map_err(|err| ArchiveError::io(src, io::Error::from(err)))?;
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|err| ArchiveError::io(&target, err))?;
        } else {
            ensure_parent(&target)?;
            fs::copy(entry.path(), &target).map_err(|err| ArchiveError::io(&target, err))?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Creates `link` pointing at `target` through a relative path.
pub fn relative_symlink(target: &Path, link: &Path) -> Result<()> {
    ensure_parent(link)?;
    let abs_target = std::path::absolute(target).map_err(|err| ArchiveError::io(target, err))?;
    let abs_link = std::path::absolute(link).map_err(|err| ArchiveError::io(link, err))?;
    let base = abs_link.parent().unwrap_or(Path::new("/"));
    let rel = relative_path(&abs_target, base);
    symlink(&rel, link, abs_target.is_dir()).map_err(|err| ArchiveError::io(link, err))
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path, _is_dir: bool) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path, is_dir: bool) -> io::Result<()> {
    if is_dir {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    }
}

/// Installs a directory under the output root, linked or copied.
pub fn install_dir(src: &Path, dst: &Path, symlink: bool) -> Result<()> {
    if symlink {
        relative_symlink(src, dst)
    } else {
        copy_tree(src, dst).map(|_| ())
    }
}

pub fn install_file(src: &Path, dst: &Path, symlink: bool) -> Result<()> {
    if symlink {
        relative_symlink(src, dst)
    } else {
        ensure_parent(dst)?;
        fs::copy(src, dst)
            .map(|_| ())
            .map_err(|err| ArchiveError::io(dst, err))
    }
}
