//! C5 — Virtual File System: guest path prefixes mounted onto host
//! directories, with a bounds-safe file-descriptor table.

use crate::error::VfsError;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub mod open_flags {
    pub const O_RDONLY: u32 = 0;
    pub const O_WRONLY: u32 = 1;
    pub const O_RDWR: u32 = 2;
    pub const O_CREAT: u32 = 0o100;
    pub const O_TRUNC: u32 = 0o1000;
    pub const O_APPEND: u32 = 0o2000;
    pub const O_NONBLOCK: u32 = 0o4000;
    pub const O_DIRECTORY: u32 = 0o200_000;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags(pub u32);

impl OpenFlags {
    pub fn readable(self) -> bool {
        self.0 & 0o3 == open_flags::O_RDONLY || self.0 & 0o3 == open_flags::O_RDWR
    }
    pub fn writable(self) -> bool {
        self.0 & 0o3 == open_flags::O_WRONLY || self.0 & 0o3 == open_flags::O_RDWR
    }
    pub fn create(self) -> bool {
        self.0 & open_flags::O_CREAT != 0
    }
    pub fn truncate(self) -> bool {
        self.0 & open_flags::O_TRUNC != 0
    }
    pub fn append(self) -> bool {
        self.0 & open_flags::O_APPEND != 0
    }
    pub fn directory(self) -> bool {
        self.0 & open_flags::O_DIRECTORY != 0
    }
}

#[derive(Debug, Clone, Copy)]
pub enum SeekWhence {
    Start,
    Current,
    End,
}

/// Packed layout, field-for-field per spec §6.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct Stat {
    pub st_dev: u32,
    pub st_ino: u32,
    pub st_mode: u16,
    pub st_nlink: u16,
    pub st_uid: u32,
    pub st_gid: u32,
    pub st_rdev: u32,
    pub st_size: i64,
    pub st_atime: i64,
    pub st_mtime: i64,
    pub st_ctime: i64,
    pub st_blksize: i64,
    pub st_blocks: i64,
}

const S_IFREG: u16 = 0o100644;
const S_IFDIR: u16 = 0o040755;

struct FileHandle {
    host_path: PathBuf,
    is_directory: bool,
    stream: Option<File>,
}

pub struct VirtualFileSystem {
    mounts: Mutex<HashMap<String, PathBuf>>,
    handles: Mutex<HashMap<u32, FileHandle>>,
    next_fd: Mutex<u32>,
}

impl Default for VirtualFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualFileSystem {
    pub fn new() -> Self {
        Self {
            mounts: Mutex::new(HashMap::new()),
            handles: Mutex::new(HashMap::new()),
            next_fd: Mutex::new(10),
        }
    }

    fn normalize_prefix(prefix: &str) -> String {
        let trimmed = prefix.trim_end_matches('/');
        if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        }
    }

    pub fn mount(&self, guest_prefix: &str, host_root: &Path) -> Result<(), VfsError> {
        let canonical = host_root.canonicalize().map_err(|e| VfsError::Io(e.to_string()))?;
        if !canonical.is_dir() {
            return Err(VfsError::NotFound);
        }
        self.mounts.lock().unwrap().insert(Self::normalize_prefix(guest_prefix), canonical);
        Ok(())
    }

    /// Resolves a guest path to a canonical host path, selecting the
    /// longest-matching mount prefix and rejecting any escape from the
    /// mount root (spec §4.6).
    fn resolve(&self, guest_path: &str) -> Option<PathBuf> {
        let mounts = self.mounts.lock().unwrap();
        let normalized = if guest_path.starts_with('/') {
            guest_path.to_string()
        } else {
            format!("/{guest_path}")
        };

        let best = mounts
            .iter()
            .filter(|(prefix, _)| {
                normalized == prefix.as_str() || normalized.starts_with(&format!("{prefix}/"))
            })
            .max_by_key(|(prefix, _)| prefix.len())?;

        let (prefix, root) = best;
        let remainder = normalized.strip_prefix(prefix.as_str()).unwrap_or("");
        let remainder = remainder.trim_start_matches('/');
        let candidate = if remainder.is_empty() { root.clone() } else { root.join(remainder) };

        // Escape check: canonicalize what exists, and verify the root is a
        // prefix of the canonical result. For paths that don't exist yet
        // (O_CREAT targets) canonicalize the parent instead.
        let canonical = if candidate.exists() {
            candidate.canonicalize().ok()?
        } else {
            let parent = candidate.parent()?;
            let canon_parent = parent.canonicalize().ok()?;
            canon_parent.join(candidate.file_name()?)
        };

        if canonical.starts_with(root) {
            Some(canonical)
        } else {
            None
        }
    }

    fn allocate_fd(&self) -> u32 {
        let mut next = self.next_fd.lock().unwrap();
        let fd = *next;
        *next += 1;
        fd
    }

    pub fn open(&self, guest_path: &str, flags: OpenFlags) -> Result<u32, VfsError> {
        let host_path = self.resolve(guest_path).ok_or(VfsError::NotFound)?;

        if flags.directory() {
            if !host_path.is_dir() {
                return Err(VfsError::NotFound);
            }
            let fd = self.allocate_fd();
            self.handles.lock().unwrap().insert(
                fd,
                FileHandle { host_path, is_directory: true, stream: None },
            );
            return Ok(fd);
        }

        let mut options = OpenOptions::new();
        options.read(flags.readable()).write(flags.writable());
        if flags.create() {
            options.create(true);
        }
        if flags.truncate() {
            options.truncate(true);
        }
        if flags.append() {
            options.append(true);
        }

        let file = options.open(&host_path).map_err(Self::io_to_vfs_error)?;
        let fd = self.allocate_fd();
        self.handles
            .lock()
            .unwrap()
            .insert(fd, FileHandle { host_path, is_directory: false, stream: Some(file) });
        Ok(fd)
    }

    pub fn open_directory(&self, guest_path: &str) -> Result<u32, VfsError> {
        self.open(guest_path, OpenFlags(open_flags::O_DIRECTORY | open_flags::O_RDONLY))
    }

    fn io_to_vfs_error(e: std::io::Error) -> VfsError {
        use std::io::ErrorKind::*;
        match e.kind() {
            NotFound => VfsError::NotFound,
            PermissionDenied => VfsError::PermissionDenied,
            AlreadyExists => VfsError::AlreadyExists,
            _ => VfsError::Io(e.to_string()),
        }
    }

    pub fn close(&self, fd: u32) -> Result<(), VfsError> {
        self.handles.lock().unwrap().remove(&fd).map(|_| ()).ok_or(VfsError::BadFd)
    }

    pub fn read(&self, fd: u32, dst: &mut [u8]) -> Result<usize, VfsError> {
        let mut handles = self.handles.lock().unwrap();
        let handle = handles.get_mut(&fd).ok_or(VfsError::BadFd)?;
        let stream = handle.stream.as_mut().ok_or(VfsError::InvalidArgument)?;
        stream.read(dst).map_err(|e| VfsError::Io(e.to_string()))
    }

    pub fn write(&self, fd: u32, src: &[u8]) -> Result<usize, VfsError> {
        let mut handles = self.handles.lock().unwrap();
        let handle = handles.get_mut(&fd).ok_or(VfsError::BadFd)?;
        let stream = handle.stream.as_mut().ok_or(VfsError::InvalidArgument)?;
        stream.write(src).map_err(|e| VfsError::Io(e.to_string()))
    }

    pub fn seek(&self, fd: u32, offset: i64, whence: SeekWhence) -> Result<u64, VfsError> {
        let mut handles = self.handles.lock().unwrap();
        let handle = handles.get_mut(&fd).ok_or(VfsError::BadFd)?;
        let stream = handle.stream.as_mut().ok_or(VfsError::InvalidArgument)?;
        let pos = match whence {
            SeekWhence::Start => SeekFrom::Start(offset as u64),
            SeekWhence::Current => SeekFrom::Current(offset),
            SeekWhence::End => SeekFrom::End(offset),
        };
        stream.seek(pos).map_err(|e| VfsError::Io(e.to_string()))
    }

    fn stat_host_path(path: &Path) -> Result<Stat, VfsError> {
        let meta = fs::metadata(path).map_err(Self::io_to_vfs_error)?;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let size = meta.len() as i64;
        Ok(Stat {
            st_dev: 0,
            st_ino: 0,
            st_mode: if meta.is_dir() { S_IFDIR } else { S_IFREG },
            st_nlink: 1,
            st_uid: 0,
            st_gid: 0,
            st_rdev: 0,
            st_size: size,
            st_atime: mtime,
            st_mtime: mtime,
            st_ctime: mtime,
            st_blksize: 4096,
            st_blocks: (size + 511) / 512,
        })
    }

    pub fn stat_fd(&self, fd: u32) -> Result<Stat, VfsError> {
        let handles = self.handles.lock().unwrap();
        let handle = handles.get(&fd).ok_or(VfsError::BadFd)?;
        Self::stat_host_path(&handle.host_path)
    }

    pub fn stat_path(&self, guest_path: &str) -> Result<Stat, VfsError> {
        let host_path = self.resolve(guest_path).ok_or(VfsError::NotFound)?;
        Self::stat_host_path(&host_path)
    }

    pub fn exists(&self, guest_path: &str) -> bool {
        self.resolve(guest_path).map(|p| p.exists()).unwrap_or(false)
    }

    /// Removes the host file a guest path resolves to. Used by `sys_unlink`.
    pub fn remove_file(&self, guest_path: &str) -> Result<(), VfsError> {
        let host_path = self.resolve(guest_path).ok_or(VfsError::NotFound)?;
        fs::remove_file(&host_path).map_err(Self::io_to_vfs_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn remove_file_deletes_host_entry() {
        let dir = tempdir().unwrap();
        let vfs = VirtualFileSystem::new();
        vfs.mount("/app0", dir.path()).unwrap();
        fs::write(dir.path().join("doomed.dat"), b"x").unwrap();

        assert!(vfs.exists("/app0/doomed.dat"));
        vfs.remove_file("/app0/doomed.dat").unwrap();
        assert!(!vfs.exists("/app0/doomed.dat"));
    }

    #[test]
    fn remove_file_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let vfs = VirtualFileSystem::new();
        vfs.mount("/app0", dir.path()).unwrap();
        assert!(matches!(vfs.remove_file("/app0/missing.dat"), Err(VfsError::NotFound)));
    }

    #[test]
    fn mount_and_open_round_trips_write_then_read() {
        let dir = tempdir().unwrap();
        let vfs = VirtualFileSystem::new();
        vfs.mount("/app0", dir.path()).unwrap();

        let fd = vfs
            .open("/app0/save.dat", OpenFlags(open_flags::O_RDWR | open_flags::O_CREAT))
            .unwrap();
        assert!(fd >= 10);
        vfs.write(fd, b"hello").unwrap();
        vfs.seek(fd, 0, SeekWhence::Start).unwrap();
        let mut buf = [0u8; 5];
        let n = vfs.read(fd, &mut buf).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn close_then_subsequent_ops_return_bad_fd() {
        let dir = tempdir().unwrap();
        let vfs = VirtualFileSystem::new();
        vfs.mount("/app0", dir.path()).unwrap();
        let fd = vfs
            .open("/app0/x.dat", OpenFlags(open_flags::O_RDWR | open_flags::O_CREAT))
            .unwrap();
        vfs.close(fd).unwrap();
        assert!(matches!(vfs.read(fd, &mut [0u8; 1]), Err(VfsError::BadFd)));
        assert!(matches!(vfs.write(fd, b"x"), Err(VfsError::BadFd)));
        assert!(matches!(vfs.stat_fd(fd), Err(VfsError::BadFd)));
    }

    #[test]
    fn escape_attempt_is_rejected() {
        let dir = tempdir().unwrap();
        let vfs = VirtualFileSystem::new();
        vfs.mount("/app0", dir.path()).unwrap();
        let result = vfs.open("/app0/../../etc/passwd", OpenFlags(open_flags::O_RDONLY));
        assert!(matches!(result, Err(VfsError::NotFound)));
    }

    #[test]
    fn longest_prefix_match_wins() {
        let outer = tempdir().unwrap();
        let inner_path = outer.path().join("inner");
        fs::create_dir(&inner_path).unwrap();
        fs::write(inner_path.join("f.txt"), b"inner").unwrap();
        fs::write(outer.path().join("f.txt"), b"outer").unwrap();

        let vfs = VirtualFileSystem::new();
        vfs.mount("/a", outer.path()).unwrap();
        vfs.mount("/a/inner", &inner_path).unwrap();

        let fd = vfs.open("/a/inner/f.txt", OpenFlags(open_flags::O_RDONLY)).unwrap();
        let mut buf = [0u8; 5];
        vfs.read(fd, &mut buf).unwrap();
        assert_eq!(&buf, b"inner");
    }

    #[test]
    fn stat_distinguishes_files_and_directories() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("f.txt"), b"x").unwrap();
        let vfs = VirtualFileSystem::new();
        vfs.mount("/a", dir.path()).unwrap();
        let file_stat = vfs.stat_path("/a/f.txt").unwrap();
        let file_mode = file_stat.st_mode;
        assert_eq!(file_mode, S_IFREG);
        let dir_stat = vfs.stat_path("/a").unwrap();
        let dir_mode = dir_stat.st_mode;
        assert_eq!(dir_mode, S_IFDIR);
    }
}
