//! Virtual File System
//!
//! Two layers:
//! - `FileSystem`: handle-based backend interface (open, read, write, close)
//! - `Storage`: whole-file operations used by redirection and programs,
//!   shareable across threads
//!
//! Any `Mutex<F>` over a backend is a `Storage`.

pub mod memory;

pub use memory::{FsSnapshot, MemoryFs};

use std::io;
use std::sync::Mutex;

/// A file handle
pub type FileHandle = usize;

/// File open modes
#[derive(Debug, Clone, Copy)]
pub struct OpenOptions {
    pub read: bool,
    pub write: bool,
    pub create: bool,
    pub truncate: bool,
    pub append: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            read: true,
            write: false,
            create: false,
            truncate: false,
            append: false,
        }
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }

    pub fn write(mut self, write: bool) -> Self {
        self.write = write;
        self
    }

    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    pub fn truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }

    /// Start writing at the end of the file
    pub fn append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }
}

/// File metadata
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub size: u64,
    pub is_dir: bool,
    pub is_file: bool,
}

/// The FileSystem trait - implement this for different backends
pub trait FileSystem {
    /// Open a file, returning a handle
    fn open(&mut self, path: &str, options: OpenOptions) -> io::Result<FileHandle>;

    /// Close a file handle
    fn close(&mut self, handle: FileHandle) -> io::Result<()>;

    /// Read from a file
    fn read(&mut self, handle: FileHandle, buf: &mut [u8]) -> io::Result<usize>;

    /// Write to a file
    fn write(&mut self, handle: FileHandle, buf: &[u8]) -> io::Result<usize>;

    /// Get file metadata
    fn metadata(&self, path: &str) -> io::Result<Metadata>;

    /// Create a directory
    fn create_dir(&mut self, path: &str) -> io::Result<()>;

    /// Check if path exists
    fn exists(&self, path: &str) -> bool;
}

/// Whole-file storage operations, safe to share between processes
pub trait Storage: Send + Sync {
    /// Read a whole file
    fn read(&self, path: &str) -> io::Result<Vec<u8>>;

    /// Write `data` to a file, creating it if needed.
    ///
    /// With `append` false the file is truncated first.
    fn write(&self, path: &str, data: &[u8], append: bool) -> io::Result<()>;

    fn exists(&self, path: &str) -> bool;

    fn is_dir(&self, path: &str) -> bool;

    /// Create a directory and any missing parents
    fn create_dir_all(&self, path: &str) -> io::Result<()>;
}

impl<F: FileSystem + Send> Storage for Mutex<F> {
    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        let mut fs = crate::kernel::lock(self);
        read_all(&mut *fs, path)
    }

    fn write(&self, path: &str, data: &[u8], append: bool) -> io::Result<()> {
        let mut fs = crate::kernel::lock(self);
        let options = OpenOptions::new()
            .read(false)
            .write(true)
            .create(true)
            .truncate(!append)
            .append(append);
        let handle = fs.open(path, options)?;
        let written = fs.write(handle, data);
        fs.close(handle)?;
        written.map(|_| ())
    }

    fn exists(&self, path: &str) -> bool {
        crate::kernel::lock(self).exists(path)
    }

    fn is_dir(&self, path: &str) -> bool {
        crate::kernel::lock(self)
            .metadata(path)
            .map(|m| m.is_dir)
            .unwrap_or(false)
    }

    fn create_dir_all(&self, path: &str) -> io::Result<()> {
        let mut fs = crate::kernel::lock(self);
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current.push('/');
            current.push_str(part);
            match fs.metadata(&current) {
                Ok(meta) if meta.is_dir => {}
                Ok(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("Not a directory: {}", current),
                    ));
                }
                Err(_) => fs.create_dir(&current)?,
            }
        }
        Ok(())
    }
}

/// Read an entire file through a backend
pub fn read_all<F: FileSystem + ?Sized>(fs: &mut F, path: &str) -> io::Result<Vec<u8>> {
    let meta = fs.metadata(path)?;
    if meta.is_dir {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Is a directory: {}", path),
        ));
    }
    let handle = fs.open(path, OpenOptions::new().read(true))?;
    let mut buf = vec![0u8; meta.size as usize];
    let read = fs.read(handle, &mut buf);
    fs.close(handle)?;
    buf.truncate(read?);
    Ok(buf)
}

/// Convenience wrapper for reading entire file to string
pub fn read_to_string(storage: &dyn Storage, path: &str) -> io::Result<String> {
    let data = storage.read(path)?;
    String::from_utf8(data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Resolve `path` against `base`, folding `.` and `..` components.
///
/// An absolute `path` ignores `base`. The result is always absolute.
pub fn join_path(base: &str, path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    let joined = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{}/{}", base, path)
    };
    for part in joined.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}
