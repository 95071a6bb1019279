//! In-memory filesystem implementation
//!
//! Paths are absolute and normalized; nodes are keyed by path and open
//! handles live in a slab. The whole tree can be captured as a serializable
//! snapshot and restored later.

use super::{FileHandle, FileSystem, Metadata, OpenOptions};
use crate::error::SnapshotError;
use serde::{Deserialize, Serialize};
use slab::Slab;
use std::collections::{BTreeMap, HashMap};
use std::io;

/// A file's path and position
struct OpenFile {
    path: String,
    position: usize,
    readable: bool,
    writable: bool,
}

/// A stored file or directory
#[derive(Clone)]
enum Node {
    File(Vec<u8>),
    Directory,
}

/// Serializable copy of a `MemoryFs`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsSnapshot {
    pub dirs: Vec<String>,
    pub files: BTreeMap<String, Vec<u8>>,
}

impl FsSnapshot {
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<(), SnapshotError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, SnapshotError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

/// In-memory filesystem
pub struct MemoryFs {
    /// All files and directories, keyed by path
    nodes: HashMap<String, Node>,
    /// Open file handles
    handles: Slab<OpenFile>,
}

impl MemoryFs {
    pub fn new() -> Self {
        let mut fs = Self {
            nodes: HashMap::new(),
            handles: Slab::new(),
        };
        // Root directory always exists
        fs.nodes.insert("/".to_string(), Node::Directory);
        fs
    }

    /// Normalize a path (leading slash, no trailing slash except root)
    fn normalize_path(path: &str) -> String {
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        format!("/{}", parts.join("/"))
    }

    /// Get parent directory of a path
    fn parent_path(path: &str) -> Option<String> {
        if path == "/" {
            return None;
        }
        let idx = path.rfind('/')?;
        if idx == 0 {
            Some("/".to_string())
        } else {
            Some(path[..idx].to_string())
        }
    }

    /// Ensure the parent directory exists
    fn ensure_parent(&self, path: &str) -> io::Result<()> {
        if let Some(parent) = Self::parent_path(path) {
            match self.nodes.get(&parent) {
                Some(Node::Directory) => {}
                Some(Node::File(_)) => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("Not a directory: {}", parent),
                    ));
                }
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("Parent directory not found: {}", parent),
                    ));
                }
            }
        }
        Ok(())
    }

    fn handle(&mut self, handle: FileHandle) -> io::Result<&mut OpenFile> {
        self.handles
            .get_mut(handle)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Invalid file handle"))
    }

    /// Capture every file and directory
    pub fn snapshot(&self) -> FsSnapshot {
        let mut snapshot = FsSnapshot::default();
        for (path, node) in &self.nodes {
            match node {
                Node::Directory => snapshot.dirs.push(path.clone()),
                Node::File(data) => {
                    snapshot.files.insert(path.clone(), data.clone());
                }
            }
        }
        snapshot.dirs.sort();
        snapshot
    }

    /// Build a filesystem from a snapshot.
    ///
    /// Missing parent directories are created, so a hand-written snapshot
    /// only needs to list files.
    pub fn restore(snapshot: &FsSnapshot) -> Self {
        let mut fs = Self::new();
        let file_parents = snapshot.files.keys().filter_map(|p| {
            let p = Self::normalize_path(p);
            Self::parent_path(&p)
        });
        let dirs: Vec<String> = snapshot
            .dirs
            .iter()
            .map(|d| Self::normalize_path(d))
            .chain(file_parents)
            .collect();

        for dir in dirs {
            let mut current = String::new();
            for part in dir.split('/').filter(|p| !p.is_empty()) {
                current.push('/');
                current.push_str(part);
                fs.nodes.entry(current.clone()).or_insert(Node::Directory);
            }
        }
        for (path, data) in &snapshot.files {
            fs.nodes
                .insert(Self::normalize_path(path), Node::File(data.clone()));
        }
        fs
    }
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for MemoryFs {
    fn open(&mut self, path: &str, options: OpenOptions) -> io::Result<FileHandle> {
        let path = Self::normalize_path(path);

        if !self.nodes.contains_key(&path) {
            if !options.create {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ));
            }
            self.ensure_parent(&path)?;
            self.nodes.insert(path.clone(), Node::File(Vec::new()));
        }

        let position = match self.nodes.get_mut(&path) {
            Some(Node::File(data)) => {
                if options.truncate {
                    data.clear();
                }
                if options.append { data.len() } else { 0 }
            }
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Is a directory: {}", path),
                ));
            }
        };

        Ok(self.handles.insert(OpenFile {
            path,
            position,
            readable: options.read,
            writable: options.write,
        }))
    }

    fn close(&mut self, handle: FileHandle) -> io::Result<()> {
        if self.handles.contains(handle) {
            self.handles.remove(handle);
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Invalid file handle",
            ))
        }
    }

    fn read(&mut self, handle: FileHandle, buf: &mut [u8]) -> io::Result<usize> {
        let file = self.handle(handle)?;
        if !file.readable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "File not opened for reading",
            ));
        }
        let path = file.path.clone();
        let position = file.position;

        let data = match self.nodes.get(&path) {
            Some(Node::File(data)) => data,
            _ => return Err(io::Error::new(io::ErrorKind::NotFound, "File not found")),
        };

        let available = data.len().saturating_sub(position);
        let to_read = buf.len().min(available);
        buf[..to_read].copy_from_slice(&data[position..position + to_read]);

        self.handle(handle)?.position += to_read;
        Ok(to_read)
    }

    fn write(&mut self, handle: FileHandle, buf: &[u8]) -> io::Result<usize> {
        let file = self.handle(handle)?;
        if !file.writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "File not opened for writing",
            ));
        }
        let path = file.path.clone();
        let position = file.position;

        let data = match self.nodes.get_mut(&path) {
            Some(Node::File(data)) => data,
            _ => return Err(io::Error::new(io::ErrorKind::NotFound, "File not found")),
        };

        // Extend file if necessary
        if position + buf.len() > data.len() {
            data.resize(position + buf.len(), 0);
        }
        data[position..position + buf.len()].copy_from_slice(buf);

        self.handle(handle)?.position += buf.len();
        Ok(buf.len())
    }

    fn metadata(&self, path: &str) -> io::Result<Metadata> {
        let path = Self::normalize_path(path);

        match self.nodes.get(&path) {
            Some(Node::File(data)) => Ok(Metadata {
                size: data.len() as u64,
                is_dir: false,
                is_file: true,
            }),
            Some(Node::Directory) => Ok(Metadata {
                size: 0,
                is_dir: true,
                is_file: false,
            }),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Path not found: {}", path),
            )),
        }
    }

    fn create_dir(&mut self, path: &str) -> io::Result<()> {
        let path = Self::normalize_path(path);

        if self.nodes.contains_key(&path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "Path already exists",
            ));
        }

        self.ensure_parent(&path)?;
        self.nodes.insert(path, Node::Directory);
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.nodes.contains_key(&Self::normalize_path(path))
    }
}
