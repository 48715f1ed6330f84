//! Path resolution with sandbox containment

use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use super::SandboxError;

/// A named base directory exposed to clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxRoot {
    pub name: String,
    pub base_path: PathBuf,
}

impl SandboxRoot {
    /// Build a root, making `base_path` absolute without touching the filesystem
    pub fn new(name: &str, base_path: impl AsRef<Path>) -> Result<Self, SandboxError> {
        if name.is_empty() || name.contains('/') {
            return Err(SandboxError::InvalidName(name.to_string()));
        }
        let base = base_path.as_ref();
        let absolute = std::path::absolute(base).map_err(|source| SandboxError::BasePath {
            path: base.display().to_string(),
            source,
        })?;
        Ok(Self {
            name: name.to_string(),
            base_path: normalize_lexically(&absolute),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// Filesystem entry that passed the containment check and the metadata probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntry {
    pub absolute_path: PathBuf,
    pub kind: EntryKind,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl ResolvedEntry {
    /// Last path component, used for `Content-Disposition`
    pub fn file_name(&self) -> String {
        self.absolute_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// One child of a listed directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// Outcome of resolving a request path
#[derive(Debug)]
pub enum Resolution {
    NotFound,
    /// Directory and its immediate children, in filesystem order
    Directory {
        entry: ResolvedEntry,
        children: Vec<DirEntry>,
    },
    File(ResolvedEntry),
}

/// Resolves request paths against an immutable list of shares
#[derive(Debug, Clone)]
pub struct PathResolver {
    roots: Vec<SandboxRoot>,
}

impl PathResolver {
    pub fn new(roots: Vec<SandboxRoot>) -> Result<Self, SandboxError> {
        for (i, root) in roots.iter().enumerate() {
            if roots[..i].iter().any(|r| r.name == root.name) {
                return Err(SandboxError::DuplicateName(root.name.clone()));
            }
        }
        Ok(Self { roots })
    }

    pub fn roots(&self) -> &[SandboxRoot] {
        &self.roots
    }

    /// Share index shown at `/`: every configured share as a directory
    pub fn share_index(&self) -> Vec<DirEntry> {
        self.roots
            .iter()
            .map(|r| DirEntry {
                name: r.name.clone(),
                kind: EntryKind::Directory,
            })
            .collect()
    }

    fn root(&self, name: &str) -> Option<&SandboxRoot> {
        self.roots.iter().find(|r| r.name == name)
    }

    /// Lexical part of resolution: share lookup, join, normalization, containment.
    ///
    /// Does not touch the filesystem and does not follow symlinks, so a link inside
    /// a share that points elsewhere is still served.
    pub fn locate(&self, request_path: &str) -> Option<PathBuf> {
        let trimmed = request_path.strip_prefix('/').unwrap_or(request_path);
        let (name, remainder) = trimmed.split_once('/').unwrap_or((trimmed, ""));
        let root = self.root(name)?;

        let mut joined = root.base_path.clone();
        for component in Path::new(remainder).components() {
            match component {
                Component::Normal(part) => joined.push(part),
                Component::ParentDir => joined.push(".."),
                Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            }
        }
        let candidate = normalize_lexically(&joined);

        if candidate.starts_with(&root.base_path) {
            Some(candidate)
        } else {
            None
        }
    }

    /// Resolve a decoded request path to a file, a directory listing, or nothing
    pub async fn resolve(&self, request_path: &str) -> io::Result<Resolution> {
        let Some(path) = self.locate(request_path) else {
            return Ok(Resolution::NotFound);
        };

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Resolution::NotFound),
            Err(e) => return Err(e),
        };

        // FIFOs, sockets and devices can block on open, so only regular files and
        // directories are served
        let kind = if metadata.is_dir() {
            EntryKind::Directory
        } else if metadata.is_file() {
            EntryKind::File
        } else {
            return Ok(Resolution::NotFound);
        };
        let entry = ResolvedEntry {
            absolute_path: path,
            kind,
            size: metadata.len(),
            modified: metadata.modified().ok(),
        };

        match kind {
            EntryKind::File => Ok(Resolution::File(entry)),
            EntryKind::Directory => {
                let children = list_children(&entry.absolute_path).await?;
                Ok(Resolution::Directory { entry, children })
            }
        }
    }
}

async fn list_children(dir: &Path) -> io::Result<Vec<DirEntry>> {
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    let mut children = Vec::new();
    while let Some(child) = read_dir.next_entry().await? {
        let kind = if child.file_type().await?.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        children.push(DirEntry {
            name: child.file_name().to_string_lossy().into_owned(),
            kind,
        });
    }
    Ok(children)
}

/// Collapse `.` and `..` without consulting the filesystem.
///
/// `..` at the root stays at the root.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !matches!(
                    out.components().next_back(),
                    None | Some(Component::RootDir | Component::Prefix(_))
                ) {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
