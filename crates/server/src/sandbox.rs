//! Path containment under the served root directory.

use std::io;
use std::path::{Component, Path, PathBuf};

use nioftp_protocol::ErrorKind;

/// Why a requested path cannot be served.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("no such file or directory: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("I/O failure on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl SandboxError {
    /// Maps a filesystem error on `requested` to the nearest protocol error.
    pub fn from_io(requested: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => SandboxError::NotFound(requested.to_owned()),
            io::ErrorKind::PermissionDenied => SandboxError::AccessDenied(requested.to_owned()),
            _ => SandboxError::Io {
                path: requested.to_owned(),
                source: err,
            },
        }
    }

    /// Wire error kind for this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SandboxError::AccessDenied(_) => ErrorKind::AccessDenied,
            SandboxError::NotFound(_) => ErrorKind::NotFound,
            SandboxError::NotADirectory(_) => ErrorKind::NotADirectory,
            SandboxError::Io { .. } => ErrorKind::IoFailure,
        }
    }

    /// Detail string sent to the peer (the requested path).
    pub fn detail(&self) -> &str {
        match self {
            SandboxError::AccessDenied(p)
            | SandboxError::NotFound(p)
            | SandboxError::NotADirectory(p) => p,
            SandboxError::Io { path, .. } => path,
        }
    }
}

/// The directory beyond which no request may read or list.
#[derive(Debug, Clone)]
pub struct SandboxRoot {
    /// Root as given, made absolute and lexically normalized.
    given: PathBuf,
    /// Root with all symlinks resolved.
    canonical: PathBuf,
}

impl SandboxRoot {
    /// Opens `root`, which must be an existing directory.
    pub fn new(root: &Path) -> io::Result<Self> {
        let canonical = root.canonicalize()?;
        if !canonical.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a directory: {}", root.display()),
            ));
        }
        let absolute = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()?.join(root)
        };
        Ok(Self {
            given: normalize(&absolute),
            canonical,
        })
    }

    /// The canonical root directory.
    pub fn path(&self) -> &Path {
        &self.canonical
    }

    /// Resolves a requested path to an existing filesystem path inside the root.
    ///
    /// Relative requests are taken relative to the root; absolute requests
    /// are used as they are and must point inside it. The result is
    /// canonical, so neither `..` segments nor symbolic links can lead out of
    /// the root.
    pub fn resolve(&self, requested: &str) -> Result<PathBuf, SandboxError> {
        if requested.contains('\0') {
            return Err(SandboxError::AccessDenied(requested.to_owned()));
        }

        let lexical = normalize(&self.canonical.join(requested));
        if !is_within(&lexical, &self.canonical) && !is_within(&lexical, &self.given) {
            return Err(SandboxError::AccessDenied(requested.to_owned()));
        }

        let resolved = lexical
            .canonicalize()
            .map_err(|e| SandboxError::from_io(requested, e))?;
        if !is_within(&resolved, &self.canonical) {
            return Err(SandboxError::AccessDenied(requested.to_owned()));
        }

        Ok(resolved)
    }

    /// Resolves a request that must name a directory.
    pub fn resolve_dir(&self, requested: &str) -> Result<PathBuf, SandboxError> {
        let path = self.resolve(requested)?;
        if !path.is_dir() {
            return Err(SandboxError::NotADirectory(requested.to_owned()));
        }
        Ok(path)
    }

    /// Resolves a request that must name a regular file.
    pub fn resolve_file(&self, requested: &str) -> Result<PathBuf, SandboxError> {
        let path = self.resolve(requested)?;
        if !path.is_file() {
            return Err(SandboxError::NotFound(requested.to_owned()));
        }
        Ok(path)
    }
}

/// Collapses `.` and `..` without touching the filesystem. `..` at the top
/// of an absolute path stays at the top.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(name) => out.push(name),
        }
    }
    out
}

/// Walks the ancestors of `path` looking for `root`.
fn is_within(path: &Path, root: &Path) -> bool {
    let mut current = Some(path);
    while let Some(p) = current {
        if p == root {
            return true;
        }
        current = p.parent();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, SandboxRoot) {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("sub/file.txt"), "data").unwrap();
        std::fs::write(tmp.path().join("top.txt"), "top").unwrap();
        let root = SandboxRoot::new(tmp.path()).unwrap();
        (tmp, root)
    }

    #[test]
    fn resolves_relative_paths() {
        let (_tmp, root) = fixture();
        let p = root.resolve("sub/file.txt").unwrap();
        assert!(p.starts_with(root.path()));
        assert!(p.ends_with("sub/file.txt"));

        assert_eq!(root.resolve(".").unwrap(), root.path());
        assert_eq!(root.resolve("").unwrap(), root.path());
        assert_eq!(root.resolve("./sub/../sub").unwrap(), root.path().join("sub"));
    }

    #[test]
    fn resolves_absolute_paths_inside_root() {
        let (tmp, root) = fixture();
        let abs = tmp.path().join("top.txt");
        let p = root.resolve(abs.to_str().unwrap()).unwrap();
        assert_eq!(p, root.path().join("top.txt"));
    }

    #[test]
    fn rejects_parent_traversal() {
        let (_tmp, root) = fixture();
        for request in ["..", "../", "../etc/passwd", "sub/../../x", "sub/../../../../.."] {
            assert!(
                matches!(root.resolve(request), Err(SandboxError::AccessDenied(_))),
                "{request}"
            );
        }
    }

    #[test]
    fn rejects_absolute_escape() {
        let (_tmp, root) = fixture();
        assert!(matches!(
            root.resolve("/"),
            Err(SandboxError::AccessDenied(_))
        ));
        assert!(matches!(
            root.resolve("/etc/passwd"),
            Err(SandboxError::AccessDenied(_))
        ));
    }

    #[test]
    fn rejects_sibling_with_common_prefix() {
        let parent = tempfile::tempdir().unwrap();
        std::fs::create_dir(parent.path().join("root")).unwrap();
        std::fs::create_dir(parent.path().join("rootkit")).unwrap();
        let root = SandboxRoot::new(&parent.path().join("root")).unwrap();

        let sibling = parent.path().join("rootkit");
        assert!(matches!(
            root.resolve(sibling.to_str().unwrap()),
            Err(SandboxError::AccessDenied(_))
        ));
        assert!(matches!(
            root.resolve("../rootkit"),
            Err(SandboxError::AccessDenied(_))
        ));
    }

    #[test]
    fn rejects_nul_byte() {
        let (_tmp, root) = fixture();
        assert!(matches!(
            root.resolve("top\0.txt"),
            Err(SandboxError::AccessDenied(_))
        ));
    }

    #[test]
    fn missing_path_is_not_found() {
        let (_tmp, root) = fixture();
        assert!(matches!(
            root.resolve("nope"),
            Err(SandboxError::NotFound(_))
        ));
    }

    #[test]
    fn kind_checks() {
        let (_tmp, root) = fixture();
        assert!(matches!(
            root.resolve_dir("top.txt"),
            Err(SandboxError::NotADirectory(_))
        ));
        assert!(matches!(
            root.resolve_file("sub"),
            Err(SandboxError::NotFound(_))
        ));
        assert!(root.resolve_dir("sub").is_ok());
        assert!(root.resolve_file("sub/file.txt").is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlink_escape() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret"), "s").unwrap();
        let (tmp, root) = fixture();
        std::os::unix::fs::symlink(outside.path(), tmp.path().join("link")).unwrap();

        assert!(matches!(
            root.resolve("link"),
            Err(SandboxError::AccessDenied(_))
        ));
        assert!(matches!(
            root.resolve("link/secret"),
            Err(SandboxError::AccessDenied(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn follows_symlinks_that_stay_inside() {
        let (tmp, root) = fixture();
        std::os::unix::fs::symlink(tmp.path().join("sub"), tmp.path().join("alias")).unwrap();
        assert_eq!(
            root.resolve("alias/file.txt").unwrap(),
            root.path().join("sub/file.txt")
        );
    }

    #[test]
    fn error_kinds_map_to_wire() {
        assert_eq!(
            SandboxError::AccessDenied("x".into()).kind(),
            ErrorKind::AccessDenied
        );
        let io = SandboxError::from_io("y", io::Error::other("boom"));
        assert_eq!(io.kind(), ErrorKind::IoFailure);
        assert_eq!(io.detail(), "y");
        assert_eq!(
            SandboxError::from_io("z", io::ErrorKind::PermissionDenied.into()).kind(),
            ErrorKind::AccessDenied
        );
    }

    #[test]
    fn root_must_be_a_directory() {
        let (tmp, _root) = fixture();
        assert!(SandboxRoot::new(&tmp.path().join("top.txt")).is_err());
        assert!(SandboxRoot::new(&tmp.path().join("missing")).is_err());
    }
}
