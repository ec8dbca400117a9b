//! Deterministic source tarball

use crate::error::{TransferError, TransferResult};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// What to leave out of the tarball
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackOptions {
    /// Entry names excluded at any depth. `*.ext` matches by suffix.
    pub exclude: Vec<String>,
}

impl Default for PackOptions {
    fn default() -> Self {
        let exclude = [
            ".env",
            ".git",
            "data",
            "__pycache__",
            ".venv",
            "venv",
            ".pytest_cache",
            ".mypy_cache",
            "*.pyc",
            "*.log",
        ];
        Self {
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl PackOptions {
    fn is_excluded(&self, name: &str) -> bool {
        // The secret-bearing file is never packed, whatever the list says.
        if name == ".env" {
            return true;
        }
        self.exclude.iter().any(|pattern| match pattern.strip_prefix('*') {
            Some(suffix) => name.ends_with(suffix),
            None => name == pattern,
        })
    }
}

/// Summary of a packed tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackManifest {
    /// blake3 hex digest of the uncompressed tar stream
    pub digest: String,
    /// Number of regular files packed
    pub files: usize,
    /// Total size of packed file contents
    pub bytes: u64,
    /// Relative paths packed, in archive order
    pub paths: Vec<String>,
}

/// Forwards writes and hashes them on the way through.
struct HashingWriter<W> {
    inner: W,
    hasher: blake3::Hasher,
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Pack `source` into a gzip tarball written to `out`.
///
/// Entries are sorted and carry no timestamps or ownership, so the same
/// tree always yields the same digest.
pub fn pack<W: Write>(source: &Path, out: W, options: &PackOptions) -> TransferResult<PackManifest> {
    if !source.is_dir() {
        return Err(TransferError::SourceMissing(source.to_path_buf()));
    }

    let writer = HashingWriter {
        inner: GzEncoder::new(out, Compression::default()),
        hasher: blake3::Hasher::new(),
    };
    let mut builder = tar::Builder::new(writer);
    builder.mode(tar::HeaderMode::Deterministic);

    let mut files = 0usize;
    let mut bytes = 0u64;
    let mut paths = Vec::new();

    let walker = WalkDir::new(source)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !excluded(e, options));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            if entry.file_type().is_symlink() {
                debug!(path = %entry.path().display(), "Skipping symlink");
            }
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let relative = relative.to_string_lossy().replace('\\', "/");

        let metadata = entry.metadata()?;
        let mut header = tar::Header::new_gnu();
        header.set_size(metadata.len());
        header.set_mode(file_mode(&metadata));
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        header.set_entry_type(tar::EntryType::Regular);

        let file = File::open(entry.path())?;
        builder.append_data(&mut header, &relative, file)?;

        files += 1;
        bytes += metadata.len();
        paths.push(relative);
    }

    let writer = builder.into_inner()?;
    let digest = writer.hasher.finalize().to_hex().to_string();
    writer.inner.finish()?;

    debug!(files, bytes, digest = %digest, "Packed source tree");

    Ok(PackManifest {
        digest,
        files,
        bytes,
        paths,
    })
}

fn excluded(entry: &DirEntry, options: &PackOptions) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| options.is_excluded(name))
        .unwrap_or(false)
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    if metadata.permissions().mode() & 0o111 != 0 {
        0o755
    } else {
        0o644
    }
}

#[cfg(not(unix))]
fn file_mode(_metadata: &std::fs::Metadata) -> u32 {
    0o644
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::fs;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("main.py"), "print('boot')\n").unwrap();
        fs::write(root.join("requirements.txt"), "pybit\n").unwrap();
        fs::write(root.join("Dockerfile"), "FROM python:3.11-slim\n").unwrap();
        fs::write(root.join(".env"), "BYBIT_API_SECRET=hunter2\n").unwrap();
        fs::create_dir_all(root.join("strategy/__pycache__")).unwrap();
        fs::write(root.join("strategy/flip.py"), "def flip(): pass\n").unwrap();
        fs::write(root.join("strategy/__pycache__/flip.cpython-311.pyc"), "x").unwrap();
        fs::create_dir_all(root.join("data")).unwrap();
        fs::write(root.join("data/bot.db"), "sqlite").unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
        dir
    }

    fn entries(archive: &[u8]) -> Vec<String> {
        let mut archive = tar::Archive::new(GzDecoder::new(archive));
        archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_secret_file_and_caches_excluded() {
        let dir = tree();
        let mut out = Vec::new();
        let manifest = pack(dir.path(), &mut out, &PackOptions::default()).unwrap();

        let names = entries(&out);
        assert_eq!(
            names,
            vec!["Dockerfile", "main.py", "requirements.txt", "strategy/flip.py"]
        );
        assert_eq!(manifest.paths, names);
        assert_eq!(manifest.files, 4);
    }

    #[test]
    fn test_env_excluded_even_with_empty_list() {
        let dir = tree();
        let mut out = Vec::new();
        pack(dir.path(), &mut out, &PackOptions { exclude: vec![] }).unwrap();
        assert!(!entries(&out).iter().any(|n| n == ".env"));
    }

    #[test]
    fn test_digest_is_deterministic() {
        let dir = tree();
        let a = pack(dir.path(), Vec::new(), &PackOptions::default()).unwrap();
        let b = pack(dir.path(), Vec::new(), &PackOptions::default()).unwrap();
        assert_eq!(a.digest, b.digest);

        // Secrets and excluded paths do not affect the release identity.
        fs::write(dir.path().join(".env"), "BYBIT_API_SECRET=rotated\n").unwrap();
        fs::write(dir.path().join("data/bot.db"), "more rows").unwrap();
        let c = pack(dir.path(), Vec::new(), &PackOptions::default()).unwrap();
        assert_eq!(a.digest, c.digest);

        fs::write(dir.path().join("main.py"), "print('boot v2')\n").unwrap();
        let d = pack(dir.path(), Vec::new(), &PackOptions::default()).unwrap();
        assert_ne!(a.digest, d.digest);
    }

    #[test]
    fn test_missing_source() {
        let err = pack(Path::new("/nonexistent/keel"), Vec::new(), &PackOptions::default())
            .unwrap_err();
        assert!(matches!(err, TransferError::SourceMissing(_)));
    }
}
