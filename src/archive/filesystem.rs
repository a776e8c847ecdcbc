use crate::archive::format::RawHeader;
use crate::archive::node::{FileNode, Node};
use crate::archive::stat::Stat;
use crate::config::Config;
use crate::error::{AsarError, Result};
use crate::path;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::ops::Range;
use std::path::Path;
use tracing::{debug, trace};

/// Options for [`Filesystem::list_files`]
#[derive(Debug, Clone, Copy)]
pub struct ListOptions {
    /// Descend into directories; otherwise only the root's entries are listed
    pub recursive: bool,
    /// Prefix each path with `pack   : ` or `unpack : `
    pub annotate_unpacked: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            annotate_unpacked: false,
        }
    }
}

/// Read-only view of an asar archive held in memory
///
/// The buffer and the decoded tree never change after construction, so a
/// `Filesystem` can be shared freely between threads.
#[derive(Debug)]
pub struct Filesystem {
    buffer: Vec<u8>,
    header: Value,
    root: Node,
    header_size: u32,
    payload_offset: usize,
    max_symlink_hops: usize,
}

impl Filesystem {
    /// Decode an archive from its bytes
    pub fn new(buffer: impl Into<Vec<u8>>) -> Result<Self> {
        Self::with_config(buffer, &Config::default())
    }

    /// Decode an archive from its bytes with explicit configuration
    pub fn with_config(buffer: impl Into<Vec<u8>>, config: &Config) -> Result<Self> {
        let buffer = buffer.into();
        let raw = RawHeader::decode(&buffer)?;
        let header: Value = serde_json::from_str(&raw.json)
            .map_err(|e| AsarError::MalformedHeader(format!("invalid header JSON: {}", e)))?;
        let root = Node::from_header(&header)?;

        let fs = Self {
            buffer,
            header,
            root,
            header_size: raw.header_size,
            payload_offset: raw.payload_offset,
            max_symlink_hops: config.max_symlink_hops,
        };
        let entry_count = fs.validate_payload_bounds()?;

        debug!(
            header_size = fs.header_size,
            payload_offset = fs.payload_offset,
            entry_count,
            "opened asar archive"
        );
        Ok(fs)
    }

    /// Read an archive file from disk
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, &Config::default())
    }

    /// Read an archive file from disk with explicit configuration
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: &Config) -> Result<Self> {
        let buffer = std::fs::read(path)?;
        Self::with_config(buffer, config)
    }

    /// Check every packed file lies inside the buffer, returning the node count
    fn validate_payload_bounds(&self) -> Result<usize> {
        let mut count = 0;
        for (path, node) in self.root.walk() {
            count += 1;
            if let Node::File(file) = node {
                if !file.unpacked && file.size > 0 {
                    self.payload_range(&path, file)?;
                }
            }
        }
        Ok(count)
    }

    fn payload_range(&self, path: &str, file: &FileNode) -> Result<Range<usize>> {
        let start = (self.payload_offset as u64).checked_add(file.offset);
        let end = start.and_then(|start| start.checked_add(file.size));
        match (start, end) {
            (Some(start), Some(end)) if end <= self.buffer.len() as u64 => {
                Ok(start as usize..end as usize)
            }
            _ => Err(AsarError::TruncatedArchive(format!(
                "{} ({} bytes at offset {}) extends past the {}-byte archive",
                path,
                file.size,
                file.offset,
                self.buffer.len()
            ))),
        }
    }

    /// Raw archive bytes
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Decoded header document
    pub fn header(&self) -> &Value {
        &self.header
    }

    /// Declared size of the header pickle
    pub fn header_size(&self) -> u32 {
        self.header_size
    }

    /// Absolute offset where file payloads start
    pub fn payload_offset(&self) -> usize {
        self.payload_offset
    }

    /// Root directory node
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Find the node at `p` without following a final symlink
    pub fn lookup(&self, p: &str) -> Result<&Node> {
        let normalized = path::join([".", p]);
        let mut node = &self.root;
        for segment in normalized.split('/') {
            if segment.is_empty() || segment == "." {
                continue;
            }
            node = node
                .as_directory()
                .and_then(|dir| dir.entries.get(segment))
                .ok_or_else(|| AsarError::NotFound(p.to_string()))?;
        }
        Ok(node)
    }

    fn resolve_node(&self, p: &str, follow_links: bool) -> Result<&Node> {
        let mut node = self.lookup(p)?;
        if !follow_links {
            return Ok(node);
        }

        let mut hops = 0;
        while let Node::Symlink { link } = node {
            if hops == self.max_symlink_hops {
                return Err(AsarError::SymlinkLoop {
                    path: p.to_string(),
                    hops,
                });
            }
            hops += 1;
            trace!(path = p, target = %link, hops, "following symlink");
            node = self.lookup(link)?;
        }
        Ok(node)
    }

    /// Metadata of `p`, following symlinks
    pub fn stat(&self, p: &str) -> Result<Stat> {
        self.resolve_node(p, true).map(Stat::of)
    }

    /// Metadata of `p` itself, even when it is a symlink
    pub fn lstat(&self, p: &str) -> Result<Stat> {
        self.resolve_node(p, false).map(Stat::of)
    }

    /// Contents of the file at `p`
    pub fn read_file(&self, p: &str) -> Result<&[u8]> {
        let file = self
            .resolve_node(p, true)?
            .as_file()
            .ok_or_else(|| AsarError::NotAFile(p.to_string()))?;

        if file.size == 0 {
            return Ok(&[]);
        }
        if file.unpacked {
            return Err(AsarError::ExternalFileUnavailable(p.to_string()));
        }

        let range = self.payload_range(p, file)?;
        Ok(&self.buffer[range])
    }

    /// Contents of the file at `p` as text
    ///
    /// Invalid UTF-8 sequences become U+FFFD.
    pub fn read_file_to_string(&self, p: &str) -> Result<String> {
        let bytes = self.read_file(p)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Entry names of the directory at `p`, in declared order
    pub fn read_dir(&self, p: &str) -> Result<Vec<String>> {
        let dir = self
            .resolve_node(p, true)?
            .as_directory()
            .ok_or_else(|| AsarError::NotADirectory(p.to_string()))?;
        Ok(dir.entries.keys().cloned().collect())
    }

    /// Whether anything, including a dangling symlink, exists at `p`
    pub fn exists(&self, p: &str) -> bool {
        self.lookup(p).is_ok()
    }

    /// Every path in the archive, directories included, in pre-order
    ///
    /// Without `recursive` only the root's direct entries are listed.
    pub fn list_files(&self, options: ListOptions) -> Vec<String> {
        let label = |(path, node): (String, &Node)| {
            if !options.annotate_unpacked {
                return path;
            }
            let unpacked = node.as_file().map_or(false, |file| file.unpacked);
            let state = if unpacked { "unpack" } else { "pack  " };
            format!("{} : {}", state, path)
        };

        if options.recursive {
            return self.root.walk().map(label).collect();
        }
        match self.root.as_directory() {
            Some(dir) => dir
                .entries
                .iter()
                .map(|(name, node)| label((path::join(["/", name.as_str()]), node)))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Check a file against its recorded integrity hashes
    ///
    /// Returns `Ok(false)` when the header records no integrity for the file.
    pub fn verify_integrity(&self, p: &str) -> Result<bool> {
        let file = self
            .resolve_node(p, true)?
            .as_file()
            .ok_or_else(|| AsarError::NotAFile(p.to_string()))?;
        let Some(integrity) = file.integrity.as_ref() else {
            return Ok(false);
        };

        if !integrity.algorithm.eq_ignore_ascii_case("SHA256") {
            return Err(AsarError::MalformedHeader(format!(
                "unsupported integrity algorithm {} for {}",
                integrity.algorithm, p
            )));
        }
        if integrity.block_size == 0 {
            return Err(AsarError::MalformedHeader(format!(
                "zero integrity block size for {}",
                p
            )));
        }

        let data = self.read_file(p)?;
        check_digest(p, &integrity.hash, data)?;

        if !data.is_empty() {
            let chunks: Vec<&[u8]> = data.chunks(integrity.block_size as usize).collect();
            if chunks.len() != integrity.blocks.len() {
                return Err(AsarError::IntegrityMismatch {
                    path: p.to_string(),
                    expected: format!("{} blocks", integrity.blocks.len()),
                    actual: format!("{} blocks", chunks.len()),
                });
            }
            for (chunk, expected) in chunks.iter().zip(&integrity.blocks) {
                check_digest(p, expected, chunk)?;
            }
        }

        debug!(path = p, "integrity verified");
        Ok(true)
    }
}

fn check_digest(p: &str, expected: &str, data: &[u8]) -> Result<()> {
    let actual = hex::encode(Sha256::digest(data));
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(AsarError::IntegrityMismatch {
            path: p.to_string(),
            expected: expected.to_string(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::format::{align_int, SIZE_PICKLE_LENGTH};
    use tracing_test::traced_test;

    fn archive(json: &str, payload: &[u8]) -> Vec<u8> {
        let header_payload = 4 + align_int(json.len());
        let mut buf = Vec::new();
        buf.extend_from_slice(&4u32.to_le_bytes());
        buf.extend_from_slice(&(header_payload as u32 + 4).to_le_bytes());
        buf.extend_from_slice(&(header_payload as u32).to_le_bytes());
        buf.extend_from_slice(&(json.len() as i32).to_le_bytes());
        buf.extend_from_slice(json.as_bytes());
        buf.resize(SIZE_PICKLE_LENGTH + 4 + header_payload, 0);
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    #[traced_test]
    fn test_open_logs_entry_count() {
        let json = r#"{"files":{"d":{"files":{"a.txt":{"size":2,"offset":"0"}}}}}"#;
        let fs = Filesystem::new(archive(json, b"hi")).unwrap();

        assert_eq!(fs.read_file("d/a.txt").unwrap(), b"hi");
        assert!(logs_contain("opened asar archive"));
        assert!(logs_contain("entry_count=2"));
    }

    #[test]
    fn test_payload_range() {
        let json = r#"{"files":{"a":{"size":3,"offset":"1"}}}"#;
        let fs = Filesystem::new(archive(json, b"xabc")).unwrap();
        let file = fs.lookup("/a").unwrap().as_file().unwrap().clone();

        let range = fs.payload_range("/a", &file).unwrap();
        assert_eq!(range.start, fs.payload_offset() + 1);
        assert_eq!(range.len(), 3);
    }
}
