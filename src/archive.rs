// src/archive.rs

//! Batch archive reader
//!
//! A batch is a tar archive, optionally gzip compressed, laid out as:
//!
//! ```text
//! config.json
//! secret
//! <static files...>
//! sets/<set-id>/<dynamic file key>
//! ```
//!
//! Different packers encode the same tree either with a leading `./` on every
//! member (`tar -C dir -c .`) or without. The prefix style is decided once per
//! archive, from the presence of a root `.` entry, and applied to every
//! lookup so callers always use plain names like `config.json`.
//!
//! The archive is read into memory on open. Nothing is ever unpacked to disk
//! here; callers decide where member content goes.

use crate::error::{Error, Result};
use crate::filesystem::path::normalize_member;
use crate::paths::SETS_DIR;
use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tar::Archive;
use tracing::debug;

const DOT_PREFIX: &str = "./";

struct Member {
    name: String,
    content: Option<Vec<u8>>,
}

/// An opened batch archive
pub struct BatchArchive {
    name: String,
    dot_prefixed: bool,
    members: Vec<Member>,
    index: HashMap<String, usize>,
}

impl BatchArchive {
    /// Open a batch file; the batch name is the file name
    pub fn open(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidPath(format!("No file name in {}", path.display())))?;
        let file = File::open(path)?;
        Self::from_reader(name, BufReader::new(file))
    }

    /// Read a batch from any byte stream
    pub fn from_reader<R: Read>(name: impl Into<String>, mut reader: R) -> Result<Self> {
        let name = name.into();
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;

        let decoded: Box<dyn Read + '_> = if is_gzip(&raw) {
            debug!("{}: gzip compressed", name);
            Box::new(GzDecoder::new(raw.as_slice()))
        } else {
            Box::new(raw.as_slice())
        };

        let mut archive = Archive::new(decoded);
        let mut raw_names: Vec<String> = Vec::new();
        let mut entries: Vec<(String, Option<Vec<u8>>)> = Vec::new();

        for entry in archive.entries()? {
            let mut entry = entry?;
            let raw_name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            let member_name = normalize_member(&raw_name)?;

            let content = if entry.header().entry_type().is_file() {
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf)?;
                Some(buf)
            } else {
                None
            };
            raw_names.push(raw_name.trim_end_matches('/').to_string());
            entries.push((member_name, content));
        }

        let dot_prefixed = raw_names.iter().any(|n| n == ".")
            || (!raw_names.is_empty() && raw_names.iter().all(|n| n.starts_with(DOT_PREFIX)));

        let mut members: Vec<Member> = Vec::with_capacity(entries.len());
        let mut index = HashMap::with_capacity(entries.len());
        for (member_name, content) in entries {
            // The archive root itself
            if member_name.is_empty() {
                continue;
            }

            // Repeated members: last one wins, first position is kept
            match index.get(&member_name) {
                Some(&pos) => {
                    let existing: &mut Member = &mut members[pos];
                    existing.content = content;
                }
                None => {
                    index.insert(member_name.clone(), members.len());
                    members.push(Member {
                        name: member_name,
                        content,
                    });
                }
            }
        }

        debug!(
            "{}: {} members, dot prefixed: {}",
            name,
            members.len(),
            dot_prefixed
        );

        Ok(Self {
            name,
            dot_prefixed,
            members,
            index,
        })
    }

    /// Batch name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether members were stored with a leading `./`
    pub fn is_dot_prefixed(&self) -> bool {
        self.dot_prefixed
    }

    /// Member names in archive order, prefix removed
    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.name.as_str())
    }

    /// Whether a member (file or directory) exists
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Content of a regular file member
    pub fn read(&self, name: &str) -> Result<&[u8]> {
        let member = self
            .index
            .get(name)
            .map(|&pos| &self.members[pos])
            .ok_or_else(|| Error::ArchiveEntryMissing(format!("{}|{}", self.name, name)))?;

        member.content.as_deref().ok_or_else(|| {
            Error::ArchiveEntryMissing(format!("{}|{} is not a regular file", self.name, name))
        })
    }

    /// Set ids found below `sets/`, in archive order
    ///
    /// A set id is the single path segment directly under `sets/`; it is
    /// discovered from either its directory entry or any file inside it.
    pub fn set_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for name in self.members() {
            let Some(rest) = name
                .strip_prefix(SETS_DIR)
                .and_then(|r| r.strip_prefix('/'))
            else {
                continue;
            };
            let id = rest.split('/').next().unwrap_or_default();
            if !id.is_empty() && !ids.iter().any(|known| known == id) {
                ids.push(id.to_string());
            }
        }
        ids
    }

    /// Path of a dynamic file for a set
    pub fn set_member(set_id: &str, key: &str) -> String {
        format!("{SETS_DIR}/{set_id}/{key}")
    }
}

fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tar::{Builder, EntryType, Header};

    // Raw headers keep names byte-for-byte; `append_data` would drop `./`
    fn append(builder: &mut Builder<Vec<u8>>, path: &str, kind: EntryType, content: &[u8]) {
        let mut header = Header::new_gnu();
        header.as_gnu_mut().unwrap().name[..path.len()].copy_from_slice(path.as_bytes());
        header.set_entry_type(kind);
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, content).unwrap();
    }

    fn sample(prefix: &str) -> Vec<u8> {
        let mut builder = Builder::new(Vec::new());
        if !prefix.is_empty() {
            append(&mut builder, prefix, EntryType::Directory, b"");
        }
        append(&mut builder, &format!("{prefix}config.json"), EntryType::Regular, b"{}");
        append(&mut builder, &format!("{prefix}sets/"), EntryType::Directory, b"");
        append(&mut builder, &format!("{prefix}sets/s1/"), EntryType::Directory, b"");
        append(&mut builder, &format!("{prefix}sets/s1/seed"), EntryType::Regular, b"one");
        append(&mut builder, &format!("{prefix}sets/s2/seed"), EntryType::Regular, b"two");
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_plain_layout() {
        let archive = BatchArchive::from_reader("b1", sample("").as_slice()).unwrap();
        assert!(!archive.is_dot_prefixed());
        assert!(archive.contains("config.json"));
        assert!(archive.contains("sets"));
        assert_eq!(archive.read("sets/s2/seed").unwrap(), b"two");
        assert_eq!(archive.set_ids(), vec!["s1", "s2"]);
    }

    #[test]
    fn test_dot_prefixed_layout_reads_the_same() {
        let archive = BatchArchive::from_reader("b1", sample("./").as_slice()).unwrap();
        assert!(archive.is_dot_prefixed());
        assert!(archive.contains("config.json"));
        assert!(archive.contains("sets"));
        assert!(!archive.contains("."));
        assert_eq!(archive.read("sets/s1/seed").unwrap(), b"one");
        assert_eq!(archive.set_ids(), vec!["s1", "s2"]);
        assert_eq!(
            archive.members().collect::<Vec<_>>(),
            vec!["config.json", "sets", "sets/s1", "sets/s1/seed", "sets/s2/seed"]
        );
    }

    #[test]
    fn test_gzip_is_transparent() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&sample("./")).unwrap();
        let gz = encoder.finish().unwrap();

        let archive = BatchArchive::from_reader("b1.tar.gz", gz.as_slice()).unwrap();
        assert_eq!(archive.read("config.json").unwrap(), b"{}");
    }

    #[test]
    fn test_missing_entry() {
        let archive = BatchArchive::from_reader("b1", sample("").as_slice()).unwrap();
        assert!(matches!(
            archive.read("secret"),
            Err(Error::ArchiveEntryMissing(_))
        ));
        // directories have no content
        assert!(matches!(
            archive.read("sets/s1"),
            Err(Error::ArchiveEntryMissing(_))
        ));
    }

    #[test]
    fn test_repeated_member_last_wins() {
        let mut builder = Builder::new(Vec::new());
        append(&mut builder, "secret", EntryType::Regular, b"old");
        append(&mut builder, "config.json", EntryType::Regular, b"{}");
        append(&mut builder, "secret", EntryType::Regular, b"new");
        let data = builder.into_inner().unwrap();

        let archive = BatchArchive::from_reader("b1", data.as_slice()).unwrap();
        assert_eq!(archive.read("secret").unwrap(), b"new");
        assert_eq!(archive.members().collect::<Vec<_>>(), vec!["secret", "config.json"]);
    }

    #[test]
    fn test_inner_dot_components_are_dropped() {
        let mut builder = Builder::new(Vec::new());
        append(&mut builder, "config.json", EntryType::Regular, b"{}");
        append(&mut builder, "sets/./s1/seed", EntryType::Regular, b"one");
        append(&mut builder, "sets/s1//extra", EntryType::Regular, b"two");
        let data = builder.into_inner().unwrap();

        let archive = BatchArchive::from_reader("b1", data.as_slice()).unwrap();
        assert!(!archive.is_dot_prefixed());
        assert_eq!(archive.read("sets/s1/seed").unwrap(), b"one");
        assert_eq!(archive.read("sets/s1/extra").unwrap(), b"two");
        assert_eq!(archive.set_ids(), vec!["s1"]);
    }

    #[test]
    fn test_traversal_member_rejected() {
        let mut builder = Builder::new(Vec::new());
        append(&mut builder, "config.json", EntryType::Regular, b"{}");
        append(&mut builder, "../escape", EntryType::Regular, b"x");
        let data = builder.into_inner().unwrap();

        assert!(matches!(
            BatchArchive::from_reader("evil", data.as_slice()),
            Err(Error::PathTraversal(_))
        ));
    }

    #[test]
    fn test_not_an_archive() {
        assert!(BatchArchive::from_reader("junk", &b"definitely not a tarball"[..]).is_err());
    }

    #[test]
    fn test_set_member_path() {
        assert_eq!(BatchArchive::set_member("s1", "wifi.cert"), "sets/s1/wifi.cert");
    }
}
