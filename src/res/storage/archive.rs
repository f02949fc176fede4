//! The on-disk format of a bundle file.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use super::RawAsset;
use crate::res::errors::StorageError;
use crate::res::kind::ResourceKind;

pub const MAGIC: [u8; 8] = [b'S', b'B', b'N', b'D', b' ', 0, 0, 1];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub name: String,
    pub kind: ResourceKind,
    pub bytes: Vec<u8>,
    pub sub_assets: Vec<ArchiveEntry>,
}

impl ArchiveEntry {
    pub fn new<T: Into<String>>(name: T, kind: ResourceKind, bytes: Vec<u8>) -> Self {
        ArchiveEntry {
            name: name.into(),
            kind,
            bytes,
            sub_assets: Vec::new(),
        }
    }

    pub fn with_sub_asset(mut self, entry: ArchiveEntry) -> Self {
        self.sub_assets.push(entry);
        self
    }

    /// Converts this entry into a `RawAsset`, dropping the sub-assets unless asked.
    pub fn to_raw(&self, with_sub_assets: bool) -> RawAsset {
        let mut raw = RawAsset::new(self.name.clone(), self.kind, self.bytes.clone());
        if with_sub_assets {
            raw.sub_assets = self.sub_assets.iter().map(|v| v.to_raw(true)).collect();
        }

        raw
    }
}

/// A packed group of named assets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleArchive {
    pub entries: Vec<ArchiveEntry>,
}

impl BundleArchive {
    pub fn new() -> Self {
        BundleArchive::default()
    }

    pub fn push(&mut self, entry: ArchiveEntry) {
        self.entries.push(entry);
    }

    /// Finds an entry by name, ignoring case.
    pub fn find(&self, name: &str) -> Option<&ArchiveEntry> {
        self.entries
            .iter()
            .find(|v| v.name.eq_ignore_ascii_case(name))
    }

    pub fn encode(&self, mut file: &mut dyn Write) -> Result<(), StorageError> {
        file.write_all(&MAGIC)?;
        bincode::serialize_into(&mut file, self)?;
        Ok(())
    }

    pub fn decode(mut file: &mut dyn Read) -> Result<Self, StorageError> {
        let mut buf = [0; 8];
        file.read_exact(&mut buf)?;

        if buf != MAGIC {
            return Err(StorageError::Malformed(
                "[BundleArchive] MAGIC number not match.".to_owned(),
            ));
        }

        Ok(bincode::deserialize_from(&mut file)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, StorageError> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        Ok(buf)
    }
}

/// XORs `bytes` in place with a repeating `key`. Applying it twice restores the input;
/// an empty key leaves the bytes untouched.
pub fn cipher(bytes: &mut [u8], key: &[u8]) {
    if key.is_empty() {
        return;
    }

    for (v, k) in bytes.iter_mut().zip(key.iter().cycle()) {
        *v ^= *k;
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn archive() {
        let mut archive = BundleArchive::new();
        archive.push(
            ArchiveEntry::new("atlas", ResourceKind::SpriteAtlas, vec![1, 2, 3])
                .with_sub_asset(ArchiveEntry::new("icon", ResourceKind::Sprite, vec![4])),
        );

        let bytes = archive.to_bytes().unwrap();
        let decoded = BundleArchive::decode(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(decoded, archive);

        let entry = decoded.find("ATLAS").unwrap();
        assert!(entry.to_raw(false).sub_assets.is_empty());
        assert_eq!(entry.to_raw(true).sub_assets[0].name, "icon");
        assert!(decoded.find("missing").is_none());
    }

    #[test]
    fn bad_magic() {
        let bytes = vec![0u8; 32];
        match BundleArchive::decode(&mut Cursor::new(&bytes)) {
            Err(StorageError::Malformed(_)) => {}
            v => panic!("unexpected {:?}", v),
        }
    }

    #[test]
    fn xor() {
        let mut bytes = b"hello bundle".to_vec();
        cipher(&mut bytes, b"key");
        assert_ne!(&bytes[..], b"hello bundle");
        cipher(&mut bytes, b"key");
        assert_eq!(&bytes[..], b"hello bundle");

        cipher(&mut bytes, b"");
        assert_eq!(&bytes[..], b"hello bundle");
    }
}
