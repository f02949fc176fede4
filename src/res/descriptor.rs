//! Descriptors of all the asset bundles in the build, as published by the server.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::errors::*;
use crate::utils::prelude::{FastHashMap, FastHashSet};

pub const MAGIC: [u8; 8] = [b'S', b'I', b'D', b'X', b' ', 0, 0, 1];

/// The metadata of one asset bundle. Field names follow the server's JSON format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    #[serde(rename = "assetBundleName")]
    pub id: String,
    #[serde(rename = "crc", default)]
    pub content_hash: u32,
    #[serde(default)]
    pub dependencies: SmallVec<[String; 4]>,
    #[serde(rename = "fileSize", default)]
    pub byte_size: i64,
}

impl ResourceDescriptor {
    pub fn new<T: Into<String>>(id: T) -> Self {
        ResourceDescriptor {
            id: id.into(),
            content_hash: 0,
            dependencies: SmallVec::new(),
            byte_size: 0,
        }
    }

    /// Appends a dependency and returns self, handy for building indices by hand.
    pub fn with_dependency<T: Into<String>>(mut self, id: T) -> Self {
        self.dependencies.push(id.into());
        self
    }
}

/// How a resource path maps onto the bundle index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'a> {
    /// The path names a bundle.
    Bundle(&'a ResourceDescriptor),
    /// The path lives inside a bundle whose id it contains.
    SubAsset(&'a ResourceDescriptor),
    /// Not a bundle asset, load it from built-in storage.
    Builtin,
}

/// Read-only table from bundle id to its descriptor. Lookups are case-insensitive and
/// scans happen in the order the descriptors were supplied.
#[derive(Debug, Clone, Default)]
pub struct DescriptorIndex {
    items: Vec<ResourceDescriptor>,
    lowercases: Vec<String>,
    ids: FastHashMap<String, usize>,
}

impl DescriptorIndex {
    pub fn new() -> Self {
        DescriptorIndex::default()
    }

    pub fn from_descriptors<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = ResourceDescriptor>,
    {
        let mut index = DescriptorIndex::new();
        for v in iter {
            index.insert(v);
        }

        index
    }

    /// Parses the JSON array the server sends.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let items: Vec<ResourceDescriptor> = serde_json::from_str(json)?;
        Ok(Self::from_descriptors(items))
    }

    pub fn from_json<R: Read>(reader: R) -> Result<Self> {
        let items: Vec<ResourceDescriptor> = serde_json::from_reader(reader)?;
        Ok(Self::from_descriptors(items))
    }

    /// Loads a binary index written by `save_to`.
    pub fn load_from(mut file: &mut dyn Read) -> Result<Self> {
        let mut buf = [0; 8];
        file.read_exact(&mut buf)?;

        if buf != MAGIC {
            bail!("[DescriptorIndex] MAGIC number not match.");
        }

        let items: Vec<ResourceDescriptor> = bincode::deserialize_from(&mut file)?;
        Ok(Self::from_descriptors(items))
    }

    pub fn save_to(&self, mut file: &mut dyn Write) -> Result<()> {
        file.write_all(&MAGIC)?;
        bincode::serialize_into(&mut file, &self.items)?;
        Ok(())
    }

    /// Adds a descriptor. Ids are unique ignoring case, the first one wins. Descriptors
    /// without an id are ignored, they would contain every path.
    pub fn insert(&mut self, item: ResourceDescriptor) -> bool {
        if item.id.is_empty() {
            warn!("[DescriptorIndex] bundle without id, ignored.");
            return false;
        }

        let lowercase = item.id.to_lowercase();
        if self.ids.contains_key(&lowercase) {
            warn!(
                "[DescriptorIndex] duplicated bundle id {}, ignored.",
                item.id
            );
            return false;
        }

        self.ids.insert(lowercase.clone(), self.items.len());
        self.items.push(item);
        self.lowercases.push(lowercase);
        true
    }

    #[inline]
    pub fn get<T: AsRef<str>>(&self, id: T) -> Option<&ResourceDescriptor> {
        self.ids
            .get(&id.as_ref().to_lowercase())
            .map(|&i| &self.items[i])
    }

    #[inline]
    pub fn contains<T: AsRef<str>>(&self, id: T) -> bool {
        self.get(id).is_some()
    }

    /// Finds out where a resource path should be loaded from. An exact id match takes
    /// precedence, otherwise the first bundle whose id appears in the path is picked.
    pub fn resolve<T: AsRef<str>>(&self, path: T) -> Resolution<'_> {
        let lowercase = path.as_ref().to_lowercase();

        if let Some(&i) = self.ids.get(&lowercase) {
            return Resolution::Bundle(&self.items[i]);
        }

        self.lowercases
            .iter()
            .position(|id| lowercase.contains(id.as_str()))
            .map(|i| Resolution::SubAsset(&self.items[i]))
            .unwrap_or(Resolution::Builtin)
    }

    /// Returns the bundles that must be loaded for `id`, in load order: every dependency
    /// comes after its own dependencies, listed order is kept, duplicates are dropped
    /// and `id` itself is the last element.
    pub fn chain<T: AsRef<str>>(&self, id: T) -> Vec<String> {
        let mut chain = Vec::new();
        let mut visited = FastHashSet::default();
        self.walk(id.as_ref(), &mut visited, &mut chain);
        chain
    }

    fn walk(&self, id: &str, visited: &mut FastHashSet<String>, chain: &mut Vec<String>) {
        if !visited.insert(id.to_lowercase()) {
            return;
        }

        if let Some(item) = self.get(id) {
            for v in &item.dependencies {
                self.walk(v, visited, chain);
            }
        }

        chain.push(id.to_owned());
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, ResourceDescriptor> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.lowercases.clear();
        self.ids.clear();
    }
}
