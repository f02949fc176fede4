//! A storage that reads bundles and built-in resources from local directories.

use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use super::archive::{self, BundleArchive};
use super::{Bundle, BundleResponse, RawAsset, Resource, Storage};
use crate::errors::*;
use crate::res::errors::StorageError;
use crate::res::kind::ResourceKind;
use crate::res::request::Request;
use crate::sched::prelude::WorkerPool;
use crate::sched::unwind::{halt_unwinding, panic_message};

/// The setup parameters of a `Directory`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryParams {
    /// The directory of downloaded bundle files.
    pub bundles: PathBuf,
    /// The directory of resources shipped with the client.
    pub builtin: PathBuf,
    /// The key bundle files are obfuscated with, empty for plain files.
    pub key: Vec<u8>,
    /// The number of I/O workers.
    pub workers: u32,
}

impl Default for DirectoryParams {
    fn default() -> Self {
        DirectoryParams {
            bundles: PathBuf::from("bundles"),
            builtin: PathBuf::from("builtin"),
            key: Vec::new(),
            workers: 2,
        }
    }
}

/// Returns the file name the bundle `id` is stored under.
pub fn bundle_filename(id: &str) -> String {
    blake3::hash(id.to_lowercase().as_bytes())
        .to_hex()
        .to_string()
}

/// Writes `archive` as the bundle `id` into the `bundles` directory, obfuscated with `key`.
pub fn write_bundle<P: AsRef<Path>>(
    bundles: P,
    id: &str,
    archive: &BundleArchive,
    key: &[u8],
) -> Result<PathBuf> {
    let mut bytes = archive.to_bytes()?;
    archive::cipher(&mut bytes, key);

    let path = bundles.as_ref().join(bundle_filename(id));
    fs::write(&path, &bytes)?;
    Ok(path)
}

/// Directory storage. Reads happen on a small pool of I/O workers.
pub struct Directory {
    params: Arc<DirectoryParams>,
    pool: WorkerPool,
}

impl Directory {
    pub fn new(params: DirectoryParams) -> Result<Self> {
        if !params.bundles.is_dir() {
            bail!(
                "[Directory] bundle directory {} does not exist.",
                params.bundles.display()
            );
        }

        let pool = WorkerPool::new(params.workers)?;
        info!(
            "[Directory] mounted {} with {} I/O workers.",
            params.bundles.display(),
            pool.len()
        );

        Ok(Directory {
            params: Arc::new(params),
            pool,
        })
    }

    #[inline]
    pub fn params(&self) -> &DirectoryParams {
        &self.params
    }
}

impl Storage for Directory {
    fn load_bundle(&self, id: &str) -> Request<BundleResponse> {
        let latch = Request::latch();
        let tx = latch.clone();
        let params = self.params.clone();
        let id = id.to_owned();

        self.pool.spawn(move || {
            let rsp = halt_unwinding(|| read_bundle(&params, &id)).unwrap_or_else(|err| {
                let msg = format!("reading panicked: {}", panic_message(err.as_ref()));
                Err(StorageError::Malformed(msg))
            });

            if let Err(ref err) = rsp {
                warn!("[Directory] failed to read bundle {}: {}", id, err);
            }

            tx.set(rsp);
        });

        Request::new(latch)
    }

    fn load_builtin(&self, path: &str, kind: ResourceKind) -> Request<Option<Resource>> {
        let latch = Request::latch();
        let tx = latch.clone();
        let params = self.params.clone();
        let path = path.to_owned();

        self.pool.spawn(move || {
            let rsp = match halt_unwinding(|| read_builtin(&params.builtin, &path)) {
                Ok(Ok(Some(bytes))) => RawAsset::new(stem(&path), kind, bytes).into_resource(),
                Ok(Ok(None)) => None,
                Ok(Err(err)) => {
                    warn!("[Directory] failed to read {}: {}", path, err);
                    None
                }
                Err(err) => {
                    warn!(
                        "[Directory] reading {} panicked: {}",
                        path,
                        panic_message(err.as_ref())
                    );
                    None
                }
            };

            tx.set(rsp);
        });

        Request::new(latch)
    }
}

fn read_bundle(params: &DirectoryParams, id: &str) -> BundleResponse {
    let path = params.bundles.join(bundle_filename(id));
    let mut bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(ref err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(StorageError::NotFound(id.to_owned()));
        }
        Err(err) => return Err(err.into()),
    };

    archive::cipher(&mut bytes, &params.key);
    let archive = BundleArchive::decode(&mut Cursor::new(&bytes))?;

    debug!(
        "[Directory] opened bundle {} with {} entries.",
        id,
        archive.entries.len()
    );

    Ok(Arc::new(ArchiveBundle {
        id: id.to_owned(),
        archive: Mutex::new(Some(archive)),
    }))
}

/// Reads `path` under `root`. The path could name the file exactly, or omit its
/// extension, in which case the first file in the same directory with a matching stem
/// is picked.
fn read_builtin(root: &Path, path: &str) -> io::Result<Option<Vec<u8>>> {
    let exact = root.join(path);
    if exact.is_file() {
        return fs::read(exact).map(Some);
    }

    let dir = match exact.parent() {
        Some(dir) if dir.is_dir() => dir,
        _ => return Ok(None),
    };

    let name = stem(path);
    let mut candidates = Vec::new();
    for entry in fs::read_dir(dir)? {
        let file = entry?.path();
        let matched = file
            .file_stem()
            .and_then(|v| v.to_str())
            .map(|v| v.eq_ignore_ascii_case(name))
            .unwrap_or(false);

        if matched && file.is_file() {
            candidates.push(file);
        }
    }

    candidates.sort();
    match candidates.first() {
        Some(file) => fs::read(file).map(Some),
        None => Ok(None),
    }
}

/// Returns the file stem of a resource path, which is the name of an asset.
pub fn stem(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rfind('.') {
        Some(i) if i > 0 => &name[..i],
        _ => name,
    }
}

struct ArchiveBundle {
    id: String,
    archive: Mutex<Option<BundleArchive>>,
}

impl Bundle for ArchiveBundle {
    fn contains(&self, name: &str) -> bool {
        let archive = self.archive.lock().unwrap();
        archive
            .as_ref()
            .map(|v| v.find(name).is_some())
            .unwrap_or(false)
    }

    fn load_asset(
        &self,
        name: &str,
        _: ResourceKind,
        with_sub_assets: bool,
    ) -> Request<Option<Resource>> {
        let archive = self.archive.lock().unwrap();
        let rsp = archive
            .as_ref()
            .and_then(|v| v.find(name))
            .and_then(|v| v.to_raw(with_sub_assets).into_resource());

        Request::ok(rsp)
    }

    fn unload(&self) {
        let mut archive = self.archive.lock().unwrap();
        if archive.take().is_some() {
            debug!("[Directory] bundle {} unloaded.", self.id);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stems() {
        assert_eq!(stem("ui/common/button_ok.png"), "button_ok");
        assert_eq!(stem("ui/common/button_ok"), "button_ok");
        assert_eq!(stem("bgm"), "bgm");
        assert_eq!(stem("ui/.hidden"), ".hidden");
    }

    #[test]
    fn filenames() {
        let v = bundle_filename("Chara/0001");
        assert_eq!(v, bundle_filename("chara/0001"));
        assert_eq!(v.len(), 64);
        assert_ne!(v, bundle_filename("chara/0002"));
    }
}
