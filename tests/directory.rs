extern crate satchel;
extern crate tempfile;

use std::cell::RefCell;
use std::fs;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use satchel::prelude::*;
use satchel::res::storage::archive::{ArchiveEntry, BundleArchive};
use satchel::res::storage::dir::write_bundle;

const KEY: &[u8] = b"satchel";

struct Testbed {
    _root: tempfile::TempDir,
    params: DirectoryParams,
}

fn testbed() -> Testbed {
    let _ = env_logger::try_init();

    let root = tempfile::tempdir().unwrap();
    let bundles = root.path().join("bundles");
    let builtin = root.path().join("builtin");
    fs::create_dir_all(&bundles).unwrap();
    fs::create_dir_all(builtin.join("text")).unwrap();

    let params = DirectoryParams {
        bundles,
        builtin,
        key: KEY.to_vec(),
        workers: 2,
    };

    Testbed {
        _root: root,
        params,
    }
}

fn archive(name: &str, kind: ResourceKind, bytes: Vec<u8>) -> BundleArchive {
    let mut archive = BundleArchive::new();
    archive.push(ArchiveEntry::new(name, kind, bytes));
    archive
}

fn wait(cache: &mut AssetCache, handle: LoadHandle) -> LoadStatus {
    for _ in 0..2000 {
        cache.advance();

        match cache.status(handle) {
            Some(LoadStatus::Completed) | Some(LoadStatus::Stopped) | None => break,
            _ => thread::sleep(Duration::from_millis(1)),
        }
    }

    cache.advance();
    cache.status(handle).expect("load disappeared")
}

#[test]
fn mount() {
    let mut params = DirectoryParams::default();
    params.bundles = "tests/_invalid_path_".into();
    assert!(Directory::new(params).is_err());

    let params: DirectoryParams = serde_json::from_str(r#"{"workers": 3}"#).unwrap();
    assert_eq!(params.workers, 3);
    assert!(params.key.is_empty());
}

#[test]
fn bundles() {
    let tb = testbed();
    write_bundle(&tb.params.bundles, "shared/shader", &BundleArchive::new(), KEY).unwrap();
    write_bundle(
        &tb.params.bundles,
        "chara/0001",
        &archive("0001", ResourceKind::GameObject, vec![4, 2]),
        KEY,
    )
    .unwrap();

    let mut cache = AssetCache::new(
        Directory::new(tb.params.clone()).unwrap(),
        CacheParams::default(),
    );

    let json = r#"[
        {"assetBundleName": "chara/0001", "crc": 1, "dependencies": ["shared/shader"], "fileSize": 64},
        {"assetBundleName": "shared/shader", "crc": 2, "dependencies": [], "fileSize": 16}
    ]"#;
    cache.set_index(DescriptorIndex::from_json_str(json).unwrap());

    let handle = cache.load("chara/0001", ResourceKind::GameObject);
    assert_eq!(wait(&mut cache, handle), LoadStatus::Completed);

    let raw = cache.resource::<RawAsset>(handle).unwrap();
    assert_eq!(raw.bytes, vec![4, 2]);
    assert_eq!(cache.bundles().len(), 2);

    assert!(cache.unload(handle));
    assert!(cache.bundles().is_empty());
}

#[test]
fn missing_bundle() {
    let tb = testbed();
    let mut cache = AssetCache::new(
        Directory::new(tb.params.clone()).unwrap(),
        CacheParams::default(),
    );

    cache.set_index(DescriptorIndex::from_descriptors(vec![
        ResourceDescriptor::new("ui/common"),
    ]));

    let failures = Rc::new(RefCell::new(Vec::new()));
    let tx = failures.clone();
    cache.set_error_sink(move |_, failure| tx.borrow_mut().push(failure.clone()));

    let handle = cache.load("ui/common/button", ResourceKind::Sprite);
    assert_eq!(wait(&mut cache, handle), LoadStatus::Stopped);
    assert_eq!(failures.borrow().len(), 1);
    assert_eq!(failures.borrow()[0].error, LoadError::SourceNotFound);
    assert_eq!(failures.borrow()[0].path, "ui/common/button");

    write_bundle(
        &tb.params.bundles,
        "ui/common",
        &archive("button", ResourceKind::Sprite, vec![1]),
        KEY,
    )
    .unwrap();

    assert!(cache.retry());
    assert_eq!(wait(&mut cache, handle), LoadStatus::Completed);
    assert_eq!(failures.borrow().len(), 1);
}

#[test]
fn wrong_key() {
    let tb = testbed();
    write_bundle(
        &tb.params.bundles,
        "ui/common",
        &archive("button", ResourceKind::Sprite, vec![1]),
        b"other",
    )
    .unwrap();

    let mut cache = AssetCache::new(
        Directory::new(tb.params.clone()).unwrap(),
        CacheParams::default(),
    );

    cache.set_index(DescriptorIndex::from_descriptors(vec![
        ResourceDescriptor::new("ui/common"),
    ]));

    let handle = cache.load("ui/common/button", ResourceKind::Sprite);
    assert_eq!(wait(&mut cache, handle), LoadStatus::Stopped);
    assert_eq!(cache.error_status(handle), Some(LoadError::SourceNotFound));
}

#[test]
fn builtin() {
    let tb = testbed();
    fs::write(tb.params.builtin.join("text").join("intro.txt"), b"hello").unwrap();

    let mut cache = AssetCache::new(
        Directory::new(tb.params.clone()).unwrap(),
        CacheParams::default(),
    );

    let h1 = cache.load("text/intro", ResourceKind::TextAsset);
    assert_eq!(wait(&mut cache, h1), LoadStatus::Completed);

    let raw = cache.resource::<RawAsset>(h1).unwrap();
    assert_eq!(raw.name, "intro");
    assert_eq!(raw.bytes, b"hello".to_vec());

    let h2 = cache.load("text/intro.txt", ResourceKind::TextAsset);
    assert_ne!(h1, h2);
    assert_eq!(wait(&mut cache, h2), LoadStatus::Completed);

    let h3 = cache.load("text/outro", ResourceKind::TextAsset);
    assert_eq!(wait(&mut cache, h3), LoadStatus::Stopped);
    assert_eq!(cache.error_status(h3), Some(LoadError::ContentIsNull));
}
