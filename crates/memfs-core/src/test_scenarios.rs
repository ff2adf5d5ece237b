// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::{FsConfig, FsError, MemFs, NodeKind};

fn fresh_fs() -> MemFs {
    MemFs::new(FsConfig::default())
}

#[test]
fn test_canonical_path_is_idempotent() {
    let fs = fresh_fs();
    fs.create_directory("/usr", 0o755).unwrap();
    fs.create_directory("/usr/share", 0o755).unwrap();
    fs.create_symlink("/share", "usr/share").unwrap();
    fs.create_symlink("/usr/share/up", "..").unwrap();
    fs.change_directory("/usr").unwrap();

    for path in [
        "/",
        ".",
        "..",
        "share/../share/./",
        "//usr///share",
        "/share",
        "/share/up/share/up",
    ] {
        let once = fs.canonical_path(path).unwrap();
        let twice = fs.canonical_path(&once).unwrap();
        assert_eq!(once, twice, "canonicalizing {path}");
    }
    assert_eq!(fs.canonical_path("/share/up").unwrap(), "/usr");
}

#[test]
fn test_create_then_resolve() {
    let fs = fresh_fs();
    fs.create_directory("/d", 0o755).unwrap();
    fs.create_file("/d/n", 0o644).unwrap();

    let attrs = fs.stat("/d/n").unwrap();
    assert_eq!(attrs.kind, NodeKind::File);
    assert_eq!(attrs.size, 0);
    assert_eq!(fs.create_file("/d/n", 0o644).unwrap_err(), FsError::AlreadyExists);
    assert_eq!(fs.create_directory("/d/n", 0o755).unwrap_err(), FsError::AlreadyExists);
    assert_eq!(fs.list_directory("/d").unwrap().len(), 1);
}

#[test]
fn test_write_read_round_trip_over_prior_content() {
    let fs = fresh_fs();
    fs.create_file("/f", 0o644).unwrap();

    let payloads: [&[u8]; 4] = [b"", b"\0\x01\xff binary", b"short", &[7u8; 300]];
    for prior in 0..3u64 {
        for payload in payloads {
            fs.truncate("/f", prior * 50).unwrap();
            assert_eq!(fs.write("/f", 0, payload).unwrap(), payload.len());

            let mut buf = vec![0u8; payload.len()];
            assert_eq!(fs.read("/f", 0, &mut buf).unwrap(), payload.len());
            assert_eq!(buf, payload);
        }
    }
}

#[test]
fn test_sparse_write_reads_back_zeros() {
    let fs = fresh_fs();
    fs.create_file("/f", 0o644).unwrap();
    fs.write("/f", 0, b"head").unwrap();
    let size = fs.stat("/f").unwrap().size;

    let offset = 64;
    fs.write("/f", offset, b"tail").unwrap();

    let mut gap = vec![0xAAu8; (offset - size) as usize];
    assert_eq!(fs.read("/f", size, &mut gap).unwrap(), gap.len());
    assert!(gap.iter().all(|b| *b == 0));
    assert_eq!(fs.stat("/f").unwrap().size, offset + 4);
}

#[test]
fn test_non_empty_directory_delete() {
    let fs = fresh_fs();
    fs.create_directory("/d", 0o755).unwrap();
    fs.create_file("/d/a", 0o644).unwrap();
    fs.create_directory("/d/b", 0o755).unwrap();

    assert_eq!(fs.delete("/d").unwrap_err(), FsError::NotEmpty);
    fs.delete("/d/a").unwrap();
    assert_eq!(fs.delete("/d").unwrap_err(), FsError::NotEmpty);
    fs.delete("/d/b").unwrap();
    fs.delete("/d").unwrap();
    assert!(!fs.exists("/d"));
}

#[test]
fn test_home_scenario() {
    let fs = fresh_fs();
    assert_eq!(fs.current_directory(), "/");

    let root = fs.root();
    fs.create_child(root, "home", NodeKind::Directory, 0o755).unwrap();
    fs.change_directory("home").unwrap();
    assert_eq!(fs.current_directory(), "/home");

    let home = fs.resolve("/home").unwrap();
    fs.create_child(home, "a.txt", NodeKind::File, 0o644).unwrap();
    assert_eq!(fs.write("/home/a.txt", 0, b"hi").unwrap(), 2);

    let mut buf = [0u8; 10];
    assert_eq!(fs.read("/home/a.txt", 0, &mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], b"hi");

    let file = fs.resolve("/home/a.txt").unwrap();
    fs.move_node(file, root, "b.txt").unwrap();
    assert_eq!(fs.resolve("/home/a.txt").unwrap_err(), FsError::NotFound);
    assert_eq!(fs.resolve("/b.txt").unwrap(), file);
}

#[test]
fn test_symlink_scenario() {
    let fs = fresh_fs();
    fs.create_directory("/home", 0o755).unwrap();
    fs.create_symlink("/link", "/home").unwrap();
    assert_eq!(fs.resolve("/link").unwrap(), fs.resolve("/home").unwrap());

    // eight links in a row are still resolvable
    for i in 1..=8 {
        let target = if i == 8 { "/home".to_string() } else { format!("/ok{}", i + 1) };
        fs.create_symlink(&format!("/ok{i}"), &target).unwrap();
    }
    assert_eq!(fs.resolve("/ok1").unwrap(), fs.resolve("/home").unwrap());

    // nine are one too many
    for i in 1..=9 {
        let target = if i == 9 { "/home".to_string() } else { format!("/chain{}", i + 1) };
        fs.create_symlink(&format!("/chain{i}"), &target).unwrap();
    }
    assert_eq!(fs.resolve("/chain1").unwrap_err(), FsError::TooManySymlinks);

    fs.create_symlink("/self", "/self").unwrap();
    assert_eq!(fs.resolve("/self").unwrap_err(), FsError::TooManySymlinks);
    assert!(fs.is_symlink("/self"));
}

#[test]
fn test_rename_is_atomic_for_observers() {
    let fs = Arc::new(fresh_fs());
    fs.create_directory("/a", 0o755).unwrap();
    fs.create_directory("/b", 0o755).unwrap();
    let id = fs.create_file("/a/f", 0o644).unwrap();
    fs.write("/a/f", 0, b"moving").unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let mover = {
        let fs = fs.clone();
        let done = done.clone();
        thread::spawn(move || {
            for _ in 0..500 {
                fs.rename("/a/f", "/b/f").unwrap();
                fs.rename("/b/f", "/a/f").unwrap();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let mut observations = 0;
    while !done.load(Ordering::SeqCst) || observations == 0 {
        let hits: Vec<_> = fs
            .walk("/")
            .unwrap()
            .into_iter()
            .filter(|(path, _)| path.ends_with("/f"))
            .collect();
        assert_eq!(hits.len(), 1, "observed {hits:?}");
        assert_eq!(hits[0].1.id, id);
        assert_eq!(hits[0].1.size, 6);
        observations += 1;
    }

    mover.join().unwrap();
    assert_eq!(fs.canonical_path("/a/f").unwrap(), "/a/f");
}

#[test]
fn test_concurrent_creates_keep_names_unique() {
    let fs = Arc::new(fresh_fs());
    fs.create_directory("/race", 0o777).unwrap();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let fs = fs.clone();
            thread::spawn(move || {
                (0..32)
                    .filter(|i| fs.create_file(&format!("/race/{i}"), 0o644).is_ok())
                    .count()
            })
        })
        .collect();

    let created: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
    assert_eq!(created, 32);
    assert_eq!(fs.list_directory("/race").unwrap().len(), 32);
}

#[test]
fn test_teardown_releases_whole_tree() {
    let fs = fresh_fs();
    let mut dir = String::new();
    for depth in 0..20 {
        dir.push_str(&format!("/d{depth}"));
        fs.create_directory(&dir, 0o755).unwrap();
        fs.create_file(&format!("{dir}/f"), 0o644).unwrap();
    }

    assert_eq!(fs.stats().nodes, 41);
    assert_eq!(fs.shutdown(), 41);
}
