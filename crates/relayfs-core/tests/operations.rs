//! End-to-end operation tests against a temporary backing tree.
//!
//! Every test drives the public [`Dispatcher`] the way the FUSE bridge does
//! and then inspects the backing directory directly.
//!
//! ```bash
//! cargo test -p relayfs-core --test operations
//! ```

use relayfs_core::{
    AttrPolicy, BoundedSink, DiagnosticsSink, DirEntry, Dispatcher, ErrorKind, FsError, NodeKind,
    SessionConfig, SessionContext, VirtualPath, status,
};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

// ============================================================================
// Test Helpers
// ============================================================================

fn vp(s: &str) -> VirtualPath {
    VirtualPath::parse(s).unwrap()
}

fn dispatcher(root: &Path, policy: AttrPolicy) -> Dispatcher {
    let ctx = SessionContext::new(root, DiagnosticsSink::disabled()).with_attr_policy(policy);
    Dispatcher::new(Arc::new(ctx))
}

fn backing_tree() -> (TempDir, Dispatcher) {
    let dir = tempfile::tempdir().unwrap();
    let fs = dispatcher(dir.path(), AttrPolicy::StatBacked);
    (dir, fs)
}

fn snapshot(root: &Path) -> BTreeSet<String> {
    fn walk(base: &Path, dir: &Path, out: &mut BTreeSet<String>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let entry = entry.unwrap();
            let path = entry.path();
            out.insert(path.strip_prefix(base).unwrap().display().to_string());
            if entry.file_type().unwrap().is_dir() {
                walk(base, &path, out);
            }
        }
    }
    let mut out = BTreeSet::new();
    walk(root, root, &mut out);
    out
}

fn entry_names(entries: &[DirEntry]) -> BTreeSet<String> {
    entries
        .iter()
        .map(|e| e.name.to_string_lossy().into_owned())
        .collect()
}

// ============================================================================
// Attribute Reporting
// ============================================================================

#[test]
fn synthetic_root_and_placeholder_files() {
    let fs = dispatcher(Path::new("/tmp/store"), AttrPolicy::Synthetic);

    let root = fs.get_attributes(&VirtualPath::root()).unwrap();
    assert_eq!(root.kind, NodeKind::Directory);
    assert_eq!(root.nlink, 2);

    for p in ["/x", "/sub", "/deep/missing/file"] {
        let attr = fs.get_attributes(&vp(p)).unwrap();
        assert_eq!(attr.kind, NodeKind::RegularFile, "{p}");
        assert_eq!(attr.nlink, 1, "{p}");
        assert_eq!(attr.size, 1024, "{p}");
    }
}

#[test]
fn stat_backed_reports_missing_paths() {
    let (_dir, fs) = backing_tree();
    let result = fs.get_attributes(&vp("/x"));
    assert_eq!(status(&result), -libc::ENOENT);
}

// ============================================================================
// Directory Enumeration
// ============================================================================

#[test]
fn empty_directory_lists_dot_entries() {
    let (_dir, fs) = backing_tree();
    let mut handle = fs.open_directory(&VirtualPath::root()).unwrap();
    let mut sink = Vec::<DirEntry>::new();
    fs.enumerate_directory(&mut handle, &mut sink, 0).unwrap();
    assert!(sink.len() >= 2);
    assert_eq!(
        entry_names(&sink),
        BTreeSet::from([".".to_string(), "..".to_string()])
    );
}

#[test]
fn refusing_third_entry_is_out_of_resources() {
    let (dir, fs) = backing_tree();
    std::fs::write(dir.path().join("only"), b"").unwrap();

    let mut handle = fs.open_directory(&VirtualPath::root()).unwrap();
    let mut sink = BoundedSink::new(2);
    let err = fs.enumerate_directory(&mut handle, &mut sink, 0).unwrap_err();

    assert_eq!(sink.entries().len(), 2);
    assert_eq!(err.kind(), ErrorKind::OutOfResources);
    assert_ne!(err.kind(), ErrorKind::UnderlyingIo);
}

#[test]
fn paged_listing_matches_backing_tree() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();

    let (dir, fs) = backing_tree();
    let names: Vec<String> = (0..50).map(|i| format!("file-{i:02}")).collect();
    for n in &names {
        std::fs::write(dir.path().join(n), n.as_bytes()).unwrap();
    }

    let mut handle = fs.open_directory(&VirtualPath::root()).unwrap();
    let mut seen = Vec::new();
    loop {
        let mut page = BoundedSink::new(7);
        let offset = i64::try_from(handle.delivered()).unwrap();
        let result = fs.enumerate_directory(&mut handle, &mut page, offset);
        seen.extend(page.into_entries());
        match result {
            Ok(()) => break,
            Err(FsError::OutOfResources { .. }) => {}
            Err(e) => panic!("enumeration failed: {e}"),
        }
    }

    assert_eq!(seen.len(), names.len() + 2);
    let mut expected: BTreeSet<String> = names.into_iter().collect();
    expected.insert(".".into());
    expected.insert("..".into());
    assert_eq!(entry_names(&seen), expected);
}

// ============================================================================
// Node Mutation
// ============================================================================

#[test]
fn exclusive_create_leaves_existing_contents() {
    let (dir, fs) = backing_tree();
    std::fs::write(dir.path().join("data"), b"precious").unwrap();

    let result = fs.make_node(&vp("/data"), u32::from(libc::S_IFREG) | 0o644, 0);
    assert_eq!(result.unwrap_err().kind(), ErrorKind::AlreadyExists);
    assert_eq!(std::fs::read(dir.path().join("data")).unwrap(), b"precious");
}

#[test]
fn mkdir_rmdir_round_trip_restores_tree() {
    let (dir, fs) = backing_tree();
    std::fs::write(dir.path().join("existing"), b"x").unwrap();
    let before = snapshot(dir.path());

    fs.make_directory(&vp("/a"), 0o755).unwrap();
    assert_ne!(snapshot(dir.path()), before);
    fs.remove_directory(&vp("/a")).unwrap();

    assert_eq!(snapshot(dir.path()), before);
}

#[test]
fn directory_lifecycle_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("store");
    std::fs::create_dir(&store).unwrap();

    let synthetic = dispatcher(&store, AttrPolicy::Synthetic);
    let attr = synthetic.get_attributes(&vp("/x")).unwrap();
    assert_eq!(attr.kind, NodeKind::RegularFile);
    assert_eq!(attr.size, 1024);

    let fs = dispatcher(&store, AttrPolicy::StatBacked);
    fs.make_directory(&vp("/sub"), 0o755).unwrap();
    assert_eq!(fs.get_attributes(&vp("/sub")).unwrap().kind, NodeKind::Directory);

    fs.remove_directory(&vp("/sub")).unwrap();
    let err = fs.remove_directory(&vp("/sub")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn created_file_can_be_written_and_read_back() {
    let (dir, fs) = backing_tree();
    fs.make_node(&vp("/log.txt"), 0o644, 0).unwrap();

    let file = fs.open(&vp("/log.txt"), libc::O_WRONLY).unwrap();
    fs.write(&file, 0, b"first line\n").unwrap();
    fs.release(file);

    let file = fs.open(&vp("/log.txt"), libc::O_RDONLY).unwrap();
    assert_eq!(fs.read(&file, 0, 4096).unwrap(), b"first line\n");
    fs.release(file);

    assert_eq!(
        std::fs::read_to_string(dir.path().join("log.txt")).unwrap(),
        "first line\n"
    );
}

// ============================================================================
// Path Safety
// ============================================================================

#[test]
fn traversal_never_reaches_outside_backing_root() {
    let outer = tempfile::tempdir().unwrap();
    let store = outer.path().join("store");
    std::fs::create_dir(&store).unwrap();
    std::fs::write(outer.path().join("secret"), b"s").unwrap();

    let err = VirtualPath::parse("/../secret").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let fs = dispatcher(&store, AttrPolicy::StatBacked);
    assert!(fs.get_attributes(&vp("/secret")).is_err());
}

#[test]
fn over_long_paths_fail_with_name_too_long() {
    let (_dir, fs) = backing_tree();
    let long = format!("/{}", "n".repeat(relayfs_core::MAX_PATH_LEN));
    let result = fs.make_directory(&vp(&long), 0o755);
    assert_eq!(status(&result), -libc::ENAMETOOLONG);
}

// ============================================================================
// Session
// ============================================================================

#[test]
fn diagnostics_file_gets_one_record_per_call() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("store");
    std::fs::create_dir(&store).unwrap();
    let log = dir.path().join("fs.log");

    let ctx = SessionContext::from_config(&SessionConfig::new(&store).diagnostics_log(&log)).unwrap();
    let fs = Dispatcher::new(Arc::new(ctx));
    fs.make_directory(&vp("/d"), 0o755).unwrap();
    fs.remove_directory(&vp("/d")).unwrap();

    let text = std::fs::read_to_string(&log).unwrap();
    assert_eq!(text.lines().filter(|l| l.contains("`mkdir`")).count(), 1);
    assert_eq!(text.lines().filter(|l| l.contains("`rmdir`")).count(), 1);
    assert!(text.lines().all(|l| l.starts_with('[')));
}

#[test]
fn concurrent_operations_share_one_session() {
    let (dir, fs) = backing_tree();
    let workers: Vec<_> = (0..8)
        .map(|i| {
            let fs = fs.clone();
            thread::spawn(move || {
                let d = vp(&format!("/worker-{i}"));
                fs.make_directory(&d, 0o755).unwrap();
                let f = d.join("file").unwrap();
                fs.make_node(&f, 0o644, 0).unwrap();
                assert_eq!(fs.get_attributes(&f).unwrap().kind, NodeKind::RegularFile);
                fs.remove_node(&f).unwrap();
                fs.remove_directory(&d).unwrap();
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }
    assert!(snapshot(dir.path()).is_empty());
}
