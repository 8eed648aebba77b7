// tests/watch_events.rs

use std::path::{Path, PathBuf};

use notify::event::{
    AccessKind, AccessMode, CreateKind, DataChange, MetadataKind, ModifyKind, RemoveKind, RenameMode,
};
use notify::{Event, EventKind};
use tokio::time::Instant;

use savepoint::types::{ChangeEvent, ChangeKind};
use savepoint::watch::path_utils::{relative_path, slash_str};
use savepoint::watch::{translate_event, IgnoreRules, TempFilePatterns};

fn root() -> PathBuf {
    PathBuf::from("/repo")
}

fn ignore() -> IgnoreRules {
    IgnoreRules::new(&[".git".to_string(), ".git/**".to_string(), "*.log".to_string()])
        .expect("valid ignore patterns")
}

fn translate(event: Event, seq: &mut u64) -> Vec<(PathBuf, ChangeKind)> {
    translate_event(&root(), &ignore(), event, seq, Instant::now())
        .into_iter()
        .map(|ChangeEvent { path, kind, .. }| (path, kind))
        .collect()
}

fn ev(kind: EventKind, paths: &[&str]) -> Event {
    paths
        .iter()
        .fold(Event::new(kind), |event, p| event.add_path(PathBuf::from(p)))
}

#[test]
fn basic_events_map_to_change_kinds() {
    let mut seq = 0;

    assert_eq!(
        translate(ev(EventKind::Create(CreateKind::File), &["/repo/a.txt"]), &mut seq),
        vec![(PathBuf::from("a.txt"), ChangeKind::Created)]
    );
    assert_eq!(
        translate(
            ev(EventKind::Modify(ModifyKind::Data(DataChange::Content)), &["/repo/src/lib.rs"]),
            &mut seq
        ),
        vec![(PathBuf::from("src/lib.rs"), ChangeKind::Modified)]
    );
    assert_eq!(
        translate(ev(EventKind::Remove(RemoveKind::File), &["/repo/a.txt"]), &mut seq),
        vec![(PathBuf::from("a.txt"), ChangeKind::Deleted)]
    );
    assert_eq!(seq, 3);
}

#[test]
fn renames_become_moves_or_halves() {
    let mut seq = 0;

    assert_eq!(
        translate(
            ev(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/repo/.notes.md.tmp.1", "/repo/notes.md"]
            ),
            &mut seq
        ),
        vec![(
            PathBuf::from("notes.md"),
            ChangeKind::Moved {
                from: PathBuf::from(".notes.md.tmp.1")
            }
        )]
    );
    assert_eq!(
        translate(ev(EventKind::Modify(ModifyKind::Name(RenameMode::From)), &["/repo/x"]), &mut seq),
        vec![(PathBuf::from("x"), ChangeKind::Deleted)]
    );
    assert_eq!(
        translate(ev(EventKind::Modify(ModifyKind::Name(RenameMode::To)), &["/repo/y"]), &mut seq),
        vec![(PathBuf::from("y"), ChangeKind::Created)]
    );

    // Moving out of an ignored directory looks like a creation.
    assert_eq!(
        translate(
            ev(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/repo/.git/tmp_obj", "/repo/restored.txt"]
            ),
            &mut seq
        ),
        vec![(PathBuf::from("restored.txt"), ChangeKind::Created)]
    );
}

#[test]
fn noise_is_dropped() {
    let mut seq = 0;

    let access = ev(EventKind::Access(AccessKind::Close(AccessMode::Write)), &["/repo/a.txt"]);
    let metadata = ev(
        EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
        &["/repo/a.txt"],
    );
    let ignored = ev(EventKind::Modify(ModifyKind::Any), &["/repo/.git/index", "/repo/build.log"]);
    let outside = ev(EventKind::Create(CreateKind::File), &["/elsewhere/a.txt", "/repo"]);

    for event in [access, metadata, ignored, outside] {
        assert!(translate(event, &mut seq).is_empty());
    }
    assert_eq!(seq, 0);
}

#[test]
fn ignore_rules_cover_parent_directories() {
    let rules = ignore();
    assert!(rules.is_ignored(".git"));
    assert!(rules.is_ignored(".git/objects/ab/cdef"));
    assert!(rules.is_ignored("logs/debug.log"));
    assert!(!rules.is_ignored("src/main.rs"));
    assert!(!rules.is_ignored(".gitignore"));
    assert!(!IgnoreRules::empty().is_ignored(".git/index"));
    assert!(IgnoreRules::new(&["[".to_string()]).is_err());
}

#[test]
fn temp_patterns_match_file_names_only() {
    let temp = TempFilePatterns::default();
    for name in [
        "notes.md~",
        "docs/.notes.md.swp",
        ".#notes.md",
        "#notes.md#",
        "upload.tmp",
        ".notes.md.tmp.1234",
    ] {
        assert!(temp.is_temp(Path::new(name)), "{name} should be a temp file");
    }
    for name in ["notes.md", "template.md", ".tmp/notes.md", "src/tmp.rs"] {
        assert!(!temp.is_temp(Path::new(name)), "{name} should not be a temp file");
    }

    let custom = TempFilePatterns::new(&[r"\.bak$"]).expect("valid pattern");
    assert!(custom.is_temp(Path::new("a.bak")));
    assert!(!custom.is_temp(Path::new("a~")));
}

#[test]
fn relative_paths_strip_the_root() {
    assert_eq!(
        relative_path(Path::new("/repo"), Path::new("/repo/src/a.rs")),
        Some(PathBuf::from("src/a.rs"))
    );
    assert_eq!(relative_path(Path::new("/repo"), Path::new("/repo")), None);
    assert_eq!(relative_path(Path::new("/repo"), Path::new("/other/a.rs")), None);
    assert_eq!(slash_str(Path::new("src/a.rs")), "src/a.rs");
}
