// tests/config_loading.rs

mod common;
use crate::common::TestResult;

use std::path::{Path, PathBuf};
use std::time::Duration;

use savepoint::config::duration::{format_duration, parse_duration};
use savepoint::config::{load_and_validate_with, parse_config};
use savepoint::errors::SavepointError;
use savepoint::fs::mock::MockFileSystem;
use savepoint::rules::Rule;
use savepoint::types::{GroupingMode, RepoId};
use savepoint::vcs::EngineKind;

fn fs_with_repos(dirs: &[&str]) -> MockFileSystem {
    let fs = MockFileSystem::new();
    for dir in dirs {
        fs.add_dir(dir);
    }
    fs
}

fn base() -> &'static Path {
    Path::new("/work")
}

#[test]
fn full_config_is_parsed_and_validated() -> TestResult {
    let fs = fs_with_repos(&["/work/notes", "/srv/code"]);
    let toml = r#"
        [global]
        grouping_mode = "simple"
        buffer_window = "250ms"
        action_workers = 2
        push_retries = 5
        bulk_change_threshold = 50
        bulk_change_window = "10s"

        [repositories.notes]
        path = "notes"
        rule = { type = "inactivity", period = "30s" }

        [repositories.notes.engine]
        type = "git"
        auto_push = true
        branch = "main"
        commit_message = "notes: {{save_count}}"

        [repositories.code]
        path = "/srv/code"
        enabled = false
        rules = [
            { type = "save_count", threshold = 10 },
            { type = "inactivity", period = "5m" },
        ]
    "#;

    let cfg = parse_config(toml, base(), &fs)?;

    assert!(cfg.rejected.is_empty());
    assert_eq!(cfg.global.grouping_mode, GroupingMode::Simple);
    assert_eq!(cfg.global.buffer_window, Duration::from_millis(250));
    assert_eq!(cfg.global.action_workers, 2);
    assert_eq!(cfg.global.retry.attempts, 5);
    assert_eq!(cfg.global.policy.bulk_change_threshold, 50);
    assert_eq!(cfg.global.policy.bulk_change_window, Duration::from_secs(10));

    // Sorted by id.
    let ids: Vec<&str> = cfg.repositories.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["code", "notes"]);

    let code = &cfg.repositories[0];
    assert!(!code.enabled);
    assert_eq!(
        code.rules,
        vec![
            Rule::SaveCount { threshold: 10 },
            Rule::Inactivity {
                period: Duration::from_secs(300)
            },
        ]
    );
    assert_eq!(code.engine.kind, EngineKind::Git);
    assert!(!code.engine.auto_push);

    let notes = &cfg.repositories[1];
    assert_eq!(notes.path, PathBuf::from("/work/notes"));
    assert_eq!(
        notes.rules,
        vec![Rule::Inactivity {
            period: Duration::from_secs(30)
        }]
    );
    assert!(notes.engine.auto_push);
    assert_eq!(notes.engine.remote, "origin");
    assert_eq!(notes.engine.branch.as_deref(), Some("main"));
    assert_eq!(notes.engine.commit_message, "notes: {{save_count}}");

    let enabled: Vec<&RepoId> = cfg.enabled_repositories().map(|r| &r.id).collect();
    assert_eq!(enabled, vec![&RepoId::new("notes")]);
    Ok(())
}

#[test]
fn defaults_apply_when_global_is_omitted() -> TestResult {
    let fs = fs_with_repos(&["/work/notes"]);
    let cfg = parse_config(
        r#"
        [repositories.notes]
        path = "/work/notes"
        rule = { type = "manual" }
        "#,
        base(),
        &fs,
    )?;

    assert_eq!(cfg.global.grouping_mode, GroupingMode::Smart);
    assert_eq!(cfg.global.buffer_window, Duration::from_millis(100));
    assert_eq!(cfg.global.settle_delay, Duration::from_millis(20));
    assert_eq!(cfg.global.batch_threshold, 5);
    assert!(cfg.global.ignore.iter().any(|p| p == ".git"));
    assert_eq!(cfg.repositories[0].rules, vec![Rule::Manual]);
    assert!(cfg.repositories[0].engine.commit_message.contains("{{save_count}}"));
    Ok(())
}

#[test]
fn broken_repositories_are_rejected_individually() -> TestResult {
    let fs = fs_with_repos(&["/work/good", "/work/a", "/work/b", "/work/c", "/work/d", "/work/e"]);
    let toml = r#"
        [repositories.good]
        path = "good"
        rule = { type = "inactivity", period = "3s" }

        [repositories.missing]
        path = "does-not-exist"
        rule = { type = "manual" }

        [repositories.a]
        path = "a"
        rule = { type = "save_count", threshold = 0 }

        [repositories.b]
        path = "b"
        rule = { type = "inactivity", period = "soon" }

        [repositories.c]
        path = "c"

        [repositories.d]
        path = "d"
        rule = { type = "manual" }
        engine = { type = "svn" }

        [repositories.e]
        path = "e"
        rule = { type = "manual" }
        engine = { auto_push = true, remote = "" }
    "#;

    let cfg = parse_config(toml, base(), &fs)?;

    let ids: Vec<&str> = cfg.repositories.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["good"]);

    let reason = |id: &str| -> String {
        cfg.rejected
            .iter()
            .find(|r| r.id.as_str() == id)
            .map(|r| r.reason.clone())
            .unwrap_or_default()
    };
    assert_eq!(cfg.rejected.len(), 6);
    assert!(reason("missing").contains("does not exist"));
    assert!(reason("a").contains("threshold"));
    assert!(reason("b").contains("inactivity period"));
    assert!(reason("c").contains("no rule"));
    assert!(reason("d").contains("unknown engine type 'svn'"));
    assert!(reason("e").contains("engine.remote"));
    Ok(())
}

#[test]
fn malformed_repository_sections_do_not_sink_their_siblings() -> TestResult {
    let fs = fs_with_repos(&["/work/a", "/work/b", "/work/c", "/work/d"]);
    let toml = r#"
        [repositories.a]
        path = "a"
        rule = { type = "inactivity", period = "3s" }

        [repositories.b]
        path = "b"
        rule = { type = "bogus" }

        [repositories.c]
        path = "c"
        rules = [{ type = "manual" }, { type = "save_count", threshold = -3 }]

        [repositories.d]
        rule = { type = "manual" }
        enabled = "yes"
    "#;

    let cfg = parse_config(toml, base(), &fs)?;

    let ids: Vec<&str> = cfg.repositories.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a"]);

    let rejected: Vec<(&str, &str)> = cfg
        .rejected
        .iter()
        .map(|r| (r.id.as_str(), r.reason.as_str()))
        .collect();
    assert_eq!(rejected.len(), 3, "{rejected:?}");
    assert!(rejected[0].0 == "b" && rejected[0].1.contains("bogus"), "{rejected:?}");
    assert!(rejected[1].0 == "c" && rejected[1].1.contains("-3"), "{rejected:?}");
    assert_eq!(rejected[2].0, "d");
    Ok(())
}

#[test]
fn global_errors_are_fatal() {
    let fs = fs_with_repos(&["/work/notes"]);
    let repo = "\n[repositories.notes]\npath = \"notes\"\nrule = { type = \"manual\" }\n";

    for global in [
        "[global]\naction_workers = 0",
        "[global]\nbuffer_window = \"fast\"",
        "[global]\ntemp_patterns = [\"(\"]",
        "[global]\nignore = [\"[\"]",
        "[global]\npush_retries = 0",
    ] {
        let toml = format!("{global}\n{repo}");
        let err = parse_config(&toml, base(), &fs);
        assert!(
            matches!(err, Err(SavepointError::ConfigError(_))),
            "expected config error for {global:?}, got {err:?}"
        );
    }
}

#[test]
fn a_config_without_repositories_is_an_error() {
    let fs = MockFileSystem::new();
    let err = parse_config("[global]\ngrouping_mode = \"off\"\n", base(), &fs);
    assert!(matches!(err, Err(SavepointError::ConfigError(msg)) if msg.contains("at least one")));
}

#[test]
fn invalid_toml_is_reported() {
    let fs = MockFileSystem::new();
    let err = parse_config("[repositories.notes\npath = ", base(), &fs);
    assert!(matches!(err, Err(SavepointError::TomlError(_))));
}

#[test]
fn relative_paths_resolve_against_the_config_directory() -> TestResult {
    let fs = fs_with_repos(&["/etc/savepoint/notes"]);
    fs.add_file(
        "/etc/savepoint/Savepoint.toml",
        "[repositories.notes]\npath = \"notes\"\nrule = { type = \"manual\" }\n",
    );

    let cfg = load_and_validate_with("/etc/savepoint/Savepoint.toml", &fs)?;
    assert_eq!(cfg.repositories[0].path, PathBuf::from("/etc/savepoint/notes"));

    let missing = load_and_validate_with("/etc/savepoint/Other.toml", &fs);
    assert!(matches!(missing, Err(SavepointError::Other(_))));
    Ok(())
}

#[test]
fn durations_parse_and_format() -> TestResult {
    assert_eq!(parse_duration("250ms")?, Duration::from_millis(250));
    assert_eq!(parse_duration("3s")?, Duration::from_secs(3));
    assert_eq!(parse_duration(" 2m ")?, Duration::from_secs(120));
    assert_eq!(parse_duration("1h")?, Duration::from_secs(3600));
    assert!(parse_duration("").is_err());
    assert!(parse_duration("10").is_err());
    assert!(parse_duration("ms").is_err());
    assert!(parse_duration("5d").is_err());
    assert!(parse_duration(&format!("{}h", u64::MAX)).is_err());
    assert!(parse_duration(&format!("{}m", u64::MAX / 2)).is_err());
    assert_eq!(parse_duration(&format!("{}ms", u64::MAX))?, Duration::from_millis(u64::MAX));

    assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
    assert_eq!(format_duration(Duration::from_secs(45)), "45s");
    assert_eq!(format_duration(Duration::from_secs(300)), "5m");
    assert_eq!(format_duration(Duration::from_secs(7200)), "2h");
    Ok(())
}
