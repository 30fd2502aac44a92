//! # Isolation Context Unit Tests / 隔离上下文单元测试
//!
//! Tests for `IsolationContext`: unique trees under concurrency, the
//! allow-listed environment and idempotent teardown.
//!
//! `IsolationContext` 的测试：并发下的唯一目录树、基于允许列表的环境变量以及幂等的拆除。

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::thread;

use shellmatrix::infra::fs::{IsolationContext, IsolationSpec};

fn spec_in(base: &std::path::Path) -> IsolationSpec {
    IsolationSpec {
        base_dir: Some(base.to_path_buf()),
        ..Default::default()
    }
}

#[test]
fn test_concurrent_contexts_never_share_paths() {
    let base = tempfile::tempdir().unwrap();
    let spec = Arc::new(spec_in(base.path()));

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let spec = Arc::clone(&spec);
            thread::spawn(move || {
                (0..25)
                    .map(|_| {
                        // Same label everywhere: uniqueness must not depend on it.
                        IsolationContext::create(&spec, &format!("same_{}", worker % 2), [])
                            .unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let contexts: Vec<IsolationContext> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    let roots: HashSet<_> = contexts.iter().map(|c| c.root().to_path_buf()).collect();
    assert_eq!(roots.len(), 200);
    for a in &contexts {
        for b in &contexts {
            if a.root() != b.root() {
                assert!(!a.root().starts_with(b.root()));
            }
        }
    }
}

#[test]
fn test_environment_is_allow_listed() {
    let base = tempfile::tempdir().unwrap();
    let spec = IsolationSpec {
        base_dir: Some(base.path().to_path_buf()),
        passthrough: vec!["PATH".into()],
        fixed_env: BTreeMap::from([("CI".to_string(), "1".to_string())]),
        keep: false,
    };
    let ctx = IsolationContext::create(&spec, "env", []).unwrap();

    let allowed: HashSet<&str> = [
        "PATH",
        "CI",
        "HOME",
        "XDG_CONFIG_HOME",
        "XDG_CACHE_HOME",
        "XDG_DATA_HOME",
        "XDG_STATE_HOME",
        "TMPDIR",
    ]
    .into_iter()
    .collect();
    for key in ctx.env().keys() {
        assert!(allowed.contains(key.as_str()), "{key} leaked into the context");
    }
    assert_eq!(ctx.env()["CI"], "1");
    assert!(ctx.env()["XDG_CONFIG_HOME"].starts_with(&ctx.env()["HOME"]));
    assert!(ctx.home().starts_with(ctx.root()));
}

#[test]
fn test_teardown_is_idempotent() {
    let base = tempfile::tempdir().unwrap();
    let mut ctx = IsolationContext::create(&spec_in(base.path()), "t", []).unwrap();
    std::fs::write(ctx.home().join("file"), "data").unwrap();
    let root = ctx.root().to_path_buf();

    assert!(ctx.teardown().is_ok());
    assert!(ctx.teardown().is_ok());
    assert!(ctx.is_torn_down());
    assert!(!root.exists());
}

#[test]
fn test_teardown_after_the_test_removed_its_tree() {
    let base = tempfile::tempdir().unwrap();
    let mut ctx = IsolationContext::create(&spec_in(base.path()), "t", []).unwrap();
    std::fs::remove_dir_all(ctx.root()).unwrap();
    assert_eq!(ctx.teardown().unwrap(), None);
}

#[cfg(unix)]
#[test]
fn test_teardown_handles_read_only_directories() {
    use std::os::unix::fs::PermissionsExt;

    let base = tempfile::tempdir().unwrap();
    let mut ctx = IsolationContext::create(&spec_in(base.path()), "t", []).unwrap();
    let locked = ctx.work_dir().join("locked");
    std::fs::create_dir(&locked).unwrap();
    std::fs::write(locked.join("f"), "x").unwrap();
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o500)).unwrap();

    let root = ctx.root().to_path_buf();
    assert!(ctx.teardown().is_ok());
    assert!(!root.exists());
}

#[test]
fn test_setup_failure_is_an_isolation_error() {
    let base = tempfile::tempdir().unwrap();
    let file = base.path().join("not-a-dir");
    std::fs::write(&file, "").unwrap();

    let err = IsolationContext::create(&spec_in(&file), "t", []).unwrap_err();
    assert!(matches!(
        err,
        shellmatrix::core::error::EngineError::IsolationSetup { .. }
    ));
}
