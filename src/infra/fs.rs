//! # File System Operations Module / 文件系统操作模块
//!
//! This module builds the isolation context of a test instance: a uniquely
//! named temporary tree that serves as home directory, XDG base directories,
//! temp directory and working directory, plus the environment variables the
//! shell is started with.
//!
//! 此模块为测试实例构建隔离上下文：一个唯一命名的临时目录树，
//! 用作主目录、XDG 基础目录、临时目录和工作目录，
//! 以及启动 shell 时使用的环境变量。

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::core::error::EngineError;

/// Variables inherited from the parent process unless configured otherwise.
/// 除非另有配置，否则从父进程继承的变量。
pub const DEFAULT_PASSTHROUGH: &[&str] = &["PATH", "TERM", "LANG", "LC_ALL", "USER", "LOGNAME", "TZ"];

/// Prefix of every isolation directory name.
pub const DIR_PREFIX: &str = "shellmatrix_";

/// How isolation contexts are built for a run.
/// 一次运行中构建隔离上下文的方式。
#[derive(Debug, Clone)]
pub struct IsolationSpec {
    /// Parent directory of every context; the system temp dir when `None`.
    /// 所有上下文的父目录；为 `None` 时使用系统临时目录。
    pub base_dir: Option<PathBuf>,
    /// Names of parent variables that may pass through. Everything else is dropped.
    /// 允许透传的父进程变量名。其他所有变量都会被丢弃。
    pub passthrough: Vec<String>,
    /// Fixed variables added to every context.
    /// 添加到每个上下文中的固定变量。
    pub fixed_env: BTreeMap<String, String>,
    /// Keep the tree on teardown, for debugging.
    /// 拆除时保留目录树，用于调试。
    pub keep: bool,
}

impl Default for IsolationSpec {
    fn default() -> Self {
        Self {
            base_dir: None,
            passthrough: DEFAULT_PASSTHROUGH.iter().map(|s| s.to_string()).collect(),
            fixed_env: BTreeMap::new(),
            keep: false,
        }
    }
}

/// Paths inside one isolation tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolationLayout {
    pub root: PathBuf,
    pub home: PathBuf,
    pub config: PathBuf,
    pub cache: PathBuf,
    pub data: PathBuf,
    pub state: PathBuf,
    pub tmp: PathBuf,
    pub work: PathBuf,
}

impl IsolationLayout {
    fn under(root: &Path) -> Self {
        let home = root.join("home");
        Self {
            root: root.to_path_buf(),
            config: home.join(".config"),
            cache: home.join(".cache"),
            data: home.join(".local").join("share"),
            state: home.join(".local").join("state"),
            tmp: root.join("tmp"),
            work: root.join("work"),
            home,
        }
    }

    fn directories(&self) -> [&Path; 7] {
        [
            &self.home,
            &self.config,
            &self.cache,
            &self.data,
            &self.state,
            &self.tmp,
            &self.work,
        ]
    }
}

/// The ephemeral sandbox of one test instance. Exclusively owned by the
/// worker that created it; never shared or reused.
///
/// 单个测试实例的临时沙箱。由创建它的工作者独占；从不共享或复用。
#[derive(Debug)]
pub struct IsolationContext {
    /// The `TempDir` guard. Dropping it removes the tree; `teardown` takes it.
    /// `TempDir` 的 guard。丢弃它会删除目录树；`teardown` 会取走它。
    dir: Option<TempDir>,
    layout: IsolationLayout,
    env: BTreeMap<String, String>,
    keep: bool,
    retained: Option<PathBuf>,
}

impl IsolationContext {
    /// Creates a fresh tree under the configured base directory and computes the
    /// environment: allow-listed parent variables, then fixed variables, then
    /// `extra_env`, and finally the isolation directories themselves, which
    /// always win.
    ///
    /// 在规格指定的基础目录下创建新的目录树并计算环境变量：
    /// 先是允许列表中的父进程变量，然后是固定变量，再是 `extra_env`，
    /// 最后是隔离目录本身，它们总是优先。
    pub fn create<'a>(
        spec: &IsolationSpec,
        label: &str,
        extra_env: impl IntoIterator<Item = (&'a String, &'a String)>,
    ) -> Result<Self, EngineError> {
        let base = spec.base_dir.clone().unwrap_or_else(std::env::temp_dir);
        let setup_error = |source: io::Error| EngineError::IsolationSetup {
            base: base.clone(),
            source,
        };

        fs::create_dir_all(&base).map_err(setup_error)?;

        let sanitized = label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .take(48)
            .collect::<String>();
        let dir = tempfile::Builder::new()
            .prefix(&format!("{DIR_PREFIX}{sanitized}_"))
            .tempdir_in(&base)
            .map_err(setup_error)?;

        let layout = IsolationLayout::under(dir.path());
        for path in layout.directories() {
            fs::create_dir_all(path).map_err(setup_error)?;
        }

        let mut env = BTreeMap::new();
        for name in &spec.passthrough {
            if let Ok(value) = std::env::var(name) {
                env.insert(name.clone(), value);
            }
        }
        env.extend(spec.fixed_env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env.extend(extra_env.into_iter().map(|(k, v)| (k.clone(), v.clone())));

        let path_var = |p: &Path| p.to_string_lossy().into_owned();
        env.insert("HOME".into(), path_var(&layout.home));
        env.insert("XDG_CONFIG_HOME".into(), path_var(&layout.config));
        env.insert("XDG_CACHE_HOME".into(), path_var(&layout.cache));
        env.insert("XDG_DATA_HOME".into(), path_var(&layout.data));
        env.insert("XDG_STATE_HOME".into(), path_var(&layout.state));
        env.insert("TMPDIR".into(), path_var(&layout.tmp));

        Ok(Self {
            dir: Some(dir),
            layout,
            env,
            keep: spec.keep,
            retained: None,
        })
    }

    pub fn layout(&self) -> &IsolationLayout {
        &self.layout
    }

    pub fn root(&self) -> &Path {
        &self.layout.root
    }

    pub fn home(&self) -> &Path {
        &self.layout.home
    }

    pub fn work_dir(&self) -> &Path {
        &self.layout.work
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.insert(key.into(), value.into());
    }

    pub fn is_torn_down(&self) -> bool {
        self.dir.is_none()
    }

    /// Removes the tree, or keeps it when retention was requested and returns
    /// its path. Safe to call more than once, and safe when the test already
    /// removed part or all of the tree.
    ///
    /// 删除目录树；如果请求了保留则保留它并返回其路径。
    /// 可以安全地多次调用，测试已经删除了部分或全部目录树时也是安全的。
    pub fn teardown(&mut self) -> Result<Option<PathBuf>, EngineError> {
        let Some(dir) = self.dir.take() else {
            return Ok(self.retained.clone());
        };

        if self.keep {
            let path = dir.keep();
            self.retained = Some(path.clone());
            return Ok(Some(path));
        }

        let path = dir.path().to_path_buf();
        match dir.close() {
            Ok(()) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                // A test may leave read-only directories behind; retry after
                // making them writable again.
                make_writable(&path);
                match fs::remove_dir_all(&path) {
                    Ok(()) => Ok(None),
                    Err(retry) if retry.kind() == io::ErrorKind::NotFound => Ok(None),
                    Err(_) => Err(EngineError::io(
                        format!("removing isolation directory '{}'", path.display()),
                        e,
                    )),
                }
            }
        }
    }
}

#[cfg(unix)]
fn make_writable(root: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        if let Ok(meta) = fs::symlink_metadata(&dir) {
            if meta.is_dir() {
                let mut perms = meta.permissions();
                perms.set_mode(perms.mode() | 0o700);
                let _ = fs::set_permissions(&dir, perms);
                if let Ok(entries) = fs::read_dir(&dir) {
                    stack.extend(entries.flatten().map(|entry| entry.path()));
                }
            }
        }
    }
}

#[cfg(not(unix))]
fn make_writable(_root: &Path) {}

/// Writes `contents` to `path`, marking the file executable on Unix.
/// 将 `contents` 写入 `path`，在 Unix 上将文件标记为可执行。
pub fn write_script(path: &Path, contents: &str) -> Result<(), EngineError> {
    fs::write(path, contents)
        .map_err(|e| EngineError::io(format!("writing script '{}'", path.display()), e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)
            .map_err(|e| EngineError::io("reading script permissions", e))?
            .permissions();
        perms.set_mode(perms.mode() | 0o700);
        fs::set_permissions(path, perms)
            .map_err(|e| EngineError::io("marking script executable", e))?;
    }

    Ok(())
}
