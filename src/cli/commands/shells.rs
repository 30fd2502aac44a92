//! # Shells Command Module / Shells 命令模块
//!
//! Lists every registered shell kind and whether its executable can be
//! found on this system.
//!
//! 列出每个已注册的 shell 类型，以及其可执行文件能否在当前系统上找到。

use anyhow::Result;
use colored::*;
use std::path::PathBuf;

use crate::{
    core::{config::load_suite, shells::ShellRegistry},
    infra::t,
};

/// Executes the shells command. The suite file, when it exists, contributes
/// its custom shells and overrides; otherwise only the built-ins are listed.
///
/// 执行 shells 命令。套件文件存在时，会加入其中的自定义 shell 和覆盖配置；
/// 否则只列出内置 shell。
pub fn execute(config: Option<PathBuf>) -> Result<()> {
    let registry = match config.filter(|path| path.exists()) {
        Some(path) => load_suite(&path)?.registry()?,
        None => ShellRegistry::with_builtins(),
    };

    println!("{}", t!("shells.banner").bold());
    for kind in registry.kinds() {
        match registry.resolve(kind) {
            Ok(resolved) => println!(
                "  - {:<10} {}",
                kind.to_string().green(),
                resolved.program.display()
            ),
            Err(_) => println!(
                "  - {:<10} {}",
                kind.to_string().red(),
                t!("shells.not_found").dimmed()
            ),
        }
    }
    Ok(())
}
