//! # Command-Line Interface Module / 命令行接口模块
//!
//! Builds the `clap` command tree with localized help texts and dispatches
//! to the `run` and `shells` subcommands.
//!
//! 使用本地化的帮助文本构建 `clap` 命令树，并分派到 `run` 和 `shells` 子命令。

use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::{env, path::PathBuf};

use crate::config::DEFAULT_SUITE_FILE;
use crate::infra::t;

pub mod commands {
    pub mod run;
    pub mod shells;
}

/// Pre-parses the command line arguments to find the language setting.
/// This allows i18n to be initialized before the full CLI is built.
/// It looks for a `--lang <VALUE>` or `--lang=<VALUE>` argument.
fn pre_parse_language() -> Option<String> {
    let args: Vec<String> = env::args().collect();
    if let Some(pos) = args.iter().position(|arg| arg == "--lang") {
        return args.get(pos + 1).cloned();
    }
    args.iter()
        .find_map(|arg| arg.strip_prefix("--lang="))
        .map(str::to_string)
}

fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .help(t!("cli.arg_config").to_string())
        .value_name("CONFIG")
        .default_value(DEFAULT_SUITE_FILE)
        .value_parser(clap::value_parser!(PathBuf))
        .action(ArgAction::Set)
}

/// Builds the command tree. Help texts use the current locale.
/// 构建命令树。帮助文本使用当前的语言区域设置。
pub fn build_cli() -> Command {
    Command::new("shellmatrix")
        .version(env!("CARGO_PKG_VERSION"))
        .about(t!("cli.about").to_string())
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("lang")
                .long("lang")
                .help(t!("cli.arg_lang").to_string())
                .value_name("LANGUAGE")
                .global(true)
                .action(ArgAction::Set),
        )
        .subcommand(
            Command::new("run")
                .about(t!("cli.cmd_run_about").to_string())
                .arg(config_arg())
                .arg(
                    Arg::new("jobs")
                        .short('j')
                        .long("jobs")
                        .help(t!("cli.arg_jobs").to_string())
                        .value_name("JOBS")
                        .value_parser(clap::value_parser!(usize))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .help(t!("cli.arg_timeout").to_string())
                        .value_name("SECONDS")
                        .value_parser(clap::value_parser!(u64))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("keep-dirs")
                        .long("keep-dirs")
                        .help(t!("cli.arg_keep_dirs").to_string())
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("temp-root")
                        .long("temp-root")
                        .help(t!("cli.arg_temp_root").to_string())
                        .value_name("DIR")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help(t!("cli.arg_json").to_string())
                        .value_name("FILE")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                ),
        )
        .subcommand(
            Command::new("shells")
                .about(t!("cli.cmd_shells_about").to_string())
                .arg(config_arg()),
        )
}

pub async fn run() -> Result<()> {
    // Pre-parse language and initialize i18n first.
    let language = pre_parse_language();
    match &language {
        Some(lang) => crate::set_language(lang),
        None => crate::init(),
    }

    let matches = build_cli().get_matches();

    match matches.subcommand() {
        Some(("run", run_matches)) => {
            commands::run::execute(run_args(run_matches), language.is_some()).await
        }
        Some(("shells", shells_matches)) => {
            let config = shells_matches.get_one::<PathBuf>("config").cloned();
            commands::shells::execute(config)
        }
        // `subcommand_required` makes clap exit before reaching this arm.
        _ => Ok(()),
    }
}

fn run_args(matches: &ArgMatches) -> commands::run::RunArgs {
    commands::run::RunArgs {
        config: matches
            .get_one::<PathBuf>("config")
            .cloned()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SUITE_FILE)),
        jobs: matches.get_one::<usize>("jobs").copied(),
        timeout_secs: matches.get_one::<u64>("timeout").copied(),
        keep_dirs: matches.get_flag("keep-dirs"),
        temp_root: matches.get_one::<PathBuf>("temp-root").cloned(),
        json: matches.get_one::<PathBuf>("json").cloned(),
    }
}
