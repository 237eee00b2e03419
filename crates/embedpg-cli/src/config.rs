//! Configuration loading helpers for the CLI.
//!
//! Leading configuration flags are forwarded to `ortho_config` while the
//! remaining tokens form the subcommand parsed by `clap`.

use std::ffi::{OsStr, OsString};

use embedpg_config::Config;

use crate::AppError;

/// Flags recognised by the configuration loader.
///
/// Kept in step with the fields of [`Config`]; boolean settings are left to
/// configuration files and the environment.
pub(crate) const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--engine-version",
    "--port",
    "--database",
    "--username",
    "--password",
    "--locale",
    "--encoding",
    "--cache-path",
    "--runtime-path",
    "--data-path",
    "--binaries-path",
    "--binary-repository-url",
    "--start-timeout-ms",
    "--start-parameters",
    "--log-filter",
    "--log-format",
];

pub(crate) trait ConfigLoader {
    /// Loads configuration for the CLI.
    ///
    /// Configuration flags must precede the subcommand; later flags are
    /// treated as subcommand arguments.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_args(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Skip,
}

fn classify(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    if !text.starts_with("--") {
        return FlagAction::Skip;
    }
    let (flag, has_inline_value) = match text.split_once('=') {
        Some((flag, _)) => (flag, true),
        None => (text.as_ref(), false),
    };
    if CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: !has_inline_value,
        }
    } else {
        FlagAction::Skip
    }
}

/// Arguments destined for the loader plus the index where the command begins.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ConfigArgumentSplit {
    pub(crate) config_arguments: Vec<OsString>,
    pub(crate) command_start: usize,
}

impl ConfigArgumentSplit {
    /// Program name followed by the tokens after the configuration flags.
    pub(crate) fn command_arguments(&self, args: &[OsString]) -> Vec<OsString> {
        self.config_arguments
            .first()
            .into_iter()
            .chain(args.iter().skip(self.command_start))
            .cloned()
            .collect()
    }
}

pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let mut arguments = args.iter();
    let Some(program) = arguments.next() else {
        return ConfigArgumentSplit {
            config_arguments: Vec::new(),
            command_start: 0,
        };
    };

    let mut config_arguments = vec![program.clone()];
    let mut awaiting_value = false;
    for argument in arguments {
        if awaiting_value {
            awaiting_value = false;
        } else {
            match classify(argument) {
                FlagAction::Include { needs_value } => awaiting_value = needs_value,
                FlagAction::Skip => break,
            }
        }
        config_arguments.push(argument.clone());
    }

    let command_start = config_arguments.len();
    ConfigArgumentSplit {
        config_arguments,
        command_start,
    }
}
