use std::path::Path;

use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Configuration for the CLI.
#[derive(Deserialize, Serialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Configuration for the `scan` command.
    pub scan: ScanConfig,
    /// Configuration for the commands that generate bytecode (`dump` and
    /// `compile`).
    pub dump: DumpConfig,
}

/// Configuration for the `scan` command.
#[derive(Deserialize, Serialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct ScanConfig {
    /// Print the text matched by each token.
    pub print_text: bool,
    /// Print the byte range of each token.
    pub print_range: bool,
}

/// Configuration for the commands that generate bytecode.
#[derive(Deserialize, Serialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct DumpConfig {
    /// Byte order used for instruction operands.
    pub little_endian: bool,
}

impl Default for DumpConfig {
    fn default() -> DumpConfig {
        DumpConfig { little_endian: true }
    }
}

/// Load a config file from a given path. Path must contain a valid TOML file
/// or this function will propagate the error. Options missing in the file
/// take their default values.
pub fn load_config_from_file(
    config_file: &Path,
) -> Result<Config, Box<figment::Error>> {
    let config: Config =
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file_exact(config_file))
            .extract()?;
    Ok(config)
}
