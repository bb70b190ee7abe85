// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use clap::builder::ValueHint;
use clap_derive::Parser;
use eyre::eyre;
use figment::Figment;
use figment::providers::{Format as ProviderFormat, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thicket_db::DatabaseConfig;
use thicket_kernel::Config;

/// Everything the host can be configured with from a file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub world: Config,
}

#[derive(Parser, Debug)]
pub struct Args {
    #[arg(
        value_name = "data-dir",
        help = "Directory to store all database files under",
        value_hint = ValueHint::DirPath,
        default_value = "./thicket-data"
    )]
    pub data_dir: PathBuf,

    #[arg(
        long,
        value_name = "db",
        help = "World database directory (relative to data-dir if not absolute)",
        value_hint = ValueHint::FilePath,
        default_value = "world.db"
    )]
    pub db: PathBuf,

    #[arg(
        long,
        value_name = "listen-address",
        help = "Address to accept player connections on",
        default_value = "0.0.0.0:8888"
    )]
    pub listen_address: String,

    #[arg(
        long,
        value_name = "config",
        help = "Path to configuration (YAML) file to use, if any. If not specified, defaults are used.\
                Configuration file values can be overridden by command line arguments.",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[arg(
        long,
        value_name = "script-timeout-ms",
        help = "How long a single program call may run before it is stopped"
    )]
    pub script_timeout_ms: Option<u64>,

    #[arg(
        long,
        value_name = "sync-writes",
        help = "Sync every write to disk before acknowledging it"
    )]
    pub sync_writes: Option<bool>,

    #[arg(long, help = "Enable debug logging", default_value = "false")]
    pub debug: bool,
}

impl Args {
    fn merge_config(&self, mut config: HostConfig) -> HostConfig {
        if let Some(timeout_ms) = self.script_timeout_ms {
            config.world.scripts.timeout_ms = timeout_ms;
        }
        if let Some(sync_writes) = self.sync_writes {
            config.database.sync_writes = sync_writes;
        }
        config
    }

    /// Load the configuration file if we have it, then apply the command line on top.
    pub fn load_config(&self) -> Result<HostConfig, eyre::Report> {
        let config = match &self.config_file {
            Some(config_path) => Figment::new()
                .merge(Serialized::defaults(HostConfig::default()))
                .merge(Yaml::file(config_path))
                .extract::<HostConfig>()
                .map_err(|e| {
                    eyre!(
                        "Failed to parse configuration from {:?}: {}",
                        config_path,
                        e
                    )
                })?,
            None => HostConfig::default(),
        };
        Ok(self.merge_config(config))
    }

    pub fn resolved_db_path(&self) -> PathBuf {
        if self.db.is_absolute() {
            self.db.clone()
        } else {
            self.data_dir.join(&self.db)
        }
    }
}
