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

use fjall::PartitionCreateOptions;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Flush the journal to disk after every structural write (create, move, save), rather
    /// than leaving it to fjall's background flushing.
    #[serde(default)]
    pub sync_writes: bool,

    /// Per-partition configurations
    pub things: Option<TableConfig>,
    pub contents: Option<TableConfig>,
    pub accounts: Option<TableConfig>,
}

/// Per-partition configuration. See the fjall documentation for what these tune.
#[derive(Clone, Default, Debug, Serialize, Deserialize)]
pub struct TableConfig {
    pub max_memtable_size: Option<u32>,
    pub block_size: Option<u32>,
}

impl TableConfig {
    pub fn partition_options(config: &Option<TableConfig>) -> PartitionCreateOptions {
        let mut opts = PartitionCreateOptions::default();
        let Some(config) = config else {
            return opts;
        };
        if let Some(max_memtable_size) = config.max_memtable_size {
            opts = opts.max_memtable_size(max_memtable_size);
        }
        if let Some(block_size) = config.block_size {
            opts = opts.block_size(block_size);
        }
        opts
    }
}
