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

//! Config is created by the host and handed to the `World`, whereupon it is available to all
//! components. Holds things typically configured by CLI flags or the host's YAML file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_SCRIPT_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_HOOK_INTERVAL: u32 = 1000;
pub const DEFAULT_MEMORY_LIMIT: usize = 16 * 1024 * 1024;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scripts: ScriptConfig,
}

/// Limits applied to every run of a thing's program, including the top-level chunk at compile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// Wall-clock budget for one call, in milliseconds.
    pub timeout_ms: u64,
    /// How many VM instructions run between deadline checks.
    pub hook_interval: u32,
    /// Upper bound on one program's interpreter heap, in bytes.
    pub memory_limit: usize,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_SCRIPT_TIMEOUT_MS,
            hook_interval: DEFAULT_HOOK_INTERVAL,
            memory_limit: DEFAULT_MEMORY_LIMIT,
        }
    }
}

impl ScriptConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
