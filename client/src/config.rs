// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "SWITCHTEC_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/switchtec/switchtec.toml";

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Device used when none is given on the command line.
    pub device: Option<String>,
    pub pager: String,
    pub hexdump: String,
    /// Default measurement window for `bw` and `latency`, in seconds.
    pub measure_time: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: None,
            pager: "less".into(),
            hexdump: "hd".into(),
            measure_time: 5,
        }
    }
}

impl Config {
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Load the configuration. An explicit path or `$SWITCHTEC_CONFIG` must
    /// exist; the system-wide default is optional.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let path = match explicit {
            Some(p) => p,
            None => {
                let p = PathBuf::from(DEFAULT_CONFIG_PATH);
                if !p.exists() {
                    return Ok(Self::default());
                }
                p
            }
        };

        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_toml(&s).with_context(|| format!("parse config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_take_defaults() {
        let c = Config::from_toml("device = \"switchtec1\"\n").unwrap();
        assert_eq!(c.device.as_deref(), Some("switchtec1"));
        assert_eq!(c.pager, "less");
        assert_eq!(c.measure_time, 5);
    }

    #[test]
    fn full_file() {
        let c = Config::from_toml(
            r#"
            device = "0000:03:00.1"
            pager = "more"
            hexdump = "xxd"
            measure_time = 10
            "#,
        )
        .unwrap();
        assert_eq!(
            c,
            Config {
                device: Some("0000:03:00.1".into()),
                pager: "more".into(),
                hexdump: "xxd".into(),
                measure_time: 10,
            }
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_toml("colour = true\n").is_err());
    }

    #[test]
    fn explicit_path_must_exist() {
        assert!(Config::load(Some(Path::new("/nonexistent/switchtec.toml"))).is_err());
    }
}
