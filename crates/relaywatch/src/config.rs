use std::collections::HashSet;

use relaywire::Pubkey;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::publish::DEFAULT_MATERIAL_CHANGE_THRESHOLD;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Relays that receive our signed assertions.
    pub downstream_relays: Vec<String>,
    /// Relays we pull third-party telemetry from.
    pub source_relays: Vec<String>,
    /// Relays under evaluation.
    pub monitored_relays: Vec<String>,
    /// Accepted monitor pubkeys, hex or npub. Empty accepts everyone.
    pub trusted_monitors: Vec<String>,
    pub probe_interval_secs: u64,
    /// Scoring window: how far back probes count.
    pub probe_window_secs: u64,
    pub publish_threshold: u8,
    pub publish_timeout_secs: u64,
    /// Publisher secret, hex or nsec.
    pub secret_key: Option<String>,
    /// JSON file with freedom scores and alliance membership.
    pub country_data_path: Option<String>,
    pub geo_endpoint: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            downstream_relays: vec![],
            source_relays: vec![],
            monitored_relays: vec![],
            trusted_monitors: vec![],
            probe_interval_secs: 300,
            probe_window_secs: 7 * 86_400,
            publish_threshold: DEFAULT_MATERIAL_CHANGE_THRESHOLD,
            publish_timeout_secs: 10,
            secret_key: None,
            country_data_path: None,
            geo_endpoint: None,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Parse the configured trust set, skipping entries that don't parse.
    pub fn trusted_monitor_set(&self) -> HashSet<Pubkey> {
        let mut set = HashSet::new();
        for entry in &self.trusted_monitors {
            match Pubkey::parse(entry) {
                Ok(pk) => {
                    set.insert(pk);
                }
                Err(err) => warn!("ignoring bad trusted monitor {entry}: {err}"),
            }
        }
        set
    }
}

/// Hand-parsed CLI flags layered over the config file.
#[derive(Debug, Default)]
pub struct Args {
    pub config: Option<String>,
    pub relays: Vec<String>,
    pub downstream: Vec<String>,
    pub sources: Vec<String>,
    pub sec: Option<String>,
    pub interval: Option<u64>,
    pub threshold: Option<u8>,
    pub force: bool,
    pub once: bool,
    pub debug: bool,
}

impl Args {
    pub fn parse(args: &[String]) -> Self {
        let mut res = Args::default();

        let mut i = 0;
        let len = args.len();
        while i < len {
            let arg = &args[i];

            if arg == "--debug" {
                res.debug = true;
            } else if arg == "--force" {
                res.force = true;
            } else if arg == "--once" {
                res.once = true;
            } else if arg == "--config" {
                i += 1;
                if let Some(next_arg) = args.get(i) {
                    res.config = Some(next_arg.clone());
                } else {
                    warn!("config argument missing?");
                }
            } else if arg == "-r" || arg == "--relay" {
                i += 1;
                if let Some(next_arg) = args.get(i) {
                    res.relays.push(next_arg.clone());
                } else {
                    warn!("relay argument missing?");
                }
            } else if arg == "--downstream" {
                i += 1;
                if let Some(next_arg) = args.get(i) {
                    res.downstream.push(next_arg.clone());
                } else {
                    warn!("downstream argument missing?");
                }
            } else if arg == "--source" {
                i += 1;
                if let Some(next_arg) = args.get(i) {
                    res.sources.push(next_arg.clone());
                } else {
                    warn!("source argument missing?");
                }
            } else if arg == "--sec" || arg == "--nsec" {
                i += 1;
                if let Some(next_arg) = args.get(i) {
                    res.sec = Some(next_arg.clone());
                } else {
                    warn!("sec argument missing?");
                }
            } else if arg == "--interval" {
                i += 1;
                res.interval = args.get(i).and_then(|v| v.parse().ok());
            } else if arg == "--threshold" {
                i += 1;
                res.threshold = args.get(i).and_then(|v| v.parse().ok());
            }

            i += 1;
        }

        res
    }

    /// Flags win over the config file.
    pub fn apply(&self, config: &mut Config) {
        config.monitored_relays.extend(self.relays.iter().cloned());
        config
            .downstream_relays
            .extend(self.downstream.iter().cloned());
        config.source_relays.extend(self.sources.iter().cloned());
        if let Some(sec) = &self.sec {
            config.secret_key = Some(sec.clone());
        }
        if let Some(interval) = self.interval {
            config.probe_interval_secs = interval;
        }
        if let Some(threshold) = self.threshold {
            config.publish_threshold = threshold;
        }
    }
}
