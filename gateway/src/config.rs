use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use uuid::Uuid;

use consts::{DEFAULT_LOG_BATCH_SIZE, DEFAULT_MIN_RSSI_DBM, DISCOVERY_RESTART_SECS};
use gateway_core::arbiter::Arbiter;

/// CLI surface (spec §10.6), following `host-ble`'s `Args` struct layout.
#[derive(Debug, Parser)]
#[command(about = "Discovers BT510 sensors and emits measurements")]
pub struct Args {
    /// Print available Bluetooth adapters and exit.
    #[arg(long)]
    pub list_adapters: bool,

    /// Adapter to use, matched by substring against its info string; first
    /// available adapter if unset or not found.
    #[arg(short, long)]
    pub adapter: Option<String>,

    #[arg(long)]
    pub name_prefix: Option<String>,

    #[arg(long)]
    pub service_uuid: Option<Uuid>,

    #[arg(long)]
    pub min_rssi: Option<i16>,

    #[arg(long)]
    pub arbiter_capacity: Option<usize>,

    #[arg(long)]
    pub scan_restart_secs: Option<u64>,

    #[arg(long, default_value_t = DEFAULT_LOG_BATCH_SIZE)]
    pub log_batch_size: u32,

    /// Parse advertisements only; never open an active session to download logs.
    #[arg(long)]
    pub advertisement_only: bool,

    /// Optional TOML file; CLI flags override any value it sets.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Mirror of [`Args`]'s tunables, loadable from a TOML file for fleet deployments
/// (spec §10.3). Every field optional: a file need only override what it cares about.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileConfig {
    pub adapter: Option<String>,
    pub name_prefix: Option<String>,
    pub service_uuid: Option<Uuid>,
    pub min_rssi: Option<i16>,
    pub arbiter_capacity: Option<usize>,
    pub scan_restart_secs: Option<u64>,
    pub log_batch_size: Option<u32>,
    pub advertisement_only: Option<bool>,
}

impl FileConfig {
    fn load(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }
}

/// Which harvesting mode a dispatched worker runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Parse the advertisement payload only; no active GATT session, no token.
    Advertisement,
    /// Open a session and drain the on-device log (spec §4.5's `process_log`).
    Log,
}

/// The gateway's fully resolved configuration: CLI flags layered over an optional
/// file, with CLI always winning (spec §10.3).
pub struct GatewayConfig {
    pub adapter: Option<String>,
    pub name_prefix: Option<String>,
    pub service_uuid: Option<Uuid>,
    pub min_rssi: i16,
    pub arbiter_capacity: usize,
    pub scan_restart_secs: u64,
    pub log_batch_size: u32,
    pub mode: Mode,
}

impl GatewayConfig {
    pub fn resolve(args: &Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        let mode = if args.advertisement_only || file.advertisement_only.unwrap_or(false) {
            Mode::Advertisement
        } else {
            Mode::Log
        };

        Ok(GatewayConfig {
            adapter: args.adapter.clone().or(file.adapter),
            name_prefix: args.name_prefix.clone().or(file.name_prefix),
            service_uuid: args.service_uuid.or(file.service_uuid),
            min_rssi: args.min_rssi.or(file.min_rssi).unwrap_or(DEFAULT_MIN_RSSI_DBM),
            arbiter_capacity: args.arbiter_capacity.or(file.arbiter_capacity).unwrap_or_else(Arbiter::default_capacity),
            scan_restart_secs: args.scan_restart_secs.or(file.scan_restart_secs).unwrap_or(DISCOVERY_RESTART_SECS),
            log_batch_size: if args.log_batch_size != DEFAULT_LOG_BATCH_SIZE {
                args.log_batch_size
            } else {
                file.log_batch_size.unwrap_or(DEFAULT_LOG_BATCH_SIZE)
            },
            mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_args() -> Args {
        Args {
            list_adapters: false,
            adapter: None,
            name_prefix: None,
            service_uuid: None,
            min_rssi: None,
            arbiter_capacity: None,
            scan_restart_secs: None,
            log_batch_size: DEFAULT_LOG_BATCH_SIZE,
            advertisement_only: false,
            config: None,
        }
    }

    #[test]
    fn defaults_with_no_cli_or_file() {
        let cfg = GatewayConfig::resolve(&bare_args()).unwrap();
        assert_eq!(cfg.min_rssi, DEFAULT_MIN_RSSI_DBM);
        assert_eq!(cfg.scan_restart_secs, DISCOVERY_RESTART_SECS);
        assert_eq!(cfg.mode, Mode::Log);
    }

    #[test]
    fn cli_min_rssi_overrides_default() {
        let mut args = bare_args();
        args.min_rssi = Some(-70);
        let cfg = GatewayConfig::resolve(&args).unwrap();
        assert_eq!(cfg.min_rssi, -70);
    }

    #[test]
    fn advertisement_only_flag_selects_advertisement_mode() {
        let mut args = bare_args();
        args.advertisement_only = true;
        let cfg = GatewayConfig::resolve(&args).unwrap();
        assert_eq!(cfg.mode, Mode::Advertisement);
    }
}
