use std::time::Duration;

use serde::Deserialize;

use crate::capture::Facing;

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Postgres token store. When unset the process falls back to an
    /// in-memory store (demos and tests only; it is not shared across
    /// devices).
    pub database_url: Option<String>,
    /// Operator/device identifier stamped on ledger entries and exports.
    /// Set via GATEPASS_DEVICE_ID. Default: "device-" + random suffix.
    pub device_id: String,
    /// Decode sampling interval in milliseconds.
    /// Set via GATEPASS_SCAN_INTERVAL_MS. Default: 300.
    pub scan_interval_ms: u64,
    /// Result display cooldown in milliseconds before scanning re-arms.
    /// Set via GATEPASS_COOLDOWN_MS. Default: 1500.
    pub cooldown_ms: u64,
    /// Upper bound on one store call during redemption, in milliseconds.
    /// Set via GATEPASS_REDEEM_TIMEOUT_MS. Default: 5000.
    pub redeem_timeout_ms: u64,
    /// Default camera facing: "environment" or "user".
    pub camera_facing: String,
}

impl Config {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms.max(1))
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn redeem_timeout(&self) -> Duration {
        Duration::from_millis(self.redeem_timeout_ms.max(1))
    }

    pub fn facing(&self) -> Facing {
        Facing::parse(&self.camera_facing)
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    Ok(Config {
        database_url: std::env::var("DATABASE_URL").ok(),
        device_id: std::env::var("GATEPASS_DEVICE_ID").unwrap_or_else(|_| {
            let suffix = uuid::Uuid::new_v4().simple().to_string();
            format!("device-{}", &suffix[..8])
        }),
        scan_interval_ms: std::env::var("GATEPASS_SCAN_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(300),
        cooldown_ms: std::env::var("GATEPASS_COOLDOWN_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1500),
        redeem_timeout_ms: std::env::var("GATEPASS_REDEEM_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5000),
        camera_facing: std::env::var("GATEPASS_CAMERA_FACING")
            .unwrap_or_else(|_| "environment".into()),
    })
}
