use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{anyhow, Context};
use lotfolio_core::fx::RateSnapshot;
use lotfolio_core::settings::LedgerSettings;
use rust_decimal::Decimal;

pub struct Config {
    pub listen_addr: SocketAddr,
    pub data_path: PathBuf,
    pub display_currency: String,
    pub fallback_rates: RateSnapshot,
    pub cors_allow: Vec<String>,
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let listen_addr: SocketAddr = std::env::var("LOTFOLIO_LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8088".to_string())
            .parse()
            .context("Invalid LOTFOLIO_LISTEN_ADDR")?;
        let data_path = std::env::var("LOTFOLIO_DATA_PATH")
            .unwrap_or_else(|_| "./data/ledger.json".into())
            .into();
        let display_currency = std::env::var("LOTFOLIO_DISPLAY_CURRENCY")
            .unwrap_or_else(|_| "USD".into())
            .trim()
            .to_uppercase();
        let fallback_rates = match std::env::var("LOTFOLIO_FALLBACK_RATES") {
            Ok(raw) => parse_rates(&raw).context("Invalid LOTFOLIO_FALLBACK_RATES")?,
            Err(_) => RateSnapshot::new(),
        };
        let cors_allow = std::env::var("LOTFOLIO_CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "*".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let timeout_ms: u64 = std::env::var("LOTFOLIO_REQUEST_TIMEOUT_MS")
            .unwrap_or_else(|_| "30000".into())
            .parse()
            .unwrap_or(30000);
        Ok(Self {
            listen_addr,
            data_path,
            display_currency,
            fallback_rates,
            cors_allow,
            request_timeout: Duration::from_millis(timeout_ms),
        })
    }

    pub fn ledger_settings(&self) -> LedgerSettings {
        LedgerSettings::default()
            .with_display_currency(&self.display_currency)
            .with_fallback_rates(self.fallback_rates.clone())
    }
}

/// Parses `EUR=0.92,GBP=0.79` into a rate snapshot.
pub fn parse_rates(raw: &str) -> anyhow::Result<RateSnapshot> {
    let mut rates = RateSnapshot::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (currency, rate) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("expected CURRENCY=RATE, got '{}'", pair))?;
        let rate = Decimal::from_str(rate.trim()).with_context(|| format!("bad rate for {}", currency))?;
        if rate <= Decimal::ZERO {
            return Err(anyhow!("rate for {} must be positive", currency));
        }
        rates.insert(currency.trim(), rate);
    }
    Ok(rates)
}
