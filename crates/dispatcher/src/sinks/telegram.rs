//! TelegramSink - periodic status message through the Bot API

use std::fmt::Write as _;
use std::time::Duration;

use contracts::{ContractError, DataSink, LoadSnapshot, Reading, TelegramConfig};
use load_control::LoadStatus;
use serde::Serialize;
use tracing::{debug, info};

/// Public Bot API endpoint
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Render the status text for one reading and the current load states
pub fn format_message(reading: &Reading, loads: &[LoadSnapshot]) -> String {
    let mut text = String::new();
    let c = &reading.counters;

    let _ = writeln!(text, "Smartmeter {}", reading.timestamp.format("%Y-%m-%d %H:%M:%S"));
    if reading.power_w >= 0.0 {
        let _ = writeln!(text, "Import: {:.0} W", reading.consumption_w());
    } else {
        let _ = writeln!(text, "Export: {:.0} W", reading.injection_w());
    }
    if let Some(tariff) = reading.tariff {
        let _ = writeln!(text, "Tariff: {}", tariff.as_str());
    }
    let _ = writeln!(
        text,
        "Consumed: {:.3} kWh (day {:.3}, night {:.3})",
        c.total_consumption_kwh(),
        c.consumption_day_kwh,
        c.consumption_night_kwh
    );
    let _ = write!(
        text,
        "Injected: {:.3} kWh (day {:.3}, night {:.3})",
        c.total_injection_kwh(),
        c.injection_day_kwh,
        c.injection_night_kwh
    );
    if let Some(gas) = &reading.gas {
        let _ = write!(text, "\nGas: {:.3} m3", gas.total_m3);
    }
    for load in loads {
        let _ = write!(text, "\nLoad {}: {}", load.name, load.state);
        if let Some(target) = load.pending {
            let _ = write!(text, " (pending {target})");
        }
    }
    text
}

/// Sink that posts the latest reading to a chat
pub struct TelegramSink {
    name: String,
    client: reqwest::Client,
    api_base: String,
    token: String,
    chat_id: String,
    loads: Option<LoadStatus>,
    sent: u64,
}

impl TelegramSink {
    pub fn new(name: impl Into<String>, config: &TelegramConfig) -> Result<Self, ContractError> {
        let name = name.into();
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ContractError::sink_connection(&name, e.to_string()))?;

        Ok(Self {
            name,
            client,
            api_base: TELEGRAM_API_BASE.to_string(),
            token: config.token.clone(),
            chat_id: config.chat_id.clone(),
            loads: None,
            sent: 0,
        })
    }

    /// Point the sink at another Bot API server
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Report the state of these loads with every message
    pub fn with_load_status(mut self, loads: LoadStatus) -> Self {
        self.loads = Some(loads);
        self
    }

    /// Message text for `reading` with the loads as they are now
    pub fn message(&self, reading: &Reading) -> String {
        let loads = self.loads.as_ref().map(LoadStatus::snapshots).unwrap_or_default();
        format_message(reading, &loads)
    }

    pub fn send_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.token)
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl DataSink for TelegramSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, reading: &Reading) -> Result<(), ContractError> {
        let text = self.message(reading);
        let body = SendMessage {
            chat_id: &self.chat_id,
            text: &text,
        };

        // the token is part of the URL, keep it out of error messages
        let response = self
            .client
            .post(self.send_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| ContractError::sink_connection(&self.name, e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ContractError::sink_write(&self.name, format!("HTTP {status}")));
        }

        self.sent += 1;
        info!(sink = %self.name, sent = self.sent, "status message sent");
        Ok(())
    }

    /// Only the most recent reading is reported
    async fn write_batch(&mut self, readings: &[Reading]) -> Result<(), ContractError> {
        match readings.last() {
            Some(latest) => self.write(latest).await,
            None => Ok(()),
        }
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        debug!(sink = %self.name, sent = self.sent, "TelegramSink closed");
        Ok(())
    }
}
