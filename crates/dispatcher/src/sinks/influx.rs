//! InfluxSink - InfluxDB v2 HTTP write API
//!
//! Readings are encoded as line protocol, one `electricity` point per reading
//! plus a `gas` point when the meter relays a gas register.

use std::time::Duration;

use contracts::{ContractError, DataSink, InfluxConfig, Reading};
use tracing::{debug, info, instrument};

/// Escape measurement names, tag keys/values and field keys.
fn escape_ident(s: &str, out: &mut String) {
    for ch in s.chars() {
        if matches!(ch, ',' | ' ' | '=') {
            out.push('\\');
        }
        out.push(ch);
    }
}

fn push_field(out: &mut String, first: &mut bool, key: &str, value: f64) {
    if !value.is_finite() {
        return;
    }
    if !std::mem::take(first) {
        out.push(',');
    }
    escape_ident(key, out);
    out.push('=');
    out.push_str(&value.to_string());
}

/// Append the line protocol points of one reading (second precision)
pub fn encode_reading(reading: &Reading, out: &mut String) {
    out.push_str("electricity");
    if let Some(tariff) = reading.tariff {
        out.push_str(",tariff=");
        escape_ident(tariff.as_str(), out);
    }
    out.push(' ');

    let c = &reading.counters;
    let mut first = true;
    push_field(out, &mut first, "power_w", reading.power_w);
    push_field(out, &mut first, "consumption_w", reading.consumption_w());
    push_field(out, &mut first, "injection_w", reading.injection_w());
    push_field(out, &mut first, "consumption_day_kwh", c.consumption_day_kwh);
    push_field(out, &mut first, "consumption_night_kwh", c.consumption_night_kwh);
    push_field(out, &mut first, "injection_day_kwh", c.injection_day_kwh);
    push_field(out, &mut first, "injection_night_kwh", c.injection_night_kwh);
    for (index, phase) in reading.phases.iter().enumerate().take(3) {
        let l = index + 1;
        push_field(out, &mut first, &format!("l{l}_consumption_w"), phase.consumption_w);
        push_field(out, &mut first, &format!("l{l}_injection_w"), phase.injection_w);
        if let Some(v) = phase.voltage_v {
            push_field(out, &mut first, &format!("l{l}_voltage_v"), v);
        }
        if let Some(a) = phase.current_a {
            push_field(out, &mut first, &format!("l{l}_current_a"), a);
        }
    }
    out.push(' ');
    out.push_str(&reading.timestamp.timestamp().to_string());
    out.push('\n');

    if let Some(gas) = &reading.gas {
        out.push_str("gas ");
        let mut first = true;
        push_field(out, &mut first, "total_m3", gas.total_m3);
        out.push(' ');
        out.push_str(&gas.timestamp.timestamp().to_string());
        out.push('\n');
    }
}

/// Sink that uploads readings to InfluxDB
pub struct InfluxSink {
    name: String,
    client: reqwest::Client,
    write_url: String,
    org: String,
    bucket: String,
    token: String,
}

impl InfluxSink {
    /// Create a new InfluxSink; TLS options are applied to the HTTP client
    pub fn new(name: impl Into<String>, config: &InfluxConfig) -> Result<Self, ContractError> {
        let name = name.into();
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout.max(1)))
            .danger_accept_invalid_certs(!config.verify_ssl);

        if let Some(ca_path) = &config.ssl_ca_cert {
            let pem = std::fs::read(ca_path).map_err(|e| {
                ContractError::sink_connection(&name, format!("read {}: {e}", ca_path.display()))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| ContractError::sink_connection(&name, e.to_string()))?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| ContractError::sink_connection(&name, e.to_string()))?;

        debug!(sink = %name, url = %config.url, bucket = %config.bucket, "InfluxSink created");

        Ok(Self {
            write_url: format!("{}/api/v2/write", config.url.trim_end_matches('/')),
            name,
            client,
            org: config.org.clone(),
            bucket: config.bucket.clone(),
            token: config.token.clone(),
        })
    }

    pub fn write_url(&self) -> &str {
        &self.write_url
    }

    async fn upload(&self, body: String, points: usize) -> Result<(), ContractError> {
        let response = self
            .client
            .post(&self.write_url)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "s"),
            ])
            .header(reqwest::header::AUTHORIZATION, format!("Token {}", self.token))
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| ContractError::sink_connection(&self.name, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ContractError::sink_write(
                &self.name,
                format!("HTTP {status}: {}", detail.trim()),
            ));
        }

        info!(sink = %self.name, points, "written to InfluxDB");
        Ok(())
    }
}

impl DataSink for InfluxSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, reading: &Reading) -> Result<(), ContractError> {
        self.write_batch(std::slice::from_ref(reading)).await
    }

    #[instrument(name = "influx_sink_write_batch", skip(self, readings), fields(sink = %self.name, count = readings.len()))]
    async fn write_batch(&mut self, readings: &[Reading]) -> Result<(), ContractError> {
        if readings.is_empty() {
            return Ok(());
        }
        let mut body = String::with_capacity(readings.len() * 256);
        for reading in readings {
            encode_reading(reading, &mut body);
        }
        self.upload(body, readings.len()).await
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        debug!(sink = %self.name, "InfluxSink closed");
        Ok(())
    }
}
