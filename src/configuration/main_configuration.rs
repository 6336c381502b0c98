use std::time::Duration;

use anyhow::{bail, Context};

pub const KEY_MAC: &str = "SENSOR_MAC";
pub const KEY_SERVER_HOST: &str = "SENSOR_SERVER_HOST";
pub const KEY_SERVER_PORT: &str = "SENSOR_SERVER_PORT";
pub const KEY_SENSOR_PATH: &str = "SENSOR_PATH";
pub const KEY_DEVICE_ID: &str = "SENSOR_DEVICE_ID";
pub const KEY_INTERVAL: &str = "SENSOR_INTERVAL_MS";

pub const DEFAULT_MAC: [u8; 6] = [0xDE, 0xAD, 0xBE, 0xEF, 0xFE, 0xED];
pub const DEFAULT_SERVER_HOST: &str = "192.168.1.100";
pub const DEFAULT_SERVER_PORT: u16 = 5000;
pub const DEFAULT_SENSOR_PATH: &str = "/sensor";
pub const DEFAULT_DEVICE_ID: &str = "arduino_eth";

pub const SETTLE_DELAY_MS: u32 = 500;
pub const POST_SEND_DELAY_MS: u32 = 250;
pub const CYCLE_INTERVAL_MS: u32 = 10_000;
pub const CONNECT_TIMEOUT_MS: u32 = 5_000;
pub const RESPONSE_TIMEOUT_MS: u32 = 1_000;
pub const ANALOG_SAMPLES: u8 = 1;

/// Values baked in at build time, e.g. `SENSOR_SERVER_HOST=10.0.0.2 cargo build`.
const BUILD_OVERRIDES: &[(&str, Option<&str>)] = &[
    (KEY_MAC, option_env!("SENSOR_MAC")),
    (KEY_SERVER_HOST, option_env!("SENSOR_SERVER_HOST")),
    (KEY_SERVER_PORT, option_env!("SENSOR_SERVER_PORT")),
    (KEY_SENSOR_PATH, option_env!("SENSOR_PATH")),
    (KEY_DEVICE_ID, option_env!("SENSOR_DEVICE_ID")),
    (KEY_INTERVAL, option_env!("SENSOR_INTERVAL_MS")),
];

/// Deployment parameters of the sensor node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainConfiguration {
    /// Hardware address handed to the Ethernet controller for DHCP
    pub mac: [u8; 6],
    pub server_host: String,
    pub server_port: u16,
    pub sensor_path: String,
    pub device_id: String,

    /// Time the probe stays powered after sampling
    pub settle_delay_ms: u32,
    /// Time between the report and powering the probe back on
    pub post_send_delay_ms: u32,
    pub cycle_interval_ms: u32,
    pub connect_timeout_ms: u32,
    /// Upper bound for each read while waiting on the server's answer
    pub response_timeout_ms: u32,
    /// ADC conversions averaged into one analog reading
    pub analog_samples: u8,
}

impl Default for MainConfiguration {
    fn default() -> Self {
        Self {
            mac: DEFAULT_MAC,
            server_host: DEFAULT_SERVER_HOST.to_string(),
            server_port: DEFAULT_SERVER_PORT,
            sensor_path: DEFAULT_SENSOR_PATH.to_string(),
            device_id: DEFAULT_DEVICE_ID.to_string(),
            settle_delay_ms: SETTLE_DELAY_MS,
            post_send_delay_ms: POST_SEND_DELAY_MS,
            cycle_interval_ms: CYCLE_INTERVAL_MS,
            connect_timeout_ms: CONNECT_TIMEOUT_MS,
            response_timeout_ms: RESPONSE_TIMEOUT_MS,
            analog_samples: ANALOG_SAMPLES,
        }
    }
}

impl MainConfiguration {
    pub fn new() -> anyhow::Result<Self> {
        Self::from_overrides(BUILD_OVERRIDES)
    }

    pub fn from_overrides(overrides: &[(&str, Option<&str>)]) -> anyhow::Result<Self> {
        let mut config = Self::default();

        for (key, value) in overrides {
            if let Some(value) = value {
                config.apply(key, value)?;
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            KEY_MAC => self.mac = parse_mac(value)?,
            KEY_SERVER_HOST => self.server_host = value.trim().to_string(),
            KEY_SERVER_PORT => {
                self.server_port = value
                    .trim()
                    .parse()
                    .with_context(|| format!("{KEY_SERVER_PORT}: invalid port '{value}'"))?
            }
            KEY_SENSOR_PATH => self.sensor_path = value.trim().to_string(),
            KEY_DEVICE_ID => self.device_id = value.to_string(),
            KEY_INTERVAL => {
                self.cycle_interval_ms = value
                    .trim()
                    .parse()
                    .with_context(|| format!("{KEY_INTERVAL}: invalid interval '{value}'"))?
            }
            _ => bail!("Unknown configuration key {key}"),
        }

        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server_host.is_empty() || self.server_host.contains(char::is_whitespace) {
            bail!("Server host '{}' is not a valid host name", self.server_host);
        }

        if self.server_port == 0 {
            bail!("Server port must not be 0");
        }

        if !self.sensor_path.starts_with('/') || self.sensor_path.contains(char::is_whitespace) {
            bail!("Sensor path '{}' must be an absolute path", self.sensor_path);
        }

        // The id is embedded verbatim in a JSON string.
        if self.device_id.is_empty()
            || self
                .device_id
                .chars()
                .any(|c| c == '"' || c == '\\' || c.is_control())
        {
            bail!("Device id '{}' is empty or not JSON safe", self.device_id);
        }

        if self.mac[0] & 0x01 != 0 {
            bail!("MAC {} is a multicast address", format_mac(&self.mac));
        }

        if self.analog_samples == 0 {
            bail!("At least one analog sample is needed per reading");
        }

        if self.connect_timeout_ms == 0 || self.response_timeout_ms == 0 {
            bail!("Network timeouts must not be 0");
        }

        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.into())
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms.into())
    }
}

pub fn parse_mac(value: &str) -> anyhow::Result<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut octets = value.trim().split([':', '-']);

    for byte in mac.iter_mut() {
        let octet = octets
            .next()
            .with_context(|| format!("MAC '{value}' has less than 6 octets"))?;

        if octet.len() != 2 || !octet.bytes().all(|b| b.is_ascii_hexdigit()) {
            bail!("MAC '{value}': bad octet '{octet}'");
        }

        *byte = u8::from_str_radix(octet, 16)
            .with_context(|| format!("MAC '{value}': bad octet '{octet}'"))?;
    }

    if octets.next().is_some() {
        bail!("MAC '{value}' has more than 6 octets");
    }

    Ok(mac)
}

pub fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}
