use std::time::{Duration, Instant};

use anyhow::anyhow;
use embedded_svc::{
    http::{client::Client as HttpClient, Method, Status},
    io::{Read, Write},
};
use esp_idf_svc::http::client::{Configuration as HttpClientConfiguration, EspHttpConnection};
use log::{debug, error, info, warn};

use crate::{
    configuration::main_configuration::MainConfiguration,
    http_response::{is_success_body, MAX_RESPONSE_LEN},
    payload::Payload,
    report::{ConnectionOutcome, Report},
    sensors::sensor::Reading,
};

/// Posts readings through the ESP-IDF HTTP client, one connection per reading.
pub struct EspHttpReporter {
    url: String,
    server_host: String,
    device_id: String,
    client_timeout: Duration,
    response_timeout: Duration,
}

impl EspHttpReporter {
    pub fn new(main_config: &MainConfiguration) -> Self {
        Self {
            url: format!(
                "http://{}:{}{}",
                main_config.server_host, main_config.server_port, main_config.sensor_path
            ),
            server_host: main_config.server_host.clone(),
            device_id: main_config.device_id.clone(),
            client_timeout: main_config.connect_timeout().max(main_config.response_timeout()),
            response_timeout: main_config.response_timeout(),
        }
    }

    pub fn send(&self, reading: &Reading) -> ConnectionOutcome {
        let body = match Payload::new(reading, &self.device_id).to_json() {
            Ok(body) => body,
            Err(e) => {
                error!("Payload encoding failed: {e:#}");
                return ConnectionOutcome::NoSuccessMarkerFound;
            }
        };
        let content_length = body.len().to_string();
        let headers = [
            ("Content-Type", "application/json"),
            ("Content-Length", content_length.as_str()),
            ("Connection", "close"),
        ];

        let connection = match EspHttpConnection::new(&HttpClientConfiguration {
            timeout: Some(self.client_timeout),
            ..Default::default()
        }) {
            Ok(connection) => connection,
            Err(e) => {
                warn!("HTTP client setup failed: {e:?}");
                return ConnectionOutcome::ConnectFailed;
            }
        };
        let mut client = HttpClient::wrap(connection);

        // The connection is opened here; nothing has been sent if it fails.
        let mut request = match client.request(Method::Post, &self.url, &headers) {
            Ok(request) => request,
            Err(e) => {
                warn!("Connect to {} failed: {e:?}", self.url);
                return ConnectionOutcome::ConnectFailed;
            }
        };

        let exchange = || -> anyhow::Result<bool> {
            request
                .write_all(body.as_bytes())
                .map_err(|e| anyhow!("{e:?}"))?;
            request.flush().map_err(|e| anyhow!("{e:?}"))?;
            debug!("POST {} ({} bytes)", self.url, body.len());

            let mut response = request.submit().map_err(|e| anyhow!("{e:?}"))?;
            debug!("Response: {}", response.status());

            let received = read_body(&mut response, self.response_timeout)?;
            Ok(is_success_body(&received))
        };

        match exchange() {
            Ok(true) => ConnectionOutcome::Success,
            Ok(false) => ConnectionOutcome::NoSuccessMarkerFound,
            Err(e) => {
                error!("Exchange with {} failed: {e:#}", self.server_host);
                ConnectionOutcome::NoSuccessMarkerFound
            }
        }
    }
}

impl Report for EspHttpReporter {
    fn report(&mut self, reading: &Reading) -> ConnectionOutcome {
        info!("📡 Sending...");

        let outcome = self.send(reading);
        if outcome.is_success() {
            info!("{outcome}");
        } else {
            error!("{outcome}");
        }

        outcome
    }
}

/// Body bytes until the server is done, the buffer is full or the deadline
/// passes. Each read is also bounded by the client timeout.
fn read_body(response: &mut impl Read, timeout: Duration) -> anyhow::Result<Vec<u8>> {
    let deadline = Instant::now() + timeout;
    let mut received = Vec::with_capacity(256);
    let mut buf = [0u8; 256];

    while received.len() < MAX_RESPONSE_LEN && Instant::now() < deadline {
        match response.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => received.extend_from_slice(&buf[..n]),
            Err(e) if !received.is_empty() => {
                warn!("Response cut short: {e:?}");
                break;
            }
            Err(e) => return Err(anyhow!("{e:?}")),
        }
    }

    Ok(received)
}
