use std::fmt;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::configuration::main_configuration::MainConfiguration;
use crate::http_response::{HttpResponse, MAX_RESPONSE_LEN};
use crate::payload::Payload;
use crate::sensors::sensor::Reading;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOutcome {
    Success,
    ConnectFailed,
    NoSuccessMarkerFound,
}

impl ConnectionOutcome {
    pub fn is_success(&self) -> bool {
        *self == ConnectionOutcome::Success
    }
}

impl fmt::Display for ConnectionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionOutcome::Success => write!(f, "✅"),
            ConnectionOutcome::ConnectFailed => write!(f, "❌ Connection failed"),
            ConnectionOutcome::NoSuccessMarkerFound => write!(f, "❌"),
        }
    }
}

/// Delivers one reading somewhere. The outcome is informational only.
pub trait Report {
    fn report(&mut self, reading: &Reading) -> ConnectionOutcome;
}

/// Posts readings as JSON to the collector, one connection per reading.
pub struct HttpReporter {
    server_host: String,
    server_port: u16,
    path: String,
    device_id: String,
    connect_timeout: Duration,
    response_timeout: Duration,
}

impl HttpReporter {
    pub fn new(main_config: &MainConfiguration) -> Self {
        Self {
            server_host: main_config.server_host.clone(),
            server_port: main_config.server_port,
            path: main_config.sensor_path.clone(),
            device_id: main_config.device_id.clone(),
            connect_timeout: main_config.connect_timeout(),
            response_timeout: main_config.response_timeout(),
        }
    }

    pub fn send(&self, reading: &Reading) -> ConnectionOutcome {
        let mut stream = match self.connect() {
            Ok(stream) => stream,
            Err(e) => {
                warn!(
                    "Connect to {}:{} failed: {e}",
                    self.server_host, self.server_port
                );
                return ConnectionOutcome::ConnectFailed;
            }
        };

        let outcome = match self.exchange(&mut stream, reading) {
            Ok(true) => ConnectionOutcome::Success,
            Ok(false) => ConnectionOutcome::NoSuccessMarkerFound,
            Err(e) => {
                error!("Exchange with {} failed: {e:#}", self.server_host);
                ConnectionOutcome::NoSuccessMarkerFound
            }
        };

        let _ = stream.shutdown(Shutdown::Both);
        outcome
    }

    fn connect(&self) -> io::Result<TcpStream> {
        let mut last_error = io::Error::new(
            ErrorKind::AddrNotAvailable,
            format!("{} did not resolve", self.server_host),
        );

        for addr in (self.server_host.as_str(), self.server_port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = e,
            }
        }

        Err(last_error)
    }

    fn exchange(&self, stream: &mut TcpStream, reading: &Reading) -> anyhow::Result<bool> {
        let body = Payload::new(reading, &self.device_id).to_json()?;
        let request = build_post_request(&self.server_host, &self.path, &body);

        stream.set_write_timeout(Some(self.connect_timeout))?;

        stream.write_all(request.as_bytes())?;
        stream.flush()?;
        debug!("POST {} ({} bytes)", self.path, body.len());

        let raw = read_response(stream, self.response_timeout)?;
        let response = HttpResponse::new(&raw);

        match response.status() {
            Some(status) => debug!("Response: {status} ({} bytes)", raw.len()),
            None => debug!("Response without status line ({} bytes)", raw.len()),
        }

        Ok(response.is_success())
    }
}

impl Report for HttpReporter {
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

pub fn build_post_request(host: &str, path: &str, body: &str) -> String {
    format!(
        "POST {path} HTTP/1.1\r\n\
         Host: {host}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    )
}

/// Reads until the server closes, the response framing is satisfied or
/// `timeout` has passed since the request went out. Bytes received before the
/// deadline or a reset are kept.
fn read_response(stream: &mut TcpStream, timeout: Duration) -> io::Result<Vec<u8>> {
    let deadline = Instant::now() + timeout;
    let mut raw = Vec::with_capacity(512);
    let mut buf = [0u8; 256];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            debug!("Response deadline reached after {} bytes", raw.len());
            break;
        }
        stream.set_read_timeout(Some(remaining))?;

        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                raw.extend_from_slice(&buf[..n]);

                if raw.len() >= MAX_RESPONSE_LEN || HttpResponse::new(&raw).is_complete() {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                debug!("No more response data after {} bytes", raw.len());
                break;
            }
            Err(e) if !raw.is_empty() => {
                warn!("Response cut short: {e}");
                break;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(raw)
}
