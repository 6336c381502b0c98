pub mod configuration;
pub mod http_response;
pub mod payload;
pub mod report;
pub mod sense_loop;
pub mod sensors;

#[cfg(target_os = "espidf")]
pub mod board;
#[cfg(target_os = "espidf")]
pub mod esp_reporter;
#[cfg(target_os = "espidf")]
pub mod eth_helper;
