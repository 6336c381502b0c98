use serde::Serialize;

use crate::sensors::sensor::Reading;

/// JSON document posted to the server. Field order is the serialization order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payload<'a> {
    pub umidade_analogica: u16,
    pub umidade_digital: u8,
    pub device_id: &'a str,
}

impl<'a> Payload<'a> {
    pub fn new(reading: &Reading, device_id: &'a str) -> Self {
        Self {
            umidade_analogica: reading.analog,
            umidade_digital: reading.digital_value(),
            device_id,
        }
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_json_in_field_order() {
        let json = Payload::new(&Reading::new(512, true), "arduino_eth")
            .to_json()
            .unwrap();

        assert_eq!(
            json,
            r#"{"umidade_analogica":512,"umidade_digital":1,"device_id":"arduino_eth"}"#
        );
    }

    #[test]
    fn range_limits() {
        let dry = Payload::new(&Reading::new(0, false), "arduino_eth")
            .to_json()
            .unwrap();
        let wet = Payload::new(&Reading::new(4095, true), "arduino_eth")
            .to_json()
            .unwrap();

        assert_eq!(
            dry,
            r#"{"umidade_analogica":0,"umidade_digital":0,"device_id":"arduino_eth"}"#
        );
        assert_eq!(
            wet,
            r#"{"umidade_analogica":4095,"umidade_digital":1,"device_id":"arduino_eth"}"#
        );
    }
}
