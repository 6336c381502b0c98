use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::{
    adc::{oneshot::AdcDriver, ADC1},
    delay::FreeRtos,
    gpio::{Gpio27, Gpio34, Gpio35},
    peripherals::Peripherals,
};

use crate::{
    configuration::main_configuration::MainConfiguration,
    eth_helper::{self, EthernetLink},
    sense_loop::Delay,
    sensors::moisture_sensor::MoistureSensor,
};

/// Probe wiring: VCC on GPIO27, A0 on GPIO34 (ADC1), D0 on GPIO35.
pub type BoardSensor<'a> =
    MoistureSensor<'a, ADC1, Gpio34, AdcDriver<'a, ADC1>, Gpio27, Gpio35>;

pub struct Board<'a> {
    pub sensor: BoardSensor<'a>,
    pub ethernet: EthernetLink<'a>,
}

impl<'a> Board<'a> {
    /// Powers the probe, then brings up Ethernet. The W5500 sits on SPI2:
    /// SCLK 18, MOSI 23, MISO 19, CS 5, INT 4, RST 14.
    pub fn new(
        main_config: &MainConfiguration,
        peripherals: Peripherals,
        sys_loop: EspSystemEventLoop,
    ) -> anyhow::Result<Self> {
        let pins = peripherals.pins;

        let sensor = MoistureSensor::new(
            AdcDriver::new(peripherals.adc1)?,
            pins.gpio34,
            pins.gpio27,
            pins.gpio35,
        )?;

        let ethernet = eth_helper::connect_ethernet(
            main_config,
            peripherals.spi2,
            pins.gpio18,
            pins.gpio23,
            pins.gpio19,
            pins.gpio5,
            pins.gpio4,
            pins.gpio14,
            sys_loop,
        )?;

        Ok(Self { sensor, ethernet })
    }
}

pub struct FreeRtosDelay;

impl Delay for FreeRtosDelay {
    fn delay_ms(&mut self, ms: u32) {
        FreeRtos::delay_ms(ms);
    }
}
