use std::borrow::Borrow;

use anyhow::Context;
use esp_idf_svc::hal::{
    adc::{
        attenuation,
        oneshot::{config::AdcChannelConfig, AdcChannelDriver, AdcDriver},
        Adc,
    },
    gpio::{ADCPin, Input, InputPin, Output, OutputPin, PinDriver},
};

use super::sensor::MoistureProbe;

/// Resistive soil probe module: VCC on an output pin, A0 on an ADC channel and
/// D0 (comparator output) on a digital input.
pub struct MoistureSensor<
    'a,
    ADC: Adc + 'a,
    APin: ADCPin<Adc = ADC>,
    M: Borrow<AdcDriver<'a, ADC>>,
    PEN: OutputPin,
    PDIG: InputPin,
> {
    channel: AdcChannelDriver<'a, APin, M>,
    pin_enable: PinDriver<'a, PEN, Output>,
    pin_digital: PinDriver<'a, PDIG, Input>,
}

impl<
        'a,
        ADC: Adc + 'a,
        APin: ADCPin<Adc = ADC>,
        M: Borrow<AdcDriver<'a, ADC>>,
        PEN: OutputPin,
        PDIG: InputPin,
    > MoistureSensor<'a, ADC, APin, M, PEN, PDIG>
{
    pub fn new(
        adc_driver: M,
        pin_adc: APin,
        pin_enable: PEN,
        pin_digital: PDIG,
    ) -> anyhow::Result<Self> {
        let mut s = Self {
            channel: AdcChannelDriver::new(
                adc_driver,
                pin_adc,
                &AdcChannelConfig {
                    attenuation: attenuation::DB_11,
                    calibration: true,
                    ..Default::default()
                },
            )?,
            pin_enable: PinDriver::output(pin_enable)?,
            pin_digital: PinDriver::input(pin_digital)?,
        };

        // The first cycle samples straight away, so start energized.
        s.pin_enable.set_high()?;

        Ok(s)
    }
}

impl<
        'a,
        ADC: Adc + 'a,
        APin: ADCPin<Adc = ADC>,
        M: Borrow<AdcDriver<'a, ADC>>,
        PEN: OutputPin,
        PDIG: InputPin,
    > MoistureProbe for MoistureSensor<'a, ADC, APin, M, PEN, PDIG>
{
    fn power_on(&mut self) -> anyhow::Result<()> {
        self.pin_enable
            .set_high()
            .context("Failed to energize moisture probe")
    }

    fn power_off(&mut self) -> anyhow::Result<()> {
        self.pin_enable
            .set_low()
            .context("Failed to de-energize moisture probe")
    }

    fn read_analog(&mut self, samples: u8) -> anyhow::Result<u16> {
        let samples = samples.max(1);
        let mut total: u32 = 0;

        for _ in 0..samples {
            total += u32::from(self.channel.read_raw().context("ADC conversion failed")?);
        }

        Ok((total / u32::from(samples)) as u16)
    }

    fn read_digital(&mut self) -> anyhow::Result<bool> {
        Ok(self.pin_digital.is_high())
    }
}
