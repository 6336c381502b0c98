use std::fmt;

/// Raw values captured from the probe during one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    /// ADC counts of the analog output
    pub analog: u16,
    /// State of the comparator (threshold) output
    pub digital: bool,
}

impl Reading {
    pub fn new(analog: u16, digital: bool) -> Self {
        Self { analog, digital }
    }

    pub fn digital_value(&self) -> u8 {
        u8::from(self.digital)
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "analog={} digital={}", self.analog, self.digital_value())
    }
}

/// A soil moisture probe powered through an excitation pin, with one analog
/// and one digital output.
pub trait MoistureProbe {
    /// Drive the excitation pin high.
    fn power_on(&mut self) -> anyhow::Result<()>;

    /// Drive the excitation pin low.
    fn power_off(&mut self) -> anyhow::Result<()>;

    /// Mean of `samples` consecutive conversions.
    fn read_analog(&mut self, samples: u8) -> anyhow::Result<u16>;

    fn read_digital(&mut self) -> anyhow::Result<bool>;

    fn read(&mut self, samples: u8) -> anyhow::Result<Reading> {
        let analog = self.read_analog(samples)?;
        let digital = self.read_digital()?;

        Ok(Reading { analog, digital })
    }
}
