use anyhow::bail;

use super::sensor::MoistureProbe;

/// Dry to soaked soil, as (analog, digital) pairs.
pub const TEST_BATCH: [(u16, bool); 5] = [
    (250, false),
    (350, false),
    (450, true),
    (650, true),
    (800, true),
];

/// Stand-in probe for host builds. Replays [`TEST_BATCH`], moving to the next
/// entry every time the probe is switched off.
pub struct SimulatedSensor {
    index: usize,
    powered: bool,
}

impl SimulatedSensor {
    pub fn new() -> Self {
        Self {
            index: 0,
            powered: true,
        }
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    fn current(&self) -> anyhow::Result<(u16, bool)> {
        if !self.powered {
            bail!("Probe read while de-energized");
        }

        Ok(TEST_BATCH[self.index])
    }
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl MoistureProbe for SimulatedSensor {
    fn power_on(&mut self) -> anyhow::Result<()> {
        self.powered = true;
        Ok(())
    }

    fn power_off(&mut self) -> anyhow::Result<()> {
        if self.powered {
            self.index = (self.index + 1) % TEST_BATCH.len();
        }
        self.powered = false;
        Ok(())
    }

    fn read_analog(&mut self, _samples: u8) -> anyhow::Result<u16> {
        Ok(self.current()?.0)
    }

    fn read_digital(&mut self) -> anyhow::Result<bool> {
        Ok(self.current()?.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::sensor::Reading;

    #[test]
    fn replays_batch_once_per_power_cycle() {
        let mut sensor = SimulatedSensor::new();

        for (analog, digital) in TEST_BATCH.iter().chain(TEST_BATCH.iter().take(1)) {
            assert_eq!(sensor.read(1).unwrap(), Reading::new(*analog, *digital));
            sensor.power_off().unwrap();
            sensor.power_on().unwrap();
        }
    }

    #[test]
    fn refuses_reads_while_unpowered() {
        let mut sensor = SimulatedSensor::new();
        sensor.power_off().unwrap();

        assert!(!sensor.is_powered());
        assert!(sensor.read(1).is_err());
    }
}
