use std::time::Duration;

use log::{error, info};

use crate::configuration::main_configuration::MainConfiguration;
use crate::report::{ConnectionOutcome, Report};
use crate::sensors::sensor::MoistureProbe;

/// Blocking pause used between the steps of a cycle.
pub trait Delay {
    fn delay_ms(&mut self, ms: u32);
}

/// `std::thread::sleep` based delay for host builds.
pub struct ThreadDelay;

impl Delay for ThreadDelay {
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms.into()));
    }
}

#[derive(Debug, Clone, Copy)]
struct CycleTiming {
    settle_ms: u32,
    post_send_ms: u32,
    interval_ms: u32,
    analog_samples: u8,
}

/// Sense, report, sleep. Forever.
///
/// The probe is de-energized from the end of the settle delay until the end of
/// the post-send delay of each cycle.
pub struct SenseReportLoop<P: MoistureProbe, R: Report, D: Delay> {
    probe: P,
    reporter: R,
    delay: D,
    timing: CycleTiming,
}

impl<P: MoistureProbe, R: Report, D: Delay> SenseReportLoop<P, R, D> {
    pub fn new(probe: P, reporter: R, delay: D, main_config: &MainConfiguration) -> Self {
        Self {
            probe,
            reporter,
            delay,
            timing: CycleTiming {
                settle_ms: main_config.settle_delay_ms,
                post_send_ms: main_config.post_send_delay_ms,
                interval_ms: main_config.cycle_interval_ms,
                analog_samples: main_config.analog_samples,
            },
        }
    }

    /// Runs one cycle. `None` when the probe could not be read, in which case
    /// nothing was sent.
    pub fn run_cycle(&mut self) -> Option<ConnectionOutcome> {
        let reading = self.probe.read(self.timing.analog_samples);

        self.delay.delay_ms(self.timing.settle_ms);
        if let Err(e) = self.probe.power_off() {
            error!("{e:#}");
        }

        let outcome = match reading {
            Ok(reading) => {
                info!("Moisture (analog): {}", reading.analog);
                info!("Moisture (digital): {}", reading.digital_value());

                Some(self.reporter.report(&reading))
            }
            Err(e) => {
                error!("Sensor read failed: {e:#}");
                None
            }
        };

        self.delay.delay_ms(self.timing.post_send_ms);
        if let Err(e) = self.probe.power_on() {
            error!("{e:#}");
        }

        self.delay.delay_ms(self.timing.interval_ms);

        outcome
    }

    pub fn run(&mut self) -> ! {
        loop {
            self.run_cycle();
        }
    }

    #[cfg(test)]
    fn probe(&self) -> &P {
        &self.probe
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use anyhow::bail;

    use super::*;
    use crate::report::HttpReporter;
    use crate::sensors::sensor::Reading;
    use crate::sensors::simulated_sensor::SimulatedSensor;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        PowerOn,
        PowerOff,
        ReadAnalog(u8),
        ReadDigital,
        Delay(u32),
        Report(Reading),
    }

    type Journal = Rc<RefCell<Vec<Event>>>;

    struct RecordingProbe {
        journal: Journal,
        reading: Reading,
        fail_reads: bool,
    }

    impl MoistureProbe for RecordingProbe {
        fn power_on(&mut self) -> anyhow::Result<()> {
            self.journal.borrow_mut().push(Event::PowerOn);
            Ok(())
        }

        fn power_off(&mut self) -> anyhow::Result<()> {
            self.journal.borrow_mut().push(Event::PowerOff);
            Ok(())
        }

        fn read_analog(&mut self, samples: u8) -> anyhow::Result<u16> {
            self.journal.borrow_mut().push(Event::ReadAnalog(samples));
            if self.fail_reads {
                bail!("ADC timeout");
            }
            Ok(self.reading.analog)
        }

        fn read_digital(&mut self) -> anyhow::Result<bool> {
            self.journal.borrow_mut().push(Event::ReadDigital);
            Ok(self.reading.digital)
        }
    }

    struct RecordingReporter {
        journal: Journal,
        outcome: ConnectionOutcome,
    }

    impl Report for RecordingReporter {
        fn report(&mut self, reading: &Reading) -> ConnectionOutcome {
            self.journal.borrow_mut().push(Event::Report(*reading));
            self.outcome
        }
    }

    struct RecordingDelay {
        journal: Journal,
    }

    impl Delay for RecordingDelay {
        fn delay_ms(&mut self, ms: u32) {
            self.journal.borrow_mut().push(Event::Delay(ms));
        }
    }

    fn recording_loop(
        fail_reads: bool,
        outcome: ConnectionOutcome,
    ) -> (
        SenseReportLoop<RecordingProbe, RecordingReporter, RecordingDelay>,
        Journal,
    ) {
        let journal = Journal::default();
        let sense_loop = SenseReportLoop::new(
            RecordingProbe {
                journal: journal.clone(),
                reading: Reading::new(512, true),
                fail_reads,
            },
            RecordingReporter {
                journal: journal.clone(),
                outcome,
            },
            RecordingDelay {
                journal: journal.clone(),
            },
            &MainConfiguration::default(),
        );

        (sense_loop, journal)
    }

    #[test]
    fn cycle_follows_power_read_report_sleep_order() {
        let (mut sense_loop, journal) = recording_loop(false, ConnectionOutcome::Success);

        assert_eq!(sense_loop.run_cycle(), Some(ConnectionOutcome::Success));
        assert_eq!(
            *journal.borrow(),
            vec![
                Event::ReadAnalog(1),
                Event::ReadDigital,
                Event::Delay(500),
                Event::PowerOff,
                Event::Report(Reading::new(512, true)),
                Event::Delay(250),
                Event::PowerOn,
                Event::Delay(10_000),
            ]
        );
    }

    #[test]
    fn failed_report_does_not_stop_the_loop() {
        let (mut sense_loop, journal) = recording_loop(false, ConnectionOutcome::ConnectFailed);

        for _ in 0..3 {
            assert_eq!(sense_loop.run_cycle(), Some(ConnectionOutcome::ConnectFailed));
        }

        let journal = journal.borrow();
        let reports = journal
            .iter()
            .filter(|e| matches!(e, Event::Report(_)))
            .count();
        let full_sleeps = journal
            .iter()
            .filter(|e| **e == Event::Delay(10_000))
            .count();

        assert_eq!(reports, 3);
        assert_eq!(full_sleeps, 3);
    }

    #[test]
    fn excitation_strictly_alternates() {
        let (mut sense_loop, journal) = recording_loop(false, ConnectionOutcome::Success);

        for _ in 0..4 {
            sense_loop.run_cycle();
        }

        let pin_events: Vec<Event> = journal
            .borrow()
            .iter()
            .filter(|e| matches!(e, Event::PowerOn | Event::PowerOff))
            .cloned()
            .collect();

        assert_eq!(pin_events.len(), 8);
        for pair in pin_events.chunks(2) {
            assert_eq!(pair, [Event::PowerOff, Event::PowerOn]);
        }
    }

    #[test]
    fn probe_is_off_only_around_the_report() {
        let (mut sense_loop, journal) = recording_loop(false, ConnectionOutcome::Success);
        sense_loop.run_cycle();

        let journal = journal.borrow();
        let off = journal.iter().position(|e| *e == Event::PowerOff).unwrap();
        let on = journal.iter().position(|e| *e == Event::PowerOn).unwrap();
        let read = journal.iter().position(|e| *e == Event::ReadAnalog(1)).unwrap();

        assert!(read < off);
        assert_eq!(journal[off - 1], Event::Delay(500));
        assert_eq!(journal[on - 1], Event::Delay(250));
        assert!(matches!(journal[off + 1], Event::Report(_)));
    }

    #[test]
    fn read_failure_skips_report_but_keeps_power_cycle() {
        let (mut sense_loop, journal) = recording_loop(true, ConnectionOutcome::Success);

        assert_eq!(sense_loop.run_cycle(), None);
        assert_eq!(
            *journal.borrow(),
            vec![
                Event::ReadAnalog(1),
                Event::Delay(500),
                Event::PowerOff,
                Event::Delay(250),
                Event::PowerOn,
                Event::Delay(10_000),
            ]
        );
    }

    #[test]
    fn simulated_probe_is_powered_between_cycles() {
        let journal = Journal::default();
        let mut sense_loop = SenseReportLoop::new(
            SimulatedSensor::new(),
            RecordingReporter {
                journal: journal.clone(),
                outcome: ConnectionOutcome::Success,
            },
            RecordingDelay {
                journal: journal.clone(),
            },
            &MainConfiguration::default(),
        );

        for _ in 0..2 {
            assert_eq!(sense_loop.run_cycle(), Some(ConnectionOutcome::Success));
            assert!(sense_loop.probe().is_powered());
        }

        let reports: Vec<Event> = journal
            .borrow()
            .iter()
            .filter(|e| matches!(e, Event::Report(_)))
            .cloned()
            .collect();
        assert_eq!(
            reports,
            vec![
                Event::Report(Reading::new(250, false)),
                Event::Report(Reading::new(350, false)),
            ]
        );
    }

    #[test]
    fn end_to_end_against_collector() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let expected_body =
                r#"{"umidade_analogica":512,"umidade_digital":1,"device_id":"arduino_eth"}"#;
            let mut received = Vec::new();
            let mut buf = [0u8; 512];

            while !received.ends_with(expected_body.as_bytes()) {
                let n = stream.read(&mut buf).unwrap();
                assert_ne!(n, 0, "request ended early");
                received.extend_from_slice(&buf[..n]);
            }

            stream
                .write_all(b"HTTP/1.1 200 OK\r\n\r\n{\"success\":true}")
                .unwrap();
        });

        let journal = Journal::default();
        let main_config = MainConfiguration {
            server_host: "127.0.0.1".to_string(),
            server_port: port,
            ..Default::default()
        };
        let mut sense_loop = SenseReportLoop::new(
            RecordingProbe {
                journal: journal.clone(),
                reading: Reading::new(512, true),
                fail_reads: false,
            },
            HttpReporter::new(&main_config),
            RecordingDelay {
                journal: journal.clone(),
            },
            &main_config,
        );

        assert_eq!(sense_loop.run_cycle(), Some(ConnectionOutcome::Success));
        server.join().unwrap();
    }

    #[test]
    fn refused_connection_is_logged_and_loop_continues() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let journal = Journal::default();
        let main_config = MainConfiguration {
            server_host: "127.0.0.1".to_string(),
            server_port: port,
            ..Default::default()
        };
        let mut sense_loop = SenseReportLoop::new(
            RecordingProbe {
                journal: journal.clone(),
                reading: Reading::new(512, true),
                fail_reads: false,
            },
            HttpReporter::new(&main_config),
            RecordingDelay {
                journal: journal.clone(),
            },
            &main_config,
        );

        assert_eq!(sense_loop.run_cycle(), Some(ConnectionOutcome::ConnectFailed));
        assert_eq!(journal.borrow().last(), Some(&Event::Delay(10_000)));
    }
}
