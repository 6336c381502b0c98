use log::{error, info};
use soil_moisture_reporter::{
    configuration::main_configuration::MainConfiguration, sense_loop::SenseReportLoop,
};

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::hal::{delay::FreeRtos, peripherals::Peripherals};
    use soil_moisture_reporter::board::{Board, FreeRtosDelay};
    use soil_moisture_reporter::esp_reporter::EspHttpReporter;

    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    let main_config = MainConfiguration::new()?;
    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;

    info!("Initializing Ethernet...");

    // Without an address every report would fail, so give up and let the
    // chip restart instead of looping.
    let board = match Board::new(&main_config, peripherals, sys_loop) {
        Ok(board) => board,
        Err(e) => {
            error!("❌ DHCP failed: {e:#}");
            return Err(e);
        }
    };
    let Board {
        sensor,
        ethernet: _ethernet,
    } = board;

    FreeRtos::delay_ms(2000);

    SenseReportLoop::new(
        sensor,
        EspHttpReporter::new(&main_config),
        FreeRtosDelay,
        &main_config,
    )
    .run()
}

#[cfg(not(target_os = "espidf"))]
fn main() -> anyhow::Result<()> {
    use soil_moisture_reporter::{
        report::HttpReporter, sense_loop::ThreadDelay,
        sensors::simulated_sensor::SimulatedSensor,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let main_config = match MainConfiguration::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {e:#}");
            return Err(e);
        }
    };

    info!(
        "Simulated probe reporting to {}:{}{} as {}",
        main_config.server_host,
        main_config.server_port,
        main_config.sensor_path,
        main_config.device_id
    );

    SenseReportLoop::new(
        SimulatedSensor::new(),
        HttpReporter::new(&main_config),
        ThreadDelay,
        &main_config,
    )
    .run()
}
