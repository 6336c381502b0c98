use esp_idf_svc::eth::{BlockingEth, EspEth, EthDriver, SpiEth, SpiEthChipset};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::gpio::{InputPin, OutputPin};
use esp_idf_svc::hal::peripheral::Peripheral;
use esp_idf_svc::hal::spi::{config::DriverConfig, Dma, SpiAnyPins, SpiDriver};
use esp_idf_svc::hal::units::FromValueType;
use log::{error, info};

use crate::configuration::main_configuration::{format_mac, MainConfiguration};

const BRING_UP_ATTEMPTS: u32 = 5;

pub type EthernetLink<'a> = BlockingEth<EspEth<'a, SpiEth<SpiDriver<'a>>>>;

/// Starts the W5500 and waits for a DHCP lease.
#[allow(clippy::too_many_arguments)]
pub fn connect_ethernet<'a, SPI: SpiAnyPins>(
    config: &MainConfiguration,
    spi: impl Peripheral<P = SPI> + 'a,
    sclk: impl Peripheral<P = impl OutputPin> + 'a,
    mosi: impl Peripheral<P = impl OutputPin> + 'a,
    miso: impl Peripheral<P = impl InputPin + OutputPin> + 'a,
    cs: impl Peripheral<P = impl OutputPin> + 'a,
    int: impl Peripheral<P = impl InputPin> + 'a,
    rst: impl Peripheral<P = impl OutputPin> + 'a,
    sys_loop: EspSystemEventLoop,
) -> anyhow::Result<EthernetLink<'a>> {
    let spi_driver = SpiDriver::new(
        spi,
        sclk,
        mosi,
        Some(miso),
        &DriverConfig::new().dma(Dma::Auto(4096)),
    )?;

    let eth = EspEth::wrap(EthDriver::new_spi(
        spi_driver,
        int,
        Some(cs),
        Some(rst),
        SpiEthChipset::W5500,
        20_u32.MHz().into(),
        Some(&config.mac),
        None,
        sys_loop.clone(),
    )?)?;

    let mut eth = BlockingEth::wrap(eth, sys_loop)?;

    info!("Ethernet MAC {}", format_mac(&config.mac));

    for i in 1..=BRING_UP_ATTEMPTS {
        info!("Ethernet bring-up attempt #{i}");

        if eth.is_started()? {
            let _ = eth.stop();
        }

        match eth.start() {
            Ok(_) => (),
            Err(e) => {
                error!("Failed: {e}");
                if i == BRING_UP_ATTEMPTS {
                    return Err(e.into());
                }
                continue;
            }
        }
        info!("Ethernet started");

        match eth.wait_netif_up() {
            Ok(_) => (),
            Err(e) => {
                error!("No DHCP lease: {e}");
                if i == BRING_UP_ATTEMPTS {
                    return Err(e.into());
                }
                continue;
            }
        }
        break;
    }

    let ip_info = eth.eth().netif().get_ip_info()?;
    info!("✅ IP: {}", ip_info.ip);

    Ok(eth)
}
