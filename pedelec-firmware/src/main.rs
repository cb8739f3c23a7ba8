//! Pedelec - E-Bike Main Board Firmware
//!
//! Main firmware binary for STM32F405-based pedelec controllers.
//! Reads the Bafang torque sensor over CAN, fuses it with the throttle
//! into a motor current target and drives a VESC over UART, with a
//! handlebar display on a second UART.

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_stm32::adc::{Adc, AdcChannel};
use embassy_stm32::bind_interrupts;
use embassy_stm32::can::{
    Can, Rx0InterruptHandler, Rx1InterruptHandler, SceInterruptHandler, TxInterruptHandler,
};
use embassy_stm32::gpio::{Input, Pull};
use embassy_stm32::peripherals::{CAN1, USART2, USART3};
use embassy_stm32::usart::{BufferedInterruptHandler, BufferedUart, Config as UartConfig};
use embassy_time::Timer;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

mod channels;
mod sensors;
mod tasks;

bind_interrupts!(struct Irqs {
    USART2 => BufferedInterruptHandler<USART2>;
    USART3 => BufferedInterruptHandler<USART3>;
    CAN1_RX0 => Rx0InterruptHandler<CAN1>;
    CAN1_RX1 => Rx1InterruptHandler<CAN1>;
    CAN1_SCE => SceInterruptHandler<CAN1>;
    CAN1_TX => TxInterruptHandler<CAN1>;
});

// Static cells for UART buffers (must live forever)
static VESC_TX_BUF: StaticCell<[u8; 128]> = StaticCell::new();
static VESC_RX_BUF: StaticCell<[u8; 128]> = StaticCell::new();
static DISPLAY_TX_BUF: StaticCell<[u8; 64]> = StaticCell::new();
static DISPLAY_RX_BUF: StaticCell<[u8; 64]> = StaticCell::new();

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Pedelec firmware starting...");

    let p = embassy_stm32::init(Default::default());
    info!("Peripherals initialized");

    // VESC on USART2 (TX=PA2, RX=PA3)
    let mut vesc_config = UartConfig::default();
    vesc_config.baudrate = 115_200;
    let vesc_uart = BufferedUart::new(
        p.USART2,
        Irqs,
        p.PA3,
        p.PA2,
        VESC_TX_BUF.init([0u8; 128]),
        VESC_RX_BUF.init([0u8; 128]),
        vesc_config,
    )
    .unwrap();

    // Handlebar display on USART3 (TX=PB10, RX=PB11)
    let mut display_config = UartConfig::default();
    display_config.baudrate = 115_200;
    let display_uart = BufferedUart::new(
        p.USART3,
        Irqs,
        p.PB11,
        p.PB10,
        DISPLAY_TX_BUF.init([0u8; 64]),
        DISPLAY_RX_BUF.init([0u8; 64]),
        display_config,
    )
    .unwrap();
    let (display_tx, display_rx) = display_uart.split();

    info!("UARTs initialized");

    // Torque sensor on CAN1 (RX=PB8, TX=PB9), 250 kbit/s
    let mut can = Can::new(p.CAN1, p.PB8, p.PB9, Irqs);
    can.modify_config().set_bitrate(250_000);
    can.enable().await;
    info!("CAN initialized");

    // Throttle hall sensor on PA0 (ADC1_IN0), motor NTC on PA1 (ADC1_IN1)
    let adc = Adc::new(p.ADC1);
    let analog = sensors::AnalogInputs::new(adc, p.PA0.degrade_adc(), p.PA1.degrade_adc());

    // Brake levers on PC0, wheel reed switch on PC1, both switch to ground
    let brake = sensors::BrakeLever::new(Input::new(p.PC0, Pull::Up));
    let wheel = sensors::WheelSensor::new(Input::new(p.PC1, Pull::Up));

    spawner.spawn(tasks::motor_control_task(analog, brake)).unwrap();
    spawner.spawn(tasks::vesc_task(vesc_uart)).unwrap();
    spawner.spawn(tasks::display_tx_task(display_tx)).unwrap();
    spawner.spawn(tasks::display_rx_task(display_rx)).unwrap();
    spawner.spawn(tasks::wheel_speed_task(wheel)).unwrap();
    spawner.spawn(tasks::torque_rx_task(can)).unwrap();
    #[cfg(feature = "debug-csv-log")]
    spawner.spawn(tasks::csv_log_task()).unwrap();

    info!("All tasks spawned, firmware running");

    // Main task has nothing else to do - all work happens in spawned tasks
    loop {
        Timer::after_secs(60).await;
        trace!("Main alive");
    }
}
