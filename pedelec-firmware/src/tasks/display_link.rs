//! Display UART tasks
//!
//! The TX side pushes a status frame to the handlebar display every
//! 100ms. The RX side decodes whatever the display sends back; today
//! that is only assist level changes.

use defmt::*;
use embassy_stm32::usart::{BufferedUartRx, BufferedUartTx};
use embassy_time::{Duration, Ticker};
use embedded_io_async::{Read, Write};

use pedelec_protocol::display::{DisplayFrameParser, DisplayMessage, Status, MAX_FRAME};

use crate::channels::with_state;

/// Status frame period
const STATUS_PERIOD: Duration = Duration::from_millis(100);

/// Display TX task - periodic status frames
#[embassy_executor::task]
pub async fn display_tx_task(mut tx: BufferedUartTx<'static>) {
    info!("Display TX task started");

    let mut ticker = Ticker::every(STATUS_PERIOD);
    let mut buf = [0u8; MAX_FRAME];

    loop {
        ticker.next().await;

        let status = with_state(|s| Status::from_state(s));
        let message = DisplayMessage::Status(status);
        match message.encode(&mut buf) {
            Ok(len) => {
                if tx.write_all(&buf[..len]).await.is_err() {
                    warn!("Display status write failed");
                }
            }
            Err(_) => warn!("Display status frame did not fit"),
        }
    }
}

/// Display RX task - applies rider commands from the display
#[embassy_executor::task]
pub async fn display_rx_task(mut rx: BufferedUartRx<'static>) {
    info!("Display RX task started");

    let mut parser = DisplayFrameParser::new();
    let mut chunk = [0u8; 16];

    loop {
        let n = match rx.read(&mut chunk).await {
            Ok(n) => n,
            Err(_) => {
                warn!("Display UART read failed");
                continue;
            }
        };

        for &byte in &chunk[..n] {
            match parser.feed(byte) {
                Ok(Some(DisplayMessage::SetAssistLevel(level))) => {
                    info!("Assist level set to {}", level);
                    with_state(|s| s.assist_level = level);
                }
                // The main board never receives status frames; drop them
                Ok(Some(DisplayMessage::Status(_))) => {}
                Ok(None) => {}
                Err(_) => trace!("Display frame rejected, resyncing"),
            }
        }
    }
}
