//! Print card readouts from a station
//!
//! Usage: `cargo run --example readout -- /dev/ttyUSB0`

use anyhow::Context;
use sportident::{Event, Reader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let port = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SPORTIDENT_PORT").ok())
        .context("usage: readout <serial port>")?;

    let mut reader = Reader::new(port);
    reader.open().await.context("failed to open station")?;

    loop {
        match reader.next_event().await? {
            Event::Ready(mode) => {
                println!(
                    "Station ready ({} SI6 punches, {} baud)",
                    mode.punch_capacity, mode.baud_rate
                );
            }
            Event::Readout(readout) => {
                println!("{} {}", readout.card_series(), readout.card_number);
                if let Some(start) = readout.start_time() {
                    println!("  start   {}", start.format("%H:%M:%S"));
                }
                for (i, punch) in readout.punches.iter().enumerate() {
                    let time = sportident_types::time::to_datetime(punch.timestamp)
                        .map(|time| time.format("%H:%M:%S").to_string())
                        .unwrap_or_else(|| "--:--:--".into());
                    println!("  {:>3}. {:>4} {}", i + 1, punch.code, time);
                }
                if let Some(finish) = readout.finish_time() {
                    println!("  finish  {}", finish.format("%H:%M:%S"));
                }
            }
            Event::Warning(e) => eprintln!("warning: {}", e),
            Event::Error(e) if e.is_fatal() => return Err(e).context("station session failed"),
            Event::Error(e) => eprintln!("error: {}", e),
            Event::Closed => break,
        }
    }

    Ok(())
}
