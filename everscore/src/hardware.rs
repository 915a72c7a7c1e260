use crate::{arbiter::StateArbiter, shutdown::ShutdownSignal};
use log::*;
use scoreboard_common::{
    config::{DEFAULT_SERIAL_PORT, Hardware},
    game_state::RawState,
    wire,
};
use std::{
    io::{self, BufRead, BufReader},
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};
use thiserror::Error;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits};

/// Upper bound on a single blocking read. Timeouts are retried, so this only
/// limits how long one syscall may sit idle.
const CONSOLE_READ_TIMEOUT: Duration = Duration::from_secs(60);

const PROLIFIC_VID: u16 = 0x067b;

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("Failed to open serial port {port}: {source}")]
    Open {
        port: String,
        source: tokio_serial::Error,
    },
    #[error("Failed to start the console reader thread: {0}")]
    Spawn(io::Error),
    #[error(transparent)]
    IoError(#[from] io::Error),
}

/// The seam for the console protocol decoder.
pub trait ConsoleDecoder: Send {
    /// Blocks until the console reports a change. `Ok(None)` means the feed
    /// has ended for good.
    fn next_event(&mut self) -> Result<Option<RawState>, HardwareError>;
}

/// Reads one JSON object per line, as written by a serial bridge that has
/// already decoded the console protocol, or by a capture file.
pub struct JsonLineDecoder<R> {
    reader: R,
    line: Vec<u8>,
}

impl<R: BufRead> JsonLineDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::new(),
        }
    }
}

impl<R: BufRead + Send> ConsoleDecoder for JsonLineDecoder<R> {
    fn next_event(&mut self) -> Result<Option<RawState>, HardwareError> {
        loop {
            match self.reader.read_until(b'\n', &mut self.line) {
                Ok(0) if self.line.is_empty() => return Ok(None),
                Ok(_) => {}
                // Keep whatever part of the line already arrived
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                    ) =>
                {
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            let line = std::mem::take(&mut self.line);
            let line = line.trim_ascii();
            if line.is_empty() {
                continue;
            }
            match wire::decode(line) {
                Ok(raw) => return Ok(Some(raw)),
                Err(e) => warn!(
                    "Skipping undecodable console line {:?}: {e}",
                    String::from_utf8_lossy(line)
                ),
            }
        }
    }
}

fn is_prolific(manufacturer: Option<&str>, product: Option<&str>) -> bool {
    let contains = |field: Option<&str>, needle: &str| {
        field.is_some_and(|f| f.to_lowercase().contains(needle))
    };
    contains(product, "pl2303") || contains(manufacturer, "prolific")
}

/// Finds the first serial port that looks like a Prolific PL2303 adapter,
/// which is what the scoreboard console cable uses.
pub fn find_console_port() -> Option<String> {
    let ports = match tokio_serial::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            warn!("Failed to list serial ports: {e}");
            return None;
        }
    };
    debug!("Available serial ports: {ports:?}");

    ports
        .into_iter()
        .find(|port| match port.port_type {
            SerialPortType::UsbPort(ref info) => {
                info.vid == PROLIFIC_VID
                    || is_prolific(info.manufacturer.as_deref(), info.product.as_deref())
            }
            _ => false,
        })
        .map(|port| port.port_name)
}

pub type SerialDecoder = JsonLineDecoder<BufReader<Box<dyn SerialPort>>>;

pub fn open_console(config: &Hardware) -> Result<SerialDecoder, HardwareError> {
    let port = config
        .port
        .clone()
        .or_else(find_console_port)
        .unwrap_or_else(|| DEFAULT_SERIAL_PORT.to_string());

    info!(
        "Opening scoreboard serial port {port} with baud rate {}",
        config.baud_rate
    );
    let serial = tokio_serial::new(port.as_str(), config.baud_rate)
        .flow_control(FlowControl::None)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .timeout(CONSOLE_READ_TIMEOUT)
        .open()
        .map_err(|source| HardwareError::Open { port, source })?;

    Ok(JsonLineDecoder::new(BufReader::new(serial)))
}

/// Pulls events from `decoder` and hands each one to `on_event`, in order,
/// until the feed ends, fails, or shutdown is seen between two events.
pub fn run_feed<D, F>(decoder: &mut D, shutdown: &ShutdownSignal, mut on_event: F)
where
    D: ConsoleDecoder + ?Sized,
    F: FnMut(RawState),
{
    loop {
        match decoder.next_event() {
            Ok(Some(raw)) => {
                if shutdown.is_requested() {
                    break;
                }
                debug!("Console update: {raw:?}");
                on_event(raw);
            }
            Ok(None) => {
                info!("Console feed ended");
                break;
            }
            Err(e) => {
                error!("Console feed failed, hardware input disabled: {e}");
                break;
            }
        }
    }
}

/// Starts the hardware reader thread feeding the arbiter
pub fn spawn_feed<D>(
    mut decoder: D,
    arbiter: Arc<StateArbiter>,
    shutdown: ShutdownSignal,
) -> Result<JoinHandle<()>, HardwareError>
where
    D: ConsoleDecoder + 'static,
{
    thread::Builder::new()
        .name("hardware-reader".to_string())
        .spawn(move || {
            run_feed(&mut decoder, &shutdown, |raw| {
                arbiter.on_hardware(&raw);
            })
        })
        .map_err(HardwareError::Spawn)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::{Cursor, Read};

    fn decoder(text: &str) -> JsonLineDecoder<Cursor<Vec<u8>>> {
        JsonLineDecoder::new(Cursor::new(text.as_bytes().to_vec()))
    }

    fn collect(decoder: &mut dyn ConsoleDecoder, shutdown: &ShutdownSignal) -> Vec<RawState> {
        let mut events = vec![];
        run_feed(decoder, shutdown, |raw| events.push(raw));
        events
    }

    #[test]
    fn test_json_lines_in_order() {
        let mut decoder = decoder(concat!(
            "{\"home_score\": 1}\n",
            "\n",
            "this is not json\n",
            "[1, 2]\n",
            "  {\"home_score\": 2}  \r\n",
            "{\"home_score\": 3}",
        ));
        let events = collect(&mut decoder, &ShutdownSignal::new());
        let scores: Vec<_> = events
            .iter()
            .map(|raw| raw.get("home_score").and_then(|v| v.as_u64()))
            .collect();
        assert_eq!(scores, vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn test_line_noise_is_skipped() {
        let mut decoder = JsonLineDecoder::new(Cursor::new(
            b"{\"shot\": 1}\n\xff\xfe\n{\"shot\": 2}\n".to_vec(),
        ));
        let events = collect(&mut decoder, &ShutdownSignal::new());
        let shots: Vec<_> = events
            .iter()
            .map(|raw| raw.get("shot").and_then(|v| v.as_u64()))
            .collect();
        assert_eq!(shots, vec![Some(1), Some(2)]);
    }

    #[test]
    fn test_empty_feed() {
        let mut decoder = decoder("");
        assert!(matches!(decoder.next_event(), Ok(None)));
    }

    #[test]
    fn test_feed_stops_after_shutdown() {
        let mut decoder = decoder("{\"shot\": 1}\n{\"shot\": 2}\n{\"shot\": 3}\n");
        let shutdown = ShutdownSignal::new();
        let mut events = 0;
        run_feed(&mut decoder, &shutdown, |_| {
            events += 1;
            shutdown.request();
        });
        assert_eq!(events, 1);
    }

    /// Reader that times out once in the middle of a line, like a quiet
    /// serial port
    struct StallingReader {
        chunks: Vec<io::Result<&'static [u8]>>,
    }

    impl Read for StallingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.chunks.is_empty() {
                return Ok(0);
            }
            let chunk = self.chunks.remove(0)?;
            buf[..chunk.len()].copy_from_slice(chunk);
            Ok(chunk.len())
        }
    }

    #[test]
    fn test_read_timeout_keeps_partial_line() {
        let reader = StallingReader {
            chunks: vec![
                Ok(&b"{\"home_sc"[..]),
                Err(io::ErrorKind::TimedOut.into()),
                Ok(&b"ore\": 42}\n"[..]),
            ],
        };
        let mut decoder = JsonLineDecoder::new(BufReader::new(reader));
        let raw = decoder.next_event().unwrap().unwrap();
        assert_eq!(raw.get("home_score").and_then(|v| v.as_u64()), Some(42));
        assert!(matches!(decoder.next_event(), Ok(None)));
    }

    #[test]
    fn test_read_error_ends_feed() {
        let reader = StallingReader {
            chunks: vec![
                Ok(&b"{\"shot\": 5}\n"[..]),
                Err(io::ErrorKind::BrokenPipe.into()),
                Ok(&b"{\"shot\": 6}\n"[..]),
            ],
        };
        let mut decoder = JsonLineDecoder::new(BufReader::new(reader));
        let events = collect(&mut decoder, &ShutdownSignal::new());
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_is_prolific() {
        assert!(is_prolific(None, Some("USB-Serial Controller PL2303HXD")));
        assert!(is_prolific(Some("Prolific Technology Inc."), None));
        assert!(!is_prolific(Some("FTDI"), Some("FT232R USB UART")));
        assert!(!is_prolific(None, None));
    }
}
