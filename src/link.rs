use crate::types::Result;
use failure::Fail;
use log::{debug, info, warn};
use std::fmt;
use tokio::fs::OpenOptions;
use tokio::io::{
    self, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf,
};
use tokio::net::TcpStream;
use url::Url;

const SLOT_OCCUPIED: &str = "SLOT_OCCUPIED:";

#[derive(Debug, Fail)]
pub enum LinkError {
    #[fail(display = "Controller link closed")]
    Closed,
    #[fail(display = "Controller link I/O failed: {}", _0)]
    Io(#[cause] io::Error),
    #[fail(display = "Unsupported link address {}", _0)]
    BadAddress(String),
}

/// Commands written to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    OpenBarricade,
    CloseBarricade,
    WrongSlotAlert { plate: String, slot: String },
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Command::OpenBarricade => write!(f, "OPEN_BARRICADE"),
            Command::CloseBarricade => write!(f, "CLOSE_BARRICADE"),
            Command::WrongSlotAlert { plate, slot } => {
                write!(f, "WRONG_SLOT_ALERT:{}:{}", plate, slot)
            }
        }
    }
}

/// Lines read from the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    StartCamera,
    SlotOccupied(String),
    Other(String),
}

impl Signal {
    pub fn parse(line: &str) -> Signal {
        let line = line.trim();
        if line == "START_CAMERA" {
            return Signal::StartCamera;
        }
        if let Some(pos) = line.find(SLOT_OCCUPIED) {
            let rest = &line[pos + SLOT_OCCUPIED.len()..];
            let slot = rest.split(':').next().unwrap_or("").trim();
            return Signal::SlotOccupied(slot.to_string());
        }
        Signal::Other(line.to_string())
    }
}

/// Line-oriented duplex channel to the microcontroller. All writes go through
/// `&mut self`, so commands never interleave.
pub struct Link<R, W> {
    reader: BufReader<R>,
    writer: W,
}

impl<R, W> Link<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Link<R, W> {
        Link {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Next non-empty line from the controller. Lines that are not valid
    /// UTF-8 (noise while the board resets) are logged and skipped.
    pub async fn recv(&mut self) -> Result<Signal> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut buf)
                .await
                .map_err(LinkError::Io)?;
            if read == 0 {
                return Err(LinkError::Closed.into());
            }
            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line.trim(),
                Err(_) => {
                    warn!(
                        "Skipping garbled controller line: {:?}",
                        String::from_utf8_lossy(&buf).trim()
                    );
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }
            debug!("Controller: {}", line);
            return Ok(Signal::parse(line));
        }
    }

    pub async fn send(&mut self, command: &Command) -> Result<()> {
        info!("Sending command: {}", command);
        let line = format!("{}\r\n", command);
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(LinkError::Io)?;
        self.writer.flush().await.map_err(LinkError::Io)?;
        Ok(())
    }

    #[cfg(test)]
    pub fn writer(&self) -> &W {
        &self.writer
    }
}

pub trait Duplex: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Duplex for T {}

pub type DeviceLink = Link<ReadHalf<Box<dyn Duplex>>, WriteHalf<Box<dyn Duplex>>>;

/// Connects to the controller. `address` is either a serial device path
/// (line settings configured outside the process) or `tcp://host:port` for a
/// serial-to-network bridge.
pub async fn connect(address: &str) -> Result<DeviceLink> {
    let stream: Box<dyn Duplex> = match Url::parse(address) {
        Ok(url) if url.scheme() == "tcp" => {
            let host = url
                .host_str()
                .ok_or_else(|| LinkError::BadAddress(address.to_string()))?;
            let port = url
                .port()
                .ok_or_else(|| LinkError::BadAddress(address.to_string()))?;
            info!("Connecting to controller bridge {}:{}", host, port);
            Box::new(
                TcpStream::connect((host, port))
                    .await
                    .map_err(LinkError::Io)?,
            )
        }
        Ok(url) if url.scheme() != "file" => {
            return Err(LinkError::BadAddress(address.to_string()).into())
        }
        _ => {
            info!("Opening controller device {}", address);
            let path = address.trim_start_matches("file://");
            Box::new(
                OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(path)
                    .await
                    .map_err(LinkError::Io)?,
            )
        }
    };
    let (reader, writer) = io::split(stream);
    Ok(Link::new(reader, writer))
}
