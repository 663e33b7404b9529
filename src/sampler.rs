//! Sampler - one observation per cycle
//!
//! A sensor device is tried once when the loop starts. If it can't be reached
//! the loop samples synthetic readings for the rest of the process lifetime.

use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::error::DeviceError;
use crate::types::{round_to, Observation};

/// Where observations come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Device,
    Synthetic,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Device => write!(f, "device"),
            SourceKind::Synthetic => write!(f, "synthetic"),
        }
    }
}

#[async_trait]
pub trait ObservationSource: Send {
    /// Produce the next observation. An error means "nothing this cycle".
    async fn read(&mut self) -> Result<Observation, DeviceError>;

    fn kind(&self) -> SourceKind;
}

/// Uniform random readings over realistic ranges
#[derive(Debug)]
pub struct SyntheticSource {
    rng: StdRng,
}

impl SyntheticSource {
    pub const PH_RANGE: (f64, f64) = (6.0, 9.0);
    pub const TDS_RANGE: (f64, f64) = (300.0, 1000.0);
    pub const TURBIDITY_RANGE: (f64, f64) = (0.5, 8.0);
    pub const TEMPERATURE_RANGE: (f64, f64) = (20.0, 35.0);

    pub fn new() -> Self {
        Self { rng: StdRng::from_os_rng() }
    }

    pub fn seeded(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    pub fn draw(&mut self) -> Observation {
        let mut uniform = |(lo, hi): (f64, f64)| round_to(self.rng.random_range(lo..=hi), 2);
        Observation::new(
            uniform(Self::PH_RANGE),
            uniform(Self::TDS_RANGE),
            uniform(Self::TURBIDITY_RANGE),
            uniform(Self::TEMPERATURE_RANGE),
        )
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObservationSource for SyntheticSource {
    async fn read(&mut self) -> Result<Observation, DeviceError> {
        Ok(self.draw())
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Synthetic
    }
}

/// Parse `pH,TDS,Turbidity,Temperature`
pub fn parse_line(line: &str) -> Result<Observation, DeviceError> {
    let trimmed = line.trim();
    let parts: Vec<&str> = trimmed.split(',').collect();
    if parts.len() != 4 {
        return Err(DeviceError::Malformed(trimmed.to_string()));
    }

    let mut values = [0.0; 4];
    for (slot, part) in values.iter_mut().zip(parts) {
        *slot = part
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| DeviceError::Malformed(trimmed.to_string()))?;
    }
    Ok(Observation::from_features(values))
}

/// Byte stream carrying newline-terminated sensor lines
pub type LineReader = Box<dyn AsyncBufRead + Unpin + Send>;

/// Reads one line per call from a sensor link
pub struct DeviceSource {
    reader: LineReader,
    read_timeout: Duration,
    /// Bytes of a line still arriving when the last read timed out.
    /// `read_until` appends into this buffer and survives cancellation.
    partial: Vec<u8>,
}

impl DeviceSource {
    pub fn new(reader: LineReader, read_timeout: Duration) -> Self {
        Self { reader, read_timeout, partial: Vec::new() }
    }
}

#[async_trait]
impl ObservationSource for DeviceSource {
    async fn read(&mut self) -> Result<Observation, DeviceError> {
        let read = tokio::time::timeout(
            self.read_timeout,
            self.reader.read_until(b'\n', &mut self.partial),
        )
        .await;
        let n = match read {
            Err(_) => return Err(DeviceError::Timeout),
            Ok(Err(e)) => {
                self.partial.clear();
                return Err(DeviceError::Io(e));
            }
            Ok(Ok(n)) => n,
        };

        let bytes = std::mem::take(&mut self.partial);
        if n == 0 && bytes.is_empty() {
            return Err(DeviceError::Closed);
        }
        let line = String::from_utf8(bytes)
            .map_err(|e| DeviceError::Malformed(String::from_utf8_lossy(e.as_bytes()).into_owned()))?;
        parse_line(&line)
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Device
    }
}

/// Opens the sensor link
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    async fn connect(&self) -> Result<LineReader, DeviceError>;

    fn describe(&self) -> String;
}

/// Serial device node (`/dev/ttyACM0`) or a `tcp://host:port` serial bridge
#[derive(Debug, Clone)]
pub struct SerialConnector {
    device: String,
}

impl SerialConnector {
    pub fn new(device: impl Into<String>) -> Self {
        Self { device: device.into() }
    }
}

#[async_trait]
impl DeviceConnector for SerialConnector {
    async fn connect(&self) -> Result<LineReader, DeviceError> {
        let failed = |e: std::io::Error| DeviceError::Connect {
            device: self.device.clone(),
            reason: e.to_string(),
        };

        if let Some(addr) = self.device.strip_prefix("tcp://") {
            let stream = tokio::net::TcpStream::connect(addr).await.map_err(failed)?;
            return Ok(Box::new(BufReader::new(stream)));
        }

        let file = tokio::fs::OpenOptions::new()
            .read(true)
            .open(&self.device)
            .await
            .map_err(failed)?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn describe(&self) -> String {
        self.device.clone()
    }
}

/// The source chosen for this process
pub struct Sampler {
    source: Box<dyn ObservationSource>,
}

impl Sampler {
    pub fn new(source: Box<dyn ObservationSource>) -> Self {
        Self { source }
    }

    /// Try the device once; on failure fall back to synthetic sampling for good
    pub async fn establish(
        connector: Option<&dyn DeviceConnector>,
        read_timeout: Duration,
        fallback: SyntheticSource,
    ) -> Self {
        let Some(connector) = connector else {
            info!("Device sampling disabled, using synthetic readings");
            return Self::new(Box::new(fallback));
        };

        match connector.connect().await {
            Ok(reader) => {
                info!("Connected to sensor device on {}", connector.describe());
                Self::new(Box::new(DeviceSource::new(reader, read_timeout)))
            }
            Err(e) => {
                warn!("Sensor connection failed: {}. Falling back to simulation mode.", e);
                Self::new(Box::new(fallback))
            }
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.source.kind()
    }

    pub async fn sample(&mut self) -> Result<Observation, DeviceError> {
        self.source.read().await
    }
}
