use crate::types::Result;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub link: String,
    pub link_warmup: Duration,
    pub reconnect_delay: Duration,
    pub http_timeout: Duration,
    pub database: PathBuf,
    pub camera_url: String,
    pub vehicle_detector_url: String,
    pub plate_detector_url: String,
    pub tesseract: String,
    pub car_dir: PathBuf,
    pub plate_dir: PathBuf,
    pub vehicle_label: String,
    pub confidence_threshold: f32,
    pub max_attempts: u32,
    pub session_timeout: Duration,
    pub settle_delay: Duration,
    pub monitor_timeout: Duration,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            link: "/dev/ttyUSB0".to_string(),
            link_warmup: Duration::from_secs(2),
            reconnect_delay: Duration::from_secs(10),
            http_timeout: Duration::from_secs(10),
            database: PathBuf::from("parking_system.db"),
            camera_url: "http://localhost:8080/snapshot.jpg".to_string(),
            vehicle_detector_url: "http://localhost:9000/detect/vehicle".to_string(),
            plate_detector_url: "http://localhost:9000/detect/plate".to_string(),
            tesseract: "tesseract".to_string(),
            car_dir: PathBuf::from("car_images"),
            plate_dir: PathBuf::from("plates"),
            vehicle_label: "car".to_string(),
            confidence_threshold: 0.3,
            max_attempts: 10,
            session_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(1),
            monitor_timeout: Duration::from_secs(300),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Config> {
        Config::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Config::default();
        let text = |key: &str, default: String| lookup(key).unwrap_or(default);
        let parsed = |key: &str| -> Result<Option<u64>> { parse(&lookup, key) };
        let millis = |key: &str, default: Duration| -> Result<Duration> {
            Ok(parsed(key)?.map_or(default, Duration::from_millis))
        };
        let secs = |key: &str, default: Duration| -> Result<Duration> {
            Ok(parsed(key)?.map_or(default, Duration::from_secs))
        };

        let confidence_threshold =
            parse::<f32, _>(&lookup, "GATE_CONFIDENCE")?.unwrap_or(d.confidence_threshold);
        if !(0.0f32..=1.0).contains(&confidence_threshold) {
            bail!("GATE_CONFIDENCE must be within [0, 1], got {}", confidence_threshold);
        }
        let max_attempts = parse::<u32, _>(&lookup, "GATE_MAX_ATTEMPTS")?.unwrap_or(d.max_attempts);
        if max_attempts == 0 {
            bail!("GATE_MAX_ATTEMPTS must be at least 1");
        }

        Ok(Config {
            link: text("GATE_LINK", d.link),
            link_warmup: millis("GATE_LINK_WARMUP_MS", d.link_warmup)?,
            reconnect_delay: secs("GATE_RECONNECT_SECS", d.reconnect_delay)?,
            http_timeout: millis("GATE_HTTP_TIMEOUT_MS", d.http_timeout)?,
            database: PathBuf::from(text("GATE_DB", d.database.display().to_string())),
            camera_url: text("GATE_CAMERA_URL", d.camera_url),
            vehicle_detector_url: text("GATE_VEHICLE_DETECTOR_URL", d.vehicle_detector_url),
            plate_detector_url: text("GATE_PLATE_DETECTOR_URL", d.plate_detector_url),
            tesseract: text("GATE_TESSERACT", d.tesseract),
            car_dir: PathBuf::from(text("GATE_CAR_DIR", d.car_dir.display().to_string())),
            plate_dir: PathBuf::from(text("GATE_PLATE_DIR", d.plate_dir.display().to_string())),
            vehicle_label: text("GATE_VEHICLE_LABEL", d.vehicle_label),
            confidence_threshold,
            max_attempts,
            session_timeout: secs("GATE_SESSION_TIMEOUT_SECS", d.session_timeout)?,
            settle_delay: millis("GATE_SETTLE_MS", d.settle_delay)?,
            monitor_timeout: secs("GATE_MONITOR_TIMEOUT_SECS", d.monitor_timeout)?,
        })
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| format_err!("Invalid value {:?} for {}: {}", raw, key, e)),
    }
}
