mod camera;
mod config;
mod db;
mod detector;
mod gate;
mod link;
mod monitor;
mod ocr;
mod plate;
mod sequencer;
mod types;
mod vision;

use crate::camera::SnapshotCamera;
use crate::config::Config;
use crate::detector::HttpDetector;
use crate::gate::{Gate, Pipeline};
use crate::link::DeviceLink;
use crate::ocr::TesseractOcr;
use crate::types::Result;
use crate::vision::CropArchive;
use env_logger::Env;
use log::{error, info};
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::delay_for;

#[macro_use]
extern crate failure;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    info!("Starting gate-keeper");

    tokio::select! {
        result = run() => {
            if let Err(e) = result {
                error!("Gate failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }
    info!("Exiting main");
}

async fn run() -> Result<()> {
    let config = Config::from_env()?;
    let store = db::open(&config.database)?;
    let archive = match CropArchive::create(&config.car_dir, &config.plate_dir) {
        Ok(archive) => Some(archive),
        Err(e) => {
            error!("Crops will not be archived: {}", e);
            None
        }
    };
    let client = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()?;
    let pipeline = Pipeline {
        camera: Box::new(SnapshotCamera::new(client.clone(), &config.camera_url)),
        vehicle_detector: Box::new(HttpDetector::new(
            client.clone(),
            &config.vehicle_detector_url,
        )),
        plate_detector: Box::new(HttpDetector::new(client, &config.plate_detector_url)),
        ocr: Box::new(TesseractOcr::new(&config.tesseract)),
        archive,
    };

    let (quit_tx, quit_rx) = mpsc::unbounded_channel();
    tokio::spawn(forward_quit_keys(quit_tx));

    let link = connect(&config).await;
    let mut gate = Gate::new(config.clone(), link, store, pipeline, quit_rx);
    loop {
        if let Err(e) = gate.run().await {
            error!("Controller link lost: {}", e);
        }
        info!("Waiting {:?} and reconnecting", config.reconnect_delay);
        delay_for(config.reconnect_delay).await;
        gate.replace_link(connect(&config).await);
    }
}

/// Opens the controller link, retrying until it comes up.
async fn connect(config: &Config) -> DeviceLink {
    loop {
        match link::connect(&config.link).await {
            Ok(link) => {
                // The controller resets when the port opens.
                delay_for(config.link_warmup).await;
                info!("Controller link {} ready, waiting for vehicles", config.link);
                return link;
            }
            Err(e) => error!("Unable to open controller link {}: {}", config.link, e),
        }
        info!("Waiting {:?} and reconnecting", config.reconnect_delay);
        delay_for(config.reconnect_delay).await;
    }
}

/// A `q` line on stdin ends the current session, the way an operator stops a
/// scan that is going nowhere.
async fn forward_quit_keys(quit: mpsc::UnboundedSender<()>) {
    let mut lines = BufReader::new(io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().eq_ignore_ascii_case("q") {
            info!("Quit requested from console");
            if quit.send(()).is_err() {
                break;
            }
        }
    }
}
