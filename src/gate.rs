use crate::camera::Camera;
use crate::config::Config;
use crate::db::{self, RegistrationStore};
use crate::detector::Detector;
use crate::link::{Command, Link, LinkError, Signal};
use crate::monitor;
use crate::ocr::Ocr;
use crate::plate;
use crate::sequencer::{Candidate, Decision, GateSequencer};
use crate::types::{RegistrationRecord, Result};
use crate::vision::{self, CropArchive};
use image::DynamicImage;
use log::{debug, error, info, warn};
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::delay_for;

/// The external capabilities one session needs.
pub struct Pipeline {
    pub camera: Box<dyn Camera>,
    pub vehicle_detector: Box<dyn Detector>,
    pub plate_detector: Box<dyn Detector>,
    pub ocr: Box<dyn Ocr>,
    pub archive: Option<CropArchive>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Admitted {
        plate: String,
        record: RegistrationRecord,
    },
    Rejected,
    /// The camera stopped delivering frames, or a quit was requested, before
    /// a decision.
    Ended,
}

pub struct Gate<R, W, S> {
    config: Config,
    link: Link<R, W>,
    store: S,
    pipeline: Pipeline,
    quit: mpsc::UnboundedReceiver<()>,
}

impl<R, W, S> Gate<R, W, S>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    S: RegistrationStore,
{
    /// Each message on `quit` ends the session in progress.
    pub fn new(
        config: Config,
        link: Link<R, W>,
        store: S,
        pipeline: Pipeline,
        quit: mpsc::UnboundedReceiver<()>,
    ) -> Gate<R, W, S> {
        Gate {
            config,
            link,
            store,
            pipeline,
            quit,
        }
    }

    /// Swaps in a freshly opened link after the previous one failed.
    pub fn replace_link(&mut self, link: Link<R, W>) {
        self.link = link;
    }

    /// Waits for start signals and runs one session per signal. Returns only
    /// when the link fails.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            match self.link.recv().await? {
                Signal::StartCamera => {
                    info!("Motion detected! Starting camera...");
                    self.run_once().await?;
                }
                Signal::SlotOccupied(slot) => {
                    debug!("Slot {} reported occupied outside monitoring", slot)
                }
                Signal::Other(line) => info!("Controller: {}", line),
            }
        }
    }

    /// One session plus slot monitoring on admission. Camera and store
    /// failures end the session with a log line; link failures are returned.
    async fn run_once(&mut self) -> Result<()> {
        let outcome = match self.run_session().await {
            Ok(outcome) => outcome,
            Err(e) if e.downcast_ref::<LinkError>().is_some() => return Err(e),
            Err(e) => {
                error!("Session aborted: {}", e);
                return Ok(());
            }
        };
        if let SessionOutcome::Admitted { plate, record } = outcome {
            let result = monitor::watch(
                &mut self.link,
                &plate,
                &record.slot,
                self.config.monitor_timeout,
            )
            .await?;
            info!("Monitoring of {} finished: {:?}", plate, result);
        }
        Ok(())
    }

    pub async fn run_session(&mut self) -> Result<SessionOutcome> {
        let mut sequencer =
            GateSequencer::new(self.config.max_attempts, self.config.session_timeout);
        // Quits pressed while idle belong to no session.
        while self.quit.try_recv().is_ok() {}
        sequencer.start(Instant::now());
        let mut frames = self.pipeline.camera.open().await?;
        loop {
            let frame = tokio::select! {
                frame = frames.next_frame() => frame?,
                Some(()) = self.quit.recv() => {
                    info!("Quit requested, ending session");
                    sequencer.stop();
                    return Ok(SessionOutcome::Ended);
                }
            };
            let frame = match frame {
                Some(frame) => frame,
                None => break,
            };
            if let Some(outcome) = self.process_frame(&mut sequencer, &frame).await? {
                info!(
                    "Session ended in {:?} after {} unregistered attempts",
                    sequencer.phase(),
                    sequencer.attempts()
                );
                return Ok(outcome);
            }
        }
        info!("Camera stopped before a decision");
        sequencer.stop();
        Ok(SessionOutcome::Ended)
    }

    /// Runs every vehicle and plate region of `frame` through the sequencer
    /// in detector order. Stops at the first terminal decision.
    async fn process_frame(
        &mut self,
        sequencer: &mut GateSequencer,
        frame: &DynamicImage,
    ) -> Result<Option<SessionOutcome>> {
        let vehicles = match self.pipeline.vehicle_detector.detect(frame).await {
            Ok(v) => v,
            Err(e) => {
                warn!("Vehicle detection failed, skipping frame: {}", e);
                return Ok(None);
            }
        };
        for vehicle in vehicles {
            if vehicle.label != self.config.vehicle_label
                || vehicle.confidence <= self.config.confidence_threshold
            {
                continue;
            }
            let car = match vision::crop(frame, &vehicle.bbox) {
                Some(car) => car,
                None => continue,
            };
            if let Some(archive) = &self.pipeline.archive {
                archive.save_car(&car);
            }
            let plates = match self.pipeline.plate_detector.detect(&car).await {
                Ok(p) => p,
                Err(e) => {
                    warn!("Plate detection failed, skipping vehicle: {}", e);
                    continue;
                }
            };
            for region in plates {
                let plate_crop = match vision::crop(&car, &region.bbox) {
                    Some(p) => p,
                    None => continue,
                };
                if let Some(archive) = &self.pipeline.archive {
                    archive.save_plate(&plate_crop);
                }
                let candidate = match self.read_plate(&plate_crop).await? {
                    Some(candidate) => candidate,
                    None => continue,
                };
                match sequencer.observe(candidate, Instant::now()) {
                    Decision::Continue => {}
                    Decision::Admit { plate, record } => {
                        self.link.send(&Command::OpenBarricade).await?;
                        info!("Waiting for parking confirmation...");
                        delay_for(self.config.settle_delay).await;
                        return Ok(Some(SessionOutcome::Admitted { plate, record }));
                    }
                    Decision::Reject => {
                        self.link.send(&Command::CloseBarricade).await?;
                        delay_for(self.config.settle_delay).await;
                        return Ok(Some(SessionOutcome::Rejected));
                    }
                }
            }
        }
        Ok(None)
    }

    /// OCR, normalization, validation and lookup for one plate crop.
    /// `Ok(None)` when OCR fails; store errors end the session.
    async fn read_plate(&self, plate_crop: &DynamicImage) -> Result<Option<Candidate>> {
        let binary = vision::preprocess_plate(plate_crop);
        let text = match self.pipeline.ocr.recognize(&binary).await {
            Ok(text) => text,
            Err(e) => {
                warn!("OCR failed, skipping plate: {}", e);
                return Ok(None);
            }
        };
        let plate = plate::normalize(&text);
        if !plate::is_valid(&plate) {
            return Ok(Some(Candidate::InvalidFormat(plate)));
        }
        info!("Recognized license plate: {}", plate);
        let candidate = match db::lookup(&self.store, &plate)? {
            Some(record) => Candidate::Registered(plate, record),
            None => Candidate::Unregistered(plate),
        };
        Ok(Some(candidate))
    }
}
