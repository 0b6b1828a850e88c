use crate::link::{Command, Link, Signal};
use crate::types::Result;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    Confirmed,
    WrongSlot { reported: String },
    TimedOut,
}

/// Watches for the admitted vehicle to park in its assigned slot.
#[derive(Debug)]
pub struct SlotMonitor {
    plate: String,
    expected_slot: String,
}

impl SlotMonitor {
    pub fn new(plate: &str, expected_slot: &str) -> SlotMonitor {
        SlotMonitor {
            plate: plate.to_string(),
            expected_slot: expected_slot.trim().to_string(),
        }
    }

    /// Returns an outcome once an occupancy report arrives; other signals are
    /// not for us.
    pub fn observe(&self, signal: &Signal) -> Option<MonitorOutcome> {
        match signal {
            Signal::SlotOccupied(slot) if *slot == self.expected_slot => {
                info!(
                    "Car {} is correctly parked in slot {}",
                    self.plate, self.expected_slot
                );
                Some(MonitorOutcome::Confirmed)
            }
            Signal::SlotOccupied(slot) => {
                warn!(
                    "ALERT! Car {} parked in wrong slot {} instead of {}",
                    self.plate, slot, self.expected_slot
                );
                Some(MonitorOutcome::WrongSlot {
                    reported: slot.clone(),
                })
            }
            Signal::StartCamera => {
                debug!("Ignoring start signal while monitoring {}", self.plate);
                None
            }
            Signal::Other(line) => {
                info!("Controller: {}", line);
                None
            }
        }
    }

    pub fn alert(&self, reported: &str) -> Command {
        Command::WrongSlotAlert {
            plate: self.plate.clone(),
            slot: reported.to_string(),
        }
    }
}

/// Reads the link until the slot is confirmed, a wrong slot is reported, or
/// `limit` passes. A wrong slot sends one alert.
pub async fn watch<R, W>(
    link: &mut Link<R, W>,
    plate: &str,
    expected_slot: &str,
    limit: Duration,
) -> Result<MonitorOutcome>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!("Monitoring slot {} for {}...", expected_slot, plate);
    let monitor = SlotMonitor::new(plate, expected_slot);
    let wait = async {
        loop {
            let signal = link.recv().await?;
            if let Some(outcome) = monitor.observe(&signal) {
                return Ok::<_, failure::Error>(outcome);
            }
        }
    };
    let outcome = match time::timeout(limit, wait).await {
        Ok(outcome) => outcome?,
        Err(_) => {
            warn!(
                "No occupancy report for {} within {:?}, giving up",
                plate, limit
            );
            MonitorOutcome::TimedOut
        }
    };
    if let MonitorOutcome::WrongSlot { reported } = &outcome {
        link.send(&monitor.alert(reported)).await?;
    }
    Ok(outcome)
}
