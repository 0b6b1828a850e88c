use crate::types::RegistrationRecord;
use log::{debug, info, warn};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Scanning,
    Admitted,
    RejectedTimeout,
}

/// What the recognition pipeline made of one plate region.
#[derive(Debug, Clone, PartialEq)]
pub enum Candidate {
    InvalidFormat(String),
    Unregistered(String),
    Registered(String, RegistrationRecord),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Continue,
    Admit {
        plate: String,
        record: RegistrationRecord,
    },
    Reject,
}

#[derive(Debug)]
struct Session {
    attempt_count: u32,
    started: Instant,
}

/// Decides, candidate by candidate, whether a scanning session admits the
/// vehicle, rejects it, or keeps looking. Holds no I/O; the caller carries out
/// the decisions.
#[derive(Debug)]
pub struct GateSequencer {
    max_attempts: u32,
    session_timeout: Duration,
    phase: Phase,
    session: Option<Session>,
}

impl GateSequencer {
    pub fn new(max_attempts: u32, session_timeout: Duration) -> GateSequencer {
        GateSequencer {
            max_attempts,
            session_timeout,
            phase: Phase::Idle,
            session: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn attempts(&self) -> u32 {
        self.session.as_ref().map_or(0, |s| s.attempt_count)
    }

    pub fn start(&mut self, now: Instant) {
        if self.phase == Phase::Scanning {
            warn!("Restarting a session that was still scanning");
        }
        self.phase = Phase::Scanning;
        self.session = Some(Session {
            attempt_count: 0,
            started: now,
        });
    }

    /// Drops the session without a decision, e.g. when frames run out.
    pub fn stop(&mut self) {
        self.phase = Phase::Idle;
        self.session = None;
    }

    pub fn observe(&mut self, candidate: Candidate, now: Instant) -> Decision {
        let session = match (self.phase, self.session.as_mut()) {
            (Phase::Scanning, Some(session)) => session,
            _ => {
                debug!("Ignoring {:?} in phase {:?}", candidate, self.phase);
                return Decision::Continue;
            }
        };
        match candidate {
            Candidate::InvalidFormat(plate) => {
                info!("Ignored: {} (invalid format)", plate);
                Decision::Continue
            }
            Candidate::Registered(plate, record) => {
                info!("Registered vehicle {} detected, admitting", plate);
                self.phase = Phase::Admitted;
                Decision::Admit { plate, record }
            }
            Candidate::Unregistered(plate) => {
                session.attempt_count += 1;
                info!(
                    "Attempt {}/{} for unregistered vehicle {}",
                    session.attempt_count, self.max_attempts, plate
                );
                let elapsed = now.saturating_duration_since(session.started);
                if session.attempt_count >= self.max_attempts || elapsed > self.session_timeout {
                    info!(
                        "Max attempts reached or timeout occurred after {:?}, rejecting",
                        elapsed
                    );
                    self.phase = Phase::RejectedTimeout;
                    Decision::Reject
                } else {
                    Decision::Continue
                }
            }
        }
    }
}
