//! Background simulation worker thread.
//!
//! Owns a [`Simulation`] on its own thread so a renderer can keep drawing
//! while ticks run. Requests are handled in the order they are sent.

use crossbeam_channel::{Receiver, Sender};
use rand::Rng;
use std::thread::{self, JoinHandle};

use crate::error::{Result, SimError};
use crate::simulation::{Simulation, StepStats};
use crate::snapshot::Snapshot;

/// Request sent to the worker.
#[derive(Debug, Clone, PartialEq)]
pub enum SimRequest {
    /// Run this many ticks, then report the last tick's stats.
    Step { ticks: usize },
    /// Perturb the system with the given intensity.
    InjectChaos { intensity: f64 },
    /// Report the current snapshot.
    Snapshot,
    /// Stop the worker loop.
    Shutdown,
}

/// Response sent back from the worker.
#[derive(Debug, Clone, PartialEq)]
pub enum SimResponse {
    /// Stats of the last tick run. `None` for a zero-tick request.
    Stepped(Option<StepStats>),
    ChaosInjected,
    Snapshot(Box<Snapshot>),
    Rejected(SimError),
}

/// Handle to communicate with the background worker.
pub struct SimWorker {
    tx: Sender<SimRequest>,
    rx: Receiver<SimResponse>,
    handle: Option<JoinHandle<()>>,
}

impl SimWorker {
    /// Move `sim` onto a new thread and start serving requests.
    pub fn spawn<R>(mut sim: Simulation<R>) -> Self
    where
        R: Rng + Send + 'static,
    {
        let (req_tx, req_rx) = crossbeam_channel::unbounded::<SimRequest>();
        let (resp_tx, resp_rx) = crossbeam_channel::unbounded::<SimResponse>();

        let handle = thread::spawn(move || {
            log::debug!("simulation worker started");
            while let Ok(req) = req_rx.recv() {
                let response = match req {
                    SimRequest::Step { ticks } => SimResponse::Stepped(sim.advance(ticks)),
                    SimRequest::InjectChaos { intensity } => match sim.inject_chaos(intensity) {
                        Ok(()) => SimResponse::ChaosInjected,
                        Err(e) => SimResponse::Rejected(e),
                    },
                    SimRequest::Snapshot => SimResponse::Snapshot(Box::new(sim.snapshot())),
                    SimRequest::Shutdown => break,
                };
                if resp_tx.send(response).is_err() {
                    break;
                }
            }
            drop(req_rx);
            log::debug!("simulation worker stopped at tick {}", sim.tick());
        });

        SimWorker {
            tx: req_tx,
            rx: resp_rx,
            handle: Some(handle),
        }
    }

    /// Send a request (non-blocking).
    pub fn send(&self, req: SimRequest) -> Result<()> {
        self.tx.send(req).map_err(|_| SimError::WorkerDisconnected)
    }

    /// Try to receive a response (non-blocking).
    pub fn try_recv(&self) -> Option<SimResponse> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next response.
    pub fn recv(&self) -> Result<SimResponse> {
        self.rx.recv().map_err(|_| SimError::WorkerDisconnected)
    }

    /// Send a request and wait for its response.
    pub fn request(&self, req: SimRequest) -> Result<SimResponse> {
        self.send(req)?;
        self.recv()
    }

    /// Stop the worker and wait for its thread to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.tx.send(SimRequest::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("simulation worker panicked");
            }
        }
    }
}

impl Drop for SimWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;

    fn worker() -> SimWorker {
        SimWorker::spawn(Simulation::new(SimConfig::small(16)).expect("valid config"))
    }

    #[test]
    fn steps_then_snapshots_in_order() {
        let w = worker();
        w.send(SimRequest::Step { ticks: 5 }).expect("worker alive");
        w.send(SimRequest::Snapshot).expect("worker alive");
        match w.recv().expect("response") {
            SimResponse::Stepped(Some(stats)) => assert_eq!(stats.tick, 5),
            other => panic!("expected step stats, got {:?}", other),
        }
        match w.recv().expect("response") {
            SimResponse::Snapshot(snap) => {
                assert_eq!(snap.tick, 5);
                assert_eq!(snap.particle_count, 16);
            }
            other => panic!("expected snapshot, got {:?}", other),
        }
        w.shutdown();
    }

    #[test]
    fn zero_ticks_reports_nothing() {
        let w = worker();
        assert_eq!(
            w.request(SimRequest::Step { ticks: 0 }).expect("response"),
            SimResponse::Stepped(None)
        );
    }

    #[test]
    fn bad_chaos_is_rejected_without_killing_worker() {
        let w = worker();
        let resp = w
            .request(SimRequest::InjectChaos { intensity: f64::NAN })
            .expect("response");
        assert!(matches!(resp, SimResponse::Rejected(SimError::NonFinite { .. })));
        assert_eq!(
            w.request(SimRequest::InjectChaos { intensity: 0.5 }).expect("response"),
            SimResponse::ChaosInjected
        );
    }

    #[test]
    fn requests_after_shutdown_fail() {
        let w = worker();
        w.send(SimRequest::Shutdown).expect("worker alive");
        assert_eq!(w.recv(), Err(SimError::WorkerDisconnected));
        assert_eq!(
            w.send(SimRequest::Snapshot),
            Err(SimError::WorkerDisconnected)
        );
    }
}
