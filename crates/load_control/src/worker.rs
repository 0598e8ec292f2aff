//! Async worker driving one load

use std::sync::Arc;

use contracts::{Clock, LoadActuator, LoadSnapshot, PowerState, Reading, SystemClock};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};

use crate::controller::LoadController;

/// Owns one controller and its actuator
///
/// Readings are evaluated strictly in order; the controller state is never
/// shared. A snapshot is published after every evaluation.
pub struct LoadWorker<A> {
    controller: LoadController,
    actuator: A,
    clock: Arc<dyn Clock>,
    snapshot_tx: watch::Sender<LoadSnapshot>,
    snapshot: LoadSnapshot,
}

impl<A: LoadActuator> LoadWorker<A> {
    pub fn new(controller: LoadController, actuator: A) -> Self {
        Self::with_clock(controller, actuator, Arc::new(SystemClock))
    }

    pub fn with_clock(controller: LoadController, actuator: A, clock: Arc<dyn Clock>) -> Self {
        let snapshot = LoadSnapshot::new(controller.name());
        let (snapshot_tx, _) = watch::channel(snapshot.clone());
        Self {
            controller,
            actuator,
            clock,
            snapshot_tx,
            snapshot,
        }
    }

    pub fn name(&self) -> &str {
        self.controller.name()
    }

    pub fn controller(&self) -> &LoadController {
        &self.controller
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    /// Receiver of the snapshots published by this worker
    pub fn subscribe(&self) -> watch::Receiver<LoadSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Evaluate one reading, switching the load when the controller asks for it
    pub async fn process(&mut self, reading: &Reading) {
        let pct = self.controller.surplus_pct(reading);
        let command = self.controller.evaluate(pct, self.clock.now());

        if let Some(target) = command {
            self.apply(target, pct).await;
        }

        metrics::gauge!("smartmeter_load_surplus_percent", "load" => self.controller.name().to_string())
            .set(pct);

        self.snapshot.state = self.controller.state().current;
        self.snapshot.pending = self.controller.state().pending.map(|p| p.target);
        self.snapshot.surplus_pct = Some(pct);
        self.snapshot_tx.send_replace(self.snapshot.clone());
    }

    async fn apply(&mut self, target: PowerState, pct: f64) {
        let name = self.controller.name().to_string();
        match self.actuator.switch(target).await {
            Ok(()) => {
                self.controller.commit(target);
                self.snapshot.commands += 1;
                info!(
                    load = %name,
                    state = %target,
                    surplus_pct = pct,
                    actuator = %self.actuator.target(),
                    "load switched"
                );
                metrics::counter!(
                    "smartmeter_load_commands_total",
                    "load" => name.clone(),
                    "state" => target.to_string(),
                    "status" => "ok"
                )
                .increment(1);
                metrics::gauge!("smartmeter_load_state", "load" => name)
                    .set(f64::from(target.as_bit()));
            }
            Err(e) => {
                self.snapshot.command_failures += 1;
                warn!(load = %name, state = %target, error = %e, "switch failed, retrying on next reading");
                metrics::counter!(
                    "smartmeter_load_commands_total",
                    "load" => name,
                    "state" => target.to_string(),
                    "status" => "error"
                )
                .increment(1);
            }
        }
    }

    /// Consume the reading stream until it closes
    ///
    /// No command is issued when the stream ends; the load keeps its state.
    #[instrument(name = "load_worker", skip(self, rx), fields(load = %self.controller.name()))]
    pub async fn run(mut self, mut rx: mpsc::Receiver<Arc<Reading>>) -> LoadSnapshot {
        debug!("load worker started");
        while let Some(reading) = rx.recv().await {
            self.process(&reading).await;
        }
        info!(
            state = %self.snapshot.state,
            commands = self.snapshot.commands,
            failures = self.snapshot.command_failures,
            "load worker stopped"
        );
        self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use contracts::{ContractError, LoadConfig, ManualClock};
    use std::sync::Mutex;

    /// Records commands; fails the first `fail_first` of them
    #[derive(Clone, Default)]
    struct RecordingActuator {
        commands: Arc<Mutex<Vec<PowerState>>>,
        fail_first: usize,
        attempts: usize,
    }

    impl LoadActuator for RecordingActuator {
        fn target(&self) -> String {
            "test".into()
        }

        async fn switch(&mut self, state: PowerState) -> Result<(), ContractError> {
            self.attempts += 1;
            if self.attempts <= self.fail_first {
                return Err(ContractError::actuator("aux", "relay busy"));
            }
            self.commands.lock().unwrap().push(state);
            Ok(())
        }
    }

    fn controller() -> LoadController {
        let config = LoadConfig {
            enabled: true,
            max_power: 2300,
            switch_on: 75,
            switch_off: 10,
            hold_timer: 10,
            address: None,
            gpio_pin: None,
        };
        LoadController::new("aux", &config)
    }

    fn reading(power_w: f64) -> Reading {
        let ts = DateTime::parse_from_rfc3339("2024-06-01T12:00:00+02:00").unwrap();
        Reading::new(ts, power_w)
    }

    #[tokio::test]
    async fn test_switches_once_after_hold() {
        let clock = Arc::new(ManualClock::new());
        let actuator = RecordingActuator::default();
        let commands = actuator.commands.clone();
        let mut worker = LoadWorker::with_clock(controller(), actuator, clock.clone());
        let status = worker.subscribe();

        for second in 0..=12 {
            // the meter sees the load once it is on
            let power = if commands.lock().unwrap().is_empty() { -1800.0 } else { 500.0 };
            worker.process(&reading(power)).await;
            if second < 10 {
                assert!(commands.lock().unwrap().is_empty(), "switched at {second}s");
            }
            clock.advance_secs(1);
        }

        assert_eq!(*commands.lock().unwrap(), vec![PowerState::On]);
        let snapshot = status.borrow().clone();
        assert_eq!(snapshot.state, PowerState::On);
        assert_eq!(snapshot.commands, 1);
        assert_eq!(snapshot.pending, None);
    }

    #[tokio::test]
    async fn test_failure_keeps_state_and_retries() {
        let clock = Arc::new(ManualClock::new());
        let actuator = RecordingActuator {
            fail_first: 2,
            ..Default::default()
        };
        let commands = actuator.commands.clone();
        let mut worker = LoadWorker::with_clock(controller(), actuator, clock.clone());
        let status = worker.subscribe();

        worker.process(&reading(-1800.0)).await;
        clock.advance_secs(10);
        worker.process(&reading(-1800.0)).await;
        assert_eq!(status.borrow().state, PowerState::Off);
        assert_eq!(status.borrow().pending, Some(PowerState::On));
        assert_eq!(status.borrow().command_failures, 1);

        clock.advance_secs(1);
        worker.process(&reading(-1800.0)).await;
        assert_eq!(status.borrow().command_failures, 2);

        clock.advance_secs(1);
        worker.process(&reading(-1800.0)).await;
        assert_eq!(*commands.lock().unwrap(), vec![PowerState::On]);
        assert_eq!(status.borrow().state, PowerState::On);
    }

    #[tokio::test]
    async fn test_run_stops_without_command_when_stream_closes() {
        let actuator = RecordingActuator::default();
        let commands = actuator.commands.clone();
        let worker = LoadWorker::new(controller(), actuator);

        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(worker.run(rx));
        tx.send(Arc::new(reading(-1800.0))).await.unwrap();
        drop(tx);

        let snapshot = handle.await.unwrap();
        assert_eq!(snapshot.name, "aux");
        assert_eq!(snapshot.state, PowerState::Off);
        assert_eq!(snapshot.pending, Some(PowerState::On));
        assert!(commands.lock().unwrap().is_empty());
    }
}
