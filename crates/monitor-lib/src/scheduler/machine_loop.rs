use super::{Scheduler, SchedulerPhase};
use crate::models::IntervalState;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::info;

/// The owning loop of one machine's `IntervalState`
///
/// Ticks run strictly one after another. Shutdown is only observed at the
/// wait point, so an in-flight tick always completes its state mutation.
pub struct MachineLoop {
    scheduler: Scheduler,
    state: IntervalState,
}

impl MachineLoop {
    pub fn new(scheduler: Scheduler) -> Self {
        let state = scheduler.initial_state();
        Self { scheduler, state }
    }

    pub fn phase(&self) -> watch::Receiver<SchedulerPhase> {
        self.scheduler.subscribe()
    }

    /// Run until shutdown; returns the final state
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> IntervalState {
        let Self { scheduler, mut state } = self;

        info!(
            machine_id = %state.machine_id,
            interval_secs = state.current_interval,
            min_interval_secs = state.min_interval,
            max_interval_secs = state.max_interval,
            "Starting machine loop"
        );
        scheduler.metrics().inc_machines_monitored();
        if let Some(health) = scheduler.health() {
            health.register_machine(&state.machine_id).await;
        }

        loop {
            let report = scheduler.tick(state).await;
            let wait = report.next_wait(scheduler.config());
            state = report.state;

            scheduler.set_phase(SchedulerPhase::Waiting);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.recv() => {
                    info!(
                        machine_id = %state.machine_id,
                        cycles = state.cycle_count,
                        "Shutting down machine loop"
                    );
                    break;
                }
            }
        }

        scheduler.set_phase(SchedulerPhase::Stopped);
        scheduler.metrics().dec_machines_monitored();
        if let Some(health) = scheduler.health() {
            health.deregister_machine(&state.machine_id).await;
        }
        state
    }

    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<IntervalState> {
        tokio::spawn(self.run(shutdown))
    }
}
