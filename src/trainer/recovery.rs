//! Resource-exhaustion recovery
//!
//! When a step reports exhaustion the loop assumes accelerator memory is the
//! culprit and walks a fixed protocol: snapshot everything under the
//! emergency key, evict all live state to host memory, release the device,
//! rebuild the stack from the snapshot, and hand the same step back to the
//! loop. A failure inside recovery itself is fatal.

use super::core::Trainer;
use crate::error::Result;
use crate::risk::QuantileRiskEngine;
use crate::tensor::Device;

impl Trainer {
    pub(super) fn recover(&mut self) -> Result<()> {
        // Persist before touching anything, so even a failed recovery leaves
        // a resumable artifact behind
        self.store.save_emergency(&self.snapshot())?;

        // Evict everything to host, then release the device
        self.model.to_device(Device::Host);
        self.optimizer.to_device(Device::Host);
        self.device.reclaim();

        // Rebuild from the snapshot. Parameter identities change on reload,
        // so the optimizer is rebuilt over the fresh parameters before its
        // accumulated state comes back.
        let checkpoint = self.store.load_emergency()?;
        self.model.load_state(&checkpoint.model)?;
        self.model.to_device(self.device);
        self.rebuild_optimizer()?;
        self.optimizer.load_state(&checkpoint.optimizer)?;
        self.engine = QuantileRiskEngine::from_state(
            self.config.quantile,
            self.config.burnin_iters,
            checkpoint.risk_engine,
        );

        self.store.remove_emergency()?;
        tracing::info!(step = self.last_step, "recovery complete, retrying step");
        Ok(())
    }
}
