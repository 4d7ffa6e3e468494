use core::time::Duration;
use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::OnceCell;
use prometheus::{opts, Gauge, IntCounterVec, Registry};

pub static METRICS: OnceCell<Arc<Metrics>> = OnceCell::new();

#[derive(Debug)]
pub struct Metrics {
    attestation_pool_packing_times: Gauge,
    attestation_pool_attestations: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        Ok(Self {
            attestation_pool_packing_times: Gauge::new(
                "attestation_pool_block_attestation_packing_time",
                "Time in seconds spent packing attestations for a block",
            )?,

            attestation_pool_attestations: IntCounterVec::new(
                opts!(
                    "attestation_pool_attestations",
                    "Number of attestations added to the attestation pool"
                ),
                &["phase"],
            )?,
        })
    }

    pub fn register_in(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.attestation_pool_packing_times.clone()))?;
        registry.register(Box::new(self.attestation_pool_attestations.clone()))?;
        Ok(())
    }

    pub fn set_attestation_packing_time(&self, duration: Duration) {
        self.attestation_pool_packing_times.set(duration.as_secs_f64());
    }

    pub fn register_attestation(&self, phase: &str) {
        self.attestation_pool_attestations
            .with_label_values(&[phase])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_in_a_fresh_registry() -> Result<()> {
        let metrics = Metrics::new()?;
        let registry = Registry::new();

        metrics.register_in(&registry)?;
        metrics.set_attestation_packing_time(Duration::from_millis(125));
        metrics.register_attestation("phase0");

        assert_eq!(registry.gather().len(), 2);

        Ok(())
    }
}
