//! Statistics sampler

use crate::context::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Turns running byte counters into per-interval rates
///
/// The sampler always works on the context's current table, so a table rebuilt by a
/// restart is picked up on the next tick.
pub struct Sampler {
    context: Arc<Context>,
    interval: Duration,
}

impl Sampler {
    pub fn new(context: Arc<Context>, interval: Duration) -> Self {
        Self { context, interval }
    }

    /// Rotate every port's counters once
    pub fn tick(&self) {
        self.context.statistics().sample();
    }

    /// Tick every interval until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.tick(),
            }
        }
        log::debug!("Sampler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use udpserial_core::{Config, Definitions};

    fn context() -> Arc<Context> {
        Arc::new(Context::from_parts(Config::default(), Definitions::default()).unwrap())
    }

    #[test]
    fn test_tick_rotates_counters() {
        let ctx = context();
        ctx.statistics().rebuild(["com1"]);
        ctx.statistics().counters("com1").unwrap().add_serial_to_udp(128);

        let sampler = Sampler::new(ctx.clone(), Duration::from_secs(1));
        sampler.tick();

        let snapshot = ctx.statistics().snapshot();
        assert_eq!(snapshot.ports["com1"].serial_to_udp_rate, 128);
        assert_eq!(snapshot.ports["com1"].udp_to_serial_rate, 0);
    }

    #[tokio::test]
    async fn test_run_follows_rebuilt_table() {
        let ctx = context();
        ctx.statistics().rebuild(["com1"]);
        let cancel = CancellationToken::new();
        let sampler = Sampler::new(ctx.clone(), Duration::from_millis(20));
        let task = tokio::spawn(sampler.run(cancel.clone()));

        ctx.statistics().rebuild(["com2"]);
        ctx.statistics().counters("com2").unwrap().add_udp_to_serial(9);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while ctx.statistics().snapshot().ports["com2"].udp_to_serial_rate != 9 {
            assert!(tokio::time::Instant::now() < deadline);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!ctx.statistics().snapshot().ports.contains_key("com1"));

        cancel.cancel();
        task.await.unwrap();
    }
}
