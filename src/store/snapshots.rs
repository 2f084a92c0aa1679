//! Snapshot broadcast (§6 "Snapshot stream (outbound)"): one event per persisted
//! decision. Single producer (the store's save path), many consumers; slow
//! subscribers drop events past the 64-event buffer (§5, §9 "Snapshot broadcast
//! without persistent subscriptions" — this is for live awareness, not durable
//! delivery).

use tokio::sync::broadcast;

use crate::domain::DecisionSnapshot;

#[derive(Clone)]
pub struct SnapshotBus {
    sender: broadcast::Sender<DecisionSnapshot>,
}

impl SnapshotBus {
    pub fn new(buffer: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(buffer);
        Self { sender }
    }

    pub fn publish(&self, snapshot: DecisionSnapshot) {
        // broadcast::Sender::send errors only when there are no receivers; that is
        // an expected, non-erroneous state for this channel (no subscribers yet).
        let _ = self.sender.send(snapshot);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DecisionSnapshot> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DecisionMode, DirectionalBias, MarketRegime, Signal, TradeDirection, TradingSession};

    fn snapshot(symbol: &str) -> DecisionSnapshot {
        DecisionSnapshot {
            symbol: symbol.to_string(),
            timestamp: chrono::Utc::now(),
            final_signal: Signal::Watch,
            confidence: 0.5,
            trace_id: "t1".to_string(),
            market_regime: MarketRegime::Calm,
            trading_session: TradingSession::OffHours,
            directional_bias: DirectionalBias::Neutral,
            trade_direction: TradeDirection::Flat,
            divergence_flag: false,
            consensus_score: 0.5,
            agent_count: 4,
            decision_latency_ms: 10,
            decision_mode: DecisionMode::Live,
            entry_price: None,
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_snapshot() {
        let bus = SnapshotBus::new(64);
        let mut rx = bus.subscribe();
        bus.publish(snapshot("NIFTY50"));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.symbol, "NIFTY50");
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let bus = SnapshotBus::new(64);
        bus.publish(snapshot("NIFTY50"));
    }
}
