//! Order-block detector

use crate::{OrderBlock, OrderBlockKind, StructureEvent, OHLCV};

impl_with_defaults!(OrderBlockDetector);

/// Combines a sweep and a break that point the same way into an order block
/// anchored on the candle before the trigger.
///
/// - SWEEP_LOW + BOS_UP: bullish block at that candle's low
/// - SWEEP_HIGH + BOS_DOWN: bearish block at that candle's high
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderBlockDetector;

impl OrderBlockDetector {
    pub const ID: &'static str = "ORDER_BLOCK";

    pub fn min_bars(&self) -> usize {
        2
    }

    pub fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        sweep: StructureEvent,
        bos: StructureEvent,
    ) -> OrderBlock {
        if bars.len() < self.min_bars() {
            return OrderBlock::NONE;
        }
        let source_index = bars.len() - 2;
        let anchor = &bars[source_index];

        match (sweep, bos) {
            (StructureEvent::SweepLow(_), StructureEvent::BosUp(_)) => OrderBlock {
                kind: OrderBlockKind::Bullish,
                price: anchor.low(),
                source_index,
            },
            (StructureEvent::SweepHigh(_), StructureEvent::BosDown(_)) => OrderBlock {
                kind: OrderBlockKind::Bearish,
                price: anchor.high(),
                source_index,
            },
            _ => OrderBlock::NONE,
        }
    }
}
