// src/strategy/traits.rs

use std::fmt::Debug;

/// What an ordering rule sees when it decides a replenishment quantity.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OrderContext {
    /// Zero-based period index.
    pub period: usize,
    /// Zero-based item index.
    pub item: usize,
    /// Current on-hand stock.
    pub on_hand: f64,
    /// Unfilled demand carried from earlier periods (backorder mode only).
    pub backlog: f64,
    /// Total goods ordered but not yet arrived.
    pub pipeline: f64,
}

impl OrderContext {
    /// On-hand minus backlog plus pipeline.
    pub fn inventory_position(&self) -> f64 {
        self.on_hand - self.backlog + self.pipeline
    }
}

/// Decision logic for replenishing one item.
///
/// Rules are read-only during evaluation so that one policy can be shared by
/// every scenario of a candidate, possibly across worker threads.
pub trait OrderRule: Debug + Send + Sync {
    /// Quantity to order from the supplier this period. Never negative.
    fn order_quantity(&self, context: &OrderContext) -> f64;
}
