// src/model/queues.rs

use std::collections::VecDeque;

/// Replenishment orders in transit from the supplier.
///
/// An order placed in period `t` arrives at the start of period
/// `t + lead_time`. A lead time of zero delivers within the same period.
#[derive(Debug, Clone)]
pub struct PipelineQueue {
    buffer: VecDeque<f64>,
}

impl PipelineQueue {
    pub fn new(lead_time: usize) -> Self {
        let mut buffer = VecDeque::with_capacity(lead_time + 1);
        // Pre-fill with 0s so orders take `lead_time` periods to traverse
        buffer.extend(std::iter::repeat(0.0).take(lead_time));

        Self { buffer }
    }

    /// Places `order` into the pipe and returns what arrives this period.
    pub fn transit(&mut self, order: f64) -> f64 {
        self.buffer.push_back(order);
        self.buffer.pop_front().unwrap_or(0.0)
    }

    /// Quantity ordered but not yet received.
    pub fn in_transit(&self) -> f64 {
        self.buffer.iter().sum()
    }
}
