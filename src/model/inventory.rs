// src/model/inventory.rs

use crate::model::queues::PipelineQueue;
use crate::simulation::config::ShortageMode;
use crate::strategy::traits::OrderContext;

/// Orders smaller than this are treated as no order at all.
const ORDER_EPSILON: f64 = 1e-9;

/// What happened to one period's demand for one item.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Fulfilment {
    /// Units shipped, including backlog cleared this period.
    pub shipped: f64,
    /// Units of this period's demand not met from stock this period.
    pub short: f64,
}

/// The state of a single item during one simulation.
#[derive(Debug, Clone)]
pub struct ItemState {
    // State Variables
    pub on_hand: f64,
    pub backlog: f64,
    pub pipeline: PipelineQueue,

    // Tracking for the period history
    pub last_demand: f64,
    pub last_order_placed: f64,
    pub last_arrival: f64,
    pub last_shipped: f64,
    pub last_short: f64,
}

impl ItemState {
    pub fn new(initial_inventory: f64, lead_time: usize) -> Self {
        Self {
            on_hand: initial_inventory,
            backlog: 0.0,
            pipeline: PipelineQueue::new(lead_time),
            last_demand: 0.0,
            last_order_placed: 0.0,
            last_arrival: 0.0,
            last_shipped: 0.0,
            last_short: 0.0,
        }
    }

    /// Snapshot handed to the ordering rule.
    pub fn context(&self, period: usize, item: usize) -> OrderContext {
        OrderContext {
            period,
            item,
            on_hand: self.on_hand,
            backlog: self.backlog,
            pipeline: self.pipeline.in_transit(),
        }
    }

    /// Step 1: Place the replenishment order.
    ///
    /// Raises positive orders to `min_order_quantity` and returns the
    /// quantity actually ordered.
    pub fn place_order(&mut self, requested: f64, min_order_quantity: f64) -> f64 {
        let order = if requested < ORDER_EPSILON {
            0.0
        } else {
            requested.max(min_order_quantity)
        };
        self.last_order_placed = order;
        order
    }

    /// Step 2: Receive whatever the pipeline delivers this period.
    pub fn receive_shipment(&mut self) {
        let arrival = self.pipeline.transit(self.last_order_placed);
        self.on_hand += arrival;
        self.last_arrival = arrival;
    }

    /// Step 3: Satisfy demand from on-hand stock.
    ///
    /// Backlog is served before new demand. Under lost sales the unmet part
    /// disappears; under backorders it joins the backlog.
    pub fn fulfil_demand(&mut self, demand: f64, mode: ShortageMode) -> Fulfilment {
        self.last_demand = demand;
        let carried = match mode {
            ShortageMode::Backorder => self.backlog,
            ShortageMode::LostSale => 0.0,
        };
        let due = demand + carried;

        let shipped = self.on_hand.min(due);
        self.on_hand -= shipped;
        let unmet = due - shipped;
        if mode == ShortageMode::Backorder {
            self.backlog = unmet;
        }

        // Stock left after clearing backlog goes to this period's demand
        let met_on_time = (shipped - carried).max(0.0).min(demand);
        let short = demand - met_on_time;

        self.last_shipped = shipped;
        self.last_short = short;
        Fulfilment { shipped, short }
    }
}

/// Per-simulation inventory of every item.
///
/// Created fresh for each evaluation and dropped afterwards, so nothing
/// leaks between scenarios or candidate policies.
#[derive(Debug, Clone)]
pub struct InventoryState {
    items: Vec<ItemState>,
}

impl InventoryState {
    pub fn new(initial: impl IntoIterator<Item = f64>, lead_time: usize) -> Self {
        Self {
            items: initial
                .into_iter()
                .map(|stock| ItemState::new(stock, lead_time))
                .collect(),
        }
    }

    pub fn item_mut(&mut self, item: usize) -> &mut ItemState {
        &mut self.items[item]
    }
}
