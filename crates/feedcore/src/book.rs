//! Pre-allocated Level-3 order book.
//!
//! One book per instrument. Each side is a fixed array of price levels kept
//! sorted (bids descending, asks ascending) by linear scan plus shift — at
//! realistic depths the scan stays in one or two cache lines and beats tree
//! structures that chase pointers. Every array is allocated once at
//! construction; applying messages moves no memory except `copy_within`
//! shifts inside the preallocated slabs.
//!
//! Exactly one worker mutates a book. Snapshot reads by that same worker are
//! naturally consistent; other threads observe books only through the
//! snapshot ring.

use crate::types::{MsgKind, Side, Snapshot, WireMessage};
use std::sync::atomic::{AtomicU64, Ordering};

/// Maximum sorted price levels per side. Inserts beyond this are dropped.
pub const MAX_PRICE_LEVELS: usize = 256;

/// Maximum resting orders tracked per level. Further orders are dropped.
pub const MAX_ORDERS_PER_LEVEL: usize = 32;

/// One resting order inside a price level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Order {
    pub order_id: u64,
    pub quantity: i64,
}

/// One price level: aggregate quantity plus the FIFO array of orders
/// backing it.
#[derive(Clone, Copy)]
pub struct PriceLevel {
    pub price: i64,
    pub total_quantity: i64,
    orders: [Order; MAX_ORDERS_PER_LEVEL],
    order_count: u16,
}

const EMPTY_LEVEL: PriceLevel = PriceLevel {
    price: 0,
    total_quantity: 0,
    orders: [Order {
        order_id: 0,
        quantity: 0,
    }; MAX_ORDERS_PER_LEVEL],
    order_count: 0,
};

impl PriceLevel {
    fn at_price(price: i64) -> Self {
        PriceLevel {
            price,
            ..EMPTY_LEVEL
        }
    }

    /// Orders currently resting at this level, in arrival order.
    pub fn orders(&self) -> &[Order] {
        &self.orders[..self.order_count as usize]
    }

    pub fn order_count(&self) -> usize {
        self.order_count as usize
    }

    /// Appends an order. Returns false when the per-level array is full; the
    /// order is then dropped whole and its quantity never enters the
    /// aggregate.
    fn add_order(&mut self, order_id: u64, quantity: i64) -> bool {
        if self.order_count as usize >= MAX_ORDERS_PER_LEVEL {
            return false;
        }
        self.orders[self.order_count as usize] = Order { order_id, quantity };
        self.order_count += 1;
        self.total_quantity += quantity;
        true
    }

    fn find_order(&self, order_id: u64) -> Option<usize> {
        self.orders[..self.order_count as usize]
            .iter()
            .position(|o| o.order_id == order_id)
    }

    /// Removes the order at `idx`, subtracting its remaining quantity from
    /// the aggregate and shifting later orders down to preserve arrival
    /// order.
    fn remove_order_at(&mut self, idx: usize) {
        let count = self.order_count as usize;
        debug_assert!(idx < count);
        self.total_quantity -= self.orders[idx].quantity;
        self.orders.copy_within(idx + 1..count, idx);
        self.order_count -= 1;
        self.orders[count - 1] = Order::default();
    }
}

impl std::fmt::Debug for PriceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceLevel")
            .field("price", &self.price)
            .field("total_quantity", &self.total_quantity)
            .field("order_count", &self.order_count)
            .finish()
    }
}

/// One sorted side of the book.
struct Ladder {
    levels: Box<[PriceLevel]>,
    depth: usize,
    is_bid: bool,
}

impl Ladder {
    fn new(is_bid: bool) -> Self {
        Self {
            levels: vec![EMPTY_LEVEL; MAX_PRICE_LEVELS].into_boxed_slice(),
            depth: 0,
            is_bid,
        }
    }

    /// Best (price, aggregate quantity), or (0, 0) when the side is empty.
    #[inline]
    fn best(&self) -> (i64, i64) {
        if self.depth > 0 {
            (self.levels[0].price, self.levels[0].total_quantity)
        } else {
            (0, 0)
        }
    }

    /// Sort predicate: does `new` outrank `resting` on this side?
    #[inline]
    fn outranks(&self, new: i64, resting: i64) -> bool {
        if self.is_bid {
            new > resting
        } else {
            new < resting
        }
    }

    fn find(&self, price: i64) -> Option<usize> {
        self.levels[..self.depth].iter().position(|l| l.price == price)
    }

    /// Finds the level at `price`, inserting a fresh one at its sorted
    /// position if absent. Returns `None` when the side is full and `price`
    /// matches no resting level (the insert is silently dropped; the caller
    /// counts it).
    fn find_or_create(&mut self, price: i64) -> Option<usize> {
        for i in 0..self.depth {
            if self.levels[i].price == price {
                return Some(i);
            }
            if self.outranks(price, self.levels[i].price) {
                if self.depth >= MAX_PRICE_LEVELS {
                    return None;
                }
                self.levels.copy_within(i..self.depth, i + 1);
                self.levels[i] = PriceLevel::at_price(price);
                self.depth += 1;
                return Some(i);
            }
        }
        if self.depth >= MAX_PRICE_LEVELS {
            return None;
        }
        let i = self.depth;
        self.levels[i] = PriceLevel::at_price(price);
        self.depth += 1;
        Some(i)
    }

    /// Removes the level at `idx`, shifting trailing levels down one slot.
    fn remove_level(&mut self, idx: usize) {
        debug_assert!(idx < self.depth);
        self.levels.copy_within(idx + 1..self.depth, idx);
        self.depth -= 1;
        self.levels[self.depth] = EMPTY_LEVEL;
    }
}

/// Silent-drop visibility counters (see the level/order overflow rules).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropCounts {
    /// Inserts dropped because a side already held `MAX_PRICE_LEVELS`.
    pub level_overflow: u64,
    /// Orders dropped because a level already held `MAX_ORDERS_PER_LEVEL`.
    pub order_overflow: u64,
    /// Messages whose kind carries no book operation (Quote, FullSnapshot,
    /// Unknown).
    pub ignored_messages: u64,
}

/// Per-instrument book state machine.
pub struct OrderBook {
    symbol_index: u32,
    bids: Ladder,
    asks: Ladder,
    best_bid: (i64, i64),
    best_ask: (i64, i64),
    /// Accepted-message counter; atomic so statistics readers never tear it.
    update_count: AtomicU64,
    last_update_ts_ns: AtomicU64,
    drops: DropCounts,
}

impl OrderBook {
    pub fn new(symbol_index: u32) -> Self {
        Self {
            symbol_index,
            bids: Ladder::new(true),
            asks: Ladder::new(false),
            best_bid: (0, 0),
            best_ask: (0, 0),
            update_count: AtomicU64::new(0),
            last_update_ts_ns: AtomicU64::new(0),
            drops: DropCounts::default(),
        }
    }

    pub fn symbol_index(&self) -> u32 {
        self.symbol_index
    }

    pub fn best_bid(&self) -> (i64, i64) {
        self.best_bid
    }

    pub fn best_ask(&self) -> (i64, i64) {
        self.best_ask
    }

    pub fn update_count(&self) -> u64 {
        self.update_count.load(Ordering::Relaxed)
    }

    pub fn drop_counts(&self) -> DropCounts {
        self.drops
    }

    /// Number of populated levels on a side (`Side::Unknown` reads as 0).
    pub fn depth(&self, side: Side) -> usize {
        match side {
            Side::Buy => self.bids.depth,
            Side::Sell => self.asks.depth,
            Side::Unknown => 0,
        }
    }

    /// The `idx`-th best level on a side, if populated.
    pub fn level(&self, side: Side, idx: usize) -> Option<&PriceLevel> {
        let ladder = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
            Side::Unknown => return None,
        };
        (idx < ladder.depth).then(|| &ladder.levels[idx])
    }

    /// Applies one message. Returns `true` iff the top of book — the
    /// (price, quantity) pair on the affected side — changed.
    ///
    /// Total over all inputs: bad messages become no-ops, never panics.
    /// Accepted messages bump the update counter and the last-update
    /// timestamp; rejected ones (bad price/quantity/side) and non-book kinds
    /// do not.
    pub fn apply(&mut self, msg: &WireMessage) -> bool {
        let outcome = match msg.kind {
            MsgKind::NewOrder => self.apply_new_order(msg),
            MsgKind::Cancel => self.apply_cancel(msg),
            MsgKind::Execution => self.apply_execution(msg),
            MsgKind::IncrementalRefresh => self.apply_refresh(msg),
            MsgKind::Quote | MsgKind::FullSnapshot | MsgKind::Unknown => {
                self.drops.ignored_messages += 1;
                None
            }
        };

        match outcome {
            Some(top_changed) => {
                self.update_count.fetch_add(1, Ordering::Relaxed);
                self.last_update_ts_ns
                    .store(msg.decode_ts_ns, Ordering::Relaxed);
                top_changed
            }
            None => false,
        }
    }

    /// Immutable top-of-book snapshot. Reads only cached fields; no
    /// allocation, no blocking.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            symbol_index: self.symbol_index,
            bid_price: self.best_bid.0,
            bid_quantity: self.best_bid.1,
            ask_price: self.best_ask.0,
            ask_quantity: self.best_ask.1,
            timestamp_ns: self.last_update_ts_ns.load(Ordering::Relaxed),
            update_count: self.update_count.load(Ordering::Relaxed),
        }
    }

    // ---------------------------------------------------------------------
    // OPERATIONS (Some(top_changed) = accepted, None = rejected)
    // ---------------------------------------------------------------------

    fn apply_new_order(&mut self, msg: &WireMessage) -> Option<bool> {
        if msg.price <= 0 || msg.quantity <= 0 || msg.side == Side::Unknown {
            return None;
        }
        let ladder = if msg.side == Side::Buy {
            &mut self.bids
        } else {
            &mut self.asks
        };
        match ladder.find_or_create(msg.price) {
            Some(idx) => {
                if !ladder.levels[idx].add_order(msg.order_id, msg.quantity) {
                    self.drops.order_overflow += 1;
                }
            }
            None => self.drops.level_overflow += 1,
        }
        Some(self.refresh_top(msg.side))
    }

    fn apply_cancel(&mut self, msg: &WireMessage) -> Option<bool> {
        if msg.side == Side::Unknown {
            return None;
        }
        let ladder = if msg.side == Side::Buy {
            &mut self.bids
        } else {
            &mut self.asks
        };
        // Unknown price level or order id: accepted no-op.
        if let Some(li) = ladder.find(msg.price) {
            if let Some(oi) = ladder.levels[li].find_order(msg.order_id) {
                ladder.levels[li].remove_order_at(oi);
                if ladder.levels[li].total_quantity <= 0 {
                    ladder.remove_level(li);
                }
            }
        }
        Some(self.refresh_top(msg.side))
    }

    fn apply_execution(&mut self, msg: &WireMessage) -> Option<bool> {
        if msg.side == Side::Unknown {
            return None;
        }
        let ladder = if msg.side == Side::Buy {
            &mut self.bids
        } else {
            &mut self.asks
        };
        if let Some(li) = ladder.find(msg.price) {
            if let Some(oi) = ladder.levels[li].find_order(msg.order_id) {
                let level = &mut ladder.levels[li];
                // Clamp so an over-reported fill cannot drive quantities
                // negative.
                let fill = msg.trade_quantity.clamp(0, level.orders[oi].quantity);
                level.orders[oi].quantity -= fill;
                level.total_quantity -= fill;
                if level.orders[oi].quantity == 0 {
                    level.remove_order_at(oi);
                }
                if ladder.levels[li].total_quantity <= 0 {
                    ladder.remove_level(li);
                }
            }
        }
        Some(self.refresh_top(msg.side))
    }

    fn apply_refresh(&mut self, msg: &WireMessage) -> Option<bool> {
        if msg.price <= 0 || msg.quantity < 0 || msg.side == Side::Unknown {
            return None;
        }
        let ladder = if msg.side == Side::Buy {
            &mut self.bids
        } else {
            &mut self.asks
        };
        if msg.quantity == 0 {
            if let Some(li) = ladder.find(msg.price) {
                ladder.remove_level(li);
            }
        } else {
            match ladder.find_or_create(msg.price) {
                Some(li) => {
                    let level = &mut ladder.levels[li];
                    // Aggregate-only refresh: per-order detail at this level
                    // is discarded.
                    level.total_quantity = msg.quantity;
                    level.order_count = 0;
                }
                None => self.drops.level_overflow += 1,
            }
        }
        Some(self.refresh_top(msg.side))
    }

    /// Re-reads index 0 of the affected side into the cached best-of-book
    /// pair; reports whether the pair changed.
    fn refresh_top(&mut self, side: Side) -> bool {
        match side {
            Side::Buy => {
                let new = self.bids.best();
                let changed = new != self.best_bid;
                self.best_bid = new;
                changed
            }
            Side::Sell => {
                let new = self.asks.best();
                let changed = new != self.best_ask;
                self.best_ask = new;
                changed
            }
            Side::Unknown => false,
        }
    }
}

impl std::fmt::Debug for OrderBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderBook")
            .field("symbol_index", &self.symbol_index)
            .field("best_bid", &self.best_bid)
            .field("best_ask", &self.best_ask)
            .field("bid_depth", &self.bids.depth)
            .field("ask_depth", &self.asks.depth)
            .field("update_count", &self.update_count())
            .finish()
    }
}
