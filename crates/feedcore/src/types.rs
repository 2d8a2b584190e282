//! Plain value records that flow between pipeline stages.
//!
//! Everything here is `Copy`: records move through the rings by value, with
//! no owning references and no heap traffic. Message kinds and sides are
//! closed tagged enums, not trait objects.

use serde::Serialize;

/// Fixed-point price scale: integer value = real value × 10⁸.
pub const PRICE_SCALE: i64 = 100_000_000;

/// Number of instrument slots in the dense book array; also the modulus that
/// folds `security_id` into a symbol index. Ids that differ by a multiple of
/// this constant collide onto the same book.
pub const MAX_SYMBOLS: usize = 1000;

/// Message kinds carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgKind {
    NewOrder,
    Cancel,
    Execution,
    Quote,
    FullSnapshot,
    IncrementalRefresh,
    Unknown,
}

impl MsgKind {
    /// Maps the wire MsgType byte to a kind. Unrecognized codes are
    /// `Unknown`, never an error.
    #[inline]
    pub fn from_wire(code: u8) -> Self {
        match code {
            b'D' => Self::NewOrder,
            b'F' => Self::Cancel,
            b'8' => Self::Execution,
            b'S' => Self::Quote,
            b'W' => Self::FullSnapshot,
            b'X' => Self::IncrementalRefresh,
            _ => Self::Unknown,
        }
    }
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
    Unknown,
}

impl Side {
    /// Maps the wire side byte (`'1'`/`'2'`) to a side.
    #[inline]
    pub fn from_wire(code: u8) -> Self {
        match code {
            b'1' => Self::Buy,
            b'2' => Self::Sell,
            _ => Self::Unknown,
        }
    }
}

/// Status flags carried on a [`RawPacket`].
pub mod flags {
    /// Payload exceeded the pool slot size and was clipped at ingress.
    pub const TRUNCATED: u16 = 1 << 0;
}

/// Reference to one received packet: metadata plus a non-owning index into
/// the ingress buffer pool (an index, not a pointer, so packet and pool have
/// no ownership cycle).
#[derive(Debug, Clone, Copy)]
pub struct RawPacket {
    pub receive_ts_ns: u64,
    pub seq_num: u64,
    pub channel_id: u32,
    /// Pool slot holding the payload bytes.
    pub buffer_index: u32,
    pub offset: u32,
    pub length: u32,
    pub flags: u16,
}

/// A fully decoded wire message.
///
/// One flat record for every kind; fields a kind does not use stay at their
/// zero defaults. Prices are fixed-point ×10⁸.
#[derive(Debug, Clone, Copy)]
pub struct WireMessage {
    pub kind: MsgKind,
    pub side: Side,
    pub seq_num: u64,
    pub sending_time: u64,
    pub security_id: u64,
    pub symbol_index: u32,
    pub order_id: u64,
    pub price: i64,
    pub quantity: i64,
    pub trade_id: u64,
    pub trade_price: i64,
    pub trade_quantity: i64,
    pub receive_ts_ns: u64,
    pub decode_ts_ns: u64,
    pub channel_id: u32,
}

impl Default for WireMessage {
    fn default() -> Self {
        Self {
            kind: MsgKind::Unknown,
            side: Side::Unknown,
            seq_num: 0,
            sending_time: 0,
            security_id: 0,
            symbol_index: 0,
            order_id: 0,
            price: 0,
            quantity: 0,
            trade_id: 0,
            trade_price: 0,
            trade_quantity: 0,
            receive_ts_ns: 0,
            decode_ts_ns: 0,
            channel_id: 0,
        }
    }
}

impl WireMessage {
    /// Builds a NewOrder message, as a synthetic feed or test would inject it.
    pub fn new_order(symbol_index: u32, side: Side, price: i64, quantity: i64, order_id: u64) -> Self {
        Self {
            kind: MsgKind::NewOrder,
            side,
            symbol_index,
            order_id,
            price,
            quantity,
            ..Self::default()
        }
    }

    /// Builds a Cancel for the order resting at `price`.
    pub fn cancel(symbol_index: u32, side: Side, price: i64, order_id: u64) -> Self {
        Self {
            kind: MsgKind::Cancel,
            side,
            symbol_index,
            order_id,
            price,
            ..Self::default()
        }
    }

    /// Builds an Execution that fills `trade_quantity` of the resting order.
    pub fn execution(
        symbol_index: u32,
        side: Side,
        price: i64,
        order_id: u64,
        trade_quantity: i64,
    ) -> Self {
        Self {
            kind: MsgKind::Execution,
            side,
            symbol_index,
            order_id,
            price,
            trade_price: price,
            trade_quantity,
            ..Self::default()
        }
    }

    /// Builds an IncrementalRefresh setting the aggregate at `price` to
    /// `quantity` (zero removes the level).
    pub fn incremental_refresh(symbol_index: u32, side: Side, price: i64, quantity: i64) -> Self {
        Self {
            kind: MsgKind::IncrementalRefresh,
            side,
            symbol_index,
            price,
            quantity,
            ..Self::default()
        }
    }
}

/// Immutable top-of-book snapshot emitted per accepted book update.
///
/// Price fields carry fixed-point ×10⁸ semantics; rendering them as decimals
/// is a downstream concern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub symbol_index: u32,
    pub bid_price: i64,
    pub bid_quantity: i64,
    pub ask_price: i64,
    pub ask_quantity: i64,
    pub timestamp_ns: u64,
    pub update_count: u64,
}
