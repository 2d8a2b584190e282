//! Stop-bit wire format decoder.
//!
//! A stateless transform from a raw byte slice plus side-channel metadata to
//! a typed [`WireMessage`]. The decoder is total: any input that is too
//! short, runs off the end mid-field, or carries an unterminated varint
//! decodes to `None`. It never allocates and never panics.
//!
//! Packet layout, in decode order:
//!
//! ```text
//! byte 0        presence map (bit i => optional field i present)
//! stop-bit      template id (discarded)
//! stop-bit      MsgSeqNum
//! byte          MsgType ('D','F','8','S','W','X')
//! stop-bit      SendingTime
//! [0x01]        SecurityId          -> symbol_index = id % MAX_SYMBOLS
//! [0x02]        price decimal       (exponent: stop-bit 32, mantissa: stop-bit 64)
//! [0x04]        Quantity
//! [0x08]        side byte ('1'/'2')
//! [0x10]        OrderId
//! [0x20]        TradeId, trade decimal, TradeQuantity (Execution only)
//! ```
//!
//! A stop-bit integer packs 7 data bits per byte; the byte with the high bit
//! **set** terminates. Decimals arrive as (exponent, mantissa) and are
//! rescaled to fixed-point ×10⁸.

use crate::clock::{Clock, MonotonicClock};
use crate::types::{MsgKind, Side, WireMessage, MAX_SYMBOLS};

/// Packets shorter than this are rejected before any field is touched.
pub const MIN_PACKET_LEN: usize = 16;

// Presence map bits.
const PM_SECURITY_ID: u8 = 0x01;
const PM_PRICE: u8 = 0x02;
const PM_QUANTITY: u8 = 0x04;
const PM_SIDE: u8 = 0x08;
const PM_ORDER_ID: u8 = 0x10;
const PM_TRADE: u8 = 0x20;

// A 64-bit value needs at most 10 stop-bit bytes, a 32-bit value at most 5.
// Longer runs are malformed input, not larger numbers.
const MAX_STOP_BIT_BYTES_64: usize = 10;
const MAX_STOP_BIT_BYTES_32: usize = 5;

/// Powers of ten for decimal rescaling; indexed lookup keeps exponentiation
/// off the hot path.
const POW10: [i64; 19] = [
    1,
    10,
    100,
    1_000,
    10_000,
    100_000,
    1_000_000,
    10_000_000,
    100_000_000,
    1_000_000_000,
    10_000_000_000,
    100_000_000_000,
    1_000_000_000_000,
    10_000_000_000_000,
    100_000_000_000_000,
    1_000_000_000_000_000,
    10_000_000_000_000_000,
    100_000_000_000_000_000,
    1_000_000_000_000_000_000,
];

/// Rescales a wire decimal to fixed-point ×10⁸.
///
/// `k = 8 + exponent` digits of shift; mantissas whose exponent falls
/// outside ±10 of the target scale pass through unchanged rather than
/// saturating or failing.
#[inline]
fn scale_decimal(mantissa: i64, exponent: i32) -> i64 {
    let k = i64::from(exponent) + 8;
    if (0..=10).contains(&k) {
        mantissa.wrapping_mul(POW10[k as usize])
    } else if (-10..0).contains(&k) {
        mantissa / POW10[(-k) as usize]
    } else {
        mantissa
    }
}

/// Bounds-checked reader over the packet bytes. Every accessor returns
/// `None` past the end; `?` propagation makes truncation handling uniform.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    #[inline]
    fn byte(&mut self) -> Option<u8> {
        let b = *self.bytes.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    /// Decodes a 64-bit stop-bit integer.
    #[inline]
    fn stop_bit_u64(&mut self) -> Option<u64> {
        let mut value = 0u64;
        for _ in 0..MAX_STOP_BIT_BYTES_64 {
            let b = self.byte()?;
            value = (value << 7) | u64::from(b & 0x7F);
            if b & 0x80 != 0 {
                return Some(value);
            }
        }
        None
    }

    /// Decodes a 32-bit stop-bit integer, interpreted as two's complement
    /// (decimal exponents are routinely negative).
    #[inline]
    fn stop_bit_i32(&mut self) -> Option<i32> {
        let mut value = 0u32;
        for _ in 0..MAX_STOP_BIT_BYTES_32 {
            let b = self.byte()?;
            value = (value << 7) | u32::from(b & 0x7F);
            if b & 0x80 != 0 {
                return Some(value as i32);
            }
        }
        None
    }
}

/// Stateless packet decoder. Holds only its time source.
#[derive(Debug, Default)]
pub struct WireDecoder<C: Clock = MonotonicClock> {
    clock: C,
}

impl WireDecoder<MonotonicClock> {
    pub fn new() -> Self {
        Self {
            clock: MonotonicClock::new(),
        }
    }
}

impl<C: Clock> WireDecoder<C> {
    /// Builds a decoder over an injected time source.
    pub fn with_clock(clock: C) -> Self {
        Self { clock }
    }

    /// Decodes one packet.
    ///
    /// `receive_ts_ns` and `channel_id` are stamped through unchanged;
    /// `decode_ts_ns` is taken fresh from the clock. Returns `None` for any
    /// malformed input.
    pub fn try_decode(
        &self,
        bytes: &[u8],
        receive_ts_ns: u64,
        channel_id: u32,
    ) -> Option<WireMessage> {
        if bytes.len() < MIN_PACKET_LEN {
            return None;
        }

        let mut cur = Cursor::new(bytes);

        let presence = cur.byte()?;
        let _template_id = cur.stop_bit_u64()?;
        let seq_num = cur.stop_bit_u64()?;
        let kind = MsgKind::from_wire(cur.byte()?);
        let sending_time = cur.stop_bit_u64()?;

        let mut msg = WireMessage {
            kind,
            seq_num,
            sending_time,
            receive_ts_ns,
            channel_id,
            ..WireMessage::default()
        };

        if presence & PM_SECURITY_ID != 0 {
            let security_id = cur.stop_bit_u64()?;
            msg.security_id = security_id;
            msg.symbol_index = (security_id % MAX_SYMBOLS as u64) as u32;
        }
        if presence & PM_PRICE != 0 {
            let exponent = cur.stop_bit_i32()?;
            let mantissa = cur.stop_bit_u64()? as i64;
            msg.price = scale_decimal(mantissa, exponent);
        }
        if presence & PM_QUANTITY != 0 {
            msg.quantity = cur.stop_bit_u64()? as i64;
        }
        if presence & PM_SIDE != 0 {
            msg.side = Side::from_wire(cur.byte()?);
        }
        if presence & PM_ORDER_ID != 0 {
            msg.order_id = cur.stop_bit_u64()?;
        }
        if msg.kind == MsgKind::Execution && presence & PM_TRADE != 0 {
            msg.trade_id = cur.stop_bit_u64()?;
            let exponent = cur.stop_bit_i32()?;
            let mantissa = cur.stop_bit_u64()? as i64;
            msg.trade_price = scale_decimal(mantissa, exponent);
            msg.trade_quantity = cur.stop_bit_u64()? as i64;
        }

        msg.decode_ts_ns = self.clock.now_ns();
        Some(msg)
    }
}
