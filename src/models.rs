//! Domain types shared by the trading and market-data clients

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Login credentials for a gateway session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub broker_id: String,
    pub user_id: String,
    pub password: String,
}

/// Terminal authentication info, required by some gateways before login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInfo {
    pub broker_id: String,
    pub user_id: String,
    pub app_id: String,
    pub auth_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Buy" | "buy" => Ok(Side::Buy),
            "Sell" | "sell" => Ok(Side::Sell),
            other => Err(format!("unknown side: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
}

/// Order placement input
///
/// `order_ref` is the caller-supplied duplicate-detection key: the gateway
/// treats a resubmitted order_ref as the same order, which is what makes a
/// manual retry after `Timeout` safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderInput {
    pub instrument_id: String,
    pub order_ref: String,
    pub side: Side,
    pub order_type: OrderType,
    /// Fixed-point price in the instrument's minimal tick units
    pub price: u64,
    pub qty: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Accepted,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Accepted => "accepted",
            OrderStatus::PartiallyFilled => "partially_filled",
            OrderStatus::Filled => "filled",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}

/// Unsolicited order state change pushed by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub order_id: u64,
    pub order_ref: String,
    pub instrument_id: String,
    pub status: OrderStatus,
    pub filled_qty: u64,
}

/// One position line from a position query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub instrument_id: String,
    pub direction: Side,
    pub volume: u64,
    /// Fixed-point open cost in tick units
    pub open_cost: u64,
}

/// Trading account snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub balance: u64,
    pub available: u64,
    pub frozen_margin: u64,
}

/// Depth market data push for one instrument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteTick {
    pub instrument_id: String,
    pub last_price: u64,
    pub bid_price: u64,
    pub bid_volume: u64,
    pub ask_price: u64,
    pub ask_volume: u64,
    pub volume: u64,
    /// Exchange timestamp, epoch milliseconds
    pub ts: i64,
}
