//! # Domain Types
//!
//! Core domain types used throughout OpenTill.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Variant      │   │  KitchenTicket  │   │     Order       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id + seq       │   │  id (UUID)      │       │
//! │  │  price_cents    │   │  items (JSON)   │   │  status         │       │
//! │  │  stock_quantity │   │  status         │   │  total_cents    │       │
//! │  │  track_stock    │   │  created_at     │   │  payment_method │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   SessionLine   │   │   ContextKey    │   │  DiningTable    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  name snapshot  │   │  QuickService   │   │  table_number   │       │
//! │  │  price snapshot │   │  Table("T1")    │   │  status         │       │
//! │  │  Draft/Sent/..  │   └─────────────────┘   └─────────────────┘       │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! Session lines, ticket lines and order lines all freeze name/price at the
//! moment they are created, so later catalog edits never retroactively
//! change an in-progress or historical sale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::money::Money;

// =============================================================================
// Context Key
// =============================================================================

/// Identifies one serving context: a dining table or the single implicit
/// quick-service queue.
///
/// ## Wire Encoding
/// Stored and serialized as a string: `"quick"` or `"table:T1"`.
/// This keeps database columns and event payloads trivially readable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ContextKey {
    /// The single anonymous walk-up queue (no table, no reservation).
    QuickService,
    /// A named dining table (e.g. "T1").
    Table(String),
}

impl ContextKey {
    /// Returns the table number, if this context is table-backed.
    pub fn table_number(&self) -> Option<&str> {
        match self {
            ContextKey::Table(n) => Some(n),
            ContextKey::QuickService => None,
        }
    }

    /// Human label for kitchen displays and receipts.
    pub fn label(&self) -> &str {
        match self {
            ContextKey::QuickService => "Takeaway",
            ContextKey::Table(n) => n,
        }
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextKey::QuickService => write!(f, "quick"),
            ContextKey::Table(n) => write!(f, "table:{}", n),
        }
    }
}

impl FromStr for ContextKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "quick" {
            Ok(ContextKey::QuickService)
        } else if let Some(table) = s.strip_prefix("table:") {
            if table.is_empty() {
                Err(format!("empty table name in context key '{}'", s))
            } else {
                Ok(ContextKey::Table(table.to_string()))
            }
        } else {
            Err(format!("unrecognized context key '{}'", s))
        }
    }
}

impl From<ContextKey> for String {
    fn from(key: ContextKey) -> String {
        key.to_string()
    }
}

impl TryFrom<String> for ContextKey {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

// =============================================================================
// Stock Level
// =============================================================================

/// The availability a ledger operation observed or produced.
///
/// Untracked variants report `Unlimited` — the "infinite stock" sentinel —
/// rather than a fabricated number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockLevel {
    /// Variant does not track stock; any quantity can be sold.
    Unlimited,
    /// Tracked variant with this many units remaining.
    Tracked(i64),
}

impl StockLevel {
    /// Returns the remaining units, or `None` for unlimited stock.
    pub fn units(&self) -> Option<i64> {
        match self {
            StockLevel::Unlimited => None,
            StockLevel::Tracked(n) => Some(*n),
        }
    }

    /// Whether at least `quantity` more units can be taken.
    pub fn can_supply(&self, quantity: i64) -> bool {
        match self {
            StockLevel::Unlimited => true,
            StockLevel::Tracked(n) => *n >= quantity,
        }
    }
}

// =============================================================================
// Variant
// =============================================================================

/// A sellable unit: product + option (e.g. "Latte" + "Large").
///
/// `stock_quantity` is owned exclusively by the stock ledger; no other
/// component mutates it directly. It may dip negative only transiently
/// inside a racing conditional update, never in a committed row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Parent product name (e.g. "Latte").
    pub product_name: String,

    /// Option name (e.g. "Large").
    pub option_name: String,

    /// Unit price in cents, snapshotted into lines at add time.
    pub price_cents: i64,

    /// Current stock level. Meaningless when `track_stock` is false.
    pub stock_quantity: i64,

    /// When false, the variant has unconstrained (infinite) availability.
    pub track_stock: bool,

    /// Whether the variant is sellable (soft delete).
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Variant {
    /// Display name shown on tickets and receipts, e.g. "Latte (Large)".
    pub fn name(&self) -> String {
        format!("{} ({})", self.product_name, self.option_name)
    }

    /// Returns the price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Advisory check: can `requested` units be sold right now?
    ///
    /// This is the soft UI-facing check; the authoritative answer is the
    /// ledger's conditional decrement.
    pub fn can_sell(&self, requested: i64) -> bool {
        !self.track_stock || self.stock_quantity >= requested
    }

    /// The availability this variant row reports.
    pub fn stock_level(&self) -> StockLevel {
        if self.track_stock {
            StockLevel::Tracked(self.stock_quantity)
        } else {
            StockLevel::Unlimited
        }
    }
}

// =============================================================================
// Session Line
// =============================================================================

/// The lifecycle of one cart row.
///
/// ```text
/// Draft ──dispatch──► Sent ──kitchen ack──► Ready
///   │                  │
///   └─ removable       └─ void only (kitchen has started work)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    /// Not yet sent to the kitchen; freely editable.
    Draft,
    /// On a kitchen ticket; still billed, no longer silently editable.
    Sent,
    /// Kitchen has acknowledged the ticket carrying this line.
    Ready,
}

impl LineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineStatus::Draft => "draft",
            LineStatus::Sent => "sent",
            LineStatus::Ready => "ready",
        }
    }
}

impl Default for LineStatus {
    fn default() -> Self {
        LineStatus::Draft
    }
}

/// One row in a cart session.
///
/// Name and price are frozen at add time (snapshot pattern). `position`
/// is assigned once per context and never reused, so insertion order
/// survives persistence round-trips.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct SessionLine {
    /// Insertion-order position within the session (monotonic, not reused).
    pub position: i64,

    /// Variant this line references.
    pub variant_id: String,

    /// Display name at time of adding (frozen).
    pub name: String,

    /// Price in cents at time of adding (frozen).
    pub unit_price_cents: i64,

    /// Quantity (always >= 1; a zero-quantity draft line is removed).
    pub quantity: i64,

    pub status: LineStatus,

    /// When this line was first added.
    pub added_at: DateTime<Utc>,
}

impl SessionLine {
    /// Line total (unit price × quantity).
    #[inline]
    pub fn line_total_cents(&self) -> i64 {
        self.unit_price_cents * self.quantity
    }

    #[inline]
    pub fn is_draft(&self) -> bool {
        self.status == LineStatus::Draft
    }
}

// =============================================================================
// Kitchen Ticket
// =============================================================================

/// Kitchen ticket status.
///
/// Tickets are immutable snapshots; only the status ever changes, and only
/// along `Pending → Completed` or `Pending → Voided`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Waiting for the kitchen.
    Pending,
    /// Kitchen acknowledged the ticket as ready.
    Completed,
    /// Entire ticket cancelled before any item was marked ready.
    Voided,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Pending => "pending",
            TicketStatus::Completed => "completed",
            TicketStatus::Voided => "voided",
        }
    }
}

/// One line on a kitchen ticket.
///
/// Serialized into the ticket's JSON `items` column using the original
/// kitchen-display wire names: `{"name": ..., "qty": ..., "void": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketLine {
    pub name: String,

    #[serde(rename = "qty")]
    pub quantity: i64,

    /// Crossed out on the kitchen display when true.
    #[serde(rename = "void", default)]
    pub voided: bool,
}

/// An immutable snapshot of one dispatch event.
///
/// `seq` is a monotonically increasing counter assigned by storage; the
/// kitchen feed orders by `(created_at, seq)` so wall-clock ties never
/// reorder tickets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KitchenTicket {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Monotonic dispatch sequence (storage-assigned).
    pub seq: i64,

    pub context_key: ContextKey,

    /// Ordered line snapshots as of dispatch time.
    pub items: Vec<TicketLine>,

    pub status: TicketStatus,

    pub created_at: DateTime<Utc>,
}

impl KitchenTicket {
    /// Whether the kitchen should still be working this ticket.
    pub fn is_open(&self) -> bool {
        self.status == TicketStatus::Pending
    }
}

// =============================================================================
// Order
// =============================================================================

/// The status of a finalized order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Paid and recorded.
    Completed,
    /// Reversed; retained for audit, excluded from revenue aggregation.
    Voided,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Completed => "completed",
            OrderStatus::Voided => "voided",
        }
    }
}

/// How the customer paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash payment.
    Cash,
    /// Card payment on external terminal.
    Card,
}

/// The financial record of a completed sale.
///
/// Created atomically at payment confirmation. Voiding flips the status
/// but the record (and its total) is retained for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub context_key: ContextKey,
    pub status: OrderStatus,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tip_cents: i64,
    pub total_cents: i64,
    pub payment_method: PaymentMethod,
    pub created_at: DateTime<Utc>,
    pub voided_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Returns the grand total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// A line snapshot on a finalized order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub variant_id: String,
    /// Display name at time of sale (frozen).
    pub name: String,
    /// Unit price in cents at time of sale (frozen).
    pub unit_price_cents: i64,
    pub quantity: i64,
}

impl OrderLine {
    #[inline]
    pub fn line_total_cents(&self) -> i64 {
        self.unit_price_cents * self.quantity
    }
}

// =============================================================================
// Dining Table
// =============================================================================

/// Floor-plan status of a dining table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Available,
    Occupied,
    Reserved,
}

impl TableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableStatus::Available => "available",
            TableStatus::Occupied => "occupied",
            TableStatus::Reserved => "reserved",
        }
    }
}

/// A physical dining table on the floor plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct DiningTable {
    pub id: String,
    pub table_number: String,
    pub status: TableStatus,
}

// =============================================================================
// Unit Tests
// =============================================================================
