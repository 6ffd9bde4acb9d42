//! # Cart Session
//!
//! The pure per-context cart state machine. No I/O: storage write-through
//! and stock reservation are orchestration concerns layered on top by the
//! engine crate.
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        CartSession Phases                               │
//! │                                                                         │
//! │            begin_checkout()                confirm (external)           │
//! │   Active ───────────────────► Settling ───────────────────► cleared    │
//! │     ▲                            │                                      │
//! │     └──────── cancel_checkout ───┘                                      │
//! │                                                                         │
//! │   While Settling, EVERY cart mutation is rejected with                  │
//! │   SettlementInProgress. The totals the customer approved cannot         │
//! │   drift underneath the payment step.                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Line Rules
//! - Adding a variant increments its most recent **Draft** line, or appends
//!   a new Draft line if none exists. A Sent line is never incremented in
//!   place: the extra unit must reach the kitchen on the next ticket.
//! - Removing a unit targets the most recent line for the variant. Draft
//!   lines decrement (and disappear at zero). Sent lines can only be
//!   removed wholesale, with an explicit void confirmation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{LineStatus, SessionLine, Variant};

/// Maximum number of lines one session may hold.
pub const MAX_SESSION_LINES: usize = 100;

/// Maximum quantity on a single line.
pub const MAX_LINE_QUANTITY: i64 = 999;

// =============================================================================
// Totals
// =============================================================================

/// The totals frozen when checkout begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSnapshot {
    pub subtotal: Money,
    pub discount: Money,
}

impl CheckoutSnapshot {
    /// Amount due before tip.
    #[inline]
    pub fn due(&self) -> Money {
        self.subtotal - self.discount
    }
}

/// The full settlement breakdown once a tip is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub tip: Money,
    pub total: Money,
}

// =============================================================================
// Phase
// =============================================================================

/// Whether the session is taking items or waiting on a payment decision.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionPhase {
    Active,
    Settling(CheckoutSnapshot),
}

// =============================================================================
// Removal Outcome
// =============================================================================

/// What `remove_unit` actually did. The caller needs this to mirror the
/// change into stock reservations, persistence and kitchen notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRemoval {
    /// A draft line lost one unit but survives.
    Decremented { position: i64, remaining: i64 },
    /// A draft line reached zero and was dropped.
    RemovedDraft { position: i64, quantity: i64 },
    /// A sent line was removed wholesale; the kitchen must be told.
    VoidedSent {
        position: i64,
        name: String,
        quantity: i64,
    },
}

impl LineRemoval {
    /// How many units of stock this removal frees.
    pub fn released_units(&self) -> i64 {
        match self {
            LineRemoval::Decremented { .. } => 1,
            LineRemoval::RemovedDraft { quantity, .. } => *quantity,
            LineRemoval::VoidedSent { quantity, .. } => *quantity,
        }
    }
}

// =============================================================================
// Cart Session
// =============================================================================

/// One serving context's cart.
///
/// Positions are assigned from a monotonic counter and never reused, so a
/// session restored from storage keeps its insertion order stable.
#[derive(Debug, Clone)]
pub struct CartSession {
    lines: Vec<SessionLine>,
    discount_percentage: u8,
    phase: SessionPhase,
    next_position: i64,
}

impl Default for CartSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CartSession {
    /// Creates an empty active session.
    pub fn new() -> Self {
        CartSession {
            lines: Vec::new(),
            discount_percentage: 0,
            phase: SessionPhase::Active,
            next_position: 0,
        }
    }

    /// Restores a session from persisted lines (table contexts).
    ///
    /// Lines are re-sorted by position; the position counter resumes past
    /// the highest persisted value.
    pub fn from_lines(mut lines: Vec<SessionLine>) -> Self {
        lines.sort_by_key(|l| l.position);
        let next_position = lines.iter().map(|l| l.position + 1).max().unwrap_or(0);
        CartSession {
            lines,
            discount_percentage: 0,
            phase: SessionPhase::Active,
            next_position,
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn lines(&self) -> &[SessionLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn discount_percentage(&self) -> u8 {
        self.discount_percentage
    }

    pub fn is_settling(&self) -> bool {
        matches!(self.phase, SessionPhase::Settling(_))
    }

    /// Total quantity of a variant across all lines (draft and sent).
    /// This is what the advisory stock check compares against.
    pub fn held_quantity(&self, variant_id: &str) -> i64 {
        self.lines
            .iter()
            .filter(|l| l.variant_id == variant_id)
            .map(|l| l.quantity)
            .sum()
    }

    /// Sum of all line totals before discount.
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.lines.iter().map(|l| l.line_total_cents()).sum())
    }

    /// Current subtotal and discount breakdown.
    pub fn totals(&self) -> CheckoutSnapshot {
        let subtotal = self.subtotal();
        CheckoutSnapshot {
            subtotal,
            discount: subtotal.percentage(self.discount_percentage),
        }
    }

    fn ensure_active(&self) -> CoreResult<()> {
        match self.phase {
            SessionPhase::Active => Ok(()),
            SessionPhase::Settling(_) => Err(CoreError::SettlementInProgress),
        }
    }

    // -------------------------------------------------------------------------
    // Mutations (Active phase only)
    // -------------------------------------------------------------------------

    /// Adds one unit of a variant, snapshotting name and price.
    ///
    /// Increments the most recent **Draft** line for the variant if one
    /// exists; otherwise appends a new Draft line (even when a Sent line
    /// for the same variant is present, so the increment reaches the
    /// kitchen on the next dispatch).
    ///
    /// Returns a clone of the affected line for write-through persistence.
    pub fn add_unit(&mut self, variant: &Variant, now: DateTime<Utc>) -> CoreResult<SessionLine> {
        self.ensure_active()?;

        if let Some(line) = self
            .lines
            .iter_mut()
            .rev()
            .find(|l| l.variant_id == variant.id && l.status == LineStatus::Draft)
        {
            if line.quantity >= MAX_LINE_QUANTITY {
                return Err(CoreError::QuantityTooLarge {
                    requested: line.quantity + 1,
                    max: MAX_LINE_QUANTITY,
                });
            }
            line.quantity += 1;
            return Ok(line.clone());
        }

        if self.lines.len() >= MAX_SESSION_LINES {
            return Err(CoreError::SessionTooLarge {
                max: MAX_SESSION_LINES,
            });
        }

        let line = SessionLine {
            position: self.next_position,
            variant_id: variant.id.clone(),
            name: variant.name(),
            unit_price_cents: variant.price_cents,
            quantity: 1,
            status: LineStatus::Draft,
            added_at: now,
        };
        self.next_position += 1;
        self.lines.push(line.clone());
        Ok(line)
    }

    /// Removes one unit of a variant, targeting its most recent line.
    ///
    /// Draft lines decrement and disappear at zero. Sent (or Ready) lines
    /// are removed wholesale and only with `confirm_void` — the kitchen
    /// has already started the work, so the removal must be deliberate.
    pub fn remove_unit(&mut self, variant_id: &str, confirm_void: bool) -> CoreResult<LineRemoval> {
        self.ensure_active()?;

        let idx = self
            .lines
            .iter()
            .rposition(|l| l.variant_id == variant_id)
            .ok_or_else(|| CoreError::LineNotFound(variant_id.to_string()))?;

        let line = &mut self.lines[idx];
        match line.status {
            LineStatus::Draft => {
                if line.quantity > 1 {
                    line.quantity -= 1;
                    Ok(LineRemoval::Decremented {
                        position: line.position,
                        remaining: line.quantity,
                    })
                } else {
                    let removed = self.lines.remove(idx);
                    Ok(LineRemoval::RemovedDraft {
                        position: removed.position,
                        quantity: removed.quantity,
                    })
                }
            }
            LineStatus::Sent | LineStatus::Ready => {
                if !confirm_void {
                    return Err(CoreError::VoidConfirmationRequired {
                        name: line.name.clone(),
                    });
                }
                let removed = self.lines.remove(idx);
                Ok(LineRemoval::VoidedSent {
                    position: removed.position,
                    name: removed.name,
                    quantity: removed.quantity,
                })
            }
        }
    }

    /// Sets the whole-order discount percentage (0-100).
    pub fn set_discount(&mut self, percentage: u8) -> CoreResult<()> {
        self.ensure_active()?;
        if percentage > 100 {
            return Err(CoreError::InvalidDiscount {
                requested: percentage,
            });
        }
        self.discount_percentage = percentage;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Kitchen Coordination
    // -------------------------------------------------------------------------

    /// Clones of the lines that have not been sent to the kitchen yet.
    pub fn draft_lines(&self) -> Vec<SessionLine> {
        self.lines.iter().filter(|l| l.is_draft()).cloned().collect()
    }

    /// Marks every draft line as Sent; returns the affected positions.
    pub fn mark_drafts_sent(&mut self) -> Vec<i64> {
        let mut positions = Vec::new();
        for line in &mut self.lines {
            if line.status == LineStatus::Draft {
                line.status = LineStatus::Sent;
                positions.push(line.position);
            }
        }
        positions
    }

    /// Marks Sent lines whose names appear in `names` as Ready; returns
    /// the affected positions. Called when the kitchen acknowledges a
    /// ticket carrying those lines.
    pub fn mark_sent_lines_ready(&mut self, names: &[String]) -> Vec<i64> {
        let mut positions = Vec::new();
        for line in &mut self.lines {
            if line.status == LineStatus::Sent && names.iter().any(|n| n == &line.name) {
                line.status = LineStatus::Ready;
                positions.push(line.position);
            }
        }
        positions
    }

    // -------------------------------------------------------------------------
    // Settlement Phase
    // -------------------------------------------------------------------------

    /// Freezes the session for payment and returns the totals snapshot.
    pub fn begin_checkout(&mut self) -> CoreResult<CheckoutSnapshot> {
        self.ensure_active()?;
        if self.lines.is_empty() {
            return Err(CoreError::EmptyCart);
        }
        let snapshot = self.totals();
        self.phase = SessionPhase::Settling(snapshot);
        Ok(snapshot)
    }

    /// Abandons an initiated checkout; the cart thaws unchanged.
    pub fn cancel_checkout(&mut self) -> CoreResult<()> {
        match self.phase {
            SessionPhase::Settling(_) => {
                self.phase = SessionPhase::Active;
                Ok(())
            }
            SessionPhase::Active => Err(CoreError::invalid_transition(
                "Session",
                "active",
                "active",
            )),
        }
    }

    /// Computes the final breakdown for a settling session.
    ///
    /// The subtotal and discount come from the frozen snapshot, never
    /// recomputed, so they match what the customer approved.
    pub fn settlement_totals(&self, tip_cents: i64) -> CoreResult<SettlementTotals> {
        let snapshot = match &self.phase {
            SessionPhase::Settling(s) => *s,
            SessionPhase::Active => {
                return Err(CoreError::invalid_transition(
                    "Session",
                    "active",
                    "settled",
                ))
            }
        };
        if tip_cents < 0 {
            return Err(CoreError::InvalidTip { tip_cents });
        }
        let tip = Money::from_cents(tip_cents);
        Ok(SettlementTotals {
            subtotal: snapshot.subtotal,
            discount: snapshot.discount,
            tip,
            total: snapshot.due() + tip,
        })
    }

    /// Reverts a settling session to Active without clearing it.
    /// Used when settlement fails in a recoverable way (e.g. the stock
    /// reservation came up short and the operator should adjust the cart).
    pub fn revert_to_active(&mut self) {
        self.phase = SessionPhase::Active;
    }

    /// Empties the session after a successful settlement.
    /// The position counter is NOT reset; positions stay unique for the
    /// lifetime of the context.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.discount_percentage = 0;
        self.phase = SessionPhase::Active;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
