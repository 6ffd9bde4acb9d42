//! # Ticket Dispatcher
//!
//! Turns a cart's unsent lines into kitchen tickets, exactly once, and
//! carries void notices to the kitchen.
//!
//! ## Dispatch Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  dispatch(context)            [under the context lock]                  │
//! │                                                                         │
//! │  1. collect Draft lines        ── none? ──► NothingToSend              │
//! │  2. INSERT ticket snapshot     ── fails? ─► error, lines stay Draft    │
//! │  3. mark lines Sent                         (a retry sends ONE ticket) │
//! │  4. publish TicketCreated                                               │
//! │                                                                         │
//! │  The ticket row is written before any line is marked Sent, and the      │
//! │  whole sequence runs under the context lock, so a line can appear on    │
//! │  at most one ticket.                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Void Notices
//! Removing a Sent line must reach the cook. The notice rides the
//! newest still-Pending ticket for the context as a crossed-out line;
//! if every ticket is already done, a standalone Voided ticket is
//! created so the notice still shows on the display.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bus::{NotificationBus, TillEvent};
use crate::error::EngineResult;
use crate::session::SessionManager;
use opentill_core::{
    ContextKey, CoreError, KitchenTicket, LineStatus, TicketLine, TicketStatus,
};
use opentill_db::{Database, TicketRepository};

/// Exactly-once kitchen ticket creation and void delivery.
#[derive(Clone)]
pub struct TicketDispatcher {
    sessions: SessionManager,
    tickets: TicketRepository,
    bus: NotificationBus,
}

impl TicketDispatcher {
    /// Creates a dispatcher over the given database and session manager.
    pub fn new(db: &Database, sessions: SessionManager, bus: NotificationBus) -> Self {
        TicketDispatcher {
            sessions,
            tickets: db.tickets(),
            bus,
        }
    }

    /// Sends every unsent line of a context to the kitchen as one ticket.
    pub async fn dispatch(&self, context: &ContextKey) -> EngineResult<KitchenTicket> {
        let slot = self.sessions.slot(context).await?;
        let mut guard = slot.lock().await;
        let session = &mut guard.session;

        if session.is_settling() {
            return Err(CoreError::SettlementInProgress.into());
        }

        let drafts = session.draft_lines();
        if drafts.is_empty() {
            return Err(CoreError::NothingToSend.into());
        }

        let items: Vec<TicketLine> = drafts
            .iter()
            .map(|line| TicketLine {
                name: line.name.clone(),
                quantity: line.quantity,
                voided: false,
            })
            .collect();

        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();

        // Write the snapshot before touching line statuses: if this
        // insert fails, every line is still Draft and a retry dispatches
        // one ticket, not zero or two.
        let seq = self
            .tickets
            .insert(&id, context, &items, TicketStatus::Pending, created_at)
            .await?;

        let positions = session.mark_drafts_sent();
        self.persist_statuses(context, &positions, LineStatus::Sent)
            .await;

        info!(ticket_id = %id, seq, context = %context, lines = items.len(), "Ticket dispatched");
        self.bus.publish(TillEvent::TicketCreated {
            ticket_id: id.clone(),
            context_key: context.clone(),
            at: created_at,
        });

        Ok(KitchenTicket {
            id,
            seq,
            context_key: context.clone(),
            items,
            status: TicketStatus::Pending,
            created_at,
        })
    }

    /// Kitchen acknowledgement: Pending → Completed, exactly once.
    /// The ticket's lines flip to Ready in the owning session.
    pub async fn acknowledge_ready(&self, ticket_id: &str) -> EngineResult<()> {
        if !self.tickets.complete(ticket_id).await? {
            return Err(self.transition_refusal(ticket_id, "completed").await);
        }

        // The conditional update won; the read below can't race another
        // completer.
        let ticket = self
            .tickets
            .get_by_id(ticket_id)
            .await?
            .ok_or_else(|| CoreError::TicketNotFound(ticket_id.to_string()))?;

        let names: Vec<String> = ticket
            .items
            .iter()
            .filter(|item| !item.voided)
            .map(|item| item.name.clone())
            .collect();

        let slot = self.sessions.slot(&ticket.context_key).await?;
        let mut guard = slot.lock().await;
        let positions = guard.session.mark_sent_lines_ready(&names);
        drop(guard);
        self.persist_statuses(&ticket.context_key, &positions, LineStatus::Ready)
            .await;

        info!(ticket_id = %ticket_id, "Ticket acknowledged ready");
        self.bus.publish(TillEvent::TicketReady {
            ticket_id: ticket_id.to_string(),
        });

        Ok(())
    }

    /// Cancels an entire Pending ticket.
    pub async fn void_ticket(&self, ticket_id: &str) -> EngineResult<()> {
        if !self.tickets.void(ticket_id).await? {
            return Err(self.transition_refusal(ticket_id, "voided").await);
        }

        info!(ticket_id = %ticket_id, "Ticket voided");
        self.bus.publish(TillEvent::TicketVoided {
            ticket_id: ticket_id.to_string(),
        });

        Ok(())
    }

    /// Tells the kitchen to stop making a line that was already sent.
    ///
    /// Appends a crossed-out line to the context's newest Pending
    /// ticket; if none is Pending anymore, a standalone Voided ticket
    /// carries the notice.
    pub async fn void_line(
        &self,
        context: &ContextKey,
        name: &str,
        quantity: i64,
    ) -> EngineResult<()> {
        let void_line = TicketLine {
            name: name.to_string(),
            quantity,
            voided: true,
        };

        let delivered = match self.tickets.newest_pending_for_context(context).await? {
            Some(ticket) => {
                let mut items = ticket.items;
                items.push(void_line.clone());
                // The ticket may complete between the read and this
                // update; falls through to a standalone notice then.
                self.tickets.update_items(&ticket.id, &items).await?
            }
            None => false,
        };

        if !delivered {
            let id = Uuid::new_v4().to_string();
            self.tickets
                .insert(
                    &id,
                    context,
                    std::slice::from_ref(&void_line),
                    TicketStatus::Voided,
                    Utc::now(),
                )
                .await?;
            info!(context = %context, name, "Void notice issued as standalone ticket");
        }

        self.bus.publish(TillEvent::LineVoided {
            context_key: context.clone(),
            name: name.to_string(),
            quantity,
        });

        Ok(())
    }

    /// The kitchen display feed: Pending and Voided tickets, oldest
    /// first, ties broken by dispatch sequence.
    pub async fn active_tickets(&self) -> EngineResult<Vec<KitchenTicket>> {
        Ok(self.tickets.active_feed().await?)
    }

    /// Builds the error for a refused status transition: either the
    /// ticket is unknown or it already left Pending.
    async fn transition_refusal(&self, ticket_id: &str, target: &str) -> crate::error::EngineError {
        match self.tickets.get_by_id(ticket_id).await {
            Ok(Some(ticket)) => CoreError::invalid_transition(
                "Ticket",
                ticket.status.as_str(),
                target,
            )
            .into(),
            Ok(None) => CoreError::TicketNotFound(ticket_id.to_string()).into(),
            Err(e) => e.into(),
        }
    }

    /// Write-through of line statuses for durable contexts. Quick-service
    /// sessions have no rows to update. Failure is logged, not fatal: the
    /// in-memory session is already correct, and the worst case after a
    /// crash is a duplicate ticket, which the kitchen resolves on sight.
    async fn persist_statuses(
        &self,
        context: &ContextKey,
        positions: &[i64],
        status: LineStatus,
    ) {
        if context.table_number().is_none() || positions.is_empty() {
            return;
        }
        if let Err(e) = self
            .sessions
            .store()
            .set_status(context, positions, status)
            .await
        {
            warn!(context = %context, error = %e, "Failed to persist line statuses");
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
