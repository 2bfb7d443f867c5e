//! # Payment Reconciliation
//!
//! Every provider callback (return redirect, client verification, webhook)
//! is normalized into a [`PaymentSignal`] and applied to the order through
//! [`PaymentStore::apply_payment`], which runs the whole transition inside
//! one transaction holding a lock on the order row.
//!
//! ```text
//!   PLACED + PENDING ──success──▶ CONFIRMED + PAID   (stock decremented once)
//!          │        ──failure──▶ PLACED + FAILED    (retry possible)
//!          └────────────cancel─▶ CANCELLED + FAILED
//!   PLACED + FAILED  ──success──▶ CONFIRMED + PAID
//!   CANCELLED+FAILED ──success──▶ CONFIRMED + PAID   (money was captured)
//!   * + PAID         ──success──▶ no-op (duplicate)
//! ```
//!
//! The transition rules live in [`decide`] so both stores share them.

use crate::error::ShopResult;
use crate::notify::{BoxedPushNotifier, PushMessage};
use crate::order::{Order, OrderStatus, PaymentProvider, PaymentStatus, StatusHistoryEntry};
use crate::store::PaymentStore;
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// What the provider says happened to the payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Succeeded,
    Failed,
    Cancelled,
    /// Still processing, or an event we do not act on
    Pending,
}

/// Which trigger delivered the signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Redirect,
    ClientVerification,
    Webhook,
}

impl SignalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSource::Redirect => "return redirect",
            SignalSource::ClientVerification => "client verification",
            SignalSource::Webhook => "webhook",
        }
    }
}

/// How to find the order a signal refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderLookup {
    OrderId(Uuid),
    PaymentReference(String),
}

impl fmt::Display for OrderLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderLookup::OrderId(id) => write!(f, "order {id}"),
            OrderLookup::PaymentReference(r) => write!(f, "payment reference {r}"),
        }
    }
}

/// A normalized provider signal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentSignal {
    pub provider: PaymentProvider,
    pub lookup: OrderLookup,
    pub outcome: PaymentOutcome,
    pub source: SignalSource,
    /// Payment intent / payment id
    pub transaction_id: Option<String>,
    /// Provider event id, for logging
    pub event_id: Option<String>,
}

impl PaymentSignal {
    pub fn new(
        provider: PaymentProvider,
        lookup: OrderLookup,
        outcome: PaymentOutcome,
        source: SignalSource,
    ) -> Self {
        Self {
            provider,
            lookup,
            outcome,
            source,
            transaction_id: None,
            event_id: None,
        }
    }

    pub fn with_transaction(mut self, transaction_id: Option<String>) -> Self {
        self.transaction_id = transaction_id;
        self
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }
}

/// Transition chosen for an order in a given state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Decrement stock, set CONFIRMED + PAID
    Confirm,
    /// Set FAILED, keep the order status
    MarkFailed,
    /// Set CANCELLED + FAILED
    Cancel,
    /// Success signal for an already paid order
    Duplicate,
    /// Nothing to change
    Ignore(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    PendingSignal,
    AlreadyPaid,
    AlreadyFailed,
    AlreadyCancelled,
    Refunded,
}

/// Decide the transition for an order in `(status, payment_status)`
/// receiving `outcome`.
pub fn decide(status: OrderStatus, payment_status: PaymentStatus, outcome: PaymentOutcome) -> Transition {
    use PaymentOutcome as O;
    use PaymentStatus as P;

    match (outcome, payment_status) {
        (O::Pending, _) => Transition::Ignore(IgnoreReason::PendingSignal),
        (_, P::Refunded) => Transition::Ignore(IgnoreReason::Refunded),
        (O::Succeeded, P::Paid) => Transition::Duplicate,
        (O::Succeeded, P::Pending | P::Failed) => Transition::Confirm,
        (O::Failed | O::Cancelled, P::Paid) => Transition::Ignore(IgnoreReason::AlreadyPaid),
        (O::Failed, P::Failed) => Transition::Ignore(IgnoreReason::AlreadyFailed),
        (O::Failed, P::Pending) => Transition::MarkFailed,
        (O::Cancelled, _) if status == OrderStatus::Cancelled => {
            Transition::Ignore(IgnoreReason::AlreadyCancelled)
        }
        (O::Cancelled, P::Pending | P::Failed) => Transition::Cancel,
    }
}

/// A line item whose conditional stock decrement matched no row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Shortfall {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: u32,
}

/// Identity of the order a signal was applied to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRef {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
}

impl From<&Order> for OrderRef {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            order_number: order.order_number.clone(),
            user_id: order.user_id,
        }
    }
}

/// Result of applying one signal
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Confirmed {
        order: OrderRef,
        shortfalls: Vec<Shortfall>,
    },
    Duplicate {
        order: OrderRef,
    },
    MarkedFailed {
        order: OrderRef,
    },
    Cancelled {
        order: OrderRef,
    },
    Ignored {
        order: OrderRef,
        reason: IgnoreReason,
    },
    OrderNotFound,
}

impl ReconcileOutcome {
    pub fn order(&self) -> Option<&OrderRef> {
        match self {
            ReconcileOutcome::Confirmed { order, .. }
            | ReconcileOutcome::Duplicate { order }
            | ReconcileOutcome::MarkedFailed { order }
            | ReconcileOutcome::Cancelled { order }
            | ReconcileOutcome::Ignored { order, .. } => Some(order),
            ReconcileOutcome::OrderNotFound => None,
        }
    }

    /// Whether the order is paid after this signal
    pub fn is_paid(&self) -> bool {
        matches!(
            self,
            ReconcileOutcome::Confirmed { .. }
                | ReconcileOutcome::Duplicate { .. }
                | ReconcileOutcome::Ignored {
                    reason: IgnoreReason::AlreadyPaid,
                    ..
                }
        )
    }
}

// =============================================================================
// History notes
// =============================================================================

fn via(signal: &PaymentSignal) -> String {
    format!("{} {}", signal.provider.display_name(), signal.source.as_str())
}

pub fn confirmation_note(signal: &PaymentSignal, shortfalls: &[Shortfall]) -> String {
    let mut note = format!("Payment confirmed via {}", via(signal));
    if let Some(txn) = &signal.transaction_id {
        note.push_str(&format!(" (transaction {txn})"));
    }
    if !shortfalls.is_empty() {
        let short: Vec<String> = shortfalls
            .iter()
            .map(|s| format!("{} x{}", s.product_name, s.quantity))
            .collect();
        note.push_str(&format!(
            ". Insufficient stock for: {}. Manual review required",
            short.join(", ")
        ));
    }
    note
}

pub fn failure_note(signal: &PaymentSignal) -> String {
    format!("Payment failed via {}", via(signal))
}

pub fn cancellation_note(signal: &PaymentSignal) -> String {
    format!("Payment cancelled via {}", via(signal))
}

// =============================================================================
// In-place application (used by stores that hold orders in memory)
// =============================================================================

/// Mark `order` paid and confirmed; stock must already have been handled.
pub fn apply_confirmation(order: &mut Order, signal: &PaymentSignal, shortfalls: &[Shortfall]) {
    order.payment_status = PaymentStatus::Paid;
    order.status = OrderStatus::Confirmed;
    if signal.transaction_id.is_some() {
        order.provider_transaction_id = signal.transaction_id.clone();
    }
    if !shortfalls.is_empty() {
        order.needs_review = true;
    }
    order.status_history.push(StatusHistoryEntry::new(
        OrderStatus::Confirmed,
        Some(confirmation_note(signal, shortfalls)),
    ));
    order.updated_at = Utc::now();
}

pub fn apply_failure(order: &mut Order, signal: &PaymentSignal) {
    order.payment_status = PaymentStatus::Failed;
    if signal.transaction_id.is_some() {
        order.provider_transaction_id = signal.transaction_id.clone();
    }
    order
        .status_history
        .push(StatusHistoryEntry::new(order.status, Some(failure_note(signal))));
    order.updated_at = Utc::now();
}

pub fn apply_cancellation(order: &mut Order, signal: &PaymentSignal) {
    order.payment_status = PaymentStatus::Failed;
    order.status = OrderStatus::Cancelled;
    order.status_history.push(StatusHistoryEntry::new(
        OrderStatus::Cancelled,
        Some(cancellation_note(signal)),
    ));
    order.updated_at = Utc::now();
}

// =============================================================================
// Reconciler
// =============================================================================

/// Applies signals and performs the side effects that follow a confirmation.
#[derive(Clone)]
pub struct PaymentReconciler {
    store: Arc<dyn PaymentStore>,
    notifier: BoxedPushNotifier,
}

impl PaymentReconciler {
    pub fn new(store: Arc<dyn PaymentStore>, notifier: BoxedPushNotifier) -> Self {
        Self { store, notifier }
    }

    pub async fn reconcile(&self, signal: &PaymentSignal) -> ShopResult<ReconcileOutcome> {
        let outcome = self.store.apply_payment(signal).await?;

        match &outcome {
            ReconcileOutcome::Confirmed { order, shortfalls } => {
                if shortfalls.is_empty() {
                    info!(
                        order_id = %order.id,
                        provider = signal.provider.name(),
                        source = signal.source.as_str(),
                        "Payment confirmed"
                    );
                } else {
                    warn!(
                        order_id = %order.id,
                        provider = signal.provider.name(),
                        shortfalls = shortfalls.len(),
                        "Payment confirmed with stock shortfall, order flagged for review"
                    );
                }
                self.notify_confirmed(order).await;
            }
            ReconcileOutcome::Duplicate { order } => {
                info!(order_id = %order.id, source = signal.source.as_str(), "Duplicate payment confirmation ignored");
            }
            ReconcileOutcome::MarkedFailed { order } => {
                info!(order_id = %order.id, provider = signal.provider.name(), "Payment marked failed");
            }
            ReconcileOutcome::Cancelled { order } => {
                info!(order_id = %order.id, provider = signal.provider.name(), "Payment cancelled");
            }
            ReconcileOutcome::Ignored { order, reason } => {
                info!(order_id = %order.id, ?reason, outcome = ?signal.outcome, "Payment signal ignored");
            }
            ReconcileOutcome::OrderNotFound => {
                warn!(lookup = %signal.lookup, provider = signal.provider.name(), "Payment signal for unknown order");
            }
        }

        Ok(outcome)
    }

    async fn notify_confirmed(&self, order: &OrderRef) {
        let message = PushMessage::order_confirmed(order.id, &order.order_number);
        if let Err(e) = self.notifier.send_to_user(order.user_id, &message).await {
            warn!(order_id = %order.id, error = %e, "Order confirmation push failed");
        }
    }
}
