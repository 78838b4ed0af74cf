use super::amounts::amounts_match;
use super::enums::{invoice_statuses::InvoiceStatus, refund_statuses::RefundStatus};

/// Pure invoice state machine. The Postgres repository evaluates these
/// against a row freshly read under `FOR UPDATE`, so no transition is
/// ever computed from stale state. Terminal statuses never move again.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// pending -> paid.
    Transitioned,
    /// The invoice already reached paid or cancelled. Redeliveries land
    /// here and the caller acknowledges them as success.
    AlreadyTerminal(InvoiceStatus),
    /// Confirmed amount is outside the tolerance; the transition is
    /// blocked and reported, never silently accepted.
    AmountMismatch {
        expected_minor: i64,
        confirmed_minor: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancellationOutcome {
    Cancelled,
    AlreadyTerminal(InvoiceStatus),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundRequestOutcome {
    Accepted,
    NotPaid(InvoiceStatus),
    AlreadyInProgress(RefundStatus),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundCompletionOutcome {
    Completed,
    NotPending(RefundStatus),
}

pub fn apply_payment(
    status: InvoiceStatus,
    expected_minor: i64,
    confirmed_minor: i64,
) -> PaymentOutcome {
    if status.is_terminal() {
        return PaymentOutcome::AlreadyTerminal(status);
    }
    if !amounts_match(expected_minor, confirmed_minor) {
        return PaymentOutcome::AmountMismatch {
            expected_minor,
            confirmed_minor,
        };
    }
    PaymentOutcome::Transitioned
}

pub fn apply_cancellation(status: InvoiceStatus) -> CancellationOutcome {
    if status.is_terminal() {
        return CancellationOutcome::AlreadyTerminal(status);
    }
    CancellationOutcome::Cancelled
}

pub fn apply_refund_request(
    status: InvoiceStatus,
    refund_status: RefundStatus,
) -> RefundRequestOutcome {
    if status != InvoiceStatus::Paid {
        return RefundRequestOutcome::NotPaid(status);
    }
    if refund_status != RefundStatus::None {
        return RefundRequestOutcome::AlreadyInProgress(refund_status);
    }
    RefundRequestOutcome::Accepted
}

pub fn apply_refund_completion(refund_status: RefundStatus) -> RefundCompletionOutcome {
    if refund_status != RefundStatus::Pending {
        return RefundCompletionOutcome::NotPending(refund_status);
    }
    RefundCompletionOutcome::Completed
}
