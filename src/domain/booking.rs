use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    PaymentPending,
    PaymentFailed,
    Confirmed,
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
    Rescheduled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::PaymentPending => "PAYMENT_PENDING",
            BookingStatus::PaymentFailed => "PAYMENT_FAILED",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Scheduled => "SCHEDULED",
            BookingStatus::InProgress => "IN_PROGRESS",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::NoShow => "NO_SHOW",
            BookingStatus::Rescheduled => "RESCHEDULED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(BookingStatus::Pending),
            "PAYMENT_PENDING" => Some(BookingStatus::PaymentPending),
            "PAYMENT_FAILED" => Some(BookingStatus::PaymentFailed),
            "CONFIRMED" => Some(BookingStatus::Confirmed),
            "SCHEDULED" => Some(BookingStatus::Scheduled),
            "IN_PROGRESS" => Some(BookingStatus::InProgress),
            "COMPLETED" => Some(BookingStatus::Completed),
            "CANCELLED" => Some(BookingStatus::Cancelled),
            "NO_SHOW" => Some(BookingStatus::NoShow),
            "RESCHEDULED" => Some(BookingStatus::Rescheduled),
            _ => None,
        }
    }

    pub fn allowed_next(&self) -> &'static [BookingStatus] {
        use BookingStatus::*;
        match self {
            Pending => &[PaymentPending, Cancelled],
            PaymentPending => &[Confirmed, Cancelled],
            Confirmed => &[Scheduled, Cancelled],
            Scheduled => &[InProgress, Cancelled, Rescheduled, NoShow],
            InProgress => &[Completed, Cancelled],
            NoShow => &[Rescheduled],
            Rescheduled => &[Scheduled, Cancelled],
            Completed | Cancelled | PaymentFailed => &[],
        }
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    /// Whether a permanently failed payment moves the booking to
    /// PAYMENT_FAILED. Later bookings only have their payment status marked.
    /// This is a payment-side write and not part of the booking lifecycle.
    pub fn mirrors_payment_failure(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::PaymentPending)
    }
}

/// String-level check used where statuses arrive from storage or requests.
/// Unknown statuses on either side are rejected.
pub fn validate_booking_state_transition(current: &str, next: &str) -> bool {
    match (BookingStatus::parse(current), BookingStatus::parse(next)) {
        (Some(from), Some(to)) => from.can_transition_to(to),
        _ => false,
    }
}
