//! Status enums for orders and checkout attempts.

use serde::{Deserialize, Serialize};

/// Status of an order as the storefront reports it.
///
/// Further lifecycle (shipped, delivered) belongs to the order store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderStatus {
    /// Persisted by the order store and handed to notification.
    Created,
    /// Persisted, but the post-order notification could not be handed off.
    NotificationFailed,
    /// The attempt did not produce an order.
    Failed,
}

impl OrderStatus {
    /// Whether the shopper should see the order as placed.
    #[must_use]
    pub const fn is_placed(&self) -> bool {
        matches!(self, Self::Created | Self::NotificationFailed)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::NotificationFailed => write!(f, "notification_failed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// State of a single checkout attempt.
///
/// ```text
/// Draft -> Submitting -> Created
///                     -> RejectedByBackend
///                     -> TransportFailed -> Submitting (explicit user retry)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum CheckoutState {
    #[default]
    Draft,
    Submitting,
    Created,
    RejectedByBackend,
    TransportFailed,
}

impl CheckoutState {
    /// Whether `next` is a legal successor of `self`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft | Self::TransportFailed, Self::Submitting)
                | (
                    Self::Submitting,
                    Self::Created | Self::RejectedByBackend | Self::TransportFailed
                )
        )
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Created | Self::RejectedByBackend)
    }
}

impl std::fmt::Display for CheckoutState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Submitting => write!(f, "submitting"),
            Self::Created => write!(f, "created"),
            Self::RejectedByBackend => write!(f, "rejected_by_backend"),
            Self::TransportFailed => write!(f, "transport_failed"),
        }
    }
}

/// How the shopper intends to pay.
///
/// The storefront records the choice; the payment gateway moves the money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PaymentMethod {
    /// Cash on delivery.
    Cod,
    BankTransfer,
    Card,
    EWallet,
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cod => write!(f, "cod"),
            Self::BankTransfer => write!(f, "bank_transfer"),
            Self::Card => write!(f, "card"),
            Self::EWallet => write!(f, "e_wallet"),
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cod" => Ok(Self::Cod),
            "bank_transfer" | "bankTransfer" => Ok(Self::BankTransfer),
            "card" => Ok(Self::Card),
            "e_wallet" | "eWallet" => Ok(Self::EWallet),
            _ => Err(format!("invalid payment method: {s}")),
        }
    }
}
