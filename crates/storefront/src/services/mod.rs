//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `cart` - per-cart store with optimistic concurrency and stock checks
//! - `voucher` - voucher validation with stale-response suppression
//! - `checkout` - the checkout state machine and order submission
//! - `notification` - post-order notification queue and sinks
//! - `eco_impact` - product sustainability profile resolution

pub mod cart;
pub mod checkout;
pub mod eco_impact;
pub mod notification;
pub mod voucher;

pub use cart::{CartError, CartStore};
pub use checkout::{
    CheckoutError, CheckoutOrchestrator, CheckoutRequest, CheckoutSettings, RetryPolicy,
    VoucherClaim,
};
pub use eco_impact::EcoImpactResolver;
pub use notification::{
    DispatchError, LoggingSink, NotificationDispatcher, NotificationSink, OrderNotification,
    WebhookSink,
};
pub use voucher::{
    ValidationTracker, ValidationTrackers, VoucherCheck, VoucherError, VoucherValidator,
};
