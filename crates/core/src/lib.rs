//! Losia Core - order-fulfillment types and pure algorithms.
//!
//! This crate is shared by every Losia component:
//! - `storefront` - JSON API and checkout orchestration
//! - `cli` - operator tools for codes, pricing and imagery
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no async. Anything here can be called twice with the same inputs
//! and give the same answer, which is what lets the cart page and the
//! checkout submission agree on totals.
//!
//! # Modules
//!
//! - [`types`] - IDs, money, contact details, statuses
//! - [`cart`] - cart snapshot and derived totals
//! - [`voucher`] - voucher rules and validation outcomes
//! - [`pricing`] - the pricing engine
//! - [`order`] - order draft and placed order
//! - [`order_code`] - human-friendly order codes
//! - [`demo_image`] - deterministic fallback images
//! - [`eco_impact`] - sustainability profile resolution
//! - [`clock`] - injectable time and entropy sources

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod clock;
pub mod demo_image;
pub mod eco_impact;
pub mod order;
pub mod order_code;
pub mod pricing;
pub mod types;
pub mod voucher;

pub use cart::{Cart, CartItem, CartKey};
pub use clock::{Clock, EntropySource, SystemClock, ThreadRngEntropy};
pub use demo_image::{DemoImageAssigner, DemoImageError};
pub use eco_impact::{EcoImpactProfile, EcoImpactTable, ProductTaxonomy, ProductType};
pub use order::{Order, OrderDraft};
pub use order_code::OrderCodeGenerator;
pub use pricing::{PricingBreakdown, PricingPolicy, price};
pub use types::*;
pub use voucher::{Voucher, VoucherKind, VoucherOutcome, VoucherRejection};
