//! Value types shared by the storefront components.

pub mod contact;
pub mod id;
pub mod money;
pub mod status;

pub use contact::{AddressError, ContactError, CustomerContact, Email, PhoneNumber, ShippingAddress};
pub use id::*;
pub use money::Money;
pub use status::*;
