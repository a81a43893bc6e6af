//! Membership domain module.
//!
//! Turns confirmed payments into membership entitlements.
//!
//! # Module Structure
//!
//! - `aggregate` - Membership aggregate, reserved balance and snapshots
//! - `tier` - Tier, billing cycle and edition
//! - `payment_method` - Payment channels
//! - `catalog` - Prices and offers consumed from the catalog
//! - `order_kind` / `classifier` - Purchase classification and calibration
//! - `order` - Orders, payment intents and payment results
//! - `window` - Purchased window calculation
//! - `invoice` / `invoice_factory` - Invoices and how confirmations produce them
//! - `projector` - Applying invoices to memberships
//! - `add_on` - Grouping and activating reserved add-on days

mod add_on;
pub(crate) mod aggregate;
pub(crate) mod catalog;
mod classifier;
mod errors;
pub(crate) mod invoice;
mod invoice_factory;
mod order;
mod order_kind;
mod payment_method;
mod projector;
mod tier;
mod window;

pub use add_on::{AddOnActivation, AddOnAggregator, AddOnGroup};
pub use aggregate::{AddOnBalance, Membership, MembershipSnapshot, SnapshotReason};
pub use catalog::{Offer, OfferKind, Price};
pub use classifier::{Calibration, ClassificationPolicy, OrderClassifier, ReviewReason, Unclassifiable};
pub use errors::SubscriptionError;
pub use invoice::{AddOnSource, Invoice};
pub use invoice_factory::{ConfirmationInvoices, InvoiceFactory};
pub use order::{Order, PaymentIntent, PaymentResult};
pub use order_kind::{Classification, DenyReason, OrderKind};
pub use payment_method::PaymentMethod;
pub use projector::MembershipProjector;
pub use tier::{Cycle, Edition, Tier};
pub use window::PurchasedWindowCalculator;
