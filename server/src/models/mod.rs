// server/src/models/mod.rs

//! Marketplace entities and the value types that travel with them.

pub mod banking;
pub mod book;
pub mod delivery;
pub mod notification;
pub mod order;
pub mod payment;
pub mod profile;

pub use banking::{BankingDetails, BankingDetailsInput, BankingSummary};
pub use book::{Book, BookFilter};
pub use delivery::{
  Address, CourierKind, Parcel, ProviderHealth, Quote, QuoteOption, QuoteRequest, Shipment, ShipmentRequest,
  TrackingEvent, TrackingInfo,
};
pub use notification::{NewNotification, Notification, NotificationKind};
pub use order::{commit_deadline_from, CancellationActor, NewOrder, Order, OrderStatus, OrderUpdate, RefundStatus};
pub use payment::{NewPayment, Payment, PaymentSplit};
pub use profile::Profile;
