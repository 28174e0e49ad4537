//! Duet client core
//!
//! Message lifecycle, retention and screen-lock logic for a two-party chat,
//! written against a [`store::DocumentStore`]. The [`hub::Hub`] turns store
//! writes into live subscriptions; [`view::ConversationView`] wires one open
//! conversation to them.

pub mod directory;
pub mod error;
pub mod hub;
pub mod lifecycle;
pub mod lock;
pub mod normalize;
pub mod retention;
pub mod settings;
pub mod store;
pub mod view;

pub use error::{CoreError, CoreResult};
pub use hub::{Hub, Subscription};
pub use store::DocumentStore;
