//! Client-side record stores.

pub mod collection;

pub use collection::{CollectionStore, FetchTicket};
