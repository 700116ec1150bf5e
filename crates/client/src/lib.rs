//! LabGate Client - realtime data sync for the access-control console
//!
//! This crate keeps the admin console's record collections (cards, access
//! logs, users, labs, classes) current over one push connection per
//! session, and derives the filtered, paginated and aggregated views the
//! console renders from them.

pub mod logging;

pub mod api_client;
pub mod config;
pub mod export;
pub mod presets;
pub mod scan;
pub mod session;
pub mod storage;
pub mod stores;
pub mod sync;
pub mod view;

pub use api_client::{ApiClient, HttpResource, ResourceApi, ScanSource};
pub use config::{ClientConfig, ReconnectConfig};
pub use scan::{ScanOutcome, ScanPoller};
pub use session::{AuthSession, Session};
pub use stores::CollectionStore;
pub use sync::{ConnectionManager, ConnectionState, EventRouter, Handler, ResourceSync};
pub use view::CollectionView;
