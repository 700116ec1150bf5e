//! Realtime sync: the push connection, event routing, and the bridge from
//! resource endpoints into collection stores.

pub mod connection;
pub mod mutation;
pub mod resource;
pub mod router;

pub use connection::{
    hub_url_with_token, ConnectionError, ConnectionManager, ConnectionSettings, ConnectionState,
};
pub use mutation::{DeleteAllOutcome, MutationCoordinator, MutationKind, PendingMutation};
pub use resource::ResourceSync;
pub use router::{EventRouter, Handler, PushEvent, Subscription};
