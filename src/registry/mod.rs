//! Hub registry
//!
//! Maps each media key to its live hub. Hubs are created on the first
//! connection for a key and remove themselves when their last client leaves.
//!
//! # Architecture
//!
//! ```text
//!                      Arc<HubRegistry>
//!               ┌──────────────────────────────┐
//!               │ hubs: Mutex<HashMap<MediaKey, │
//!               │         HubHandle>>           │
//!               └──────────────┬───────────────┘
//!          join()              │             retire (last client gone)
//!     ┌────────────────────────┼─────────────────────────┐
//!     ▼                        ▼                         ▲
//! [Hub "abc"]             [Hub "xyz"]                    │
//!  event loop              event loop  ──────────────────┘
//! ```
//!
//! The map is the only state shared between hubs. Lookup-or-create and removal
//! both happen under its single lock, so two hubs for the same key never
//! coexist.

pub mod config;
pub mod error;
pub mod key;
pub mod store;

pub use config::HubConfig;
pub use error::RegistryError;
pub use key::MediaKey;
pub(crate) use store::HubTable;
pub use store::HubRegistry;
