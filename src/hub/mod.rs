//! Per-media broadcast hubs
//!
//! A hub serializes everything that happens to one media item: viewers joining
//! and leaving, live comments being stored and broadcast, and history replays
//! sent to a single viewer. Hubs are created and retired by the
//! [`HubRegistry`](crate::registry::HubRegistry); callers talk to them through
//! a [`HubHandle`].

mod actor;
pub mod client;
mod event;
pub mod handle;

pub(crate) use actor::Hub;
pub use client::{Client, ClientId};
pub use handle::{HubHandle, HubId, Membership};
