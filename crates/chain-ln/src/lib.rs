//! Lightning network support for the custodial wallet engine.
//!
//! The node itself is a remote custodial API reached over HTTP; this crate
//! holds the API seam, its reqwest client and the channel-open state machine.

pub mod api;
pub mod error;
pub mod lifecycle;

pub use api::{
    ClosedChannel, HttpLightningClient, Invoice, LightningApi, OpenedChannel, Payment,
};
pub use error::LightningError;
pub use lifecycle::{candidate_nodes, ChannelState};
