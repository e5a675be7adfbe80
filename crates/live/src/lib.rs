//! Live status channel for the Gamma client.
//!
//! Keeps one persistent server-push connection alive (connect ->
//! process -> reconnect, forever), decodes `{type, data}` frames into
//! typed [`LiveEvent`]s and fans them out to any number of subscribers.

pub mod channel;
pub mod client;
pub mod messages;
pub mod reconnect;
pub mod subscribers;

pub use channel::{ChannelState, LiveStatusChannel};
pub use client::{Connector, FrameStream, LiveError, WsConnector};
pub use messages::{parse_frame, AssetProcessedData, LiveEvent};
pub use reconnect::ReconnectConfig;
pub use subscribers::Subscription;
