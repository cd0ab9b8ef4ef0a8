//! # croon-audio
//!
//! The audio cluster bridge: keeps a pool of per-guild player sessions
//! and routes voice-control traffic between the gateway's shard
//! transport and remote audio-processing nodes.
//!
//! - [`player::PlayerRegistry`] — at most one [`player::Player`] per
//!   guild; mutated only by the bridge, read by command handlers
//! - [`node::NodeConnection`] — one remote node: websocket control
//!   channel (node-local reconnect) + REST track resolution
//! - [`bridge::ClusterBridge`] — constructed post-ready, bound to the
//!   live session identity and the orchestrator's packet-send
//!   capability; rebuilt wholesale on session-level reconnect
//!
//! One node's failure never affects guilds mapped to other nodes: an
//! unavailable node is skipped by the balancer and keeps retrying on its
//! own schedule.

#![deny(unsafe_code)]

pub mod bridge;
pub mod errors;
pub mod node;
pub mod player;

pub use bridge::ClusterBridge;
pub use errors::AudioError;
pub use node::{NodeConnection, NodeEvent, TrackInfo};
pub use player::{Player, PlayerRegistry};
