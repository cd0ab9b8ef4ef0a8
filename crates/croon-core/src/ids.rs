//! Branded identifier newtypes.
//!
//! The remote platform hands out plain integers; wrapping them keeps a
//! guild id from ever being passed where a channel id is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($(#[doc = $doc:literal] $name:ident($inner:ty)),* $(,)?) => {
        $(
            #[doc = $doc]
            #[derive(
                Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
                Serialize, Deserialize,
            )]
            #[serde(transparent)]
            pub struct $name($inner);

            impl $name {
                /// Wrap a raw platform identifier.
                #[must_use]
                pub const fn new(raw: $inner) -> Self {
                    Self(raw)
                }

                /// The raw identifier value.
                #[must_use]
                pub const fn get(self) -> $inner {
                    self.0
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    self.0.fmt(f)
                }
            }

            impl From<$inner> for $name {
                fn from(raw: $inner) -> Self {
                    Self(raw)
                }
            }
        )*
    };
}

numeric_id! {
    #[doc = "A community/server context on the remote platform."]
    GuildId(u64),
    #[doc = "A text or voice channel within a guild."]
    ChannelId(u64),
    #[doc = "A user account on the remote platform."]
    UserId(u64),
    #[doc = "One partition of the gateway connection."]
    ShardId(u32),
}

/// An audio-processing node, identified by its `host:port` pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Build a node id from its address parts.
    #[must_use]
    pub fn new(host: &str, port: u16) -> Self {
        Self(format!("{host}:{port}"))
    }

    /// The `host:port` form of this id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
