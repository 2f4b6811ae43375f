//! Tunable knobs for a [`crate::Switch`], independent of any file or
//! environment loader (that layering lives in the demo CLI, not here).

use std::time::Duration;

use crate::framing::DEFAULT_MAX_FRAME_SIZE;

/// The receive queue capacity named in §3 of the data model: 1024 buffered
/// payloads per stream before backpressure becomes fatal to the connection.
pub const DEFAULT_RECEIVE_QUEUE_CAPACITY: usize = 1024;

/// The default cap on simultaneous connections to the same peer.
pub const DEFAULT_MAX_CONNECTIONS_PER_PEER: usize = 3;

const ONE_HOUR: Duration = Duration::from_secs(3600);

/// Configuration for a [`crate::Switch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// How long a stream may sit idle before it is closed locally. Zero
    /// disables the idle timer.
    pub stream_max_inactive: Duration,

    /// How long a connection may sit idle (no frame read or written) before
    /// its transport is closed. Zero disables the idle timer.
    pub connection_max_inactive: Duration,

    /// Maximum simultaneous connections accepted or dialled to the same peer.
    /// Zero means unlimited.
    pub max_connections_per_peer: usize,

    /// Ceiling on a single frame's declared length, rejected before any
    /// payload byte is read or allocated.
    pub max_frame_size: u64,

    /// Capacity of each stream's bounded receive queue.
    pub receive_queue_capacity: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            stream_max_inactive: ONE_HOUR,
            connection_max_inactive: ONE_HOUR,
            max_connections_per_peer: DEFAULT_MAX_CONNECTIONS_PER_PEER,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            receive_queue_capacity: DEFAULT_RECEIVE_QUEUE_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let options = Options::default();
        assert_eq!(options.stream_max_inactive, ONE_HOUR);
        assert_eq!(options.connection_max_inactive, ONE_HOUR);
        assert_eq!(options.max_connections_per_peer, 3);
        assert_eq!(options.max_frame_size, 16 * 1024 * 1024);
        assert_eq!(options.receive_queue_capacity, 1024);
    }
}
