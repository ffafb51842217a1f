//! 64-bit monotonic id minting.
//!
//! Ids are timestamp-ordered within a node and globally unique across the
//! cluster at the configured fleet size. The layout is a classic
//! Snowflake-shaped split, but the engine does not depend on any encoding
//! specific to a particular vendor's id library: it is 41 bits of
//! millisecond timestamp since a custom epoch, 10 bits of node number, and
//! 12 bits of per-millisecond sequence.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// 2024-01-01T00:00:00Z in milliseconds since the Unix epoch.
const CUSTOM_EPOCH_MS: i64 = 1_704_067_200_000;

const NODE_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const MAX_NODE_ID: i64 = (1 << NODE_BITS) - 1;
const MAX_SEQUENCE: i64 = (1 << SEQUENCE_BITS) - 1;

/// Process-wide id minter. Thread-safe and immutable after
/// [`IdMinter::install`] — only the node id and the internal sequence
/// counter vary; there is deliberately no way to reconfigure a running
/// minter.
pub struct IdMinter {
    node_id: i64,
    last_ms: AtomicI64,
    sequence: Mutex<i64>,
}

static MINTER: OnceLock<IdMinter> = OnceLock::new();

/// Error returned when a node id configuration is out of range.
#[derive(Debug, thiserror::Error)]
pub enum IdMinterError {
    #[error("snowflake_node_id {0} out of range 0..={MAX_NODE_ID}")]
    NodeIdOutOfRange(i64),
    #[error("id minter already installed for this process")]
    AlreadyInstalled,
}

impl IdMinter {
    fn new(node_id: i64) -> Result<Self, IdMinterError> {
        if node_id < 0 || node_id > MAX_NODE_ID {
            return Err(IdMinterError::NodeIdOutOfRange(node_id));
        }
        Ok(Self {
            node_id,
            last_ms: AtomicI64::new(0),
            sequence: Mutex::new(0),
        })
    }

    /// Install the process-wide minter for the given `snowflake_node_id`.
    /// Must be called exactly once, early in process startup (the
    /// composition root does this before any service touches ids).
    pub fn install(node_id: i64) -> Result<(), IdMinterError> {
        let minter = Self::new(node_id)?;
        MINTER
            .set(minter)
            .map_err(|_| IdMinterError::AlreadyInstalled)
    }

    /// Fetch the installed minter. Panics if [`IdMinter::install`] has not
    /// run yet — every process entry point must install before starting
    /// any service.
    pub fn global() -> &'static IdMinter {
        MINTER
            .get()
            .expect("IdMinter::install must run before ids are minted")
    }

    /// Mint the next id for this node. Monotonic within the node, ordered
    /// by wall-clock millisecond, unique across the fleet as long as no
    /// two nodes share `node_id`.
    pub fn next_id(&self) -> i64 {
        let mut seq = self.sequence.lock();
        let mut now = current_millis();

        let last = self.last_ms.load(Ordering::Acquire);
        if now == last {
            *seq = (*seq + 1) & MAX_SEQUENCE;
            if *seq == 0 {
                // Sequence exhausted this millisecond; spin to the next one.
                while now <= last {
                    now = current_millis();
                }
            }
        } else {
            *seq = 0;
        }
        self.last_ms.store(now, Ordering::Release);

        let ts = now - CUSTOM_EPOCH_MS;
        (ts << (NODE_BITS + SEQUENCE_BITS)) | (self.node_id << SEQUENCE_BITS) | *seq
    }
}

fn current_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_millis() as i64
}

/// Convenience wrapper over [`IdMinter::global`].
pub fn next_id() -> i64 {
    IdMinter::global().next_id()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn minter_for_test() -> IdMinter {
        IdMinter::new(7).unwrap()
    }

    #[test]
    fn ids_are_monotonically_increasing_within_a_node() {
        let minter = minter_for_test();
        let mut prev = minter.next_id();
        for _ in 0..10_000 {
            let id = minter.next_id();
            assert!(id > prev, "{id} should be greater than {prev}");
            prev = id;
        }
    }

    #[test]
    fn ids_are_unique_under_contention() {
        let minter = std::sync::Arc::new(minter_for_test());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let minter = minter.clone();
            handles.push(std::thread::spawn(move || {
                (0..2_000).map(|_| minter.next_id()).collect::<Vec<_>>()
            }));
        }
        let mut seen = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
    }

    #[test]
    fn rejects_out_of_range_node_id() {
        assert!(IdMinter::new(MAX_NODE_ID + 1).is_err());
        assert!(IdMinter::new(-1).is_err());
    }
}
