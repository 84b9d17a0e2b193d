//! Command sources: where the workload comes from.
//!
//! Two interchangeable variants exist — [`RuntimeGenerator`] synthesizes
//! commands from the statistical configuration, [`ScriptSource`] replays a
//! textual trace. Both emit one [`Command`] per call until the workload is
//! exhausted.

mod runtime;
mod script;

pub use runtime::RuntimeGenerator;
pub use script::ScriptSource;

use crate::command::Command;

/// Run state observed by the controller, fed back to the source at every
/// command boundary. Only the runtime generator consumes it (for
/// `limit_bytes`); replay sources ignore it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Feedback {
    /// Worker 0's cumulative successfully-inserted bytes.
    pub insert_bytes: u64,
}

pub trait CommandSource: Send {
    fn next_command(&mut self, feedback: &Feedback) -> Option<Command>;

    /// Total number of commands when known up front (replay sources).
    fn len_hint(&self) -> Option<u64> {
        None
    }
}

/// Builds the record payload for one operation: the operation counter in the
/// leading bytes so records are distinguishable, padded with a fixed pattern.
pub(crate) fn make_record(stamp: u64, size: usize, out: &mut Vec<u8>) {
    out.clear();
    out.resize(size, 0);
    let stamp_bytes = stamp.to_le_bytes();
    let prefix = stamp_bytes.len().min(size);
    out[..prefix].copy_from_slice(&stamp_bytes[..prefix]);
    for (i, byte) in out.iter_mut().enumerate().skip(prefix) {
        *byte = i as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_carries_stamp_and_pattern() {
        let mut rec = Vec::new();
        make_record(0x0102_0304, 16, &mut rec);
        assert_eq!(&rec[..8], &0x0102_0304u64.to_le_bytes());
        assert_eq!(rec[8], 8);
        assert_eq!(rec[15], 15);
    }

    #[test]
    fn record_shorter_than_stamp() {
        let mut rec = Vec::new();
        make_record(u64::MAX, 3, &mut rec);
        assert_eq!(rec, vec![0xff, 0xff, 0xff]);
    }
}
