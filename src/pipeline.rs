// ABOUTME: Write pipeline staging encoded requests and coalescing them into socket writes
// ABOUTME: Enforces the single-writer discipline and the large-argument escape hatch

use crate::bridge::EngineBridge;
use crate::codec::{CodecError, Encodable};
use crate::frame;
use crate::messages::ArgsBody;
use bytes::{Bytes, BytesMut};

/// Byte-sum threshold at or above which a request's arguments travel
/// out-of-band through the native engine instead of inline in the encoded
/// message. Keeps per-message encoding bounded and spares large vectors a
/// round-trip through the codec.
pub const MAX_REQUEST_ARGS_LEN: usize = 65_536;

/// Staging area for outgoing frames.
///
/// Frames accumulate back-to-back in a single buffer between flushes. A
/// flush takes the whole buffer by move and leaves a fresh one behind, so
/// submissions that land mid-write are picked up by the next flush and FIFO
/// order on the wire is preserved. The buffer is deliberately unbounded;
/// callers apply backpressure by awaiting their submission futures.
#[derive(Debug, Default)]
pub struct WritePipeline {
    staging: BytesMut,
    write_in_progress: bool,
}

impl WritePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the framed encoding of `msg` to the staging buffer.
    pub fn stage<M: Encodable>(&mut self, msg: &M) -> Result<(), CodecError> {
        frame::encode(msg, &mut self.staging)
    }

    /// Begin a flush: take everything staged so far, or `None` when a write
    /// is already in flight or nothing is pending.
    pub fn begin_flush(&mut self) -> Option<Bytes> {
        if self.write_in_progress || self.staging.is_empty() {
            return None;
        }
        self.write_in_progress = true;
        Some(self.staging.split().freeze())
    }

    /// Finish the in-flight write. The caller re-checks `begin_flush`
    /// afterwards to pick up anything staged during the write.
    pub fn end_flush(&mut self) {
        self.write_in_progress = false;
    }

    pub fn has_pending(&self) -> bool {
        !self.staging.is_empty()
    }
}

/// Apply the large-argument decision: inline below the threshold, interned
/// on the native side at or above it.
pub fn encode_args(args: Vec<Bytes>, bridge: &dyn EngineBridge) -> ArgsBody {
    let total: usize = args.iter().map(Bytes::len).sum();
    if total >= MAX_REQUEST_ARGS_LEN {
        ArgsBody::Pointer(bridge.store_args(args))
    } else {
        ArgsBody::Inline(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{BridgeError, Value};
    use crate::messages::{CommandRequest, RequestKind, RequestType};
    use crate::otel::OpenTelemetryConfig;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingBridge {
        stored: AtomicUsize,
    }

    impl EngineBridge for CountingBridge {
        fn start_transport(&self) -> Result<PathBuf, BridgeError> {
            Err(BridgeError::Startup("not a real engine".to_string()))
        }

        fn store_args(&self, _args: Vec<Bytes>) -> u64 {
            self.stored.fetch_add(1, Ordering::SeqCst);
            0x1000
        }

        fn materialize(&self, _resp_pointer: u64) -> Result<Value, BridgeError> {
            Ok(Value::Nil)
        }

        fn init_otel(&self, _config: &OpenTelemetryConfig) -> Result<(), BridgeError> {
            Ok(())
        }

        fn release_cursor(&self, _cursor_id: Bytes) {}
    }

    fn request(callback_idx: u32) -> CommandRequest {
        CommandRequest {
            callback_idx,
            kind: RequestKind::Command {
                request_type: RequestType::Ping,
                args: ArgsBody::Inline(Vec::new()),
            },
            route: None,
        }
    }

    #[test]
    fn flush_takes_buffer_wholesale() {
        let mut pipeline = WritePipeline::new();
        pipeline.stage(&request(0)).unwrap();
        pipeline.stage(&request(1)).unwrap();

        let batch = pipeline.begin_flush().expect("pending bytes");
        assert!(!batch.is_empty());
        assert!(!pipeline.has_pending());

        // While the write is in flight, new frames land in the fresh buffer
        // and a second flush is refused.
        pipeline.stage(&request(2)).unwrap();
        assert!(pipeline.begin_flush().is_none());

        pipeline.end_flush();
        let second = pipeline.begin_flush().expect("staged during write");
        assert!(!second.is_empty());
        pipeline.end_flush();
        assert!(pipeline.begin_flush().is_none());
    }

    #[test]
    fn staged_frames_preserve_submission_order() {
        let mut pipeline = WritePipeline::new();
        let mut expected = BytesMut::new();
        for idx in 0..5 {
            pipeline.stage(&request(idx)).unwrap();
            frame::encode(&request(idx), &mut expected).unwrap();
        }
        assert_eq!(pipeline.begin_flush().unwrap(), expected.freeze());
    }

    #[test]
    fn small_args_stay_inline() {
        let bridge = CountingBridge::default();
        let args = vec![Bytes::from_static(b"key"), Bytes::from_static(b"value")];
        let body = encode_args(args.clone(), &bridge);
        assert_eq!(body, ArgsBody::Inline(args));
        assert_eq!(bridge.stored.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn threshold_sum_goes_by_pointer() {
        let bridge = CountingBridge::default();
        let args = vec![
            Bytes::from_static(b"k"),
            Bytes::from(vec![b'v'; MAX_REQUEST_ARGS_LEN - 1]),
        ];
        let body = encode_args(args, &bridge);
        assert_eq!(body, ArgsBody::Pointer(0x1000));
        assert_eq!(bridge.stored.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn just_below_threshold_stays_inline() {
        let bridge = CountingBridge::default();
        let args = vec![Bytes::from(vec![b'v'; MAX_REQUEST_ARGS_LEN - 1])];
        assert!(matches!(encode_args(args, &bridge), ArgsBody::Inline(_)));
        assert_eq!(bridge.stored.load(Ordering::SeqCst), 0);
    }
}
