#![allow(dead_code)]

pub use execd_test_utils::server::fast_timings;
pub use execd_test_utils::{
    NdjsonStream, RecordingEncoder, TestServer, init_tracing, parse_outputs, with_timeout,
    with_timeout_secs,
};

use execd::types::{Output, OutputStatus, OutputType};

/// Messages of every event of `output_type`, in order.
pub fn messages_of(events: &[Output], output_type: OutputType) -> Vec<String> {
    events
        .iter()
        .filter(|e| e.output_type == output_type)
        .map(|e| e.msg.clone())
        .collect()
}

/// Assert the stream ends with a single terminal event of the given shape.
pub fn assert_terminal(events: &[Output], output_type: OutputType, status: OutputStatus) {
    let last = events.last().expect("stream had no events");
    assert_eq!(last.output_type, output_type, "last event: {last:?}");
    assert_eq!(last.status, Some(status), "last event: {last:?}");
    assert_eq!(
        events.iter().filter(|e| e.is_terminal()).count(),
        1,
        "expected exactly one terminal event in {events:?}"
    );
}
