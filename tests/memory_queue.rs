mod support;

use std::sync::Arc;

use sink_buffers::queue::MemoryQueue;
use sink_buffers::Record;
use support::TestRecord;

fn factory() -> sink_buffers::queue::RecordFactory {
    Arc::new(|| Box::new(TestRecord::default()) as Box<dyn Record>)
}

#[test]
fn push_and_eject_round_trips_through_marshal() {
    let queue = MemoryQueue::new(factory());

    queue.push(&TestRecord::new("q", 1)).unwrap();
    queue.push(&TestRecord::new("q", 2)).unwrap();
    assert_eq!(queue.len(), 2);

    let outcome = queue.eject(-1);
    assert!(outcome.error.is_none());
    assert_eq!(outcome.records.len(), 2);
    assert!(queue.is_empty());

    let values: Vec<_> = outcome
        .records
        .iter()
        .map(|r| r.exec_params())
        .collect();
    assert_eq!(values.len(), 2);
}

#[test]
fn eject_zero_returns_nothing_and_leaves_queue_untouched() {
    let queue = MemoryQueue::new(factory());
    queue.push(&TestRecord::new("q", 1)).unwrap();

    let outcome = queue.eject(0);
    assert!(outcome.records.is_empty());
    assert_eq!(queue.len(), 1);
}
