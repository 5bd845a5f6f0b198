// tests/queue_properties.rs

use proptest::prelude::*;
use promoted::process::{Enqueued, PromotionQueue, QueuedPromotion};
use promoted::types::{BuildRef, Parameters};

fn entry(n: u64) -> QueuedPromotion {
    QueuedPromotion::new(BuildRef::new("app", n), Parameters::new(), None)
}

proptest! {
    // Whatever order builds qualify in, each target waits at most once and
    // the backlog drains in first-queued order, one run at a time.
    #[test]
    fn queue_dedupes_and_drains_in_order(targets in proptest::collection::vec(0u64..6, 1..40)) {
        let queue = PromotionQueue::new();
        let mut expected: Vec<u64> = Vec::new();

        for (i, n) in targets.iter().copied().enumerate() {
            let outcome = queue.enqueue(entry(n));
            if expected.contains(&n) {
                prop_assert_eq!(outcome, Enqueued::Duplicate);
            } else {
                expected.push(n);
                let want = if i == 0 { Enqueued::Dispatch } else { Enqueued::Waiting };
                prop_assert_eq!(outcome, want);
            }
        }
        prop_assert_eq!(queue.len(), expected.len());

        // First run was dispatched by the first enqueue.
        let mut drained = Vec::new();
        loop {
            prop_assert!(!queue.is_idle(), "a run is in progress");
            let next = queue.take_next();
            prop_assert!(next.is_some());
            if let Some(next) = next {
                drained.push(next.target.number);
            }
            if !queue.finish() {
                break;
            }
        }

        prop_assert_eq!(drained, expected);
        prop_assert!(queue.is_idle());
    }
}
