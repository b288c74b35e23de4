use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing_test::traced_test;

use super::*;

#[test]
fn test_batch_completed_only_after_every_batch() {
    let counter = BatchTaskCounter::new(3);

    counter.batch_success(1);
    counter.batch_success(3);
    assert!(!counter.batch_completed());
    assert_eq!(counter.completed_count(), 2);

    counter.batch_success(2);
    assert!(counter.batch_completed());
    assert_eq!(counter.completed_count(), 3);
}

#[test]
fn test_duplicate_success_is_counted_once() {
    let counter = BatchTaskCounter::new(2);

    counter.batch_success(1);
    counter.batch_success(1);
    counter.batch_success(1);

    assert_eq!(counter.completed_count(), 1);
    assert!(!counter.batch_completed());
}

#[test]
#[traced_test]
fn test_out_of_range_batch_is_ignored() {
    let counter = BatchTaskCounter::new(1);

    counter.batch_success(0);
    counter.batch_success(2);
    assert!(!counter.batch_completed());
    assert!(logs_contain("batch index out of range"));

    counter.batch_success(1);
    assert!(counter.batch_completed());
}

#[test]
fn test_completion_is_claimed_once() {
    let counter = BatchTaskCounter::new(2);
    assert!(!counter.try_claim_completion());

    counter.batch_success(1);
    counter.batch_success(2);

    assert!(counter.try_claim_completion());
    assert!(!counter.try_claim_completion());
}

#[test]
fn test_concurrent_reporters_claim_completion_once() {
    let total = 5;
    let counter = Arc::new(BatchTaskCounter::new(total));
    let claims = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (1..=total)
        .rev()
        .map(|batch| {
            let counter = counter.clone();
            let claims = claims.clone();
            std::thread::spawn(move || {
                counter.batch_success(batch);
                if counter.try_claim_completion() {
                    claims.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(counter.batch_completed());
    assert_eq!(claims.load(Ordering::SeqCst), 1);
}
