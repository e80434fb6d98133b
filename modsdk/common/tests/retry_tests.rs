use common::{Attempt, Finished, RetryPolicy, RetryScheduler};
use std::cell::Cell;

fn policy() -> RetryPolicy {
    RetryPolicy {
        initial_delay: 10.0,
        retry_delay: 5.0,
        max_attempts: 3,
    }
}

#[test]
fn test_waits_for_initial_delay() {
    let mut scheduler = RetryScheduler::new();
    scheduler.schedule("gate", policy());
    let runs = Cell::new(0);

    for _ in 0..9 {
        assert!(scheduler.tick(1.0, |_| { runs.set(runs.get() + 1); Attempt::Done }).is_empty());
    }
    assert_eq!(runs.get(), 0);

    let finished = scheduler.tick(1.0, |_| { runs.set(runs.get() + 1); Attempt::Done });
    assert_eq!(finished, vec![Finished::Completed("gate")]);
    assert_eq!(runs.get(), 1);
    assert!(scheduler.is_idle());
}

#[test]
fn test_blocked_retries_then_completes() {
    let mut scheduler = RetryScheduler::new();
    scheduler.schedule(1u32, policy());
    let blocked_left = Cell::new(1);
    let action = |_: &u32| {
        if blocked_left.get() > 0 {
            blocked_left.set(blocked_left.get() - 1);
            Attempt::Blocked
        } else {
            Attempt::Done
        }
    };

    assert!(scheduler.tick(10.0, action).is_empty());
    assert_eq!(scheduler.pending(), 1);
    assert!(scheduler.tick(4.0, action).is_empty());
    assert_eq!(scheduler.tick(1.0, action), vec![Finished::Completed(1)]);
}

#[test]
fn test_gives_up_after_max_blocked_attempts() {
    let mut scheduler = RetryScheduler::new();
    scheduler.schedule("door", policy());
    let attempts = Cell::new(0);
    let action = |_: &&str| {
        attempts.set(attempts.get() + 1);
        Attempt::Blocked
    };

    assert!(scheduler.tick(10.0, action).is_empty());
    assert!(scheduler.tick(5.0, action).is_empty());
    assert_eq!(scheduler.tick(5.0, action), vec![Finished::GaveUp("door")]);
    assert_eq!(attempts.get(), 3);
    assert!(scheduler.is_idle());
}

#[test]
fn test_jobs_are_independent() {
    let mut scheduler = RetryScheduler::new();
    scheduler.schedule("a", policy());
    scheduler.schedule(
        "b",
        RetryPolicy {
            initial_delay: 2.0,
            ..policy()
        },
    );

    let finished = scheduler.tick(2.0, |_| Attempt::Done);
    assert_eq!(finished, vec![Finished::Completed("b")]);
    assert_eq!(scheduler.pending(), 1);
}
