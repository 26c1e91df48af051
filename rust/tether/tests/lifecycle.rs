//! End-to-end lifecycle scenarios for the shared/observer handle pair.

use std::cell::Cell;
use std::rc::Rc;

use tether::{Observer, Shared};

struct Tally {
    drops: Rc<Cell<usize>>,
    value: u32,
}

impl Tally {
    fn new(drops: &Rc<Cell<usize>>, value: u32) -> Tally {
        Tally {
            drops: drops.clone(),
            value,
        }
    }
}

impl Drop for Tally {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

#[test]
fn test_copy_move_demote_expire_scenario() {
    let drops = Rc::new(Cell::new(0));

    let a = Shared::new(Tally::new(&drops, 42));
    assert_eq!(a.value, 42);

    let mut b = a.clone();
    assert_eq!(a.use_count(), 2);

    let c = b.take();
    assert_eq!(c.use_count(), 2);
    assert!(b.is_empty());

    drop(a);
    assert_eq!(c.use_count(), 1);
    assert_eq!(drops.get(), 0);

    let w: Observer<Tally> = c.observer();
    drop(c);
    assert_eq!(drops.get(), 1);
    assert_eq!(w.use_count(), 0);
    assert!(w.expired());
    assert!(w.promote().is_none());
}

#[test]
fn test_aliasing_handles_free_aggregate_exactly_once() {
    struct Aggregate {
        _guard: Tally,
        first: u64,
        second: u64,
    }

    let drops = Rc::new(Cell::new(0));
    let aggregate = Shared::new(Aggregate {
        _guard: Tally::new(&drops, 0),
        first: 10,
        second: 20,
    });

    let first = aggregate.project(|a| &a.first);
    let second = aggregate.project(|a| &a.second);
    let second_again = second.clone();
    assert_eq!(aggregate.use_count(), 4);

    drop(aggregate);
    drop(second);
    assert_eq!(drops.get(), 0);
    assert_eq!(*first + *second_again, 30);

    drop(first);
    drop(second_again);
    assert_eq!(drops.get(), 1);
}

#[test]
fn test_observer_outlives_block_bookkeeping() {
    let drops = Rc::new(Cell::new(0));
    let shared = Shared::new(Tally::new(&drops, 1));
    let observers: Vec<Observer<Tally>> = (0..8).map(|_| shared.observer()).collect();

    drop(shared);
    assert_eq!(drops.get(), 1);
    for observer in &observers {
        assert!(observer.expired());
        assert!(observer.promote().is_none());
    }
}

#[test]
fn test_randomized_operation_sequences_destroy_exactly_once() {
    for seed in 0..64 {
        let mut rng = fastrand::Rng::with_seed(seed);
        let drops = Rc::new(Cell::new(0));

        let mut shareds = vec![Shared::new(Tally::new(&drops, 7))];
        let mut observers: Vec<Observer<Tally>> = Vec::new();
        let mut emptied = false;

        for _ in 0..400 {
            match rng.u32(0..5) {
                0 => {
                    if !shareds.is_empty() {
                        let idx = rng.usize(..shareds.len());
                        shareds.push(shareds[idx].clone());
                    }
                }
                1 => {
                    if !shareds.is_empty() {
                        let idx = rng.usize(..shareds.len());
                        drop(shareds.swap_remove(idx));
                    }
                }
                2 => {
                    if !shareds.is_empty() {
                        let idx = rng.usize(..shareds.len());
                        observers.push(shareds[idx].observer());
                    }
                }
                3 => {
                    if !observers.is_empty() {
                        let idx = rng.usize(..observers.len());
                        match observers[idx].promote() {
                            Some(promoted) => {
                                assert!(!emptied, "promotion succeeded after destruction");
                                shareds.push(promoted);
                            }
                            None => assert!(emptied, "live resource failed to promote"),
                        }
                    }
                }
                _ => {
                    if !observers.is_empty() {
                        let idx = rng.usize(..observers.len());
                        drop(observers.swap_remove(idx));
                    }
                }
            }

            if shareds.is_empty() {
                emptied = true;
            }
            assert_eq!(drops.get(), usize::from(emptied), "seed {seed}");
            for shared in &shareds {
                assert_eq!(shared.use_count(), shareds.len(), "seed {seed}");
            }
        }

        shareds.clear();
        observers.clear();
        assert_eq!(drops.get(), 1, "seed {seed}");
    }
}
