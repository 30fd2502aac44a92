//! # Concurrency Tests using Loom
//!
//! Models the scheduler's dispatch loop: workers pop from a shared queue and
//! check a cancellation flag before every dispatch, while another thread
//! cancels the run.

#[cfg(test)]
mod tests {
    use loom::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use loom::sync::{Arc, Mutex};
    use loom::thread;
    use std::collections::VecDeque;

    const ITEMS: usize = 3;
    const WORKERS: usize = 2;

    fn worker(
        queue: Arc<Mutex<VecDeque<usize>>>,
        cancelled: Arc<AtomicBool>,
        seen: Arc<Vec<AtomicUsize>>,
    ) {
        loop {
            if cancelled.load(Ordering::Acquire) {
                break;
            }
            let next = queue.lock().unwrap().pop_front();
            let Some(item) = next else {
                break;
            };
            seen[item].fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Every instance is dispatched at most once, and whatever was not
    /// dispatched is still in the queue when the workers stop.
    #[test]
    fn test_dispatch_with_cancellation_is_exact() {
        const STACK_SIZE: usize = 8 * 1024 * 1024;

        let handle = std::thread::Builder::new()
            .name("loom-test-thread".into())
            .stack_size(STACK_SIZE)
            .spawn(|| {
                let mut builder = loom::model::Builder::new();
                builder.preemption_bound = Some(3);
                builder.check(|| {
                    let queue = Arc::new(Mutex::new((0..ITEMS).collect::<VecDeque<_>>()));
                    let cancelled = Arc::new(AtomicBool::new(false));
                    let seen = Arc::new((0..ITEMS).map(|_| AtomicUsize::new(0)).collect::<Vec<_>>());

                    let mut handles = Vec::new();
                    for _ in 0..WORKERS {
                        let queue = queue.clone();
                        let cancelled = cancelled.clone();
                        let seen = seen.clone();
                        handles.push(thread::spawn(move || worker(queue, cancelled, seen)));
                    }

                    let canceller = {
                        let cancelled = cancelled.clone();
                        thread::spawn(move || cancelled.store(true, Ordering::Release))
                    };

                    for handle in handles {
                        handle.join().unwrap();
                    }
                    canceller.join().unwrap();

                    let dispatched: usize = seen
                        .iter()
                        .map(|count| {
                            let count = count.load(Ordering::Acquire);
                            assert!(count <= 1, "an instance was dispatched twice");
                            count
                        })
                        .sum();
                    let remaining = queue.lock().unwrap().len();
                    assert_eq!(dispatched + remaining, ITEMS);
                });
            })
            .expect("failed to spawn loom test thread");

        handle.join().expect("loom test thread panicked");
    }

    /// Without cancellation the queue is always drained completely.
    #[test]
    fn test_dispatch_drains_queue() {
        loom::model(|| {
            let queue = Arc::new(Mutex::new((0..2).collect::<VecDeque<_>>()));
            let cancelled = Arc::new(AtomicBool::new(false));
            let seen = Arc::new((0..2).map(|_| AtomicUsize::new(0)).collect::<Vec<_>>());

            let handles: Vec<_> = (0..WORKERS)
                .map(|_| {
                    let (queue, cancelled, seen) = (queue.clone(), cancelled.clone(), seen.clone());
                    thread::spawn(move || worker(queue, cancelled, seen))
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            assert!(queue.lock().unwrap().is_empty());
            for count in seen.iter() {
                assert_eq!(count.load(Ordering::Acquire), 1);
            }
        });
    }
}
