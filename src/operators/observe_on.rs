use crate::error::Error;
use crate::runtime;
use crate::scheduler::{self, SchedulerRef, WorkerRef};
use crate::stream::{Observer, Operator, Subscriber};
use crate::subscription::{CompositeSubscription, Subscription};
use crossbeam_deque::{Injector, Steal};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Moves delivery of every signal onto one worker, preserving order.
pub struct ObserveOn {
    scheduler: SchedulerRef,
}

impl ObserveOn {
    pub fn new(scheduler: SchedulerRef) -> Self {
        Self { scheduler }
    }
}

impl fmt::Debug for ObserveOn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserveOn").finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Operator<T, T> for ObserveOn {
    fn call(&self, downstream: Subscriber<T>) -> Subscriber<T> {
        let worker = match self.scheduler.create_worker() {
            Ok(worker) => worker,
            Err(e) => {
                downstream.on_error(e);
                return closed(downstream);
            }
        };
        if let Err(e) = downstream.add(scheduler::worker_subscription(&worker)) {
            runtime::report_error(e);
        }

        let drain = Arc::new(Drain {
            downstream: downstream.clone(),
            worker,
            queue: Injector::new(),
            pending: AtomicUsize::new(0),
        });
        Subscriber::sharing(DrainObserver { drain }, &downstream)
    }
}

/// An upstream subscriber that is cancelled from the start, so the
/// producer stops at its first `is_unsubscribed` check.
fn closed<T: Send + 'static>(downstream: Subscriber<T>) -> Subscriber<T> {
    let subscriptions = Arc::new(CompositeSubscription::new());
    // an empty composite has no cleanup to fail
    let _ = subscriptions.unsubscribe();
    Subscriber::with_subscriptions(downstream, subscriptions)
}

enum Signal<T> {
    Next(T),
    Error(Error),
    Completed,
}

/// Queue plus drain loop. `pending` counts signals pushed but not yet
/// delivered; whoever moves it off zero schedules the drain, and the drain
/// keeps going until it brings it back to zero.
struct Drain<T> {
    downstream: Subscriber<T>,
    worker: WorkerRef,
    queue: Injector<Signal<T>>,
    pending: AtomicUsize,
}

impl<T: Send + 'static> Drain<T> {
    fn push(self: &Arc<Self>, signal: Signal<T>) {
        self.queue.push(signal);
        if self.pending.fetch_add(1, Ordering::AcqRel) == 0 {
            let drain = self.clone();
            self.worker.schedule(Box::new(move || drain.run()));
        }
    }

    fn run(&self) {
        loop {
            // every counted signal is already in the queue
            let signal = loop {
                match self.queue.steal() {
                    Steal::Success(signal) => break signal,
                    Steal::Retry | Steal::Empty => std::hint::spin_loop(),
                }
            };
            self.deliver(signal);

            if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                return;
            }
        }
    }

    fn deliver(&self, signal: Signal<T>) {
        match signal {
            Signal::Next(value) => self.downstream.on_next(value),
            Signal::Error(error) => self.downstream.on_error(error),
            Signal::Completed => self.downstream.on_completed(),
        }
    }
}

struct DrainObserver<T> {
    drain: Arc<Drain<T>>,
}

impl<T: Send + 'static> Observer<T> for DrainObserver<T> {
    fn on_next(&self, value: T) {
        self.drain.push(Signal::Next(value));
    }

    fn on_error(&self, error: Error) {
        self.drain.push(Signal::Error(error));
    }

    fn on_completed(&self) {
        self.drain.push(Signal::Completed);
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::error::Error;
    use crate::scheduler::{ComputationScheduler, SingleThreadScheduler};
    use crate::stream::{FnObserver, Observer, Stream, Subscriber};
    use crossbeam_channel::bounded;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_delivers_in_order_on_worker() {
        let scheduler = Arc::new(SingleThreadScheduler::new().unwrap());
        let loop_thread = scheduler.thread_id();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = bounded(1);

        let s = seen.clone();
        Stream::from_iter(0..1000)
            .observe_on(scheduler.clone())
            .subscribe_observer(
                FnObserver::new(move |x: i32| s.lock().push((x, thread::current().id())))
                    .with_completed(move || tx.send(thread::current().id()).unwrap()),
            );

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), loop_thread);
        let seen = seen.lock();
        assert_eq!(seen.len(), 1000);
        assert!(seen.iter().enumerate().all(|(i, &(x, t))| x == i as i32 && t == loop_thread));
        scheduler.shutdown();
    }

    #[test]
    fn test_concurrent_producers_single_terminal() {
        let config = Config::builder().num_threads(4).build().unwrap();
        let scheduler = Arc::new(ComputationScheduler::new(&config).unwrap());
        let count = Arc::new(Mutex::new(0usize));
        let terminals = Arc::new(Mutex::new(0usize));
        let (tx, rx) = bounded(4);

        let stream = Stream::create(|s: Subscriber<usize>| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let s = s.clone();
                    thread::spawn(move || {
                        for i in 0..250 {
                            s.on_next(i);
                        }
                        s.on_completed();
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
        });

        let (c, t) = (count.clone(), terminals.clone());
        stream.observe_on(scheduler.clone()).subscribe_observer(
            FnObserver::new(move |_: usize| *c.lock() += 1).with_completed(move || {
                *t.lock() += 1;
                tx.send(()).unwrap();
            }),
        );

        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        // give a stray second terminal the chance to show up
        thread::sleep(Duration::from_millis(20));
        assert_eq!(*terminals.lock(), 1);
        assert!(*count.lock() >= 250);
        scheduler.shutdown();
    }

    #[test]
    fn test_error_is_delivered_after_values() {
        let scheduler = Arc::new(SingleThreadScheduler::new().unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = bounded(1);

        let stream = Stream::create(|s: Subscriber<i32>| {
            s.on_next(1);
            s.on_next(2);
            s.on_error(Error::stream("broken"));
            s.on_next(3);
        });
        let s = seen.clone();
        stream.observe_on(scheduler.clone()).subscribe_observer(
            FnObserver::new(move |x: i32| s.lock().push(x))
                .with_error(move |e| tx.send(e.to_string()).unwrap()),
        );

        let message = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(message.contains("broken"));
        assert_eq!(*seen.lock(), vec![1, 2]);
        scheduler.shutdown();
    }
}
