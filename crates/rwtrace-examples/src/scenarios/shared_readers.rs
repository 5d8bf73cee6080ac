use std::thread::Builder;

use parking_lot::{Condvar, Mutex};
use rwtrace::LoggingRwLock;

use crate::LockFactory;

pub fn run(factory: LockFactory) -> Result<(), String> {
    let lock = factory.build("db");
    let builders = (0..2).map(|reader| Builder::new().name(format!("db.reader.{reader}")));
    let readers = read_together(&lock, builders)?;

    println!("done: expect {} traces on stderr, each ending in for \"db\"", readers * 2);
    Ok(())
}

/// Countdown that releases every waiter once `expected` parties have arrived
/// or withdrawn.
struct Rendezvous {
    outstanding: Mutex<usize>,
    complete: Condvar,
}

impl Rendezvous {
    fn new(expected: usize) -> Self {
        Self {
            outstanding: Mutex::new(expected),
            complete: Condvar::new(),
        }
    }

    fn arrive_and_wait(&self) {
        let mut outstanding = self.outstanding.lock();
        *outstanding = outstanding.saturating_sub(1);
        if *outstanding == 0 {
            self.complete.notify_all();
        }
        while *outstanding > 0 {
            self.complete.wait(&mut outstanding);
        }
    }

    fn withdraw(&self, parties: usize) {
        let mut outstanding = self.outstanding.lock();
        *outstanding = outstanding.saturating_sub(parties);
        if *outstanding == 0 {
            self.complete.notify_all();
        }
    }
}

/// Spawns one reader per builder; they all hold the read lock at the same
/// time before releasing it. Returns how many readers ran.
fn read_together(
    lock: &LoggingRwLock,
    builders: impl IntoIterator<Item = Builder>,
) -> Result<usize, String> {
    let builders: Vec<Builder> = builders.into_iter().collect();
    let expected = builders.len();
    let all_holding = Rendezvous::new(expected);

    std::thread::scope(|scope| {
        let mut readers = Vec::with_capacity(expected);
        for builder in builders {
            let all_holding = &all_holding;
            let spawned = builder.spawn_scoped(scope, move || {
                lock.read_lock();
                all_holding.arrive_and_wait();
                let name = std::thread::current().name().unwrap_or("<unnamed>").to_owned();
                println!("{name} holds the read lock alongside its peers");
                // SAFETY: taken shared just above on this thread.
                unsafe { lock.read_unlock() };
            });
            match spawned {
                Ok(handle) => readers.push(handle),
                Err(e) => {
                    // Readers already running must not wait for ones that never start.
                    all_holding.withdraw(expected - readers.len());
                    return Err(format!("failed to spawn reader thread: {e}"));
                }
            }
        }

        let count = readers.len();
        for handle in readers {
            handle
                .join()
                .map_err(|_| "reader thread panicked".to_owned())?;
        }
        Ok(count)
    })
}
