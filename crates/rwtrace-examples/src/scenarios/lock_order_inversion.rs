use std::sync::{Arc, Barrier};

use rwtrace::LoggingRwLock;

use crate::LockFactory;

fn spawn_lock_order_worker(
    thread_name: &'static str,
    first: Arc<LoggingRwLock>,
    second: Arc<LoggingRwLock>,
    ready_barrier: Arc<Barrier>,
) -> Result<std::thread::JoinHandle<()>, String> {
    std::thread::Builder::new()
        .name(thread_name.to_owned())
        .spawn(move || {
            first.write_lock();
            println!("{thread_name} locked {}; waiting for peer", first.label());

            ready_barrier.wait();

            println!(
                "{thread_name} attempting {}; this should deadlock due to lock-order inversion",
                second.label()
            );
            second.write_lock();

            println!("{thread_name} unexpectedly acquired {}", second.label());
            // SAFETY: both locks were taken exclusively above on this thread.
            unsafe {
                second.write_unlock();
                first.write_unlock();
            }
        })
        .map_err(|e| format!("failed to spawn {thread_name}: {e}"))
}

pub fn run(factory: LockFactory) -> Result<(), String> {
    let left = Arc::new(factory.build("demo.shared.left"));
    let right = Arc::new(factory.build("demo.shared.right"));
    let ready_barrier = Arc::new(Barrier::new(2));

    let alpha = spawn_lock_order_worker(
        "deadlock.worker.alpha",
        Arc::clone(&left),
        Arc::clone(&right),
        Arc::clone(&ready_barrier),
    )?;
    let beta = spawn_lock_order_worker(
        "deadlock.worker.beta",
        Arc::clone(&right),
        Arc::clone(&left),
        Arc::clone(&ready_barrier),
    )?;

    println!(
        "example running. both workers should deadlock on demo.shared.left/demo.shared.right"
    );
    println!("the last `obtaining lock` trace of each worker shows where it is stuck");
    println!("press Ctrl+C to exit");

    for worker in [alpha, beta] {
        worker
            .join()
            .map_err(|_| "worker thread panicked".to_owned())?;
    }
    Ok(())
}
