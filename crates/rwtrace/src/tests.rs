use super::*;
use lock_api::RawRwLock as _;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

const FIXTURE_HEADER: &str = "thread 'fixture' (ThreadId(0)) stack backtrace:";

fn fixture_capture() -> Arc<FixedCapture> {
    Arc::new(FixedCapture::new([
        FIXTURE_HEADER,
        "   0: app::handler",
        "             at src/handler.rs:10:5",
    ]))
}

fn traced(label: &str) -> (LoggingRwLock, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let lock = LoggingRwLock::named(label)
        .with_sink(sink.clone())
        .with_capture(fixture_capture());
    (lock, sink)
}

fn first_line(block: &str) -> &str {
    block.lines().next().expect("emission block must have a first line")
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn exclusive_round_trip_without_label() {
    let (lock, sink) = traced("");

    lock.write_lock();
    // SAFETY: held exclusively just above.
    unsafe { lock.write_unlock() };

    let blocks = sink.take();
    assert_eq!(blocks.len(), 2);
    assert_eq!(first_line(&blocks[0]), format!("{FIXTURE_HEADER} obtaining lock"));
    assert_eq!(first_line(&blocks[1]), format!("{FIXTURE_HEADER} releasing lock"));
    assert!(blocks.iter().all(|block| !block.contains('"')));
    assert!(blocks.iter().all(|block| block.ends_with("src/handler.rs:10:5\n")));
}

#[test]
fn label_is_appended_to_first_line() {
    let (lock, sink) = traced("cache-lock");

    lock.write_lock();
    // SAFETY: held exclusively just above.
    unsafe { lock.write_unlock() };

    let blocks = sink.take();
    assert!(first_line(&blocks[0]).ends_with(r#"obtaining lock for "cache-lock""#));
    assert!(first_line(&blocks[1]).ends_with(r#"releasing lock for "cache-lock""#));
}

#[test]
fn set_label_applies_to_later_emissions() {
    let (mut lock, sink) = traced("");
    assert_eq!(lock.label(), "");
    lock.set_label("renamed");
    assert_eq!(lock.label(), "renamed");

    lock.read_lock();
    // SAFETY: held shared just above.
    unsafe { lock.read_unlock() };

    let blocks = sink.take();
    assert!(first_line(&blocks[0]).ends_with(r#"obtaining read lock for "renamed""#));
    assert!(first_line(&blocks[1]).ends_with(r#"releasing read lock for "renamed""#));
}

#[test]
fn concurrent_readers_each_emit_in_order() {
    let sink = Arc::new(MemorySink::new());
    let lock = LoggingRwLock::named("db").with_sink(sink.clone());
    let both_holding = Barrier::new(2);

    std::thread::scope(|scope| {
        for reader in 0..2 {
            let lock = &lock;
            let both_holding = &both_holding;
            std::thread::Builder::new()
                .name(format!("reader-{reader}"))
                .spawn_scoped(scope, move || {
                    lock.read_lock();
                    // Both readers hold the lock at the same time here.
                    both_holding.wait();
                    // SAFETY: held shared just above.
                    unsafe { lock.read_unlock() };
                })
                .expect("spawn reader thread");
        }
    });

    let blocks = sink.take();
    assert_eq!(blocks.len(), 4);
    assert!(blocks.iter().all(|block| first_line(block).contains(r#"for "db""#)));

    for reader in ["reader-0", "reader-1"] {
        let header = format!("thread '{reader}'");
        let own: Vec<&str> = blocks
            .iter()
            .map(|block| first_line(block))
            .filter(|line| line.starts_with(&header))
            .collect();
        assert_eq!(own.len(), 2, "{reader} must emit exactly twice");
        assert!(own[0].ends_with(r#"obtaining read lock for "db""#));
        assert!(own[1].ends_with(r#"releasing read lock for "db""#));
    }
}

#[test]
fn mutual_exclusion_is_preserved() {
    let (lock, sink) = traced("counter");
    let readers = AtomicUsize::new(0);
    let writers = AtomicUsize::new(0);
    let violations = AtomicUsize::new(0);
    let max_readers = AtomicUsize::new(0);
    const THREADS: usize = 6;
    const ROUNDS: usize = 40;

    std::thread::scope(|scope| {
        for thread in 0..THREADS {
            let (lock, readers, writers, violations, max_readers) =
                (&lock, &readers, &writers, &violations, &max_readers);
            scope.spawn(move || {
                for round in 0..ROUNDS {
                    if (thread + round) % 3 == 0 {
                        lock.write_lock();
                        if writers.fetch_add(1, Ordering::SeqCst) != 0
                            || readers.load(Ordering::SeqCst) != 0
                        {
                            violations.fetch_add(1, Ordering::SeqCst);
                        }
                        std::thread::yield_now();
                        writers.fetch_sub(1, Ordering::SeqCst);
                        // SAFETY: held exclusively above.
                        unsafe { lock.write_unlock() };
                    } else {
                        lock.read_lock();
                        let now = readers.fetch_add(1, Ordering::SeqCst) + 1;
                        max_readers.fetch_max(now, Ordering::SeqCst);
                        if writers.load(Ordering::SeqCst) != 0 {
                            violations.fetch_add(1, Ordering::SeqCst);
                        }
                        std::thread::yield_now();
                        readers.fetch_sub(1, Ordering::SeqCst);
                        // SAFETY: held shared above.
                        unsafe { lock.read_unlock() };
                    }
                }
            });
        }
    });

    assert_eq!(violations.load(Ordering::SeqCst), 0);
    assert!(max_readers.load(Ordering::SeqCst) >= 1);
    assert_eq!(sink.len(), THREADS * ROUNDS * 2);
}

#[test]
fn obtaining_is_emitted_before_blocking() {
    let (lock, sink) = traced("gate");
    let acquired = AtomicBool::new(false);

    lock.write_lock();
    std::thread::scope(|scope| {
        let (lock, acquired) = (&lock, &acquired);
        scope.spawn(move || {
            lock.write_lock();
            acquired.store(true, Ordering::SeqCst);
            // SAFETY: held exclusively just above.
            unsafe { lock.write_unlock() };
        });

        // The waiter's intent shows up while this thread still holds the lock.
        wait_until(|| sink.len() == 2);
        assert!(!acquired.load(Ordering::SeqCst));
        assert!(first_line(&sink.blocks()[1]).ends_with(r#"obtaining lock for "gate""#));

        // SAFETY: held exclusively since before the scope.
        unsafe { lock.write_unlock() };
    });

    assert!(acquired.load(Ordering::SeqCst));
    let phrases: Vec<String> = sink.take().iter().map(|b| first_line(b).to_owned()).collect();
    assert_eq!(phrases.len(), 4);
    assert!(phrases[2].ends_with(r#"releasing lock for "gate""#));
    assert!(phrases[3].ends_with(r#"releasing lock for "gate""#));
}

#[test]
fn read_locker_is_silent() {
    let (lock, sink) = traced("db");
    let locker = lock.read_locker();

    for _ in 0..3 {
        locker.lock();
    }
    assert!(lock.is_locked());
    assert!(!lock.try_write_lock());
    for _ in 0..3 {
        // SAFETY: one unlock per lock above.
        unsafe { locker.unlock() };
    }
    assert!(!lock.is_locked());

    // Only the failed attempt above was traced.
    assert_eq!(sink.len(), 1);
    assert!(first_line(&sink.take()[0]).ends_with(r#"trying lock for "db""#));

    // The lock is free again, same as after matching direct read_lock/read_unlock calls.
    assert!(lock.try_write_lock());
    // SAFETY: held exclusively just above.
    unsafe { lock.write_unlock() };
    assert_eq!(sink.len(), 2);
}

#[test]
fn read_locker_coordinates_with_exclusive_holders() {
    let (lock, _sink) = traced("");
    let locker = lock.read_locker();

    lock.write_lock();
    let entered = AtomicBool::new(false);
    std::thread::scope(|scope| {
        let entered = &entered;
        scope.spawn(move || {
            locker.lock();
            entered.store(true, Ordering::SeqCst);
            // SAFETY: held shared just above.
            unsafe { locker.unlock() };
        });
        std::thread::sleep(Duration::from_millis(20));
        assert!(!entered.load(Ordering::SeqCst));
        // SAFETY: held exclusively since before the scope.
        unsafe { lock.write_unlock() };
    });
    assert!(entered.load(Ordering::SeqCst));
}

#[test]
fn confirmations_follow_each_operation() {
    let (lock, sink) = traced("");
    let lock = lock.confirm_transitions(true);

    lock.write_lock();
    // SAFETY: held exclusively just above.
    unsafe { lock.write_unlock() };
    lock.read_lock();
    // SAFETY: held shared just above.
    unsafe { lock.read_unlock() };

    let phrases: Vec<String> = sink
        .take()
        .iter()
        .map(|block| first_line(block).trim_start_matches(FIXTURE_HEADER).to_owned())
        .collect();
    assert_eq!(
        phrases,
        [
            " obtaining lock",
            " obtained lock",
            " releasing lock",
            " released lock",
            " obtaining read lock",
            " obtained read lock",
            " releasing read lock",
            " released read lock",
        ]
    );
}

#[test]
fn try_locks_announce_attempts() {
    let (lock, sink) = traced("");

    assert!(lock.try_read_lock());
    assert!(!lock.try_write_lock());
    // SAFETY: held shared by the successful attempt above.
    unsafe { lock.read_unlock() };

    let phrases: Vec<String> = sink.take().iter().map(|b| first_line(b).to_owned()).collect();
    assert!(phrases[0].ends_with(" trying read lock"));
    assert!(phrases[1].ends_with(" trying lock"));
    assert!(phrases[2].ends_with(" releasing read lock"));
}

#[test]
fn guards_emit_release_on_drop() {
    let (raw, sink) = traced("value");
    let lock = rwlock_with(raw, 5);

    {
        let mut guard = lock.write();
        *guard += 1;
    }
    assert_eq!(*lock.read(), 6);

    let phrases: Vec<String> = sink.take().iter().map(|b| first_line(b).to_owned()).collect();
    assert_eq!(phrases.len(), 4);
    assert!(phrases[0].ends_with(r#"obtaining lock for "value""#));
    assert!(phrases[1].ends_with(r#"releasing lock for "value""#));
    assert!(phrases[2].ends_with(r#"obtaining read lock for "value""#));
    assert!(phrases[3].ends_with(r#"releasing read lock for "value""#));
}

#[test]
fn exclusive_locker_traces_like_direct_calls() {
    fn critical_section<L: Locker>(locker: &L, work: impl FnOnce()) {
        locker.lock();
        work();
        // SAFETY: taken on the line above.
        unsafe { locker.unlock() };
    }

    let (lock, sink) = traced("");
    let mut ran = false;
    critical_section(&lock, || ran = true);

    assert!(ran);
    let blocks = sink.take();
    assert_eq!(blocks.len(), 2);
    assert!(first_line(&blocks[0]).ends_with(" obtaining lock"));
    assert!(first_line(&blocks[1]).ends_with(" releasing lock"));
}

#[test]
fn options_select_native_capture() {
    let sink = Arc::new(MemorySink::new());
    let options = TraceOptions::default()
        .capture(CaptureOptions::default().max_frames(std::num::NonZeroUsize::MIN))
        .confirm_transitions(true);
    let lock = LoggingRwLock::named("native")
        .with_sink(sink.clone())
        .with_options(options);

    lock.read_lock();
    // SAFETY: held shared just above.
    unsafe { lock.read_unlock() };

    let blocks = sink.take();
    assert_eq!(blocks.len(), 4);
    let first = first_line(&blocks[0]);
    assert!(first.starts_with("thread '"));
    assert!(first.ends_with(r#"obtaining read lock for "native""#));
    assert!(blocks[0].lines().count() >= 2);
}

#[test]
fn default_lock_round_trips_through_stderr_sink() {
    let lock: RwLock<u8> = RwLock::new(3);
    *lock.write() += 1;
    assert_eq!(*lock.read(), 4);
    assert!(!lock.is_locked());

    let lock = rwlock("stderr", Vec::new());
    lock.write().push("entry");
    assert_eq!(lock.read().as_slice(), ["entry"]);
    assert_eq!(lock.into_inner(), vec!["entry"]);
}

#[test]
fn introspection_emits_nothing() {
    let (raw, sink) = traced("db");
    let lock = rwlock_with(raw, 0u8);

    assert!(!lock.is_locked());
    assert!(!lock.is_locked_exclusive());
    assert!(sink.is_empty());

    let guard = lock.write();
    sink.take();
    assert!(lock.is_locked());
    assert!(lock.is_locked_exclusive());
    assert!(sink.is_empty());
    drop(guard);

    let guard = lock.read();
    sink.take();
    assert!(lock.is_locked());
    assert!(!lock.is_locked_exclusive());
    assert!(sink.is_empty());
    drop(guard);
}

#[test]
fn options_keep_injected_capture() {
    let sink = Arc::new(MemorySink::new());
    let options = TraceOptions::default()
        .capture(CaptureOptions::default().skip_frames(usize::MAX))
        .confirm_transitions(true);
    let lock = LoggingRwLock::named("x")
        .with_sink(sink.clone())
        .with_capture(fixture_capture())
        .with_options(options);

    lock.read_lock();
    // SAFETY: held shared just above.
    unsafe { lock.read_unlock() };

    let blocks = sink.take();
    assert_eq!(blocks.len(), 4);
    assert_eq!(
        first_line(&blocks[0]),
        format!(r#"{FIXTURE_HEADER} obtaining read lock for "x""#)
    );
    assert!(first_line(&blocks[1]).ends_with(r#"obtained read lock for "x""#));
}

#[test]
fn capture_options_apply_without_injected_capture() {
    let sink = Arc::new(MemorySink::new());
    let lock = LoggingRwLock::new()
        .with_sink(sink.clone())
        .capture_options(CaptureOptions::default().skip_frames(usize::MAX));

    lock.write_lock();
    // SAFETY: held exclusively just above.
    unsafe { lock.write_unlock() };

    let blocks = sink.take();
    assert_eq!(blocks.len(), 2);
    assert!(blocks[0].contains("<backtrace unavailable: "));
    assert!(first_line(&blocks[0]).ends_with(" obtaining lock"));
}

#[test]
fn debug_output_names_label() {
    let (lock, _sink) = traced("db");
    let rendered = format!("{lock:?}");
    assert!(rendered.contains(r#"label: "db""#));
}
