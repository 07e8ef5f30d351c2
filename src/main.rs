//! Debug binary for lock-coupling workloads.
//!
//! Diagnoses hangs/deadlocks in concurrent list operations. A watchdog thread
//! reports any worker that has not made progress for two seconds, with the
//! operation and key it is stuck on.
//!
//! Run with:
//! ```bash
//! RUST_LOG=couplist=debug cargo run --release --features tracing,mimalloc
//! ```

#![allow(clippy::unwrap_used)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use couplist::{BatchConfig, BatchExecutor, List, ListError, Operation};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const STALL_MS: u64 = 2000;

// =============================================================================
// Tracing
// =============================================================================

#[cfg(feature = "tracing")]
fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_names(true)
                .with_target(true)
                .compact(),
        )
        .with(filter)
        .try_init();
}

#[cfg(not(feature = "tracing"))]
const fn init_tracing() {}

// =============================================================================
// Thread progress tracking for hang detection
// =============================================================================

struct ThreadProgress {
    /// Current operation index for each thread
    current_op: Vec<AtomicUsize>,
    /// Current key being processed by each thread
    current_key: Vec<AtomicI64>,
    /// Last time each thread made progress
    last_progress_ms: Vec<AtomicU64>,
    /// Whether each thread is done
    done: Vec<AtomicBool>,
    /// Start time
    start: Instant,
}

impl ThreadProgress {
    fn new(num_threads: usize) -> Self {
        Self {
            current_op: (0..num_threads).map(|_| AtomicUsize::new(0)).collect(),
            current_key: (0..num_threads).map(|_| AtomicI64::new(0)).collect(),
            last_progress_ms: (0..num_threads).map(|_| AtomicU64::new(0)).collect(),
            done: (0..num_threads).map(|_| AtomicBool::new(false)).collect(),
            start: Instant::now(),
        }
    }

    fn update(&self, thread_id: usize, op: usize, key: i32) {
        self.current_op[thread_id].store(op, Ordering::Relaxed);
        self.current_key[thread_id].store(i64::from(key), Ordering::Relaxed);
        self.last_progress_ms[thread_id]
            .store(self.start.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    fn mark_done(&self, thread_id: usize) {
        self.done[thread_id].store(true, Ordering::Relaxed);
    }

    fn report_stuck(&self, timeout_ms: u64) -> Vec<(usize, usize, i64, u64)> {
        let now_ms = self.start.elapsed().as_millis() as u64;
        let mut stuck = Vec::new();

        for i in 0..self.done.len() {
            if self.done[i].load(Ordering::Relaxed) {
                continue;
            }
            let last = self.last_progress_ms[i].load(Ordering::Relaxed);
            if now_ms.saturating_sub(last) > timeout_ms {
                stuck.push((
                    i,
                    self.current_op[i].load(Ordering::Relaxed),
                    self.current_key[i].load(Ordering::Relaxed),
                    now_ms - last,
                ));
            }
        }
        stuck
    }

    fn all_done(&self) -> bool {
        self.done.iter().all(|d| d.load(Ordering::Relaxed))
    }
}

/// Poll `progress` until every thread is done or `stop` is raised.
fn spawn_watchdog(progress: Arc<ThreadProgress>, stop: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) {
            thread::sleep(Duration::from_millis(500));
            for (tid, op, key, stall_ms) in &progress.report_stuck(STALL_MS) {
                eprintln!("!!! STUCK: Thread {tid} at op {op} key={key} for {stall_ms}ms");
            }
            if progress.all_done() {
                break;
            }
        }
    })
}

fn banner(title: &str) {
    println!("\n{}", "=".repeat(80));
    println!("{title}");
    println!("{}", "=".repeat(80));
}

// =============================================================================
// 01: Disjoint inserts, then finds
// =============================================================================

fn run_01_disjoint(threads: usize, ops_per_thread: usize) {
    banner(&format!("01: DISJOINT INSERT+FIND ({threads} threads, {ops_per_thread} ops/thread)"));

    let list: Arc<List<u64>> = Arc::new(List::new());
    let progress = Arc::new(ThreadProgress::new(threads));
    let stop = Arc::new(AtomicBool::new(false));
    let watchdog = spawn_watchdog(Arc::clone(&progress), Arc::clone(&stop));

    let start = Instant::now();

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let list = Arc::clone(&list);
            let progress = Arc::clone(&progress);
            thread::spawn(move || {
                // Interleave threads so every walk crosses everyone else's keys.
                for i in 0..ops_per_thread {
                    let key = (i * threads + t) as i32;
                    progress.update(t, i, key);

                    let op_start = Instant::now();
                    if let Err(e) = list.insert(key, key as u64) {
                        eprintln!("[T{t:02}] ERROR insert {key}: {e}");
                    }
                    let op_elapsed = op_start.elapsed();
                    if op_elapsed > Duration::from_millis(100) {
                        eprintln!("[T{t:02}] SLOW insert {key} took {op_elapsed:?}");
                    }
                }
                for i in 0..ops_per_thread {
                    let key = (i * threads + t) as i32;
                    progress.update(t, ops_per_thread + i, key);
                    if list.find(key) != Ok(true) {
                        eprintln!("[T{t:02}] MISSING {key}");
                    }
                }

                progress.mark_done(t);
            })
        })
        .collect();

    for h in handles {
        let _ = h.join();
    }
    stop.store(true, Ordering::Relaxed);
    let _ = watchdog.join();

    let elapsed = start.elapsed();
    let total = threads * ops_per_thread * 2;
    println!(
        "01 DONE: {total} ops in {elapsed:?} ({:.0} ops/sec), len={:?}, check={:?}",
        total as f64 / elapsed.as_secs_f64(),
        list.len(),
        list.check_invariants(),
    );
}

// =============================================================================
// 02: Contended churn over a small key space
// =============================================================================

fn run_02_churn(threads: usize, ops_per_thread: usize, key_space: i32) {
    banner(&format!(
        "02: CHURN ({threads} threads, {ops_per_thread} ops/thread, {key_space} keys)"
    ));

    let list: Arc<List<u64>> = Arc::new(List::new());
    let progress = Arc::new(ThreadProgress::new(threads));
    let stop = Arc::new(AtomicBool::new(false));
    let watchdog = spawn_watchdog(Arc::clone(&progress), Arc::clone(&stop));

    let start = Instant::now();

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let list = Arc::clone(&list);
            let progress = Arc::clone(&progress);
            thread::spawn(move || {
                let mut state = (t as u64 + 1).wrapping_mul(0x517c_c1b7_2722_0a95);
                let add_one = |v: &u64| (*v as i32).wrapping_add(1);

                for op in 0..ops_per_thread {
                    state = state
                        .wrapping_mul(6_364_136_223_846_793_005)
                        .wrapping_add(1);
                    let key = ((state >> 33) % key_space as u64) as i32;
                    progress.update(t, op, key);

                    let result = match (state >> 60) % 4 {
                        0 => list.insert(key, state).map(|()| 0),
                        1 => list.remove(key).map(|()| 0),
                        2 => list.update(key, state).map(|_| 0),
                        _ => list.compute(key, &add_one),
                    };
                    match result {
                        Ok(_)
                        | Err(
                            ListError::DuplicateKey | ListError::KeyAbsent | ListError::NotFound,
                        ) => {}
                        Err(e) => eprintln!("[T{t:02}] ERROR op {op} key={key}: {e}"),
                    }
                }

                progress.mark_done(t);
            })
        })
        .collect();

    for h in handles {
        let _ = h.join();
    }
    stop.store(true, Ordering::Relaxed);
    let _ = watchdog.join();

    let elapsed = start.elapsed();
    let total = threads * ops_per_thread;
    println!(
        "02 DONE: {total} ops in {elapsed:?} ({:.0} ops/sec), len={:?}, check={:?}",
        total as f64 / elapsed.as_secs_f64(),
        list.len(),
        list.check_invariants(),
    );
}

// =============================================================================
// 03: Teardown racing in-flight operations
// =============================================================================

fn run_03_teardown_race(threads: usize) {
    banner(&format!("03: TEARDOWN RACE ({threads} threads)"));

    let list: Arc<List<u64>> = Arc::new(List::new());
    for k in 0..10_000 {
        list.insert(k, 0).unwrap();
    }

    let progress = Arc::new(ThreadProgress::new(threads));
    let stop = Arc::new(AtomicBool::new(false));
    let watchdog = spawn_watchdog(Arc::clone(&progress), Arc::clone(&stop));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let list = Arc::clone(&list);
            let progress = Arc::clone(&progress);
            thread::spawn(move || {
                let mut completed: usize = 0;
                for op in 0.. {
                    let key = ((op * 7919 + t) % 10_000) as i32;
                    progress.update(t, op, key);
                    if list.find(key) == Err(ListError::ListFreed) {
                        break;
                    }
                    completed += 1;
                }
                progress.mark_done(t);
                completed
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(50));
    let start = Instant::now();
    let torn = list.teardown();
    let teardown_elapsed = start.elapsed();

    let completed: usize = handles.into_iter().map(|h| h.join().unwrap_or(0)).sum();
    stop.store(true, Ordering::Relaxed);
    let _ = watchdog.join();

    println!("03 DONE: teardown={torn:?} in {teardown_elapsed:?}, {completed} finds before it");
}

// =============================================================================
// 04: Batches on a bounded pool
// =============================================================================

fn run_04_batches(rounds: usize, batch_len: usize) {
    banner(&format!("04: BATCHES ({rounds} rounds x {batch_len} descriptors)"));

    let config = BatchConfig::from_env();
    let executor = match BatchExecutor::new(&config) {
        Ok(executor) => executor,
        Err(e) => {
            eprintln!("04 SKIPPED: {e}");
            return;
        }
    };
    let list: List<u64> = List::new();

    let start = Instant::now();
    let mut failures: usize = 0;

    for round in 0..rounds {
        let mut ops: Vec<Operation<u64>> = (0..batch_len)
            .map(|i| {
                let key = (i % 64) as i32;
                match (round + i) % 4 {
                    0 => Operation::insert(key, i as u64),
                    1 => Operation::remove(key),
                    2 => Operation::contains(key),
                    _ => Operation::compute(key, |v: &u64| *v as i32),
                }
            })
            .collect();

        executor.execute(&list, &mut ops);
        failures += ops.iter().filter(|op| op.result.is_none()).count();
    }

    let elapsed = start.elapsed();
    println!(
        "04 DONE: {} descriptors on {} workers in {elapsed:?}, unfilled={failures}, check={:?}",
        rounds * batch_len,
        executor.workers(),
        list.check_invariants(),
    );
}

// =============================================================================
// Main
// =============================================================================

fn main() {
    init_tracing();

    eprintln!("couplist Lock-Coupling Hang Detector");
    eprintln!("====================================");
    eprintln!("Watchdog will report any thread stuck for >2 seconds.");
    eprintln!();

    for run in 1..=3 {
        eprintln!("\n--- Run {run}/3 ---");
        run_01_disjoint(8, 2_000);
        run_02_churn(8, 50_000, 256);
        run_03_teardown_race(8);
        run_04_batches(200, 256);
    }

    eprintln!("\nAll tests completed!");
}
