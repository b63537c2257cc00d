//! Stress test - many tasks
//!
//! Spawns a large number of tasks that each yield and sleep a few times.
//!
//! Usage: `stress [num_tasks] [threads]`

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use synca::{go, sleep_ms, yield_now, Runtime, RuntimeConfig};

fn main() {
    println!("=== synca Stress Test ===\n");

    let mut args = std::env::args().skip(1);
    let num_tasks: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(10_000);
    let threads: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(8);

    let config = RuntimeConfig::from_env()
        .num_threads(threads)
        .stack_size(64 * 1024)
        .pool_name("stress");
    // Coro::new() sizes stacks from the process-wide config
    if let Err(e) = synca::install_config(config.clone()) {
        eprintln!("config rejected: {}", e);
        std::process::exit(1);
    }
    let mut runtime = match Runtime::new(config) {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("cannot start runtime: {}", e);
            std::process::exit(1);
        }
    };

    println!("Spawning {} tasks on {} threads...", num_tasks, threads);
    let completed = Arc::new(AtomicU64::new(0));
    let start = Instant::now();

    runtime.block_on(|| {
        for i in 0..num_tasks {
            let completed = completed.clone();
            let spawned = go(move || {
                for _ in 0..10 {
                    let _ = yield_now();
                }
                let _ = sleep_ms(1);
                completed.fetch_add(1, Ordering::Relaxed);
            });
            if let Err(e) = spawned {
                eprintln!("spawn {} failed: {}", i, e);
                break;
            }
            if (i + 1) % 1000 == 0 {
                print!("\rSpawned: {}/{}", i + 1, num_tasks);
            }
        }
        println!();
        println!("Spawn time: {:?}", start.elapsed());
    });

    let elapsed = start.elapsed();
    let count = completed.load(Ordering::Relaxed);
    println!("\nCompleted: {}/{}", count, num_tasks);
    println!("Total time: {:?}", elapsed);
    if elapsed.as_secs_f64() > 0.0 {
        println!("Throughput: {:.0} tasks/sec", count as f64 / elapsed.as_secs_f64());
    }

    println!("\n=== Stress Test Complete ===");
}

