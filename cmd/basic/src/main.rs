//! Basic synca example
//!
//! Spawns a few tasks that yield, sleep, and await operations completed
//! by a plain OS thread.
//!
//! # Environment Variables
//!
//! - `SYNCA_FLUSH_EPRINT=1` - Flush debug output immediately (useful for crash debugging)
//! - `SYNCA_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)
//! - `SYNCA_NUM_THREADS=N` - Worker threads in the default pool

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use synca::{current_id, deferred, go, sleep_ms, yield_now, Runtime, RuntimeConfig, Trigger};
use synca::{kdebug, kinfo};

/// Stand-in for a callback-style API: answers from another thread
fn add_one_async(input: i32, done: impl FnOnce(i32) + Send + 'static) {
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(5));
        done(input + 1);
    });
}

fn recv_async(done: impl FnOnce(io::Result<String>) + Send + 'static) {
    thread::spawn(move || {
        done(Err(io::Error::new(io::ErrorKind::ConnectionAborted, "disconnected")));
    });
}

// SYNCA_LOG_LEVEL=debug SYNCA_FLUSH_EPRINT=1 cargo run -p synca-basic
fn main() {
    println!("=== synca Basic Example ===\n");

    let config = RuntimeConfig::from_env().num_threads(2).pool_name("basic");
    let mut runtime = match Runtime::new(config) {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("cannot start runtime: {}", e);
            std::process::exit(1);
        }
    };

    let completed = Arc::new(AtomicUsize::new(0));

    runtime.block_on(|| {
        kinfo!("Spawning tasks...");

        for i in 1..=3 {
            let c = completed.clone();
            let id = go(move || {
                kdebug!("[task {}] Started", i);
                for j in 0..3 {
                    kdebug!("[task {}] Iteration {}", i, j);
                    let _ = yield_now();
                }
                c.fetch_add(1, Ordering::SeqCst);
            });
            match id {
                Ok(id) => println!("Spawned yielding task {} ({})", i, id),
                Err(e) => println!("Spawn failed: {}", e),
            }
        }

        let c = completed.clone();
        let _ = go(move || {
            let answer = deferred(|t: Trigger<i32>| add_one_async(41, move |v| t.fire(v)));
            println!("[{}] add_one(41) = {}", current_id(), answer);
            c.fetch_add(1, Ordering::SeqCst);
        });

        let c = completed.clone();
        let _ = go(move || {
            let line = deferred(|t: Trigger<io::Result<String>>| recv_async(move |r| t.fire(r)));
            match line {
                Ok(line) => println!("[{}] received {}", current_id(), line),
                Err(e) => println!("[{}] recv failed: {}", current_id(), e),
            }
            c.fetch_add(1, Ordering::SeqCst);
        });

        let c = completed.clone();
        let _ = go(move || {
            if let Err(e) = sleep_ms(20) {
                println!("sleep failed: {}", e);
            }
            println!("[{}] woke after 20ms", current_id());
            c.fetch_add(1, Ordering::SeqCst);
        });

        // Two tasks are waiting on foreign threads, which the pool cannot see
        let start = std::time::Instant::now();
        while completed.load(Ordering::SeqCst) < 6 && start.elapsed() < Duration::from_secs(10) {
            thread::sleep(Duration::from_millis(10));
        }
    });

    kinfo!("{} task(s) completed", completed.load(Ordering::SeqCst));
    println!("\n=== Example Complete ===");
}
