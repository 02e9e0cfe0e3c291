//! Throughput harness for the watch and protection paths.
//!
//! ## Usage
//!
//! ```sh
//! cargo run -p sentinel-core --release --example watch_throughput
//! ```
//!
//! ## Metrics
//!
//! - Watch polls per second (one tick over every registered watch)
//! - Intercepted writes applied per second
//! - Protection lookups per second with hardcore enabled
//!
//! Frame budget context: at 60 frames per second a tick has roughly 16 ms,
//! and the engine's share of that should stay well under a millisecond.

#![allow(clippy::pedantic)]

use sentinel_core::{Engine, EngineConfig, RamBackend};

use crossbeam_channel as _;
use proptest as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;
use tracing as _;

use std::time::{Duration, Instant};

const NUM_WATCHES: u32 = 100;
const NUM_ACCESSES: u32 = 10_000;
const NUM_REGIONS: u32 = 100;
const FRAME_BUDGET: Duration = Duration::from_micros(16_667);

#[derive(Debug, Clone, Copy)]
struct BenchmarkResult {
    name: &'static str,
    operations: u64,
    elapsed: Duration,
}

impl BenchmarkResult {
    fn per_second(&self) -> f64 {
        self.operations as f64 / self.elapsed.as_secs_f64()
    }

    fn micros_per_op(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1e6 / self.operations as f64
    }
}

fn engine_with_watches() -> Engine<RamBackend> {
    let mut engine = Engine::new(RamBackend::new(), EngineConfig::default());
    engine.initialize();
    for i in 0..NUM_WATCHES {
        engine.add_watch(i * 0x1000, 4, None);
    }
    engine.tick();
    engine
}

fn benchmark_tick(duration: Duration) -> BenchmarkResult {
    let mut engine = engine_with_watches();
    let mut ticks = 0u64;
    let start = Instant::now();
    while start.elapsed() < duration {
        let address = (ticks as u32 % NUM_WATCHES) * 0x1000;
        engine.backend_mut().set_word(address, ticks as u32);
        engine.tick();
        ticks += 1;
    }
    BenchmarkResult {
        name: "tick",
        operations: ticks * u64::from(NUM_WATCHES),
        elapsed: start.elapsed(),
    }
}

fn benchmark_intercepted_writes() -> BenchmarkResult {
    let mut engine = engine_with_watches();
    let span = NUM_WATCHES * 0x1000;
    let start = Instant::now();
    for i in 0..NUM_ACCESSES {
        engine.backend_mut().store_word((i * 4) % span, i);
        engine.process_pending_accesses();
    }
    BenchmarkResult {
        name: "intercepted_write",
        operations: u64::from(NUM_ACCESSES),
        elapsed: start.elapsed(),
    }
}

fn benchmark_protection_lookup() -> BenchmarkResult {
    let mut engine = Engine::new(RamBackend::new(), EngineConfig::default());
    engine.initialize();
    engine.set_hardcore(true);
    for i in 0..NUM_REGIONS {
        engine.add_protected_region(i * 0x2000, 0x1000);
    }

    let mut hits = 0u64;
    let start = Instant::now();
    for i in 0..NUM_ACCESSES {
        if engine.is_address_protected(i * 0x100) {
            hits += 1;
        }
    }
    let elapsed = start.elapsed();
    assert!(hits > 0, "protected regions should be hit");
    BenchmarkResult {
        name: "protection_lookup",
        operations: u64::from(NUM_ACCESSES),
        elapsed,
    }
}

fn main() {
    println!("sentinel-core watch throughput");
    println!("==============================");
    println!("watches: {NUM_WATCHES}, regions: {NUM_REGIONS}, accesses: {NUM_ACCESSES}");
    println!();

    let results = [
        benchmark_tick(Duration::from_secs(2)),
        benchmark_intercepted_writes(),
        benchmark_protection_lookup(),
    ];

    for result in &results {
        println!(
            "{:<20} {:>14.0} ops/s {:>10.3} us/op",
            result.name,
            result.per_second(),
            result.micros_per_op()
        );
    }

    let tick = &results[0];
    let per_tick = Duration::from_secs_f64(tick.micros_per_op() * f64::from(NUM_WATCHES) / 1e6);
    let share = per_tick.as_secs_f64() / FRAME_BUDGET.as_secs_f64() * 100.0;
    println!();
    println!("tick over {NUM_WATCHES} watches: {per_tick:?} ({share:.3}% of a 60 Hz frame)");
}
