use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use ulid::Ulid;

use frontdesk::engine::{Engine, EngineOptions, ErrorKind};
use frontdesk::model::{BookingRequest, DAY_MS, Ms, ReservationFilter, RoomId};

// 2024-01-01T14:00Z
const SEASON_START: Ms = 1_704_117_600_000;

fn open_engine(name: &str, compact_threshold: u64) -> Arc<Engine> {
    let dir = std::env::temp_dir().join(format!("frontdesk_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).expect("create bench dir");
    let options = EngineOptions {
        compact_threshold,
        ..EngineOptions::default()
    };
    Arc::new(Engine::new(dir.join(format!("{name}.wal")), options).expect("open engine"))
}

/// `nights` nights in `room`, checking in `offset` days into the season.
fn stay(room_id: RoomId, offset: i64, nights: i64) -> BookingRequest {
    let start_at = SEASON_START + offset * DAY_MS;
    BookingRequest {
        room_id,
        guest_id: Some(1),
        custom_name: None,
        start_at,
        end_at: start_at + nights * DAY_MS - 2 * 3_600_000,
        nightly_rate: Decimal::from(120),
    }
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

async fn phase1_sequential() {
    let engine = open_engine("sequential", 1000);
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let t = Instant::now();
        engine
            .create(stay(1, i as i64, 1))
            .await
            .expect("back-to-back nights never conflict");
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

/// Many clients, many rooms; group commit should keep fsyncs shared.
async fn phase2_concurrent_rooms() {
    let engine = open_engine("rooms", 1000);
    let n_tasks = 20;
    let n_per_task = 200;
    let start = Instant::now();

    let handles: Vec<_> = (0..n_tasks)
        .map(|task| {
            let engine = engine.clone();
            tokio::spawn(async move {
                for j in 0..n_per_task {
                    engine
                        .create(stay(task as RoomId, j, 1))
                        .await
                        .expect("one task per room");
                }
            })
        })
        .collect();
    for h in handles {
        h.await.expect("writer task");
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    println!(
        "  {n_tasks} tasks x {n_per_task} bookings = {total} total in {:.2}s = {:.0} ops/sec",
        elapsed.as_secs_f64(),
        total as f64 / elapsed.as_secs_f64()
    );
}

/// Every client fights for the same few nights of one room.
async fn phase3_contention() {
    let engine = open_engine("contention", 1000);
    let n_clients = 64;
    let booked = Arc::new(AtomicUsize::new(0));
    let refused = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..n_clients)
        .map(|client| {
            let engine = engine.clone();
            let booked = booked.clone();
            let refused = refused.clone();
            tokio::spawn(async move {
                for attempt in 0..50 {
                    let offset = (client * 7 + attempt * 3) % 30;
                    match engine.create(stay(1, offset, 2)).await {
                        Ok(_) => booked.fetch_add(1, Ordering::Relaxed),
                        Err(e) if e.kind() == ErrorKind::Conflict => refused.fetch_add(1, Ordering::Relaxed),
                        Err(e) => panic!("unexpected failure: {e}"),
                    };
                }
            })
        })
        .collect();
    for h in handles {
        h.await.expect("client task");
    }

    let stored = engine
        .list(ReservationFilter {
            room_id: Some(1),
            window: None,
        })
        .await;
    for pair in stored.windows(2) {
        assert!(pair[0].end_at <= pair[1].start_at, "double booking detected");
    }
    println!(
        "  {} booked, {} refused in {:.2}s; ledger holds {} non-overlapping stays",
        booked.load(Ordering::Relaxed),
        refused.load(Ordering::Relaxed),
        start.elapsed().as_secs_f64(),
        stored.len()
    );
}

async fn phase4_reads_under_load() {
    let engine = open_engine("reads", 500);
    for room in 0..50 {
        for night in 0..20 {
            engine.create(stay(room, night * 2, 1)).await.expect("prefill");
        }
    }

    let stop = Arc::new(AtomicBool::new(false));
    let writers: Vec<_> = (0..4)
        .map(|w| {
            let engine = engine.clone();
            let stop = stop.clone();
            tokio::spawn(async move {
                let mut i = 0;
                while !stop.load(Ordering::Relaxed) {
                    let _ = engine.create(stay(1000 + w, i, 1)).await;
                    i += 1;
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..8)
        .map(|r| {
            let engine = engine.clone();
            tokio::spawn(async move {
                let mut latencies = Vec::with_capacity(500);
                for i in 0..500 {
                    let t = Instant::now();
                    let window = (SEASON_START + i * DAY_MS, SEASON_START + (i + 7) * DAY_MS);
                    let _ = engine
                        .list(ReservationFilter {
                            room_id: (r % 2 == 0).then_some(r as RoomId),
                            window: Some(window),
                        })
                        .await;
                    latencies.push(t.elapsed());
                }
                latencies
            })
        })
        .collect();

    let mut all = Vec::new();
    for h in readers {
        all.extend(h.await.expect("reader task"));
    }
    stop.store(true, Ordering::Relaxed);
    for h in writers {
        let _ = h.await;
    }
    print_latency("list latency", &mut all);
    println!("  {} reservations after load", engine.reservation_count());
}

#[tokio::main]
async fn main() {
    println!("=== frontdesk stress benchmark ===\n");

    println!("[phase 1] sequential bookings");
    phase1_sequential().await;

    println!("\n[phase 2] concurrent bookings across rooms");
    phase2_concurrent_rooms().await;

    println!("\n[phase 3] contention on one room");
    phase3_contention().await;

    println!("\n[phase 4] list latency under write load");
    phase4_reads_under_load().await;

    println!("\n=== done ===");
}
