//! Strata Runtime
//!
//! Minimal binary that boots the profiler and runs an instrumented
//! demo workload: a few worker threads plus a frame loop, exported as a
//! JSON trace on exit.

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use strata_profiler::{profile_scope, ProfilerConfig};

const SETTINGS_PATH: &str = "strata.settings.json";

/// Load settings from `strata.settings.json` next to the binary, falling
/// back to defaults when the file is absent.
fn load_config() -> Result<ProfilerConfig> {
    let path = Path::new(SETTINGS_PATH);
    if !path.exists() {
        return Ok(ProfilerConfig::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {SETTINGS_PATH}"))?;
    let config: ProfilerConfig =
        serde_json::from_str(&raw).with_context(|| format!("parsing {SETTINGS_PATH}"))?;
    Ok(config)
}

fn simulate_chunk_generation(seed: u64) -> u64 {
    profile_scope!("Terrain::GenerateChunk");
    let mut acc = seed;
    for i in 0..20_000u64 {
        acc = acc.wrapping_mul(6364136223846793005).wrapping_add(i);
    }
    acc
}

fn simulate_mesh_build(seed: u64) -> u64 {
    profile_scope!("Chunk::BuildMesh");
    let mut acc = seed;
    for i in 0..8_000u64 {
        acc ^= acc.rotate_left((i % 63) as u32);
    }
    acc
}

fn frame_update(frame: u64) {
    profile_scope!("Frame::Update");
    std::hint::black_box(simulate_mesh_build(frame));
    std::thread::sleep(Duration::from_millis(2));
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = load_config()?;
    let trace_path = config.output_path.clone();
    strata_profiler::init(config)?;
    let profiler = strata_profiler::global().context("profiler not initialized")?;

    tracing::info!("Strata profiler runtime");
    profiler.begin_session("demo")?;

    // Background generation workers, instrumented like engine threads.
    let workers: Vec<_> = (0..4u64)
        .map(|worker| {
            std::thread::spawn(move || {
                let mut acc = worker;
                for _ in 0..50 {
                    acc = std::hint::black_box(simulate_chunk_generation(acc));
                }
            })
        })
        .collect();

    for frame in 0..120 {
        frame_update(frame);
        if let Some(ctx) = strata_profiler::global() {
            ctx.end_frame();
        }
    }

    for worker in workers {
        if worker.join().is_err() {
            tracing::warn!("generation worker panicked");
        }
    }

    let snapshot = profiler.latest_snapshot();
    for scope in &snapshot.scopes {
        tracing::info!(
            scope = %scope.name,
            count = scope.count,
            avg_us = scope.avg_nanos / 1_000,
            max_us = scope.max_nanos / 1_000,
            "scope totals"
        );
    }
    if snapshot.dropped_samples > 0 {
        tracing::warn!(dropped = snapshot.dropped_samples, "samples were dropped");
    }

    strata_profiler::shutdown()?;
    tracing::info!(path = %trace_path.display(), "trace written");
    Ok(())
}
