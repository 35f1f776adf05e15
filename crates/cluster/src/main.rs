//! Headless demo driver: boots an in-process cluster and logs frame
//! statistics. Worker count, frame count, and an optional JSON config file
//! come from the environment (`WORKERS`, `FRAMES`, `CONFIG`).

use cluster::{
    run_cluster, ClusterConfig, DomainBounds, FrameSink, NullControls, SeedMode, WorkerFrame,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn env_or(name: &str, default: u64) -> u64 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Default scene: a block of fluid in the left third of a 10 x 10 box.
fn dam_break(workers: usize) -> ClusterConfig {
    ClusterConfig {
        name: "dam-break".to_string(),
        workers,
        domain: DomainBounds { min: [0.0, 0.0], max: [10.0, 10.0] },
        seed: SeedMode::Grid {
            spacing: 0.1,
            region: DomainBounds { min: [0.0, 0.0], max: [3.5, 6.0] },
        },
        gravity: 9.0,
        smoothing_radius: 0.2,
        rest_density: 1.0,
        particle_mass: 1.0,
        k: 0.1,
        dq_fraction: 0.3,
        viscosity_c: 0.1,
        time_step: 1.0 / 60.0,
        steps_per_frame: 4,
        capacity_factor: 4.0,
    }
}

struct LoggingSink {
    frame: u64,
}

impl FrameSink for LoggingSink {
    fn present(&mut self, frames: Vec<WorkerFrame>) {
        if self.frame % 60 == 0 {
            let per_worker: Vec<usize> = frames.iter().map(|f| f.particle_count()).collect();
            let total: usize = per_worker.iter().sum();
            tracing::info!("frame {}: {} particles {:?}", self.frame, total, per_worker);
        }
        self.frame += 1;
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cluster=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let workers = env_or("WORKERS", 3) as usize;
    let frames = env_or("FRAMES", 600);

    let config = match std::env::var("CONFIG") {
        Ok(path) => match ClusterConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(1);
            }
        },
        Err(_) => dam_break(workers),
    };

    let mut controls = NullControls;
    let mut sink = LoggingSink { frame: 0 };
    match run_cluster(&config, &mut controls, &mut sink, frames) {
        Ok(presented) => tracing::info!("simulation complete: {} frames", presented),
        Err(e) => {
            eprintln!("simulation failed: {e}");
            std::process::exit(1);
        }
    }
}
