//! Determinism harness: builds a fixed scene, steps it and prints the final
//! state hash. Two runs on any machine must print the same hash.
//!
//! Usage: `detbox [steps] [transform-log.gz]`

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use detbox::prelude::*;
use detbox::dynamics::RevoluteJointDef;
use detbox::fixed_math::HALF;

const DEFAULT_STEPS: usize = 3000;
const SETTINGS_PATH: &str = "assets/settings.ron";

fn setup_file_logging() -> String {
    // Create logs directory if it doesn't exist
    let log_dir = PathBuf::from("logs");
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("Failed to create logs directory: {e}");
    }

    // Keep only the last 25 runs
    cleanup_old_logs(&log_dir, 25);

    let now = chrono::Local::now();
    let log_filename = format!("detbox_{}.log", now.format("%Y%m%d_%H%M%S"));
    let log_path_str = log_dir.join(&log_filename).to_string_lossy().to_string();

    // One file per run
    let file_appender = RollingFileAppender::new(Rotation::NEVER, &log_dir, &log_filename);

    let file_layer = fmt::layer().with_writer(file_appender).with_ansi(false);

    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("detbox=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    log_path_str
}

fn cleanup_old_logs(log_dir: &Path, keep_count: usize) {
    if let Ok(entries) = fs::read_dir(log_dir) {
        let mut log_files: Vec<_> = entries
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|s| s.starts_with("detbox") && s.ends_with(".log"))
                    .unwrap_or(false)
            })
            .collect();

        // Oldest first
        log_files.sort_by_key(|e| e.metadata().ok().and_then(|m| m.modified().ok()));

        if log_files.len() > keep_count {
            for file in log_files.iter().take(log_files.len() - keep_count) {
                let _ = fs::remove_file(file.path());
            }
        }
    }
}

fn load_settings() -> Settings {
    if !Path::new(SETTINGS_PATH).exists() {
        return Settings::default();
    }
    match SettingsConfig::load(SETTINGS_PATH).and_then(Settings::try_from) {
        Ok(settings) => settings,
        Err(e) => {
            warn!("Using default settings: {}", e);
            Settings::default()
        }
    }
}

/// Ground, a box pyramid, a pendulum chain and a fast bullet.
fn build_scene(world: &mut World) -> Result<(), PhysicsError> {
    let ground = world.create_body(&BodyDef::fixed(FixedVec2::from_int(0, -10)))?;
    world.create_fixture(ground, &FixtureDef::new(PolygonShape::new_box(int(50), int(10))))?;

    let box_shape = PolygonShape::new_box(ratio(1, 2), ratio(1, 2));
    for row in 0..10 {
        for col in 0..(10 - row) {
            let x = ratio(2 * col - (9 - row), 2) * ratio(11, 10);
            let y = ratio(1, 2) + int(row) * ratio(21, 20);
            let body = world.create_body(&BodyDef::dynamic(FixedVec2::new(x, y)))?;
            world.create_fixture(
                body,
                &FixtureDef::new(box_shape.clone())
                    .with_density(int(1))
                    .with_friction(ratio(6, 10)),
            )?;
        }
    }

    let mut prev = ground;
    for i in 0..8 {
        let anchor = FixedVec2::from_int(-20 + i, 15);
        let link = world.create_body(&BodyDef::dynamic(anchor + FixedVec2::new(HALF, FixedNum::ZERO)))?;
        world.create_fixture(
            link,
            &FixtureDef::new(PolygonShape::new_box(ratio(1, 2), ratio(1, 8))).with_density(int(20)),
        )?;
        let (Some(a), Some(b)) = (world.body(prev), world.body(link)) else {
            return Err(PhysicsError::InvalidBody);
        };
        let def = RevoluteJointDef::new((prev, a), (link, b), anchor);
        world.create_joint(def)?;
        prev = link;
    }

    let mut bullet_def = BodyDef::dynamic(FixedVec2::from_int(-30, 3));
    bullet_def.bullet = true;
    bullet_def.linear_velocity = FixedVec2::from_int(300, 0);
    let bullet = world.create_body(&bullet_def)?;
    world.create_fixture(
        bullet,
        &FixtureDef::new(CircleShape::new(FixedVec2::ZERO, ratio(1, 4))).with_density(int(2)),
    )?;
    Ok(())
}

fn run(steps: usize, log_path: Option<&str>) -> Result<u64, PhysicsError> {
    let mut world = World::with_settings(FixedVec2::from_int(0, -10), load_settings());
    build_scene(&mut world)?;
    info!(
        "Scene ready: {} bodies, {} joints, {} proxies",
        world.body_count(),
        world.joint_count(),
        world.proxy_count()
    );

    let mut encoder = match log_path {
        Some(path) => {
            let file = fs::File::create(path).map_err(|e| PhysicsError::Config(format!("{path}: {e}")))?;
            Some(GzEncoder::new(file, Compression::default()))
        }
        None => None,
    };

    let dt = ratio(1, 60);
    for step in 0..steps {
        world.step(dt, 8, 3);

        if let Some(encoder) = encoder.as_mut() {
            let bytes = bincode::serialize(&world.transform_log()).map_err(|e| PhysicsError::Config(e.to_string()))?;
            encoder
                .write_all(&bytes)
                .map_err(|e| PhysicsError::Config(e.to_string()))?;
        }

        if step % 500 == 0 {
            info!(
                "step {}: {} contacts, hash {:016x}",
                step,
                world.contact_count(),
                world.state_hash()
            );
        }
    }

    if let Some(encoder) = encoder {
        encoder.finish().map_err(|e| PhysicsError::Config(e.to_string()))?;
    }
    Ok(world.state_hash())
}

fn main() {
    let log_file = setup_file_logging();
    println!("detbox determinism run, logging to {log_file}");

    let mut args = std::env::args().skip(1);
    let steps = args
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_STEPS);
    let log_path = args.next();

    match run(steps, log_path.as_deref()) {
        Ok(hash) => {
            info!("Finished {} steps", steps);
            println!("{hash:016x}");
        }
        Err(e) => {
            eprintln!("simulation failed: {e}");
            std::process::exit(1);
        }
    }
}
