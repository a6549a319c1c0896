//! crowdtrack - run the crowd density pipeline and print events as JSON lines

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use clap::Parser;

use crowdtrack_rs::{AppConfig, CameraConfig, CameraRegistry, SourceConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON config listing the cameras to run.
    #[arg(long, env = "CROWDTRACK_CONFIG")]
    config: Option<PathBuf>,
    /// Run one synthetic demo camera instead of a config file.
    #[arg(long, conflicts_with = "config")]
    demo: bool,
    /// Stop after this many seconds; 0 runs until every camera finishes.
    #[arg(long, default_value_t = 0)]
    seconds: u64,
    /// Print only metrics and alerts, not status or error events.
    #[arg(long)]
    quiet: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match (&args.config, args.demo) {
        (Some(path), _) => {
            AppConfig::load(path).with_context(|| format!("loading {}", path.display()))?
        }
        (None, true) => demo_config(),
        (None, false) => return Err(anyhow!("pass --config <file> or --demo")),
    };
    if config.cameras.is_empty() {
        return Err(anyhow!("no cameras configured"));
    }

    let registry = CameraRegistry::new();
    let events = registry.subscribe(config.event_capacity);
    for camera in &config.cameras {
        registry
            .start(camera.clone())
            .with_context(|| format!("starting camera {}", camera.id))?;
    }

    let deadline = (args.seconds > 0).then(|| Instant::now() + Duration::from_secs(args.seconds));
    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        match events.recv_timeout(Duration::from_millis(200)) {
            Some(event) => {
                let interesting = matches!(
                    event,
                    crowdtrack_rs::PipelineEvent::Metrics(_) | crowdtrack_rs::PipelineEvent::Alert(_)
                );
                if interesting || !args.quiet {
                    println!("{}", serde_json::to_string(&event)?);
                }
            }
            None if config.cameras.iter().all(|c| !registry.is_running(&c.id)) => break,
            None => {}
        }
    }

    registry.stop_all()?;
    for camera in &config.cameras {
        let stats = registry.current_stats(&camera.id)?;
        log::info!(
            "camera {}: {:?}, last people count {}",
            camera.id,
            stats.status,
            stats.metrics.map_or(0, |m| m.total_people)
        );
    }
    Ok(())
}

fn demo_config() -> AppConfig {
    let camera = CameraConfig {
        source: SourceConfig::Synthetic {
            width: 640,
            height: 480,
            frames: None,
            fps: Some(10.0),
        },
        ..CameraConfig::new("demo")
    };
    AppConfig {
        cameras: vec![camera],
        ..AppConfig::default()
    }
}
