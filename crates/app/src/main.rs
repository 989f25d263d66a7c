use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use mr_tree_core::{
    run_encoders, AppConfig, Axis, Controller, CoordinateSpace, NoEncoders, Scheduler,
    TracingSink, TreeError, Watchdog, WatchdogConfig,
};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

mod http;
mod mqtt;

fn main() -> mr_tree_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    match cli.command.unwrap_or_default() {
        Commands::Serve(overrides) => {
            overrides.apply(&mut config);
            run_serve(config)
        }
        Commands::Check { layout } => {
            run_check(layout.as_deref().unwrap_or(config.tree.layout.as_path()))
        }
    }
}

fn run_check(layout: &Path) -> mr_tree_core::Result<()> {
    let coords = CoordinateSpace::load(layout)?;
    println!("{}: {} pixels", layout.display(), coords.len());
    for axis in Axis::ALL {
        let (min, max) = coords.bounds(axis);
        println!("  {axis:?}: {min}..={max}");
    }
    Ok(())
}

fn run_serve(config: AppConfig) -> mr_tree_core::Result<()> {
    let coords = CoordinateSpace::load(&config.tree.layout)?;
    if let Some(expected) = config.tree.pixel_count {
        if expected != coords.len() {
            return Err(TreeError::Layout {
                line: 0,
                message: format!("expected {expected} pixels, found {}", coords.len()),
            });
        }
    }

    let controller = Controller::new(Arc::new(coords), &config.tree);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let (scheduler, tree) = Scheduler::new(controller, TracingSink::new(), &config.render);
        let render = tokio::spawn(scheduler.run());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        if config.watchdog.enabled {
            start_watchdog(&config.watchdog)?;
        }

        let encoders = tokio::spawn(run_encoders(
            NoEncoders,
            tree.clone(),
            config.input.poll_interval(),
        ));

        let pubsub = config
            .mqtt
            .enabled
            .then(|| tokio::spawn(mqtt::run(config.mqtt.clone(), tree.clone(), shutdown_rx)));

        let http = http::serve(&config.http, tree);
        tokio::select! {
            served = http => {
                if let Err(err) = served {
                    tracing::error!(%err, "http surface failed");
                    return Err(err.into());
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("shutdown requested");
            }
        }

        let _ = shutdown_tx.send(true);
        if let Some(pubsub) = pubsub {
            let _ = pubsub.await;
        }
        encoders.abort();
        render.abort();
        tracing::info!("mr-tree stopped");
        Ok::<(), TreeError>(())
    })
}

/// Starts the monitor thread and the async task that feeds it. A wedged
/// runtime stops the feeding and the monitor aborts the process.
fn start_watchdog(config: &WatchdogConfig) -> mr_tree_core::Result<()> {
    let watchdog = Watchdog::from_config(config);
    watchdog.feed();
    watchdog.spawn_monitor(|silent| {
        tracing::error!(silent_ms = silent.as_millis() as u64, "runtime starved, aborting");
        std::process::abort();
    })?;

    let feed_interval = Duration::from_millis(config.feed_interval_ms.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(feed_interval);
        loop {
            ticker.tick().await;
            watchdog.feed();
        }
    });
    tracing::info!(timeout_ms = config.timeout_ms, "watchdog armed");
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Controller for a 3D-mapped LED tree", long_about = None)]
struct Cli {
    /// JSON configuration file. Missing sections use defaults.
    #[arg(short, long, env = "MR_TREE_CONFIG", global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the render loop with the HTTP, MQTT and encoder control surfaces.
    Serve(ServeArgs),
    /// Validate a layout file and print its bounds.
    Check {
        /// Coordinate file to check; defaults to the configured layout.
        #[arg(short, long)]
        layout: Option<PathBuf>,
    },
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Serve(ServeArgs::default())
    }
}

#[derive(clap::Args, Debug, Default)]
struct ServeArgs {
    /// Coordinate file with one `x,y,z` line per pixel.
    #[arg(short, long, env = "MR_TREE_LAYOUT")]
    layout: Option<PathBuf>,
    /// Address for the HTTP control routes.
    #[arg(long, env = "MR_TREE_HTTP_BIND")]
    http_bind: Option<SocketAddr>,
    #[arg(long, env = "MR_TREE_MQTT_HOST")]
    mqtt_host: Option<String>,
    #[arg(long, env = "MR_TREE_MQTT_PORT")]
    mqtt_port: Option<u16>,
    /// Run without the MQTT surface.
    #[arg(long)]
    no_mqtt: bool,
}

impl ServeArgs {
    fn apply(self, config: &mut AppConfig) {
        if let Some(layout) = self.layout {
            config.tree.layout = layout;
        }
        if let Some(bind) = self.http_bind {
            config.http.bind = bind;
        }
        if let Some(host) = self.mqtt_host {
            config.mqtt.host = host;
        }
        if let Some(port) = self.mqtt_port {
            config.mqtt.port = port;
        }
        if self.no_mqtt {
            config.mqtt.enabled = false;
        }
    }
}
