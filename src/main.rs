//! rs2ctx CLI
//!
//! Command-line front end for inspecting a librealsense context: library
//! version, connected devices and live hot-plug events. Runs against the
//! simulated backend unless `--backend native` is given.

use clap::{Parser, Subcommand, ValueEnum};
use rs2_context::{
    config::{FileConfig, ScriptStep},
    metrics::MetricsSnapshot,
    Context, DeviceList, MockBackend, NativeBackend,
};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "rs2ctx", version, about = "Inspect librealsense devices")]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Which runtime to talk to.
    #[arg(long, value_enum, default_value_t = BackendKind::Mock)]
    backend: BackendKind,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    /// Simulated devices from the `[mock]` config section.
    Mock,
    /// The installed librealsense2 library.
    Native,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the librealsense API version.
    Version,
    /// List connected devices.
    List {
        /// Include platform (non-RealSense) cameras.
        #[arg(long)]
        platform: bool,
    },
    /// Print device connect/disconnect events.
    Watch {
        /// Stop after this many seconds (0 = until Ctrl-C).
        #[arg(long)]
        seconds: Option<u64>,
        /// Serve Prometheus metrics on this port.
        #[arg(long)]
        metrics_port: Option<u16>,
    },
}

struct Runtime {
    backend: Arc<dyn NativeBackend>,
    /// Set when running simulated, for script playback.
    mock: Option<Arc<MockBackend>>,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match FileConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config {}: {}", path.display(), e);
                process::exit(1);
            }
        },
        None => FileConfig::default(),
    };

    let runtime = match open_runtime(cli.backend, &config) {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    let mut ctx = match Context::new(Arc::clone(&runtime.backend)) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Failed to create context: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Version => {
            println!("{}", ctx.version());
            Ok(())
        }
        Command::List { platform } => {
            list_devices(&ctx, platform || config.context.include_platform_camera)
        }
        Command::Watch {
            seconds,
            metrics_port,
        } => {
            let mut watch = config.watch.clone();
            if let Some(seconds) = seconds {
                watch.duration_secs = seconds;
            }
            if let Some(port) = metrics_port {
                watch.metrics_port = port;
            }
            let script = if runtime.mock.is_some() {
                config.mock.sorted_script()
            } else {
                Vec::new()
            };
            watch_devices(&ctx, &runtime, &watch, script, config.context.include_platform_camera)
        }
    };

    ctx.dispose();

    if let Err(e) = result {
        eprintln!("{}", e);
        process::exit(1);
    }
}

fn open_runtime(kind: BackendKind, config: &FileConfig) -> Result<Runtime, String> {
    match kind {
        BackendKind::Mock => {
            info!("Using simulated devices");
            let mock = Arc::new(config.mock.build_backend());
            Ok(Runtime {
                backend: mock.clone(),
                mock: Some(mock),
            })
        }
        #[cfg(feature = "librealsense")]
        BackendKind::Native => Ok(Runtime {
            backend: Arc::new(rs2_context::Rs2Backend::new()),
            mock: None,
        }),
        #[cfg(not(feature = "librealsense"))]
        BackendKind::Native => {
            Err("native backend unavailable: rebuild with --features librealsense".to_string())
        }
    }
}

fn print_list(list: &DeviceList, indent: &str) -> Result<usize, rs2_context::ContextError> {
    let infos = list.infos()?;
    for info in &infos {
        println!("{}{}", indent, info);
    }
    Ok(infos.len())
}

fn list_devices(ctx: &Context, include_platform_camera: bool) -> Result<(), String> {
    let devices = ctx
        .query_devices(include_platform_camera)
        .map_err(|e| format!("Device query failed: {}", e))?;
    let count = print_list(&devices, "").map_err(|e| format!("Failed to read devices: {}", e))?;
    if count == 0 {
        println!("No devices connected");
    }
    info!(count, "Listed devices");
    Ok(())
}

fn watch_devices(
    ctx: &Context,
    runtime: &Runtime,
    watch: &rs2_context::config::WatchConfig,
    script: Vec<ScriptStep>,
    include_platform_camera: bool,
) -> Result<(), String> {
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        if let Err(e) = ctrlc::set_handler(move || running.store(false, Ordering::SeqCst)) {
            warn!("Failed to install Ctrl-C handler: {}", e);
        }
    }

    let mut connected = MetricsSnapshot::query(ctx, include_platform_camera)
        .map_err(|e| format!("Device query failed: {}", e))?
        .connected_devices;
    let changed = Arc::new(AtomicBool::new(false));

    {
        let changed = Arc::clone(&changed);
        ctx.on_devices_changed(move |removed, added| {
            let stamp = chrono::Local::now().format("%H:%M:%S%.3f");
            println!("[{}] devices changed", stamp);
            let _ = print_list(removed, "  - ");
            let _ = print_list(added, "  + ");
            changed.store(true, Ordering::SeqCst);
        })
        .map_err(|e| format!("Failed to register observer: {}", e))?;
    }

    let metrics = start_metrics(watch.metrics_port);

    info!(devices = connected, "Watching for device changes (Ctrl-C to stop)");

    let started = Instant::now();
    let deadline = (watch.duration_secs > 0).then(|| Duration::from_secs(watch.duration_secs));
    let poll = Duration::from_millis(watch.poll_interval_ms);
    let mut pending = script.into_iter().peekable();

    while running.load(Ordering::SeqCst) {
        let elapsed = started.elapsed();
        if deadline.is_some_and(|d| elapsed >= d) {
            break;
        }

        if let Some(mock) = &runtime.mock {
            while let Some(step) = pending.next_if(|s| Duration::from_millis(s.at_ms()) <= elapsed) {
                step.apply(mock);
            }
        }

        if changed.swap(false, Ordering::SeqCst) {
            match MetricsSnapshot::query(ctx, include_platform_camera) {
                Ok(snapshot) => connected = snapshot.connected_devices,
                Err(e) => warn!("Device query failed: {}", e),
            }
        }

        metrics.update(ctx, connected);
        std::thread::sleep(poll);
    }

    let stats = ctx.stats();
    info!(
        events = stats.events_dispatched,
        added = stats.devices_added,
        removed = stats.devices_removed,
        observer_failures = stats.observer_failures,
        "Watch finished"
    );
    Ok(())
}

#[cfg(feature = "metrics")]
struct MetricsHandle {
    state: Option<Arc<tokio::sync::RwLock<rs2_context::metrics::MetricsState>>>,
}

#[cfg(feature = "metrics")]
impl MetricsHandle {
    fn update(&self, ctx: &Context, connected: usize) {
        if let Some(state) = &self.state {
            let snapshot = MetricsSnapshot::from_context(ctx, connected);
            state.blocking_write().update(&snapshot);
        }
    }
}

#[cfg(feature = "metrics")]
fn start_metrics(port: u16) -> MetricsHandle {
    use rs2_context::metrics::{MetricsRegistry, MetricsServer, MetricsServerConfig};

    if port == 0 {
        return MetricsHandle { state: None };
    }

    let registry = match MetricsRegistry::new() {
        Ok(registry) => registry,
        Err(e) => {
            warn!("Metrics disabled: {}", e);
            return MetricsHandle { state: None };
        }
    };
    let server = MetricsServer::new(MetricsServerConfig::with_port(port), registry);
    let state = server.state();

    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!("Failed to start metrics runtime: {}", e);
                return;
            }
        };
        if let Err(e) = runtime.block_on(server.run()) {
            warn!("Metrics server stopped: {}", e);
        }
    });

    MetricsHandle { state: Some(state) }
}

#[cfg(not(feature = "metrics"))]
struct MetricsHandle;

#[cfg(not(feature = "metrics"))]
impl MetricsHandle {
    fn update(&self, _ctx: &Context, _connected: usize) {}
}

#[cfg(not(feature = "metrics"))]
fn start_metrics(port: u16) -> MetricsHandle {
    if port != 0 {
        warn!(port, "Metrics server unavailable: rebuild with --features metrics");
    }
    MetricsHandle
}
