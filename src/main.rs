use clap::Parser;
use nice::{
    config::{Config, ConfigOverrides, Settings},
    constants::*,
    daemon::Daemon,
    events::model::LogLevel,
};
use std::process::ExitCode;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(author, version, about = "NICE overlay daemon")]
struct Args {
    /// Path to config file (TOML)
    #[arg(short, long, default_value = "nice.toml")]
    config: String,

    /// Listening port
    #[arg(short, long)]
    port: Option<u16>,

    /// host:port of the daemon to register with
    #[arg(long)]
    parent: Option<String>,

    /// host:port of the tree root (defaults to the parent)
    #[arg(long)]
    root: Option<String>,

    /// Run as the root of the tree
    #[arg(long)]
    is_root: bool,

    /// Branching factor
    #[arg(short = 'n', long)]
    max_children: Option<usize>,

    /// Availability window, local time, "HH:MM-HH:MM" or "always"
    #[arg(short, long)]
    window: Option<String>,

    /// Segregate descendants into a private sub-network
    #[arg(long)]
    barrier: bool,

    /// Scheduling priority for the worker (-20..=19)
    #[arg(long, allow_hyphen_values = true)]
    priority: Option<i32>,

    /// Debug-level console output
    #[arg(short, long)]
    debug: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            port: self.port,
            parent: self.parent.clone(),
            root: self.root.clone(),
            is_root: self.is_root.then_some(true),
            max_children: self.max_children,
            window: self.window.clone(),
            barrier: self.barrier.then_some(true),
            priority: self.priority,
            debug: self.debug.then_some(true),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match Config::from_file(&args.config) {
        Ok(Some(cfg)) => {
            println!("{}Loaded config from: {}", ICON_PLACEHOLDER, args.config);
            cfg
        }
        Ok(None) => {
            println!(
                "⚠️ No config file found at '{}', using defaults and command-line flags.",
                args.config
            );
            Config::default()
        }
        Err(err) => {
            eprintln!("❌ Failed to load config: {:#}", err);
            return ExitCode::FAILURE;
        }
    };
    args.overrides().apply(&mut config);

    let settings = match Settings::from_config(&config) {
        Ok(s) => s,
        Err(err) => {
            eprintln!("❌ {}", err);
            return ExitCode::FAILURE;
        }
    };

    // Initialize events AFTER config is loaded so custom logging path can be applied
    let console_level = if settings.debug {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    nice::events::init_events_with_options(config.logging.as_ref(), Some(console_level)).await;

    let daemon = match Daemon::bind(settings).await {
        Ok(d) => d,
        Err(err) => {
            eprintln!("❌ {}", err);
            return ExitCode::FAILURE;
        }
    };
    println!(
        "🟢 {} {} listening on {}. Press Ctrl+C to shut down...",
        DEFAULT_APP_NAME,
        full_version(),
        daemon.local_addr()
    );

    let (handle, mut task) = daemon.spawn();
    let outcome = tokio::select! {
        res = &mut task => res,
        _ = signal::ctrl_c() => {
            println!("🛑 {} shutting down gracefully.", DEFAULT_APP_NAME);
            let _ = handle.shutdown().await;
            task.await
        }
    };

    match outcome {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(err)) if err.is_fatal() => {
            eprintln!("❌ {}", err);
            ExitCode::FAILURE
        }
        Ok(Err(err)) => {
            eprintln!("⚠️ {} stopped: {}", DEFAULT_APP_NAME, err);
            ExitCode::FAILURE
        }
        Err(join) => {
            eprintln!("❌ daemon task failed: {}", join);
            ExitCode::FAILURE
        }
    }
}
