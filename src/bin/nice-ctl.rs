use clap::{Parser, Subcommand};
use nice::daemon::{query_status, walk_tree};
use nice::network::{PeerReport, StatusReport, Timeouts};
use std::net::{SocketAddr, ToSocketAddrs};
use std::process::ExitCode;
use std::time::Duration;

/// nice-ctl: Admin CLI for inspecting running NICE daemons
///
/// Talks to daemons over their normal listening port; nothing needs to be
/// enabled on the daemon side.
#[derive(Parser, Debug)]
#[command(name = "nice-ctl", version, about = "Admin CLI for NICE daemons")]
struct Cli {
    /// Seconds to wait for each daemon to answer
    #[arg(short, long, default_value_t = 5)]
    timeout: u64,

    /// Print raw JSON instead of a summary
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show one daemon's view of its neighborhood
    Status { addr: String },
    /// Walk the tree from a daemon down through its children
    Tree { addr: String },
}

fn resolve(addr: &str) -> Option<SocketAddr> {
    addr.to_socket_addrs().ok().and_then(|mut it| it.next())
}

fn peer_line(p: &PeerReport) -> String {
    let addr = p
        .addr
        .map(|a| a.to_string())
        .unwrap_or_else(|| "?".into());
    let age = p
        .silent_secs
        .map(|s| format!("{}s ago", s))
        .unwrap_or_else(|| "never".into());
    format!(
        "{} depth={} load={} window={}{} last={}",
        addr,
        p.depth,
        p.load,
        p.window,
        if p.barrier { " barrier" } else { "" },
        age
    )
}

fn print_status(r: &StatusReport) {
    println!("{} ({})", r.listen, r.version);
    println!(
        "  state={:?} root={} barrier={} depth={} load={} max_children={}",
        r.state, r.is_root, r.barrier, r.depth, r.load, r.max_children
    );
    println!(
        "  window={} ({})",
        r.window,
        if r.available { "available" } else { "outside window" }
    );
    match &r.parent {
        Some(p) => println!("  parent {}", peer_line(p)),
        None => println!("  parent <none>"),
    }
    if r.children.is_empty() {
        println!("  children <none>");
    }
    for (i, c) in r.children.iter().enumerate() {
        println!("  child#{} {}", i, peer_line(c));
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let wait = Duration::from_secs(cli.timeout.max(1));
    let timeouts = Timeouts {
        connect: wait,
        protocol: wait,
        transfer: wait,
    };

    let target = match &cli.command {
        Commands::Status { addr } | Commands::Tree { addr } => addr.clone(),
    };
    let Some(addr) = resolve(&target) else {
        eprintln!("❌ Cannot resolve '{}'", target);
        return ExitCode::from(2);
    };

    match cli.command {
        Commands::Status { .. } => match query_status(addr, timeouts).await {
            Ok(report) => {
                if cli.json {
                    match serde_json::to_string_pretty(&report) {
                        Ok(s) => println!("{}", s),
                        Err(e) => {
                            eprintln!("❌ {}", e);
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    print_status(&report);
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("❌ {}: {}", addr, e);
                ExitCode::FAILURE
            }
        },
        Commands::Tree { .. } => {
            let mut failures = 0u32;
            for (level, node, res) in walk_tree(addr, timeouts).await {
                let indent = "  ".repeat(level);
                match res {
                    Ok(r) => println!(
                        "{}{} depth={} load={} children={}/{}{}",
                        indent,
                        node,
                        r.depth,
                        r.load,
                        r.children.len(),
                        r.max_children,
                        if r.barrier { " barrier" } else { "" }
                    ),
                    Err(e) => {
                        failures += 1;
                        println!("{}{} unreachable: {}", indent, node, e);
                    }
                }
            }
            if failures == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
