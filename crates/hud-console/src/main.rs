//! KING-HUD console
//!
//! Command-line front end for the sentinel runtime. Everything runs
//! against the simulated fabric: `run` keeps the loop alive and prints
//! status lines, `drill` drives one strike through remediation end to
//! end, `export-audit` does the same and writes the audit CSV.

use anyhow::Context;
use clap::{value_parser, Arg, Command};
use hud_core::prelude::*;
use std::path::PathBuf;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hud_core=info,king_hud=info".into()),
        )
        .init();

    let cli = Command::new("king-hud")
        .version(hud_core::VERSION)
        .about("KING-HUD incident sentinel (simulated fabric)")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("run")
                .about("Run the sentinel loop and print status lines")
                .arg(config_arg())
                .arg(seed_arg())
                .arg(
                    Arg::new("duration")
                        .long("duration")
                        .default_value("0")
                        .value_parser(value_parser!(u64))
                        .help("Stop after this many seconds (0 runs until Ctrl-C)"),
                )
                .arg(
                    Arg::new("refresh")
                        .long("refresh")
                        .default_value("5")
                        .value_parser(value_parser!(u64))
                        .help("Status line cadence in seconds"),
                ),
        )
        .subcommand(
            Command::new("drill")
                .about("Drive one strike through remediation end to end")
                .arg(config_arg())
                .arg(seed_arg())
                .arg(
                    Arg::new("source")
                        .long("source")
                        .default_value("scheduled")
                        .value_parser(["scheduled", "dashboard", "admin-remote"])
                        .help("Strike attribution for the drill"),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .default_value("90")
                        .value_parser(value_parser!(u64))
                        .help("Give up after this many seconds"),
                ),
        )
        .subcommand(
            Command::new("export-audit")
                .about("Run one autonomous drill and export the audit CSV")
                .arg(config_arg())
                .arg(seed_arg())
                .arg(
                    Arg::new("out")
                        .long("out")
                        .default_value("king-hud-audit.csv")
                        .value_parser(value_parser!(PathBuf))
                        .help("Output CSV path"),
                ),
        );

    match cli.get_matches().subcommand() {
        Some(("run", args)) => {
            let config = load_config(args)?;
            let duration = args.get_one::<u64>("duration").copied().unwrap_or(0);
            let refresh = args.get_one::<u64>("refresh").copied().unwrap_or(5);
            run_loop(config, duration, refresh).await
        }
        Some(("drill", args)) => {
            let config = load_config(args)?;
            let source = parse_source(args.get_one::<String>("source").map_or("scheduled", String::as_str));
            let timeout = args.get_one::<u64>("timeout").copied().unwrap_or(90);
            let cleared = run_drill(config, source, Duration::from_secs(timeout)).await?;
            if !cleared {
                anyhow::bail!("drill did not remediate before the timeout");
            }
            Ok(())
        }
        Some(("export-audit", args)) => {
            let config = load_config(args)?;
            let out = args
                .get_one::<PathBuf>("out")
                .cloned()
                .unwrap_or_else(|| PathBuf::from("king-hud-audit.csv"));
            run_export(config, out).await
        }
        _ => Ok(()),
    }
}

fn config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .value_parser(value_parser!(PathBuf))
        .help("Path to a JSON config file")
}

fn seed_arg() -> Arg {
    Arg::new("seed")
        .long("seed")
        .value_parser(value_parser!(u64))
        .help("Override the telemetry simulation seed")
}

fn load_config(args: &clap::ArgMatches) -> anyhow::Result<SentinelConfig> {
    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => SentinelConfig::from_json_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => SentinelConfig::default(),
    };
    if let Some(seed) = args.get_one::<u64>("seed") {
        config = config.with_sim_seed(*seed);
    }
    config.validate().context("validating config")?;
    Ok(config)
}

fn parse_source(raw: &str) -> SourceTag {
    match raw {
        "dashboard" => SourceTag::DashboardManual,
        "admin-remote" => SourceTag::AdminRemoteStrike,
        _ => SourceTag::AutoSentinelScheduled,
    }
}

async fn run_loop(config: SentinelConfig, duration_secs: u64, refresh_secs: u64) -> anyhow::Result<()> {
    let (handle, task) = SentinelRuntime::spawn(config, RuntimeDeps::default());
    println!("KING-HUD sentinel online; Ctrl-C to stop");

    let started = std::time::Instant::now();
    let mut status = tokio::time::interval(Duration::from_secs(refresh_secs.max(1)));
    loop {
        tokio::select! {
            _ = status.tick() => {
                let snapshot = handle.snapshot().await?;
                print_status(&snapshot);
                if duration_secs > 0 && started.elapsed() >= Duration::from_secs(duration_secs) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    let csv = handle.audit_csv().await?;
    let rows = csv.lines().count().saturating_sub(1);
    println!("audit rows recorded this session: {rows}");
    handle.shutdown().await?;
    task.await?;
    Ok(())
}

async fn run_drill(config: SentinelConfig, source: SourceTag, timeout: Duration) -> anyhow::Result<bool> {
    let (handle, task) = SentinelRuntime::spawn(config, RuntimeDeps::default());
    let cleared = drive_drill(&handle, source, timeout).await?;

    let csv = handle.audit_csv().await?;
    print!("{csv}");
    handle.shutdown().await?;
    task.await?;
    Ok(cleared)
}

async fn run_export(config: SentinelConfig, out: PathBuf) -> anyhow::Result<()> {
    let (handle, task) = SentinelRuntime::spawn(config, RuntimeDeps::default());
    let cleared = drive_drill(&handle, SourceTag::AutoSentinelScheduled, Duration::from_secs(90)).await?;
    if !cleared {
        anyhow::bail!("drill did not remediate, nothing worth exporting");
    }

    let rows = handle.export_audit(out.clone()).await?;
    println!("exported {rows} audit rows to {}", out.display());
    handle.shutdown().await?;
    task.await?;
    Ok(())
}

/// Inject a strike and poll until it remediates. Sources gated by the
/// forensic hold get a stand-in operator that commits as soon as the
/// hold arms.
async fn drive_drill(handle: &SentinelHandle, source: SourceTag, timeout: Duration) -> anyhow::Result<bool> {
    println!("drill: injecting strike as {source}");
    let receipt = handle.trigger_strike(source).await?;
    println!("drill: trigger {receipt:?}");

    let deadline = tokio::time::Instant::now() + timeout;
    let mut saw_active = false;
    let mut committed = false;
    loop {
        if tokio::time::Instant::now() >= deadline {
            println!("drill: timed out");
            return Ok(false);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        let snapshot = handle.snapshot().await?;
        if snapshot.active {
            saw_active = true;
        }
        if snapshot.phase == RemediationPhase::Hold && !committed {
            committed = true;
            println!("drill: hold armed, committing manual remediation");
            handle.commit_remediation(SourceTag::DashboardConsole).await?;
        }
        if saw_active && !snapshot.active {
            println!("drill: incident cleared");
            return Ok(true);
        }
    }
}

fn print_status(snapshot: &HudSnapshot) {
    let incident = snapshot
        .incident
        .map_or_else(|| "-".to_string(), |id| id.forensic_code());
    let remaining = snapshot
        .phase_remaining
        .map_or_else(|| "-".to_string(), |d| format!("{}s", d.as_secs()));
    let cooldown = snapshot
        .cooldown_remaining
        .map_or_else(|| "-".to_string(), |d| format!("{}s", d.as_secs()));
    println!(
        "[{}] status={} phase={} incident={} bad_ticks={} queue={} remaining={} cooldown={} confidence={}",
        chrono::Utc::now().format("%H:%M:%S"),
        snapshot.status,
        snapshot.phase,
        incident,
        snapshot.consecutive_bad_ticks,
        snapshot.queue_depth,
        remaining,
        cooldown,
        snapshot.peak_confidence,
    );
}
