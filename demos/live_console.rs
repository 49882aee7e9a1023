//! MotionLink live console
//!
//! Probes the backend, switches to live mode with the configured strategy
//! and prints the activity log until Ctrl+C or the time limit.
//!
//! ```text
//! cargo run --example live_console -- [config.json] [seconds]
//! ```

use anyhow::Context;
use chrono::Utc;
use motionlink::{
    format_uptime, init_logging, ClientConfig, HealthProbe, LogConfig, MotionLink, ViewMode,
};
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(&LogConfig::default());

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config file {}", path))?;
            ClientConfig::from_json(&json).context("parsing config")?
        }
        None => ClientConfig::default(),
    };
    let run_for = args
        .next()
        .map(|s| s.parse::<u64>())
        .transpose()
        .context("run time must be a number of seconds")?
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(30));

    println!("🎯 MotionLink live console");
    println!("   backend:  {}", config.backend_url);
    println!("   strategy: {}", config.strategy);

    let probe = HealthProbe::new(&config.backend_url, config.request_timeout())?;
    match probe.check().await {
        Ok(report) => println!(
            "✅ Backend {} ({:?})",
            report.status.status, report.latency
        ),
        Err(e) => println!("⚠️  Backend health check failed: {}", e),
    }

    let controller = MotionLink::builder(config).build()?;

    if let Err(e) = controller.switch_view(ViewMode::Live).await {
        println!("❌ Could not enter live mode: {}", e);
    } else {
        println!("📹 Live for {:?}, Ctrl+C to stop", run_for);
        tokio::select! {
            _ = tokio::time::sleep(run_for) => {}
            _ = tokio::signal::ctrl_c() => println!("\n🛑 Interrupted"),
        }
        controller.switch_view(ViewMode::Demo).await?;
    }

    let state = controller.state();
    let now = Utc::now();
    println!("\n📋 Activity ({} detections, uptime {})", state.event_count, format_uptime(state.uptime()));
    for entry in controller.log().entries() {
        println!(
            "   [{:>8}] {:<7} {}",
            entry.relative_age(now),
            entry.category.as_str(),
            entry.text
        );
    }

    controller.shutdown().await;
    Ok(())
}
