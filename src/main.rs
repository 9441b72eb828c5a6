//! Binix Lantern - Predictive Page-Load Simulator
//!
//! Entry point for the `lantern` command: estimates metrics for one recorded
//! page load and prints the report as JSON.
//!
//! Usage: `lantern <trace.json> <network-log.json> [settings.json]`

use std::env;
use std::fs;
use std::process::ExitCode;

use binix_lantern::{LanternContext, LanternError, LanternSettings, PageInputs, Result, NAME, VERSION};
use binix_lantern::network::NetworkLog;
use binix_lantern::trace::Trace;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 || args.len() > 4 {
        eprintln!("{} v{}", NAME, VERSION);
        eprintln!("usage: {} <trace.json> <network-log.json> [settings.json]", args[0]);
        return ExitCode::from(2);
    }

    match run(&args[1], &args[2], args.get(3).map(String::as_str)).await {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(trace_path: &str, log_path: &str, settings_path: Option<&str>) -> Result<String> {
    let settings = match settings_path {
        Some(path) => LanternSettings::from_file(path)?,
        None => LanternSettings::default(),
    };
    log::info!(
        "simulating at {}ms rtt, {}kbps, {}x cpu",
        settings.throttling.rtt_ms,
        settings.throttling.throughput_kbps,
        settings.throttling.cpu_slowdown_multiplier
    );

    let trace = Trace::from_json_str(&read(trace_path)?)?;
    let log = NetworkLog::from_json_str(&read(log_path)?)?;
    let inputs = PageInputs::new(trace, log)?;
    log::info!("inputs {}", inputs.fingerprint());

    let context = LanternContext::with_settings(settings)?;
    let report = context.report(&inputs).await?;
    report.to_json_pretty().map_err(|e| LanternError::InvalidSettings {
        reason: format!("cannot encode report: {}", e),
    })
}

fn read(path: &str) -> Result<String> {
    fs::read_to_string(path).map_err(|e| LanternError::Config {
        path: path.to_string(),
        reason: e.to_string(),
    })
}
