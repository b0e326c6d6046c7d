//! Run command implementation.

use std::path::Path;
use std::time::Instant;

use chrono::{Local, Utc};
use colored::Colorize;
use serde::Serialize;
use tracing::{info, warn};

use crate::bitable::{build_http_client, tenant_access_token, BitableClient, ClientSettings};
use crate::cli::RunArgs;
use crate::config::{resolve_config_path, Config};
use crate::error::{Error, Result};
use crate::etl::{Pipeline, PipelineReport, TimestampNormalizer};
use crate::notify::{send_notification, NotificationResult, NotifyTargets};

#[derive(Serialize)]
struct RunOutput<'a> {
    success: bool,
    duration_secs: f64,
    report: &'a PipelineReport,
}

/// Apply `wetl run` flags on top of the loaded config.
///
/// Without `--output` no CSV is written, even if the file enables it.
fn apply_overrides(config: &mut Config, args: &RunArgs) {
    if let Some(mode) = args.mode {
        config.mode = mode.to_string();
    }
    if let Some(days) = args.days {
        config.days = days;
    }
    if args.dry_run {
        config.dry_run = true;
    }
    match &args.output {
        Some(path) => {
            config.csv_output = true;
            config.csv_file_name = path.display().to_string();
        }
        None => config.csv_output = false,
    }
}

/// Execute the run command.
///
/// # Errors
///
/// Returns an error if the config is missing or invalid, authentication
/// fails, or a pipeline stage fails.
pub fn execute(args: &RunArgs, config_path: Option<&Path>, json: bool) -> Result<()> {
    let path = resolve_config_path(config_path)?;
    let mut config = Config::load(&path)?;
    apply_overrides(&mut config, args);
    config.validate()?;
    info!(config = %path.display(), mode = %config.mode, dry_run = config.dry_run, "starting run");

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))?;

    rt.block_on(async { execute_async(&config, args.send, json).await })
}

async fn execute_async(config: &Config, send: bool, json: bool) -> Result<()> {
    let settings = config.pipeline_settings()?;
    let retry = config.retry_policy();
    let http = build_http_client(config.request_timeout())
        .map_err(|e| Error::Other(format!("Failed to build HTTP client: {e}")))?;

    let start_time = Local::now();
    let clock = Instant::now();
    let mut report = PipelineReport {
        mode: settings.mode,
        ..PipelineReport::default()
    };

    let token = tenant_access_token(&http, &config.base_url, &retry, &config.app_id, &config.app_secret)
        .await
        .map_err(Error::Auth);

    let (client, outcome) = match token {
        Ok(token) => {
            let client = BitableClient::new(
                http.clone(),
                ClientSettings {
                    base_url: config.base_url.clone(),
                    app_token: config.bitable_app_token.clone(),
                    retry,
                },
                token.token,
            );
            let normalizer = TimestampNormalizer::new(&config.timezone);
            let outcome = Pipeline::new(&client, &settings, &normalizer)
                .run(Utc::now(), &mut report)
                .await;
            (Some(client), outcome)
        }
        Err(e) => (None, Err(e)),
    };

    let elapsed = clock.elapsed();
    let result = NotificationResult::from_run(start_time, elapsed, &report, &outcome);

    if send {
        let targets = NotifyTargets {
            webhook: config.robot_webhook.clone(),
            chat_id: config.chat_id.clone(),
        };
        if let Err(e) = send_notification(&targets, &http, client.as_ref(), &retry, &result).await {
            warn!(error = %e, "failed to send notification");
        }
    } else {
        info!("notification not requested (use --send)");
    }

    outcome?;

    if json {
        let output = RunOutput {
            success: true,
            duration_secs: elapsed.as_secs_f64(),
            report: &report,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    print_report(&report, elapsed.as_secs_f64());
    Ok(())
}

fn print_report(report: &PipelineReport, secs: f64) {
    let title = format!("Sync completed ({} mode) in {secs:.2}s", report.mode);
    println!("{}", title.green().bold());
    if let Some(window) = &report.window {
        println!("  Window:      {window}");
    }
    println!("  Fetched:     {} records ({} pages)", report.fetched, report.pages);
    if report.window.is_some() {
        println!(
            "  In window:   {} ({} outside, {} without date)",
            report.extracted, report.outside_window, report.unresolvable_dates
        );
    }
    let skips = &report.skips;
    println!(
        "  Transformed: {} rows (skipped {} duplicate, {} empty, {} other; {} invalid slots)",
        report.transformed, skips.duplicate, skips.empty, skips.other, skips.invalid_slots
    );
    println!("  Existing:    {} keys", report.existing_keys);
    println!("  New:         {} rows", report.new_rows);

    let write = &report.write;
    if write.dry_run {
        println!("  {}", "Dry run: nothing written".yellow());
    } else {
        println!("  Written:     {} rows in {} batches", write.written, write.batches);
    }
    if write.dropped > 0 {
        println!("  {}", format!("Dropped:     {} rows with bad dates", write.dropped).yellow());
    }
    if report.quarantined_fields > 0 {
        println!(
            "  {}",
            format!("Ignored:     {} fields with unsupported shapes", report.quarantined_fields).dimmed()
        );
    }
    if let Some(path) = &report.csv_path {
        println!("  CSV:         {}", path.display());
    }
}
