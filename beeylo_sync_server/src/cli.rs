use std::{env, env::VarError};

/// The server takes no arguments. Passing any prints the help text and the current (non-secret) configuration.
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Only list variables that are safe to print. Secrets and credentials are left out.
    const DISPLAY_ENVS: [&str; 26] = [
        "RUST_LOG",
        "BSYNC_HOST",
        "BSYNC_PORT",
        "BSYNC_DATABASE_URL",
        "BSYNC_SHOPIFY_API_VERSION",
        "BSYNC_SHOPIFY_HMAC_CHECKS",
        "BSYNC_WEBHOOK_WORKERS",
        "BSYNC_TRACKING_WORKERS",
        "BSYNC_WEBHOOK_JOBS_PER_SEC",
        "BSYNC_TRACKING_JOBS_PER_SEC",
        "BSYNC_WEBHOOK_MAX_ATTEMPTS",
        "BSYNC_WEBHOOK_BACKOFF_SECS",
        "BSYNC_TRACKING_MAX_ATTEMPTS",
        "BSYNC_TRACKING_BACKOFF_SECS",
        "BSYNC_TRACKING_GRACE_PERIOD_SECS",
        "BSYNC_COMPLETED_RETENTION_SECS",
        "BSYNC_DEAD_LETTER_RETENTION_SECS",
        "BSYNC_NOTIFICATION_SWEEP_SECS",
        "BSYNC_SHIPMENT_RECHECK_SECS",
        "BSYNC_LIMITER_EVICTION_SECS",
        "BSYNC_QUEUE_PURGE_SECS",
        "BSYNC_POSTNL_URL",
        "BSYNC_DHL_URL",
        "BSYNC_DPD_URL",
        "BSYNC_UPS_URL",
        "BSYNC_FEDEX_URL",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
