use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
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
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 16] = [
        "RUST_LOG",
        "PG_HOST",
        "PG_PORT",
        "PG_DATABASE_URL",
        "PG_CATALOG_PATH",
        "PG_CATALOG_RELOAD_INTERVAL",
        "PG_USE_X_FORWARDED_FOR",
        "PG_USE_FORWARDED",
        "PG_PUSH_URL",
        "PG_NOTIFY_ALARM_CHANNEL",
        "PG_ORDER_FORM_LIFETIME",
        "PG_CACHE_TTL",
        "PG_NOTIFY_TOPIC",
        "PG_NOTIFY_RETRY_INTERVAL",
        "PG_NOTIFY_ALARM_THRESHOLD",
        "PG_BUS_PUBLISH_TIMEOUT",
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
