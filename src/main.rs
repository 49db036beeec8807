//! mesh-console: operator console core, headless.
//!
//! Runs the notice channel and the request pipeline from a terminal. Notices
//! are printed as JSON lines on stdout; alerts and toasts go to stderr.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Method;
use serde_json::Value;

use mesh_console::api::{self, ApiClient, CountQuery, CountResult, CountType};
use mesh_console::channel::{NoticeChannel, WsTransport};
use mesh_console::constants::API_KEY_HEADER;
use mesh_console::env::Environment;
use mesh_console::state::{Alert, AppState, SharedAppState};
use mesh_console::Config;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How often `watch` checks the session TTL.
const SESSION_CHECK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3600);

// CLI
#[derive(Parser)]
#[command(name = "mesh-console")]
#[command(version = VERSION)]
#[command(about = "Operator console for a mesh VPN control plane")]
struct Cli {
    /// Log in with this login name before running the command
    #[arg(long, global = true)]
    login: Option<String>,
    /// Password for --login
    #[arg(long, global = true, env = "MESH_CONSOLE_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream server notices until interrupted
    Watch,
    /// Send one API request through the pipeline and print the response
    Request {
        /// HTTP method
        method: String,
        /// Path relative to the base URL, e.g. /manager/v2/users
        path: String,
        /// JSON body (application casing)
        #[arg(long)]
        body: Option<String>,
        /// Query parameter as key=value, repeatable
        #[arg(long = "query", value_parser = parse_key_value)]
        query: Vec<(String, String)>,
    },
    /// Look up a summary count
    Metrics {
        /// What to count
        #[arg(value_enum)]
        count_type: CountType,
        /// Namespace, defaults to the logged-in tenant's
        #[arg(long)]
        namespace: Option<String>,
        /// Narrow to one user
        #[arg(long)]
        user_id: Option<String>,
        /// Narrow to one device
        #[arg(long)]
        device_id: Option<String>,
        /// Range start (Unix seconds); omit for an instant query
        #[arg(long)]
        start: Option<String>,
        /// Range end (Unix seconds)
        #[arg(long)]
        end: Option<String>,
        /// Range resolution, e.g. 1h
        #[arg(long)]
        step: Option<String>,
    },
    /// Show the effective configuration
    Config {
        /// Write the effective configuration (without the API key) to the
        /// config file
        #[arg(long)]
        save: bool,
    },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

fn print_alert(alert: &Alert) {
    match &alert.title {
        Some(title) => eprintln!("{title} {}", alert.message),
        None => eprintln!("{}", alert.message),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let environment = Environment::current();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(environment.default_log_filter()),
    )
    .format_timestamp_secs()
    .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    log::debug!("Running in {environment} mode against {}", config.base_url);

    if let Commands::Config { save } = cli.command {
        println!("{}", serde_json::to_string_pretty(&config)?);
        if save {
            config.save().context("Failed to save configuration")?;
            log::info!(
                "Saved configuration to {}",
                Config::config_dir()?.join("config.json").display()
            );
        }
        return Ok(());
    }

    let state = AppState::shared();
    let client = ApiClient::from_config(&config, Arc::clone(&state))?;

    if let Some(login) = &cli.login {
        let password = cli
            .password
            .as_deref()
            .context("--login needs a password (--password or MESH_CONSOLE_PASSWORD)")?;
        if let Err(alert) =
            api::try_request_value(&state, api::password_login(&client, login, password)).await
        {
            if let Some(alert) = alert {
                print_alert(&alert);
            } else {
                eprintln!("{}", state.toast.get().message);
            }
            anyhow::bail!("Login failed");
        }
        log::info!(
            "Logged in as {}",
            state.session.snapshot().username().unwrap_or(login.as_str())
        );
    }

    let result = match cli.command {
        Commands::Watch => watch(&config, &client).await,
        Commands::Request {
            method,
            path,
            body,
            query,
        } => request(&client, &state, &method, &path, body.as_deref(), &query).await,
        Commands::Metrics {
            count_type,
            namespace,
            user_id,
            device_id,
            start,
            end,
            step,
        } => {
            let namespace = namespace
                .or_else(|| state.session.snapshot().namespace().map(str::to_string))
                .context("--namespace is required when not logged in")?;
            let query = CountQuery {
                user_id,
                device_id,
                start,
                end,
                step,
                ..CountQuery::new(count_type, namespace)
            };
            metrics(&client, &query).await
        }
        Commands::Config { .. } => Ok(()),
    };

    if cli.login.is_some() {
        api::logout(&client, true).await;
    }

    result
}

async fn watch(config: &Config, client: &ApiClient) -> Result<()> {
    let state = client.state();
    if !state.session.is_admin_authenticated() {
        anyhow::bail!("The notice channel needs an admin session; pass --login");
    }

    let mut transport = WsTransport::new().with_cookie_jar(client.cookie_jar());
    let api_key = config
        .api_key
        .clone()
        .unwrap_or_else(|| state.session.snapshot().api_key);
    if !api_key.is_empty() {
        transport = transport.with_header(API_KEY_HEADER, api_key);
    }

    let url = config.notices_url();
    let handle = NoticeChannel::spawn(
        url,
        config.retry_policy(),
        Arc::clone(state),
        Arc::new(transport),
    );

    let mut notices_rx = state.notices.subscribe();
    let mut alert_rx = state.alert.subscribe();
    let mut toast_rx = state.toast.subscribe();
    let mut status_rx = handle.subscribe_status();
    let mut printed = 0usize;
    let mut expiry = tokio::time::interval(SESSION_CHECK_INTERVAL);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted");
                break;
            }
            _ = expiry.tick() => {
                if state.check_expiration(chrono::Utc::now()) {
                    eprintln!("Session expired, please log in again");
                }
            }
            Ok(()) = notices_rx.changed() => {
                let notices = notices_rx.borrow_and_update().clone();
                if notices.len() < printed {
                    printed = 0;
                }
                // Newest first, so the unseen records are at the front
                for notice in notices.iter().take(notices.len() - printed).rev() {
                    println!("{notice}");
                }
                printed = notices.len();
            }
            Ok(()) = alert_rx.changed() => {
                if let Some(alert) = alert_rx.borrow_and_update().clone() {
                    print_alert(&alert);
                }
            }
            Ok(()) = toast_rx.changed() => {
                let toast = toast_rx.borrow_and_update().clone();
                if toast.visible {
                    eprintln!("{}", toast.message);
                }
            }
            Ok(()) = status_rx.changed() => {
                log::info!("Notice channel {}", *status_rx.borrow_and_update());
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

async fn request(
    client: &ApiClient,
    state: &SharedAppState,
    method: &str,
    path: &str,
    body: Option<&str>,
    query: &[(String, String)],
) -> Result<()> {
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method: {method}"))?;
    let body: Option<Value> = body
        .map(serde_json::from_str)
        .transpose()
        .context("--body is not valid JSON")?;
    let query: Vec<(&str, String)> = query.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();

    match api::try_request_value(state, client.send(method, path, &query, body.as_ref())).await {
        Ok(Some(value)) => println!("{}", serde_json::to_string_pretty(&value)?),
        Ok(None) => {}
        Err(Some(alert)) => {
            print_alert(&alert);
            anyhow::bail!("Request failed");
        }
        Err(None) => {
            eprintln!("{}", state.toast.get().message);
            anyhow::bail!("Request rejected");
        }
    }
    Ok(())
}

async fn metrics(client: &ApiClient, query: &CountQuery) -> Result<()> {
    match api::get_count(client, query).await {
        Ok(CountResult::Count(count)) => {
            println!("{}", count.as_deref().unwrap_or("-"));
        }
        Ok(CountResult::Values(values)) => {
            for sample in values.unwrap_or_default() {
                println!("{}\t{}", sample.timestamp, sample.value);
            }
        }
        Err(Some(alert)) => {
            print_alert(&alert);
            anyhow::bail!("Metrics query failed");
        }
        Err(None) => {
            eprintln!("{}", client.state().toast.get().message);
            anyhow::bail!("Metrics query rejected");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_save_flag() {
        let cli = Cli::try_parse_from(["mesh-console", "config", "--save"]).expect("parse");
        assert!(matches!(cli.command, Commands::Config { save: true }));

        let cli = Cli::try_parse_from(["mesh-console", "config"]).expect("parse");
        assert!(matches!(cli.command, Commands::Config { save: false }));
    }

    #[test]
    fn test_query_pairs_need_equals() {
        assert_eq!(
            parse_key_value("limit=10"),
            Ok(("limit".to_string(), "10".to_string()))
        );
        assert!(parse_key_value("limit").is_err());
    }
}
