use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::eyre;
use tracing::info;

use votecaster_session::{
    auth::{LoginPrompt, PollResult},
    ApiClient, ClientConfig, FileStore, Profile, Reputation, SessionController, SessionStore,
    Validation,
};

mod setup;

/// Sign in to Votecaster from the terminal
#[derive(Parser, Debug)]
#[command(name = "votecaster-login", version)]
struct Cli {
    /// Backend base URL (overrides APP_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Session file (overrides VOTECASTER_SESSION_FILE)
    #[arg(long, global = true)]
    session_file: Option<PathBuf>,

    /// Sign-in polling interval in milliseconds (overrides POLL_INTERVAL_MS)
    #[arg(long, global = true)]
    poll_interval_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in with Farcaster by scanning or opening a one-time link
    Login {
        /// Give up and close the prompt after this many seconds
        #[arg(long, default_value = "300")]
        timeout: u64,
    },
    /// Sign in with a bearer token, or a URL carrying a `token` parameter
    Token { token: String },
    /// Check the stored session against the backend and show it
    Status,
    /// Forget the stored session
    Logout,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async { run_application().await })
}

async fn run_application() -> color_eyre::Result<()> {
    setup::setup_tracing("votecaster_session")?;

    let cli = Cli::parse();
    let config = resolve_config(&cli);
    info!(app_url = %config.app_url, session_file = %config.session_file.display(), "Starting");

    let controller = Arc::new(SessionController::new(
        ApiClient::new(&config.app_url),
        SessionStore::new(FileStore::new(&config.session_file)),
    ));

    match cli.command {
        Command::Login { timeout } => {
            login(controller, config.poll_interval, Duration::from_secs(timeout)).await
        }
        Command::Token { token } => token_login(&controller, &token).await,
        Command::Status => status(&controller).await,
        Command::Logout => {
            controller.logout();
            println!("Signed out.");
            Ok(())
        }
    }
}

fn resolve_config(cli: &Cli) -> ClientConfig {
    let env = ClientConfig::from_env();

    ClientConfig::new(
        cli.api_url.clone().unwrap_or(env.app_url),
        cli.session_file.clone().unwrap_or(env.session_file),
        cli.poll_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(env.poll_interval),
    )
}

async fn login(
    controller: Arc<SessionController>,
    interval: Duration,
    timeout: Duration,
) -> color_eyre::Result<()> {
    if controller.validate_on_startup().await == Validation::Valid {
        if let Some(profile) = controller.profile() {
            println!("Already signed in as @{}.", profile.username);
            return Ok(());
        }
    }

    let mut prompt = LoginPrompt::open(controller.clone(), interval);
    let ticket = prompt.start().await?.clone();

    println!("Sign in with Farcaster");
    println!("Scan with your phone's camera or open this link to continue:");
    println!();
    println!("  {}", ticket.url);
    println!();
    println!("Waiting for confirmation...");

    let result = tokio::select! {
        result = prompt.wait() => result,
        _ = tokio::time::sleep(timeout) => {
            println!("Timed out waiting for sign-in.");
            None
        }
        _ = tokio::signal::ctrl_c() => {
            println!("Sign-in cancelled.");
            None
        }
    };
    prompt.close();

    match result {
        Some(PollResult::LoggedIn(profile)) => {
            print_profile(&profile, controller.reputation().as_ref());
            Ok(())
        }
        Some(PollResult::Failed(err)) => Err(err.into()),
        Some(PollResult::Superseded) => {
            println!("Signed in.");
            Ok(())
        }
        Some(PollResult::Cancelled) | None => Err(eyre!("sign-in was not completed")),
    }
}

async fn token_login(controller: &SessionController, input: &str) -> color_eyre::Result<()> {
    let looks_like_url = input.contains('?') || input.contains('=');
    if looks_like_url {
        if !controller.token_login_from_url(input).await? {
            if controller.is_authenticated() {
                println!("Already signed in; run `logout` first to switch accounts.");
                return Ok(());
            }
            return Err(eyre!("no token parameter found in {input}"));
        }
    } else {
        controller.token_login(input).await?;
    }

    if let Some(profile) = controller.profile() {
        print_profile(&profile, controller.reputation().as_ref());
    }
    Ok(())
}

async fn status(controller: &SessionController) -> color_eyre::Result<()> {
    match controller.validate_on_startup().await {
        Validation::NoSession => println!("Not signed in."),
        Validation::Invalidated => println!("Stored session expired; sign in again."),
        Validation::Valid => {
            if let Some(profile) = controller.profile() {
                print_profile(&profile, controller.reputation().as_ref());
            }
        }
    }
    Ok(())
}

fn print_profile(profile: &Profile, reputation: Option<&Reputation>) {
    println!(
        "Signed in as {} (@{}, fid {})",
        profile.display_name, profile.username, profile.fid
    );
    if let Some(reputation) = reputation {
        let points = &reputation.data.points;
        println!(
            "Reputation {} · {} points ({} as owner, {} as voter)",
            reputation.reputation, points.total_points, points.owner_points, points.voter_points
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_flags_override_environment() {
        let cli = Cli::parse_from([
            "votecaster-login",
            "--api-url",
            "http://127.0.0.1:4000/",
            "--poll-interval-ms",
            "100",
            "status",
        ]);

        let config = resolve_config(&cli);

        assert_eq!(config.app_url, "http://127.0.0.1:4000");
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert!(matches!(cli.command, Command::Status));
    }

    #[test]
    fn test_login_timeout_default() {
        let cli = Cli::parse_from(["votecaster-login", "login"]);

        assert!(matches!(cli.command, Command::Login { timeout: 300 }));
    }
}
