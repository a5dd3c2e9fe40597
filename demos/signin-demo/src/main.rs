//! Twitch Sign-in Demo
//!
//! Walks through the implicit-grant flow from a terminal:
//! 1. Load any persisted token and fetch the current user
//! 2. Print the Twitch authorization URL
//! 3. User signs in and pastes the URL they were redirected to
//! 4. Validate the callback and store the token
//! 5. The token observer fetches the signed-in user
//!
//! Run with: cargo run -p twitch-signin-demo

mod config;

use std::io::{BufRead, Write};
use std::time::Duration;
use twitch_session::{SessionManager, User};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "twitch_session=debug".into()),
        )
        .init();

    let session = SessionManager::builder()
        .config(config::oauth_config())
        .location(config::app_location())
        .file_storage(config::storage_dir())
        .build()?;

    let command = std::env::args().nth(1);
    match command.as_deref() {
        None => sign_in(&session).await,
        Some("status" | "--status") => status(&session).await,
        Some("logout" | "--logout") => {
            session.logout()?;
            println!("✓ Signed out");
            Ok(())
        }
        Some("help" | "--help" | "-h") => {
            print_help();
            Ok(())
        }
        Some(other) => {
            eprintln!("Unknown command: {other}");
            print_help();
            Ok(())
        }
    }
}

async fn sign_in(session: &SessionManager) -> anyhow::Result<()> {
    if let Err(e) = session.start().await {
        tracing::warn!("Stored token could not be used: {e}");
    }

    if let Some(user) = session.current_user() {
        println!("✓ Already signed in");
        println!();
        print_user(&user);
        println!();
        println!("To sign out: cargo run -p twitch-signin-demo -- logout");
        return Ok(());
    }

    let url = session.signin_url()?;
    println!("To sign in:");
    println!("  1. Open the following URL in your browser");
    println!("  2. Authorize the application on Twitch");
    println!("  3. Copy the full address of the page you land on");
    println!();
    println!("  {url}");
    println!();
    print!("Paste the redirect address (or 'cancel'): ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().lock().read_line(&mut input)?;
    let input = input.trim();
    if input.is_empty() || input.eq_ignore_ascii_case("cancel") {
        session.logout()?;
        println!("Cancelled.");
        return Ok(());
    }

    // The token arrives in the last fragment of the redirect address
    let callback = input.rsplit_once('#').map_or(input, |(_, fragment)| fragment);

    let mut users = session.watch_current_user();
    session.complete_sign_in(callback).await?;

    if !session.is_signed_in() {
        println!("✗ Sign-in was rejected (state mismatch or missing token).");
        return Ok(());
    }

    match tokio::time::timeout(Duration::from_secs(10), users.wait_for(Option::is_some)).await {
        Ok(Ok(user)) => {
            if let Some(user) = &*user {
                println!();
                println!("✓ Signed in");
                print_user(user);
            }
        }
        _ => println!("Signed in, but the user profile could not be loaded yet."),
    }

    session.shutdown();
    Ok(())
}

async fn status(session: &SessionManager) -> anyhow::Result<()> {
    println!("Session Status");
    println!("──────────────");
    println!();

    if !session.is_signed_in() {
        println!("Status: Not signed in");
    } else {
        match session.refresh_current_user().await {
            Ok(()) => {
                println!("Status: Signed in ✓");
                if let Some(user) = session.current_user() {
                    println!();
                    print_user(&user);
                }
            }
            Err(e) => println!("Status: Token present but not usable ({e})"),
        }
    }

    println!();
    println!("Storage: {}", config::storage_dir().display());
    println!("Redirect URI: {}", session.redirect_uri());
    Ok(())
}

fn print_user(user: &User) {
    println!("User:");
    println!("  Name: {} ({})", user.display_name, user.login);
    println!("  Id: {}", user.id);
    if !user.broadcaster_type.is_empty() {
        println!("  Broadcaster: {}", user.broadcaster_type);
    }
    if let Some(ref email) = user.email {
        println!("  Email: {email}");
    }
}

fn print_help() {
    println!("Usage: cargo run -p twitch-signin-demo [COMMAND]");
    println!();
    println!("Commands:");
    println!("  (none)     Sign in, or show the signed-in user");
    println!("  status     Show current session status");
    println!("  logout     Clear the stored session");
    println!("  help       Show this help message");
    println!();
    println!("Environment:");
    println!("  TWITCH_CLIENT_ID        Override the application client id");
    println!("  TWITCH_SESSION_ORIGIN   Origin used for the redirect URI");
    println!("  TWITCH_SESSION_DIR      Storage directory");
}
