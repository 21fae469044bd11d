//! campus-gate - diagnostic harness for the campus authentication core.
//!
//! Runs the same startup sequence an app would: load config, open the
//! credential store, warm up the SSO session, then fetch through it.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::FutureExt;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use url::Url;

use campus_gate_core::cache::{CacheActor, DiskCache};
use campus_gate_core::proxy::ProxyMode;
use campus_gate_core::{AuthError, Authenticator, CampusServices, Config, StudentType};

const USERNAME_ENV: &str = "CAMPUS_GATE_USERNAME";
const VAULT_KEY_ENV: &str = "CAMPUS_GATE_VAULT_KEY";

const USAGE: &str = "\
Usage: campus-gate <command>

Commands:
  login [--graduate]               Store a credential and verify it
  logout                           Forget the credential and every session
  status                           Warm up the session and report its state
  fetch <url> [--refresh] [--legacy]
                                   Authenticated fetch, cached on disk";

fn init_tracing() {
    // RUST_LOG controls the level, e.g. RUST_LOG=campus_gate_core=debug
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };
    let flags = &args[1..];

    let config = Config::load()?;
    let vault_key = std::env::var(VAULT_KEY_ENV).ok();
    let credentials = Arc::new(CampusServices::open_credential_store(&config, vault_key)?);
    let services = CampusServices::new(config, credentials)?;
    info!(command = %command, "campus-gate starting");

    match command.as_str() {
        "login" => login(&services, has_flag(flags, "--graduate")).await,
        "logout" => {
            services.logout().await?;
            println!("Logged out.");
            Ok(())
        }
        "status" => status(&services).await,
        "fetch" => {
            let url = flags
                .iter()
                .find(|a| !a.starts_with("--"))
                .context("fetch needs a URL")?;
            let url = Url::parse(url).with_context(|| format!("Invalid URL: {}", url))?;
            fetch(
                &services,
                url,
                has_flag(flags, "--refresh"),
                has_flag(flags, "--legacy"),
            )
            .await
        }
        other => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(2);
        }
    }
}

fn has_flag(flags: &[String], flag: &str) -> bool {
    flags.iter().any(|a| a == flag)
}

fn prompt_username() -> Result<String> {
    if let Ok(username) = std::env::var(USERNAME_ENV) {
        return Ok(username);
    }

    print!("Student ID: ");
    io::stdout().flush()?;
    let mut username = String::new();
    io::stdin().read_line(&mut username)?;
    Ok(username.trim().to_string())
}

async fn login(services: &CampusServices, graduate: bool) -> Result<()> {
    let username = prompt_username()?;
    let password = rpassword::prompt_password("Password: ")?;
    if username.is_empty() || password.is_empty() {
        anyhow::bail!("Username and password required");
    }

    let student_type = if graduate {
        StudentType::Graduate
    } else {
        StudentType::Undergraduate
    };

    match services.login(&username, &password, student_type).await {
        Ok(()) => {
            println!("Login successful!");
            Ok(())
        }
        Err(AuthError::NeedsCaptcha { manual_login_url }) => {
            println!("The SSO server wants a captcha. Log in once at:\n  {}", manual_login_url);
            println!("then run this command again.");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn status(services: &CampusServices) -> Result<()> {
    let credentials = services.credentials();
    let Some(credential) = credentials.get() else {
        println!("No credential configured. Run `campus-gate login`.");
        return Ok(());
    };
    println!("Credential: {} ({:?})", credential.username, credential.student_type);

    services.initial_fetch().await;

    let mode = match services.coordinator().state().mode() {
        ProxyMode::DirectPreferred => "direct",
        ProxyMode::TunnelForced => "WebVPN tunnel",
    };
    println!("Network: {}", mode);

    report_session(&services.cas()).await;
    if let Some(legacy) = services.legacy() {
        report_session(&legacy).await;
    }
    Ok(())
}

async fn report_session(authenticator: &Authenticator) {
    match authenticator.last_login().await {
        Some(at) => println!("{}: logged in at {}", authenticator.name(), at.format("%H:%M:%S")),
        None => println!("{}: no session", authenticator.name()),
    }
}

async fn fetch(services: &CampusServices, url: Url, refresh: bool, legacy: bool) -> Result<()> {
    let authenticator = if legacy {
        services.legacy().context("No legacy login is configured")?
    } else {
        services.cas()
    };

    let cache_dir = services.config().data_dir()?.join("cache");
    let pages = CacheActor::new("pages", move |url: Url| {
        let authenticator = Arc::clone(&authenticator);
        async move {
            let body = authenticator.authenticate(&url, None).await?;
            Ok(String::from_utf8_lossy(&body).into_owned())
        }
        .boxed()
    })
    .with_persistence(Box::new(DiskCache::new(cache_dir, "pages")?));

    let entry = if refresh {
        pages.get_refreshed(url).await?
    } else {
        pages.get_cached(url).await?
    };

    eprintln!("(fetched {})", entry.age_display());
    println!("{}", entry.value);
    Ok(())
}
