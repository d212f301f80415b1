//! `nitpick hook forward` and `nitpick hook notify`
//!
//! Both read the host's hook JSON on stdin. They never fail loudly for the
//! host: errors are logged and turned into exit codes.

use std::io::Write;
use std::process::ExitCode;

use tokio::io::AsyncReadExt;
use tracing::{debug, error, warn};

use nitpick_core::Platform;
use nitpick_core::delivery;
use nitpick_core::hook::{DEFAULT_SERVER_URL, SERVER_URL_ENV, SKIP_FORWARD_ENV, prepare_forward};

async fn read_stdin() -> std::io::Result<String> {
    let mut raw = String::new();
    tokio::io::stdin().read_to_string(&mut raw).await?;
    Ok(raw)
}

fn server_url() -> String {
    std::env::var(SERVER_URL_ENV)
        .ok()
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
}

pub async fn forward(platform: Platform) -> ExitCode {
    if std::env::var(SKIP_FORWARD_ENV).is_ok_and(|v| v == "1") {
        debug!("{} set, not forwarding", SKIP_FORWARD_ENV);
        return ExitCode::SUCCESS;
    }

    match try_forward(platform).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Hook forward failed: {:#}", e);
            eprintln!("nitpick: hook forward failed: {}", e);
            ExitCode::from(1)
        }
    }
}

async fn try_forward(platform: Platform) -> anyhow::Result<()> {
    let raw = read_stdin().await?;
    let cwd = std::env::current_dir()?;
    let (session_id, envelope) = prepare_forward(platform, &raw, &cwd)?;
    nitpick_core::hook::forward(&server_url(), &session_id, &envelope).await?;
    Ok(())
}

pub async fn notify(platform: Platform) -> ExitCode {
    let raw = match read_stdin().await {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Failed to read hook input: {}", e);
            return ExitCode::SUCCESS;
        }
    };
    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(e) => {
            warn!("No working directory: {}", e);
            return ExitCode::SUCCESS;
        }
    };

    let notification = match delivery::notify(platform, &raw, &cwd) {
        Ok(notification) => notification,
        Err(e) => {
            warn!("Hook notify failed: {}", e);
            return ExitCode::SUCCESS;
        }
    };

    if let Some(out) = &notification.stdout {
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{}", out);
        let _ = stdout.flush();
    }
    if let Some(err) = &notification.stderr {
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "{}", err);
        let _ = stderr.flush();
    }
    ExitCode::from(notification.exit_code as u8)
}
