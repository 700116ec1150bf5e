//! LabGate Console - headless mirror of the access-history page.
//!
//! Signs in with `LABGATE_TOKEN` (or the stored session), joins the admin
//! group, and logs the first page of access logs plus the summary stats
//! every time the collection changes. Ctrl-C signs out cleanly.

use anyhow::Context;
use labgate_client::api_client::paths;
use labgate_client::logging::init_tracing;
use labgate_client::storage::Storage;
use labgate_client::sync::Handler;
use labgate_client::{log_error, log_info, log_warn, presets, AuthSession, ClientConfig, Session};
use labgate_shared::{events, AccessLog, DashboardStats};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = ClientConfig::from_env();
    let session = Session::new(config.clone(), Storage::platform());

    let auth = match std::env::var("LABGATE_TOKEN") {
        Ok(token) if !token.trim().is_empty() => AuthSession::new(token),
        _ => session
            .restore()
            .context("no credential: set LABGATE_TOKEN or sign in first")?,
    };
    session.init(auth)?;

    let logs = session.resource::<AccessLog>(paths::ACCESS_LOGS);
    let _refetch = logs.bind(session.router(), &events::access_log_changes());
    let _stats = session.router().subscribe(
        events::DASHBOARD_STATS,
        Handler::typed(|stats: DashboardStats| {
            log_info!(
                "dashboard: {} active sessions, {} check-ins today",
                stats.active_sessions,
                stats.today_check_ins
            );
            Ok(())
        }),
    );

    if let Err(e) = logs.refresh().await {
        log_warn!("initial fetch failed: {}", e.user_message());
    }

    let mut view = presets::access_log_view(logs.store().clone(), config.page_size);
    let mut changes = logs.store().subscribe();
    let mut states = session.connection().state_changes();

    loop {
        let snapshot = view.snapshot();
        log_info!(
            "page {}/{}: {} of {} records",
            snapshot.page.meta.current_page,
            snapshot.page.meta.total_pages,
            snapshot.page.items.len(),
            snapshot.page.meta.total_items
        );
        if let Some(stats) = &snapshot.stats {
            log_info!(
                "{} sessions, {} active, average {}, busiest {}",
                stats.total,
                stats.active,
                stats.average_duration,
                stats.top_group.as_deref().unwrap_or("-")
            );
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    log_error!("access log store dropped");
                    break;
                }
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                log_info!("push channel: {:?}", *states.borrow_and_update());
            }
        }
    }

    session.teardown();
    Ok(())
}
