//! Fetch worker -- downloads one account's report at a time
//!
//! Each worker opens a single authenticated session at startup (retrying
//! indefinitely on initialization errors, e.g. a credentials file that is
//! momentarily unreadable) and then drains the account-id queue. Downloads
//! run under the classified bounded retry; an account whose budget is spent
//! is dropped for the pass after its partial staged file is removed, unless
//! `requeue_fetch_failures` routes it into the failure collector.

use super::FetchContext;
use crate::client::ReportSession;
use crate::retry::download_with_retry;
use crate::types::AccountId;
use std::sync::Arc;
use std::time::Duration;

/// Pause between session initialization attempts
const SESSION_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Run one fetch worker until the account-id queue closes
pub(crate) async fn run_fetch_worker(ctx: FetchContext) {
    let session = open_session(&ctx).await;

    while let Some(account) = ctx.ids.recv().await {
        fetch_one(&ctx, session.as_ref(), &account).await;
        ctx.ids.ack();
    }

    tracing::debug!(worker = ctx.worker, "fetch worker finished");
}

/// Open the worker's session, retrying indefinitely on initialization errors
async fn open_session(ctx: &FetchContext) -> Arc<dyn ReportSession> {
    loop {
        match ctx.api.open_session(ctx.worker).await {
            Ok(session) => return session,
            Err(e) => {
                tracing::warn!(
                    worker = ctx.worker,
                    error = %e,
                    "could not open report session, retrying"
                );
                tokio::time::sleep(SESSION_RETRY_DELAY).await;
            }
        }
    }
}

/// Download one account's report into the staging area
async fn fetch_one(ctx: &FetchContext, session: &dyn ReportSession, account: &AccountId) {
    let staged = ctx.work_dir.join(account.staged_file_name());

    let result = download_with_retry(&ctx.retry, || {
        session.download_report(account, &ctx.query, &staged)
    })
    .await;

    match result {
        Ok(()) => {
            tracing::info!(worker = ctx.worker, account = %account, "report staged");
            ctx.extract_queue.push(account.clone()).await;
        }
        Err(e) => {
            tracing::warn!(
                worker = ctx.worker,
                account = %account,
                error = %e,
                "giving up on account for this pass"
            );
            // A failed attempt may leave a partial staged file behind
            let _ = tokio::fs::remove_file(&staged).await;
            if ctx.requeue_fetch_failures {
                ctx.failures.push(account.clone()).await;
            }
        }
    }
}
