//! One-shot ledger commands (add, list)

use anyhow::{anyhow, bail, Context, Result};
use bearcat_core::{
    config::Config, parse_amount, ExpenseRecord, LedgerClient, LedgerStore, SessionController,
    SessionUpdate, Snapshot, SubmitOutcome, TipAdvisor,
};

use super::render_ledger;

pub async fn cmd_add(config: &Config, amount: &str, note: &str) -> Result<()> {
    let (record, tip) = add_expense(config.ledger_client(), config.advisor(), amount, note).await?;

    println!("✅ Added {}", record);
    println!("💡 {}", tip);
    Ok(())
}

/// Add one expense through a session and wait for its tip
pub async fn add_expense(
    store: LedgerClient,
    advisor: TipAdvisor,
    amount: &str,
    note: &str,
) -> Result<(ExpenseRecord, String)> {
    // Reject before connecting to anything
    parse_amount(amount).map_err(|e| anyhow!("Invalid amount '{}': {}", amount, e))?;

    let mut session = SessionController::start(store, advisor)
        .await
        .context("Failed to subscribe to expenses")?;

    // The tip total covers what is already in the ledger
    session
        .next_update()
        .await
        .ok_or_else(|| anyhow!("Expense subscription closed before the first snapshot"))?;

    session.set_amount(amount);
    session.set_note(note);
    match session.submit() {
        SubmitOutcome::Started { .. } => {}
        SubmitOutcome::Invalid(e) => bail!("Invalid amount '{}': {}", amount, e),
        SubmitOutcome::Busy => bail!("Another expense is still being saved"),
    }

    let mut added = None;
    loop {
        let update = session
            .next_update()
            .await
            .ok_or_else(|| anyhow!("Session ended before the expense was saved"))?;

        match update {
            SessionUpdate::AppendCommitted(record) => added = Some(record),
            SessionUpdate::AppendFailed(error) => bail!("Failed to add expense: {}", error),
            SessionUpdate::TipChanged(tip) => {
                let record = added.ok_or_else(|| anyhow!("Tip arrived before the expense"))?;
                session.shutdown();
                return Ok((record, tip));
            }
            SessionUpdate::LedgerReplaced { .. } | SessionUpdate::Ignored => {}
        }
    }
}

pub async fn cmd_list(config: &Config, json: bool) -> Result<()> {
    let records = fetch_snapshot(&config.ledger_client()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        print!("{}", render_ledger(&records));
    }
    Ok(())
}

/// Read the collection once
pub async fn fetch_snapshot(store: &LedgerClient) -> Result<Snapshot> {
    let mut subscription = store
        .subscribe()
        .await
        .context("Failed to read expenses")?;

    let snapshot = subscription
        .next()
        .await
        .ok_or_else(|| anyhow!("Expense subscription closed before the first snapshot"))?;
    subscription.unsubscribe();
    Ok(snapshot)
}
