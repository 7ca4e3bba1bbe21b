//! Status command: configuration and backend health

use anyhow::Result;
use bearcat_core::{config::Config, total_spent};

use super::fetch_snapshot;

pub async fn cmd_status(config: &Config) -> Result<()> {
    println!();
    println!("📊 Bearcat Status");
    println!("   ─────────────────────────────────────────────────────────────");

    for (label, value) in config.summary() {
        println!("   {}: {}", label, value);
    }
    println!();

    let advisor = config.advisor();
    if advisor.health_check().await {
        println!("   ✅ AI backend: reachable ({})", advisor.model());
    } else {
        println!("   ❌ AI backend: unreachable");
        println!("      Tips will show the fallback message until it responds.");
    }

    match fetch_snapshot(&config.ledger_client()).await {
        Ok(records) => println!(
            "   ✅ Ledger: {} expenses, ${:.2} total",
            records.len(),
            total_spent(&records)
        ),
        Err(e) => println!("   ❌ Ledger: {:#}", e),
    }

    println!();
    Ok(())
}
