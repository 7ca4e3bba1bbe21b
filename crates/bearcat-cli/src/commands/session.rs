//! Interactive session command
//!
//! Reads commands from stdin while applying ledger snapshots and tip
//! updates as they arrive. The expense list is re-rendered on every
//! snapshot and the tip line on every tip.

use std::io::Write;

use anyhow::{Context, Result};
use bearcat_core::{
    config::Config, total_spent, ExpenseRecord, Phase, SessionController, SessionUpdate,
    SubmitOutcome,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

const HELP: &str = "\
Commands:
  amount <value>          Set the amount
  note <text>             Set the note
  add                     Add an expense from the amount and note
  add <amount> [note...]  Set both and add
  list                    Show expenses
  tip                     Show the latest tip
  help                    Show this help
  quit                    Exit
";

/// A line typed at the session prompt
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    SetAmount(String),
    SetNote(String),
    Submit,
    AddWith { amount: String, note: String },
    List,
    Tip,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

fn split_word(s: &str) -> (&str, &str) {
    match s.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (s, ""),
    }
}

pub fn parse_repl_line(line: &str) -> ReplCommand {
    let (word, rest) = split_word(line.trim());

    match word.to_lowercase().as_str() {
        "" => ReplCommand::Empty,
        "amount" => ReplCommand::SetAmount(rest.to_string()),
        "note" => ReplCommand::SetNote(rest.to_string()),
        "add" if rest.is_empty() => ReplCommand::Submit,
        "add" => {
            let (amount, note) = split_word(rest);
            ReplCommand::AddWith {
                amount: amount.to_string(),
                note: note.to_string(),
            }
        }
        "list" | "ls" => ReplCommand::List,
        "tip" => ReplCommand::Tip,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" | "q" => ReplCommand::Quit,
        _ => ReplCommand::Unknown(word.to_string()),
    }
}

/// Expense list region
pub fn render_ledger(records: &[ExpenseRecord]) -> String {
    let mut out = format!("📒 Expenses ({})\n", records.len());
    if records.is_empty() {
        out.push_str("   No expenses yet.\n");
        return out;
    }
    for record in records {
        out.push_str(&format!("   {}\n", record));
    }
    out.push_str(&format!("   Total: ${:.2}\n", total_spent(records)));
    out
}

/// Tip region
pub fn render_tip(tip: &str) -> String {
    if tip.is_empty() {
        "💡 No tip yet. Add an expense to get one.\n".to_string()
    } else {
        format!("💡 {}\n", tip)
    }
}

pub async fn cmd_session(config: &Config) -> Result<()> {
    let session = SessionController::start(config.ledger_client(), config.advisor())
        .await
        .context("Failed to subscribe to expenses")?;

    println!("🐾 Bearcat Budget (type 'help' for commands)");
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    run_session(session, stdin, &mut stdout).await
}

#[derive(PartialEq)]
enum Flow {
    Continue,
    Quit,
}

/// Drive a session from line input until `quit` or end of input
///
/// At end of input the loop keeps running until any in-flight submission
/// has produced its tip.
pub async fn run_session<R, W>(mut session: SessionController, input: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    // Render the initial snapshot before reading commands
    if let Some(update) = session.next_update().await {
        render_update(&session, &update, out)?;
    }

    let mut lines = input.lines();
    let mut input_open = true;

    loop {
        if !input_open && session.phase() == Phase::Idle {
            break;
        }

        tokio::select! {
            line = lines.next_line(), if input_open => {
                match line.context("Failed to read input")? {
                    Some(line) => {
                        if handle_line(&mut session, &line, out)? == Flow::Quit {
                            break;
                        }
                    }
                    None => input_open = false,
                }
            }
            update = session.next_update() => match update {
                Some(update) => render_update(&session, &update, out)?,
                None => break,
            },
        }
    }

    session.shutdown();
    Ok(())
}

fn handle_line<W: Write>(session: &mut SessionController, line: &str, out: &mut W) -> Result<Flow> {
    match parse_repl_line(line) {
        ReplCommand::SetAmount(amount) => session.set_amount(amount),
        ReplCommand::SetNote(note) => session.set_note(note),
        ReplCommand::Submit => submit(session, out)?,
        ReplCommand::AddWith { amount, note } => {
            // Leave the in-flight submission's buffers alone
            if session.phase() == Phase::Idle {
                session.set_amount(amount);
                session.set_note(note);
            }
            submit(session, out)?;
        }
        ReplCommand::List => write!(out, "{}", render_ledger(&session.state().ledger))?,
        ReplCommand::Tip => write!(out, "{}", render_tip(&session.state().current_tip))?,
        ReplCommand::Help => write!(out, "{}", HELP)?,
        ReplCommand::Quit => return Ok(Flow::Quit),
        ReplCommand::Empty => {}
        ReplCommand::Unknown(word) => {
            writeln!(out, "Unknown command '{}'. Type 'help' for commands.", word)?
        }
    }
    out.flush()?;
    Ok(Flow::Continue)
}

fn submit<W: Write>(session: &mut SessionController, out: &mut W) -> Result<()> {
    match session.submit() {
        SubmitOutcome::Started { total_spent, .. } => {
            writeln!(out, "💾 Saving... (${:.2} spent before this)", total_spent)?
        }
        SubmitOutcome::Invalid(e) => writeln!(out, "⚠️  Not added: {}", e)?,
        SubmitOutcome::Busy => writeln!(out, "⏳ Still saving the previous expense")?,
    }
    Ok(())
}

fn render_update<W: Write>(
    session: &SessionController,
    update: &SessionUpdate,
    out: &mut W,
) -> Result<()> {
    match update {
        SessionUpdate::LedgerReplaced { .. } => {
            write!(out, "{}", render_ledger(&session.state().ledger))?
        }
        SessionUpdate::AppendCommitted(record) => {
            writeln!(out, "✅ Added {}", record)?;
            writeln!(out, "💭 Generating tip...")?;
        }
        SessionUpdate::AppendFailed(error) => {
            writeln!(out, "❌ Could not add expense: {}", error)?;
            writeln!(out, "   Your input was kept; type 'add' to retry.")?;
        }
        SessionUpdate::TipChanged(tip) => write!(out, "{}", render_tip(tip))?,
        SessionUpdate::Ignored => {}
    }
    out.flush()?;
    Ok(())
}
