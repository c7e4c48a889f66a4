//! Line-oriented terminal loop.

use std::future::Future;
use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::commands::{self, Command, ParseError};
use super::exchange::{ChatSession, ExchangeOutcome};

pub async fn run(mut session: ChatSession) -> Result<()> {
    let name = session.persona_name().to_string();
    println!("{name}: Hi! I'm {name}. Talk to me, or type !help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read input")?,
            _ = interrupted(tokio::signal::ctrl_c()) => {
                println!();
                None
            }
        };
        let Some(line) = line else {
            break;
        };

        match commands::parse(&line) {
            Ok(Command::Exit) => break,
            Ok(Command::Chat(text)) => chat(&mut session, &name, &text).await,
            Ok(command) => match commands::execute(&session, command).await {
                Ok(reply) => println!("{name}: {reply}"),
                Err(e) => {
                    tracing::error!(error = %e, "command failed");
                    println!("{name}: {}", e.user_message());
                }
            },
            Err(ParseError::Empty) => continue,
            Err(e) => println!("{e}"),
        }
    }

    println!("{name}: Saving what I learned...");
    session.shutdown().await;
    println!("{name}: Goodbye!");
    Ok(())
}

async fn chat(session: &mut ChatSession, name: &str, text: &str) {
    let spinner = typing_indicator(name);
    let mut started = false;

    let result = session
        .exchange(
            text,
            |chunk| {
                if !started {
                    spinner.finish_and_clear();
                    print!("{name}: ");
                    started = true;
                }
                print!("{chunk}");
                let _ = std::io::stdout().flush();
            },
            interrupted(tokio::signal::ctrl_c()),
        )
        .await;
    spinner.finish_and_clear();

    match result {
        Ok(ExchangeOutcome::Completed { .. }) => println!(),
        Ok(ExchangeOutcome::Cancelled { .. }) => println!("\n[interrupted]"),
        Err(e) => {
            if started {
                println!();
            }
            println!("{name}: {}", e.user_message());
        }
    }
}

fn typing_indicator(name: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(format!("{name} is typing..."));
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Resolve when the interrupt signal fires. If the handler could not be
/// installed, never resolve, so exchanges run to completion instead of being
/// cancelled at once.
async fn interrupted(signal: impl Future<Output = std::io::Result<()>>) {
    if let Err(e) = signal.await {
        tracing::warn!(error = %e, "cannot listen for Ctrl-C; interrupts disabled");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signal_resolves_interrupt() {
        let fired = tokio::time::timeout(Duration::from_millis(100), interrupted(async { Ok(()) }));
        assert!(fired.await.is_ok());
    }

    #[tokio::test]
    async fn failed_handler_never_interrupts() {
        let signal = async { Err(std::io::Error::other("no signal driver")) };
        let fired = tokio::time::timeout(Duration::from_millis(50), interrupted(signal));
        assert!(fired.await.is_err());
    }
}
