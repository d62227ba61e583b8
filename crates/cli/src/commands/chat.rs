use std::io::{self, BufRead, Write};
use std::sync::Arc;

use serde_json::json;
use supportdesk_agent::llm::LlmClient;
use supportdesk_core::config::{AppConfig, LoadOptions};
use supportdesk_core::onboarding::OnboardingConfig;
use tracing::warn;

use crate::commands::{
    build_runtime, load_config, load_onboarding, open_agency, provider_client, CommandResult,
    EXIT_RUNTIME,
};

const EXIT_WORDS: [&str; 2] = ["exit", "quit"];

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config("chat", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let onboarding = match load_onboarding("chat", &config) {
        Ok(onboarding) => onboarding,
        Err(result) => return result,
    };
    let client = match provider_client("chat", &config) {
        Ok(client) => client,
        Err(result) => return result,
    };

    let stdin = io::stdin();
    run_session(&config, &onboarding, client, stdin.lock(), io::stdout())
}

/// Reads one message per line until EOF or an exit word. Failed turns are
/// reported inline and the session continues.
pub fn run_session<R, W>(
    config: &AppConfig,
    onboarding: &OnboardingConfig,
    client: Arc<dyn LlmClient>,
    input: R,
    mut output: W,
) -> CommandResult
where
    R: BufRead,
    W: Write,
{
    let mut agency = match open_agency("chat", onboarding, config, client) {
        Ok(agency) => agency,
        Err(result) => return result,
    };
    let runtime = match build_runtime("chat") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let agent_name = agency.agent().name().to_string();
    let mut turns = 0_usize;
    let mut failed_turns = 0_usize;

    let session = (|| -> io::Result<()> {
        writeln!(output, "{agent_name} is ready. Type `exit` or `quit` to leave.")?;
        write!(output, "> ")?;
        output.flush()?;

        for line in input.lines() {
            let line = line?;
            let message = line.trim();
            if EXIT_WORDS.contains(&message) {
                break;
            }

            if !message.is_empty() {
                match runtime.block_on(agency.get_response(message)) {
                    Ok(reply) => {
                        turns += 1;
                        writeln!(output, "{agent_name}: {}", reply.text)?;
                    }
                    Err(error) => {
                        failed_turns += 1;
                        warn!(
                            event_name = "cli.chat.turn_failed",
                            error = %error,
                            "chat turn failed"
                        );
                        writeln!(output, "error: {error}")?;
                    }
                }
            }

            write!(output, "> ")?;
            output.flush()?;
        }

        writeln!(output)?;
        Ok(())
    })();

    if let Err(error) = session {
        return CommandResult::failure(
            "chat",
            "terminal_io",
            format!("terminal session failed: {error}"),
            EXIT_RUNTIME,
        );
    }

    CommandResult::success_with_details(
        "chat",
        "chat session ended",
        Some(json!({
            "turns": turns,
            "failed_turns": failed_turns,
            "thread_id": agency.thread().id,
            "messages": agency.thread().messages.len(),
        })),
    )
}
