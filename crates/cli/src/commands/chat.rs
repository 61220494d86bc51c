use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use deploydesk_agent::{
    DialogueRuntime, HttpValidationGateway, SessionRegistry, TracingAuditSink, TurnReply,
};
use deploydesk_core::config::{AppConfig, LoadOptions};
use deploydesk_core::flows::{DialogueEngine, DialogueState};
use deploydesk_core::gateway::ValidationGateway;

use crate::commands::{CommandResult, ErrorClass};

/// Interactive dialogue on stdin/stdout against the configured authorities.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                ErrorClass::ConfigValidation,
                error.to_string(),
            );
        }
    };
    init_logging(&config);

    let gateway = match HttpValidationGateway::from_config(&config) {
        Ok(gateway) => gateway,
        Err(error) => {
            return CommandResult::failure("chat", ErrorClass::GatewaySetup, error.to_string());
        }
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    match converse(&config, Arc::new(gateway), stdin.lock(), &mut stdout) {
        Ok(state) => {
            CommandResult::success("chat", format!("conversation ended in state {state:?}"))
        }
        Err(error) => CommandResult::failure("chat", ErrorClass::Runtime, format!("{error:#}")),
    }
}

/// Runs one conversation until it ends or input runs out, returning the
/// state it stopped in.
pub fn converse<R, W>(
    config: &AppConfig,
    gateway: Arc<dyn ValidationGateway>,
    input: R,
    output: &mut W,
) -> Result<DialogueState>
where
    R: BufRead,
    W: Write,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to initialize async runtime")?;

    let engine = DialogueEngine::new(config.software_registry(), config.response_markers());
    let dialogue = DialogueRuntime::new(engine, gateway, Arc::new(TracingAuditSink));
    let sessions = SessionRegistry::new(Arc::new(dialogue));

    let opening = runtime.block_on(sessions.open("cli"));
    let session_id = opening.session_id.clone();
    print_reply(output, &opening)?;
    let mut state = opening.next_state;

    for (turn, line) in input.lines().enumerate() {
        let line = line.context("failed to read input")?;
        let correlation_id = format!("cli-{}", turn + 1);
        let reply = runtime
            .block_on(sessions.submit_text(&session_id, &line, &correlation_id))
            .context("turn failed")?;
        print_reply(output, &reply)?;

        state = reply.next_state;
        if state.is_terminal() {
            break;
        }
    }

    Ok(state)
}

fn print_reply<W: Write>(output: &mut W, reply: &TurnReply) -> Result<()> {
    writeln!(output, "{}\n", reply.message_text).context("failed to write reply")?;
    output.flush().context("failed to flush output")
}

fn init_logging(config: &AppConfig) {
    use deploydesk_core::config::LogFormat::*;
    use tracing_subscriber::filter::LevelFilter;

    // Replies own stdout; logs go to stderr.
    let level = config.logging.level.parse::<LevelFilter>().unwrap_or(LevelFilter::WARN);
    let builder =
        tracing_subscriber::fmt().with_target(false).with_max_level(level).with_writer(io::stderr);

    let _ = match config.logging.format {
        Compact => builder.compact().try_init(),
        Pretty => builder.pretty().try_init(),
        Json => builder.json().try_init(),
    };
}
