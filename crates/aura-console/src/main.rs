//! aura terminal front end
//!
//! Runs the trading assistant against a paper brokerage. `AURA_PROVIDER`
//! picks the model: `keyword` (offline, default) or `openai` (any
//! OpenAI-compatible server, see `OPENAI_BASE_URL`). Type a request, or one of:
//!
//! - `/confirm`   execute the receipt on screen
//! - `/cancel`    dismiss the receipt
//! - `/clear`     dismiss the chart
//! - `/reset`     back to the entry screen
//! - `/account`   balances of the paper account
//! - `/positions` open holdings
//! - `/quit`

mod keyword;
mod render;

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aura_assistant::{
    Assistant, AssistantConfig, AssistantError, AssistantSnapshot, Effect, InteractionMode,
    brokerage::{MarketDataClient, PaperBrokerage, TradeExecutor},
    tools::trading_tools,
};
use aura_core::{Agent, LlmProvider, Role};
use aura_runtime::OpenAiProvider;

use crate::keyword::KeywordProvider;

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Confirm,
    Cancel,
    Clear,
    Reset,
    Account,
    Positions,
    Quit,
    Say(String),
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let command = match line {
            "" => return None,
            "/confirm" => Self::Confirm,
            "/cancel" => Self::Cancel,
            "/clear" => Self::Clear,
            "/reset" => Self::Reset,
            "/account" => Self::Account,
            "/positions" => Self::Positions,
            "/quit" | "/exit" => Self::Quit,
            text => Self::Say(text.to_string()),
        };
        Some(command)
    }
}

/// Model backend selected by `AURA_PROVIDER`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ProviderKind {
    Keyword,
    OpenAi,
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "keyword" => Ok(Self::Keyword),
            "openai" => Ok(Self::OpenAi),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

fn provider_from_env() -> anyhow::Result<Arc<dyn LlmProvider>> {
    let kind = std::env::var("AURA_PROVIDER")
        .ok()
        .map_or(Ok(ProviderKind::Keyword), |v| v.parse())
        .map_err(anyhow::Error::msg)?;

    let provider: Arc<dyn LlmProvider> = match kind {
        ProviderKind::Keyword => Arc::new(KeywordProvider::new()),
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::from_env()?),
    };
    Ok(provider)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Logs go to stderr so they never interleave with the conversation
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn,aura_assistant=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = AssistantConfig::from_env();

    let brokerage = Arc::new(PaperBrokerage::new());
    let market: Arc<dyn MarketDataClient> = brokerage.clone();
    let executor: Arc<dyn TradeExecutor> = brokerage;
    let account: Arc<dyn TradeExecutor> = executor.clone();

    let tools = trading_tools(&market);
    tracing::info!("Registered {} tools: {}", tools.len(), tools.names().join(", "));

    let provider = provider_from_env()?;
    if !provider.health_check().await.unwrap_or(false) {
        tracing::warn!(provider = provider.name(), "Provider not available");
    }
    let provider_name = provider.name().to_string();
    let agent = Agent::new(provider, Arc::new(tools), config.agent_config());

    let mut assistant = Assistant::new(Arc::new(agent), executor, &config);
    let mut shown = assistant.snapshot();

    println!(
        "aura · paper trading · {} via {} · {} ({})",
        mode_name(config.mode),
        market.name(),
        config.generation.model,
        provider_name,
    );
    println!("{}", render::phase_title(shown.phase));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let effects = tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let Some(command) = Command::parse(&line) else { continue };
                if matches!(command, Command::Account | Command::Positions) {
                    report(account.as_ref(), &command).await;
                    continue;
                }
                match run(&mut assistant, command) {
                    Ok(Some(effects)) => effects,
                    Ok(None) => break,
                    Err(e) => {
                        println!("  ! {e}");
                        Vec::new()
                    }
                }
            }
            Some(effects) = assistant.process_next() => effects,
        };

        let was_busy = shown.is_busy;
        shown = show(&assistant, &shown, &effects);
        if was_busy && !shown.is_busy && config.mode == InteractionMode::Chat {
            print_reply(&assistant);
        }
    }

    let session = assistant.state().ingestor().session();
    tracing::info!(
        session_id = %session.id(),
        title = %session.title(),
        turns = session.turns().len(),
        "Session ended"
    );

    Ok(())
}

/// Print account balances or holdings
async fn report(executor: &dyn TradeExecutor, command: &Command) {
    let lines = match command {
        Command::Account => executor.account().await.map(|a| render::account_lines(&a)),
        Command::Positions => executor.positions().await.map(|p| render::position_lines(&p)),
        _ => return,
    };
    match lines {
        Ok(lines) => {
            for line in lines {
                println!("{line}");
            }
        }
        Err(e) => println!("  ! {e}"),
    }
}

/// Apply a user command. `Ok(None)` means quit.
fn run(
    assistant: &mut Assistant,
    command: Command,
) -> Result<Option<Vec<Effect>>, AssistantError> {
    let effects = match command {
        Command::Say(text) => {
            assistant.submit(&text)?;
            assistant.stop_speaking()
        }
        Command::Confirm => {
            assistant.confirm_trade()?;
            Vec::new()
        }
        Command::Cancel => assistant.cancel_trade()?,
        Command::Clear => assistant.clear_chart(),
        Command::Reset => assistant.reset_to_entry(),
        Command::Account | Command::Positions => Vec::new(),
        Command::Quit => return Ok(None),
    };
    Ok(Some(effects))
}

/// Print effects and snapshot changes; returns the snapshot now on screen
fn show(
    assistant: &Assistant,
    shown: &AssistantSnapshot,
    effects: &[Effect],
) -> AssistantSnapshot {
    let next = assistant.snapshot();
    for line in render::diff(shown, &next) {
        println!("{line}");
    }
    for effect in effects {
        if let Some(line) = render::effect_line(effect) {
            println!("{line}");
        }
        if matches!(effect, Effect::Speak(_)) {
            // Printing is instant, so playback is already over
            for follow_up in assistant.speech_finished() {
                tracing::debug!(?follow_up, "Voice follow-up");
            }
        }
    }
    next
}

fn print_reply(assistant: &Assistant) {
    let reply = assistant
        .state()
        .turns()
        .last()
        .filter(|t| t.role == Role::Assistant)
        .and_then(|t| t.text.as_deref());
    if let Some(text) = reply {
        println!("aura> {text}");
    }
}

const fn mode_name(mode: InteractionMode) -> &'static str {
    match mode {
        InteractionMode::Voice => "voice",
        InteractionMode::Chat => "chat",
    }
}
