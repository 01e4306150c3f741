use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;
use url::Url;
use uuid::Uuid;

use triage_desk::config::ConfigOverrides;
use triage_desk::kiosk::build_speech_output;
use triage_desk::{Config, ConversationClient, Kiosk, Locale, WebhookClient, parse_response};

/// Triage Desk - Voice-driven virtual triage assistant
#[derive(Parser)]
#[command(name = "triage", version, about)]
struct Cli {
    /// Alternate config file
    #[arg(short, long, env = "TRIAGE_CONFIG")]
    config: Option<PathBuf>,

    /// Patient-facing language (pt-BR, en)
    #[arg(long)]
    locale: Option<Locale>,

    /// Triage webhook URL
    #[arg(long)]
    webhook_url: Option<Url>,

    /// TTS proxy endpoint
    #[arg(long)]
    tts_url: Option<Url>,

    /// Disable speech output
    #[arg(long)]
    mute: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Send one message to the triage backend and print the reply
    Ask {
        /// Message to send
        text: String,
        /// Session id to continue (a new one is generated otherwise)
        #[arg(long)]
        session: Option<Uuid>,
    },
    /// Speak text through the configured speech output
    Speak {
        /// Text to speak
        #[arg(default_value = "Olá! Este é um teste da síntese de voz.")]
        text: String,
    },
    /// Print the effective configuration (secrets redacted)
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,triage_desk=info",
        1 => "info,triage_desk=debug",
        2 => "debug",
        _ => "trace",
    };

    // Logs go to stderr; stdout belongs to the console
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let overrides = ConfigOverrides {
        config_path: cli.config,
        locale: cli.locale,
        webhook_url: cli.webhook_url,
        tts_url: cli.tts_url,
        muted: cli.mute,
    };

    let config = Config::load_with_options(&overrides)?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Ask { text, session } => ask(&config, &text, session).await,
            Command::Speak { text } => speak(&config, &text).await,
            Command::Config => {
                println!("{config}");
                Ok(())
            }
        };
    }

    tracing::info!(
        webhook = %config.backend.webhook_url,
        locale = %config.locale,
        tts = config.speech.tts.name(),
        "starting triage kiosk"
    );

    Kiosk::new(&config)?.run().await?;
    Ok(())
}

async fn ask(config: &Config, text: &str, session: Option<Uuid>) -> anyhow::Result<()> {
    let client = WebhookClient::new(config.backend.webhook_url.clone(), config.backend.timeout)?;
    let session_id = session.unwrap_or_else(Uuid::new_v4);

    let body = client.send_message(text, session_id).await?;
    let reply = parse_response(&body);

    println!("session: {session_id}");
    println!("status:  {}", reply.status);
    println!("message: {}", reply.message);
    Ok(())
}

async fn speak(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Speaking: \"{text}\"");

    let output = build_speech_output(&config.speech, config.locale)?;
    let (done_tx, done_rx) = oneshot::channel();
    let _playback = output.speak(text, move |_, outcome| {
        let _ = done_tx.send(outcome);
    });

    let outcome = done_rx.await?;
    println!("Finished: {outcome:?}");
    Ok(())
}
