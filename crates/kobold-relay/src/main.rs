//! Terminal front end for kobold-relay.
//!
//! Chats with a character over stdin/stdout. Plain lines are sent as
//! messages; lines starting with `/` are commands (`/help` lists them).
//! Logs go to stderr and are filtered with `RUST_LOG` (default `info`).
//!
//! # Examples
//!
//! ```sh
//! kobold-relay --profile chardata.json --endpoint http://localhost:5000
//!
//! # Keep separate conversations apart
//! kobold-relay --channel campaign-2 --speaker Alice
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use kobold_relay::prelude::*;
use kobold_relay::tokenizer::DEFAULT_CHARS_PER_TOKEN;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

/// Chat with a character served by a KoboldAI-compatible backend.
#[derive(Parser)]
#[command(name = "kobold-relay", version)]
struct Cli {
    /// Character card JSON file.
    #[arg(long, default_value = "chardata.json")]
    profile: PathBuf,

    /// Base URL of the generation backend.
    #[arg(long, env = "KOBOLD_ENDPOINT", default_value = "http://localhost:5000")]
    endpoint: String,

    /// Directory for per-channel transcripts.
    #[arg(long, default_value = "chatlogs")]
    chatlog_dir: PathBuf,

    /// Channel key; each channel keeps its own transcript.
    #[arg(long, default_value = "terminal")]
    channel: String,

    /// Name your messages are sent under. Defaults to $USER.
    #[arg(long)]
    speaker: Option<String>,

    /// Timeout for one generation request, in seconds.
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,

    /// JSON file overriding generation parameters.
    #[arg(long)]
    generation_config: Option<PathBuf>,

    /// Characters per token used to estimate prompt size.
    #[arg(long, default_value_t = DEFAULT_CHARS_PER_TOKEN)]
    chars_per_token: f64,

    /// Count tokens with the cl100k BPE instead of estimating.
    #[cfg(feature = "tiktoken")]
    #[arg(long)]
    bpe: bool,
}

impl Cli {
    fn relay_config(&self) -> RelayConfig {
        let defaults = RelayConfig::default();
        RelayConfig {
            profile: self.profile.clone(),
            endpoint: self.endpoint.clone(),
            chatlog_dir: self.chatlog_dir.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            generation_overrides: self.generation_config.clone(),
            channel: self.channel.clone(),
            speaker: self.speaker.clone().unwrap_or(defaults.speaker),
            chars_per_token: self.chars_per_token,
        }
    }

    fn tokenizer(&self, config: &RelayConfig) -> Result<Arc<dyn Tokenizer>> {
        #[cfg(feature = "tiktoken")]
        if self.bpe {
            return Ok(Arc::new(kobold_relay::tokenizer::BpeTokenizer::cl100k()?));
        }
        Ok(Arc::new(CharRatioTokenizer::new(config.chars_per_token)))
    }
}

/// One line of terminal input.
#[derive(Debug, PartialEq)]
enum Input {
    Chat(String),
    FollowUp,
    Regenerate,
    Reset,
    Get(String),
    Put(String, String),
    Multiline(bool),
    Help,
    Quit,
    Empty,
}

const HELP: &str = "\
Commands:
  /followup            let the character speak again
  /regenerate          replace the character's last reply
  /reset               start the conversation over
  /get <key>           show a generation parameter
  /put <key> <value>   set a generation parameter (JSON or text)
  /multiline on|off    allow or forbid multi-line replies
  /quit                exit
Anything else is sent as a message.";

fn parse_input(line: &str) -> std::result::Result<Input, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Input::Empty);
    }
    let Some(command) = line.strip_prefix('/') else {
        return Ok(Input::Chat(line.to_string()));
    };

    let mut parts = command.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let rest = parts.next().map(str::trim).unwrap_or_default();
    match name {
        "followup" => Ok(Input::FollowUp),
        "regenerate" => Ok(Input::Regenerate),
        "reset" => Ok(Input::Reset),
        "help" => Ok(Input::Help),
        "quit" | "exit" => Ok(Input::Quit),
        "get" if !rest.is_empty() => Ok(Input::Get(rest.to_string())),
        "put" => match rest.split_once(char::is_whitespace) {
            Some((key, value)) => Ok(Input::Put(key.to_string(), value.trim().to_string())),
            None => Err("usage: /put <key> <value>".into()),
        },
        "multiline" => match rest {
            "on" | "true" => Ok(Input::Multiline(true)),
            "off" | "false" => Ok(Input::Multiline(false)),
            _ => Err("usage: /multiline on|off".into()),
        },
        "get" => Err("usage: /get <key>".into()),
        other => Err(format!("unknown command /{other} (try /help)")),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let commands = match start(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let config = cli.relay_config();
    if let Err(e) = repl(&commands, &config).await {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Load the profile, build the backend client, and open the terminal session.
fn start(cli: &Cli) -> Result<RelayCommands> {
    let config = cli.relay_config();
    let profile = Arc::new(CharacterProfile::load(&config.profile)?);
    let backend = Arc::new(KoboldClient::new(&config.endpoint, config.timeout)?);
    info!(
        "Relaying '{}' via {}",
        profile.name(),
        backend.generate_url()
    );

    let registry = SessionRegistry::new(
        profile,
        cli.tokenizer(&config)?,
        backend,
        config.generation_config()?.into_shared(),
        SeenSpeakers::shared(),
        &config.chatlog_dir,
    )?;
    registry.session_for(&config.channel)?;
    Ok(RelayCommands::new(Arc::new(registry)))
}

async fn repl(commands: &RelayCommands, config: &RelayConfig) -> std::io::Result<()> {
    let profile = Arc::clone(commands.registry().profile());
    let name = profile.name();
    println!("{name}: {}", profile.greeting());

    let channel = config.channel.as_str();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = match parse_input(&line) {
            Ok(input) => input,
            Err(msg) => {
                eprintln!("{msg}");
                continue;
            }
        };
        debug!("Terminal input: {input:?}");

        let outcome = match input {
            Input::Empty => continue,
            Input::Quit => break,
            Input::Help => {
                println!("{HELP}");
                continue;
            }
            Input::Get(key) => {
                match commands.config_get(&key) {
                    Some(value) => println!("{key} = {value}"),
                    None => println!("{key} is not set"),
                }
                continue;
            }
            Input::Put(key, raw) => {
                let value = commands.config_put(&key, &raw);
                println!("{key} = {value}");
                continue;
            }
            Input::Multiline(enabled) => {
                commands.set_multiline(enabled);
                continue;
            }
            Input::Reset => commands.reset(channel).await.map(|()| None),
            Input::Chat(text) => commands.chat(channel, &config.speaker, &text).await.map(Some),
            Input::FollowUp => commands.follow_up(channel).await.map(Some),
            Input::Regenerate => commands.regenerate(channel).await.map(Some),
        };

        match outcome {
            Ok(Some(reply)) => println!("{name}: {reply}"),
            Ok(None) => println!("{name}: {}", profile.greeting()),
            Err(e) => eprintln!("Error: {e}"),
        }
    }
    Ok(())
}
