//! The `luna` REPL: reads prompts from stdin and writes the answers to the
//! configured sink.

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::process::ExitCode;

use luna::{Config, OutputKind, SessionBuilder};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};

const INPUT_PROMPT: &str = "You>/ ";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("❌ Error: {err}");
            return ExitCode::FAILURE;
        }
    };
    debug!("starting with {config:?}");
    let colored = config.output == OutputKind::Terminal;

    let session = SessionBuilder::from_config(&config)
        .with_system_prompt(
            include_str!("./system_prompt.md").replace("{{HOST_OS}}", host_os()),
        )
        .build();
    let mut session = match session {
        Ok(session) => session,
        Err(err) => {
            eprintln!("❌ Error: {err}");
            return ExitCode::FAILURE;
        }
    };

    info_line("Welcome to Luna! Your AI assistant!");
    info_line("Type your message or 'exit' to quit.");

    let mut lines = io::BufReader::new(io::stdin()).lines();
    loop {
        if colored {
            print!("\n{}", INPUT_PROMPT.bright_green().bold());
        } else {
            print!("\n{INPUT_PROMPT}");
        }
        std::io::stdout().flush().ok();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                error!("error reading input: {err}");
                break;
            }
        };

        let input = line.trim();
        if input.eq_ignore_ascii_case("exit") {
            break;
        }
        if input.is_empty() {
            info_line("Please enter a valid input.");
            continue;
        }

        if let Err(err) = session.respond(input).await {
            if colored {
                println!("\n{}", format!("❌ Error: {err}").bright_red());
            } else {
                println!("\n❌ Error: {err}");
            }
        }
    }

    println!("\n✅ Goodbye! Have a great day!");
    ExitCode::SUCCESS
}

#[inline]
fn info_line(message: &str) {
    println!("ℹ️  {message}");
}

#[inline]
fn host_os() -> &'static str {
    let os = std::env::consts::OS;
    match os {
        "linux" => "Linux",
        "macos" => "macOS",
        "windows" => "Windows",
        _ => "some other OS",
    }
}
