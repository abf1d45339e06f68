#![forbid(unsafe_code)]

//! `lab-stacks-ctl`: command-line client for the `lab-stacks` HTTP API.
//!
//! Sends one request per invocation and pretty-prints the JSON response.
//! Useful for operators checking or waking a student's stack by hand.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::StatusCode;

#[derive(Debug, Parser)]
#[command(
    name = "lab-stacks-ctl",
    about = "Command-line client for the lab-stacks server",
    version,
    long_about = None
)]
struct Cli {
    /// Base URL of the server.
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Launch or resume a stack and start its dead man's switch.
    View {
        /// Course identifier.
        course: String,
        /// Student identifier.
        user: String,
        /// Orchestration template file to launch from.
        #[arg(long)]
        template: Option<PathBuf>,
        /// Training user name inside the stack.
        #[arg(long)]
        stack_user_name: Option<String>,
    },

    /// Reconcile and print the stack status.
    Status {
        /// Course identifier.
        course: String,
        /// Student identifier.
        user: String,
    },

    /// Reset the dead man's switch.
    Keepalive {
        /// Course identifier.
        course: String,
        /// Student identifier.
        user: String,
    },

    /// Print the terminal server URL.
    TerminalUrl {
        /// Course identifier.
        course: String,
        /// Student identifier.
        user: String,
    },
}

impl Command {
    /// Request path and JSON body for this command.
    fn request(&self) -> Result<(String, serde_json::Value), Box<dyn std::error::Error>> {
        let (course, user, action) = match self {
            Self::View { course, user, .. } => (course, user, "view"),
            Self::Status { course, user } => (course, user, "status"),
            Self::Keepalive { course, user } => (course, user, "keepalive"),
            Self::TerminalUrl { course, user } => (course, user, "terminal_url"),
        };
        let path = format!("/courses/{course}/users/{user}/{action}");

        let mut body = serde_json::json!({});
        if let Self::View {
            template,
            stack_user_name,
            ..
        } = self
        {
            if let Some(file) = template {
                body["template"] = serde_json::Value::String(std::fs::read_to_string(file)?);
            }
            if let Some(name) = stack_user_name {
                body["stackUserName"] = serde_json::Value::String(name.clone());
            }
        }
        Ok((path, body))
    }
}

fn main() {
    let args = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("Failed to start runtime: {err}");
            std::process::exit(1);
        }
    };

    match runtime.block_on(send_request(&args)) {
        Ok((status, response)) if status.is_success() => {
            println!(
                "{}",
                serde_json::to_string_pretty(&response).unwrap_or_default()
            );
        }
        Ok((status, response)) => {
            eprintln!("Error: {}", failure_message(status, &response));
            std::process::exit(1);
        }
        Err(err) => {
            eprintln!("Failed to reach server: {err}");
            eprintln!("Is lab-stacks running at '{}'?", args.url);
            std::process::exit(1);
        }
    }
}

/// Send the command to the server and return the HTTP status and body.
async fn send_request(
    args: &Cli,
) -> Result<(StatusCode, serde_json::Value), Box<dyn std::error::Error>> {
    let (path, body) = args.command.request()?;
    let url = format!("{}{path}", args.url.trim_end_matches('/'));

    let response = reqwest::Client::new().post(url).json(&body).send().await?;
    let status = response.status();
    let text = response.text().await?;
    Ok((status, parse_body(text)))
}

/// Parse a response body as JSON, keeping plain-text bodies as a string.
fn parse_body(text: String) -> serde_json::Value {
    serde_json::from_str(&text).unwrap_or_else(|_| serde_json::Value::String(text))
}

/// Describe a failed response: the server's `error` field, or the raw
/// body for rejections the server did not render as JSON.
fn failure_message(status: StatusCode, body: &serde_json::Value) -> String {
    let detail = body
        .get("error")
        .and_then(serde_json::Value::as_str)
        .or_else(|| body.as_str())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .unwrap_or("unknown error");
    format!("HTTP {status}: {detail}")
}
