//! Interactive front end: collects the message at the terminal,
//! submits it once, and reports a single success-or-failure outcome.

use std::{
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
};

use clap::Parser;
use missive::{config::Profile, internal, logging, Credentials, Message, Submission, SubmitOptions};

/// Compose and submit one email over verified TLS
#[derive(Parser, Debug)]
#[command(name = "missive")]
#[command(about = "Compose and submit one email over verified TLS", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a TOML profile that pre-answers prompts
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Proxy to tunnel through (host[:port]), overriding the profile
    #[arg(short, long)]
    proxy: Option<String>,

    /// Log the protocol exchange
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => {
            println!("Email sent successfully!");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("An error has happened: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let profile = match &cli.config {
        Some(path) => Profile::load(path)?,
        None => Profile::default(),
    };

    let message = setup_message(&cli, &profile)?;

    let options = SubmitOptions {
        helo_name: profile
            .helo_name
            .unwrap_or_else(|| "localhost".to_string()),
        timeouts: profile.timeouts,
        verbose: cli.verbose || profile.verbose,
    };

    let receipt = Submission::new(message, &options).submit().await?;

    internal!(
        level = DEBUG,
        "Accepted with {} {}",
        receipt.code,
        receipt.message
    );

    Ok(())
}

/// Collects the message from the profile and the terminal, prompting
/// only for what the profile leaves out.
fn setup_message(cli: &Cli, profile: &Profile) -> anyhow::Result<Message> {
    let proxy = match cli.proxy.clone().or_else(|| profile.proxy.clone()) {
        Some(proxy) => Some(proxy),
        None => Some(prompt("Type in your proxy address or leave it blank: ")?),
    };

    let server = match profile.server.clone() {
        Some(server) => server,
        None => prompt("Type in your SMTP server address: ")?,
    };

    let (username, password) = match (profile.username.clone(), profile.password.clone()) {
        (Some(username), Some(password)) => (username, password),
        (username, password) => {
            println!("Type in your login credentials below.");
            let username = match username {
                Some(username) => username,
                None => prompt("Username: ")?,
            };
            let password = match password {
                Some(password) => password,
                None => prompt("Password: ")?,
            };
            (username, password)
        }
    };

    let sender = match profile.sender.clone() {
        Some(sender) => sender,
        None => prompt("Type in your email address: ")?,
    };

    let recipients = if profile.recipients.is_empty() {
        println!("Below, type in your recipients line by line and finish with a blank input.");
        let mut recipients = Vec::new();
        loop {
            let recipient = prompt("Enter a new recipient: ")?;
            if recipient.is_empty() {
                break;
            }
            recipients.push(recipient);
        }
        recipients
    } else {
        profile.recipients.clone()
    };

    let subject = match profile.subject.clone() {
        Some(subject) => subject,
        None => prompt("Type in your message subject: ")?,
    };

    println!("Message body, or text (Ctrl+D / Ctrl+Z to finish):");
    let body = io::read_to_string(io::stdin())?;

    Ok(Message::build(
        proxy,
        server,
        Credentials::new(username, password),
        sender,
        recipients,
        subject,
        body,
    )?)
}

fn prompt(text: &str) -> io::Result<String> {
    print!("{text}");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;

    Ok(line.trim().to_string())
}
