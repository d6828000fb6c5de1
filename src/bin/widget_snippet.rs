//! Prints the embeddable widget snippet for a chatbot.
//!
//! Ops convenience for support engineers wiring a customer's site by hand:
//! resolves the widget domain from configuration unless overridden.

use anyhow::{Context, Result};
use clap::Parser;
use uuid::Uuid;

use botdesk::{config::ConfigLoader, widget::embed_snippet};

#[derive(Parser)]
#[command(name = "widget-snippet", about = "Print the embed snippet for a chatbot")]
struct Args {
    /// Chatbot the widget is bound to
    chatbot_id: Uuid,
    /// Owning account
    owner_id: Uuid,
    /// Widget domain override (defaults to the configured domain)
    #[arg(long)]
    domain: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let domain = match args.domain {
        Some(domain) => domain,
        None => {
            let config = ConfigLoader::new()
                .load()
                .context("loading configuration")?;
            config.widget_domain
        }
    };

    println!("{}", embed_snippet(args.chatbot_id, args.owner_id, &domain));
    Ok(())
}
