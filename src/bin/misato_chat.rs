//! Terminal front-end for a MISATO chat session.
//!
//! Reads user input line by line from stdin and prints new log entries and
//! voice fragments to stdout. Diagnostics go to stderr.
//!
//! Commands:
//! - `/connect <address>`: connect a wallet
//! - `/disconnect`: disconnect the wallet
//! - `/retry <text>`: replace the last log entry and resend
//! - `/pay <tx-hash> <text>`: send a message with a fee payment hash
//! - `/quit`: exit
//!
//! Environment:
//! - `MISATO_CONFIG`: config file path (defaults to the per-user config)
//! - `MISATO_WALLET_ADDRESS`: wallet to connect at startup

use anyhow::Context;
use misato::session::message::{Message, Role};
use misato::speech::ChannelVoiceSink;
use misato::wallet::format_address;
use misato::{
    ClientConfig, HttpChatApi, IdentityStore, SendOutcome, SessionController, SessionIdentity,
    WalletEvent, WalletInfo,
};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

fn load_config() -> anyhow::Result<ClientConfig> {
    let path = std::env::var_os("MISATO_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(ClientConfig::default_config_path);
    let config = if path.exists() {
        ClientConfig::from_file(&path)
            .with_context(|| format!("failed to load config {}", path.display()))?
    } else {
        tracing::info!(path = %path.display(), "no config file, using defaults");
        ClientConfig::default()
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn print_message(message: &Message, display_name: &str) {
    let time = message.time.as_deref().unwrap_or("--:--");
    let who = match message.role {
        Role::User => "you",
        Role::Assistant => display_name,
        Role::System => "*",
    };
    println!("[{time}] {who}: {}", message.content);
    if let Some(payment) = &message.payment_request {
        println!(
            "        pay {} ETH to {} on {} (chain {}), then /pay <tx-hash> <message>",
            payment.price, payment.recipient_address, payment.network, payment.chain_id
        );
    }
}

async fn connect(controller: &SessionController, store: &mut IdentityStore, address: &str) {
    let info = store.wallet_info().cloned().unwrap_or_else(|| WalletInfo {
        name: "terminal".to_owned(),
        icon: String::new(),
    });
    if let Err(e) = store.set_wallet_info(info.clone()) {
        tracing::warn!(error = %e, "failed to persist wallet info");
    }
    let state = controller
        .handle_wallet_event(WalletEvent::Connected {
            address: address.to_owned(),
            info: Some(info),
        })
        .await;
    println!("wallet {} -> {state:?}", format_address(address));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = load_config()?;
    let mut store = IdentityStore::load_default().context("failed to load session identity")?;
    tracing::info!(session_id = %store.session_id(), "misato-chat starting");

    let api = HttpChatApi::new(config.api.clone()).context("failed to build API client")?;
    let (voice, mut fragments) = ChannelVoiceSink::new();
    let display_name = config.persona.display_name.clone();
    let controller = SessionController::new(
        config,
        SessionIdentity::new(store.session_id()),
        Arc::new(api),
        Arc::new(voice),
    );

    let mut snapshots = controller.subscribe();
    tokio::spawn(async move {
        let mut printed = HashSet::new();
        loop {
            let snapshot = snapshots.borrow_and_update().clone();
            for message in &snapshot.messages {
                if printed.insert((message.id, message.content.clone())) {
                    print_message(message, &display_name);
                }
            }
            if snapshots.changed().await.is_err() {
                break;
            }
        }
    });
    tokio::spawn(async move {
        while let Some(fragment) = fragments.recv().await {
            if !fragment.content.is_empty() {
                println!("        (voice) {}", fragment.content);
            }
        }
    });

    if let Ok(address) = std::env::var("MISATO_WALLET_ADDRESS") {
        connect(&controller, &mut store, &address).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        match command {
            "" => {}
            "/quit" => break,
            "/connect" if !rest.trim().is_empty() => {
                connect(&controller, &mut store, rest.trim()).await;
            }
            "/disconnect" => {
                controller.handle_wallet_event(WalletEvent::Disconnected).await;
                if let Err(e) = store.clear_wallet_info() {
                    tracing::warn!(error = %e, "failed to clear wallet info");
                }
            }
            "/retry" => {
                let outcome = controller.retry_message(rest).await;
                tracing::debug!(?outcome, "retry finished");
            }
            "/pay" => match rest.trim().split_once(' ') {
                Some((hash, text)) => {
                    let outcome = controller.send_message(text, Some(hash)).await;
                    tracing::debug!(?outcome, "paid message finished");
                }
                None => println!("usage: /pay <tx-hash> <message>"),
            },
            _ => {
                let outcome = controller.send_message(line, None).await;
                if outcome == SendOutcome::Ignored {
                    let snapshot = controller.snapshot();
                    println!(
                        "not sent (connection: {:?}, queue position: {}, processing: {:?})",
                        snapshot.connection, snapshot.queue_position, snapshot.processing
                    );
                }
            }
        }
    }

    controller.shutdown();
    tracing::info!("misato-chat shut down cleanly");
    Ok(())
}
