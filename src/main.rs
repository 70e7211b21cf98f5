/*!
 * Copyright (c) 2026 Ming Lyu, aka mingcheng
 *
 * This source code is licensed under the MIT License,
 * which is located in the LICENSE file in the source tree's root directory.
 *
 * File: main.rs
 * Author: mingcheng <mingcheng@apache.org>
 * File Created: 2026-03-02 10:14:51
 *
 * Modified By: mingcheng <mingcheng@apache.org>
 * Last Modified: 2026-03-11 09:21:33
 */

mod alerts;
mod config;
mod message_id;
mod smtp_sender;
mod traits;

use alerts::AlertPoster;
use clap::Parser;
use config::AppConfig;
use log::info;
use rustls::crypto;
use smtp_sender::SmtpSender;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use traits::{MailSender, OutboundMessage};

struct MultiWriter {
    writers: Vec<Box<dyn Write + Send + 'static>>,
}

impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        for w in &mut self.writers {
            let _ = w.write(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        for w in &mut self.writers {
            let _ = w.flush();
        }
        Ok(())
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long)]
    config: Option<String>,

    /// Envelope sender address
    #[arg(long)]
    from: String,

    /// Envelope recipient address
    #[arg(long)]
    to: String,

    /// File holding the raw RFC-5322 message; read from stdin when omitted
    #[arg(short, long)]
    message: Option<PathBuf>,

    /// Message-id tying the log records for this send together; generated
    /// from the configured server hostname when omitted
    #[arg(long)]
    message_id: Option<String>,
}

fn initialize_logger(config: &AppConfig) -> anyhow::Result<()> {
    let mut builder = env_logger::Builder::new();

    if let Some(level) = &config.log_level {
        builder.parse_filters(level);
    } else if let Ok(env_level) = std::env::var("RUST_LOG") {
        builder.parse_filters(&env_level);
    } else {
        builder.filter_level(log::LevelFilter::Info);
    }

    if let Some(log_file) = &config.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .map_err(|e| anyhow::anyhow!("Failed to open log file {}: {}", log_file, e))?;

        if config.quiet {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        } else {
            let multi_writer = MultiWriter {
                writers: vec![Box::new(file), Box::new(std::io::stderr())],
            };
            builder.target(env_logger::Target::Pipe(Box::new(multi_writer)));
        }
    } else if config.quiet {
        builder.target(env_logger::Target::Pipe(Box::new(std::io::sink())));
    }

    builder.init();
    Ok(())
}

fn read_message(path: Option<&Path>) -> anyhow::Result<Vec<u8>> {
    match path {
        Some(path) => std::fs::read(path).map_err(|e| {
            anyhow::anyhow!("Failed to read message file {}: {}", path.display(), e)
        }),
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .map_err(|e| anyhow::anyhow!("Failed to read message from stdin: {}", e))?;
            Ok(buf)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = crypto::ring::default_provider().install_default();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AppConfig::new_from_file(path),
        None => AppConfig::new(),
    }
    .unwrap_or_else(|e| {
        eprintln!("Failed to load config: {:?}", e);
        if let Ok(path) = std::env::current_dir() {
            eprintln!("Current search path: {:?}", path);
        }
        eprintln!("Please create a `config.toml` or set APP_... environment variables, or specify a config file with --config.");
        std::process::exit(1);
    });

    initialize_logger(&config)?;

    let content = read_message(args.message.as_deref())?;

    let message_id = args
        .message_id
        .clone()
        .unwrap_or_else(|| message_id::generate_message_id(&config.server_hostname));

    let message = OutboundMessage {
        from_address: args.from.clone(),
        to_address: args.to.clone(),
        message_id,
        content,
    };

    info!(
        "Sending IMIP message {} via {}:{}",
        message.message_id, config.sender.host, config.sender.port
    );

    let poster: Arc<dyn AlertPoster> = Arc::from(alerts::create_alert_poster(config.alert.as_ref()));
    let sender = SmtpSender::new(config.sender.clone(), poster);

    let outcome = sender.send(&message).await;
    if !outcome.is_sent() {
        std::process::exit(1);
    }

    Ok(())
}
