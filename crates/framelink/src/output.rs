use std::io::{IsTerminal, Write};
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use framelink_frame::Message;
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    event: &'static str,
    protocol_id: u32,
    msg_type: String,
    payload_size: usize,
    wire_size: usize,
    payload: String,
    peer: &'a str,
    timestamp: String,
}

#[derive(Serialize)]
struct ListeningOutput {
    event: &'static str,
    addr: String,
    url: String,
}

pub fn print_message(message: &Message, peer: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                event: "message-received",
                protocol_id: message.protocol_id(),
                msg_type: message.msg_type().to_string(),
                payload_size: message.payload().len(),
                wire_size: message.wire_size(),
                payload: payload_preview(message.payload()),
                peer,
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PROTOCOL", "SIZE", "PEER", "PAYLOAD"])
                .add_row(vec![
                    message.protocol_id().to_string(),
                    message.payload().len().to_string(),
                    peer.to_string(),
                    payload_preview(message.payload()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "protocol_id={} size={} peer={} payload={}",
                message.protocol_id(),
                message.payload().len(),
                peer,
                payload_preview(message.payload())
            );
        }
        OutputFormat::Raw => print_raw(message.payload()),
    }
}

/// Announce the bound address. Scripts listening on port 0 read this line.
pub fn print_listening(addr: SocketAddr, format: OutputFormat) {
    let url = format!("ws://{addr}");
    match format {
        OutputFormat::Json => print_json(&ListeningOutput {
            event: "listening",
            addr: addr.to_string(),
            url,
        }),
        OutputFormat::Raw => println!("{addr}"),
        OutputFormat::Table | OutputFormat::Pretty => println!("listening on {url}"),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
