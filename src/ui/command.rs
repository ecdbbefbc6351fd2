//! Terminal input parsing

use crate::llm::gateway::RefineAction;
use std::path::PathBuf;

pub const HELP: &str = "\
Perintah:
  <teks>                 kirim pesan (ditambahkan ke draf suara bila ada)
  <Enter>                kirim draf yang ada
  /new                   sesi baru
  /sessions              daftar sesi
  /open N                buka sesi ke-N
  /delete N              hapus sesi ke-N
  /clear                 hapus semua riwayat
  /image PATH [prompt]   analisis gambar
  /voice                 mulai/berhenti merekam suara
  /refine AKSI [N]       summarize | kids | academic | related
  /speak [N]             bacakan jawaban
  /search on|off         pencarian web
  /live                  percakapan suara langsung
  /quit                  keluar";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Plain line; empty means "send the draft"
    Send(String),
    New,
    Sessions,
    Open(usize),
    Delete(usize),
    Clear,
    Image { path: PathBuf, prompt: Option<String> },
    Voice,
    Refine { action: RefineAction, position: Option<usize> },
    Speak(Option<usize>),
    Search(bool),
    Live,
    Help,
    Quit,
}

/// Parse one input line. Errors are user-facing.
pub fn parse(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Send(line.to_string()));
    };

    let mut parts = rest.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default().to_ascii_lowercase();
    let args = parts.next().map(str::trim).unwrap_or_default();

    match name.as_str() {
        "new" => Ok(Command::New),
        "sessions" | "list" => Ok(Command::Sessions),
        "open" => position(args).map(Command::Open),
        "delete" => position(args).map(Command::Delete),
        "clear" => Ok(Command::Clear),
        "image" => {
            let mut parts = args.splitn(2, char::is_whitespace);
            let path = parts.next().filter(|p| !p.is_empty()).ok_or("Gunakan: /image PATH [prompt]")?;
            let prompt = parts.next().map(str::trim).filter(|p| !p.is_empty()).map(String::from);
            Ok(Command::Image {
                path: PathBuf::from(path),
                prompt,
            })
        }
        "voice" => Ok(Command::Voice),
        "refine" => {
            let mut parts = args.split_whitespace();
            let action = parts
                .next()
                .and_then(RefineAction::parse)
                .ok_or("Gunakan: /refine summarize|kids|academic|related [N]")?;
            let position = parts.next().map(|n| position(n)).transpose()?;
            Ok(Command::Refine { action, position })
        }
        "speak" => {
            let position = Some(args).filter(|a| !a.is_empty()).map(position).transpose()?;
            Ok(Command::Speak(position))
        }
        "search" => match args.to_ascii_lowercase().as_str() {
            "on" => Ok(Command::Search(true)),
            "off" => Ok(Command::Search(false)),
            _ => Err("Gunakan: /search on|off".into()),
        },
        "live" => Ok(Command::Live),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("Perintah tidak dikenal: /{} (ketik /help)", other)),
    }
}

fn position(arg: &str) -> Result<usize, String> {
    match arg.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("Nomor tidak valid: {:?}", arg.trim())),
    }
}

/// Answer to a yes/no prompt
pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "ya" | "yes")
}
