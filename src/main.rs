use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use qurma::format::{format_message, LineKind, MessageView};
use qurma::integration::{AppConfig, LiveConversation, LiveEvent, Orchestrator};
use qurma::llm::{SendOutcome, TurnEvent};
use qurma::messages::Message;
use qurma::speech::{SpeakOutcome, VoiceEvent};
use qurma::ui::command::{self, Command, HELP};
use qurma::ui::Theme;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Input = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they don't interleave with streamed answers
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "qurma=info,warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting QurMa");

    let config = AppConfig::load().context("Failed to load configuration")?;
    let app = Orchestrator::from_config(config).context("Failed to start")?;
    let theme = Theme::default();

    spawn_turn_printer(app.pipeline().event_receiver());
    spawn_voice_printer(app.voice().event_receiver());

    println!("Assalamu'alaikum! Ketik pertanyaan Anda, atau /help untuk daftar perintah.");

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut live: Option<LiveConversation> = None;

    loop {
        prompt("> ");
        let Some(line) = input.next_line().await? else {
            break;
        };

        let command = match command::parse(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{}", message);
                continue;
            }
        };

        match command {
            Command::Quit => break,
            Command::Help => println!("{}", HELP),
            Command::Send(text) => {
                if text.is_empty() && app.composer().is_empty() {
                    continue;
                }
                app.composer().append_transcript(&text);
                let streamed = !app.composer().has_image();
                let outcome = app.submit().await;
                report(&app, &theme, outcome, streamed);
            }
            Command::New => {
                app.new_session();
                println!("Sesi baru dimulai.");
            }
            Command::Sessions => {
                let store = app.store().lock();
                print!("{}", theme.render_sessions(store.sessions(), store.active_id()));
            }
            Command::Open(position) => match app.open_session(position) {
                Ok(_) => show_session(&app, &theme),
                Err(e) => println!("{}", e.user_message()),
            },
            Command::Delete(position) => match app.delete_session(position) {
                Ok(_) => println!("Sesi dihapus."),
                Err(e) => println!("{}", e.user_message()),
            },
            Command::Clear => {
                let answer = ask(&mut input, qurma::session::CLEAR_ALL_PROMPT).await?;
                if app.clear_all(&|_: &str| command::is_yes(&answer)) {
                    println!("Semua riwayat dihapus.");
                }
            }
            Command::Image { path, prompt } => {
                if let Err(e) = app.attach_image(&path) {
                    println!("{}", e.user_message());
                    continue;
                }
                if let Some(prompt) = prompt {
                    app.composer().append_transcript(&prompt);
                }
                let outcome = app.submit().await;
                report(&app, &theme, outcome, false);
            }
            Command::Voice => {
                if app.toggle_voice() {
                    println!("Merekam... ketik /voice lagi untuk berhenti.");
                }
            }
            Command::Refine { action, position } => {
                let outcome = match app.assistant_message(position) {
                    Ok(message) => app.refine(&message.id, action).await,
                    Err(e) => Err(e),
                };
                match outcome {
                    Ok(outcome) => report(&app, &theme, outcome, false),
                    Err(e) => println!("{}", e.user_message()),
                }
            }
            Command::Speak(position) => {
                let result = match app.assistant_message(position) {
                    Ok(message) => app.speak(&message).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(SpeakOutcome::AlreadyPlaying) => println!("Masih membacakan jawaban sebelumnya."),
                    Ok(SpeakOutcome::NothingToSay) => println!("Tidak ada teks untuk dibacakan."),
                    Ok(SpeakOutcome::Played) => {}
                    Err(e) => println!("{}", e.user_message()),
                }
            }
            Command::Search(enabled) => {
                app.set_search(enabled);
                println!("Pencarian web {}.", if enabled { "aktif" } else { "nonaktif" });
            }
            Command::Live => match live.take() {
                Some(conversation) => {
                    conversation.stop().await;
                    println!("Percakapan langsung selesai.");
                }
                None => match app.start_live().await {
                    Ok(conversation) => {
                        spawn_live_printer(conversation.event_receiver());
                        println!("Percakapan langsung dimulai. Ketik /live untuk berhenti.");
                        live = Some(conversation);
                    }
                    Err(e) => {
                        error!("Live session failed: {}", e);
                        println!("{}", e.user_message());
                    }
                },
            },
        }
    }

    if let Some(conversation) = live {
        conversation.stop().await;
    }
    app.voice().stop();
    info!("Goodbye");
    Ok(())
}

fn prompt(text: &str) {
    print!("{}", text);
    let _ = std::io::stdout().flush();
}

async fn ask(input: &mut Input, question: &str) -> Result<String> {
    prompt(&format!("{} (y/n) ", question));
    Ok(input.next_line().await?.unwrap_or_default())
}

/// Show the result of a turn. A streamed answer was already printed raw, so
/// it is only redrawn when it has Arabic or markup that needs layout.
fn report(app: &Orchestrator, theme: &Theme, outcome: SendOutcome, streamed: bool) {
    match outcome {
        SendOutcome::Rejected(reason) => println!("{}", reason),
        SendOutcome::Completed { reply_id, .. } => {
            let reply = app.store().lock().message(&reply_id).cloned();
            if let Some(reply) = reply.filter(|r| !streamed || needs_layout(r)) {
                println!();
                print!("{}", theme.render_message(&reply));
            }
        }
        SendOutcome::Failed { error_id, .. } => {
            let notice = app.store().lock().message(&error_id).cloned();
            if let Some(notice) = notice {
                print!("{}", theme.render_message(&notice));
            }
        }
    }
}

fn needs_layout(message: &Message) -> bool {
    match format_message(message) {
        MessageView::Pending => false,
        MessageView::Lines(lines) => lines
            .iter()
            .any(|l| !matches!(l.kind, LineKind::Prose | LineKind::Spacer)),
    }
}

fn show_session(app: &Orchestrator, theme: &Theme) {
    let store = app.store().lock();
    if let Some(session) = store.active_session() {
        println!("== {} ==", session.title);
    }
    for message in store.working_messages() {
        print!("{}", theme.render_message(message));
    }
}

fn spawn_turn_printer(events: Receiver<TurnEvent>) {
    std::thread::spawn(move || {
        let mut streaming = false;
        for event in events.iter() {
            match event {
                TurnEvent::Started { .. } => {
                    streaming = true;
                    prompt("Asisten: ");
                }
                TurnEvent::Delta { text, .. } => prompt(&text),
                TurnEvent::Completed { .. } | TurnEvent::Failed { .. } => {
                    if std::mem::take(&mut streaming) {
                        println!();
                    }
                }
            }
        }
    });
}

fn spawn_voice_printer(events: Receiver<VoiceEvent>) {
    std::thread::spawn(move || {
        for event in events.iter() {
            match event {
                VoiceEvent::Started => {}
                VoiceEvent::AutoStopped => println!("\n[hening terdeteksi, memproses suara...]"),
                VoiceEvent::Stopped => println!("\n[memproses suara...]"),
                VoiceEvent::Transcribed(text) => {
                    println!("[draf] {}", text);
                    prompt("Tekan Enter untuk mengirim, atau ketik tambahan: ");
                }
                VoiceEvent::Error(message) => println!("\n{}", message),
            }
        }
    });
}

fn spawn_live_printer(events: Receiver<LiveEvent>) {
    std::thread::spawn(move || {
        for event in events.iter() {
            match event {
                LiveEvent::Opened => println!("[tersambung]"),
                LiveEvent::Text(text) => prompt(&text),
                LiveEvent::Interrupted => println!("\n[disela]"),
                LiveEvent::TurnComplete => println!(),
                LiveEvent::Error(message) => println!("\n{}", message),
                LiveEvent::Closed(reason) => {
                    match reason {
                        Some(reason) => println!("\n[terputus: {}]", reason),
                        None => println!("\n[terputus]"),
                    }
                    break;
                }
            }
        }
    });
}
