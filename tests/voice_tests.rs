//! Voice capture against a scripted microphone and gateway

use qurma::audio::ScriptedCapture;
use qurma::llm::{MockCall, MockGateway};
use qurma::speech::{VoiceConfig, VoiceEvent, VoicePipeline, VoiceState};
use qurma::ui::Composer;
use qurma::QurmaError;
use std::sync::Arc;
use std::time::Duration;

const RATE: u32 = 16000;
const FRAME: usize = 160;
const INTERVAL: Duration = Duration::from_millis(10);

/// Broadband noise, well above the silence threshold
fn loud_frames(count: usize) -> Vec<Vec<f32>> {
    let mut seed: u32 = 0x2545_f491;
    (0..count)
        .map(|_| {
            (0..FRAME)
                .map(|_| {
                    seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                    (seed >> 8) as f32 / (1u32 << 24) as f32 - 0.5
                })
                .collect()
        })
        .collect()
}

fn silent_frames(count: usize) -> Vec<Vec<f32>> {
    vec![vec![0.0; FRAME]; count]
}

fn pipeline(capture: &ScriptedCapture, gateway: &MockGateway, composer: &Composer) -> VoicePipeline {
    VoicePipeline::new(
        Arc::new(capture.clone()),
        Arc::new(gateway.clone()),
        composer.clone(),
        VoiceConfig::default(),
    )
}

fn transcribe_calls(gateway: &MockGateway) -> usize {
    gateway
        .calls()
        .iter()
        .filter(|c| matches!(c, MockCall::Transcribe { .. }))
        .count()
}

#[tokio::test(start_paused = true)]
async fn test_silence_stops_recording_and_fills_composer() {
    let mut frames = loud_frames(25);
    frames.extend(silent_frames(300));
    let capture = ScriptedCapture::new(RATE, frames, INTERVAL);
    let gateway = MockGateway::new();
    gateway.push_reply(Ok("Apa itu zakat fitrah?".into()));
    let composer = Composer::new();
    let voice = pipeline(&capture, &gateway, &composer);
    let events = voice.event_receiver();

    assert!(voice.start());
    assert!(voice.is_recording());
    assert_eq!(capture.open_streams(), 1);

    voice.wait_idle().await;

    let events: Vec<VoiceEvent> = events.try_iter().collect();
    assert_eq!(
        events,
        vec![
            VoiceEvent::Started,
            VoiceEvent::AutoStopped,
            VoiceEvent::Transcribed("Apa itu zakat fitrah?".into()),
        ]
    );
    assert_eq!(composer.text(), "Apa itu zakat fitrah?");
    assert_eq!(voice.state(), VoiceState::Idle);
    assert_eq!(capture.open_streams(), 0);
    assert_eq!(transcribe_calls(&gateway), 1);
}

#[tokio::test(start_paused = true)]
async fn test_manual_stop_transcribes() {
    let capture = ScriptedCapture::new(RATE, loud_frames(500), INTERVAL);
    let gateway = MockGateway::new();
    gateway.push_reply(Ok("tentang zakat".into()));
    let composer = Composer::new();
    composer.set_text("Tolong jelaskan");
    let voice = pipeline(&capture, &gateway, &composer);
    let events = voice.event_receiver();

    assert!(voice.toggle());
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!voice.toggle());
    voice.wait_idle().await;

    let events: Vec<VoiceEvent> = events.try_iter().collect();
    assert_eq!(events[1], VoiceEvent::Stopped);
    assert!(!events.contains(&VoiceEvent::AutoStopped));
    assert_eq!(composer.text(), "Tolong jelaskan tentang zakat");
    assert_eq!(capture.open_streams(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_before_any_audio_skips_transcription() {
    let capture = ScriptedCapture::new(RATE, loud_frames(10), INTERVAL);
    let gateway = MockGateway::new();
    let composer = Composer::new();
    let voice = pipeline(&capture, &gateway, &composer);
    let events = voice.event_receiver();

    assert!(voice.start());
    voice.stop();
    voice.wait_idle().await;

    let events: Vec<VoiceEvent> = events.try_iter().collect();
    assert_eq!(events, vec![VoiceEvent::Started, VoiceEvent::Stopped]);
    assert_eq!(transcribe_calls(&gateway), 0);
    assert!(composer.is_empty());
    assert_eq!(capture.open_streams(), 0);
}

#[tokio::test]
async fn test_missing_microphone_reports_error() {
    let capture = ScriptedCapture::failing(QurmaError::AudioDeviceError("no input device".into()));
    let gateway = MockGateway::new();
    let composer = Composer::new();
    let voice = pipeline(&capture, &gateway, &composer);
    let events = voice.event_receiver();

    assert!(!voice.start());
    assert_eq!(voice.state(), VoiceState::Idle);
    assert!(matches!(events.try_recv(), Ok(VoiceEvent::Error(_))));
    assert!(gateway.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_transcription_failure_leaves_draft_alone() {
    let capture = ScriptedCapture::new(RATE, loud_frames(500), INTERVAL);
    let gateway = MockGateway::new();
    gateway.push_reply(Err(QurmaError::TransportError("503".into())));
    let composer = Composer::new();
    composer.set_text("Draf lama");
    let voice = pipeline(&capture, &gateway, &composer);
    let events = voice.event_receiver();

    voice.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    voice.stop();
    voice.wait_idle().await;

    let events: Vec<VoiceEvent> = events.try_iter().collect();
    assert!(matches!(events.last(), Some(VoiceEvent::Error(_))));
    assert_eq!(composer.text(), "Draf lama");
    assert_eq!(voice.state(), VoiceState::Idle);
    assert_eq!(capture.open_streams(), 0);

    // Best effort: the next attempt starts cleanly
    assert!(voice.start());
    voice.stop();
    voice.wait_idle().await;
}

#[tokio::test(start_paused = true)]
async fn test_blank_transcript_is_an_error() {
    let capture = ScriptedCapture::new(RATE, loud_frames(500), INTERVAL);
    let gateway = MockGateway::new();
    gateway.push_reply(Ok("   ".into()));
    let composer = Composer::new();
    let voice = pipeline(&capture, &gateway, &composer);
    let events = voice.event_receiver();

    voice.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    voice.stop();
    voice.wait_idle().await;

    assert!(matches!(events.try_iter().last(), Some(VoiceEvent::Error(_))));
    assert!(composer.is_empty());
}
