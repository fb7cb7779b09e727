//! Speaker attribution round-trip: a speaker registered in the catalog
//! is identified when the same voice streams through a session.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

use zasr::speaker::SpeakerIdentifier;
use zasr::state::AppState;
use zasr::toolkit::mock::MockToolkit;
use zasr::{server, ServerConfig};

const AMPLITUDE: i16 = 8_000;

fn reference_clip_bytes(seconds: f32) -> Vec<u8> {
    let sample = AMPLITUDE.to_le_bytes();
    (0..(seconds * 16_000.0) as usize)
        .flat_map(|_| sample)
        .collect()
}

fn speaker_config(catalog_dir: &TempDir) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.speaker.enabled = true;
    config.speaker.catalog_dir = Some(catalog_dir.path().to_path_buf());
    config
}

/// Register "Alice" from a reference utterance, persisting the catalog.
fn register_reference(config: &ServerConfig, audio_dir: &TempDir) -> String {
    let toolkit = MockToolkit::new();
    let wav: PathBuf = audio_dir.path().join("alice.wav");
    std::fs::write(&wav, reference_clip_bytes(1.0)).unwrap();

    let identifier = SpeakerIdentifier::new(&toolkit, config).unwrap();
    identifier
        .add_speaker(&toolkit, config, "Alice", &[wav], false)
        .expect("registration should succeed")
}

#[tokio::test]
async fn test_speaker_attribution_round_trip() {
    let catalog_dir = TempDir::new().unwrap();
    let audio_dir = TempDir::new().unwrap();
    let config = speaker_config(&catalog_dir);
    let speaker_id = register_reference(&config, &audio_dir);
    assert_eq!(speaker_id, "speaker-1");

    let app_state = AppState::new(config, Arc::new(MockToolkit::new())).unwrap();
    assert!(app_state.speaker.is_some(), "identifier should have loaded");
    let app = server::create_ws_router().with_state(app_state.clone());

    let listener = match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(err) if err.kind() == ErrorKind::PermissionDenied => {
            eprintln!("skipping websocket test: {err}");
            return;
        }
        Err(err) => panic!("failed to bind test listener: {err}"),
    };
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let url = format!("ws://127.0.0.1:{}/ws", addr.port());
    let (mut stream, _) = connect_async(&url).await.expect("failed to connect");

    stream
        .send(Message::Text(
            json!({"header": {"name": "Begin"}, "payload": {"fmt": "pcm", "rate": 16000}})
                .to_string()
                .into(),
        ))
        .await
        .unwrap();

    // Stream the reference utterance, then enough silence to close it
    stream
        .send(Message::Binary(reference_clip_bytes(1.0).into()))
        .await
        .unwrap();
    stream
        .send(Message::Binary(vec![0u8; 32_000].into()))
        .await
        .unwrap();
    stream
        .send(Message::Text(
            json!({"header": {"name": "End"}}).to_string().into(),
        ))
        .await
        .unwrap();

    let mut sentence_end: Option<Value> = None;
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out waiting for frames")
            .expect("connection closed")
            .expect("websocket error");
        let Message::Text(text) = message else {
            continue;
        };
        let frame: Value = serde_json::from_str(text.as_str()).unwrap();
        match frame["header"]["name"].as_str().unwrap() {
            "SentenceEnd" => sentence_end = Some(frame),
            "Completed" => break,
            _ => {}
        }
    }

    let payload = &sentence_end.expect("expected a SentenceEnd")["payload"];
    assert_eq!(payload["speaker_id"].as_str(), Some("speaker-1"));
    assert_eq!(payload["speaker"].as_str(), Some("Alice"));
}

#[tokio::test]
async fn test_unknown_voice_auto_tracked_in_catalog() {
    let catalog_dir = TempDir::new().unwrap();
    let config = speaker_config(&catalog_dir);

    let app_state = AppState::new(config, Arc::new(MockToolkit::new())).unwrap();
    let identifier = app_state.speaker.as_ref().expect("identifier enabled");

    // An unseen voice gets an unknown id...
    let clip = vec![0.25f32; 16_000];
    let first = identifier.process_segment(&clip).unwrap();
    assert!(first.is_new);
    assert_eq!(first.speaker_id, "unknown-1");

    // ...and is recognized on re-observation
    let second = identifier.process_segment(&clip).unwrap();
    assert!(!second.is_new);
    assert_eq!(second.speaker_id, "unknown-1");
}
