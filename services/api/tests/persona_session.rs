//! Persona session behaviour against an in-process Gemini Live server.

mod support;

use huddle_api::persona::{SendOutcome, SessionError, TurnTimings};
use huddle_core::{
    ConversationLog, ParticipantId, ParticipantInfo, Role, Roster, Utterance, UtteranceKind,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use support::*;

struct Fixture {
    server: MockGemini,
    log: ConversationLog,
    roster: Roster,
    sink: Arc<RecordingSink>,
}

impl Fixture {
    async fn new(ack: &str) -> Self {
        Self {
            server: MockGemini::start(ack).await,
            log: ConversationLog::new(),
            roster: Roster::new(),
            sink: Arc::new(RecordingSink::default()),
        }
    }
}

#[tokio::test]
async fn test_setup_frame_reflects_profile() {
    let mut fx = Fixture::new(SETUP_OK).await;
    let scooby = session(scooby_profile(), &fx.server, &fx.log, &fx.roster, &fx.sink);
    scooby.connect().await.unwrap();

    let setup = fx.server.next_frame().await;
    let setup = &setup["setup"];
    assert_eq!(setup["model"], "models/gemini-test");
    assert_eq!(setup["generationConfig"]["temperature"], 0.0);
    assert_eq!(
        setup["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
        "Puck"
    );
    assert_eq!(setup["outputAudioTranscription"], json!({}));
    let declared = setup["tools"][0]["functionDeclarations"].as_array().unwrap();
    assert_eq!(declared.len(), 3);

    assert!(scooby.is_connected());
    assert_eq!(fx.sink.statuses("scooby"), vec![true]);
}

#[tokio::test]
async fn test_persona_without_tools_omits_tools() {
    let mut fx = Fixture::new(SETUP_OK).await;
    let lyra = session(lyra_profile(), &fx.server, &fx.log, &fx.roster, &fx.sink);
    lyra.connect().await.unwrap();

    let setup = fx.server.next_frame().await;
    assert!(setup["setup"].get("tools").is_none());
    assert_eq!(setup["setup"]["generationConfig"]["temperature"], 0.7);
}

#[tokio::test]
async fn test_speaking_flips_once_each_way_per_turn() {
    let fx = Fixture::new(SETUP_OK).await;
    let scooby = session(scooby_profile(), &fx.server, &fx.log, &fx.roster, &fx.sink);
    scooby.connect().await.unwrap();

    fx.server
        .push(json!({"serverContent": {"modelTurn": {"parts": [
            {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAA="}},
            {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "BBB="}},
            {"text": "thinking"}
        ]}}}))
        .await;
    fx.server.push(transcription("Hello ")).await;
    fx.server.push(audio("CCC=")).await;
    fx.server.push(transcription("everyone.")).await;
    wait_until(|| fx.sink.audio_count("scooby") == 3).await;
    assert!(scooby.is_speaking());
    assert_eq!(fx.sink.speaking("scooby"), vec![true]);

    fx.server.push(turn_complete()).await;
    wait_until(|| !scooby.is_speaking()).await;
    assert_eq!(fx.sink.speaking("scooby"), vec![true, false]);

    let entries = fx.log.snapshot();
    assert_eq!(entries, vec![Utterance::model_audio("Hello everyone.")]);

    // A second turn flips again, independently of the first.
    fx.server.push(audio("DDD=")).await;
    fx.server.push(turn_complete()).await;
    wait_until(|| fx.sink.speaking("scooby").len() == 4).await;
    assert_eq!(fx.sink.speaking("scooby"), vec![true, false, true, false]);
}

#[tokio::test]
async fn test_audio_with_other_mime_is_ignored() {
    let fx = Fixture::new(SETUP_OK).await;
    let scooby = session(scooby_profile(), &fx.server, &fx.log, &fx.roster, &fx.sink);
    scooby.connect().await.unwrap();

    fx.server
        .push(json!({"serverContent": {"modelTurn": {"parts": [
            {"inlineData": {"mimeType": "audio/wav", "data": "AAA="}},
            {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": ""}}
        ]}}}))
        .await;
    fx.server.push(turn_complete()).await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(fx.sink.audio_count("scooby"), 0);
    assert!(fx.sink.speaking("scooby").is_empty());
}

#[tokio::test]
async fn test_send_while_speaking_is_skipped() {
    let mut fx = Fixture::new(SETUP_OK).await;
    let scooby = session(scooby_profile(), &fx.server, &fx.log, &fx.roster, &fx.sink);
    scooby.connect().await.unwrap();
    fx.server.next_frame().await;

    fx.server.push(audio("AAA=")).await;
    wait_until(|| scooby.is_speaking()).await;

    let before = fx.log.len();
    let outcome = scooby.send_text("Speaker Ada said: scooby?").await.unwrap();
    assert_eq!(outcome, SendOutcome::SkippedSpeaking);
    assert_eq!(fx.log.len(), before);
    assert!(fx.server.nothing_within(Duration::from_millis(150)).await);
}

#[tokio::test]
async fn test_context_window_excludes_the_message_being_sent() {
    let mut fx = Fixture::new(SETUP_OK).await;
    for entry in [
        Utterance::user_text("a"),
        Utterance::user_text("b"),
        Utterance::model_audio("c"),
    ] {
        fx.log.append(entry);
    }
    let mut profile = scooby_profile();
    profile.context_window = 2;
    let scooby = session(profile, &fx.server, &fx.log, &fx.roster, &fx.sink);
    scooby.connect().await.unwrap();

    let outcome = scooby.send_text("now").await.unwrap();
    assert_eq!(outcome, SendOutcome::Sent);

    let frame = fx.server.next_non_setup().await;
    assert_eq!(
        input_text(&frame),
        "[Previous conversation context]:\nUser: b\nScooby: c\n\n[Current message]:\nnow"
    );
    let last = fx.log.snapshot().pop().unwrap();
    assert_eq!(last.role, Role::User);
    assert_eq!(last.kind, UtteranceKind::TextInput);
    assert_eq!(last.content, "now");
}

#[tokio::test]
async fn test_first_message_has_no_context_envelope() {
    let mut fx = Fixture::new(SETUP_OK).await;
    let scooby = session(scooby_profile(), &fx.server, &fx.log, &fx.roster, &fx.sink);
    scooby.connect().await.unwrap();

    scooby.send_text("Speaker said: Start the meeting scooby").await.unwrap();
    let frame = fx.server.next_non_setup().await;
    assert_eq!(input_text(&frame), "Speaker said: Start the meeting scooby");
}

#[tokio::test]
async fn test_blank_transcription_appends_nothing() {
    let fx = Fixture::new(SETUP_OK).await;
    let scooby = session(scooby_profile(), &fx.server, &fx.log, &fx.roster, &fx.sink);
    scooby.connect().await.unwrap();

    fx.server.push(transcription("   ")).await;
    fx.server.push(audio("AAA=")).await;
    fx.server.push(turn_complete()).await;
    wait_until(|| fx.sink.speaking("scooby") == vec![true, false]).await;

    assert!(fx.log.is_empty());
}

#[tokio::test]
async fn test_relay_forwards_mentions_to_companion() {
    let fx = Fixture::new(SETUP_OK).await;
    let mut lyra_server = MockGemini::start(SETUP_OK).await;
    let scooby = session(scooby_profile(), &fx.server, &fx.log, &fx.roster, &fx.sink);
    let lyra = session(lyra_profile(), &lyra_server, &fx.log, &fx.roster, &fx.sink);
    scooby.set_companion(&lyra);
    scooby.connect().await.unwrap();
    lyra.connect().await.unwrap();

    fx.server.push(transcription("Lyra, update please")).await;
    fx.server.push(audio("AAA=")).await;
    fx.server.push(turn_complete()).await;

    let frame = lyra_server.next_non_setup().await;
    assert!(
        input_text(&frame).ends_with("Scooby said: Lyra, update please"),
        "unexpected relay text: {}",
        input_text(&frame)
    );
}

#[tokio::test]
async fn test_relay_skips_turns_without_mention() {
    let fx = Fixture::new(SETUP_OK).await;
    let mut lyra_server = MockGemini::start(SETUP_OK).await;
    let scooby = session(scooby_profile(), &fx.server, &fx.log, &fx.roster, &fx.sink);
    let lyra = session(lyra_profile(), &lyra_server, &fx.log, &fx.roster, &fx.sink);
    scooby.set_companion(&lyra);
    scooby.connect().await.unwrap();
    lyra.connect().await.unwrap();

    fx.server.push(transcription("All tasks are on track.")).await;
    fx.server.push(audio("AAA=")).await;
    fx.server.push(turn_complete()).await;

    assert!(lyra_server.nothing_within(Duration::from_millis(400)).await);
}

#[tokio::test]
async fn test_error_ack_leaves_session_disconnected() {
    let fx = Fixture::new(r#"{"error":{"code":400,"message":"bad model"}}"#).await;
    let scooby = session(scooby_profile(), &fx.server, &fx.log, &fx.roster, &fx.sink);

    let err = scooby.connect().await.unwrap_err();
    assert!(matches!(err, SessionError::Connect { .. }));
    assert!(!scooby.is_connected());
    assert!(!scooby.has_connection().await);
    assert!(fx.sink.statuses("scooby").is_empty());

    // send_text tries to connect once more and reports the missing connection.
    let outcome = scooby.send_text("hello").await.unwrap();
    assert_eq!(outcome, SendOutcome::NoConnection);
    assert!(fx.log.is_empty());
}

#[tokio::test]
async fn test_tool_calls_are_answered_in_one_frame() {
    let mut fx = Fixture::new(SETUP_OK).await;
    fx.roster.upsert_joined(ParticipantInfo {
        id: ParticipantId("1".into()),
        name: Some("Ada".into()),
        is_host: true,
        platform: Some("zoom".into()),
        extra_data: None,
    });
    let scooby = session(scooby_profile(), &fx.server, &fx.log, &fx.roster, &fx.sink);
    scooby.connect().await.unwrap();

    fx.server
        .push(json!({"toolCall": {"functionCalls": [
            {"id": "c1", "name": "get_weather", "args": {}},
            {"id": "c2", "name": "get_current_participants", "args": {}}
        ]}}))
        .await;

    let frame = fx.server.next_non_setup().await;
    let responses = frame["toolResponse"]["functionResponses"].as_array().unwrap();
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["id"], "c1");
    assert_eq!(responses[0]["response"]["result"]["status"], "error");
    assert_eq!(responses[1]["name"], "get_current_participants");
    assert_eq!(responses[1]["response"]["result"][0]["name"], "Ada");

    // The dispatcher keeps running after the tool call.
    fx.server.push(audio("AAA=")).await;
    wait_until(|| fx.sink.audio_count("scooby") == 1).await;
}

#[tokio::test]
async fn test_malformed_frame_is_skipped() {
    let fx = Fixture::new(SETUP_OK).await;
    let scooby = session(scooby_profile(), &fx.server, &fx.log, &fx.roster, &fx.sink);
    scooby.connect().await.unwrap();

    fx.server.push(json!("not an object")).await;
    fx.server.push(audio("AAA=")).await;
    wait_until(|| fx.sink.audio_count("scooby") == 1).await;
    assert!(scooby.is_connected());
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let fx = Fixture::new(SETUP_OK).await;
    let scooby = session(scooby_profile(), &fx.server, &fx.log, &fx.roster, &fx.sink);
    scooby.connect().await.unwrap();

    scooby.close().await;
    scooby.close().await;

    assert!(!scooby.is_connected());
    assert!(!scooby.has_connection().await);
    assert_eq!(fx.sink.statuses("scooby"), vec![true, false]);
}

#[tokio::test]
async fn test_server_hang_up_then_lazy_reconnect() {
    let mut fx = Fixture::new(SETUP_OK).await;
    let scooby = session(scooby_profile(), &fx.server, &fx.log, &fx.roster, &fx.sink);
    scooby.connect().await.unwrap();
    fx.server.next_frame().await;

    fx.server.hang_up().await;
    wait_until(|| !scooby.is_connected()).await;
    wait_until(|| fx.sink.statuses("scooby") == vec![true, false]).await;

    let outcome = scooby.send_text("scooby, are you there?").await.unwrap();
    assert_eq!(outcome, SendOutcome::Sent);
    assert_eq!(fx.server.connection_count(), 2);
    let frame = fx.server.next_non_setup().await;
    assert_eq!(input_text(&frame), "scooby, are you there?");
}

#[tokio::test]
async fn test_concurrent_sends_share_one_connection() {
    let mut fx = Fixture::new(SETUP_OK).await;
    let scooby = session(scooby_profile(), &fx.server, &fx.log, &fx.roster, &fx.sink);

    let (first, second) = tokio::join!(
        scooby.send_text("Speaker Ada said: scooby one"),
        scooby.send_text("Speaker Bo said: scooby two")
    );
    assert_eq!(first.unwrap(), SendOutcome::Sent);
    assert_eq!(second.unwrap(), SendOutcome::Sent);
    assert_eq!(fx.server.connection_count(), 1);
    assert_eq!(fx.sink.statuses("scooby"), vec![true]);

    let mut texts = vec![
        input_text(&fx.server.next_non_setup().await).to_string(),
        input_text(&fx.server.next_non_setup().await).to_string(),
    ];
    texts.sort();
    assert!(texts[0].ends_with("scooby one"));
    assert!(texts[1].ends_with("scooby two"));
    assert!(scooby.is_connected());
}

#[tokio::test]
async fn test_speaking_holds_through_settle_delay() {
    let mut fx = Fixture::new(SETUP_OK).await;
    let timings = TurnTimings {
        settle: Duration::from_millis(400),
        relay_delay: Duration::from_millis(100),
    };
    let scooby = session_with_timings(
        scooby_profile(),
        &fx.server,
        &fx.log,
        &fx.roster,
        &fx.sink,
        timings,
    );
    scooby.connect().await.unwrap();
    fx.server.next_frame().await;

    fx.server.push(transcription("Done.")).await;
    fx.server.push(audio("AAA=")).await;
    fx.server.push(turn_complete()).await;
    // The transcript is logged as soon as the turn completes, before the settle delay.
    wait_until(|| fx.log.len() == 1).await;

    assert!(scooby.is_speaking());
    let outcome = scooby.send_text("scooby, quick one").await.unwrap();
    assert_eq!(outcome, SendOutcome::SkippedSpeaking);
    assert_eq!(fx.sink.speaking("scooby"), vec![true]);
    assert!(fx.server.nothing_within(Duration::from_millis(100)).await);

    wait_until(|| !scooby.is_speaking()).await;
    assert_eq!(fx.sink.speaking("scooby"), vec![true, false]);
    let outcome = scooby.send_text("scooby, quick one").await.unwrap();
    assert_eq!(outcome, SendOutcome::Sent);
}

#[tokio::test]
async fn test_relay_waits_for_relay_delay() {
    let fx = Fixture::new(SETUP_OK).await;
    let mut lyra_server = MockGemini::start(SETUP_OK).await;
    let timings = TurnTimings {
        settle: Duration::from_millis(20),
        relay_delay: Duration::from_millis(600),
    };
    let scooby = session_with_timings(
        scooby_profile(),
        &fx.server,
        &fx.log,
        &fx.roster,
        &fx.sink,
        timings,
    );
    let lyra = session(lyra_profile(), &lyra_server, &fx.log, &fx.roster, &fx.sink);
    scooby.set_companion(&lyra);
    scooby.connect().await.unwrap();
    lyra.connect().await.unwrap();

    fx.server.push(transcription("Lyra, your turn")).await;
    fx.server.push(audio("AAA=")).await;
    fx.server.push(turn_complete()).await;
    wait_until(|| fx.sink.speaking("scooby") == vec![true, false]).await;

    assert!(
        lyra_server
            .nothing_within(timings.relay_delay / 2)
            .await
    );
    let frame = lyra_server.next_non_setup().await;
    assert!(input_text(&frame).ends_with("Scooby said: Lyra, your turn"));
}
