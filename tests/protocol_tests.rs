#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire-format tests for the room sync client.
//!
//! Decodes JSON fixtures shaped like real server output, in both the
//! canonical camelCase spelling and the older one, and checks the
//! validation applied at the boundary.

use room_sync_client::protocol::{
    encode_path_segment, GuessRequest, GuessResponse, PushMessage, RevealPayload,
    RoundStartedPayload, ScoreEntry,
};
use room_sync_client::snapshot::{Disclosure, Prompt, RoomSnapshot};
use room_sync_client::{ErrorKind, Phase, SyncError};

// ════════════════════════════════════════════════════════════════════
// State snapshots
// ════════════════════════════════════════════════════════════════════

#[test]
fn word_state_canonical_fixture() {
    let snap = RoomSnapshot::from_json(
        r#"{
            "phase": "validation",
            "round": 2,
            "totalRounds": 5,
            "endsAt": 1700000060,
            "letter": "M",
            "categories": [{"id": 1, "displayName": "Animal"}, {"id": 2, "displayName": "Pays"}],
            "players": [{"userID": 7, "displayName": "Ana"}, {"userID": 8, "displayName": "Bo"}],
            "answersByUser": {"8": {"1": "Mouton", "2": "Maroc"}},
            "votesByCategoryThenTarget": {"1": {"8": {"7": true}}}
        }"#,
    )
    .unwrap();

    assert_eq!(snap.phase, Phase::Validation);
    assert_eq!((snap.round, snap.total_rounds), (2, 5));
    assert_eq!(snap.ends_at, Some(1_700_000_060));
    assert_eq!(snap.prompt, Prompt::Letter("M".into()));
    assert_eq!(snap.categories[1].display_name, "Pays");
    assert_eq!(snap.answer_of(8, 2), Some("Maroc"));
    assert_eq!(snap.verdict_of(7, 8, 1), Some(true));
    assert_eq!(snap.verdict_of(7, 8, 2), None);
}

#[test]
fn word_state_legacy_fixture() {
    let snap = RoomSnapshot::from_json(
        r#"{
            "phase": "playing",
            "round": 1,
            "total_rounds": 3,
            "ends_at_unix": 1700000030,
            "letter": "B",
            "categories": [{"ID": 4, "Name": "Fruit"}],
            "players": [{"UserID": 3, "Pseudo": "Cleo", "Score": 12}],
            "answers": null,
            "votes": null
        }"#,
    )
    .unwrap();

    assert_eq!(snap.total_rounds, 3);
    assert_eq!(snap.ends_at, Some(1_700_000_030));
    assert_eq!(snap.categories[0].id, 4);
    assert_eq!(snap.players[0].display_name, "Cleo");
    assert_eq!(snap.players[0].score, 12);
    assert!(snap.answers_by_user.is_empty());
}

#[test]
fn music_state_fixture() {
    let snap = RoomSnapshot::from_json(
        r#"{"phase":"playing","round":3,"totalRounds":10,"endsAt":1700000045,
            "previewReference":"https://cdn.example/p.mp3","alreadyTried":true}"#,
    )
    .unwrap();
    assert_eq!(snap.prompt, Prompt::Preview("https://cdn.example/p.mp3".into()));
    assert!(snap.already_tried);
    assert_eq!(snap.disclosure, None);
}

#[test]
fn reveal_state_carries_disclosure() {
    let snap = RoomSnapshot::from_json(
        r#"{"phase":"reveal","round":3,"totalRounds":10,"title":"Get Lucky","artist":"Daft Punk"}"#,
    )
    .unwrap();
    assert_eq!(
        snap.disclosure,
        Some(Disclosure {
            title: "Get Lucky".into(),
            artist: "Daft Punk".into(),
        })
    );
}

#[test]
fn missing_phase_means_idle() {
    let snap = RoomSnapshot::from_json("{}").unwrap();
    assert_eq!(snap.phase, Phase::Idle);
    assert_eq!(snap.round, 0);
}

#[test]
fn idle_and_finished_drop_the_deadline() {
    let idle = RoomSnapshot::from_json(r#"{"phase":"idle","endsAt":1700000000}"#).unwrap();
    assert_eq!(idle.ends_at, None);
    let zero = RoomSnapshot::from_json(r#"{"phase":"playing","round":1,"endsAt":0}"#).unwrap();
    assert_eq!(zero.ends_at, None);
}

#[test]
fn scores_map_follows_player_order() {
    let snap = RoomSnapshot::from_json(
        r#"{"phase":"finished","round":3,"totalRounds":3,
            "players":[{"userID":9,"displayName":"Zed"},{"userID":2,"displayName":"Ana"}],
            "scores":{"2":40,"9":15}}"#,
    )
    .unwrap();
    assert_eq!(
        snap.scores,
        vec![
            ScoreEntry { user_id: 9, score: 15 },
            ScoreEntry { user_id: 2, score: 40 },
        ]
    );
}

#[test]
fn scores_list_keeps_server_order() {
    let snap = RoomSnapshot::from_json(
        r#"{"phase":"finished","round":3,"scores":[{"userID":2,"score":40},{"UserID":9,"score":15}]}"#,
    )
    .unwrap();
    assert_eq!(snap.scores[0].user_id, 2);
    assert_eq!(snap.scores[1].user_id, 9);
}

#[test]
fn invalid_states_are_validation_errors() {
    for body in [
        "not json",
        r#"{"phase":"bonus","round":1}"#,
        r#"{"phase":"playing","round":0}"#,
        r#"{"phase":"playing"}"#,
    ] {
        let err = RoomSnapshot::from_json(body).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "body: {body}");
    }
}

// ════════════════════════════════════════════════════════════════════
// Push notifications
// ════════════════════════════════════════════════════════════════════

#[test]
fn push_room_updated() {
    assert_eq!(
        PushMessage::parse(r#"{"type":"room_updated","payload":{"room_id":3}}"#).unwrap(),
        Some(PushMessage::RoomUpdated)
    );
}

#[test]
fn push_round_started_canonical() {
    let msg = PushMessage::parse(
        r#"{"type":"round_started","payload":{"round":4,"totalRounds":8,"endsAtUnix":1700000090,"letter":"T"}}"#,
    )
    .unwrap();
    assert_eq!(
        msg,
        Some(PushMessage::RoundStarted(RoundStartedPayload {
            round: 4,
            total_rounds: 8,
            ends_at_unix: 1_700_000_090,
            preview_reference: None,
            letter: Some("T".into()),
        }))
    );
}

#[test]
fn push_reveal_both_spellings() {
    let expected = Some(PushMessage::RoundReveal(RevealPayload {
        title: "Africa".into(),
        artist: "Toto".into(),
    }));
    for kind in ["round_reveal", "blindtest_round_reveal"] {
        let frame = format!(r#"{{"type":"{kind}","payload":{{"title":"Africa","artist":"Toto"}}}}"#);
        assert_eq!(PushMessage::parse(&frame).unwrap(), expected);
    }
}

#[test]
fn push_finished_variants() {
    for kind in ["finished", "petitbac_finished", "blindtest_finished"] {
        let frame = format!(r#"{{"type":"{kind}"}}"#);
        assert_eq!(PushMessage::parse(&frame).unwrap(), Some(PushMessage::Finished));
    }
}

#[test]
fn unknown_push_type_is_ignored() {
    assert_eq!(
        PushMessage::parse(r#"{"type":"player_joined","payload":{"userID":3}}"#).unwrap(),
        None
    );
}

#[test]
fn round_started_without_round_is_rejected() {
    let err = PushMessage::parse(r#"{"type":"round_started","payload":{"totalRounds":8}}"#)
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));
}

#[test]
fn reveal_without_artist_is_rejected() {
    let err =
        PushMessage::parse(r#"{"type":"round_reveal","payload":{"title":"Africa"}}"#).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn push_frame_that_is_not_an_envelope() {
    let err = PushMessage::parse("ping").unwrap_err();
    assert!(matches!(err, SyncError::Serialization(_)));
}

// ════════════════════════════════════════════════════════════════════
// Guess and paths
// ════════════════════════════════════════════════════════════════════

#[test]
fn guess_request_shape() {
    let body = serde_json::to_value(GuessRequest {
        guess: "Toto".into(),
    })
    .unwrap();
    assert_eq!(body, serde_json::json!({"guess": "Toto"}));
}

#[test]
fn guess_response_closes_attempt() {
    let locked: GuessResponse =
        serde_json::from_str(r#"{"correct":true,"locked":true,"pointsAwarded":3}"#).unwrap();
    assert!(locked.correct);
    assert_eq!(locked.points_awarded, 3);
    assert!(locked.closes_attempt());

    let tried: GuessResponse = serde_json::from_str(r#"{"already_tried":true}"#).unwrap();
    assert!(tried.closes_attempt());

    let open: GuessResponse = serde_json::from_str("{}").unwrap();
    assert!(!open.closes_attempt());
}

#[test]
fn room_codes_are_path_encoded() {
    assert_eq!(encode_path_segment("XK42"), "XK42");
    assert_eq!(encode_path_segment("a b/c"), "a%20b%2Fc");
}
