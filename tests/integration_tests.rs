// Integration tests for petmate, run against the in-memory store

use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix_web::{http::StatusCode, test, web, App};
use async_trait::async_trait;
use tokio_test::assert_ok;

use petmate::error::AppError;
use petmate::models::{
    CandidateFilter, MatchStatus, ProfileRequest, SendMessageRequest, UserId, UserInfo, UserPair,
};
use petmate::routes::{self, AppState};
use petmate::services::realtime::room_channel;
use petmate::services::{
    ConnectionRegistry, DirectoryError, LocalBroadcaster, NoopNotificationSink, Notification,
    NotificationSink, NotifyError, UserDirectory,
};
use petmate::store::{ChatStore, MatchStore, MemoryStore, ProfileStore};

const SEOUL: (f64, f64) = (37.5665, 126.9780);

struct FailingDirectory;

#[async_trait]
impl UserDirectory for FailingDirectory {
    async fn get_user(&self, _user_id: UserId) -> Result<UserInfo, DirectoryError> {
        Err(DirectoryError::ApiError(503))
    }
}

struct HangingDirectory;

#[async_trait]
impl UserDirectory for HangingDirectory {
    async fn get_user(&self, _user_id: UserId) -> Result<UserInfo, DirectoryError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Err(DirectoryError::Unavailable)
    }
}

#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<Notification>>,
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    state: AppState,
}

fn harness_with(directory: Arc<dyn UserDirectory>, sink: Arc<dyn NotificationSink>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let registry = ConnectionRegistry::new();
    let broadcaster = Arc::new(LocalBroadcaster::new(registry.clone()));

    let state = AppState::new(
        store.clone(),
        directory,
        sink,
        broadcaster,
        registry,
        Duration::from_millis(200),
        50.0,
    );
    Harness { store, state }
}

fn harness() -> Harness {
    harness_with(Arc::new(FailingDirectory), Arc::new(NoopNotificationSink))
}

fn profile_at(user_id: UserId, lat: f64, lon: f64) -> ProfileRequest {
    ProfileRequest {
        user_id,
        user_name: format!("Owner {}", user_id),
        user_avatar: None,
        user_gender: Some(if user_id % 2 == 0 { "female" } else { "male" }.to_string()),
        pet_name: format!("Pet {}", user_id),
        pet_breed: "Maltese".to_string(),
        pet_age: Some(3),
        pet_gender: None,
        pet_photo: None,
        bio: None,
        activity_level: Some(3),
        latitude: Some(lat),
        longitude: Some(lon),
        location: None,
    }
}

fn search_from(origin: (f64, f64), radius_km: f64) -> CandidateFilter {
    CandidateFilter {
        latitude: Some(origin.0),
        longitude: Some(origin.1),
        radius_km,
        ..CandidateFilter::default()
    }
}

fn text(room_id: i64, sender_id: UserId, content: &str) -> SendMessageRequest {
    SendMessageRequest {
        chat_room_id: room_id,
        sender_id,
        content: content.to_string(),
        message_type: None,
    }
}

async fn matched_edges(store: &MemoryStore, a: UserId, b: UserId) -> usize {
    let mut count = 0;
    for (from, to) in [(a, b), (b, a)] {
        if let Some(edge) = store.find_edge(from, to).await.unwrap() {
            if edge.status == MatchStatus::Matched {
                count += 1;
            }
        }
    }
    count
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_mutual_like_creates_match_and_room() {
    let sink = Arc::new(RecordingSink::default());
    let h = harness_with(Arc::new(FailingDirectory), sink.clone());

    let first = h.state.engine.like(1, 2).await.unwrap();
    assert!(!first.is_matched);
    assert!(!first.already_liked);
    assert!(first.chat_room_id.is_none());

    let second = h.state.engine.like(2, 1).await.unwrap();
    assert!(second.is_matched);
    assert_eq!(second.matched_user_id, Some(1));
    assert!(second.matched_at.is_some());
    let room_id = second.chat_room_id.expect("matched like opens a room");

    assert_eq!(matched_edges(&h.store, 1, 2).await, 2);
    let room = h
        .store
        .find_room(UserPair::new(1, 2).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(room.id, room_id);

    // Notifications are detached; give the spawned sends a moment
    for _ in 0..50 {
        if sink.sent.lock().unwrap().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let mut receivers: Vec<UserId> = sink.sent.lock().unwrap().iter().map(|n| n.user_id).collect();
    receivers.sort_unstable();
    assert_eq!(receivers, vec![1, 2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mutual_likes_converge() {
    let h = harness();

    for base in 0..20 {
        let a = 100 + base * 2;
        let b = a + 1;

        let engine_a = h.state.engine.clone();
        let engine_b = h.state.engine.clone();
        let left = tokio::spawn(async move { engine_a.like(a, b).await });
        let right = tokio::spawn(async move { engine_b.like(b, a).await });

        let left = left.await.unwrap().unwrap();
        let right = right.await.unwrap().unwrap();

        // Exactly one side observes the match
        assert!(left.is_matched ^ right.is_matched, "pair ({}, {})", a, b);
        assert_eq!(matched_edges(&h.store, a, b).await, 2);

        let rooms = h.store.rooms_for_user(a, false).await.unwrap();
        assert_eq!(rooms.len(), 1);
        assert!(rooms[0].has_participant(b));
    }
}

#[tokio::test]
async fn test_double_like_is_idempotent() {
    let h = harness();

    let first = h.state.engine.like(1, 2).await.unwrap();
    let second = h.state.engine.like(1, 2).await.unwrap();

    assert!(second.already_liked);
    assert_eq!(second.match_id, first.match_id);
    assert_eq!(h.store.edges_from(1, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_self_like_is_rejected() {
    let h = harness();
    assert!(matches!(
        h.state.engine.like(5, 5).await,
        Err(AppError::BadRequest(_))
    ));
}

#[tokio::test]
async fn test_unlike_only_removes_pending() {
    let h = harness();

    h.state.engine.like(1, 2).await.unwrap();
    assert!(h.state.engine.unlike(1, 2).await.unwrap());
    assert!(!h.state.engine.unlike(1, 2).await.unwrap());

    h.state.engine.like(1, 2).await.unwrap();
    h.state.engine.like(2, 1).await.unwrap();
    assert!(!h.state.engine.unlike(1, 2).await.unwrap());
    assert_eq!(matched_edges(&h.store, 1, 2).await, 2);
}

#[tokio::test]
async fn test_reject_leaves_no_match_and_no_room() {
    let h = harness();

    let pending = h.state.engine.like(1, 2).await.unwrap();
    let match_id = pending.match_id.unwrap();

    assert!(matches!(
        h.state.engine.respond(match_id, 3, false).await,
        Err(AppError::Unauthorized(_))
    ));

    let rejected = h.state.engine.respond(match_id, 2, false).await.unwrap();
    assert!(!rejected.is_matched);
    assert!(rejected.match_id.is_none());

    assert_eq!(matched_edges(&h.store, 1, 2).await, 0);
    assert!(h
        .store
        .find_room(UserPair::new(1, 2).unwrap())
        .await
        .unwrap()
        .is_none());
    assert_eq!(
        h.store.find_edge(1, 2).await.unwrap().unwrap().status,
        MatchStatus::Rejected
    );

    assert!(matches!(
        h.state.engine.respond(match_id, 2, true).await,
        Err(AppError::AlreadyResolved(id)) if id == match_id
    ));
    assert!(matches!(
        h.state.engine.respond(9_999, 2, true).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_accept_matches_both_directions() {
    let h = harness();

    let pending = h.state.engine.like(1, 2).await.unwrap();
    let accepted = h
        .state
        .engine
        .respond(pending.match_id.unwrap(), 2, true)
        .await
        .unwrap();

    assert!(accepted.is_matched);
    assert_eq!(accepted.matched_user_id, Some(1));
    assert!(accepted.chat_room_id.is_some());
    assert_eq!(matched_edges(&h.store, 1, 2).await, 2);

    let matches = h.state.engine.matches(1).await.unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].matched_user_id, Some(2));
    assert_eq!(matches[0].chat_room_id, accepted.chat_room_id);
}

#[tokio::test]
async fn test_listings_and_unfriend() {
    let h = harness();

    h.state.engine.like(1, 2).await.unwrap();
    h.state.engine.like(3, 2).await.unwrap();
    h.state.engine.like(2, 4).await.unwrap();

    let incoming = h.state.engine.pending_incoming(2).await.unwrap();
    let mut senders: Vec<UserId> = incoming.iter().map(|r| r.user_id).collect();
    senders.sort_unstable();
    assert_eq!(senders, vec![1, 3]);
    assert_eq!(incoming[0].user_name, format!("User {}", incoming[0].user_id));

    let outgoing = h.state.engine.pending_outgoing(2).await.unwrap();
    assert_eq!(outgoing.len(), 1);
    assert_eq!(outgoing[0].user_id, 4);

    assert_eq!(h.state.engine.pending_count(2).await.unwrap(), 2);
    assert_eq!(h.state.engine.liked_user_ids(1).await.unwrap(), vec![2]);

    h.state.engine.like(2, 1).await.unwrap();
    assert_eq!(h.state.engine.matches(2).await.unwrap().len(), 1);

    assert_eq!(h.state.engine.unfriend(1, 2).await.unwrap(), 2);
    assert_eq!(h.state.engine.unfriend(1, 2).await.unwrap(), 0);
    assert!(h.state.engine.matches(2).await.unwrap().is_empty());

    // The room survives an unfriend
    assert!(h
        .store
        .find_room(UserPair::new(1, 2).unwrap())
        .await
        .unwrap()
        .is_some());
}

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_candidate_radius() {
    let h = harness();
    let (lat, lon) = SEOUL;

    assert_ok!(h.state.provisioner.save_profile(&profile_at(1, lat, lon)).await);
    // About 5 km north
    assert_ok!(h.state.provisioner.save_profile(&profile_at(2, lat + 0.045, lon)).await);
    // About 1 km east
    assert_ok!(h.state.provisioner.save_profile(&profile_at(3, lat, lon + 0.0113)).await);

    let near = h.state.finder.find_candidates(1, &search_from(SEOUL, 3.0)).await.unwrap();
    assert_eq!(near.iter().map(|c| c.user_id).collect::<Vec<_>>(), vec![3]);

    let wide = h.state.finder.find_candidates(1, &search_from(SEOUL, 10.0)).await.unwrap();
    assert_eq!(wide.iter().map(|c| c.user_id).collect::<Vec<_>>(), vec![3, 2]);

    let d = wide[1].distance.unwrap();
    assert!((d - 5.0).abs() < 0.1, "distance {}", d);
    assert_eq!(d, (d * 100.0).round() / 100.0);
    assert!(wide.iter().all(|c| (70..100).contains(&c.match_score)));
}

#[tokio::test]
async fn test_candidate_radius_is_clamped() {
    let h = harness();
    let (lat, lon) = SEOUL;

    assert_ok!(h.state.provisioner.save_profile(&profile_at(1, lat, lon)).await);
    // One degree of latitude, about 111 km
    assert_ok!(h.state.provisioner.save_profile(&profile_at(2, lat + 1.0, lon)).await);

    let found = h.state.finder.find_candidates(1, &search_from(SEOUL, 500.0)).await.unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn test_candidates_across_antimeridian_and_pole() {
    let h = harness();

    // About 2.2 km apart, on opposite sides of the date line
    assert_ok!(h.state.provisioner.save_profile(&profile_at(1, 0.0, 179.99)).await);
    assert_ok!(h.state.provisioner.save_profile(&profile_at(2, 0.0, -179.99)).await);
    assert_ok!(h.state.provisioner.save_profile(&profile_at(3, 0.0, -179.0)).await);

    let found = h.state.finder.find_candidates(1, &search_from((0.0, 179.99), 3.0)).await.unwrap();
    assert_eq!(found.iter().map(|c| c.user_id).collect::<Vec<_>>(), vec![2]);
    assert!((found[0].distance.unwrap() - 2.22).abs() < 0.02);

    // About 1.7 km apart, across the north pole
    assert_ok!(h.state.provisioner.save_profile(&profile_at(4, 89.99, 10.0)).await);
    assert_ok!(h.state.provisioner.save_profile(&profile_at(5, 89.995, -175.0)).await);

    let polar = h.state.finder.find_candidates(4, &search_from((89.99, 10.0), 3.0)).await.unwrap();
    assert_eq!(polar.iter().map(|c| c.user_id).collect::<Vec<_>>(), vec![5]);
}

#[tokio::test]
async fn test_candidate_exclusions_and_filters() {
    let h = harness();
    let (lat, lon) = SEOUL;

    for id in 1..=5 {
        assert_ok!(
            h.state
                .provisioner
                .save_profile(&profile_at(id, lat + id as f64 * 0.001, lon))
                .await
        );
    }

    h.state.engine.like(1, 2).await.unwrap();
    h.state.engine.like(3, 1).await.unwrap();

    let for_one = h.state.finder.find_candidates(1, &search_from(SEOUL, 3.0)).await.unwrap();
    let ids: Vec<UserId> = for_one.iter().map(|c| c.user_id).collect();
    assert_eq!(ids, vec![4, 5]);

    let for_two = h.state.finder.find_candidates(2, &search_from(SEOUL, 3.0)).await.unwrap();
    assert!(!for_two.iter().any(|c| c.user_id == 1 || c.user_id == 2));

    let females = CandidateFilter {
        user_gender: Some("female".to_string()),
        ..search_from(SEOUL, 3.0)
    };
    let found = h.state.finder.find_candidates(5, &females).await.unwrap();
    assert!(found.iter().all(|c| c.user_id % 2 == 0));
    assert!(!found.is_empty());
}

#[tokio::test]
async fn test_candidates_without_coordinates() {
    let h = harness();

    h.state.provisioner.ensure_profile(2).await.unwrap();
    h.state.provisioner.ensure_profile(3).await.unwrap();

    let found = h
        .state
        .finder
        .find_candidates(1, &CandidateFilter::default())
        .await
        .unwrap();

    let mut ids: Vec<UserId> = found.iter().map(|c| c.user_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![2, 3]);
    assert!(found.iter().all(|c| c.distance.is_none()));
}

// ---------------------------------------------------------------------------
// Provisioning
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_provisioning_with_failing_directory() {
    let h = harness();

    let view = h.state.engine.like(7, 8).await.unwrap();
    assert_eq!(view.matched_user_name.as_deref(), Some("User 8"));

    let profile = h.store.get_profile(7).await.unwrap().unwrap();
    assert_eq!(profile.user_name, "User 7");
    assert_eq!(profile.pet_name, "unset");
    assert_eq!(profile.pet_breed, "unset");
}

#[tokio::test]
async fn test_provisioning_times_out_to_placeholder() {
    let h = harness_with(Arc::new(HangingDirectory), Arc::new(NoopNotificationSink));

    let started = std::time::Instant::now();
    let profile = h.state.provisioner.ensure_profile(11).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(profile.user_name, "User 11");
}

#[tokio::test]
async fn test_concurrent_provisioning_keeps_one_row() {
    let h = harness();

    let (a, b) = tokio::join!(
        h.state.provisioner.ensure_profile(20),
        h.state.provisioner.ensure_profile(20)
    );
    assert_eq!(a.unwrap().id, b.unwrap().id);
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interleaved_sends_are_totally_ordered() {
    let h = harness();
    let room = h.state.chat.get_or_create_room(1, 2).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..100 {
        let chat = h.state.chat.clone();
        let sender = if i % 2 == 0 { 1 } else { 2 };
        handles.push(tokio::spawn(async move {
            chat.send_message(&text(room.id, sender, &format!("msg {}", i)))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let history = h.state.chat.history(room.id, 1).await.unwrap();
    assert_eq!(history.len(), 100);
    for pair in history.windows(2) {
        assert!(pair[0].created_at <= pair[1].created_at);
        assert!(pair[0].id < pair[1].id);
    }

    let recent = h.state.chat.recent(room.id, 2, 10).await.unwrap();
    assert_eq!(recent.len(), 10);
    assert_eq!(recent.last().unwrap().id, history.last().unwrap().id);
    assert_eq!(recent[0].id, history[90].id);
}

#[tokio::test]
async fn test_mark_read_is_idempotent_and_skips_own_messages() {
    let h = harness();
    let room = h.state.chat.get_or_create_room(1, 2).await.unwrap();

    for i in 0..3 {
        h.state.chat.send_message(&text(room.id, 1, &format!("hi {}", i))).await.unwrap();
    }
    h.state.chat.send_message(&text(room.id, 2, "hello")).await.unwrap();

    assert_eq!(h.state.chat.unread_count(room.id, 2).await.unwrap(), 3);
    assert_eq!(h.state.chat.unread_count(room.id, 1).await.unwrap(), 1);
    assert_eq!(h.state.chat.total_unread_count(2).await.unwrap(), 3);

    assert_eq!(h.state.chat.mark_read(room.id, 2).await.unwrap(), 3);
    assert_eq!(h.state.chat.mark_read(room.id, 2).await.unwrap(), 0);
    assert_eq!(h.state.chat.unread_count(room.id, 2).await.unwrap(), 0);
    assert_eq!(h.state.chat.unread_count(room.id, 1).await.unwrap(), 1);
}

#[tokio::test]
async fn test_send_message_checks() {
    let h = harness();
    let room = h.state.chat.get_or_create_room(1, 2).await.unwrap();

    assert!(matches!(
        h.state.chat.send_message(&text(999, 1, "hi")).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        h.state.chat.send_message(&text(room.id, 3, "hi")).await,
        Err(AppError::Unauthorized(_))
    ));
    assert!(matches!(
        h.state.chat.send_message(&text(room.id, 1, "")).await,
        Err(AppError::BadRequest(_))
    ));
    assert!(matches!(
        h.state.chat.history(room.id, 3).await,
        Err(AppError::Unauthorized(_))
    ));
    assert!(matches!(
        h.state.chat.get_or_create_room(4, 4).await,
        Err(AppError::BadRequest(_))
    ));
}

#[tokio::test]
async fn test_leave_room_closes_until_reopened() {
    let h = harness();
    let room = h.state.chat.get_or_create_room(1, 2).await.unwrap();
    h.state.chat.send_message(&text(room.id, 1, "bye")).await.unwrap();

    h.state.chat.leave_room(room.id, 2).await.unwrap();
    assert!(matches!(
        h.state.chat.send_message(&text(room.id, 1, "still there?")).await,
        Err(AppError::Conflict(_))
    ));
    assert!(h.state.chat.list_rooms(1).await.unwrap().is_empty());
    assert_eq!(h.state.chat.history(room.id, 1).await.unwrap().len(), 1);

    let reopened = h.state.chat.get_or_create_room(2, 1).await.unwrap();
    assert_eq!(reopened.id, room.id);
    assert!(reopened.is_active);
}

#[tokio::test]
async fn test_room_list_snapshot_and_order() {
    let h = harness();
    assert_ok!(h.state.provisioner.save_profile(&profile_at(2, SEOUL.0, SEOUL.1)).await);

    let older = h.state.chat.get_or_create_room(1, 2).await.unwrap();
    let newer = h.state.chat.get_or_create_room(1, 3).await.unwrap();

    h.state.chat.send_message(&text(newer.id, 3, "first")).await.unwrap();
    let image = SendMessageRequest {
        message_type: Some("image".to_string()),
        ..text(older.id, 2, "https://cdn.example/pet.png")
    };
    h.state.chat.send_message(&image).await.unwrap();

    let rooms = h.state.chat.list_rooms(1).await.unwrap();
    assert_eq!(rooms.len(), 2);
    assert_eq!(rooms[0].id, older.id);
    assert_eq!(rooms[0].last_message.as_deref(), Some("Photo"));
    assert_eq!(rooms[0].other_user_name, "Owner 2");
    assert_eq!(rooms[0].unread_count, 1);
    assert_eq!(rooms[1].other_user_name, "User 3");
}

#[tokio::test]
async fn test_room_list_with_stalled_directory() {
    let h = harness_with(Arc::new(HangingDirectory), Arc::new(NoopNotificationSink));
    for other in 1..=10 {
        h.state.chat.get_or_create_room(100, other).await.unwrap();
    }

    let started = std::time::Instant::now();
    let rooms = h.state.chat.list_rooms(100).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1), "took {:?}", started.elapsed());
    assert_eq!(rooms.len(), 10);
    assert!(rooms
        .iter()
        .all(|r| r.other_user_name == format!("User {}", r.other_user_id)));
}

#[tokio::test]
async fn test_unread_count_checks_room_and_participant() {
    let h = harness();
    let room = h.state.chat.get_or_create_room(1, 2).await.unwrap();
    h.state.chat.send_message(&text(room.id, 1, "hi")).await.unwrap();

    assert_eq!(h.state.chat.unread_count(room.id, 2).await.unwrap(), 1);
    assert!(matches!(
        h.state.chat.unread_count(room.id + 999, 2).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        h.state.chat.unread_count(room.id, 3).await,
        Err(AppError::Unauthorized(_))
    ));
}

#[tokio::test]
async fn test_send_reaches_live_subscribers() {
    let h = harness();
    let room = h.state.chat.get_or_create_room(1, 2).await.unwrap();

    let (_id, mut rx) = h.state.registry.add_subscriber(&room_channel(room.id)).await;
    let sent = h.state.chat.send_message(&text(room.id, 2, "walk?")).await.unwrap();

    let payload = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    let frame: serde_json::Value = serde_json::from_str(&payload).unwrap();
    assert_eq!(frame["type"], "message");
    assert_eq!(frame["channel"], room_channel(room.id));
    assert_eq!(frame["message"]["id"], sent.id);
    assert_eq!(frame["message"]["content"], "walk?");
}

// ---------------------------------------------------------------------------
// HTTP surface
// ---------------------------------------------------------------------------

#[actix_web::test]
async fn test_http_like_flow() {
    let h = harness();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(h.state.clone()))
            .configure(routes::configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/petmate/like")
        .set_json(serde_json::json!({"fromUserId": 1, "toUserId": 2}))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["isMatched"], false);

    let req = test::TestRequest::post()
        .uri("/api/v1/petmate/like")
        .set_json(serde_json::json!({"fromUserId": 2, "toUserId": 1}))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["isMatched"], true);
    assert!(body["chatRoomId"].is_i64());

    let req = test::TestRequest::get()
        .uri("/api/v1/petmate/matches/1")
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn test_http_error_statuses() {
    let h = harness();
    let pending = h.state.engine.like(1, 2).await.unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(h.state.clone()))
            .configure(routes::configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/petmate/requests/{}/respond", pending.match_id.unwrap()))
        .set_json(serde_json::json!({"userId": 3, "accept": true}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::post()
        .uri("/api/v1/petmate/requests/424242/respond")
        .set_json(serde_json::json!({"userId": 2, "accept": true}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["status_code"], 404);

    let req = test::TestRequest::post()
        .uri("/api/v1/petmate/like")
        .set_json(serde_json::json!({"fromUserId": 4, "toUserId": 4}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_http_candidate_body_handling() {
    let h = harness();
    h.state.provisioner.ensure_profile(2).await.unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(h.state.clone()))
            .configure(routes::configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/petmate/candidates/1")
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let req = test::TestRequest::post()
        .uri("/api/v1/petmate/candidates/1")
        .insert_header(("content-type", "application/json"))
        .set_payload(r#"{"radiusKm": "#)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_http_unread_count_statuses() {
    let h = harness();
    let room = h.state.chat.get_or_create_room(1, 2).await.unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(h.state.clone()))
            .configure(routes::configure_routes),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/v1/messages/room/424242/unread?userId=1")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/messages/room/{}/unread?userId=3", room.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn test_http_chat_flow() {
    let h = harness();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(h.state.clone()))
            .configure(routes::configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/messages/room?userId1=2&userId2=1")
        .to_request();
    let room: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let room_id = room["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri("/api/v1/messages/send")
        .set_json(serde_json::json!({"roomId": room_id, "senderId": 1, "content": "hi"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/messages/room/{}/unread?userId=2", room_id))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["count"], 1);

    // Reading the history marks the room read
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/messages/room/{}?userId=2", room_id))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["senderName"], "User 1");

    let req = test::TestRequest::get()
        .uri("/api/v1/messages/unread/2")
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["count"], 0);

    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "healthy");
}
