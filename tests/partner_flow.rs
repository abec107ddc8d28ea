//! End-to-end partner flow: onboarding, search, browsing, follow handshake.
//!
//! The controller runs against a real libSQL store, on-disk photo storage and
//! the in-memory match cache; only the messaging transport is stubbed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use english_partner::cache::{CacheStore, MatchCache, MemoryCache};
use english_partner::channels::{
    Channel, DownloadedFile, EventStream, FollowDecision, Inbound, InboundEvent, Keyboard,
    MenuCommand, MessageBody, OutgoingMessage, PhotoUpload,
};
use english_partner::config::MatchSettings;
use english_partner::error::ChannelError;
use english_partner::media::{BlobStore, LocalBlobStore};
use english_partner::profile::{FindPartnerStep, UserId};
use english_partner::session::{SessionController, SessionRouter};
use english_partner::store::{Database, LibSqlBackend};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

const ALICE: UserId = 100;
const BOB: UserId = 200;
const CAROL: UserId = 300;
const DAN: UserId = 400;
const EVE: UserId = 500;

/// Stub transport that records every outgoing message.
#[derive(Default)]
struct RecordingChannel {
    sent: Mutex<Vec<OutgoingMessage>>,
}

impl RecordingChannel {
    fn to(&self, user: UserId) -> Vec<OutgoingMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.recipient == user)
            .cloned()
            .collect()
    }

    fn last_text(&self, user: UserId) -> String {
        self.to(user)
            .last()
            .map(|m| m.text_content().to_string())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        Ok(Box::pin(futures::stream::empty()))
    }

    async fn send(&self, message: OutgoingMessage) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn download_photo(&self, file_id: &str) -> Result<DownloadedFile, ChannelError> {
        Ok(DownloadedFile {
            bytes: format!("jpeg:{file_id}").into_bytes(),
            extension: Some("jpg".into()),
        })
    }
}

struct World {
    _dir: tempfile::TempDir,
    db: Arc<dyn Database>,
    channel: Arc<RecordingChannel>,
    blobs: Arc<LocalBlobStore>,
    cache_store: Arc<MemoryCache>,
    controller: Arc<SessionController>,
    usernames: HashMap<UserId, &'static str>,
}

impl World {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db: Arc<dyn Database> = Arc::new(
            LibSqlBackend::new_local(&dir.path().join("partners.db"))
                .await
                .unwrap(),
        );
        let blobs = Arc::new(
            LocalBlobStore::new(dir.path().join("storage"), Arc::clone(&db))
                .await
                .unwrap(),
        );
        let channel = Arc::new(RecordingChannel::default());
        let cache_store = Arc::new(MemoryCache::new());
        let controller = Arc::new(SessionController::new(
            Arc::clone(&db),
            channel.clone(),
            blobs.clone(),
            cache_store.clone(),
            &MatchSettings::default(),
        ));

        let usernames = HashMap::from([(ALICE, "alice"), (CAROL, "carol")]);
        Self {
            _dir: dir,
            db,
            channel,
            blobs,
            cache_store,
            controller,
            usernames,
        }
    }

    fn event(&self, user: UserId, payload: Inbound) -> InboundEvent {
        let event = InboundEvent::new(user, payload);
        match self.usernames.get(&user) {
            Some(name) => event.with_username(*name),
            None => event,
        }
    }

    async fn send(&self, user: UserId, payload: Inbound) {
        self.controller.handle_event(self.event(user, payload)).await;
    }

    async fn text(&self, user: UserId, text: &str) {
        self.send(user, Inbound::Text(text.into())).await;
    }

    async fn command(&self, user: UserId, command: MenuCommand) {
        self.send(user, Inbound::Command(command)).await;
    }

    async fn register(&self, user: UserId, name: &str, mobile: Option<&str>, level: &str, gender: &str) {
        self.send(user, Inbound::Start).await;
        self.text(user, name).await;
        match mobile {
            Some(mobile) => self.text(user, mobile).await,
            None => self.command(user, MenuCommand::SkipMobile).await,
        }
        self.text(user, level).await;
        self.send(
            user,
            Inbound::Photo(PhotoUpload {
                file_id: format!("photo-{user}"),
                file_size: Some(2048),
            }),
        )
        .await;
        self.text(user, gender).await;
    }
}

#[tokio::test]
async fn search_browse_follow_accept() {
    timeout(TEST_TIMEOUT, async {
        let world = World::new().await;
        world.register(BOB, "Bob", None, "Intermediate", "male").await;
        world
            .register(CAROL, "Carol", Some("0912 345 6789"), "Intermediate", "female")
            .await;
        world.register(DAN, "Dan", None, "Intermediate", "male").await;
        world.register(EVE, "Eve", None, "Beginner", "female").await;
        world
            .register(ALICE, "Alice", Some("09998887766"), "Intermediate", "female")
            .await;
        for user in [ALICE, BOB, CAROL, DAN, EVE] {
            let profile = world.db.get_profile(user).await.unwrap().unwrap();
            assert!(profile.is_registered(), "user {user} not registered");
            assert!(world.blobs.fetch(profile.photo.unwrap()).await.is_ok());
        }

        // Search: Intermediate, any gender.
        world.command(ALICE, MenuCommand::FindPartner).await;
        world.text(ALICE, "Intermediate").await;
        world.text(ALICE, "no matter").await;

        let cache = MatchCache::new(
            world.cache_store.clone() as Arc<dyn CacheStore>,
            Duration::from_secs(3600),
        );
        let cached: Vec<UserId> = cache
            .load(ALICE)
            .await
            .unwrap()
            .iter()
            .map(|c| c.telegram_id)
            .collect();
        assert_eq!(cached, vec![BOB, CAROL, DAN]);

        let first = world.channel.to(ALICE).last().cloned().unwrap();
        assert!(first.text_content().contains("Name: Bob"));
        assert!(matches!(first.body, MessageBody::Photo { .. }));
        assert_eq!(first.keyboard, Some(Keyboard::Browse));

        // Next, then follow Carol.
        world.command(ALICE, MenuCommand::NextPartner).await;
        assert!(world.channel.last_text(ALICE).contains("Name: Carol"));
        world.command(ALICE, MenuCommand::FollowPartner).await;
        assert_eq!(
            world.channel.last_text(ALICE),
            "Your follow request has been sent!"
        );

        let alice = world.db.get_profile(ALICE).await.unwrap().unwrap();
        assert_eq!(alice.find_partner, FindPartnerStep::Browsing);
        assert_eq!(alice.browse_cursor, 1);
        assert_eq!(alice.views_in_window, 2);
        assert_eq!(world.db.watched_ids(ALICE).await.unwrap(), vec![BOB, CAROL]);

        let pending = world.db.get_follow_request(ALICE, CAROL).await.unwrap().unwrap();
        assert!(!pending.accepted);
        let notice = world.channel.to(CAROL).last().cloned().unwrap();
        assert!(notice.text_content().starts_with("Alice is requesting to follow you."));
        assert_eq!(
            notice.keyboard,
            Some(Keyboard::FollowResponse { requester_id: ALICE })
        );

        // A duplicate while pending is refused.
        world.command(ALICE, MenuCommand::FollowPartner).await;
        assert_eq!(
            world.channel.last_text(ALICE),
            "You have already sent a follow request to this partner."
        );

        // Carol accepts: both sides get each other's contact.
        world
            .send(
                CAROL,
                Inbound::FollowDecision {
                    decision: FollowDecision::Accept,
                    requester_id: ALICE,
                },
            )
            .await;
        assert!(world.db.get_follow_request(ALICE, CAROL).await.unwrap().unwrap().accepted);
        assert_eq!(
            world.channel.last_text(ALICE),
            "Carol has accepted your follow request! 🎉\nAccepted username: @carol"
        );
        assert_eq!(
            world.channel.last_text(CAROL),
            "You have accepted the follow request\nusername: @alice"
        );

        // Replaying the accept finds nothing pending.
        world
            .send(
                CAROL,
                Inbound::FollowDecision {
                    decision: FollowDecision::Accept,
                    requester_id: ALICE,
                },
            )
            .await;
        assert_eq!(
            world.channel.last_text(CAROL),
            "No follow request found to Accept."
        );

        // A new search never shows already-watched users again.
        world.command(ALICE, MenuCommand::FindPartner).await;
        world.text(ALICE, "Intermediate").await;
        world.text(ALICE, "no matter").await;
        let cached: Vec<UserId> = cache
            .load(ALICE)
            .await
            .unwrap()
            .iter()
            .map(|c| c.telegram_id)
            .collect();
        assert_eq!(cached, vec![DAN]);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn mobile_contact_when_no_username() {
    timeout(TEST_TIMEOUT, async {
        let world = World::new().await;
        world
            .register(BOB, "Bob", Some("09120000000"), "Advanced", "male")
            .await;
        world.register(ALICE, "Alice", None, "Advanced", "female").await;

        world.command(ALICE, MenuCommand::FindPartner).await;
        world.text(ALICE, "Advanced").await;
        world.text(ALICE, "👨 Male").await;
        // Raw captions are decoded by the transport, so the literal caption
        // is an invalid answer here.
        assert!(world.channel.last_text(ALICE).starts_with("Invalid gender option"));
        world.text(ALICE, "male").await;
        world.command(ALICE, MenuCommand::FollowPartner).await;

        world
            .send(
                BOB,
                Inbound::FollowDecision {
                    decision: FollowDecision::Accept,
                    requester_id: ALICE,
                },
            )
            .await;
        assert!(world
            .channel
            .last_text(ALICE)
            .ends_with("Accepted Mobile Number: 09120000000"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn concurrent_onboarding_through_router() {
    timeout(TEST_TIMEOUT, async {
        let world = World::new().await;
        let router = SessionRouter::new(world.controller.clone(), Duration::from_secs(5));

        let users: Vec<UserId> = (1..=12).collect();
        let script = |user: UserId| {
            vec![
                Inbound::Start,
                Inbound::Text(format!("User {user}")),
                Inbound::Command(MenuCommand::SkipMobile),
                Inbound::Text("Beginner".into()),
                Inbound::Photo(PhotoUpload {
                    file_id: format!("p{user}"),
                    file_size: None,
                }),
                Inbound::Text("male".into()),
            ]
        };

        // Interleave users; each user's own steps stay in order.
        let scripts: Vec<Vec<Inbound>> = users.iter().map(|u| script(*u)).collect();
        for step in 0..6 {
            for (user, steps) in users.iter().zip(&scripts) {
                router.dispatch(world.event(*user, steps[step].clone()));
            }
        }

        loop {
            let mut done = 0;
            for user in &users {
                if let Some(p) = world.db.get_profile(*user).await.unwrap() {
                    if p.is_registered() {
                        done += 1;
                    }
                }
            }
            if done == users.len() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        for user in &users {
            let p = world.db.get_profile(*user).await.unwrap().unwrap();
            assert_eq!(p.name, format!("User {user}"));
            assert!(p.mobile_number.is_none());
            assert!(p.photo.is_some());
        }
    })
    .await
    .expect("test timed out");
}
