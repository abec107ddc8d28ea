//! Conversation controller.
//!
//! Routes each inbound event by the sender's persisted cursors: onboarding,
//! profile editing, and the find-partner dialogue. Every event ends in a
//! message to the user; nothing is propagated to the caller.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::locks::IdentityLocks;
use super::prompts;
use super::router::EventHandler;
use crate::cache::{CacheStore, MatchCache};
use crate::channels::{
    Channel, FollowDecision, Inbound, InboundEvent, Keyboard, MenuCommand, OutgoingMessage,
    PhotoUpload,
};
use crate::config::MatchSettings;
use crate::error::{
    ChannelError, FlowError, FollowError, PaginationError, RateLimitError, ValidationError,
};
use crate::follow::FollowWorkflow;
use crate::matching::MatchingEngine;
use crate::media::BlobStore;
use crate::profile::validation::{
    validate_english_level, validate_gender, validate_gender_filter, validate_mobile,
    validate_name, validate_photo,
};
use crate::profile::{
    EditField, EnglishLevel, FindPartnerStep, GenderFilter, MediaId, OnboardingStep, UserId,
    UserProfile,
};
use crate::rate_limit::RateLimiter;
use crate::store::Database;

/// A free-form answer to whatever question is pending.
#[derive(Debug, Clone)]
enum Answer {
    Text(String),
    Photo(PhotoUpload),
}

impl Answer {
    fn text(&self) -> Result<&str, ValidationError> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Photo(_) => Err(ValidationError::ExpectedText),
        }
    }

    fn photo(&self) -> Option<&PhotoUpload> {
        match self {
            Self::Photo(photo) => Some(photo),
            Self::Text(_) => None,
        }
    }
}

/// A newly stored photo not yet referenced by a saved profile.
#[derive(Debug, Clone, Copy)]
struct StagedPhoto {
    new: MediaId,
    replaced: Option<MediaId>,
}

pub struct SessionController {
    db: Arc<dyn Database>,
    channel: Arc<dyn Channel>,
    blobs: Arc<dyn BlobStore>,
    matcher: MatchingEngine,
    cache: MatchCache,
    limiter: RateLimiter,
    follow: FollowWorkflow,
    locks: IdentityLocks,
}

impl SessionController {
    pub fn new(
        db: Arc<dyn Database>,
        channel: Arc<dyn Channel>,
        blobs: Arc<dyn BlobStore>,
        cache_store: Arc<dyn CacheStore>,
        settings: &MatchSettings,
    ) -> Self {
        Self {
            matcher: MatchingEngine::new(Arc::clone(&db), settings.match_limit),
            cache: MatchCache::new(cache_store, settings.cache_ttl),
            limiter: RateLimiter::from_settings(settings),
            follow: FollowWorkflow::new(Arc::clone(&db), Arc::clone(&channel)),
            locks: IdentityLocks::new(),
            db,
            channel,
            blobs,
        }
    }

    /// Handle one event. Events for the same sender never overlap.
    pub async fn handle_event(&self, event: InboundEvent) {
        let sender = event.sender;
        let _guard = self.locks.lock(sender).await;
        if let Err(e) = self.dispatch(event).await {
            self.report(sender, e).await;
        }
    }

    async fn dispatch(&self, event: InboundEvent) -> Result<(), FlowError> {
        let profile = self.load(event.sender, event.username).await?;
        debug!(
            user_id = profile.telegram_id,
            onboarding = %profile.onboarding,
            editing = %profile.editing,
            find_partner = %profile.find_partner,
            "Dispatching event"
        );

        match event.payload {
            Inbound::Start => self.start(profile).await,
            Inbound::Command(command) => self.command(profile, command).await,
            Inbound::Text(text) => self.answer(profile, Answer::Text(text)).await,
            Inbound::Photo(photo) => self.answer(profile, Answer::Photo(photo)).await,
            Inbound::FollowDecision {
                decision,
                requester_id,
            } => self.follow_decision(profile, decision, requester_id).await,
        }
    }

    /// Fetch or create the sender's profile, refreshing the public handle.
    async fn load(
        &self,
        sender: UserId,
        username: Option<String>,
    ) -> Result<UserProfile, FlowError> {
        let mut profile = self.db.get_or_create_profile(sender).await?;
        if profile.username != username {
            profile.username = username;
            self.db.save_profile(&profile).await?;
        }
        Ok(profile)
    }

    async fn send(&self, message: OutgoingMessage) -> Result<(), FlowError> {
        self.channel.send(message).await?;
        Ok(())
    }

    async fn say(&self, user: UserId, text: &str, keyboard: Keyboard) -> Result<(), FlowError> {
        self.send(OutgoingMessage::text(user, text).with_keyboard(keyboard))
            .await
    }

    // ── Start / home ────────────────────────────────────────────────

    async fn start(&self, mut profile: UserProfile) -> Result<(), FlowError> {
        let id = profile.telegram_id;
        reset_dialogues(&mut profile);

        if profile.is_registered() {
            self.db.save_profile(&profile).await?;
            return self
                .say(id, prompts::WELCOME_BACK, Keyboard::MainMenu)
                .await;
        }

        profile.onboarding = OnboardingStep::AwaitingName;
        self.db.save_profile(&profile).await?;
        info!(user_id = id, "Onboarding started");

        self.say(id, prompts::WELCOME, Keyboard::Remove).await?;
        self.send(prompts::question(id, profile.onboarding)).await
    }

    async fn back_home(&self, mut profile: UserProfile) -> Result<(), FlowError> {
        if !profile.is_registered() {
            return self.start(profile).await;
        }
        reset_dialogues(&mut profile);
        self.db.save_profile(&profile).await?;
        self.say(profile.telegram_id, prompts::WELCOME_BACK, Keyboard::MainMenu)
            .await
    }

    // ── Menu commands ───────────────────────────────────────────────

    async fn command(&self, mut profile: UserProfile, command: MenuCommand) -> Result<(), FlowError> {
        let id = profile.telegram_id;
        if !profile.is_registered() && !command.allowed_unregistered() {
            self.say(id, prompts::REGISTER_FIRST, Keyboard::Remove)
                .await?;
            return self.send(prompts::question(id, profile.onboarding)).await;
        }

        match command {
            MenuCommand::BackToHome => self.back_home(profile).await,
            MenuCommand::SkipMobile => self.skip_mobile(profile).await,
            MenuCommand::ShowProfile => self.show_profile(&profile).await,
            MenuCommand::EditProfile => {
                self.say(id, prompts::EDIT_MENU, Keyboard::EditMenu).await
            }
            MenuCommand::Edit(EditField::Idle) => {
                self.say(id, prompts::EDIT_MENU, Keyboard::EditMenu).await
            }
            MenuCommand::Edit(field) => {
                profile.editing = field;
                if profile.find_partner.awaits_filter() {
                    profile.find_partner = FindPartnerStep::Idle;
                }
                self.db.save_profile(&profile).await?;
                self.say(id, prompts::edit_prompt(field), prompts::edit_keyboard(field))
                    .await
            }
            MenuCommand::FindPartner => self.begin_search(profile).await,
            MenuCommand::NextPartner => self.next_candidate(profile).await,
            MenuCommand::FollowPartner => self.follow_current(profile).await,
        }
    }

    async fn skip_mobile(&self, mut profile: UserProfile) -> Result<(), FlowError> {
        let id = profile.telegram_id;
        match profile.onboarding {
            OnboardingStep::AwaitingMobile => {
                profile.mobile_number = None;
                self.advance_onboarding(profile, None).await
            }
            OnboardingStep::Registered => {
                self.say(id, prompts::MOBILE_SKIP_NOT_EXPECTED, Keyboard::MainMenu)
                    .await
            }
            step => self.send(prompts::question(id, step)).await,
        }
    }

    async fn show_profile(&self, profile: &UserProfile) -> Result<(), FlowError> {
        let message = OutgoingMessage::card(
            profile.telegram_id,
            profile.photo,
            prompts::profile_card(profile),
        )
        .with_keyboard(Keyboard::MainMenu);
        self.send(message).await
    }

    // ── Answers ─────────────────────────────────────────────────────

    /// Route a free-form answer. A failed validation re-prompts and leaves
    /// the stored profile untouched.
    async fn answer(&self, profile: UserProfile, answer: Answer) -> Result<(), FlowError> {
        match self.apply_answer(profile.clone(), answer).await {
            Err(FlowError::Validation(e)) => self.reprompt(&profile, &e).await,
            other => other,
        }
    }

    async fn apply_answer(&self, profile: UserProfile, answer: Answer) -> Result<(), FlowError> {
        if profile.find_partner.awaits_filter() {
            self.filter_answer(profile, &answer).await
        } else if !profile.is_registered() {
            self.onboarding_answer(profile, &answer).await
        } else if profile.editing.is_active() {
            self.edit_answer(profile, &answer).await
        } else {
            self.say(profile.telegram_id, prompts::MAIN_MENU_HINT, Keyboard::MainMenu)
                .await
        }
    }

    async fn reprompt(&self, profile: &UserProfile, err: &ValidationError) -> Result<(), FlowError> {
        let id = profile.telegram_id;
        debug!(user_id = id, error = %err, "Answer rejected");

        let keyboard = if profile.find_partner == FindPartnerStep::AwaitingEnglishFilter {
            Keyboard::EnglishLevels
        } else if profile.find_partner == FindPartnerStep::AwaitingGenderFilter {
            Keyboard::GenderFilter
        } else if !profile.is_registered() {
            prompts::question(id, profile.onboarding)
                .keyboard
                .unwrap_or(Keyboard::Remove)
        } else {
            prompts::edit_keyboard(profile.editing)
        };
        self.say(id, &prompts::validation_message(err), keyboard)
            .await
    }

    async fn onboarding_answer(
        &self,
        mut profile: UserProfile,
        answer: &Answer,
    ) -> Result<(), FlowError> {
        let mut staged = None;
        match profile.onboarding {
            OnboardingStep::AwaitingName => profile.name = validate_name(answer.text()?)?,
            OnboardingStep::AwaitingMobile => {
                profile.mobile_number = Some(validate_mobile(answer.text()?)?);
            }
            OnboardingStep::AwaitingEnglishLevel => {
                profile.english_level = Some(validate_english_level(answer.text()?)?);
            }
            OnboardingStep::AwaitingPhoto => {
                let upload = validate_photo(answer.photo())?;
                staged = Some(self.stage_photo(&mut profile, upload).await?);
            }
            OnboardingStep::AwaitingGender => {
                profile.gender = Some(validate_gender(answer.text()?)?);
            }
            OnboardingStep::Registered => {
                return self
                    .say(profile.telegram_id, prompts::MAIN_MENU_HINT, Keyboard::MainMenu)
                    .await;
            }
        }
        self.advance_onboarding(profile, staged).await
    }

    /// Move to the next onboarding question, persisting the answer just taken.
    async fn advance_onboarding(
        &self,
        mut profile: UserProfile,
        staged: Option<StagedPhoto>,
    ) -> Result<(), FlowError> {
        let id = profile.telegram_id;
        let Some(next) = profile.onboarding.next() else {
            return Ok(());
        };
        profile.onboarding = next;
        self.save_staged(&profile, staged).await?;

        if next == OnboardingStep::Registered {
            info!(user_id = id, "Registration completed");
            return self
                .say(id, prompts::REGISTRATION_COMPLETE, Keyboard::MainMenu)
                .await;
        }
        debug!(user_id = id, step = %next, "Onboarding advanced");
        self.send(prompts::question(id, next)).await
    }

    async fn edit_answer(&self, mut profile: UserProfile, answer: &Answer) -> Result<(), FlowError> {
        let field = profile.editing;
        let mut staged = None;
        match field {
            EditField::Name => profile.name = validate_name(answer.text()?)?,
            EditField::EnglishLevel => {
                profile.english_level = Some(validate_english_level(answer.text()?)?);
            }
            EditField::Gender => profile.gender = Some(validate_gender(answer.text()?)?),
            EditField::Photo => {
                let upload = validate_photo(answer.photo())?;
                staged = Some(self.stage_photo(&mut profile, upload).await?);
            }
            EditField::Idle => return Ok(()),
        }
        profile.editing = EditField::Idle;
        self.save_staged(&profile, staged).await?;

        info!(user_id = profile.telegram_id, field = %field, "Profile edited");
        self.say(
            profile.telegram_id,
            prompts::edit_confirmation(field),
            Keyboard::EditMenu,
        )
        .await
    }

    // ── Photos ──────────────────────────────────────────────────────

    /// Download and store an upload, pointing `profile` at it.
    async fn stage_photo(
        &self,
        profile: &mut UserProfile,
        upload: &PhotoUpload,
    ) -> Result<StagedPhoto, FlowError> {
        let file = self.channel.download_photo(&upload.file_id).await?;
        let new = self
            .blobs
            .store(profile.telegram_id, &file.bytes, file.extension.as_deref())
            .await?;
        let replaced = profile.photo.replace(new);
        Ok(StagedPhoto { new, replaced })
    }

    /// Save `profile`. A staged photo's predecessor is freed once the save
    /// succeeds; on failure the staged blob itself is freed.
    async fn save_staged(
        &self,
        profile: &UserProfile,
        staged: Option<StagedPhoto>,
    ) -> Result<(), FlowError> {
        if let Err(e) = self.db.save_profile(profile).await {
            if let Some(staged) = staged {
                if let Err(cleanup) = self.blobs.delete(staged.new).await {
                    warn!(media_id = %staged.new, "Failed to free unsaved photo: {cleanup}");
                }
            }
            return Err(e.into());
        }

        if let Some(old) = staged.and_then(|s| s.replaced.filter(|old| *old != s.new)) {
            if let Err(e) = self.blobs.delete(old).await {
                warn!(user_id = profile.telegram_id, media_id = %old, "Failed to free replaced photo: {e}");
            }
        }
        Ok(())
    }

    // ── Find partner ────────────────────────────────────────────────

    async fn begin_search(&self, mut profile: UserProfile) -> Result<(), FlowError> {
        profile.editing = EditField::Idle;
        profile.find_partner = FindPartnerStep::AwaitingEnglishFilter;
        self.db.save_profile(&profile).await?;
        self.say(
            profile.telegram_id,
            prompts::ASK_ENGLISH_FILTER,
            Keyboard::EnglishLevels,
        )
        .await
    }

    async fn filter_answer(&self, mut profile: UserProfile, answer: &Answer) -> Result<(), FlowError> {
        let id = profile.telegram_id;
        match profile.find_partner {
            FindPartnerStep::AwaitingEnglishFilter => {
                profile.last_english_filter = Some(validate_english_level(answer.text()?)?);
                profile.find_partner = FindPartnerStep::AwaitingGenderFilter;
                self.db.save_profile(&profile).await?;
                self.say(id, prompts::ASK_GENDER_FILTER, Keyboard::GenderFilter)
                    .await
            }
            FindPartnerStep::AwaitingGenderFilter => {
                let gender = validate_gender_filter(answer.text()?)?;
                profile.last_gender_filter = Some(gender);
                let Some(level) = profile.last_english_filter else {
                    return self.begin_search(profile).await;
                };
                self.search(profile, level, gender).await
            }
            FindPartnerStep::Idle | FindPartnerStep::Browsing => Ok(()),
        }
    }

    async fn search(
        &self,
        mut profile: UserProfile,
        level: EnglishLevel,
        gender: GenderFilter,
    ) -> Result<(), FlowError> {
        let id = profile.telegram_id;

        // A user in cooldown keeps the previous list and cursor untouched.
        if let Err(RateLimitError::Cooldown { remaining }) =
            self.limiter.admit_profile(&profile, Utc::now())
        {
            info!(user_id = id, remaining_secs = remaining.as_secs(), "Search refused, view limit reached");
            profile.find_partner = FindPartnerStep::Idle;
            self.db.save_profile(&profile).await?;
            return self
                .say(id, &prompts::cooldown(remaining), Keyboard::BackHome)
                .await;
        }

        let candidates = self.matcher.find(id, level, gender).await?;
        profile.browse_cursor = 0;
        profile.find_partner = if candidates.is_empty() {
            FindPartnerStep::Idle
        } else {
            FindPartnerStep::Browsing
        };

        // Cursor first: a stale cursor must never index into a new list.
        self.db.save_profile(&profile).await?;
        self.cache.replace(id, &candidates).await?;

        if candidates.is_empty() {
            return self.say(id, prompts::NO_MATCHES, Keyboard::MainMenu).await;
        }
        self.show_current(profile).await
    }

    /// Show the candidate under the cursor, charging one view.
    async fn show_current(&self, mut profile: UserProfile) -> Result<(), FlowError> {
        let id = profile.telegram_id;
        let candidate = self.cache.candidate_at(id, profile.browse_cursor).await?;

        let window = match self.limiter.admit_profile(&profile, Utc::now()) {
            Ok(window) => window,
            Err(RateLimitError::Cooldown { remaining }) => {
                info!(user_id = id, remaining_secs = remaining.as_secs(), "View limit reached");
                return self
                    .say(id, &prompts::cooldown(remaining), Keyboard::BackHome)
                    .await;
            }
        };
        profile.view_window_start = Some(window.start);
        profile.views_in_window = window.views;

        // Counter, cursor and watch record land together before the send.
        self.db.record_view(&profile, candidate.telegram_id).await?;
        debug!(
            user_id = id,
            candidate_id = candidate.telegram_id,
            cursor = profile.browse_cursor,
            views = window.views,
            "Candidate shown"
        );

        let card = OutgoingMessage::card(id, candidate.photo, prompts::candidate_card(&candidate))
            .with_keyboard(Keyboard::Browse);
        self.send(card).await
    }

    async fn next_candidate(&self, mut profile: UserProfile) -> Result<(), FlowError> {
        let id = profile.telegram_id;
        match self.cache.next_index(id, profile.browse_cursor).await {
            Ok(cursor) => {
                profile.browse_cursor = cursor;
                self.show_current(profile).await
            }
            Err(PaginationError::CacheUnavailable) => self.restart_search(profile).await,
            Err(PaginationError::NoMoreCandidates) => {
                self.say(id, prompts::NO_MORE_CANDIDATES, Keyboard::Browse)
                    .await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn follow_current(&self, profile: UserProfile) -> Result<(), FlowError> {
        let id = profile.telegram_id;
        let candidate = match self.cache.candidate_at(id, profile.browse_cursor).await {
            Ok(candidate) => candidate,
            Err(PaginationError::CacheUnavailable) => return self.restart_search(profile).await,
            Err(e) => return Err(e.into()),
        };
        if !self.db.has_watched(id, candidate.telegram_id).await? {
            debug!(user_id = id, candidate_id = candidate.telegram_id, "Follow refused, candidate not shown");
            return self.say(id, prompts::FOLLOW_NOT_SHOWN, Keyboard::MainMenu).await;
        }

        match self.follow.request(&profile, candidate.telegram_id).await {
            Ok(()) => self.say(id, prompts::FOLLOW_SENT, Keyboard::Browse).await,
            Err(FollowError::AlreadyRequested { .. }) => {
                self.say(id, prompts::FOLLOW_ALREADY_SENT, Keyboard::Browse)
                    .await
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The cached list is gone; collect filters again.
    async fn restart_search(&self, mut profile: UserProfile) -> Result<(), FlowError> {
        debug!(user_id = profile.telegram_id, "Match list expired, restarting search");
        profile.editing = EditField::Idle;
        profile.find_partner = FindPartnerStep::AwaitingEnglishFilter;
        self.db.save_profile(&profile).await?;
        let id = profile.telegram_id;
        self.say(id, prompts::SEARCH_EXPIRED, Keyboard::Remove).await?;
        self.say(id, prompts::ASK_ENGLISH_FILTER, Keyboard::EnglishLevels)
            .await
    }

    // ── Follow decisions ────────────────────────────────────────────

    async fn follow_decision(
        &self,
        profile: UserProfile,
        decision: FollowDecision,
        requester: UserId,
    ) -> Result<(), FlowError> {
        let target = profile.telegram_id;
        let (result, not_found) = match decision {
            FollowDecision::Accept => (
                self.follow.accept(target, requester).await,
                prompts::NO_REQUEST_TO_ACCEPT,
            ),
            FollowDecision::Decline => (
                self.follow.decline(target, requester).await,
                prompts::NO_REQUEST_TO_DECLINE,
            ),
        };
        match result {
            Ok(()) => Ok(()),
            Err(FollowError::NotFound { .. }) => {
                self.say(target, not_found, Keyboard::BackHome).await
            }
            Err(e) => Err(e.into()),
        }
    }

    // ── Error reporting ─────────────────────────────────────────────

    /// Turn a failed event into a user-visible message.
    async fn report(&self, user: UserId, err: FlowError) {
        let message = match &err {
            FlowError::Validation(e) => {
                OutgoingMessage::text(user, prompts::validation_message(e))
            }
            FlowError::RateLimited(RateLimitError::Cooldown { remaining }) => {
                OutgoingMessage::text(user, prompts::cooldown(*remaining))
                    .with_keyboard(Keyboard::BackHome)
            }
            FlowError::Pagination(PaginationError::NoMoreCandidates) => {
                OutgoingMessage::text(user, prompts::NO_MORE_CANDIDATES)
                    .with_keyboard(Keyboard::Browse)
            }
            FlowError::Pagination(PaginationError::CacheUnavailable) => {
                OutgoingMessage::text(user, prompts::SEARCH_EXPIRED)
                    .with_keyboard(Keyboard::MainMenu)
            }
            FlowError::Follow(FollowError::AlreadyRequested { .. }) => {
                OutgoingMessage::text(user, prompts::FOLLOW_ALREADY_SENT)
                    .with_keyboard(Keyboard::Browse)
            }
            FlowError::Media(_) | FlowError::Channel(ChannelError::DownloadFailed { .. }) => {
                error!(user_id = user, "Photo handling failed: {err}");
                OutgoingMessage::text(user, prompts::PHOTO_UPLOAD_FAILED)
            }
            _ => {
                error!(user_id = user, "Event handling failed: {err}");
                OutgoingMessage::text(user, prompts::TRY_AGAIN_LATER)
            }
        };

        if let Err(e) = self.channel.send(message).await {
            warn!(user_id = user, "Failed to report error to user: {e}");
        }
    }
}

#[async_trait]
impl EventHandler for SessionController {
    async fn handle(&self, event: InboundEvent) {
        self.handle_event(event).await;
    }
}

/// Leave any edit or find-partner dialogue.
fn reset_dialogues(profile: &mut UserProfile) {
    profile.editing = EditField::Idle;
    profile.find_partner = FindPartnerStep::Idle;
}
