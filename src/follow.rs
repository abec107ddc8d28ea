//! Follow-request handshake: request, then accept (contact reveal) or decline.

use std::sync::Arc;

use tracing::{info, warn};

use crate::channels::{Channel, Keyboard, OutgoingMessage};
use crate::error::{DatabaseError, FollowError};
use crate::profile::{UserId, UserProfile};
use crate::session::prompts;
use crate::store::Database;

pub struct FollowWorkflow {
    db: Arc<dyn Database>,
    channel: Arc<dyn Channel>,
}

impl FollowWorkflow {
    pub fn new(db: Arc<dyn Database>, channel: Arc<dyn Channel>) -> Self {
        Self { db, channel }
    }

    /// Record a pending request from `requester` to `target` and notify the
    /// target with accept/decline buttons.
    pub async fn request(
        &self,
        requester: &UserProfile,
        target: UserId,
    ) -> Result<(), FollowError> {
        let requester_id = requester.telegram_id;
        if !self.db.create_follow_request(requester_id, target).await? {
            return Err(FollowError::AlreadyRequested {
                requester_id,
                target_id: target,
            });
        }
        info!(user_id = requester_id, target_id = target, "Follow request created");

        let notice = OutgoingMessage::card(
            target,
            requester.photo,
            prompts::follow_request_card(requester),
        )
        .with_keyboard(Keyboard::FollowResponse { requester_id });
        self.notify(notice).await;
        Ok(())
    }

    /// `target` accepts the pending request from `requester`; both sides
    /// receive each other's contact details.
    pub async fn accept(&self, target: UserId, requester: UserId) -> Result<(), FollowError> {
        if !self.db.accept_follow_request(requester, target).await? {
            return Err(FollowError::NotFound {
                requester_id: requester,
                target_id: target,
            });
        }
        info!(user_id = target, requester_id = requester, "Follow request accepted");

        // Fresh copies; cached snapshots may be stale by now.
        let (target_profile, requester_profile) = self.both_profiles(target, requester).await?;

        self.notify(
            OutgoingMessage::text(requester, prompts::accepted_for_requester(&target_profile))
                .with_keyboard(Keyboard::BackHome),
        )
        .await;
        self.notify(
            OutgoingMessage::text(target, prompts::accepted_for_target(&requester_profile))
                .with_keyboard(Keyboard::BackHome),
        )
        .await;
        Ok(())
    }

    /// `target` declines the pending request from `requester`; the row is
    /// removed and both sides are told.
    pub async fn decline(&self, target: UserId, requester: UserId) -> Result<(), FollowError> {
        if !self.db.delete_pending_follow_request(requester, target).await? {
            return Err(FollowError::NotFound {
                requester_id: requester,
                target_id: target,
            });
        }
        info!(user_id = target, requester_id = requester, "Follow request declined");

        let target_profile = self.profile(target).await?;
        self.notify(
            OutgoingMessage::text(requester, prompts::declined_for_requester(&target_profile))
                .with_keyboard(Keyboard::BackHome),
        )
        .await;
        self.notify(
            OutgoingMessage::text(target, prompts::YOU_DECLINED).with_keyboard(Keyboard::BackHome),
        )
        .await;
        Ok(())
    }

    async fn profile(&self, id: UserId) -> Result<UserProfile, DatabaseError> {
        self.db
            .get_profile(id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "user".into(),
                id: id.to_string(),
            })
    }

    async fn both_profiles(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<(UserProfile, UserProfile), DatabaseError> {
        Ok((self.profile(a).await?, self.profile(b).await?))
    }

    /// Delivery is best-effort; the handshake state is already committed.
    async fn notify(&self, message: OutgoingMessage) {
        let recipient = message.recipient;
        if let Err(e) = self.channel.send(message).await {
            warn!(recipient, "Follow notification failed: {e}");
        }
    }
}
