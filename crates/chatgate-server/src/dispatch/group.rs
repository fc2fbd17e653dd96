//! Group-management handlers (`TGM..`).
//!
//! Membership is authoritative only in the domain layer, so every handler
//! except create addresses the id list the [`GroupService`] returns.

use std::sync::Arc;

use async_trait::async_trait;
use chatgate_core::ChannelKey;
use chatgate_core::wire::Envelope;
use chatgate_core::wire::payloads::{
    ChangeGroupAvatar, CreateGroup, DeleteGroup, MemberChange, RenameGroup, UpdateGroupSetting,
};

use super::outcome::{Addressing, OperationError, Outcome};
use super::table::OperationHandler;
use crate::services::{GroupService, GroupSetting};
use crate::websocket::broadcast::Recipients;

fn members(ids: Vec<chatgate_core::ids::UserId>) -> Recipients {
    Recipients::Users { ids, exclude: None }
}

/// `TGM01`: owner plus proposed members, broadcast to everyone but the owner.
pub struct CreateGroupHandler {
    groups: Arc<dyn GroupService>,
}

impl CreateGroupHandler {
    /// Handler backed by `groups`.
    pub fn new(groups: Arc<dyn GroupService>) -> Self {
        Self { groups }
    }
}

#[async_trait]
impl OperationHandler for CreateGroupHandler {
    fn addressing(&self) -> Addressing {
        Addressing::ExplicitIds
    }

    async fn handle(&self, _channel: &ChannelKey, envelope: &Envelope) -> Result<Outcome, OperationError> {
        let mut request: CreateGroup = envelope.decode()?;
        let participants = request.participant_ids();
        let id = self.groups.create(&participants, &request).await?;
        request.id_chat = Some(id);
        let recipients = Recipients::Users {
            ids: participants,
            exclude: Some(request.owner.user_id.clone()),
        };
        Outcome::broadcast(recipients, &request)
    }
}

/// `TGM02`: the first id returned (the owner) is left out.
pub struct DeleteGroupHandler {
    groups: Arc<dyn GroupService>,
}

impl DeleteGroupHandler {
    /// Handler backed by `groups`.
    pub fn new(groups: Arc<dyn GroupService>) -> Self {
        Self { groups }
    }
}

#[async_trait]
impl OperationHandler for DeleteGroupHandler {
    fn addressing(&self) -> Addressing {
        Addressing::ExplicitIds
    }

    async fn handle(&self, _channel: &ChannelKey, envelope: &Envelope) -> Result<Outcome, OperationError> {
        let request: DeleteGroup = envelope.decode()?;
        let ids = self.groups.delete(&request).await?;
        let exclude = ids.first().cloned();
        Outcome::broadcast(Recipients::Users { ids, exclude }, &request)
    }
}

/// Which membership call a [`MemberChangeHandler`] makes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberAction {
    /// `TGM03`
    AppendMember,
    /// `TGM04`
    AppendAdmin,
    /// `TGM05`
    RemoveAdmin,
    /// `TGM06`
    RemoveMember,
    /// `TGM07`
    ChangeOwner,
}

/// `TGM03`..`TGM07`.
pub struct MemberChangeHandler {
    action: MemberAction,
    groups: Arc<dyn GroupService>,
}

impl MemberChangeHandler {
    /// Handler for `action` backed by `groups`.
    pub fn new(action: MemberAction, groups: Arc<dyn GroupService>) -> Self {
        Self { action, groups }
    }
}

#[async_trait]
impl OperationHandler for MemberChangeHandler {
    fn addressing(&self) -> Addressing {
        Addressing::ExplicitIds
    }

    async fn handle(&self, _channel: &ChannelKey, envelope: &Envelope) -> Result<Outcome, OperationError> {
        let request: MemberChange = envelope.decode()?;
        let ids = match self.action {
            MemberAction::AppendMember => self.groups.append_member(&request).await,
            MemberAction::AppendAdmin => self.groups.append_admin(&request).await,
            MemberAction::RemoveAdmin => self.groups.remove_admin(&request).await,
            MemberAction::RemoveMember => self.groups.remove_member(&request).await,
            MemberAction::ChangeOwner => self.groups.change_owner(&request).await,
        }?;
        Outcome::broadcast(members(ids), &request)
    }
}

/// `TGM08`.
pub struct RenameGroupHandler {
    groups: Arc<dyn GroupService>,
}

impl RenameGroupHandler {
    /// Handler backed by `groups`.
    pub fn new(groups: Arc<dyn GroupService>) -> Self {
        Self { groups }
    }
}

#[async_trait]
impl OperationHandler for RenameGroupHandler {
    fn addressing(&self) -> Addressing {
        Addressing::ExplicitIds
    }

    async fn handle(&self, _channel: &ChannelKey, envelope: &Envelope) -> Result<Outcome, OperationError> {
        let request: RenameGroup = envelope.decode()?;
        let ids = self.groups.rename(&request).await?;
        Outcome::broadcast(members(ids), &request)
    }
}

/// `TGM09`.
pub struct ChangeAvatarHandler {
    groups: Arc<dyn GroupService>,
}

impl ChangeAvatarHandler {
    /// Handler backed by `groups`.
    pub fn new(groups: Arc<dyn GroupService>) -> Self {
        Self { groups }
    }
}

#[async_trait]
impl OperationHandler for ChangeAvatarHandler {
    fn addressing(&self) -> Addressing {
        Addressing::ExplicitIds
    }

    async fn handle(&self, _channel: &ChannelKey, envelope: &Envelope) -> Result<Outcome, OperationError> {
        let request: ChangeGroupAvatar = envelope.decode()?;
        let ids = self.groups.change_avatar(&request).await?;
        Outcome::broadcast(members(ids), &request)
    }
}

/// `TGM10`..`TGM14`.
pub struct UpdateSettingHandler {
    setting: GroupSetting,
    groups: Arc<dyn GroupService>,
}

impl UpdateSettingHandler {
    /// Handler toggling `setting`.
    pub fn new(setting: GroupSetting, groups: Arc<dyn GroupService>) -> Self {
        Self { setting, groups }
    }
}

#[async_trait]
impl OperationHandler for UpdateSettingHandler {
    fn addressing(&self) -> Addressing {
        Addressing::ExplicitIds
    }

    async fn handle(&self, _channel: &ChannelKey, envelope: &Envelope) -> Result<Outcome, OperationError> {
        let request: UpdateGroupSetting = envelope.decode()?;
        let ids = self.groups.update_setting(self.setting, &request).await?;
        Outcome::broadcast(members(ids), &request)
    }
}
