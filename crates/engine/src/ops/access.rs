//! Capability checks run before the engine touches expenses or splits.

use sea_orm::{DatabaseTransaction, prelude::*};

use crate::{EngineError, Expense, ResultEngine, group_members, groups, users};

use super::Engine;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum MembershipRole {
    Owner,
    Member,
}

impl MembershipRole {
    pub(super) fn can_manage(self) -> bool {
        matches!(self, Self::Owner)
    }
}

impl TryFrom<&str> for MembershipRole {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "owner" => Ok(Self::Owner),
            "member" => Ok(Self::Member),
            other => Err(EngineError::Forbidden(format!(
                "invalid membership role: {other}"
            ))),
        }
    }
}

impl Engine {
    pub(super) async fn require_group(
        &self,
        db: &DatabaseTransaction,
        group_id: &str,
    ) -> ResultEngine<groups::Model> {
        groups::Entity::find_by_id(group_id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("group not exists".to_string()))
    }

    pub(super) async fn membership_role(
        &self,
        db: &DatabaseTransaction,
        group_id: &str,
        user_id: &str,
    ) -> ResultEngine<Option<MembershipRole>> {
        let row = group_members::Entity::find_by_id((group_id.to_string(), user_id.to_string()))
            .one(db)
            .await?;
        row.as_ref()
            .map(|m| MembershipRole::try_from(m.role.as_str()))
            .transpose()
    }

    /// Loads the group and checks that `user_id` belongs to it.
    pub(super) async fn require_group_member(
        &self,
        db: &DatabaseTransaction,
        group_id: &str,
        user_id: &str,
    ) -> ResultEngine<(groups::Model, MembershipRole)> {
        let group = self.require_group(db, group_id).await?;
        let role = self
            .membership_role(db, group_id, user_id)
            .await?
            .ok_or_else(|| {
                EngineError::Forbidden(format!("{user_id} is not a member of the group"))
            })?;
        Ok((group, role))
    }

    pub(super) async fn require_user_exists(
        &self,
        db: &DatabaseTransaction,
        user_id: &str,
    ) -> ResultEngine<()> {
        if users::Entity::find_by_id(user_id.to_string())
            .one(db)
            .await?
            .is_none()
        {
            return Err(EngineError::KeyNotFound(format!("user {user_id}")));
        }
        Ok(())
    }

    /// Only the expense creator or a group owner may change an expense.
    pub(super) async fn require_expense_manager(
        &self,
        db: &DatabaseTransaction,
        expense: &Expense,
        user_id: &str,
    ) -> ResultEngine<()> {
        let (_, role) = self
            .require_group_member(db, &expense.group_id, user_id)
            .await?;
        if expense.created_by == user_id || role.can_manage() {
            return Ok(());
        }
        Err(EngineError::Forbidden(
            "only the creator or a group owner can change the expense".to_string(),
        ))
    }
}
