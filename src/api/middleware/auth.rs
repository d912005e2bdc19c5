use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use sqlx::PgPool;
use tower_sessions::Session;
use uuid::Uuid;

use super::session::SESSION_KEY_USER_ID;
use crate::error::AppError;
use crate::models::{
    member::Member,
    user::{User, UserRole},
};

/// The logged-in account, loaded from the session on every request
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    PgPool: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| AppError::Session(msg.to_string()))?;

        let user_id: Uuid = session
            .get(SESSION_KEY_USER_ID)
            .await
            .map_err(|e| AppError::Session(e.to_string()))?
            .ok_or(AppError::Unauthorized)?;

        let pool = PgPool::from_ref(state);
        let user = User::find_by_id(&pool, user_id).await?.ok_or_else(|| {
            tracing::warn!(user_id = %user_id, "Session refers to a missing user");
            AppError::Unauthorized
        })?;

        Ok(CurrentUser(user))
    }
}

impl CurrentUser {
    pub fn id(&self) -> Uuid {
        self.0.id
    }

    /// Owner or staff of a gym; returns that gym
    pub fn require_staff(&self) -> Result<Uuid, AppError> {
        if !self.0.role.is_gym_staff() {
            return Err(AppError::Forbidden(
                "Gym owner or staff access required".to_string(),
            ));
        }
        self.gym_id()
    }

    /// The gym owner; returns the gym
    pub fn require_owner(&self) -> Result<Uuid, AppError> {
        if self.0.role != UserRole::Owner {
            return Err(AppError::Forbidden("Gym owner access required".to_string()));
        }
        self.gym_id()
    }

    fn gym_id(&self) -> Result<Uuid, AppError> {
        self.0
            .gym_id
            .ok_or_else(|| AppError::Validation("Account is not attached to a gym".to_string()))
    }

    /// The member record linked to a member account
    pub async fn member_record(&self, pool: &PgPool) -> Result<Member, AppError> {
        if self.0.role != UserRole::Member {
            return Err(AppError::Forbidden("Member account required".to_string()));
        }
        Member::find_by_user_id(pool, self.0.id)
            .await?
            .ok_or_else(|| AppError::NotFound("Member profile not found".to_string()))
    }

    /// Checks that this account may read or act on a member.
    /// Staff see members of their own gym; members see only themselves.
    pub fn ensure_can_access(&self, member: &Member) -> Result<(), AppError> {
        let allowed = match self.0.role {
            UserRole::Owner | UserRole::Staff => self.0.gym_id == Some(member.gym_id),
            UserRole::Member => member.user_id == Some(self.0.id),
        };
        if allowed {
            Ok(())
        } else {
            Err(AppError::Forbidden("Not allowed to access this member".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use crate::models::member::MembershipStatus;

    fn user(role: UserRole, gym_id: Option<Uuid>) -> CurrentUser {
        CurrentUser(User {
            id: Uuid::new_v4(),
            email: "someone@gym.com".to_string(),
            password_hash: String::new(),
            name: "Someone".to_string(),
            phone: None,
            role,
            gym_id,
            created_at: Utc::now(),
        })
    }

    fn member(gym_id: Uuid, user_id: Option<Uuid>) -> Member {
        let now = Utc::now();
        Member {
            id: Uuid::new_v4(),
            user_id,
            gym_id,
            plan_id: Uuid::new_v4(),
            name: "Jane".to_string(),
            email: None,
            phone: None,
            address: None,
            emergency_contact: None,
            membership_status: MembershipStatus::Active,
            start_date: now,
            end_date: now + Duration::days(30),
            total_visits: 0,
            auto_renewal: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_role_guards() {
        let gym_id = Uuid::new_v4();
        let owner = user(UserRole::Owner, Some(gym_id));
        let staff = user(UserRole::Staff, Some(gym_id));
        let member_account = user(UserRole::Member, Some(gym_id));

        assert_eq!(owner.require_owner().unwrap(), gym_id);
        assert_eq!(staff.require_staff().unwrap(), gym_id);
        assert!(matches!(staff.require_owner(), Err(AppError::Forbidden(_))));
        assert!(matches!(member_account.require_staff(), Err(AppError::Forbidden(_))));
        assert!(matches!(
            user(UserRole::Owner, None).require_staff(),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_member_access() {
        let gym_id = Uuid::new_v4();
        let staff = user(UserRole::Staff, Some(gym_id));
        let other_staff = user(UserRole::Staff, Some(Uuid::new_v4()));
        let account = user(UserRole::Member, Some(gym_id));

        let own = member(gym_id, Some(account.id()));
        let someone_else = member(gym_id, Some(Uuid::new_v4()));

        assert!(staff.ensure_can_access(&own).is_ok());
        assert!(other_staff.ensure_can_access(&own).is_err());
        assert!(account.ensure_can_access(&own).is_ok());
        assert!(account.ensure_can_access(&someone_else).is_err());
    }
}
