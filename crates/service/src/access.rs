//! Caller identity and the role checks every service applies before
//! touching data.

use model::Role;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ServiceError;

/// Verified identity of whoever issued the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: Uuid,
    pub credential_id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), ServiceError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden("administrator role required".into()))
        }
    }

    /// Passes when the caller owns the profile `owner` or is an administrator.
    pub fn require_owner_or_admin(&self, owner: Uuid) -> Result<(), ServiceError> {
        if self.user_id == owner || self.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden("not allowed to access this resource".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(role: Role) -> Caller {
        Caller {
            user_id: Uuid::new_v4(),
            credential_id: Uuid::new_v4(),
            role,
        }
    }

    #[test]
    fn test_owner_or_admin() {
        let user = caller(Role::User);
        assert!(user.require_owner_or_admin(user.user_id).is_ok());
        assert!(matches!(
            user.require_owner_or_admin(Uuid::new_v4()),
            Err(ServiceError::Forbidden(_))
        ));

        let admin = caller(Role::Admin);
        assert!(admin.require_owner_or_admin(Uuid::new_v4()).is_ok());
        assert!(admin.require_admin().is_ok());
        assert!(user.require_admin().is_err());
    }
}
