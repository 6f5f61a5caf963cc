use uuid::Uuid;

use crate::{
    model::error::{DatabaseError, DatabaseResult},
    web::{AuthenticatedUser, UserRole},
};

/// Rows that belong to a single learner.
pub trait HasOwner {
    fn owner_id(&self) -> Uuid;
}

/// Learners reach only their own rows. Admins reach every row; instructors
/// go through the review routes instead.
pub fn check_access<T: HasOwner>(actor: &AuthenticatedUser, row: &T) -> DatabaseResult<()> {
    if actor.user_role() == UserRole::Admin || row.owner_id() == actor.user_id() {
        Ok(())
    } else {
        Err(DatabaseError::Forbidden)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct Owned(Uuid);

    impl HasOwner for Owned {
        fn owner_id(&self) -> Uuid {
            self.0
        }
    }

    #[test]
    fn owner_and_admin_pass() {
        let owner = Uuid::new_v4();
        let row = Owned(owner);

        assert!(check_access(&AuthenticatedUser::new(owner, UserRole::User), &row).is_ok());
        assert!(check_access(&AuthenticatedUser::admin(), &row).is_ok());
        assert!(matches!(
            check_access(&AuthenticatedUser::new(Uuid::new_v4(), UserRole::Instructor), &row),
            Err(DatabaseError::Forbidden)
        ));
    }
}
