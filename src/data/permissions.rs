use async_trait::async_trait;

use super::DataError;

/// Grants tenant administration.
pub const PERMISSION_ADMIN_WRITE: &str = "admin:write";

/// Permission codes held by one user.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Permissions(pub Vec<String>);

impl Permissions {
    #[must_use]
    pub fn includes(&self, code: &str) -> bool {
        self.0.iter().any(|held| held == code)
    }
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn get_all_for_user(&self, user_id: i64) -> Result<Permissions, DataError>;

    /// Grant `codes` to `user_id`. Granting a code twice is a no-op.
    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> Result<(), DataError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn includes_matches_exact_code() {
        let permissions = Permissions(vec!["admin:read".to_string()]);
        assert!(permissions.includes("admin:read"));
        assert!(!permissions.includes(PERMISSION_ADMIN_WRITE));
        assert!(!Permissions::default().includes("admin"));
    }
}
