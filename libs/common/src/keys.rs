//! Storage keys
//!
//! Each persisted record has exactly one owner; the keys are derived from the
//! application name so two apps sharing a store never collide.

/// The persisted-record keys of one application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    /// Session token record, owned by the session manager
    pub token: String,
    /// Refresh credential, owned by the OAuth2 token client
    pub refresh_token: String,
    /// Baseline/working dataset, owned by the bonus data store
    pub dataset: String,
    /// Sheets configuration, owned by the config store
    pub config: String,
}

impl StorageKeys {
    pub fn new(app: &str) -> Self {
        Self {
            token: format!("{app}_google_auth_token"),
            refresh_token: format!("{app}_google_refresh_token"),
            dataset: format!("{app}-bonus-data"),
            config: format!("{app}-config"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_prefixed_and_distinct() {
        let keys = StorageKeys::new("balanciago");
        assert_eq!(keys.token, "balanciago_google_auth_token");
        assert_eq!(keys.dataset, "balanciago-bonus-data");
        assert_eq!(keys.config, "balanciago-config");

        let all = [&keys.token, &keys.refresh_token, &keys.dataset, &keys.config];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
