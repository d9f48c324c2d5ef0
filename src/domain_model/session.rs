use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(pub String);

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefreshToken(pub String);

// Tokens are credentials; keep them out of `{:?}` output and therefore out of logs.
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

impl fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RefreshToken(***)")
    }
}

/// Opaque handle the proxy hands to the browser in place of upstream tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        SessionId(nanoid::nanoid!(32))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionFailure {
    RefreshFailed,
    Revoked,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: Option<String>,
    pub mobile: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub user_name: String,
    pub email: Option<String>,
}

/// Token pair returned by a successful login.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    pub profile: UserProfile,
}

/// Result of a refresh call. The backend may or may not rotate the refresh token.
#[derive(Debug, Clone)]
pub struct RefreshedTokens {
    pub access_token: AccessToken,
    pub refresh_token: Option<RefreshToken>,
}

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    pub access_token_expires: DateTime<Utc>,
    pub error: Option<SessionFailure>,
    pub profile: UserProfile,
}

impl SessionRecord {
    pub fn issue(tokens: IssuedTokens, now: DateTime<Utc>, access_ttl: Duration) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            access_token_expires: now + access_ttl,
            error: None,
            profile: tokens.profile,
        }
    }

    pub fn install(&mut self, refreshed: RefreshedTokens, now: DateTime<Utc>, access_ttl: Duration) {
        self.access_token = refreshed.access_token;
        if let Some(refresh_token) = refreshed.refresh_token {
            self.refresh_token = refresh_token;
        }
        self.access_token_expires = now + access_ttl;
    }

    pub fn time_left(&self, now: DateTime<Utc>) -> Duration {
        self.access_token_expires - now
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.error.is_none() && self.time_left(now) > threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Fresh,
    NeedsRefresh,
    Refreshing,
    Invalid,
    SignedOut,
}

impl SessionState {
    pub fn is_usable(self) -> bool {
        matches!(
            self,
            SessionState::Fresh | SessionState::NeedsRefresh | SessionState::Refreshing
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> IssuedTokens {
        IssuedTokens {
            access_token: AccessToken("a1".into()),
            refresh_token: RefreshToken("r1".into()),
            profile: UserProfile::default(),
        }
    }

    #[test]
    fn freshness_uses_threshold() {
        let now = Utc::now();
        let record = SessionRecord::issue(tokens(), now, Duration::minutes(15));
        assert!(record.is_fresh(now, Duration::minutes(3)));
        assert!(!record.is_fresh(now + Duration::minutes(12), Duration::minutes(3)));
        assert!(!record.is_fresh(now + Duration::minutes(20), Duration::minutes(3)));
    }

    #[test]
    fn install_keeps_refresh_token_and_failure() {
        let now = Utc::now();
        let mut record = SessionRecord::issue(tokens(), now, Duration::minutes(15));
        record.error = Some(SessionFailure::RefreshFailed);
        record.install(
            RefreshedTokens {
                access_token: AccessToken("a2".into()),
                refresh_token: None,
            },
            now,
            Duration::minutes(15),
        );
        assert_eq!(record.access_token, AccessToken("a2".into()));
        assert_eq!(record.refresh_token, RefreshToken("r1".into()));
        assert_eq!(record.error, Some(SessionFailure::RefreshFailed));
        assert!(!record.is_fresh(now, Duration::minutes(3)));
    }

    #[test]
    fn debug_output_hides_tokens() {
        let rendered = format!("{:?}", tokens());
        assert!(!rendered.contains("a1"));
        assert!(!rendered.contains("r1"));
    }
}
