use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Farcaster identity of the signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Farcaster id
    pub fid: u64,
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub bio: String,
    /// Avatar URL
    #[serde(default)]
    pub pfp_url: String,
    /// Custody address
    #[serde(default)]
    pub custody: String,
    /// Verified addresses linked to the account
    #[serde(default)]
    pub verifications: Vec<String>,
}

/// User record as the backend stores it, returned by `GET /profile`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(rename = "userID")]
    pub user_id: u64,
    pub username: String,
    #[serde(default, rename = "displayname")]
    pub display_name: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub custody_address: String,
    #[serde(default)]
    pub addresses: Vec<String>,
}

impl From<UserRecord> for Profile {
    fn from(user: UserRecord) -> Self {
        Self {
            fid: user.user_id,
            username: user.username,
            display_name: user.display_name,
            bio: user.bio.unwrap_or_default(),
            pfp_url: user.avatar.unwrap_or_default(),
            custody: user.custody_address,
            verifications: user.addresses,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivityCounts {
    pub followers_count: u64,
    pub elections_created: u64,
    pub casted_votes: u64,
    pub participation_achievement: u64,
    pub communities_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Points {
    pub owner_points: u64,
    pub voter_points: u64,
    pub total_points: u64,
}

/// Breakdown behind a reputation score. Every field tolerates being absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReputationData {
    pub activity_counts: ActivityCounts,
    /// Booster name -> whether the user holds it
    pub boosters: BTreeMap<String, bool>,
    pub points: Points,
    pub total_reputation: u32,
}

/// Point-in-time reputation snapshot. Always replaced as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reputation {
    pub reputation: u32,
    pub data: ReputationData,
}

/// Body of `GET /auth/check`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationResponse {
    pub reputation: u32,
    #[serde(default)]
    pub reputation_data: ReputationData,
}

impl From<ReputationResponse> for Reputation {
    fn from(resp: ReputationResponse) -> Self {
        Self {
            reputation: resp.reputation,
            data: resp.reputation_data,
        }
    }
}

/// Body of `GET /profile`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub user: UserRecord,
    pub reputation: u32,
    #[serde(default)]
    pub reputation_data: ReputationData,
}

impl ProfileResponse {
    pub fn into_parts(self) -> (Profile, Reputation) {
        let reputation = Reputation {
            reputation: self.reputation,
            data: self.reputation_data,
        };
        (self.user.into(), reputation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_profile_response_maps_backend_user() {
        let body = json!({
            "user": {
                "userID": 7,
                "username": "alice",
                "displayname": "Alice",
                "custodyAddress": "0xabc",
                "addresses": ["0xdef"],
                "followers": 10
            },
            "reputation": 33,
            "reputationData": {
                "points": { "ownerPoints": 1, "voterPoints": 2, "totalPoints": 3 },
                "boosters": { "hasKIWI": true }
            }
        });

        let resp: ProfileResponse = serde_json::from_value(body).unwrap();
        let (profile, reputation) = resp.into_parts();

        assert_eq!(profile.fid, 7);
        assert_eq!(profile.display_name, "Alice");
        assert_eq!(profile.custody, "0xabc");
        assert_eq!(profile.verifications, vec!["0xdef".to_string()]);
        assert_eq!(profile.bio, "");
        assert_eq!(reputation.reputation, 33);
        assert_eq!(reputation.data.points.total_points, 3);
        assert_eq!(reputation.data.boosters.get("hasKIWI"), Some(&true));
        assert_eq!(reputation.data.activity_counts, ActivityCounts::default());
    }

    #[test]
    fn test_profile_uses_camel_case_on_the_wire() {
        let profile = Profile {
            fid: 1,
            username: "bob".to_string(),
            display_name: "Bob".to_string(),
            bio: String::new(),
            pfp_url: "https://example.test/bob.png".to_string(),
            custody: "0x1".to_string(),
            verifications: vec![],
        };

        let value = serde_json::to_value(&profile).unwrap();
        assert_eq!(value["displayName"], "Bob");
        assert_eq!(value["pfpUrl"], "https://example.test/bob.png");
    }
}
