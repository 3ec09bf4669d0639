//! Point-in-time view of an organization's quotas.

use serde::{Deserialize, Serialize};

use crate::models::organization::{Organization, Resource};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuotaEntry {
    pub resource: Resource,
    pub limit: u64,
    pub current: u64,
}

impl QuotaEntry {
    /// Room for at least one more unit (`current < limit`).
    pub fn has_room(&self) -> bool {
        self.current < self.limit
    }

    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.current)
    }

    /// Usage above the limit. Possible when an administrator lowers a
    /// limit, or when two writers race past the same check.
    pub fn is_violated(&self) -> bool {
        self.current > self.limit
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuotaSnapshot {
    entries: Vec<QuotaEntry>,
}

impl QuotaSnapshot {
    pub fn of(organization: &Organization) -> Self {
        let entries = Resource::ALL
            .into_iter()
            .map(|resource| QuotaEntry {
                resource,
                limit: organization.limits.get(resource),
                current: organization.usage.get(resource),
            })
            .collect();
        Self { entries }
    }

    /// The entry for `resource`. A snapshot missing it (one deserialized
    /// from elsewhere) reports a zero limit, so it never shows room.
    pub fn entry(&self, resource: Resource) -> QuotaEntry {
        self.entries
            .iter()
            .find(|e| e.resource == resource)
            .copied()
            .unwrap_or(QuotaEntry {
                resource,
                limit: 0,
                current: 0,
            })
    }

    pub fn entries(&self) -> &[QuotaEntry] {
        &self.entries
    }

    pub fn violations(&self) -> impl Iterator<Item = &QuotaEntry> + '_ {
        self.entries.iter().filter(|e| e.is_violated())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_lookup_is_by_resource_not_position() {
        let snapshot: QuotaSnapshot = serde_json::from_value(serde_json::json!({
            "entries": [
                {"resource": "Claims", "limit": 50, "current": 7}
            ]
        }))
        .unwrap();

        let claims = snapshot.entry(Resource::Claims);
        assert_eq!((claims.limit, claims.current), (50, 7));

        let users = snapshot.entry(Resource::Users);
        assert_eq!(users.resource, Resource::Users);
        assert!(!users.has_room());
    }

    #[test]
    fn room_and_violation_boundaries() {
        let entry = |limit, current| QuotaEntry {
            resource: Resource::Users,
            limit,
            current,
        };
        assert!(entry(5, 4).has_room());
        assert!(!entry(5, 5).has_room());
        assert!(!entry(0, 0).has_room());
        assert!(entry(3, 5).is_violated());
        assert_eq!(entry(3, 5).remaining(), 0);
    }
}
