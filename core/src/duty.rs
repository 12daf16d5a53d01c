//! On-call duty resolution (§4.9): staff roster lookup by time-sliced
//! rotation, grounded on the index formula and priority-ordered roster scan
//! of the original duty manager.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Staff {
    pub id: String,
    pub name: String,
    pub phone: String,
}

/// A rotation window: positions rotate through `[begin, end)` in steps of
/// `unit`, starting at `start_idx` (1-based, matching the original). Each
/// position is itself a group of staff ids — everyone in the group is
/// concurrently on-call at that position (§4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Roster {
    pub id: String,
    pub priority: i64,
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub unit_seconds: i64,
    pub start_idx: i64,
    pub staff_ids: Vec<Vec<String>>,
}

#[async_trait]
pub trait DutyStore: Send + Sync {
    async fn create_staff(&self, staff: Staff) -> Result<()>;
    async fn update_staff(&self, staff: &Staff) -> Result<()>;
    async fn remove_staff(&self, id: &str) -> Result<()>;
    async fn get_staff(&self, id: &str) -> Result<Staff>;
    async fn list_staffs(&self) -> Result<Vec<Staff>>;

    async fn create_roster(&self, roster: Roster) -> Result<()>;
    async fn update_roster(&self, roster: &Roster) -> Result<()>;
    async fn remove_roster(&self, id: &str) -> Result<()>;
    async fn get_roster(&self, id: &str) -> Result<Roster>;
    /// Ascending by `priority`; the first roster whose `[begin, end)`
    /// contains `now` wins (§4.9).
    async fn list_rosters(&self) -> Result<Vec<Roster>>;
}

/// `(floor((now-begin)/unit) + start_idx - 1) mod len(staffs)` — the
/// rotation index formula from the original, unchanged.
pub fn rotation_index(staff_count: i64, start_idx: i64, unit_seconds: i64, now: DateTime<Utc>, begin: DateTime<Utc>) -> Option<i64> {
    if staff_count <= 0 || unit_seconds <= 0 {
        return None;
    }
    let elapsed = (now - begin).num_seconds();
    let unit_elapsed = elapsed.div_euclid(unit_seconds);
    Some((unit_elapsed.rem_euclid(staff_count) + start_idx - 1).rem_euclid(staff_count))
}

/// Resolve the current on-call staff. Rosters are scanned in ascending
/// `priority` order (as returned by `list_rosters`); the first whose
/// `[begin, end)` window contains `now` is used. The resolved position can
/// name more than one staff id, all of whom are paged.
pub async fn get_current(store: &dyn DutyStore, now: DateTime<Utc>) -> Result<Vec<Staff>> {
    let rosters = store.list_rosters().await?;
    for roster in &rosters {
        if now < roster.begin || now >= roster.end {
            continue;
        }
        if roster.staff_ids.is_empty() {
            continue;
        }
        let Some(idx) = rotation_index(
            roster.staff_ids.len() as i64,
            roster.start_idx,
            roster.unit_seconds,
            now,
            roster.begin,
        ) else {
            continue;
        };
        let group = &roster.staff_ids[idx as usize];
        if group.is_empty() {
            continue;
        }
        let mut staffs = Vec::with_capacity(group.len());
        for staff_id in group {
            staffs.push(store.get_staff(staff_id).await?);
        }
        return Ok(staffs);
    }
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;

    #[test]
    fn rotation_index_matches_original_formula() {
        let begin = Utc::now() - Duration::days(10);
        let now = begin + Duration::hours(25);

        // unit = 1 day, 4 staffs, start_idx = 1: one full day elapsed plus
        // change -> unit_elapsed = 1 -> idx = (1 + 1 - 1) % 4 = 1.
        let idx = rotation_index(4, 1, 86_400, now, begin).unwrap();
        assert_eq!(idx, 1);
    }

    #[test]
    fn rotation_index_wraps_with_nonzero_start() {
        let begin = Utc::now();
        let now = begin + Duration::days(3);

        // unit = 1 day, 3 staffs, start_idx = 2: unit_elapsed = 3 ->
        // (3 % 3 + 2 - 1) % 3 = (0 + 1) % 3 = 1.
        let idx = rotation_index(3, 2, 86_400, now, begin).unwrap();
        assert_eq!(idx, 1);
    }

    #[test]
    fn zero_staff_count_has_no_index() {
        assert_eq!(rotation_index(0, 1, 86_400, Utc::now(), Utc::now()), None);
    }

    struct FakeStore {
        staffs: Vec<Staff>,
        roster: Roster,
    }

    #[async_trait]
    impl DutyStore for FakeStore {
        async fn create_staff(&self, _staff: Staff) -> Result<()> {
            unreachable!()
        }
        async fn update_staff(&self, _staff: &Staff) -> Result<()> {
            unreachable!()
        }
        async fn remove_staff(&self, _id: &str) -> Result<()> {
            unreachable!()
        }
        async fn get_staff(&self, id: &str) -> Result<Staff> {
            self.staffs
                .iter()
                .find(|s| s.id == id)
                .cloned()
                .ok_or_else(|| crate::error::AlertError::NotFound(id.to_string()))
        }
        async fn list_staffs(&self) -> Result<Vec<Staff>> {
            Ok(self.staffs.clone())
        }
        async fn create_roster(&self, _roster: Roster) -> Result<()> {
            unreachable!()
        }
        async fn update_roster(&self, _roster: &Roster) -> Result<()> {
            unreachable!()
        }
        async fn remove_roster(&self, _id: &str) -> Result<()> {
            unreachable!()
        }
        async fn get_roster(&self, _id: &str) -> Result<Roster> {
            unreachable!()
        }
        async fn list_rosters(&self) -> Result<Vec<Roster>> {
            Ok(vec![self.roster.clone()])
        }
    }

    #[tokio::test]
    async fn current_position_can_resolve_to_multiple_staff() {
        let now = Utc::now();
        let store = FakeStore {
            staffs: vec![
                Staff { id: "s1".to_string(), name: "alice".to_string(), phone: "1".to_string() },
                Staff { id: "s2".to_string(), name: "bob".to_string(), phone: "2".to_string() },
            ],
            roster: Roster {
                id: "r1".to_string(),
                priority: 0,
                begin: now - Duration::days(1),
                end: now + Duration::days(1),
                unit_seconds: 86_400,
                start_idx: 1,
                // a single rotation position holding two concurrently
                // on-call staff.
                staff_ids: vec![vec!["s1".to_string(), "s2".to_string()]],
            },
        };

        let staffs = get_current(&store, now).await.unwrap();
        assert_eq!(staffs.len(), 2);
        assert_eq!(staffs[0].id, "s1");
        assert_eq!(staffs[1].id, "s2");
    }
}
