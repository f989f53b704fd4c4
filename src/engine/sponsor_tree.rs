//! Read model over the referrer relation.

use crate::domain::MemberId;
use crate::store::{NetworkStore, StoreError};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::warn;

/// An ancestor found while walking up from a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ancestor {
    pub member_id: MemberId,
    /// Hops from the starting member (immediate sponsor = 1).
    pub level: u32,
}

/// Walks the sponsor forest (unbounded fan-out) through the store.
#[derive(Clone)]
pub struct SponsorTree {
    store: Arc<dyn NetworkStore>,
}

impl SponsorTree {
    pub fn new(store: Arc<dyn NetworkStore>) -> Self {
        Self { store }
    }

    /// Up to `max_level` ancestors of `member_id`, nearest first.
    ///
    /// Stops early at a network root. A cycle in stored sponsor data ends the walk.
    pub async fn ancestors(
        &self,
        member_id: &MemberId,
        max_level: u32,
    ) -> Result<Vec<Ancestor>, StoreError> {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([member_id.clone()]);
        let mut current = member_id.clone();

        for level in 1..=max_level {
            let Some(sponsor) = self.store.get_sponsor(&current).await? else {
                break;
            };
            if !seen.insert(sponsor.clone()) {
                warn!(
                    member = %member_id,
                    sponsor = %sponsor,
                    "Sponsor cycle detected, stopping walk"
                );
                break;
            }
            chain.push(Ancestor {
                member_id: sponsor.clone(),
                level,
            });
            current = sponsor;
        }

        Ok(chain)
    }

    /// Descendants grouped by depth: `result[0]` holds direct referrals, `result[d - 1]`
    /// the members `d` hops down. At most `max_depth` groups; trailing empty levels are
    /// dropped. Within a level, members keep their parents' order followed by
    /// `(created_at, id)`.
    pub async fn descendants_by_level(
        &self,
        member_id: &MemberId,
        max_depth: u32,
    ) -> Result<Vec<Vec<MemberId>>, StoreError> {
        let mut levels: Vec<Vec<MemberId>> = Vec::new();
        let mut seen = HashSet::from([member_id.clone()]);
        let mut queue: VecDeque<(MemberId, u32)> = VecDeque::from([(member_id.clone(), 0)]);

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for child in self.store.get_direct_referrals(&current).await? {
                if !seen.insert(child.clone()) {
                    continue;
                }
                let child_depth = depth + 1;
                if levels.len() < child_depth as usize {
                    levels.push(Vec::new());
                }
                levels[child_depth as usize - 1].push(child.clone());
                queue.push_back((child, child_depth));
            }
        }

        Ok(levels)
    }
}
