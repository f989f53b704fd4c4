//! Nested downline views over either tree.
//!
//! Both builders fill a flat arena breadth-first and assemble the nested [`TreeNode`]
//! bottom-up, so neither the walk nor the assembly recurses.

use super::{EngineError, MatrixTree};
use crate::domain::{Member, MemberId, PositionId, SlotIndex, TreeNode, TreeType};
use crate::store::NetworkStore;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

struct ArenaNode {
    member: Member,
    level: u32,
    slot: Option<SlotIndex>,
    position: Option<PositionId>,
    children: Vec<usize>,
}

impl ArenaNode {
    fn new(member: Member, level: u32) -> Self {
        ArenaNode {
            member,
            level,
            slot: None,
            position: None,
            children: Vec::new(),
        }
    }
}

/// Builds read-only downline trees for display.
///
/// Nodes down to `max_level` are expanded; their children one level further are still
/// listed, with empty `children`.
#[derive(Clone)]
pub struct TreeReportBuilder {
    store: Arc<dyn NetworkStore>,
    matrix: MatrixTree,
}

impl TreeReportBuilder {
    pub fn new(store: Arc<dyn NetworkStore>) -> Self {
        Self {
            matrix: MatrixTree::new(store.clone()),
            store,
        }
    }

    pub async fn build(
        &self,
        member_id: &MemberId,
        max_level: u32,
        tree_type: TreeType,
    ) -> Result<TreeNode, EngineError> {
        match tree_type {
            TreeType::Sponsor => self.build_sponsor_tree(member_id, max_level).await,
            TreeType::Matrix => self.build_matrix_tree(member_id, max_level).await,
        }
    }

    pub async fn build_sponsor_tree(
        &self,
        member_id: &MemberId,
        max_level: u32,
    ) -> Result<TreeNode, EngineError> {
        let root = self.require_member(member_id).await?;
        let mut arena = vec![ArenaNode::new(root, 0)];
        let mut seen = HashSet::from([member_id.clone()]);
        let mut queue = VecDeque::from([0usize]);

        while let Some(idx) = queue.pop_front() {
            let level = arena[idx].level;
            if level > max_level {
                continue;
            }
            let referrals = self
                .store
                .get_direct_referrals(&arena[idx].member.id)
                .await?;
            for child_id in referrals {
                if !seen.insert(child_id.clone()) {
                    continue;
                }
                let Some(child) = self.store.get_member(&child_id).await? else {
                    warn!(member = %child_id, "Referral without member record, omitted from tree");
                    continue;
                };
                let child_idx = arena.len();
                arena.push(ArenaNode::new(child, level + 1));
                arena[idx].children.push(child_idx);
                queue.push_back(child_idx);
            }
        }

        debug!(member = %member_id, nodes = arena.len(), "Sponsor tree built");
        assemble(arena, member_id)
    }

    /// Matrix downline of `member_id`. An unplaced member yields a single leaf.
    pub async fn build_matrix_tree(
        &self,
        member_id: &MemberId,
        max_level: u32,
    ) -> Result<TreeNode, EngineError> {
        let root = self.require_member(member_id).await?;
        let Some(root_position) = self.matrix.position(member_id).await? else {
            return assemble(vec![ArenaNode::new(root, 0)], member_id);
        };

        let mut root_node = ArenaNode::new(root, 0);
        root_node.position = Some(root_position.id);
        let mut arena = vec![root_node];
        let mut queue = VecDeque::from([0usize]);

        while let Some(idx) = queue.pop_front() {
            let (level, Some(position)) = (arena[idx].level, arena[idx].position) else {
                continue;
            };
            if level > max_level {
                continue;
            }
            for child in self.matrix.children(position).await? {
                let Some(member) = self.store.get_member(&child.member_id).await? else {
                    warn!(
                        member = %child.member_id,
                        position = %child.id,
                        "Position without member record, omitted from tree"
                    );
                    continue;
                };
                let child_idx = arena.len();
                arena.push(ArenaNode {
                    member,
                    level: level + 1,
                    slot: child.slot,
                    position: Some(child.id),
                    children: Vec::new(),
                });
                arena[idx].children.push(child_idx);
                queue.push_back(child_idx);
            }
        }

        debug!(member = %member_id, nodes = arena.len(), "Matrix tree built");
        assemble(arena, member_id)
    }

    async fn require_member(&self, id: &MemberId) -> Result<Member, EngineError> {
        self.store
            .get_member(id)
            .await?
            .ok_or_else(|| EngineError::MemberNotFound(id.clone()))
    }
}

/// Children always sit after their parent in the arena, so a reverse pass sees every
/// child finished before its parent.
fn assemble(arena: Vec<ArenaNode>, root: &MemberId) -> Result<TreeNode, EngineError> {
    let mut built: Vec<Option<TreeNode>> = Vec::with_capacity(arena.len());
    built.resize_with(arena.len(), || None);

    for (idx, node) in arena.into_iter().enumerate().rev() {
        let children = node
            .children
            .iter()
            .filter_map(|child| built[*child].take())
            .collect();
        built[idx] = Some(TreeNode {
            member_id: node.member.id,
            tier: node.member.tier,
            status: node.member.status,
            level: node.level,
            slot: node.slot,
            children,
        });
    }

    built
        .first_mut()
        .and_then(Option::take)
        .ok_or_else(|| EngineError::MemberNotFound(root.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Tier;
    use crate::engine::testing::{join, member_id};
    use crate::engine::PlacementEngine;
    use crate::store::InMemoryNetworkStore;

    /// root -> a -> b -> c -> d, plus root -> e
    async fn sponsor_chain() -> Arc<InMemoryNetworkStore> {
        let store = Arc::new(InMemoryNetworkStore::new());
        join(&store, "root", None, Tier::Elite, 0).await;
        join(&store, "a", Some("root"), Tier::Starter, 1).await;
        join(&store, "e", Some("root"), Tier::Builder, 2).await;
        join(&store, "b", Some("a"), Tier::Starter, 3).await;
        join(&store, "c", Some("b"), Tier::Starter, 4).await;
        join(&store, "d", Some("c"), Tier::Starter, 5).await;
        store
    }

    #[tokio::test]
    async fn test_sponsor_tree_lists_one_level_past_max() {
        let store = sponsor_chain().await;
        let builder = TreeReportBuilder::new(store);

        let tree = builder.build_sponsor_tree(&member_id("root"), 1).await.unwrap();
        assert_eq!(tree.level, 0);
        assert_eq!(tree.tier, Tier::Elite);
        let names: Vec<_> = tree.children.iter().map(|c| c.member_id.as_str()).collect();
        assert_eq!(names, vec!["a", "e"]);

        let b = tree.find(&member_id("b")).unwrap();
        assert_eq!(b.level, 2);
        assert!(b.children.is_empty());
        assert!(tree.find(&member_id("c")).is_none());
        assert_eq!(tree.max_level(), 2);
    }

    #[tokio::test]
    async fn test_zero_max_level_still_lists_direct_children() {
        let store = sponsor_chain().await;
        let builder = TreeReportBuilder::new(store);

        let tree = builder.build_sponsor_tree(&member_id("root"), 0).await.unwrap();
        assert_eq!(tree.children.len(), 2);
        assert!(tree.children.iter().all(|c| c.children.is_empty()));
        assert_eq!(tree.node_count(), 3);
    }

    #[tokio::test]
    async fn test_matrix_tree_follows_placement_not_sponsorship() {
        let store = Arc::new(InMemoryNetworkStore::new());
        join(&store, "s", None, Tier::Leader, 0).await;
        let placement = PlacementEngine::new(store.clone());
        for i in 0..4 {
            let id = format!("r{}", i);
            join(&store, &id, Some("s"), Tier::Starter, i + 1).await;
            placement.place(&member_id(&id), &member_id("s"), 5).await.unwrap();
        }
        let builder = TreeReportBuilder::new(store);

        let tree = builder.build(&member_id("s"), 5, TreeType::Matrix).await.unwrap();
        assert_eq!(tree.children.len(), 3);
        let spilled = tree.find(&member_id("r3")).unwrap();
        assert_eq!(spilled.level, 2);
        assert_eq!(spilled.slot, SlotIndex::new(0));
        assert_eq!(tree.children[0].children[0].member_id, member_id("r3"));

        let sponsor_view = builder.build(&member_id("s"), 5, TreeType::Sponsor).await.unwrap();
        assert_eq!(sponsor_view.children.len(), 4);
        assert!(sponsor_view.children.iter().all(|c| c.slot.is_none()));
    }

    #[tokio::test]
    async fn test_unplaced_member_matrix_tree_is_a_leaf() {
        let store = sponsor_chain().await;
        let builder = TreeReportBuilder::new(store);

        let tree = builder.build_matrix_tree(&member_id("a"), 5).await.unwrap();
        assert_eq!(tree.member_id, member_id("a"));
        assert!(tree.children.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_member() {
        let store = Arc::new(InMemoryNetworkStore::new());
        let builder = TreeReportBuilder::new(store);

        let result = builder.build_sponsor_tree(&member_id("ghost"), 3).await;
        assert!(matches!(result, Err(EngineError::MemberNotFound(_))));
    }
}
