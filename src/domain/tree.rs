//! Nested downline views for display.

use super::{MemberId, MemberStatus, SlotIndex, Tier};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which of the two graphs a tree view follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeType {
    Sponsor,
    Matrix,
}

impl fmt::Display for TreeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeType::Sponsor => f.write_str("sponsor"),
            TreeType::Matrix => f.write_str("matrix"),
        }
    }
}

impl FromStr for TreeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sponsor" => Ok(TreeType::Sponsor),
            "matrix" => Ok(TreeType::Matrix),
            other => Err(format!("unknown tree type: {}", other)),
        }
    }
}

/// One member in a downline view. `level` is relative to the view's root (0).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub member_id: MemberId,
    pub tier: Tier,
    pub status: MemberStatus,
    pub level: u32,
    /// Slot under the parent, matrix views only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<SlotIndex>,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Total nodes in this subtree, including self.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }

    /// Highest `level` present in this subtree.
    pub fn max_level(&self) -> u32 {
        let mut max = self.level;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            max = max.max(node.level);
            stack.extend(node.children.iter());
        }
        max
    }

    pub fn find(&self, member_id: &MemberId) -> Option<&TreeNode> {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if &node.member_id == member_id {
                return Some(node);
            }
            stack.extend(node.children.iter());
        }
        None
    }
}
