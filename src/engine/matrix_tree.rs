//! Read model over the 3-wide placement matrix.

use crate::domain::{MatrixPosition, MemberId, PositionId, SlotIndex};
use crate::store::{NetworkStore, StoreError};
use std::collections::VecDeque;
use std::sync::Arc;

/// An open slot found by the spillover search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenSlot {
    pub parent: MatrixPosition,
    pub slot: SlotIndex,
    /// Depth of `parent` below the search root (0 = the root itself).
    pub depth: u32,
}

/// Walks the placement forest through the store.
#[derive(Clone)]
pub struct MatrixTree {
    store: Arc<dyn NetworkStore>,
}

impl MatrixTree {
    pub fn new(store: Arc<dyn NetworkStore>) -> Self {
        Self { store }
    }

    pub async fn position(
        &self,
        member_id: &MemberId,
    ) -> Result<Option<MatrixPosition>, StoreError> {
        self.store.get_matrix_position(member_id).await
    }

    pub async fn children(&self, position: PositionId) -> Result<Vec<MatrixPosition>, StoreError> {
        self.store.get_children(position).await
    }

    /// Breadth-first search for the first open slot under `root`.
    ///
    /// The root is checked first, then its descendants level by level down to
    /// `max_depth` levels below it. Within a level, positions are visited in parent
    /// order and then slot order, and the lowest open slot of the first non-full
    /// position wins. The result depends only on the matrix contents.
    pub async fn find_open_slot(
        &self,
        root: &MatrixPosition,
        max_depth: u32,
    ) -> Result<Option<OpenSlot>, StoreError> {
        let mut queue: VecDeque<(MatrixPosition, u32)> = VecDeque::from([(root.clone(), 0)]);

        while let Some((position, depth)) = queue.pop_front() {
            if let Some(slot) = position.occupied.first_open() {
                return Ok(Some(OpenSlot {
                    parent: position,
                    slot,
                    depth,
                }));
            }
            if depth >= max_depth {
                continue;
            }
            for child in self.store.get_children(position.id).await? {
                queue.push_back((child, depth + 1));
            }
        }

        Ok(None)
    }
}
