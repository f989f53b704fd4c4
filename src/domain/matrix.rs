//! Matrix placement positions.

use super::{MemberId, TimeMs};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed fan-out of the placement matrix.
pub const MATRIX_WIDTH: u8 = 3;

/// Store-assigned identifier of a matrix position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(pub i64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Slot under a parent position, always in `0..MATRIX_WIDTH`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SlotIndex(u8);

impl SlotIndex {
    pub fn new(index: u8) -> Option<Self> {
        (index < MATRIX_WIDTH).then_some(SlotIndex(index))
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    /// All slots in ascending order.
    pub fn all() -> impl Iterator<Item = SlotIndex> {
        (0..MATRIX_WIDTH).map(SlotIndex)
    }

    fn bit(&self) -> u8 {
        1 << self.0
    }
}

impl TryFrom<u8> for SlotIndex {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        SlotIndex::new(value).ok_or_else(|| format!("slot index {} out of range", value))
    }
}

impl From<SlotIndex> for u8 {
    fn from(value: SlotIndex) -> Self {
        value.0
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bitmap of occupied child slots (bit `i` set = slot `i` filled).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SlotMask(u8);

impl SlotMask {
    const FULL: u8 = (1 << MATRIX_WIDTH) - 1;

    pub fn empty() -> Self {
        SlotMask(0)
    }

    pub fn from_bits(bits: u8) -> Option<Self> {
        (bits & !Self::FULL == 0).then_some(SlotMask(bits))
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn is_occupied(&self, slot: SlotIndex) -> bool {
        self.0 & slot.bit() != 0
    }

    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }

    /// Lowest slot not yet filled.
    pub fn first_open(&self) -> Option<SlotIndex> {
        SlotIndex::all().find(|slot| !self.is_occupied(*slot))
    }

    #[must_use]
    pub fn with(&self, slot: SlotIndex) -> Self {
        SlotMask(self.0 | slot.bit())
    }
}

impl TryFrom<u8> for SlotMask {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        SlotMask::from_bits(value).ok_or_else(|| format!("slot mask {:#b} out of range", value))
    }
}

impl From<SlotMask> for u8 {
    fn from(value: SlotMask) -> Self {
        value.0
    }
}

/// A member's seat in the 3-wide placement matrix.
///
/// A root position has level 0 and neither parent nor slot; every other position
/// sits in exactly one slot of its parent. Positions are never deleted, only deactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixPosition {
    pub id: PositionId,
    pub member_id: MemberId,
    pub parent_id: Option<PositionId>,
    /// Member holding the parent position (matrix sponsor, may differ from the referrer).
    pub parent_member: Option<MemberId>,
    pub level: u32,
    pub slot: Option<SlotIndex>,
    pub occupied: SlotMask,
    pub active: bool,
    pub placed_at: TimeMs,
}

/// Parent link of a non-root position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentLink {
    pub position: PositionId,
    pub member: MemberId,
    pub slot: SlotIndex,
}

impl MatrixPosition {
    /// Build a root position.
    pub fn root(id: PositionId, member_id: MemberId, placed_at: TimeMs) -> Self {
        MatrixPosition {
            id,
            member_id,
            parent_id: None,
            parent_member: None,
            level: 0,
            slot: None,
            occupied: SlotMask::empty(),
            active: true,
            placed_at,
        }
    }

    /// Rebuild a position from stored fields, checking that root-ness and level agree.
    pub fn from_parts(
        id: PositionId,
        member_id: MemberId,
        parent: Option<ParentLink>,
        level: u32,
        occupied: SlotMask,
        active: bool,
        placed_at: TimeMs,
    ) -> Result<Self, String> {
        match (&parent, level) {
            (None, 0) | (Some(_), 1..) => {}
            (None, _) => return Err(format!("root position {} must have level 0", id)),
            (Some(_), 0) => return Err(format!("child position {} cannot have level 0", id)),
        }
        let (parent_id, parent_member, slot) = match parent {
            Some(link) => (Some(link.position), Some(link.member), Some(link.slot)),
            None => (None, None, None),
        };
        Ok(MatrixPosition {
            id,
            member_id,
            parent_id,
            parent_member,
            level,
            slot,
            occupied,
            active,
            placed_at,
        })
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(i: u8) -> SlotIndex {
        SlotIndex::new(i).unwrap()
    }

    #[test]
    fn test_slot_index_bounds() {
        assert!(SlotIndex::new(2).is_some());
        assert!(SlotIndex::new(3).is_none());
    }

    #[test]
    fn test_first_open_is_lowest_unused() {
        let mask = SlotMask::empty().with(slot(0)).with(slot(2));
        assert_eq!(mask.first_open(), Some(slot(1)));
        assert_eq!(mask.count(), 2);
    }

    #[test]
    fn test_full_mask_has_no_open_slot() {
        let mask = SlotMask::empty().with(slot(0)).with(slot(1)).with(slot(2));
        assert_eq!(mask.count(), 3);
        assert_eq!(mask.first_open(), None);
    }

    #[test]
    fn test_mask_rejects_bits_past_width() {
        assert!(SlotMask::from_bits(0b1000).is_none());
        assert!(SlotMask::from_bits(0b111).is_some());
    }

    #[test]
    fn test_from_parts_checks_level_against_parent() {
        let root = MatrixPosition::from_parts(
            PositionId(1),
            MemberId::new("a"),
            None,
            2,
            SlotMask::empty(),
            true,
            TimeMs::new(0),
        );
        assert!(root.is_err());

        let child = MatrixPosition::from_parts(
            PositionId(2),
            MemberId::new("b"),
            Some(ParentLink {
                position: PositionId(1),
                member: MemberId::new("a"),
                slot: slot(1),
            }),
            1,
            SlotMask::empty(),
            true,
            TimeMs::new(0),
        )
        .unwrap();
        assert_eq!(child.slot, Some(slot(1)));
        assert!(!child.is_root());
    }

    #[test]
    fn test_slot_deserialization_rejects_out_of_range() {
        assert!(serde_json::from_str::<SlotIndex>("3").is_err());
        assert_eq!(serde_json::from_str::<SlotIndex>("1").unwrap(), slot(1));
    }
}
