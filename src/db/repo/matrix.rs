//! Matrix position reads and atomic slot claims.

use crate::domain::{
    MatrixPosition, MemberId, ParentLink, PositionId, SlotIndex, SlotMask, TimeMs,
};
use crate::store::StoreError;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;

use super::{conflict_on_unique, Repository};

const POSITION_COLUMNS: &str = r#"
    SELECT p.id, p.member_id, p.parent_position_id, p.level, p.slot_index,
           p.occupied_mask, p.active, p.placed_at, pp.member_id AS parent_member_id
    FROM matrix_positions p
    LEFT JOIN matrix_positions pp ON pp.id = p.parent_position_id
"#;

impl Repository {
    /// Active matrix position held by a member.
    ///
    /// # Errors
    /// Returns an error if the query fails or the row cannot be decoded.
    pub async fn get_matrix_position(
        &self,
        member_id: &MemberId,
    ) -> Result<Option<MatrixPosition>, StoreError> {
        let sql = format!("{} WHERE p.member_id = ? AND p.active = 1", POSITION_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(member_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(position_from_row).transpose()
    }

    /// Active children of a position in slot order.
    pub async fn get_children(
        &self,
        position_id: PositionId,
    ) -> Result<Vec<MatrixPosition>, StoreError> {
        let sql = format!(
            "{} WHERE p.parent_position_id = ? AND p.active = 1 ORDER BY p.slot_index ASC",
            POSITION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(position_id.0)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(position_from_row).collect()
    }

    /// Create a level-0 position for a member without one.
    ///
    /// # Errors
    /// Returns `AlreadyPlaced` if the member already holds an active position.
    pub async fn create_root_position(
        &self,
        member_id: &MemberId,
        at: TimeMs,
    ) -> Result<MatrixPosition, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO matrix_positions (member_id, parent_position_id, level, slot_index, occupied_mask, active, placed_at)
            VALUES (?, NULL, 0, NULL, 0, 1, ?)
            "#,
        )
        .bind(member_id.as_str())
        .bind(at.as_ms())
        .execute(&self.pool)
        .await
        .map_err(|e| match conflict_on_unique(e, String::new()) {
            StoreError::Conflict(_) => StoreError::AlreadyPlaced(member_id.clone()),
            other => other,
        })?;

        Ok(MatrixPosition::root(
            PositionId(result.last_insert_rowid()),
            member_id.clone(),
            at,
        ))
    }

    /// Fill `slot` under `parent` in a single transaction.
    ///
    /// The parent's bitmap is updated first and only if the slot bit is clear, so the
    /// transaction holds the write lock before anything is read and a second claimer
    /// of the same slot either waits behind it or sees the bit already set.
    ///
    /// # Errors
    /// - `Conflict` if the slot is already taken
    /// - `AlreadyPlaced` if `new_member` holds an active position
    /// - `NotFound` if the parent does not exist or is inactive
    pub async fn claim_slot(
        &self,
        parent: PositionId,
        slot: SlotIndex,
        new_member: &MemberId,
        at: TimeMs,
    ) -> Result<MatrixPosition, StoreError> {
        let bit = i64::from(1u8 << slot.get());
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE matrix_positions
            SET occupied_mask = occupied_mask | ?
            WHERE id = ? AND active = 1 AND (occupied_mask & ?) = 0
            "#,
        )
        .bind(bit)
        .bind(parent.0)
        .bind(bit)
        .execute(&mut *tx)
        .await?;

        let parent_row = sqlx::query(
            "SELECT member_id, level FROM matrix_positions WHERE id = ? AND active = 1",
        )
        .bind(parent.0)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(parent_row) = parent_row else {
            tx.rollback().await?;
            return Err(StoreError::NotFound(format!("position {}", parent)));
        };
        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::Conflict(format!(
                "slot {} under position {} is already occupied",
                slot, parent
            )));
        }

        let already_placed =
            sqlx::query("SELECT id FROM matrix_positions WHERE member_id = ? AND active = 1")
                .bind(new_member.as_str())
                .fetch_optional(&mut *tx)
                .await?;
        if already_placed.is_some() {
            tx.rollback().await?;
            return Err(StoreError::AlreadyPlaced(new_member.clone()));
        }

        let parent_member = MemberId::new(parent_row.get::<String, _>("member_id"));
        let level = u32::try_from(parent_row.get::<i64, _>("level"))
            .map_err(|_| StoreError::Corrupt(format!("position {} has negative level", parent)))?
            + 1;

        let inserted = sqlx::query(
            r#"
            INSERT INTO matrix_positions (member_id, parent_position_id, level, slot_index, occupied_mask, active, placed_at)
            VALUES (?, ?, ?, ?, 0, 1, ?)
            "#,
        )
        .bind(new_member.as_str())
        .bind(parent.0)
        .bind(i64::from(level))
        .bind(i64::from(slot.get()))
        .bind(at.as_ms())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            conflict_on_unique(
                e,
                format!("slot {} under position {} was claimed concurrently", slot, parent),
            )
        })?;

        tx.commit().await?;

        debug!(parent = %parent, slot = %slot, member = %new_member, level, "Slot claimed");

        MatrixPosition::from_parts(
            PositionId(inserted.last_insert_rowid()),
            new_member.clone(),
            Some(ParentLink {
                position: parent,
                member: parent_member,
                slot,
            }),
            level,
            SlotMask::empty(),
            true,
            at,
        )
        .map_err(StoreError::Corrupt)
    }
}

fn position_from_row(row: &SqliteRow) -> Result<MatrixPosition, StoreError> {
    let id = PositionId(row.get("id"));
    let corrupt = |what: &str| StoreError::Corrupt(format!("position {}: {}", id, what));

    let level = u32::try_from(row.get::<i64, _>("level")).map_err(|_| corrupt("bad level"))?;
    let occupied = u8::try_from(row.get::<i64, _>("occupied_mask"))
        .ok()
        .and_then(SlotMask::from_bits)
        .ok_or_else(|| corrupt("bad occupied mask"))?;

    let parent = match (
        row.get::<Option<i64>, _>("parent_position_id"),
        row.get::<Option<i64>, _>("slot_index"),
        row.get::<Option<String>, _>("parent_member_id"),
    ) {
        (None, None, _) => None,
        (Some(parent_id), Some(slot), Some(parent_member)) => {
            let slot = u8::try_from(slot)
                .ok()
                .and_then(SlotIndex::new)
                .ok_or_else(|| corrupt("bad slot index"))?;
            Some(ParentLink {
                position: PositionId(parent_id),
                member: MemberId::new(parent_member),
                slot,
            })
        }
        _ => return Err(corrupt("parent and slot must be set together")),
    };

    MatrixPosition::from_parts(
        id,
        MemberId::new(row.get::<String, _>("member_id")),
        parent,
        level,
        occupied,
        row.get::<i64, _>("active") != 0,
        TimeMs::new(row.get("placed_at")),
    )
    .map_err(StoreError::Corrupt)
}
