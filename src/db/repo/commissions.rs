//! Qualifying event and commission operations for the repository.

use crate::domain::{
    Commission, CommissionId, CommissionStatus, EventType, MemberId, NewCommission,
    QualifyingEvent, TimeMs,
};
use crate::store::StoreError;
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{Row, Transaction};
use std::str::FromStr;
use tracing::warn;

use super::{parse_decimal, Repository};

const COMMISSION_COLUMNS: &str = r#"
    SELECT id, earner_id, source_id, level, amount, commission_type, status, earned_at, paid_at
    FROM commissions
"#;

impl Repository {
    /// Append a single pending commission.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn append_commission(
        &self,
        commission: &NewCommission,
    ) -> Result<CommissionId, StoreError> {
        let mut tx = self.pool.begin().await?;
        let id = insert_commission(&mut tx, commission).await?;
        tx.commit().await?;
        Ok(id)
    }

    /// Persist an event and its commissions in one transaction.
    ///
    /// # Errors
    /// Returns an error if any insert fails; nothing is written in that case.
    pub async fn record_qualifying_event(
        &self,
        event: &QualifyingEvent,
        commissions: &[NewCommission],
    ) -> Result<Vec<Commission>, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO qualifying_events (member_id, amount, event_type, occurred_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(event.member_id.as_str())
        .bind(event.amount.to_canonical_string())
        .bind(event.event_type.as_str())
        .bind(event.occurred_at.as_ms())
        .execute(&mut *tx)
        .await?;

        let mut stored = Vec::with_capacity(commissions.len());
        for commission in commissions {
            let id = insert_commission(&mut tx, commission).await?;
            stored.push(commission.clone().into_commission(id));
        }

        tx.commit().await?;
        Ok(stored)
    }

    /// Fetch commissions by id, in id order. Unknown ids are skipped.
    pub async fn get_commissions(
        &self,
        ids: &[CommissionId],
    ) -> Result<Vec<Commission>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "{} WHERE id IN ({}) ORDER BY id ASC",
            COMMISSION_COLUMNS, placeholders
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id.0);
        }
        let rows = query.fetch_all(&self.pool).await?;

        rows.iter().map(commission_from_row).collect()
    }

    /// Commissions earned by a member, oldest first, optionally filtered by status.
    pub async fn list_commissions(
        &self,
        earner: &MemberId,
        status: Option<CommissionStatus>,
    ) -> Result<Vec<Commission>, StoreError> {
        let rows = match status {
            Some(status) => {
                let sql = format!(
                    "{} WHERE earner_id = ? AND status = ? ORDER BY id ASC",
                    COMMISSION_COLUMNS
                );
                sqlx::query(&sql)
                    .bind(earner.as_str())
                    .bind(status.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!("{} WHERE earner_id = ? ORDER BY id ASC", COMMISSION_COLUMNS);
                sqlx::query(&sql)
                    .bind(earner.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(commission_from_row).collect()
    }

    /// Move every listed commission out of `pending` in one transaction.
    ///
    /// Each row is updated conditionally on still being pending; the first row that
    /// is not rolls the whole batch back.
    ///
    /// # Errors
    /// - `Conflict` if any commission is already paid or cancelled
    /// - `NotFound` if any id does not exist
    pub async fn update_commission_status(
        &self,
        ids: &[CommissionId],
        status: CommissionStatus,
        at: TimeMs,
    ) -> Result<u64, StoreError> {
        if !CommissionStatus::Pending.can_transition_to(status) {
            return Err(StoreError::Conflict(format!(
                "commissions cannot move to {}",
                status
            )));
        }

        let paid_at = (status == CommissionStatus::Paid).then_some(at.as_ms());
        let mut tx = self.pool.begin().await?;
        let mut updated = 0u64;

        for id in ids {
            let result = sqlx::query(
                r#"
                UPDATE commissions
                SET status = ?, paid_at = COALESCE(?, paid_at)
                WHERE id = ? AND status = 'pending'
                "#,
            )
            .bind(status.as_str())
            .bind(paid_at)
            .bind(id.0)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                let current = sqlx::query("SELECT status FROM commissions WHERE id = ?")
                    .bind(id.0)
                    .fetch_optional(&mut *tx)
                    .await?
                    .map(|r| r.get::<String, _>("status"));
                tx.rollback().await?;

                return Err(match current {
                    Some(current) => {
                        warn!(
                            commission = %id,
                            current = %current,
                            target = %status,
                            "Rejected status batch"
                        );
                        StoreError::Conflict(format!(
                            "commission {} is {}, cannot become {}",
                            id, current, status
                        ))
                    }
                    None => StoreError::NotFound(format!("commission {}", id)),
                });
            }
            updated += result.rows_affected();
        }

        tx.commit().await?;
        Ok(updated)
    }
}

async fn insert_commission(
    tx: &mut Transaction<'_, Sqlite>,
    commission: &NewCommission,
) -> Result<CommissionId, StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO commissions (
            earner_id,
            source_id,
            level,
            amount,
            commission_type,
            status,
            earned_at,
            paid_at,
        )
        VALUES (?, ?, ?, ?, ?, 'pending', ?, NULL)
        "#,
    )
    .bind(commission.earner_id.as_str())
    .bind(commission.source_id.as_str())
    .bind(i64::from(commission.level))
    .bind(commission.amount.to_canonical_string())
    .bind(commission.commission_type.as_str())
    .bind(commission.earned_at.as_ms())
    .execute(&mut **tx)
    .await?;

    Ok(CommissionId(result.last_insert_rowid()))
}

fn commission_from_row(row: &SqliteRow) -> Result<Commission, StoreError> {
    let id = CommissionId(row.get("id"));
    let corrupt = |what: String| StoreError::Corrupt(format!("commission {}: {}", id, what));

    let level = u32::try_from(row.get::<i64, _>("level"))
        .map_err(|_| corrupt("negative level".to_string()))?;
    let commission_type =
        EventType::from_str(&row.get::<String, _>("commission_type")).map_err(corrupt)?;
    let status = CommissionStatus::from_str(&row.get::<String, _>("status")).map_err(corrupt)?;

    Ok(Commission {
        id,
        earner_id: MemberId::new(row.get::<String, _>("earner_id")),
        source_id: MemberId::new(row.get::<String, _>("source_id")),
        level,
        amount: parse_decimal(&row.get::<String, _>("amount"), "commission amount")?,
        commission_type,
        status,
        earned_at: TimeMs::new(row.get("earned_at")),
        paid_at: row.get::<Option<i64>, _>("paid_at").map(TimeMs::new),
    })
}

#[cfg(test)]
mod tests {
    use super::super::tests::{seed, setup_repo};
    use super::*;
    use crate::domain::Decimal;

    fn new_commission(earner: &str, level: u32, amount: &str) -> NewCommission {
        NewCommission {
            earner_id: MemberId::new(earner),
            source_id: MemberId::new("x"),
            level,
            amount: Decimal::from_str_canonical(amount).unwrap(),
            commission_type: EventType::Purchase,
            earned_at: TimeMs::new(10),
        }
    }

    async fn seeded() -> (Repository, tempfile::TempDir) {
        let (repo, dir) = setup_repo().await;
        seed(&repo, "a", None, 0).await;
        seed(&repo, "x", Some("a"), 1).await;
        (repo, dir)
    }

    #[tokio::test]
    async fn test_event_and_commissions_are_stored_together() {
        let (repo, _dir) = seeded().await;
        let event = QualifyingEvent {
            member_id: MemberId::new("x"),
            amount: Decimal::from(1000i64),
            event_type: EventType::Purchase,
            occurred_at: TimeMs::new(10),
        };
        let stored = repo
            .record_qualifying_event(&event, &[new_commission("a", 1, "100")])
            .await
            .unwrap();

        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, CommissionStatus::Pending);
        let listed = repo
            .list_commissions(&MemberId::new("a"), Some(CommissionStatus::Pending))
            .await
            .unwrap();
        assert_eq!(listed, stored);
    }

    #[tokio::test]
    async fn test_failed_commission_insert_drops_event() {
        let (repo, _dir) = seeded().await;
        let event = QualifyingEvent {
            member_id: MemberId::new("x"),
            amount: Decimal::from(500i64),
            event_type: EventType::Purchase,
            occurred_at: TimeMs::new(10),
        };
        // earner "ghost" violates the members foreign key
        let result = repo
            .record_qualifying_event(&event, &[new_commission("ghost", 1, "50")])
            .await;
        assert!(result.is_err());

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM qualifying_events")
            .fetch_one(&repo.pool)
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn test_status_batch_rolls_back_on_terminal_member() {
        let (repo, _dir) = seeded().await;
        let first = repo
            .append_commission(&new_commission("a", 1, "10"))
            .await
            .unwrap();
        let second = repo
            .append_commission(&new_commission("a", 2, "5"))
            .await
            .unwrap();

        let paid = repo
            .update_commission_status(&[first], CommissionStatus::Paid, TimeMs::new(20))
            .await
            .unwrap();
        assert_eq!(paid, 1);

        let result = repo
            .update_commission_status(&[second, first], CommissionStatus::Paid, TimeMs::new(30))
            .await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));

        let rows = repo.get_commissions(&[first, second]).await.unwrap();
        assert_eq!(rows[0].status, CommissionStatus::Paid);
        assert_eq!(rows[0].paid_at, Some(TimeMs::new(20)));
        assert_eq!(rows[1].status, CommissionStatus::Pending);
    }

    #[tokio::test]
    async fn test_cancel_does_not_stamp_paid_at() {
        let (repo, _dir) = seeded().await;
        let id = repo
            .append_commission(&new_commission("a", 1, "10"))
            .await
            .unwrap();
        repo.update_commission_status(&[id], CommissionStatus::Cancelled, TimeMs::new(5))
            .await
            .unwrap();

        let rows = repo.get_commissions(&[id]).await.unwrap();
        assert_eq!(rows[0].status, CommissionStatus::Cancelled);
        assert!(rows[0].paid_at.is_none());
    }

    #[tokio::test]
    async fn test_unknown_commission_is_not_found() {
        let (repo, _dir) = seeded().await;
        let result = repo
            .update_commission_status(&[CommissionId(404)], CommissionStatus::Paid, TimeMs::new(1))
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }
}
