use matrixnet::domain::{CommissionStatus, Decimal, EventType, MemberId, NewMember, Tier};
use matrixnet::engine::{CommissionEngine, CommissionPlan, EngineError};
use matrixnet::{init_db, NetworkStore, Repository, TimeMs};
use std::sync::Arc;
use tempfile::TempDir;

async fn setup() -> (Arc<dyn NetworkStore>, CommissionEngine, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("commissions.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let store: Arc<dyn NetworkStore> = Arc::new(Repository::new(pool));

    // x -> a(Builder) -> b(Starter) -> c(Leader)
    for (i, (id, sponsor, tier)) in [
        ("c", None, Tier::Leader),
        ("b", Some("c"), Tier::Starter),
        ("a", Some("b"), Tier::Builder),
        ("x", Some("a"), Tier::Starter),
    ]
    .into_iter()
    .enumerate()
    {
        let member = NewMember::new(id, sponsor.map(MemberId::from), tier)
            .into_member(TimeMs::new(i as i64));
        store.insert_member(&member).await.unwrap();
    }

    let engine = CommissionEngine::new(store.clone(), Arc::new(CommissionPlan::default()));
    (store, engine, temp_dir)
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

#[tokio::test]
async fn test_sponsor_chain_with_ineligible_middle_level() {
    let (store, engine, _temp) = setup().await;

    let commissions = engine
        .record_qualifying_event(&MemberId::new("x"), dec("1000"), EventType::Purchase, None)
        .await
        .unwrap();

    assert_eq!(commissions.len(), 2);
    assert_eq!(commissions[0].earner_id, MemberId::new("a"));
    assert_eq!(commissions[0].level, 1);
    assert_eq!(commissions[0].amount, dec("100"));
    assert_eq!(commissions[1].earner_id, MemberId::new("c"));
    assert_eq!(commissions[1].level, 3);
    assert_eq!(commissions[1].amount, dec("30"));

    let stored = store
        .list_commissions(&MemberId::new("b"), None)
        .await
        .unwrap();
    assert!(stored.is_empty());
}

#[tokio::test]
async fn test_commission_levels_never_exceed_plan_max() {
    let (store, engine, _temp) = setup().await;
    let plan = CommissionPlan {
        max_level: 2,
        ..CommissionPlan::default()
    };
    let shallow = CommissionEngine::new(store.clone(), Arc::new(plan));

    let commissions = shallow
        .record_qualifying_event(&MemberId::new("x"), dec("1000"), EventType::Purchase, Some(10))
        .await
        .unwrap();
    assert!(commissions.iter().all(|c| c.level >= 1 && c.level <= 2));

    let full = engine
        .record_qualifying_event(&MemberId::new("x"), dec("1000"), EventType::Purchase, Some(10))
        .await
        .unwrap();
    assert!(full.iter().all(|c| c.level <= engine.plan().max_level));
}

#[tokio::test]
async fn test_mark_paid_twice_in_sqlite() {
    let (store, engine, _temp) = setup().await;
    let commissions = engine
        .record_qualifying_event(&MemberId::new("x"), dec("250"), EventType::Subscription, None)
        .await
        .unwrap();
    let id = commissions[0].id;

    let paid = engine.mark_paid(&[id]).await.unwrap();
    assert_eq!(paid[0].status, CommissionStatus::Paid);

    let second = engine.mark_paid(&[id]).await;
    assert!(matches!(
        second,
        Err(EngineError::InvalidStateTransition { from: CommissionStatus::Paid, .. })
    ));

    let cancel_paid = engine.cancel(&[id]).await;
    assert!(matches!(
        cancel_paid,
        Err(EngineError::InvalidStateTransition { .. })
    ));

    let stored = store.get_commissions(&[id]).await.unwrap();
    assert_eq!(stored[0].status, CommissionStatus::Paid);
    assert!(stored[0].paid_at.is_some());
}

#[tokio::test]
async fn test_failed_batch_leaves_every_commission_pending() {
    let (store, engine, _temp) = setup().await;
    let first = engine
        .record_qualifying_event(&MemberId::new("x"), dec("100"), EventType::Purchase, None)
        .await
        .unwrap();
    let second = engine
        .record_qualifying_event(&MemberId::new("x"), dec("100"), EventType::Purchase, None)
        .await
        .unwrap();
    engine.cancel(&[first[0].id]).await.unwrap();

    let batch = [second[0].id, second[1].id, first[0].id];
    let result = engine.mark_paid(&batch).await;
    assert!(matches!(result, Err(EngineError::InvalidStateTransition { .. })));

    let after = store.get_commissions(&batch[..2]).await.unwrap();
    assert!(after.iter().all(|c| c.status == CommissionStatus::Pending));
}

#[tokio::test]
async fn test_store_rejects_stale_batch_directly() {
    let (store, engine, _temp) = setup().await;
    let commissions = engine
        .record_qualifying_event(&MemberId::new("x"), dec("100"), EventType::Renewal, None)
        .await
        .unwrap();
    let ids: Vec<_> = commissions.iter().map(|c| c.id).collect();

    let updated = store
        .update_commission_status(&ids, CommissionStatus::Paid, TimeMs::new(5))
        .await
        .unwrap();
    assert_eq!(updated, ids.len() as u64);

    let again = store
        .update_commission_status(&ids, CommissionStatus::Cancelled, TimeMs::new(6))
        .await;
    assert!(again.is_err());
}

#[tokio::test]
async fn test_commission_summary_in_sqlite() {
    let (_store, engine, _temp) = setup().await;
    for amount in ["100", "200"] {
        engine
            .record_qualifying_event(&MemberId::new("x"), dec(amount), EventType::Purchase, None)
            .await
            .unwrap();
    }
    let earned = engine
        .commissions_for(&MemberId::new("a"), Some(CommissionStatus::Pending))
        .await
        .unwrap();
    engine.mark_paid(&[earned[0].id]).await.unwrap();

    let summary = engine.commission_summary(&MemberId::new("a")).await.unwrap();
    assert_eq!(summary.count, 2);
    assert_eq!(summary.paid, dec("10"));
    assert_eq!(summary.pending, dec("20"));
    assert!(summary.cancelled.is_zero());
}
