use matrixnet::domain::{
    Decimal, EventType, Member, MemberId, NewCommission, NewMember, Period, QualifyingEvent, Tier,
};
use matrixnet::engine::{ActivityPolicy, EngineError, RecentActivity, TeamVolumeAggregator};
use matrixnet::{init_db, NetworkStore, Repository, TimeMs};
use std::sync::Arc;
use tempfile::TempDir;

const DAY_MS: i64 = 86_400_000;

async fn sqlite_store() -> (Arc<dyn NetworkStore>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("volume.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    (Arc::new(Repository::new(pool)), temp_dir)
}

async fn join(store: &Arc<dyn NetworkStore>, id: &str, sponsor: Option<&str>, at: i64) {
    let member = NewMember::new(id, sponsor.map(MemberId::from), Tier::Starter)
        .into_member(TimeMs::new(at));
    store.insert_member(&member).await.unwrap();
}

async fn buy(store: &Arc<dyn NetworkStore>, id: &str, amount: &str, at: i64) {
    let event = QualifyingEvent {
        member_id: MemberId::new(id),
        amount: Decimal::from_str_canonical(amount).unwrap(),
        event_type: EventType::Purchase,
        occurred_at: TimeMs::new(at),
    };
    let no_commissions: Vec<NewCommission> = Vec::new();
    store
        .record_qualifying_event(&event, &no_commissions)
        .await
        .unwrap();
}

/// m -> {r1, r2}; r1 -> {g1}. r1 and r2 contribute 200 each, g1 contributes 50.
async fn seeded() -> (Arc<dyn NetworkStore>, TempDir) {
    let (store, temp) = sqlite_store().await;
    join(&store, "m", None, 0).await;
    join(&store, "r1", Some("m"), DAY_MS).await;
    join(&store, "r2", Some("m"), 2 * DAY_MS).await;
    join(&store, "g1", Some("r1"), 3 * DAY_MS).await;
    buy(&store, "r1", "200", 4 * DAY_MS).await;
    buy(&store, "r2", "150.50", 4 * DAY_MS).await;
    buy(&store, "r2", "49.50", 5 * DAY_MS).await;
    buy(&store, "g1", "50", 6 * DAY_MS).await;
    (store, temp)
}

fn month() -> Period {
    Period::new(TimeMs::new(0), TimeMs::new(30 * DAY_MS)).unwrap()
}

fn everyone() -> Arc<dyn ActivityPolicy> {
    Arc::new(|_: &Member, _: TimeMs| true)
}

#[tokio::test]
async fn test_scenario_rollup_in_sqlite() {
    let (store, _temp) = seeded().await;
    let aggregator = TeamVolumeAggregator::new(store.clone(), everyone());

    let snapshot = aggregator
        .aggregate(&MemberId::new("m"), &month(), 5)
        .await
        .unwrap();
    assert!(snapshot.personal_volume.is_zero());
    assert_eq!(snapshot.team_volume, Decimal::from(450i64));
    assert_eq!(snapshot.active_referrals_count, 2);

    let levels = aggregator
        .level_breakdown(&MemberId::new("m"), &month(), 5)
        .await
        .unwrap();
    assert_eq!(levels[0].level_volume, Decimal::from(400i64));
    assert_eq!(levels[1].level_volume, Decimal::from(50i64));

    let stored = store
        .get_volume_snapshot(&MemberId::new("m"), &month())
        .await
        .unwrap();
    assert_eq!(stored, Some(snapshot));
}

#[tokio::test]
async fn test_breakdown_sums_to_downline_volume_for_every_member() {
    let (store, _temp) = seeded().await;
    buy(&store, "r1", "10", 7 * DAY_MS).await;
    let aggregator = TeamVolumeAggregator::new(store, everyone());

    for id in ["m", "r1", "r2", "g1"] {
        let report = aggregator
            .report(&MemberId::new(id), &month(), 5)
            .await
            .unwrap();
        let sum: Decimal = report.levels.iter().map(|l| l.level_volume).sum();
        assert_eq!(sum, report.snapshot.downline_volume(), "member {}", id);
        assert!(report.snapshot.team_volume >= report.snapshot.personal_volume);
    }
}

#[tokio::test]
async fn test_reaggregation_overwrites_same_key() {
    let (store, _temp) = seeded().await;
    let aggregator = TeamVolumeAggregator::new(store.clone(), everyone());

    let first = aggregator
        .aggregate(&MemberId::new("m"), &month(), 5)
        .await
        .unwrap();
    let second = aggregator
        .aggregate(&MemberId::new("m"), &month(), 5)
        .await
        .unwrap();
    assert_eq!(first, second);

    buy(&store, "g1", "25", 8 * DAY_MS).await;
    let third = aggregator
        .aggregate(&MemberId::new("m"), &month(), 5)
        .await
        .unwrap();
    assert_eq!(third.team_volume, Decimal::from(475i64));
    let stored = store
        .get_volume_snapshot(&MemberId::new("m"), &month())
        .await
        .unwrap();
    assert_eq!(stored, Some(third));
}

#[tokio::test]
async fn test_default_activity_window() {
    let (store, _temp) = seeded().await;
    // r1 joined on day 1 and r2 on day 2; only r2 is within 28 days of day 30.
    let aggregator = TeamVolumeAggregator::new(store, Arc::new(RecentActivity::days(28)));

    let report = aggregator
        .report(&MemberId::new("m"), &month(), 5)
        .await
        .unwrap();
    assert_eq!(report.snapshot.active_referrals_count, 1);
}

#[tokio::test]
async fn test_unknown_member_is_an_error() {
    let (store, _temp) = sqlite_store().await;
    let aggregator = TeamVolumeAggregator::new(store, everyone());

    let result = aggregator
        .aggregate(&MemberId::new("ghost"), &month(), 5)
        .await;
    assert!(matches!(result, Err(EngineError::MemberNotFound(_))));
}
