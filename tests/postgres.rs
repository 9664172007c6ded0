#![cfg(feature = "postgres")]

use chrono::{TimeDelta, TimeZone, Utc};
use std::sync::Arc;
use teesheet::{
    AccountRole, BookingCategory, CapabilityContext, GolfCourse, MockClock, PostgresStorage,
    ReservationService, SlotInput, SlotKind, SlotStatus, Storage, SweepKind, TeeSheetConfig,
    TeeTimeError, TestDbPools,
};
use tokio_util::sync::CancellationToken;

async fn service(
    pool: sqlx::PgPool,
) -> (
    Arc<ReservationService<PostgresStorage<TestDbPools>>>,
    MockClock,
    GolfCourse,
) {
    let storage = Arc::new(PostgresStorage::new(
        TestDbPools::new(pool).await.unwrap(),
    ));
    let course = GolfCourse::new("Valley", "Gyeonggi", 2);
    storage.upsert_course(course.clone()).await.unwrap();

    let clock = MockClock::new(Utc.with_ymd_and_hms(2026, 6, 10, 6, 0, 0).unwrap());
    let config = TeeSheetConfig {
        matrix_cache_ttl_ms: 0,
        ..Default::default()
    };
    let service = ReservationService::new(storage, Arc::new(clock.clone()), config).unwrap();
    (Arc::new(service), clock, course)
}

fn slot_input(course: &GolfCourse, time: &str) -> SlotInput {
    SlotInput {
        course_id: course.id,
        date: "2026-06-10".to_string(),
        time: time.to_string(),
        green_fee: "99000.5".to_string(),
        player_count: 4,
        request_type: "transfer".to_string(),
        hole_count: 9,
        caddy_type: "none".to_string(),
        includes_deposit: true,
        includes_meal: false,
        includes_cart: false,
        requirement_note: "gate code on arrival".to_string(),
        kind: SlotKind::SingleDay,
    }
}

fn staff(name: &str) -> CapabilityContext {
    CapabilityContext::new(name, AccountRole::Staff, Some("ops"))
}

#[sqlx::test]
#[test_log::test]
async fn test_concurrent_holds_settle_in_database(pool: sqlx::PgPool) {
    let (service, _clock, course) = service(pool).await;
    let slot_id = service
        .create_slot(slot_input(&course, "08:00"))
        .await
        .unwrap()
        .id;

    let attempts = (0..8).map(|i| {
        let service = service.clone();
        tokio::spawn(async move { service.hold(slot_id, &staff(&format!("staff-{i}"))).await })
    });
    let results: Vec<_> = futures::future::join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, TeeTimeError::Conflict(_)))
    );

    let stored = service.slot(slot_id).await.unwrap();
    assert_eq!(stored.status, SlotStatus::Held);
    assert_eq!(stored.version, 1);
    assert_eq!(stored.green_fee, "99000.5");
}

#[sqlx::test]
#[test_log::test]
async fn test_lifecycle_and_sweeps_against_database(pool: sqlx::PgPool) {
    let (service, clock, course) = service(pool).await;
    let scheduler = service.scheduler(CancellationToken::new()).unwrap();

    let played = service.create_slot(slot_input(&course, "07:00")).await.unwrap();
    let abandoned = service.create_slot(slot_input(&course, "12:00")).await.unwrap();
    let unbooked = service.create_slot(slot_input(&course, "16:00")).await.unwrap();

    service.hold(played.id, &staff("a")).await.unwrap();
    service.confirm(played.id, &staff("a")).await.unwrap();
    service.hold(abandoned.id, &staff("b")).await.unwrap();

    clock.advance(TimeDelta::hours(1) + TimeDelta::minutes(1));
    let expiry = scheduler.sweep(SweepKind::Expiry).await.unwrap();
    assert_eq!(expiry.transitioned, 1);
    let completion = scheduler.sweep(SweepKind::Completion).await.unwrap();
    assert_eq!(completion.transitioned, 1);

    let matrix = service
        .matrix(BookingCategory::FullGroup, None, Some(1))
        .await
        .unwrap();
    assert_eq!(matrix.total(), 2);

    clock.advance(TimeDelta::days(1));
    let archive = scheduler.sweep(SweepKind::Archive).await.unwrap();
    assert_eq!(archive.transitioned, 2);

    let completed = service.slot(played.id).await.unwrap();
    assert_eq!(completed.status, SlotStatus::Completed);
    assert_eq!(completed.confirmer.map(|c| c.user_id.0), Some("a".to_string()));
    for id in [abandoned.id, unbooked.id] {
        assert_eq!(service.slot(id).await.unwrap().status, SlotStatus::Cancelled);
    }
}

#[sqlx::test]
#[test_log::test]
async fn test_package_registration_persists_link(pool: sqlx::PgPool) {
    let (service, _clock, course) = service(pool).await;

    let bad_second_day = SlotInput {
        course_id: GolfCourse::new("Ghost", "Nowhere", 1).id,
        ..slot_input(&course, "08:00")
    };
    assert!(matches!(
        service
            .register_package(slot_input(&course, "07:00"), bad_second_day, String::new())
            .await,
        Err(TeeTimeError::InvalidInput(_))
    ));
    let matrix = service
        .matrix(BookingCategory::FullGroup, Some(SlotKind::Package), Some(1))
        .await
        .unwrap();
    assert_eq!(matrix.total(), 0);

    let package = service
        .register_package(
            slot_input(&course, "07:00"),
            SlotInput {
                date: "2026-06-11".to_string(),
                ..slot_input(&course, "08:00")
            },
            "lodge, 1 night".to_string(),
        )
        .await
        .unwrap();
    let link = service
        .package_for(package.connected.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(link.id, package.link.id);
    assert_eq!(link.primary_slot_id, package.primary.id);
    assert_eq!(link.accommodation_note, "lodge, 1 night");
    assert_eq!(package.primary.kind, SlotKind::Package);
}
