use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use teesheet::{
    AccountRole, BookingCategory, CapabilityContext, GolfCourse, InMemoryStorage, MockClock,
    ReservationService, SlotInput, SlotKind, SlotStatus, Storage, SweepKind, TeeSheetConfig,
    TeeTimeError, TimeBucket,
};
use tokio_util::sync::CancellationToken;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 10, 6, 0, 0).unwrap()
}

struct Harness {
    service: Arc<ReservationService<InMemoryStorage>>,
    clock: MockClock,
    course: GolfCourse,
}

async fn harness(config: TeeSheetConfig) -> Harness {
    let storage = Arc::new(InMemoryStorage::new());
    let course = GolfCourse::new("Ocean", "Busan", 1);
    storage.upsert_course(course.clone()).await.unwrap();
    let clock = MockClock::new(start());
    let service =
        ReservationService::new(storage, Arc::new(clock.clone()), config).unwrap();
    Harness {
        service: Arc::new(service),
        clock,
        course,
    }
}

fn uncached() -> TeeSheetConfig {
    TeeSheetConfig {
        matrix_cache_ttl_ms: 0,
        ..Default::default()
    }
}

fn slot_input(course: &GolfCourse, date: &str, time: &str, players: u8) -> SlotInput {
    SlotInput {
        course_id: course.id,
        date: date.to_string(),
        time: time.to_string(),
        green_fee: "210000".to_string(),
        player_count: players,
        request_type: "transfer".to_string(),
        hole_count: 18,
        caddy_type: "dedicated".to_string(),
        includes_deposit: false,
        includes_meal: true,
        includes_cart: true,
        requirement_note: String::new(),
        kind: SlotKind::SingleDay,
    }
}

fn staff(name: &str) -> CapabilityContext {
    CapabilityContext::new(name, AccountRole::Staff, Some("sales"))
}

#[test_log::test(tokio::test)]
async fn test_slot_plays_out_from_hold_to_completion() {
    let h = harness(uncached()).await;
    let scheduler = h.service.scheduler(CancellationToken::new()).unwrap();
    let slot = h
        .service
        .create_slot(slot_input(&h.course, "2026-06-10", "07:00", 4))
        .await
        .unwrap();
    assert_eq!(slot.time_bucket, TimeBucket::Morning);

    h.service.hold(slot.id, &staff("a")).await.unwrap();
    h.clock.advance(TimeDelta::minutes(3));
    let confirmed = h.service.confirm(slot.id, &staff("a")).await.unwrap();
    assert_eq!(confirmed.status, SlotStatus::Confirmed);

    // not yet teed off
    let report = scheduler.sweep(SweepKind::Completion).await.unwrap();
    assert_eq!(report.transitioned, 0);

    h.clock.set(Utc.with_ymd_and_hms(2026, 6, 10, 7, 0, 0).unwrap());
    let report = scheduler.sweep(SweepKind::Completion).await.unwrap();
    assert_eq!(report.transitioned, 1);

    let completed = h.service.slot(slot.id).await.unwrap();
    assert_eq!(completed.status, SlotStatus::Completed);
    assert_eq!(completed.version, 3);
    assert!(matches!(
        h.service.release(slot.id, &staff("a")).await,
        Err(TeeTimeError::Conflict(_))
    ));
}

#[test_log::test(tokio::test)]
async fn test_stale_hold_is_swept_and_rebooked() {
    let h = harness(uncached()).await;
    let scheduler = h.service.scheduler(CancellationToken::new()).unwrap();
    let slot = h
        .service
        .create_slot(slot_input(&h.course, "2026-06-12", "11:30", 2))
        .await
        .unwrap();

    h.service.hold(slot.id, &staff("a")).await.unwrap();
    h.clock.advance(TimeDelta::minutes(10) + TimeDelta::seconds(1));

    let report = scheduler.sweep(SweepKind::Expiry).await.unwrap();
    assert_eq!(report.transitioned, 1);

    // the original holder lost the slot; another user can take it
    assert!(matches!(
        h.service.confirm(slot.id, &staff("a")).await,
        Err(TeeTimeError::Conflict(_))
    ));
    let rebooked = h.service.hold(slot.id, &staff("b")).await.unwrap();
    assert_eq!(rebooked.holder.map(|a| a.user_id.0), Some("b".to_string()));
}

#[test_log::test(tokio::test)]
async fn test_calendar_rules_follow_configured_offset() {
    // UTC+9: 2026-06-10 16:00Z is already 01:00 on the 11th locally
    let h = harness(TeeSheetConfig {
        utc_offset_seconds: 9 * 3600,
        ..uncached()
    })
    .await;
    let yesterday = h
        .service
        .create_slot(slot_input(&h.course, "2026-06-10", "15:00", 4))
        .await
        .unwrap();
    let today = h
        .service
        .create_slot(slot_input(&h.course, "2026-06-11", "07:00", 4))
        .await
        .unwrap();

    h.clock.set(Utc.with_ymd_and_hms(2026, 6, 10, 16, 0, 0).unwrap());

    assert!(matches!(
        h.service.hold(yesterday.id, &staff("a")).await,
        Err(TeeTimeError::SlotInPast(_))
    ));
    h.service.hold(today.id, &staff("a")).await.unwrap();

    let scheduler = h.service.scheduler(CancellationToken::new()).unwrap();
    let report = scheduler.sweep(SweepKind::Archive).await.unwrap();
    assert_eq!(report.transitioned, 1);
    assert_eq!(
        h.service.slot(yesterday.id).await.unwrap().status,
        SlotStatus::Cancelled
    );

    let matrix = h
        .service
        .matrix(BookingCategory::FullGroup, None, Some(7))
        .await
        .unwrap();
    assert_eq!(
        matrix.date_columns.first().map(|d| d.to_string()),
        Some("2026-06-11".to_string())
    );
    assert_eq!(matrix.total(), 1);
}

#[test_log::test(tokio::test)]
async fn test_matrix_tracks_slot_lifecycle() {
    let h = harness(uncached()).await;
    let scheduler = h.service.scheduler(CancellationToken::new()).unwrap();

    let early = h
        .service
        .create_slot(slot_input(&h.course, "2026-06-10", "06:30", 4))
        .await
        .unwrap();
    h.service
        .create_slot(slot_input(&h.course, "2026-06-10", "16:10", 4))
        .await
        .unwrap();
    h.service
        .create_slot(slot_input(&h.course, "2026-06-10", "16:20", 3))
        .await
        .unwrap();

    let date = early.date;
    let full_group =
        |matrix: &teesheet::SlotMatrix, bucket| matrix.count(h.course.id, date, bucket);

    let matrix = h
        .service
        .matrix(BookingCategory::FullGroup, None, None)
        .await
        .unwrap();
    assert_eq!(full_group(&matrix, TimeBucket::Morning), Some(1));
    assert_eq!(full_group(&matrix, TimeBucket::Evening), Some(1));
    assert_eq!(matrix.total(), 2);

    // held and confirmed slots still count
    h.service.hold(early.id, &staff("a")).await.unwrap();
    h.service.confirm(early.id, &staff("a")).await.unwrap();
    let matrix = h
        .service
        .matrix(BookingCategory::FullGroup, None, None)
        .await
        .unwrap();
    assert_eq!(matrix.total(), 2);

    h.clock.advance(TimeDelta::hours(1));
    scheduler.sweep(SweepKind::Completion).await.unwrap();
    let matrix = h
        .service
        .matrix(BookingCategory::FullGroup, None, None)
        .await
        .unwrap();
    assert_eq!(full_group(&matrix, TimeBucket::Morning), Some(0));
    assert_eq!(matrix.total(), 1);

    let shared = h
        .service
        .matrix(BookingCategory::Shared, Some(SlotKind::SingleDay), None)
        .await
        .unwrap();
    assert_eq!(shared.total(), 1);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_background_scheduler_releases_holds_on_its_own() {
    let h = harness(uncached()).await;
    let shutdown = CancellationToken::new();
    let scheduler = Arc::new(h.service.scheduler(shutdown.clone()).unwrap());
    let runner = tokio::spawn(scheduler.run());

    let slot = h
        .service
        .create_slot(slot_input(&h.course, "2026-06-11", "08:00", 4))
        .await
        .unwrap();
    h.service.hold(slot.id, &staff("a")).await.unwrap();

    h.clock.advance(TimeDelta::minutes(11));
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(
        h.service.slot(slot.id).await.unwrap().status,
        SlotStatus::Available
    );

    shutdown.cancel();
    runner.await.unwrap().unwrap();
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_hold_race_across_many_slots() {
    let h = harness(uncached()).await;
    let mut slot_ids = Vec::new();
    for time in ["07:00", "07:10", "07:20"] {
        let slot = h
            .service
            .create_slot(slot_input(&h.course, "2026-06-15", time, 4))
            .await
            .unwrap();
        slot_ids.push(slot.id);
    }

    let attempts = (0..24).map(|i| {
        let service = h.service.clone();
        let slot_id = slot_ids[i % slot_ids.len()];
        tokio::spawn(async move {
            service
                .hold(slot_id, &staff(&format!("staff-{i}")))
                .await
                .map(|view| view.id)
        })
    });
    let results: Vec<_> = futures::future::join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let mut winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    winners.sort_by_key(|id| id.0);
    winners.dedup();
    assert_eq!(winners.len(), 3);
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, TeeTimeError::Conflict(_)))
    );
}
