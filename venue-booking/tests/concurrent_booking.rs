//! Concurrency tests for slot claims.
//!
//! Run against an on-disk database with a real connection pool so claims
//! race through separate connections and SQLite's write lock.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use booking_core::environment::SystemClock;
use chrono::NaiveTime;
use std::sync::Arc;
use venue_booking::aggregates::{AccountPolicy, RandomSecrets};
use venue_booking::auth::SessionKeys;
use venue_booking::notifications::RecordingMailer;
use venue_booking::server::AppState;
use venue_booking::store::SqliteStore;
use venue_booking::{BookingError, Role, SlotKey, Venue};

const CONTENDERS: usize = 8;

async fn app_on_disk(dir: &tempfile::TempDir) -> AppState {
    let url = format!("sqlite://{}", dir.path().join("bookings.db").display());
    let store = Arc::new(SqliteStore::connect(&url, 4).await.unwrap());
    let clock = Arc::new(SystemClock);
    let sessions = Arc::new(SessionKeys::new(
        b"concurrency",
        chrono::Duration::days(2),
        false,
        clock.clone(),
    ));

    AppState::new(
        store,
        Arc::new(RecordingMailer::new()),
        clock,
        Arc::new(RandomSecrets),
        sessions,
        AccountPolicy::default(),
    )
}

fn nine_to_ten() -> SlotKey {
    SlotKey::new(
        "Hall A",
        NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
    )
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exactly_one_concurrent_claim_wins() {
    let dir = tempfile::tempdir().unwrap();
    let state = app_on_disk(&dir).await;

    state
        .catalog
        .create_venue(Venue {
            name: "Hall A".into(),
            location: "Block N28".into(),
            capacity: 120,
            venue_type: "Lecture hall".into(),
            status: true,
            price: 50.0,
        })
        .await
        .unwrap();
    state.catalog.create_slot(&nine_to_ten()).await.unwrap();

    for i in 0..CONTENDERS {
        state
            .accounts
            .create_verified_user(
                &format!("student{i}@graduate.utm.my"),
                &format!("student{i}"),
                "pw",
                Role::Student,
            )
            .await
            .unwrap();
    }

    let handles: Vec<_> = (0..CONTENDERS)
        .map(|i| {
            let bookings = state.bookings.clone();
            tokio::spawn(async move {
                bookings
                    .create_booking(&format!("student{i}@graduate.utm.my"), nine_to_ten(), None)
                    .await
            })
        })
        .collect();

    let mut results = Vec::with_capacity(CONTENDERS);
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    let won = results.iter().filter(|r| r.is_ok()).count();
    let lost = results
        .iter()
        .filter(|r| matches!(r, Err(BookingError::NotFound(_))))
        .count();
    assert_eq!(won, 1);
    assert_eq!(lost, CONTENDERS - 1);
    assert_eq!(state.bookings.list_bookings().await.unwrap().len(), 1);
}
