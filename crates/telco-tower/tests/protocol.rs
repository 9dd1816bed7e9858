//! End-to-end protocol tests against spawned towers.
//!
//! Each test drives one or more tower tasks through their mailboxes the way
//! a caller would, then inspects the replies and the in-memory event log.

#![allow(clippy::panic, clippy::indexing_slicing)]

use std::time::Duration;

use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use telco_tower::{
    EventPublisher, InMemoryPublisher, Mailbox, Message, Tower, TowerHandle, TowerSettings,
};
use telco_types::{CallerId, Cdr, CdrState, Position};

fn spawn_tower(x: f64, y: f64, seed: u64, publisher: &InMemoryPublisher) -> TowerHandle {
    let tower = Tower::new(
        &TowerSettings::default(),
        Position { x, y },
        publisher.clone(),
        SmallRng::seed_from_u64(seed),
    );
    match tower {
        Ok(tower) => tower.spawn().0,
        Err(e) => panic!("tower construction failed: {e}"),
    }
}

async fn next_reply(mailbox: &mut Mailbox) -> Option<Message> {
    tokio::time::timeout(Duration::from_millis(200), mailbox.recv())
        .await
        .ok()
        .flatten()
}

#[test]
fn ten_thousand_towers_have_well_formed_ids() {
    let mut seeder = SmallRng::seed_from_u64(2026);
    for _ in 0..10_000 {
        let rng = SmallRng::from_rng(&mut seeder);
        let tower = Tower::new(
            &TowerSettings::default(),
            Position { x: 0.0, y: 0.0 },
            InMemoryPublisher::new(),
            rng,
        );
        let Ok(tower) = tower else {
            panic!("tower construction failed");
        };
        let id = tower.id().as_str();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')), "bad id {id}");
    }
}

#[tokio::test]
async fn caller_reaches_the_strongest_tower() {
    let publisher = InMemoryPublisher::new();
    let near = spawn_tower(100.0, 0.0, 1, &publisher);
    let far = spawn_tower(9_000.0, 0.0, 2, &publisher);
    let mut caller = Mailbox::new();

    for tower in [&near, &far] {
        assert!(tower.tell(Message::SignalReportRequest {
            x: 0.0,
            y: 0.0,
            source: caller.address(),
        }));
    }

    let mut reports = Vec::new();
    while let Some(Message::SignalReport {
        power, tower_id, ..
    }) = next_reply(&mut caller).await
    {
        reports.push((tower_id, power));
    }
    assert_eq!(reports.len(), 2);
    reports.sort_by(|a, b| b.1.total_cmp(&a.1));
    assert_eq!(&reports[0].0, near.id());
    assert!(publisher.is_empty(), "signal queries never publish");
}

#[tokio::test]
async fn full_call_publishes_lifecycle_snapshots_in_order() {
    let publisher = InMemoryPublisher::new();
    let tower = spawn_tower(0.0, 0.0, 3, &publisher);
    let mut caller = Mailbox::new();
    let caller_id = CallerId::new();

    // Retry until the tower admits; silence and Fail both mean "try again".
    let mut connected_cdr = None;
    for _ in 0..50 {
        let cdr = Cdr::new(caller_id, Utc::now()).with_tower(tower.id().clone());
        assert!(tower.tell(Message::Hello {
            caller: caller.address(),
            cdr: cdr.clone(),
            reconnect: false,
        }));
        match next_reply(&mut caller).await {
            Some(Message::Connect { tower_id, tower_ref }) => {
                assert_eq!(&tower_id, tower.id());
                assert!(tower_ref.same_entity(tower.address()));
                connected_cdr = Some(cdr.with_state(CdrState::Connect));
                break;
            }
            Some(Message::Fail { .. }) | None => {}
            Some(other) => panic!("unexpected reply {other:?}"),
        }
    }
    let Some(cdr) = connected_cdr else {
        panic!("tower never admitted the call");
    };

    assert!(tower.tell(Message::Disconnect {
        caller_id,
        cdr: cdr.finished(Utc::now()),
    }));
    assert!(next_reply(&mut caller).await.is_none(), "disconnect has no reply");
    assert!(publisher.flush().await.is_ok());

    let states: Vec<CdrState> = publisher
        .records_for(&format!("telco:tower{}", tower.id()))
        .iter()
        .filter_map(|r| r.cdr().ok())
        .map(|c| c.state)
        .collect();
    assert_eq!(states.last(), Some(&CdrState::Disconnect));
    assert_eq!(states.iter().filter(|s| **s == CdrState::Connect).count(), 1);
    assert!(states.iter().all(|s| matches!(
        s,
        CdrState::Fail | CdrState::Connect | CdrState::Disconnect
    )));
}

#[tokio::test]
async fn admission_split_over_many_requests() {
    let publisher = InMemoryPublisher::new();
    let tower = spawn_tower(0.0, 0.0, 4, &publisher);
    let mut caller = Mailbox::new();
    let total = 10_000_u32;

    for _ in 0..total {
        let _ = tower.tell(Message::Hello {
            caller: caller.address(),
            cdr: Cdr::new(CallerId::new(), Utc::now()),
            reconnect: false,
        });
    }
    // The tower handles its mailbox in order, so the signal report marks
    // the point where every Hello above has been answered (or ignored).
    assert!(tower.tell(Message::SignalReportRequest {
        x: 1.0,
        y: 1.0,
        source: caller.address(),
    }));
    let (mut connects, mut fails) = (0_u32, 0_u32);
    loop {
        match next_reply(&mut caller).await {
            Some(Message::Connect { .. }) => connects = connects.saturating_add(1),
            Some(Message::Fail { .. }) => fails = fails.saturating_add(1),
            Some(Message::SignalReport { .. }) => break,
            Some(other) => panic!("unexpected reply {other:?}"),
            None => panic!("tower stopped answering"),
        }
    }
    let ignored = total.saturating_sub(connects).saturating_sub(fails);

    assert!((7_700..8_300).contains(&connects), "connects {connects}");
    assert!((1_300..1_700).contains(&fails), "fails {fails}");
    assert!((350..650).contains(&ignored), "ignored {ignored}");
    assert_eq!(publisher.len(), (connects + fails) as usize);
}

#[tokio::test]
async fn unknown_messages_do_not_stop_the_tower() {
    let publisher = InMemoryPublisher::new();
    let tower = spawn_tower(0.0, 0.0, 5, &publisher);
    let mut caller = Mailbox::new();

    assert!(tower.tell(Message::Fail {
        tower_id: tower.id().clone(),
    }));
    assert!(tower.tell(Message::SignalReportRequest {
        x: 10.0,
        y: 10.0,
        source: caller.address(),
    }));
    assert!(matches!(
        next_reply(&mut caller).await,
        Some(Message::SignalReport { .. })
    ));
}

#[tokio::test]
async fn tower_task_ends_when_handles_are_dropped() {
    let publisher = InMemoryPublisher::new();
    let tower = Tower::new(
        &TowerSettings::default(),
        Position { x: 0.0, y: 0.0 },
        publisher,
        SmallRng::seed_from_u64(6),
    );
    let Ok(tower) = tower else {
        panic!("tower construction failed");
    };
    let (handle, task) = tower.spawn();
    let address = handle.address().clone();
    drop(handle);

    let finished = tokio::time::timeout(Duration::from_secs(1), task).await;
    assert!(matches!(finished, Ok(Ok(()))));
    assert!(!address.tell(Message::Setup));
}
