//! Fuzz target for StateReconciler
//!
//! # Invariants
//!
//! - The visible list never holds the same message id twice
//! - Every visible message belongs to the active room
//! - Room previews are listed once each

#![no_main]

use std::collections::HashSet;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parley_core::{HistoryRequest, ReconcilerConfig, StateReconciler};
use parley_proto::{InboundEvent, Message};

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    Select { room: u8 },
    Clear,
    LoadOlder,
    /// Answer the n-th outstanding request, possibly a stale one.
    Answer { request: u8, ids: Vec<u8> },
    Fail { request: u8 },
    Push { room: u8, id: u8 },
}

fn message(room: u8, id: u8) -> Message {
    Message {
        id: u64::from(id),
        room_id: u64::from(room % 4),
        sender_id: 1,
        sender_display_name: None,
        content: String::new(),
        created_at: String::new(),
    }
}

fuzz_target!(|ops: Vec<Op>| {
    let mut reconciler = StateReconciler::new(ReconcilerConfig { page_size: 8 });
    let mut requests: Vec<HistoryRequest> = Vec::new();

    for op in ops {
        match op {
            Op::Select { room } => requests.push(reconciler.select_room(u64::from(room % 4))),
            Op::Clear => reconciler.clear_room(),
            Op::LoadOlder => requests.extend(reconciler.load_older()),
            Op::Answer { request, ids } => {
                if let Some(req) = requests.get(usize::from(request) % requests.len().max(1)) {
                    let room = req.room_id as u8;
                    let page = ids.into_iter().map(|id| message(room, id)).collect();
                    reconciler.apply_history(req.token, page);
                }
            },
            Op::Fail { request } => {
                if let Some(req) = requests.get(usize::from(request) % requests.len().max(1)) {
                    reconciler.history_failed(req.token);
                }
            },
            Op::Push { room, id } => {
                reconciler.apply(&InboundEvent::NewMessage(message(room, id)));
            },
        }

        let mut ids = HashSet::new();
        for visible in reconciler.visible() {
            assert!(ids.insert(visible.id), "duplicate id {}", visible.id);
            assert_eq!(Some(visible.room_id), reconciler.active_room());
        }

        let mut rooms = HashSet::new();
        for preview in reconciler.previews() {
            assert!(rooms.insert(preview.room_id));
        }
    }
});
