//! Fuzz target for the ConnectionManager state machine
//!
//! # Strategy
//!
//! - Random interleavings of user calls, transport reports and clock steps
//! - Close codes drawn from normal, abnormal and absent
//! - Raw inbound frames, valid or not
//!
//! # Invariants
//!
//! - Frames are only sent while Connected
//! - Retry attempts never exceed the configured budget
//! - At most one join is sent per successful open (rejoin)
//! - State and the returned actions agree: OpenTransport only when Connecting

#![no_main]

use std::time::{Duration, Instant};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parley_core::{ConnectionAction, ConnectionConfig, ConnectionManager, ConnectionState};
use parley_proto::OutboundFrame;

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    Connect,
    Disconnect,
    Opened,
    Closed { code: CloseCode },
    Error,
    Advance { millis: u16 },
    Join { room: u8 },
    Leave,
    Send,
    Frame { raw: String },
}

#[derive(Debug, Clone, Arbitrary)]
enum CloseCode {
    Normal,
    Abnormal(u16),
    Missing,
}

fuzz_target!(|ops: Vec<Op>| {
    let config = ConnectionConfig::default();
    let max_attempts = config.reconnect.max_attempts;
    let mut conn = ConnectionManager::new(config);
    let mut now = Instant::now();

    for op in ops {
        let before = conn.state();
        let actions = match op {
            Op::Connect => conn.connect("token").unwrap_or_default(),
            Op::Disconnect => conn.disconnect().unwrap_or_default(),
            Op::Opened => conn.transport_opened(now),
            Op::Closed { code } => {
                let code = match code {
                    CloseCode::Normal => Some(1000),
                    CloseCode::Abnormal(c) if c != 1000 => Some(c),
                    CloseCode::Abnormal(_) | CloseCode::Missing => None,
                };
                conn.transport_closed(code, "fuzz", now)
            },
            Op::Error => conn.transport_error("fuzz", now),
            Op::Advance { millis } => {
                now += Duration::from_millis(u64::from(millis) * 10);
                conn.tick(now)
            },
            Op::Join { room } => conn.join_room(u64::from(room), now).unwrap_or_default(),
            Op::Leave => conn.leave_room().unwrap_or_default(),
            Op::Send => conn.send(OutboundFrame::Ping).unwrap_or_default(),
            Op::Frame { raw } => conn.handle_frame(&raw),
        };

        assert!(conn.attempts() <= max_attempts);

        let sends = actions.iter().filter(|a| matches!(a, ConnectionAction::SendFrame(_))).count();
        let joins = actions
            .iter()
            .filter(|a| {
                matches!(a, ConnectionAction::SendFrame(OutboundFrame::JoinConversation { .. }))
            })
            .count();
        if sends > 0 {
            assert_eq!(conn.state(), ConnectionState::Connected, "sent from {before:?}");
        }
        assert!(joins <= 1);

        if actions.iter().any(|a| matches!(a, ConnectionAction::OpenTransport { .. })) {
            assert_eq!(conn.state(), ConnectionState::Connecting);
        }
    }
});
