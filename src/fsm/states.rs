//! Session state handlers and table builder.
//!
//! ```text
//!  UNCALIBRATED ──[baseline ready]──▶ IDLE ──[StartSession]──▶ ACTIVE
//!        ▲                             ▲                         │
//!        │                             ├──[EndSession]───────────┤
//!        │                             └──[inactivity timeout]───┤
//!        └─────────────[recalibration]───────────────────────────┘
//! ```
//!
//! `StartSession` is a forced transition made by the service after its
//! guards pass; the table itself only encodes the automatic edges.

use super::context::{FsmContext, SessionEndReason};
use super::{StateDescriptor, StateId};
use log::{debug, info};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        StateDescriptor {
            id: StateId::Uncalibrated,
            name: "Uncalibrated",
            on_enter: Some(uncalibrated_enter),
            on_exit: None,
            on_update: uncalibrated_update,
        },
        StateDescriptor {
            id: StateId::Idle,
            name: "Idle",
            on_enter: Some(idle_enter),
            on_exit: None,
            on_update: idle_update,
        },
        StateDescriptor {
            id: StateId::Active,
            name: "Active",
            on_enter: Some(active_enter),
            on_exit: Some(active_exit),
            on_update: active_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  UNCALIBRATED
// ═══════════════════════════════════════════════════════════════════════════

fn uncalibrated_enter(ctx: &mut FsmContext) {
    info!(
        "UNCALIBRATED: waiting for baseline (collecting={})",
        ctx.device.calibrating
    );
}

fn uncalibrated_update(ctx: &mut FsmContext) -> Option<StateId> {
    ctx.device.is_calibrated.then_some(StateId::Idle)
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE
// ═══════════════════════════════════════════════════════════════════════════

fn idle_enter(ctx: &mut FsmContext) {
    info!("IDLE: calibrated, {} reps on the counter", ctx.device.rep_count);
}

fn idle_update(ctx: &mut FsmContext) -> Option<StateId> {
    (!ctx.device.is_calibrated).then_some(StateId::Uncalibrated)
}

// ═══════════════════════════════════════════════════════════════════════════
//  ACTIVE
// ═══════════════════════════════════════════════════════════════════════════

fn active_enter(ctx: &mut FsmContext) {
    ctx.device.session_active = true;
    ctx.device.last_activity_ms = ctx.now_ms;
    ctx.session_start_reps = ctx.device.rep_count;
    ctx.end_reason = None;
    info!("ACTIVE: session started at {} reps", ctx.device.rep_count);
    let status = ctx.device.status_packet();
    ctx.send(status);
}

fn active_exit(ctx: &mut FsmContext) {
    ctx.device.session_active = false;
    let reason = ctx.end_reason.take().unwrap_or(SessionEndReason::Command);
    let reps = ctx.session_reps();
    info!("ACTIVE: session ended ({reason:?}) after {reps} reps");

    if reason == SessionEndReason::Inactivity && reps < ctx.config.min_session_reps {
        debug!(
            "ACTIVE: {} reps below minimum {}, not reported",
            reps, ctx.config.min_session_reps
        );
        return;
    }
    let status = ctx.device.status_packet();
    ctx.send(status);
}

fn active_update(ctx: &mut FsmContext) -> Option<StateId> {
    if !ctx.device.is_calibrated {
        ctx.end_reason = Some(SessionEndReason::Recalibration);
        return Some(StateId::Uncalibrated);
    }

    let idle_ms = ctx.now_ms.saturating_sub(ctx.device.last_activity_ms);
    if idle_ms > u64::from(ctx.config.inactivity_timeout_ms) {
        info!("ACTIVE: no activity for {idle_ms} ms");
        ctx.end_reason = Some(SessionEndReason::Inactivity);
        return Some(StateId::Idle);
    }

    None
}
