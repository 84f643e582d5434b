//! Mount Supervisor
//!
//! The sandbox-side state machine that compiles, locates, mounts and verifies
//! a preview. The machine itself runs in the browsing context; this module
//! owns its definition (phases, events, legal transitions, retry schedule) and
//! hands it to the bootstrap script as data, so the table the sandbox follows
//! is the one tested here.

use serde::{Deserialize, Serialize};

use crate::locator::LocatorPlan;

/// Bootstrap executed last in the host document.
pub const SUPERVISOR_SCRIPT: &str = include_str!("runtime/supervisor.js");

/// Element the bootstrap creates for its diagnostic panel.
pub const DIAGNOSTIC_PANEL_ID: &str = "preview-diagnostic";

/// Utility classes carried by the throwaway element that nudges the style
/// engine into another pass.
pub const PROBE_CLASSES: &str =
    "hidden flex grid items-center gap-2 p-4 rounded-md border shadow-sm bg-primary text-primary-foreground";

// ═══════════════════════════════════════════════════════════════════════════════
// STATE MACHINE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MountPhase {
    Idle,
    Compiling,
    Locating,
    Mounted,
    LocateFailed,
    Verifying,
    Verified,
    Stalled,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MountEvent {
    Start,
    Compiled,
    CompileFailed,
    NotFound,
    Rendered,
    RenderThrew,
    DiagnosticShown,
    Observe,
    ContentSeen,
    AttemptsExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: MountPhase,
    pub event: MountEvent,
    pub to: MountPhase,
}

const TRANSITIONS: [Transition; 12] = [
    t(MountPhase::Idle, MountEvent::Start, MountPhase::Compiling),
    t(MountPhase::Compiling, MountEvent::Compiled, MountPhase::Locating),
    t(MountPhase::Compiling, MountEvent::CompileFailed, MountPhase::Failed),
    t(MountPhase::Locating, MountEvent::Rendered, MountPhase::Mounted),
    t(MountPhase::Locating, MountEvent::RenderThrew, MountPhase::Failed),
    t(MountPhase::Locating, MountEvent::NotFound, MountPhase::LocateFailed),
    t(MountPhase::LocateFailed, MountEvent::DiagnosticShown, MountPhase::Failed),
    t(MountPhase::Mounted, MountEvent::Observe, MountPhase::Verifying),
    t(MountPhase::Mounted, MountEvent::RenderThrew, MountPhase::Failed),
    t(MountPhase::Verifying, MountEvent::ContentSeen, MountPhase::Verified),
    t(MountPhase::Verifying, MountEvent::AttemptsExhausted, MountPhase::Stalled),
    // errors thrown by the mounted tree after verification began
    t(MountPhase::Verifying, MountEvent::RenderThrew, MountPhase::Failed),
];

const fn t(from: MountPhase, event: MountEvent, to: MountPhase) -> Transition {
    Transition { from, event, to }
}

pub fn transition_table() -> Vec<Transition> {
    TRANSITIONS.to_vec()
}

// ═══════════════════════════════════════════════════════════════════════════════
// VERIFY SCHEDULE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountAttempt {
    pub attempt_number: u32,
    pub delay_ms: u32,
    pub success: bool,
}

/// Bounded poll schedule for the `Verifying` phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifySchedule {
    delays_ms: Vec<u32>,
}

impl VerifySchedule {
    pub fn new(delays_ms: &[u32], cap: usize) -> Self {
        VerifySchedule {
            delays_ms: delays_ms.iter().copied().take(cap).collect(),
        }
    }

    pub fn attempts(&self) -> impl Iterator<Item = MountAttempt> + '_ {
        self.delays_ms
            .iter()
            .enumerate()
            .map(|(i, &delay_ms)| MountAttempt {
                attempt_number: i as u32 + 1,
                delay_ms,
                success: false,
            })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BOOT CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything the bootstrap script reads from the host document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootConfig<'a> {
    pub mount_id: &'a str,
    pub settle_delay_ms: u32,
    pub verify_delays_ms: Vec<u32>,
    pub transitions: Vec<Transition>,
    pub locator: &'a LocatorPlan,
    pub unresolved: &'a [String],
    pub probe_classes: &'static str,
    pub digest: &'a str,
}

impl<'a> BootConfig<'a> {
    pub fn new(
        mount_id: &'a str,
        settle_delay_ms: u32,
        schedule: &VerifySchedule,
        locator: &'a LocatorPlan,
        unresolved: &'a [String],
        digest: &'a str,
    ) -> Self {
        BootConfig {
            mount_id,
            settle_delay_ms,
            verify_delays_ms: schedule.attempts().map(|a| a.delay_ms).collect(),
            transitions: transition_table(),
            locator,
            unresolved,
            probe_classes: PROBE_CLASSES,
            digest,
        }
    }
}
