//! Softlock detection: repetition watching over perception streams.
//!
//! Short rolling windows of position, menu, dialogue, and battle state are
//! scanned each tick for the four stall signatures. Detections are typed
//! events with evidence and duration; the core records each as a
//! High-severity inconsistency and hands it to the recovery manager.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::snapshot::{BattleObservation, Position};

/// Battle-stall coverage tolerance: the window counts as "whole" once its
/// span is within this many seconds of the configured length.
const FULL_WINDOW_SLACK: f64 = 1.0;

/// The four stall signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoftlockKind {
    PositionDeadlock,
    MenuLoop,
    DialogueSpam,
    BattleStall,
}

impl SoftlockKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::PositionDeadlock => "position-deadlock",
            Self::MenuLoop => "menu-loop",
            Self::DialogueSpam => "dialogue-spam",
            Self::BattleStall => "battle-stall",
        }
    }
}

impl std::fmt::Display for SoftlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A detected stall, with what was observed and for how long.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftlockEvent {
    pub kind: SoftlockKind,
    pub evidence: String,
    /// Seconds the repeating observation spans.
    pub duration: f64,
}

/// Window lengths and repetition limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftlockConfig {
    pub position_window_secs: f64,
    pub menu_window_secs: f64,
    pub dialogue_window_secs: f64,
    pub battle_window_secs: f64,
    /// Identical positions must span more than this before alarming.
    pub position_deadlock_secs: f64,
    /// A menu state repeating more than this many times is a loop.
    pub menu_repeat_limit: usize,
    /// A dialogue payload repeating more than this many times is spam.
    pub dialogue_repeat_limit: usize,
}

impl Default for SoftlockConfig {
    fn default() -> Self {
        Self {
            position_window_secs: 10.0,
            menu_window_secs: 10.0,
            dialogue_window_secs: 10.0,
            battle_window_secs: 30.0,
            position_deadlock_secs: 3.0,
            menu_repeat_limit: 5,
            dialogue_repeat_limit: 10,
        }
    }
}

/// Rolling-window stall detector.
#[derive(Debug, Clone)]
pub struct SoftlockDetector {
    config: SoftlockConfig,
    position: VecDeque<(f64, Position)>,
    menu: VecDeque<(f64, String)>,
    dialogue: VecDeque<(f64, String)>,
    battle: VecDeque<(f64, BattleObservation)>,
}

impl SoftlockDetector {
    pub fn new(config: SoftlockConfig) -> Self {
        Self {
            config,
            position: VecDeque::new(),
            menu: VecDeque::new(),
            dialogue: VecDeque::new(),
            battle: VecDeque::new(),
        }
    }

    pub fn record_position(&mut self, now: f64, position: Position) {
        self.position.push_back((now, position));
        prune(&mut self.position, now, self.config.position_window_secs);
    }

    pub fn record_menu(&mut self, now: f64, state: String) {
        self.menu.push_back((now, state));
        prune(&mut self.menu, now, self.config.menu_window_secs);
    }

    pub fn record_dialogue(&mut self, now: f64, payload: String) {
        self.dialogue.push_back((now, payload));
        prune(&mut self.dialogue, now, self.config.dialogue_window_secs);
    }

    pub fn record_battle(&mut self, now: f64, observation: BattleObservation) {
        self.battle.push_back((now, observation));
        prune(&mut self.battle, now, self.config.battle_window_secs);
    }

    /// Scan all windows for stall signatures.
    pub fn detect(&mut self, now: f64) -> Vec<SoftlockEvent> {
        prune(&mut self.position, now, self.config.position_window_secs);
        prune(&mut self.menu, now, self.config.menu_window_secs);
        prune(&mut self.dialogue, now, self.config.dialogue_window_secs);
        prune(&mut self.battle, now, self.config.battle_window_secs);

        let mut events = Vec::new();

        if let Some(event) = self.position_deadlock() {
            events.push(event);
        }
        if let Some(event) = repetition(&self.menu, self.config.menu_repeat_limit, SoftlockKind::MenuLoop) {
            events.push(event);
        }
        if let Some(event) = repetition(
            &self.dialogue,
            self.config.dialogue_repeat_limit,
            SoftlockKind::DialogueSpam,
        ) {
            events.push(event);
        }
        if let Some(event) = self.battle_stall() {
            events.push(event);
        }

        for event in &events {
            tracing::warn!(kind = %event.kind, duration = event.duration, "softlock detected");
        }
        events
    }

    /// Deadlock iff every sampled position in the window is identical and the
    /// samples span more than the configured threshold. A single differing
    /// sample anywhere in the window prevents the alarm.
    fn position_deadlock(&self) -> Option<SoftlockEvent> {
        let (first_at, first_pos) = self.position.front()?;
        let (last_at, _) = self.position.back()?;
        let span = last_at - first_at;
        if span <= self.config.position_deadlock_secs {
            return None;
        }
        if self.position.iter().any(|(_, p)| p != first_pos) {
            return None;
        }
        Some(SoftlockEvent {
            kind: SoftlockKind::PositionDeadlock,
            evidence: format!("{} samples pinned at {first_pos}", self.position.len()),
            duration: span,
        })
    }

    /// Stall iff the window covers its full span and neither the turn counter
    /// nor either side's health changed across it.
    fn battle_stall(&self) -> Option<SoftlockEvent> {
        let (first_at, first) = self.battle.front()?;
        let (last_at, _) = self.battle.back()?;
        let span = last_at - first_at;
        if span + FULL_WINDOW_SLACK < self.config.battle_window_secs {
            return None;
        }
        let frozen = self.battle.iter().all(|(_, obs)| {
            obs.turn == first.turn && obs.own_hp == first.own_hp && obs.opp_hp == first.opp_hp
        });
        if !frozen {
            return None;
        }
        Some(SoftlockEvent {
            kind: SoftlockKind::BattleStall,
            evidence: format!(
                "turn {} / hp {:.2} vs {:.2} frozen",
                first.turn, first.own_hp, first.opp_hp
            ),
            duration: span,
        })
    }
}

fn prune<T>(window: &mut VecDeque<(f64, T)>, now: f64, window_secs: f64) {
    while let Some((at, _)) = window.front() {
        if now - at > window_secs {
            window.pop_front();
        } else {
            break;
        }
    }
}

/// Loop/spam detection: any single payload repeating more than `limit` times.
fn repetition(
    window: &VecDeque<(f64, String)>,
    limit: usize,
    kind: SoftlockKind,
) -> Option<SoftlockEvent> {
    let mut counts: BTreeMap<&str, (usize, f64, f64)> = BTreeMap::new();
    for (at, payload) in window {
        let entry = counts.entry(payload.as_str()).or_insert((0, *at, *at));
        entry.0 += 1;
        entry.2 = *at;
    }
    counts
        .into_iter()
        .find(|(_, (count, _, _))| *count > limit)
        .map(|(payload, (count, first, last))| SoftlockEvent {
            kind,
            evidence: format!("\"{payload}\" repeated {count} times"),
            duration: last - first,
        })
}
