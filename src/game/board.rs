//! The 100-cell track and its snakes & ladders.

use serde::{Deserialize, Serialize};

/// Last cell of the track. Landing here exactly wins.
pub const FINISH: u8 = 100;

/// Snake heads mapped to their tails.
pub const SNAKES: [(u8, u8); 8] = [
    (99, 41),
    (95, 77),
    (89, 53),
    (66, 45),
    (54, 31),
    (43, 18),
    (40, 3),
    (27, 5),
];

/// Ladder feet mapped to their tops.
pub const LADDERS: [(u8, u8); 6] = [(4, 25), (13, 46), (42, 63), (50, 69), (62, 81), (74, 92)];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShortcutKind {
    Snake,
    Ladder,
}

/// One entry of the shortcut table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortcut {
    pub from: u8,
    pub to: u8,
    pub kind: ShortcutKind,
}

/// Every shortcut, snakes first.
pub fn shortcuts() -> impl Iterator<Item = Shortcut> {
    let snakes = SNAKES.iter().map(|&(from, to)| Shortcut {
        from,
        to,
        kind: ShortcutKind::Snake,
    });
    let ladders = LADDERS.iter().map(|&(from, to)| Shortcut {
        from,
        to,
        kind: ShortcutKind::Ladder,
    });
    snakes.chain(ladders)
}

/// The shortcut whose source is `cell`, if any.
pub fn shortcut_at(cell: u8) -> Option<Shortcut> {
    shortcuts().find(|s| s.from == cell)
}

/// Board-effective resting cell for `cell`. Applied once per roll; a
/// destination is never itself re-resolved.
pub fn resolve_landing(cell: u8) -> u8 {
    shortcut_at(cell).map_or(cell, |s| s.to)
}

/// Outcome of moving `steps` cells from `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClampedMove {
    /// The move would pass cell 100; the die is wasted.
    pub overshoot: bool,
    /// Cell reached before shortcut resolution (`start` on overshoot).
    pub end: u8,
}

/// Bust rule: a move past [`FINISH`] is forfeited, never partially applied.
pub fn clamp_move(start: u8, steps: u8) -> ClampedMove {
    let target = u16::from(start) + u16::from(steps);
    if target > u16::from(FINISH) {
        ClampedMove {
            overshoot: true,
            end: start,
        }
    } else {
        ClampedMove {
            overshoot: false,
            end: target as u8,
        }
    }
}

/// Everything a client needs to animate one roll locally.
///
/// Only `final_cell` is ever written to the store; `path` exists for the
/// animation and is thrown away afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovePlan {
    pub start: u8,
    pub die: u8,
    pub overshoot: bool,
    /// Cells visited one step at a time, excluding `start`.
    pub path: Vec<u8>,
    pub shortcut: Option<Shortcut>,
    pub final_cell: u8,
    pub wins: bool,
}

impl MovePlan {
    /// Cells to display in order, including a trailing shortcut jump.
    pub fn frames(&self) -> Vec<u8> {
        let mut frames = self.path.clone();
        if let Some(s) = self.shortcut {
            frames.push(s.to);
        }
        frames
    }
}

pub fn plan_move(start: u8, die: u8) -> MovePlan {
    let clamped = clamp_move(start, die);
    if clamped.overshoot {
        return MovePlan {
            start,
            die,
            overshoot: true,
            path: Vec::new(),
            shortcut: None,
            final_cell: start,
            wins: false,
        };
    }

    let path: Vec<u8> = (start + 1..=clamped.end).collect();
    let shortcut = shortcut_at(clamped.end);
    let final_cell = resolve_landing(clamped.end);

    MovePlan {
        start,
        die,
        overshoot: false,
        path,
        shortcut,
        final_cell,
        wins: final_cell == FINISH,
    }
}
