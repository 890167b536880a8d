use std::fmt;

pub mod protocol;

pub use protocol::{
    ClientMessage, ErrorCode, ObstacleState, PlayerState, ProtocolError, ServerMessage, Snapshot,
};

/// Default UDP port the server listens on.
pub const DEFAULT_PORT: u16 = 4321;

/// Number of player slots in a match.
pub const MAX_PLAYERS: usize = 2;

/// One of the two player slots. Slot 1 is always handed out before slot 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PlayerId {
    One,
    Two,
}

impl PlayerId {
    pub const ALL: [PlayerId; MAX_PLAYERS] = [PlayerId::One, PlayerId::Two];

    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(PlayerId::One),
            2 => Some(PlayerId::Two),
            _ => None,
        }
    }

    /// Wire number, 1 or 2.
    pub fn number(self) -> u8 {
        match self {
            PlayerId::One => 1,
            PlayerId::Two => 2,
        }
    }

    /// Zero-based index into per-player arrays.
    pub fn index(self) -> usize {
        usize::from(self.number() - 1)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Axis-aligned box anchored at its bottom-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Aabb {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Aabb {
    /// Negative extents are clamped to zero.
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            x,
            y,
            w: w.max(0.0),
            h: h.max(0.0),
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    pub fn top(&self) -> f32 {
        self.y + self.h
    }

    /// Strict interval intersection on both axes: boxes that only touch along
    /// an edge do not overlap.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.top()
            && self.top() > other.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_player_id_numbers() {
        assert_eq!(PlayerId::One.number(), 1);
        assert_eq!(PlayerId::Two.number(), 2);
        assert_eq!(PlayerId::One.index(), 0);
        assert_eq!(PlayerId::Two.index(), 1);
        assert_eq!(PlayerId::from_number(2), Some(PlayerId::Two));
        assert_eq!(PlayerId::from_number(0), None);
        assert_eq!(PlayerId::from_number(3), None);
        assert_eq!(PlayerId::Two.to_string(), "2");
    }

    #[test]
    fn test_aabb_edges() {
        let b = Aabb::new(10.0, 20.0, 30.0, 40.0);
        assert_approx_eq!(b.right(), 40.0);
        assert_approx_eq!(b.top(), 60.0);
    }

    #[test]
    fn test_aabb_negative_extent_clamped() {
        let b = Aabb::new(0.0, 0.0, -5.0, -1.0);
        assert_eq!(b.w, 0.0);
        assert_eq!(b.h, 0.0);
    }

    #[test]
    fn test_collision_detection_overlap() {
        let a = Aabb::new(0.0, 0.0, 32.0, 32.0);
        let b = Aabb::new(16.0, 16.0, 32.0, 32.0);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
    }

    #[test]
    fn test_collision_detection_no_collision() {
        let a = Aabb::new(0.0, 0.0, 32.0, 32.0);
        let b = Aabb::new(100.0, 100.0, 32.0, 32.0);
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn test_collision_detection_exact_touch() {
        let a = Aabb::new(0.0, 0.0, 32.0, 32.0);
        let right = Aabb::new(32.0, 0.0, 32.0, 32.0);
        let above = Aabb::new(0.0, 32.0, 32.0, 32.0);
        assert!(!a.overlaps(&right));
        assert!(!a.overlaps(&above));
    }

    #[test]
    fn test_zero_sized_box_inside_and_on_edge() {
        let a = Aabb::new(0.0, 0.0, 32.0, 32.0);
        let point = Aabb::new(16.0, 16.0, 0.0, 0.0);
        assert!(a.overlaps(&point));
        let edge_point = Aabb::new(32.0, 16.0, 0.0, 0.0);
        assert!(!a.overlaps(&edge_point));
    }
}
