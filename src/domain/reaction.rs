//! Thumb reactions and the per-rater transition table.
//!
//! A rater's stance toward a todo is never stored as such. It is read off
//! the rater's `liked` / `notLiked` sets every time, which is what makes a
//! repeated request a toggle and lets skew left by a half-applied update
//! heal on the next request.

use serde::{Deserialize, Serialize};

/// Requested reaction. Also names the user set (`liked` / `notLiked`) and
/// the todo counter (`thumbs_up` / `thumbs_down`) that belong to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reaction {
    #[serde(rename = "thumbUp")]
    Up,
    #[serde(rename = "thumbDown")]
    Down,
}

impl Reaction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "thumbUp" => Some(Reaction::Up),
            "thumbDown" => Some(Reaction::Down),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Reaction::Up => "thumbUp",
            Reaction::Down => "thumbDown",
        }
    }

    /// Storage key of the user set this reaction lives in.
    pub fn set_name(&self) -> &'static str {
        match self {
            Reaction::Up => "liked",
            Reaction::Down => "not_liked",
        }
    }

    /// Column of the todo counter this reaction feeds.
    pub fn counter_column(&self) -> &'static str {
        match self {
            Reaction::Up => "thumbs_up",
            Reaction::Down => "thumbs_down",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionState {
    None,
    Liked,
    Disliked,
}

impl ReactionState {
    /// Derive the current state from set membership.
    ///
    /// Membership in both sets cannot be produced by the engine; if it is
    /// found anyway the state leans toward the request so the resulting
    /// transition pulls one of the duplicates.
    pub fn from_membership(in_liked: bool, in_not_liked: bool, request: Reaction) -> Self {
        match (in_liked, in_not_liked) {
            (false, false) => ReactionState::None,
            (true, false) => ReactionState::Liked,
            (false, true) => ReactionState::Disliked,
            (true, true) => match request {
                Reaction::Up => ReactionState::Liked,
                Reaction::Down => ReactionState::Disliked,
            },
        }
    }

    fn holding(&self) -> Option<Reaction> {
        match self {
            ReactionState::None => None,
            ReactionState::Liked => Some(Reaction::Up),
            ReactionState::Disliked => Some(Reaction::Down),
        }
    }

    fn from_holding(reaction: Option<Reaction>) -> Self {
        match reaction {
            None => ReactionState::None,
            Some(Reaction::Up) => ReactionState::Liked,
            Some(Reaction::Down) => ReactionState::Disliked,
        }
    }
}

/// One row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ReactionState,
    pub to: ReactionState,
    /// Set (and counter) the rater leaves.
    pub leave: Option<Reaction>,
    /// Set (and counter) the rater enters.
    pub enter: Option<Reaction>,
}

impl Transition {
    pub fn next(from: ReactionState, request: Reaction) -> Self {
        let current = from.holding();
        let (leave, enter) = match current {
            // Same reaction again: toggle off.
            Some(held) if held == request => (Some(held), None),
            Some(held) => (Some(held), Some(request)),
            None => (None, Some(request)),
        };

        Self {
            from,
            to: ReactionState::from_holding(enter),
            leave,
            enter,
        }
    }

    fn delta(&self, counter: Reaction) -> i64 {
        let mut delta = 0;
        if self.leave == Some(counter) {
            delta -= 1;
        }
        if self.enter == Some(counter) {
            delta += 1;
        }
        delta
    }

    pub fn thumbs_up_delta(&self) -> i64 {
        self.delta(Reaction::Up)
    }

    pub fn thumbs_down_delta(&self) -> i64 {
        self.delta(Reaction::Down)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ReactionState::*;

    #[test]
    fn test_full_transition_table() {
        let table = [
            (None, Reaction::Up, Liked, 1, 0),
            (None, Reaction::Down, Disliked, 0, 1),
            (Liked, Reaction::Up, None, -1, 0),
            (Liked, Reaction::Down, Disliked, -1, 1),
            (Disliked, Reaction::Down, None, 0, -1),
            (Disliked, Reaction::Up, Liked, 1, -1),
        ];

        for (from, request, to, up, down) in table {
            let t = Transition::next(from, request);
            assert_eq!(t.to, to, "{from:?} + {request:?}");
            assert_eq!(t.thumbs_up_delta(), up, "{from:?} + {request:?}");
            assert_eq!(t.thumbs_down_delta(), down, "{from:?} + {request:?}");
        }
    }

    #[test]
    fn test_switch_leaves_before_entering() {
        let t = Transition::next(Liked, Reaction::Down);
        assert_eq!(t.leave, Some(Reaction::Up));
        assert_eq!(t.enter, Some(Reaction::Down));
    }

    #[test]
    fn test_toggle_has_no_enter() {
        let t = Transition::next(Disliked, Reaction::Down);
        assert_eq!(t.leave, Some(Reaction::Down));
        assert_eq!(t.enter, Option::None);
    }

    #[test]
    fn test_state_from_membership() {
        assert_eq!(ReactionState::from_membership(false, false, Reaction::Up), None);
        assert_eq!(ReactionState::from_membership(true, false, Reaction::Down), Liked);
        assert_eq!(ReactionState::from_membership(false, true, Reaction::Up), Disliked);
    }

    #[test]
    fn test_corrupt_membership_resolves_toward_request() {
        let up = ReactionState::from_membership(true, true, Reaction::Up);
        assert_eq!(up, Liked);
        assert_eq!(Transition::next(up, Reaction::Up).leave, Some(Reaction::Up));

        let down = ReactionState::from_membership(true, true, Reaction::Down);
        assert_eq!(down, Disliked);
    }

    #[test]
    fn test_parse_wire_names() {
        assert_eq!(Reaction::parse("thumbUp"), Some(Reaction::Up));
        assert_eq!(Reaction::parse("thumbDown"), Some(Reaction::Down));
        assert_eq!(Reaction::parse("thumbSideways"), Option::None);
        assert_eq!(Reaction::Up.as_str(), "thumbUp");
    }
}
