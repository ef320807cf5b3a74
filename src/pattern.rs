//! Pattern tags written onto stitches by external pattern-DSL evaluation (out of scope here),
//! and interpreted by `bed::interpret` during the action and pattern-target-rewrite passes (§6).

/// A stitch's `pattern` tag. Default is `Stitch` (plain knit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Pattern {
    Stitch = 1,
    Purl = 2,
    Tuck = 3,
    Miss = 4,
    FrontMoveRight1 = 5,
    FrontMoveRight2 = 6,
    FrontMoveLeft1 = 7,
    FrontMoveLeft2 = 8,
    BackMoveRight1 = 9,
    BackMoveRight2 = 10,
    BackMoveLeft1 = 11,
    BackMoveLeft2 = 12,
    CrossRightUpper = 13,
    CrossRightLower = 14,
    CrossLeftUpper = 15,
    CrossLeftLower = 16,
    Stack = 17,
}

impl Default for Pattern {
    fn default() -> Self {
        Pattern::Stitch
    }
}

impl Pattern {
    pub fn from_tag(tag: i32) -> Self {
        match tag {
            1 => Pattern::Stitch,
            2 => Pattern::Purl,
            3 => Pattern::Tuck,
            4 => Pattern::Miss,
            5 => Pattern::FrontMoveRight1,
            6 => Pattern::FrontMoveRight2,
            7 => Pattern::FrontMoveLeft1,
            8 => Pattern::FrontMoveLeft2,
            9 => Pattern::BackMoveRight1,
            10 => Pattern::BackMoveRight2,
            11 => Pattern::BackMoveLeft1,
            12 => Pattern::BackMoveLeft2,
            13 => Pattern::CrossRightUpper,
            14 => Pattern::CrossRightLower,
            15 => Pattern::CrossLeftUpper,
            16 => Pattern::CrossLeftLower,
            17 => Pattern::Stack,
            _ => Pattern::Stitch,
        }
    }

    pub fn tag(self) -> i32 {
        self as i32
    }

    /// reverse-action patterns (§6): rendered as PURL rather than KNIT when regular
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Pattern::Purl
                | Pattern::BackMoveRight1
                | Pattern::BackMoveRight2
                | Pattern::BackMoveLeft1
                | Pattern::BackMoveLeft2
        )
    }

    pub fn is_move(self) -> bool {
        matches!(
            self,
            Pattern::FrontMoveRight1
                | Pattern::FrontMoveRight2
                | Pattern::FrontMoveLeft1
                | Pattern::FrontMoveLeft2
                | Pattern::BackMoveRight1
                | Pattern::BackMoveRight2
                | Pattern::BackMoveLeft1
                | Pattern::BackMoveLeft2
        )
    }

    pub fn is_cross(self) -> bool {
        matches!(
            self,
            Pattern::CrossRightUpper
                | Pattern::CrossRightLower
                | Pattern::CrossLeftUpper
                | Pattern::CrossLeftLower
        )
    }

    pub fn is_miss(self) -> bool {
        matches!(self, Pattern::Miss)
    }

    /// (direction, steps) for a move pattern, in course-order units
    pub fn move_step(self) -> Option<(i32, i32)> {
        match self {
            Pattern::FrontMoveRight1 | Pattern::BackMoveRight1 => Some((1, 1)),
            Pattern::FrontMoveRight2 | Pattern::BackMoveRight2 => Some((1, 2)),
            Pattern::FrontMoveLeft1 | Pattern::BackMoveLeft1 => Some((-1, 1)),
            Pattern::FrontMoveLeft2 | Pattern::BackMoveLeft2 => Some((-1, 2)),
            _ => None,
        }
    }

    /// the complementary cross type this pattern pairs with (§6: 13<->16, 14<->15)
    pub fn cross_complement(self) -> Option<Pattern> {
        match self {
            Pattern::CrossRightUpper => Some(Pattern::CrossLeftLower),
            Pattern::CrossLeftLower => Some(Pattern::CrossRightUpper),
            Pattern::CrossRightLower => Some(Pattern::CrossLeftUpper),
            Pattern::CrossLeftUpper => Some(Pattern::CrossRightLower),
            _ => None,
        }
    }

    /// cross traversal direction: right-side patterns walk the course left-to-right, left-side
    /// patterns walk right-to-left, matching the "first part" scan direction in §4.G.
    pub fn cross_direction(self) -> Option<i32> {
        match self {
            Pattern::CrossRightUpper | Pattern::CrossRightLower => Some(1),
            Pattern::CrossLeftUpper | Pattern::CrossLeftLower => Some(-1),
            _ => None,
        }
    }
}
