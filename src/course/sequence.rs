//! The `Course::sequence` grammar (§6), parsed bit-for-bit per the reference characters.
//!
//! A parse produces an ordered list of `(index, Side)` placements plus whether the course is
//! circular; `Course::sequence` turns that into stitches connected in sequence.

use crate::stitch::Side;
use anyhow::{bail, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Fixed(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dir {
    Right,
    Left,
}

impl Dir {
    fn sign(self) -> i32 {
        match self {
            Dir::Right => 1,
            Dir::Left => -1,
        }
    }
    fn invert(self) -> Dir {
        match self {
            Dir::Right => Dir::Left,
            Dir::Left => Dir::Right,
        }
    }
}

pub struct Parsed {
    pub placements: Vec<(i32, Side)>,
    pub circular: bool,
}

pub fn parse(grammar: &str, gauge: i32) -> Result<Parsed> {
    let mut side = Side::Front;
    let mut dir = Dir::Right;
    let mut step = Step::Fixed(1);
    let mut circular = false;
    let mut index = 0i32;
    let mut placements = Vec::new();

    let chars: Vec<char> = grammar.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            'F' | 'v' => side = Side::Front,
            'B' | '^' => side = Side::Back,
            '|' => side = Side::Both,
            'S' => side = side.other(),
            'C' => circular = true,
            'R' | '>' => dir = Dir::Right,
            'L' | '<' => dir = Dir::Left,
            'I' => dir = dir.invert(),
            'A' | 'E' => step = Step::Fixed(1),
            'H' => step = Step::Fixed(2),
            '/' => {
                let Step::Fixed(n) = step;
                step = Step::Fixed(n + 1);
            }
            '\\' => {
                let Step::Fixed(n) = step;
                step = Step::Fixed((n - 1).max(1));
            }
            ',' => {
                let Step::Fixed(n) = step;
                index += n * dir.sign();
            }
            '.' => {
                let Step::Fixed(n) = step;
                index += 2 * n * dir.sign();
            }
            '-' | '0'..='9' => {
                let invert = c == '-';
                let digit_start = if invert { i + 1 } else { i };
                if invert && !chars.get(digit_start).is_some_and(|c| c.is_ascii_digit()) {
                    bail!("InvalidSequenceChar: '-' not followed by a digit at byte {}", i);
                }
                let mut j = digit_start;
                while j < chars.len() && chars[j].is_ascii_digit() {
                    j += 1;
                }
                let count: i32 = chars[digit_start..j].iter().collect::<String>().parse()?;
                let effective = if invert { dir.invert() } else { dir };
                let Step::Fixed(n) = step;
                for _ in 0..count {
                    placements.push((index * gauge.max(1), side));
                    index += n * effective.sign();
                }
                i = j;
                continue;
            }
            other => bail!("InvalidSequenceChar: '{}'", other),
        }
        i += 1;
    }

    Ok(Parsed { placements, circular })
}
