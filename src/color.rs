//! Color - the four-valued tri-color tag and its per-type permutation table.
//!
//! A cell's color is stored as a *physical* index in `0..4`. What that index
//! *means* (WHITE/ECRU/GREY/BLACK) is decided by a permutation table that
//! rotates at every flip, per type (each `Treadmill` owns one `ColorTable`;
//! see `original_source/tread.h`'s `tm_tread` struct, which embeds `c`/`c1`
//! directly rather than sharing one table process-wide).

use std::fmt;

/// Logical color. `Total` is not a real cell color; it indexes the
/// accounting slot that always equals the sum of the other four.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Color {
    White = 0,
    Ecru = 1,
    Grey = 2,
    Black = 3,
}

impl Color {
    pub const ALL: [Color; 4] = [Color::White, Color::Ecru, Color::Grey, Color::Black];

    #[inline]
    pub fn index(self) -> usize {
        self as u8 as usize
    }

    #[inline]
    pub fn from_index(i: u8) -> Color {
        match i {
            0 => Color::White,
            1 => Color::Ecru,
            2 => Color::Grey,
            3 => Color::Black,
            _ => panic!("invalid physical color index {i}"),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Color::White => "WHITE",
            Color::Ecru => "ECRU",
            Color::Grey => "GREY",
            Color::Black => "BLACK",
        };
        f.write_str(name)
    }
}

/// `c`: logical -> physical, and `c1`: physical -> logical, kept as exact
/// inverses of each other at all times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorTable {
    c: [u8; 4],
    c1: [u8; 4],
}

impl Default for ColorTable {
    fn default() -> Self {
        Self {
            c: [0, 1, 2, 3],
            c1: [0, 1, 2, 3],
        }
    }
}

impl ColorTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn to_physical(&self, logical: Color) -> u8 {
        self.c[logical.index()]
    }

    #[inline]
    pub fn to_logical(&self, physical: u8) -> Color {
        Color::from_index(self.c1[physical as usize])
    }

    /// Rotates the permutation at a flip: the previous BLACK becomes ECRU,
    /// the previous ECRU becomes WHITE, the previous GREY becomes BLACK, and
    /// the previous WHITE is released into GREY. No cell's physical tag is
    /// touched; only its *meaning* changes, which is why a flip is O(1)
    /// regardless of heap size.
    pub fn rotate(&mut self) {
        let old = self.c;
        self.c[Color::White.index()] = old[Color::Ecru.index()];
        self.c[Color::Ecru.index()] = old[Color::Black.index()];
        self.c[Color::Grey.index()] = old[Color::White.index()];
        self.c[Color::Black.index()] = old[Color::Grey.index()];

        for logical in Color::ALL {
            self.c1[self.c[logical.index()] as usize] = logical.index() as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_round_trips() {
        let t = ColorTable::new();
        for c in Color::ALL {
            assert_eq!(t.to_logical(t.to_physical(c)), c);
        }
    }

    #[test]
    fn rotate_is_a_bijection_every_step() {
        let mut t = ColorTable::new();
        for _ in 0..9 {
            t.rotate();
            for c in Color::ALL {
                assert_eq!(t.to_logical(t.to_physical(c)), c);
            }
        }
    }

    #[test]
    fn rotate_has_period_four() {
        let mut t = ColorTable::new();
        let start = t;
        for _ in 0..4 {
            t.rotate();
        }
        assert_eq!(t, start);
    }

    #[test]
    fn rotate_moves_black_to_ecru() {
        let mut t = ColorTable::new();
        let black_phys = t.to_physical(Color::Black);
        t.rotate();
        assert_eq!(t.to_logical(black_phys), Color::Ecru);
    }
}
