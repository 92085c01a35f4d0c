//! Row-major grid storage and neighborhood predicates shared by every field.

use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// A cell position as `(line, column)`; `line` is the y axis.
///
/// Components are signed so that neighborhood modifiers can be added without
/// intermediate casts; grids reject out-of-range values on access.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Coordinate {
    pub lin: i32,
    pub col: i32,
}

impl Coordinate {
    /// Construct a new coordinate.
    #[must_use]
    pub const fn new(lin: i32, col: i32) -> Self {
        Self { lin, col }
    }

    /// Returns this coordinate displaced by `modifier`.
    #[must_use]
    pub const fn offset(self, modifier: Coordinate) -> Self {
        Self {
            lin: self.lin + modifier.lin,
            col: self.col + modifier.col,
        }
    }
}

/// The four axial neighborhood modifiers, in scan order.
pub const AXIAL_MODIFIERS: [Coordinate; 4] = [
    Coordinate::new(-1, 0),
    Coordinate::new(0, -1),
    Coordinate::new(0, 1),
    Coordinate::new(1, 0),
];

/// The eight Moore neighborhood modifiers, in scan order.
pub const MOORE_MODIFIERS: [Coordinate; 8] = [
    Coordinate::new(-1, -1),
    Coordinate::new(-1, 0),
    Coordinate::new(-1, 1),
    Coordinate::new(0, -1),
    Coordinate::new(0, 1),
    Coordinate::new(1, -1),
    Coordinate::new(1, 0),
    Coordinate::new(1, 1),
];

/// Structural classification of an environment cell.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum CellKind {
    #[default]
    Empty,
    Obstacle,
}

/// Classification of a cell in the exits-only grid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ExitCellKind {
    #[default]
    Empty,
    Exit,
    /// An exit rendered impassable by the surrounding fire.
    BlockedExit,
}

/// Fire-proximity classification of a cell.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum RiskKind {
    #[default]
    NonRisky,
    /// Close to fire but walkable at a penalty.
    Risky,
    /// Treated as impassable by pedestrians.
    Danger,
}

/// Dense row-major grid of `lines x columns` cells.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Grid<T> {
    lines: usize,
    columns: usize,
    cells: Vec<T>,
}

impl<T: Copy> Grid<T> {
    /// Construct a grid with every cell initialised to `initial`.
    #[must_use]
    pub fn new(lines: usize, columns: usize, initial: T) -> Self {
        Self {
            lines,
            columns,
            cells: vec![initial; lines * columns],
        }
    }

    /// Number of lines.
    #[must_use]
    pub const fn lines(&self) -> usize {
        self.lines
    }

    /// Number of columns.
    #[must_use]
    pub const fn columns(&self) -> usize {
        self.columns
    }

    #[inline]
    fn flat(&self, at: Coordinate) -> usize {
        debug_assert!(self.in_bounds(at), "coordinate out of bounds: {at:?}");
        at.lin as usize * self.columns + at.col as usize
    }

    /// Whether `lin` is a valid line index.
    #[inline]
    #[must_use]
    pub fn in_lines(&self, lin: i32) -> bool {
        lin >= 0 && (lin as usize) < self.lines
    }

    /// Whether `col` is a valid column index.
    #[inline]
    #[must_use]
    pub fn in_columns(&self, col: i32) -> bool {
        col >= 0 && (col as usize) < self.columns
    }

    /// Whether `at` addresses a cell of this grid.
    #[inline]
    #[must_use]
    pub fn in_bounds(&self, at: Coordinate) -> bool {
        self.in_lines(at.lin) && self.in_columns(at.col)
    }

    /// Bounds-checked cell read.
    #[must_use]
    pub fn get(&self, at: Coordinate) -> Option<T> {
        if self.in_bounds(at) {
            Some(self.cells[self.flat(at)])
        } else {
            None
        }
    }

    /// Overwrite every cell with `value`.
    pub fn fill(&mut self, value: T) {
        self.cells.fill(value);
    }

    /// Copy the cells of `source` into this grid.
    ///
    /// Both grids must share dimensions.
    pub fn copy_from(&mut self, source: &Grid<T>) {
        debug_assert_eq!(self.lines, source.lines);
        debug_assert_eq!(self.columns, source.columns);
        self.cells.copy_from_slice(&source.cells);
    }

    /// Immutable access to the backing cells, row by row.
    #[must_use]
    pub fn cells(&self) -> &[T] {
        &self.cells
    }

    /// Adds every cell of `source` into this grid.
    ///
    /// Both grids must share dimensions.
    pub fn add_from(&mut self, source: &Grid<T>)
    where
        T: std::ops::AddAssign,
    {
        debug_assert_eq!(self.lines, source.lines);
        debug_assert_eq!(self.columns, source.columns);
        for (cell, &incoming) in self.cells.iter_mut().zip(&source.cells) {
            *cell += incoming;
        }
    }

    /// Iterate over every coordinate in scan order (top-left to
    /// bottom-right). The iterator owns the dimensions, so the grid may be
    /// mutated while walking it.
    pub fn coordinates(&self) -> impl Iterator<Item = Coordinate> {
        let lines = self.lines;
        let columns = self.columns;
        (0..lines).flat_map(move |lin| {
            (0..columns).map(move |col| Coordinate::new(lin as i32, col as i32))
        })
    }
}

impl<T: Copy> Index<Coordinate> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, at: Coordinate) -> &T {
        let flat = self.flat(at);
        &self.cells[flat]
    }
}

impl<T: Copy> IndexMut<Coordinate> for Grid<T> {
    #[inline]
    fn index_mut(&mut self, at: Coordinate) -> &mut T {
        let flat = self.flat(at);
        &mut self.cells[flat]
    }
}

/// Tests whether the diagonal step `origin -> origin + modifier` may be
/// crossed, given a predicate telling which cells are blocked.
///
/// A diagonal is impassable when both of its flanking axial cells are
/// blocked; with `prevent_corner_crossing`, one blocked flank suffices.
pub fn is_diagonal_valid(
    origin: Coordinate,
    modifier: Coordinate,
    prevent_corner_crossing: bool,
    blocked: impl Fn(Coordinate) -> bool,
) -> bool {
    let vertical = Coordinate::new(origin.lin + modifier.lin, origin.col);
    let horizontal = Coordinate::new(origin.lin, origin.col + modifier.col);

    let vertical_blocked = blocked(vertical);
    let horizontal_blocked = blocked(horizontal);

    if vertical_blocked && horizontal_blocked {
        return false;
    }
    if prevent_corner_crossing && (vertical_blocked || horizontal_blocked) {
        return false;
    }
    true
}
