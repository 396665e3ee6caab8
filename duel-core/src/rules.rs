//! Board representation and pluggable win/draw evaluation.
//!
//! The coordinator never inspects lines itself; it asks the injected
//! [`GameRules`] after every accepted move. [`TicTacToe`] is the reference
//! policy.

use duel_sdk::objects::Marker;
use smallvec::SmallVec;

/// Inline capacity of a board; covers the 3×3 reference grid without
/// allocating.
const INLINE_CELLS: usize = 9;

/// Row-major grid of cell markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    rows: u8,
    cols: u8,
    cells: SmallVec<[Option<Marker>; INLINE_CELLS]>,
}

/// Reasons a placement is refused by the board itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PlaceError {
    OutOfRange,
    Occupied,
}

impl Board {
    /// An empty `rows × cols` board.
    pub fn new(rows: u8, cols: u8) -> Self {
        let len = usize::from(rows) * usize::from(cols);
        Self {
            rows,
            cols,
            cells: SmallVec::from_elem(None, len),
        }
    }

    /// Build a board from explicit cells. Returns `None` if the cell count
    /// does not match the dimensions.
    pub fn from_cells(
        rows: u8,
        cols: u8,
        cells: impl IntoIterator<Item = Option<Marker>>,
    ) -> Option<Self> {
        let cells: SmallVec<[Option<Marker>; INLINE_CELLS]> = cells.into_iter().collect();
        (cells.len() == usize::from(rows) * usize::from(cols)).then_some(Self { rows, cols, cells })
    }

    pub fn rows(&self) -> u8 {
        self.rows
    }

    pub fn cols(&self) -> u8 {
        self.cols
    }

    pub fn cells(&self) -> &[Option<Marker>] {
        &self.cells
    }

    /// Marker at `index`; `None` if the index is outside the board.
    pub fn cell(&self, index: usize) -> Option<Option<Marker>> {
        self.cells.get(index).copied()
    }

    /// Row-major index of (`row`, `col`), if it lies on the board.
    pub fn index_of(&self, row: u8, col: u8) -> Option<usize> {
        (row < self.rows && col < self.cols)
            .then(|| usize::from(row) * usize::from(self.cols) + usize::from(col))
    }

    pub fn occupied(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    pub(crate) fn place(&mut self, index: usize, marker: Marker) -> Result<(), PlaceError> {
        let cell = self.cells.get_mut(index).ok_or(PlaceError::OutOfRange)?;
        if cell.is_some() {
            return Err(PlaceError::Occupied);
        }
        *cell = Some(marker);
        Ok(())
    }
}

/// Win/draw policy for a grid game.
///
/// Implementations must be pure: the answer depends only on the board.
pub trait GameRules: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Board dimensions as (rows, cols).
    fn dimensions(&self) -> (u8, u8);

    /// Whether `marker` has won on `board`.
    fn evaluate_win(&self, board: &Board, marker: Marker) -> bool;

    /// Whether `board` is a finished game with no winner.
    fn evaluate_draw(&self, board: &Board) -> bool;

    /// A fresh board for a new match.
    fn new_board(&self) -> Board {
        let (rows, cols) = self.dimensions();
        Board::new(rows, cols)
    }
}

/// Classic 3×3 noughts and crosses.
#[derive(Debug, Clone, Copy, Default)]
pub struct TicTacToe;

impl TicTacToe {
    const LINES: [[usize; 3]; 8] = [
        [0, 1, 2],
        [3, 4, 5],
        [6, 7, 8],
        [0, 3, 6],
        [1, 4, 7],
        [2, 5, 8],
        [0, 4, 8],
        [2, 4, 6],
    ];
}

impl GameRules for TicTacToe {
    fn name(&self) -> &'static str {
        "tic-tac-toe"
    }

    fn dimensions(&self) -> (u8, u8) {
        (3, 3)
    }

    fn evaluate_win(&self, board: &Board, marker: Marker) -> bool {
        if board.rows() != 3 || board.cols() != 3 {
            return false;
        }
        Self::LINES.iter().any(|line| {
            line.iter()
                .all(|&index| board.cell(index) == Some(Some(marker)))
        })
    }

    fn evaluate_draw(&self, board: &Board) -> bool {
        board.is_full()
            && !self.evaluate_win(board, Marker::X)
            && !self.evaluate_win(board, Marker::O)
    }
}
