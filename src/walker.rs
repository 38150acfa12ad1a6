use crate::grid::Grid;
use crate::schema::LayoutSpec;
use log::warn;

/// Consecutive empty rows that end a walk.
pub const EMPTY_ROW_STREAK: u32 = 3;

/// Lazily yields the rows to extract, starting at `layout.start_row`.
///
/// A row is empty when both its date cell and its market-total cell are
/// empty. Empty rows are skipped; the walk ends after [`EMPTY_ROW_STREAK`]
/// of them in a row, or when `layout.scan_end()` is reached.
pub struct GridWalker<'a, G: Grid + ?Sized> {
    grid: &'a G,
    layout: &'a LayoutSpec,
    row: u32,
    empty_streak: u32,
    hit_scan_limit: bool,
}

impl<'a, G: Grid + ?Sized> GridWalker<'a, G> {
    pub fn new(grid: &'a G, layout: &'a LayoutSpec) -> Self {
        Self {
            grid,
            layout,
            row: layout.start_row,
            empty_streak: 0,
            hit_scan_limit: false,
        }
    }

    /// True once the walk stopped because of the safety bound rather than
    /// an empty streak.
    pub fn hit_scan_limit(&self) -> bool {
        self.hit_scan_limit
    }

    fn is_empty_row(&self, row: u32) -> bool {
        self.grid.is_empty_at(row, self.layout.date_column)
            && self.grid.is_empty_at(row, self.layout.market_total_column)
    }
}

impl<G: Grid + ?Sized> Iterator for GridWalker<'_, G> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        while self.empty_streak < EMPTY_ROW_STREAK {
            if self.row >= self.layout.scan_end() {
                if !self.hit_scan_limit {
                    self.hit_scan_limit = true;
                    warn!(
                        "[{}] Stopped at row {}: no {} consecutive empty rows within {} rows of start",
                        self.layout.dataset, self.row, EMPTY_ROW_STREAK, self.layout.scan_limit
                    );
                }
                return None;
            }

            let row = self.row;
            self.row += 1;

            if self.is_empty_row(row) {
                self.empty_streak += 1;
                continue;
            }

            self.empty_streak = 0;
            return Some(row);
        }

        None
    }
}
