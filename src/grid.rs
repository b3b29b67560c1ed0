//! # Grid
//!
//! Dense `(frame, view)` array of image slots filled by the sampling passes.

/// A single grid entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot<T> {
    Empty,
    Filled(T),
}

impl<T> Slot<T> {
    pub fn is_filled(&self) -> bool {
        matches!(self, Slot::Filled(_))
    }

    pub fn as_ref(&self) -> Option<&T> {
        match self {
            Slot::Empty => None,
            Slot::Filled(value) => Some(value),
        }
    }
}

/// `n_frames × n_views` slots, stored frame-major.
///
/// View 0 holds the input camera, frame 0 the anchor frame.
#[derive(Debug, Clone)]
pub struct Grid<T> {
    n_frames: usize,
    n_views: usize,
    slots: Vec<Slot<T>>,
}

impl<T> Grid<T> {
    pub fn new(n_frames: usize, n_views: usize) -> Self {
        let slots = (0..n_frames * n_views).map(|_| Slot::Empty).collect();
        Self {
            n_frames,
            n_views,
            slots,
        }
    }

    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    pub fn n_views(&self) -> usize {
        self.n_views
    }

    fn index(&self, frame: usize, view: usize) -> usize {
        assert!(
            frame < self.n_frames && view < self.n_views,
            "slot ({frame}, {view}) outside a {}x{} grid",
            self.n_frames,
            self.n_views
        );
        frame * self.n_views + view
    }

    pub fn slot(&self, frame: usize, view: usize) -> &Slot<T> {
        &self.slots[self.index(frame, view)]
    }

    pub fn get(&self, frame: usize, view: usize) -> Option<&T> {
        self.slot(frame, view).as_ref()
    }

    pub fn is_filled(&self, frame: usize, view: usize) -> bool {
        self.slot(frame, view).is_filled()
    }

    /// Unconditionally stores `value`, replacing whatever was there.
    pub fn set(&mut self, frame: usize, view: usize, value: T) {
        let index = self.index(frame, view);
        self.slots[index] = Slot::Filled(value);
    }

    /// Stores `value` only when the slot is empty. Returns whether it was written.
    pub fn fill_if_empty(&mut self, frame: usize, view: usize, value: T) -> bool {
        let index = self.index(frame, view);
        match self.slots[index] {
            Slot::Empty => {
                self.slots[index] = Slot::Filled(value);
                true
            }
            Slot::Filled(_) => false,
        }
    }

    /// Number of filled slots.
    pub fn filled_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_filled()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Slot::is_filled)
    }

    /// Coordinates of every empty slot, frame-major.
    pub fn empty_slots(&self) -> Vec<(usize, usize)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| !slot.is_filled())
            .map(|(index, _)| (index / self.n_views, index % self.n_views))
            .collect()
    }

    /// Time-ordered entries at `view`.
    pub fn view_track(&self, view: usize) -> impl Iterator<Item = &Slot<T>> + '_ {
        (0..self.n_frames).map(move |frame| self.slot(frame, view))
    }

    /// View-ordered entries at `frame`.
    pub fn frame_views(&self, frame: usize) -> impl Iterator<Item = &Slot<T>> + '_ {
        (0..self.n_views).map(move |view| self.slot(frame, view))
    }
}

impl<T: Clone> Grid<T> {
    /// Clones the values at the given coordinates, or reports the first empty one.
    pub fn collect_filled(
        &self,
        coords: impl IntoIterator<Item = (usize, usize)>,
    ) -> Result<Vec<T>, (usize, usize)> {
        coords
            .into_iter()
            .map(|(frame, view)| self.get(frame, view).cloned().ok_or((frame, view)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_grid_is_empty() {
        let grid: Grid<u8> = Grid::new(3, 2);
        assert_eq!(grid.filled_count(), 0);
        assert!(!grid.is_complete());
        assert_eq!(grid.empty_slots().len(), 6);
        assert_eq!(grid.empty_slots()[3], (1, 1));
    }

    #[test]
    fn fill_if_empty_is_write_once() {
        let mut grid = Grid::new(2, 2);
        assert!(grid.fill_if_empty(1, 0, "truth"));
        assert!(!grid.fill_if_empty(1, 0, "generated"));
        assert_eq!(grid.get(1, 0), Some(&"truth"));

        grid.set(1, 0, "replaced");
        assert_eq!(grid.get(1, 0), Some(&"replaced"));
    }

    #[test]
    fn tracks_follow_axes() {
        let mut grid = Grid::new(3, 2);
        for frame in 0..3 {
            grid.set(frame, 0, frame * 10);
        }
        grid.set(0, 1, 99);

        let track: Vec<_> = grid.view_track(0).filter_map(Slot::as_ref).copied().collect();
        assert_eq!(track, vec![0, 10, 20]);

        let views: Vec<_> = grid.frame_views(0).filter_map(Slot::as_ref).copied().collect();
        assert_eq!(views, vec![0, 99]);
    }

    #[test]
    fn collect_filled_reports_first_gap() {
        let mut grid = Grid::new(2, 2);
        grid.set(0, 0, 1);
        grid.set(1, 1, 4);

        assert_eq!(grid.collect_filled([(0, 0), (1, 1)]), Ok(vec![1, 4]));
        assert_eq!(grid.collect_filled([(0, 0), (0, 1), (1, 0)]), Err((0, 1)));
    }

    #[test]
    fn complete_after_every_slot_set() {
        let mut grid = Grid::new(2, 3);
        for frame in 0..2 {
            for view in 0..3 {
                grid.set(frame, view, ());
            }
        }
        assert!(grid.is_complete());
        assert!(grid.empty_slots().is_empty());
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn out_of_bounds_panics() {
        let grid: Grid<u8> = Grid::new(2, 2);
        grid.get(2, 0);
    }
}
