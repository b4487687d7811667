use std::{marker::PhantomData, ops::Range};

use crate::{atom::Atom, grid::CellAccess, regions::Region};

/// Raw pointer to the atoms of a grid which can be handed to worker threads.
#[derive(Copy, Clone, Debug)]
pub struct GridPtr {
    ptr: *mut Atom,
    width: usize,
    height: usize,
}
unsafe impl Sync for GridPtr {}
unsafe impl Send for GridPtr {}

impl GridPtr {
    pub fn new(atoms: &mut [Atom], width: usize, height: usize) -> GridPtr {
        assert_eq!(atoms.len(), width * height);
        GridPtr {
            ptr: atoms.as_mut_ptr(),
            width,
            height,
        }
    }

    /// # Safety
    ///
    /// `ptr` must point to `width * height` consecutive atoms.
    pub unsafe fn from_raw(ptr: *mut Atom, width: usize, height: usize) -> GridPtr {
        GridPtr { ptr, width, height }
    }
}

/// Write capability over one region plus a one-column halo on either side.
///
/// All reads and writes are confined to `window`. A column outside the window is reported
/// as not writable, which makes the movement code treat such targets as blocked.
pub struct RegionView<'a> {
    grid: GridPtr,
    window: Range<usize>,
    _marker: PhantomData<&'a mut [Atom]>,
}

impl<'a> RegionView<'a> {
    /// # Safety
    ///
    /// While the view is alive no other thread may access the columns in the window of `region`,
    /// and the grid behind `grid` must outlive the view. The worker pool guarantees this by only
    /// running regions of a validated schedule group concurrently (see `RegionSchedule::build`)
    /// while it holds the exclusive borrow of the grid.
    pub unsafe fn new(grid: GridPtr, region: Region) -> RegionView<'a> {
        RegionView {
            window: region.window(grid.width),
            grid,
            _marker: PhantomData,
        }
    }

    pub fn window(&self) -> Range<usize> {
        self.window.clone()
    }

    #[inline(always)]
    fn offset(&self, x: usize, y: usize) -> usize {
        assert!(
            self.window.contains(&x) && y < self.grid.height,
            "cell ({}, {}) is outside of region window {:?}",
            x,
            y,
            self.window
        );
        x + y * self.grid.width
    }
}

impl<'a> CellAccess for RegionView<'a> {
    fn width(&self) -> usize {
        self.grid.width
    }

    fn height(&self) -> usize {
        self.grid.height
    }

    fn atom(&self, x: usize, y: usize) -> &Atom {
        let offset = self.offset(x, y);
        // !!! the window is owned exclusively by this view (see `RegionView::new`) !!!
        unsafe { &*self.grid.ptr.add(offset) }
    }

    fn atom_mut(&mut self, x: usize, y: usize) -> &mut Atom {
        let offset = self.offset(x, y);
        unsafe { &mut *self.grid.ptr.add(offset) }
    }

    fn swap_atoms(&mut self, a: (usize, usize), b: (usize, usize)) {
        let oa = self.offset(a.0, a.1);
        let ob = self.offset(b.0, b.1);
        if oa != ob {
            unsafe {
                std::ptr::swap(self.grid.ptr.add(oa), self.grid.ptr.add(ob));
            }
        }
    }

    fn is_writable(&self, x: usize) -> bool {
        self.window.contains(&x)
    }
}
