use std::ops::Range;

use thiserror::Error;

/// Axis aligned rectangle of grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: usize,
    pub y: usize,
    pub w: usize,
    pub h: usize,
}

impl Region {
    pub fn columns(&self) -> Range<usize> {
        self.x..self.x + self.w
    }

    pub fn rows(&self) -> Range<usize> {
        self.y..self.y + self.h
    }

    /// Columns a worker may touch while processing this region: the region itself plus
    /// one halo column on each side, clamped to the grid.
    pub fn window(&self, grid_width: usize) -> Range<usize> {
        self.x.saturating_sub(1)..(self.x + self.w + 1).min(grid_width)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("thread count must be at least 1")]
    NoThreads,

    #[error("group count must be at least 1")]
    NoGroups,

    #[error("grid width {width} cannot be split into {region_count} stripes")]
    StripesTooNarrow { width: usize, region_count: usize },

    #[error(
        "regions {first} and {second} of group {group} are processed concurrently but their windows overlap \
         (use more groups, fewer threads or a wider grid)"
    )]
    OverlappingWindows { group: usize, first: usize, second: usize },
}

/// Partition of the grid into vertical stripes, bucketed into groups of regions which can be
/// processed concurrently. Every group holds exactly one region per worker slot.
#[derive(Debug, Clone)]
pub struct RegionSchedule {
    grid_width: usize,
    thread_count: usize,
    regions: Vec<Region>,
    groups: Vec<Vec<Region>>,
}

impl RegionSchedule {
    pub fn build(
        grid_width: usize,
        grid_height: usize,
        thread_count: usize,
        group_count: usize,
    ) -> Result<RegionSchedule, ScheduleError> {
        if thread_count == 0 {
            return Err(ScheduleError::NoThreads);
        }
        if group_count == 0 {
            return Err(ScheduleError::NoGroups);
        }

        let effective_group_count = group_count.min(thread_count);
        let region_count = thread_count * effective_group_count;
        let stripe_width = grid_width / region_count;
        if stripe_width == 0 {
            return Err(ScheduleError::StripesTooNarrow {
                width: grid_width,
                region_count,
            });
        }

        let mut regions = Vec::with_capacity(region_count);
        let mut groups: Vec<Vec<Region>> = (0..effective_group_count)
            .map(|_| Vec::with_capacity(thread_count))
            .collect();

        for i in 0..region_count {
            let x = stripe_width * i;
            // the last stripe absorbs the rounding remainder
            let w = if i == region_count - 1 { grid_width - x } else { stripe_width };
            let region = Region {
                x,
                y: 0,
                w,
                h: grid_height,
            };

            regions.push(region);
            debug_assert_eq!(groups[i % effective_group_count].len(), i / effective_group_count);
            groups[i % effective_group_count].push(region);
        }

        let schedule = RegionSchedule {
            grid_width,
            thread_count,
            regions,
            groups,
        };
        schedule.check_separation()?;
        Ok(schedule)
    }

    /// Verifies that no two regions of the same group can touch the same column.
    pub fn check_separation(&self) -> Result<(), ScheduleError> {
        for (group_idx, group) in self.groups.iter().enumerate() {
            let mut windows: Vec<(usize, Range<usize>)> = group
                .iter()
                .enumerate()
                .map(|(slot, region)| (slot, region.window(self.grid_width)))
                .collect();
            windows.sort_by_key(|(_, window)| window.start);

            for pair in windows.windows(2) {
                let (first, a) = &pair[0];
                let (second, b) = &pair[1];
                if a.end > b.start {
                    return Err(ScheduleError::OverlappingWindows {
                        group: group_idx,
                        first: *first,
                        second: *second,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    pub fn effective_group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn groups(&self) -> &[Vec<Region>] {
        &self.groups
    }

    pub fn region(&self, group: usize, slot: usize) -> Region {
        self.groups[group][slot]
    }

    pub fn stripe_width(&self) -> usize {
        self.regions[0].w
    }
}
