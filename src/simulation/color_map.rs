use crate::{floating_type_mod::FT, V};

pub type Color = V<FT, 3>;

/// Piecewise linear gradient through a list of color stops.
pub struct ColorMap {
    stops: Vec<(FT, Color)>,
}

impl ColorMap {
    pub fn new(mut stops: Vec<(FT, Color)>) -> Self {
        assert!(!stops.is_empty(), "color map needs at least one stop");
        stops.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { stops }
    }

    pub fn get(&self, x: FT) -> Color {
        let first = self.stops[0];
        let last = self.stops[self.stops.len() - 1];
        if x.is_nan() || x <= first.0 {
            return first.1;
        }
        if x >= last.0 {
            return last.1;
        }

        let upper = self.stops.partition_point(|stop| stop.0 < x);
        let (x0, c0) = self.stops[upper - 1];
        let (x1, c1) = self.stops[upper];
        let t = (x - x0) / (x1 - x0);
        c0 + t * (c1 - c0)
    }

    pub fn get_u8(&self, x: FT) -> V<u8, 3> {
        self.get(x).map(|f| (f.clamp(0., 1.) * 255.).round() as u8)
    }

    /// `0xRRGGBB`
    pub fn get_packed(&self, x: FT) -> u32 {
        let c = self.get_u8(x);
        (c.x as u32) << 16 | (c.y as u32) << 8 | c.z as u32
    }

    pub fn color_stops(&self) -> &[(FT, Color)] {
        &self.stops
    }
}
