use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{
    atom::{Atom, AtomType},
    color_map::ColorMap,
    concurrency::par_iter_mut1,
    floating_type_mod::FT,
    grid::Grid,
    vec3f,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisualizedAttribute {
    AtomType,
    Speed,
    Generation,
}

pub const ALL_VISUALIZED_ATTRIBUTES: [VisualizedAttribute; 3] = [
    VisualizedAttribute::AtomType,
    VisualizedAttribute::Speed,
    VisualizedAttribute::Generation,
];

impl VisualizedAttribute {
    pub fn as_str_lowercase(self) -> &'static str {
        match self {
            VisualizedAttribute::AtomType => "atom-type",
            VisualizedAttribute::Speed => "speed",
            VisualizedAttribute::Generation => "generation",
        }
    }
}

impl FromStr for VisualizedAttribute {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_VISUALIZED_ATTRIBUTES
            .iter()
            .copied()
            .find(|attr| attr.as_str_lowercase() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = ALL_VISUALIZED_ATTRIBUTES.iter().map(|a| a.as_str_lowercase()).collect();
                format!("unknown attribute '{}' (expected one of {})", s, names.join(", "))
            })
    }
}

pub const BACKGROUND_COLOR: u32 = 0x000000;

/// `0xRRGGBB` of every atom type.
pub fn atom_type_color(atom_type: AtomType) -> u32 {
    match atom_type {
        AtomType::None => BACKGROUND_COLOR,
        AtomType::Solid => 0xFF0000,
        AtomType::Powder => 0x00FF00,
        AtomType::Liquid => 0x0000FF,
        AtomType::Gas => 0xFFFF00,
        AtomType::Particle => 0xFF00FF,
    }
}

/// Cells per frame mapped from dark blue over cyan and yellow to white.
pub fn speed_color_map(max_speed: FT) -> ColorMap {
    ColorMap::new(vec![
        (0., vec3f(0.05, 0.05, 0.3)),
        (max_speed * 0.33, vec3f(0., 0.8, 0.9)),
        (max_speed * 0.66, vec3f(1., 0.85, 0.1)),
        (max_speed, vec3f(1., 1., 1.)),
    ])
}

fn atom_color(atom: &Atom, attr: VisualizedAttribute, speed_map: &ColorMap) -> u32 {
    if atom.is_empty() {
        return BACKGROUND_COLOR;
    }

    match attr {
        VisualizedAttribute::AtomType => atom_type_color(atom.atom_type),
        VisualizedAttribute::Speed => speed_map.get_packed(atom.velocity.norm()),
        VisualizedAttribute::Generation => {
            if atom.generation {
                0xFFFFFF
            } else {
                0x808080
            }
        }
    }
}

/// Renders one `0xRRGGBB` pixel per cell into `pixels` (row-major, same size as the grid).
pub fn draw(grid: &Grid, pixels: &mut [u32], attr: VisualizedAttribute) {
    assert_eq!(pixels.len(), grid.width() * grid.height());

    let speed_map = speed_color_map(8.);
    let atoms = grid.atoms();
    par_iter_mut1(pixels, |idx, pixel| {
        *pixel = atom_color(&atoms[idx], attr, &speed_map);
    });
}

/// Packed pixels to interleaved 8 bit RGB.
pub fn to_rgb8(pixels: &[u32]) -> Vec<u8> {
    pixels
        .iter()
        .flat_map(|&p| [(p >> 16) as u8, (p >> 8) as u8, p as u8])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_atom_types() {
        let mut grid = Grid::new(4, 3);
        grid.set(1, 1, Atom::new(AtomType::Liquid, 1, 1, false));
        grid.set(2, 1, Atom::new(AtomType::Gas, 2, 1, false));

        let mut pixels = vec![0xDEADBEEF; 12];
        draw(&grid, &mut pixels, VisualizedAttribute::AtomType);
        assert_eq!(pixels[5], 0x0000FF);
        assert_eq!(pixels[6], 0xFFFF00);
        assert_eq!(pixels.iter().filter(|&&p| p == BACKGROUND_COLOR).count(), 10);

        let rgb = to_rgb8(&pixels);
        assert_eq!(rgb.len(), 36);
        assert_eq!(&rgb[18..21], &[255, 255, 0]);
    }

    #[test]
    fn test_draw_speed() {
        let mut grid = Grid::new(3, 3);
        grid.set(1, 1, Atom::new(AtomType::Particle, 1, 1, false).with_velocity(crate::vec2f(30., 40.)));

        let mut pixels = vec![0; 9];
        draw(&grid, &mut pixels, VisualizedAttribute::Speed);
        assert_eq!(pixels[4], 0xFFFFFF);
        assert_eq!(pixels[0], BACKGROUND_COLOR);
    }

    #[test]
    fn test_parse_attribute() {
        assert_eq!("speed".parse::<VisualizedAttribute>(), Ok(VisualizedAttribute::Speed));
        assert!("pressure".parse::<VisualizedAttribute>().unwrap_err().contains("atom-type"));
    }
}
