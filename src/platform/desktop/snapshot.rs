use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use crate::{
    colors::{draw, to_rgb8, VisualizedAttribute},
    grid::Grid,
};

/// First `<basepath>-<i>.png` which does not exist yet.
pub fn next_free_path(basepath: &str) -> PathBuf {
    let mut i = 0;
    loop {
        let path = PathBuf::from(format!("{}-{}.png", basepath, i));
        if !path.exists() {
            return path;
        }
        i += 1;
    }
}

/// Writes the grid as an RGB image with one pixel per cell.
pub fn write_png(path: &Path, grid: &Grid, attr: VisualizedAttribute) -> Result<(), String> {
    let mut pixels = vec![0u32; grid.width() * grid.height()];
    draw(grid, &mut pixels, attr);

    let file = File::create(path).map_err(|e| format!("failed creating {}: {}", path.display(), e))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), grid.width() as u32, grid.height() as u32);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_source_gamma(png::ScaledFloat::new(1.0 / 2.2));

    let mut writer = encoder
        .write_header()
        .map_err(|e| format!("failed writing png header: {}", e))?;
    writer
        .write_image_data(&to_rgb8(&pixels))
        .map_err(|e| format!("failed writing png data: {}", e))?;

    Ok(())
}
