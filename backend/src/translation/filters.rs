//! Fixed-parameter grayscale filters used to approximate the look of the
//! other modality.

use image::{DynamicImage, GrayImage, Luma};

const NBINS: usize = 256;

/// Gray conversion with the BT.601 weights `0.299 R + 0.587 G + 0.114 B`,
/// rounded. Alpha is dropped.
pub fn to_gray_bt601(img: &DynamicImage) -> GrayImage {
    if let DynamicImage::ImageLuma8(gray) = img {
        return gray.clone();
    }
    let rgb = img.to_rgb8();
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        Luma([luma.round().clamp(0.0, 255.0) as u8])
    })
}

/// Contrast-limited adaptive histogram equalization.
///
/// The input is first stretched so its min..max covers all 256 bins. The
/// image is split into `tiles`×`tiles` contextual regions. Each region's
/// histogram is clipped at `clip_limit * region_pixels` (at least 1), the
/// excess is spread over all bins, and the resulting CDF becomes that region's
/// mapping. Pixels blend the mappings of the four nearest region centres
/// bilinearly. The blended result is stretched to [0, 1] again, then scaled
/// to 8 bits and truncated, so any non-constant input spans 0..=255.
pub fn equalize_adapthist(img: &GrayImage, tiles: u32, clip_limit: f32) -> GrayImage {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return img.clone();
    }
    let img = stretch_to_full_range(img);

    let tiles_x = tiles.clamp(1, width);
    let tiles_y = tiles.clamp(1, height);
    let tile_w = width as f32 / tiles_x as f32;
    let tile_h = height as f32 / tiles_y as f32;

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        let (y0, y1) = tile_bounds(ty, tile_h, height);
        for tx in 0..tiles_x {
            let (x0, x1) = tile_bounds(tx, tile_w, width);
            luts.push(region_mapping(&img, (x0, x1), (y0, y1), clip_limit));
        }
    }
    let lut = |tx: usize, ty: usize| &luts[ty * tiles_x as usize + tx];

    let mut mapped = Vec::with_capacity((width * height) as usize);
    for (x, y, pixel) in img.enumerate_pixels() {
        let value = pixel.0[0] as usize;
        let (tx0, tx1, wx) = neighbours((x as f32 + 0.5) / tile_w - 0.5, tiles_x);
        let (ty0, ty1, wy) = neighbours((y as f32 + 0.5) / tile_h - 0.5, tiles_y);

        let top = lut(tx0, ty0)[value] * (1.0 - wx) + lut(tx1, ty0)[value] * wx;
        let bottom = lut(tx0, ty1)[value] * (1.0 - wx) + lut(tx1, ty1)[value] * wx;
        mapped.push(top * (1.0 - wy) + bottom * wy);
    }

    let lo = mapped.iter().copied().fold(f32::INFINITY, f32::min);
    let hi = mapped.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let span = hi - lo;
    let raw = mapped
        .into_iter()
        .map(|m| {
            let unit = if span > 0.0 { (m - lo) / span } else { m };
            (unit * 255.0).clamp(0.0, 255.0) as u8
        })
        .collect();
    GrayImage::from_raw(width, height, raw).unwrap_or_else(|| GrayImage::new(width, height))
}

/// Linearly maps the image's min..max onto 0..=255. Constant images are
/// returned unchanged.
fn stretch_to_full_range(img: &GrayImage) -> GrayImage {
    let values = img.as_raw();
    let lo = values.iter().copied().min().unwrap_or(0);
    let hi = values.iter().copied().max().unwrap_or(0);
    if lo == hi || (lo == 0 && hi == 255) {
        return img.clone();
    }
    let span = (hi - lo) as f32;
    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        let scaled = (pixel.0[0] - lo) as f32 * 255.0 / span;
        pixel.0[0] = scaled.round() as u8;
    }
    out
}

fn tile_bounds(index: u32, tile_size: f32, limit: u32) -> (u32, u32) {
    let start = ((index as f32 * tile_size).round() as u32).min(limit);
    let end = (((index + 1) as f32 * tile_size).round() as u32).min(limit);
    (start, end.max(start + 1).min(limit))
}

/// Lower region index, upper region index and the weight of the upper one.
fn neighbours(position: f32, count: u32) -> (usize, usize, f32) {
    let last = count as usize - 1;
    if position <= 0.0 {
        return (0, 0, 0.0);
    }
    let lower = position.floor() as usize;
    if lower >= last {
        return (last, last, 0.0);
    }
    (lower, lower + 1, position - lower as f32)
}

fn region_mapping(img: &GrayImage, xs: (u32, u32), ys: (u32, u32), clip_limit: f32) -> [f32; NBINS] {
    let mut hist = [0u32; NBINS];
    for y in ys.0..ys.1 {
        for x in xs.0..xs.1 {
            hist[img.get_pixel(x, y).0[0] as usize] += 1;
        }
    }

    let pixels = (xs.1 - xs.0) * (ys.1 - ys.0);
    let limit = ((clip_limit * pixels as f32) as u32).max(1);
    clip_histogram(&mut hist, limit);

    let total: u32 = hist.iter().sum();
    let mut mapping = [0f32; NBINS];
    let mut cumulative = 0u32;
    for (bin, count) in hist.iter().enumerate() {
        cumulative += count;
        mapping[bin] = cumulative as f32 / total.max(1) as f32;
    }
    mapping
}

/// Caps every bin at `limit` and hands the clipped counts back evenly, so the
/// histogram total is preserved whenever there is room below the cap.
fn clip_histogram(hist: &mut [u32; NBINS], limit: u32) {
    let mut excess = 0u32;
    for count in hist.iter_mut() {
        if *count > limit {
            excess += *count - limit;
            *count = limit;
        }
    }

    let increment = excess / NBINS as u32;
    let upper = limit.saturating_sub(increment);
    for count in hist.iter_mut() {
        if *count >= upper {
            excess -= limit - *count;
            *count = limit;
        } else {
            *count += increment;
            excess -= increment;
        }
    }

    while excess > 0 {
        let before = excess;
        for count in hist.iter_mut() {
            if excess == 0 {
                break;
            }
            if *count < limit {
                *count += 1;
                excess -= 1;
            }
        }
        if excess == before {
            break;
        }
    }
}

/// `saturate(round(|alpha * p + beta|))` per pixel.
pub fn convert_scale_abs(img: &GrayImage, alpha: f32, beta: f32) -> GrayImage {
    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        let scaled = (alpha * pixel.0[0] as f32 + beta).abs().round();
        pixel.0[0] = scaled.clamp(0.0, 255.0) as u8;
    }
    out
}

/// 5×5 Gaussian blur with the binomial kernel `[1 4 6 4 1] / 16` in both
/// directions (sigma ≈ 1.1), mirroring borders without repeating the edge
/// pixel.
pub fn gaussian_blur_5x5(img: &GrayImage) -> GrayImage {
    const KERNEL: [u32; 5] = [1, 4, 6, 4, 1];
    let (width, height) = img.dimensions();
    let (w, h) = (width as usize, height as usize);
    if w == 0 || h == 0 {
        return img.clone();
    }

    let src = img.as_raw();
    let mut horizontal = vec![0u32; w * h];
    for y in 0..h {
        for x in 0..w {
            horizontal[y * w + x] = KERNEL
                .iter()
                .enumerate()
                .map(|(k, weight)| weight * src[y * w + reflect_101(x as isize + k as isize - 2, w)] as u32)
                .sum();
        }
    }

    let mut out = GrayImage::new(width, height);
    for y in 0..h {
        for x in 0..w {
            let sum: u32 = KERNEL
                .iter()
                .enumerate()
                .map(|(k, weight)| weight * horizontal[reflect_101(y as isize + k as isize - 2, h) * w + x])
                .sum();
            out.put_pixel(x as u32, y as u32, Luma([((sum + 128) >> 8) as u8]));
        }
    }
    out
}

/// Border index for `...c b | a b c d | c b...`.
fn reflect_101(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len as isize - 1);
    let folded = index.rem_euclid(period);
    if folded < len as isize {
        folded as usize
    } else {
        (period - folded) as usize
    }
}
