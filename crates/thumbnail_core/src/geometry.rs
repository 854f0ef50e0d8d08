/// Computes the size a variant should have when its width is capped at
/// `max_width`.
///
/// Images that already fit are returned unchanged, so a variant is never
/// upscaled. Otherwise the width becomes `max_width` and the height is scaled
/// by the same ratio, truncated to the pixel grid. The height never drops
/// below one pixel.
pub fn compute_target_size(original_width: u32, original_height: u32, max_width: u32) -> (u32, u32) {
    if original_width <= max_width {
        return (original_width, original_height);
    }

    let scaled_height = u64::from(original_height) * u64::from(max_width) / u64::from(original_width);
    // scaled_height <= original_height because max_width < original_width
    let target_height = u32::try_from(scaled_height).unwrap_or(original_height).max(1);

    (max_width, target_height)
}
