/// Quantize a normalized channel to 8 bits, clamping to standard range.
pub(crate) fn unorm8(v: f32) -> u8 {
    if !v.is_finite() {
        return if v > 0.0 { 255 } else { 0 };
    }
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Premultiplied source-over: `src + dst * (1 - src.a)`.
pub(crate) fn over_premul(dst: [f32; 4], src: [f32; 4]) -> [f32; 4] {
    let inv = 1.0 - src[3].clamp(0.0, 1.0);
    [
        src[0] + dst[0] * inv,
        src[1] + dst[1] * inv,
        src[2] + dst[2] * inv,
        src[3] + dst[3] * inv,
    ]
}

/// `round(x * y / 255)` for 8-bit channel math.
pub(crate) fn mul_div255_u16(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/math.rs"]
mod tests;
