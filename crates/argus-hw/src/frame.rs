//! Frame type and pixel plumbing — YUYV→RGB conversion, downsampling, crops.

/// A captured RGB camera frame (interleaved, 3 bytes per pixel).
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u32,
}

/// Anything the feed loop can pull frames from.
///
/// `None` means end of stream; implementations report read failures the
/// same way (after logging), because a failed read ends the loop
/// gracefully rather than erroring.
pub trait VideoSource {
    fn next_frame(&mut self) -> Option<Frame>;
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid YUYV length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Convert packed YUYV (4:2:2) to interleaved RGB.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V], chroma shared by the
/// pixel pair. Uses the integer BT.601 limited-range transform.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for quad in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
        push_rgb(&mut rgb, y0, u, v);
        push_rgb(&mut rgb, y1, u, v);
    }
    Ok(rgb)
}

fn push_rgb(out: &mut Vec<u8>, y: u8, u: u8, v: u8) {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;

    let clamp = |v: i32| v.clamp(0, 255) as u8;
    out.push(clamp((298 * c + 409 * e + 128) >> 8));
    out.push(clamp((298 * c - 100 * d - 208 * e + 128) >> 8));
    out.push(clamp((298 * c + 516 * d + 128) >> 8));
}

/// Downsample a frame by `ratio` (0 < ratio ≤ 1) with nearest-neighbour
/// sampling. Used to shrink frames before detection; resulting boxes are
/// mapped back with the inverse ratio.
pub fn downsample(frame: &Frame, ratio: f32) -> Frame {
    if frame.width == 0 || frame.height == 0 {
        return frame.clone();
    }
    let out_w = ((frame.width as f32 * ratio).round() as u32).max(1);
    let out_h = ((frame.height as f32 * ratio).round() as u32).max(1);

    let mut data = Vec::with_capacity((out_w * out_h * 3) as usize);
    for y in 0..out_h {
        let src_y = (((y as f32 + 0.5) / ratio) as u32).min(frame.height - 1);
        for x in 0..out_w {
            let src_x = (((x as f32 + 0.5) / ratio) as u32).min(frame.width - 1);
            let base = ((src_y * frame.width + src_x) * 3) as usize;
            data.extend_from_slice(&frame.data[base..base + 3]);
        }
    }

    Frame {
        data,
        width: out_w,
        height: out_h,
        sequence: frame.sequence,
    }
}

/// Copy out an RGB sub-rectangle. Coordinates are clamped to the frame;
/// an empty rectangle yields `(vec![], 0, 0)`.
pub fn crop_region(
    data: &[u8],
    width: u32,
    height: u32,
    left: u32,
    top: u32,
    right: u32,
    bottom: u32,
) -> (Vec<u8>, u32, u32) {
    let right = right.min(width);
    let bottom = bottom.min(height);
    if left >= right || top >= bottom {
        return (Vec::new(), 0, 0);
    }

    let out_w = right - left;
    let out_h = bottom - top;
    let mut out = Vec::with_capacity((out_w * out_h * 3) as usize);
    for y in top..bottom {
        let start = ((y * width + left) * 3) as usize;
        let end = start + (out_w * 3) as usize;
        out.extend_from_slice(&data[start..end]);
    }
    (out, out_w, out_h)
}
