// gl_image.rs -- image loading and post-processing
//
// Everything lands in one canonical layout: tightly packed RGBA8. Decoding
// handles TGA (the default asset format), PNG and JPEG; the post-processing
// steps cover power-of-two padding, the box resampler, and the rotate/flip
// permutations the cube assembler needs.

use myd3_common::files::{FsContext, FILE_NOT_FOUND_TIMESTAMP};
use rayon::prelude::*;

// shortest name that can still carry an extension, "x.tga"
const MIN_IMAGE_NAME: usize = 5;

// ============================================================================
// PixelBuffer
// ============================================================================

/// An owned RGBA8 pixel rectangle.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; (width * height * 4) as usize],
        }
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        ((y * self.width + x) * 4) as usize
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let o = self.offset(x, y);
        [self.data[o], self.data[o + 1], self.data[o + 2], self.data[o + 3]]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let o = self.offset(x, y);
        self.data[o..o + 4].copy_from_slice(&rgba);
    }

    /// In-place 180 degree rotation. Square buffers only.
    pub fn rotate_180(&mut self) {
        debug_assert_eq!(self.width, self.height);
        let pixels = (self.width * self.height) as usize;
        for i in 0..pixels / 2 {
            let j = pixels - 1 - i;
            for c in 0..4 {
                self.data.swap(i * 4 + c, j * 4 + c);
            }
        }
    }

    /// Mirrors each row (x axis reversed), in place.
    pub fn flip_horizontal(&mut self) {
        for y in 0..self.height {
            for x in 0..self.width / 2 {
                let a = self.offset(x, y);
                let b = self.offset(self.width - 1 - x, y);
                for c in 0..4 {
                    self.data.swap(a + c, b + c);
                }
            }
        }
    }

    /// Reverses the row order (y axis reversed), in place.
    pub fn flip_vertical(&mut self) {
        for y in 0..self.height / 2 {
            for x in 0..self.width {
                let a = self.offset(x, y);
                let b = self.offset(x, self.height - 1 - y);
                for c in 0..4 {
                    self.data.swap(a + c, b + c);
                }
            }
        }
    }
}

// ============================================================================
// Decoder
// ============================================================================

/// Result of one image load. `pixels` is absent on any failure; the
/// timestamp is still meaningful whenever the file could be opened.
#[derive(Clone, Debug)]
pub struct ImageLoad {
    pub pixels: Option<PixelBuffer>,
    pub timestamp: u64,
}

impl ImageLoad {
    fn not_found() -> Self {
        Self {
            pixels: None,
            timestamp: FILE_NOT_FOUND_TIMESTAMP,
        }
    }
}

fn default_extension(name: &str) -> String {
    let base = name.rsplit('/').next().unwrap_or(name);
    if base.contains('.') {
        name.to_string()
    } else {
        format!("{}.tga", name)
    }
}

fn format_for(name: &str, data: &[u8]) -> Option<image::ImageFormat> {
    let ext = name.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "tga" => Some(image::ImageFormat::Tga),
        "png" => Some(image::ImageFormat::Png),
        "jpg" | "jpeg" => Some(image::ImageFormat::Jpeg),
        _ => image::guess_format(data).ok(),
    }
}

/// Loads and decodes an image into RGBA8.
///
/// Names without an extension default to .tga. With `want_pixels` false only
/// the modification timestamp is retrieved, the payload is never decoded;
/// callers use this for staleness checks. With `make_power_of_two` the
/// decoded buffer is padded/resampled per [`make_power_of_two`].
///
/// Failure is an absent buffer, never an error: unopenable file, degenerate
/// name, or undecodable payload all land there.
pub fn load_image(
    fs: &FsContext,
    name: &str,
    want_pixels: bool,
    make_pot: bool,
    round_down: bool,
) -> ImageLoad {
    // the length gate applies to the defaulted name, so a short stem like
    // "lava" still resolves to lava.tga
    let name = default_extension(name);
    if name.len() < MIN_IMAGE_NAME {
        return ImageLoad::not_found();
    }

    if !want_pixels {
        return ImageLoad {
            pixels: None,
            timestamp: fs.file_timestamp(&name),
        };
    }

    let Some((buf, timestamp)) = fs.load_file_with_timestamp(&name) else {
        return ImageLoad::not_found();
    };

    let decoded = format_for(&name, &buf)
        .and_then(|fmt| image::load_from_memory_with_format(&buf, fmt).ok());
    let Some(decoded) = decoded else {
        log::warn!("couldn't decode image {}", name);
        return ImageLoad { pixels: None, timestamp };
    };

    let rgba = decoded.into_rgba8();
    let mut pic = PixelBuffer {
        width: rgba.width(),
        height: rgba.height(),
        data: rgba.into_raw(),
    };
    if make_pot {
        pic = make_power_of_two(pic, round_down);
    }

    ImageLoad {
        pixels: Some(pic),
        timestamp,
    }
}

// ============================================================================
// Power-of-two padding and resampling
// ============================================================================

/// Smallest power of two >= `x`.
pub fn ceil_power_of_two(x: u32) -> u32 {
    let mut p = 1;
    while p < x {
        p <<= 1;
    }
    p
}

/// Returns `pic` resampled to power-of-two dimensions. Width and height are
/// rounded independently; with `round_down` a dimension that would have
/// grown is halved instead (100 rounds up to 128, down to 64). Buffers
/// already power-of-two pass through untouched.
pub fn make_power_of_two(pic: PixelBuffer, round_down: bool) -> PixelBuffer {
    let mut scaled_w = ceil_power_of_two(pic.width);
    let mut scaled_h = ceil_power_of_two(pic.height);
    if round_down && scaled_w > pic.width {
        scaled_w >>= 1;
    }
    if round_down && scaled_h > pic.height {
        scaled_h >>= 1;
    }
    if scaled_w == pic.width && scaled_h == pic.height {
        return pic;
    }

    let data = resample_texture(&pic.data, pic.width, pic.height, scaled_w, scaled_h);
    PixelBuffer {
        width: scaled_w,
        height: scaled_h,
        data,
    }
}

/// Box resampler averaging four taps per output pixel, channels handled
/// independently. Rows are independent, so they resample in parallel.
pub fn resample_texture(data: &[u8], in_w: u32, in_h: u32, out_w: u32, out_h: u32) -> Vec<u8> {
    let (in_w, in_h) = (in_w as usize, in_h as usize);
    let (out_w, out_h) = (out_w as usize, out_h as usize);

    // 16.16 fixed point column taps, pre-scaled to byte offsets
    let frac_step = (in_w << 16) / out_w;
    let mut p1 = vec![0usize; out_w];
    let mut p2 = vec![0usize; out_w];
    let mut frac = frac_step >> 2;
    for p in p1.iter_mut() {
        *p = 4 * (frac >> 16);
        frac += frac_step;
    }
    let mut frac = 3 * (frac_step >> 2);
    for p in p2.iter_mut() {
        *p = 4 * (frac >> 16);
        frac += frac_step;
    }

    let mut out = vec![0u8; out_w * out_h * 4];
    out.par_chunks_mut(out_w * 4).enumerate().for_each(|(i, row)| {
        let r1 = ((i as f32 + 0.25) * in_h as f32 / out_h as f32) as usize;
        let r2 = ((i as f32 + 0.75) * in_h as f32 / out_h as f32) as usize;
        let inrow = &data[4 * in_w * r1..4 * in_w * (r1 + 1)];
        let inrow2 = &data[4 * in_w * r2..4 * in_w * (r2 + 1)];
        for j in 0..out_w {
            for c in 0..4 {
                let sum = inrow[p1[j] + c] as u32
                    + inrow[p2[j] + c] as u32
                    + inrow2[p1[j] + c] as u32
                    + inrow2[p2[j] + c] as u32;
                row[j * 4 + c] = (sum >> 2) as u8;
            }
        }
    });
    out
}

// ============================================================================
// Cube assembly
// ============================================================================

/// Face naming convention for six-file cube maps.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CubeStyle {
    /// Camera-relative suffixes; faces are reoriented into native layout.
    Camera,
    /// Axis-relative suffixes; faces are already in native layout.
    Axis,
}

const CAMERA_SIDES: [&str; 6] = [
    "_forward.tga",
    "_back.tga",
    "_left.tga",
    "_right.tga",
    "_up.tga",
    "_down.tga",
];

const AXIS_SIDES: [&str; 6] = ["_px.tga", "_nx.tga", "_py.tga", "_ny.tga", "_pz.tga", "_nz.tga"];

/// Six equally sized square faces in native orientation.
#[derive(Clone, Debug)]
pub struct CubeImageSet {
    /// Empty when pixels were not requested.
    pub faces: Vec<PixelBuffer>,
    /// Edge length of every face.
    pub size: u32,
    /// Max of the per-face source timestamps.
    pub timestamp: u64,
}

// native cube layout expects camera-authored faces permuted per face index
fn reorient_camera_face(index: usize, pic: &mut PixelBuffer) {
    match index {
        0 => pic.rotate_180(),
        1 => {
            pic.rotate_180();
            pic.flip_horizontal();
            pic.flip_vertical();
        }
        2 => pic.flip_vertical(),
        3 => pic.flip_horizontal(),
        _ => pic.rotate_180(),
    }
}

/// Loads the six faces of a cube map named `base` + per-face suffix.
///
/// All-or-nothing: a missing face or a face whose dimensions disagree with
/// the first face rejects the whole set and drops everything already
/// loaded. With `want_pixels` false only the aggregate timestamp is
/// computed.
pub fn load_cube_images(
    fs: &FsContext,
    base: &str,
    style: CubeStyle,
    want_pixels: bool,
    round_down: bool,
) -> Option<CubeImageSet> {
    let sides = match style {
        CubeStyle::Camera => &CAMERA_SIDES,
        CubeStyle::Axis => &AXIS_SIDES,
    };

    let mut faces = Vec::new();
    let mut size = 0;
    let mut timestamp = 0;

    for (i, side) in sides.iter().enumerate() {
        let name = format!("{}{}", base, side);
        let load = load_image(fs, &name, want_pixels, true, round_down);
        if load.timestamp == FILE_NOT_FOUND_TIMESTAMP {
            log::warn!("couldn't load cube image {}", name);
            return None;
        }
        timestamp = timestamp.max(load.timestamp);

        if want_pixels {
            let mut pic = load.pixels?;
            if i == 0 {
                size = pic.width;
            }
            if pic.width != size || pic.height != size {
                log::warn!("mismatched sizes on cube map {}", base);
                return None;
            }
            if style == CubeStyle::Camera {
                reorient_camera_face(i, &mut pic);
            }
            faces.push(pic);
        }
    }

    Some(CubeImageSet {
        faces,
        size,
        timestamp,
    })
}

// ============================================================================
// Screenshot output
// ============================================================================

/// Writes raw RGBA pixels as an uncompressed truecolor TGA. The origin flag
/// marks the data top-left unless `flip_vertical` asks for bottom-left.
pub fn write_tga(
    fs: &FsContext,
    name: &str,
    data: &[u8],
    width: u32,
    height: u32,
    flip_vertical: bool,
) -> std::io::Result<()> {
    let mut buffer = vec![0u8; 18 + data.len()];
    buffer[2] = 2; // uncompressed type
    buffer[12] = (width & 255) as u8;
    buffer[13] = (width >> 8) as u8;
    buffer[14] = (height & 255) as u8;
    buffer[15] = (height >> 8) as u8;
    buffer[16] = 32; // pixel size
    if !flip_vertical {
        buffer[17] = 1 << 5; // origin in upper left
    }

    // swap rgba to bgra
    for (src, dst) in data.chunks_exact(4).zip(buffer[18..].chunks_exact_mut(4)) {
        dst[0] = src[2];
        dst[1] = src[1];
        dst[2] = src[0];
        dst[3] = src[3];
    }

    fs.write_file(name, &buffer)
}
