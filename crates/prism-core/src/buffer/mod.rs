//! Tiled pixel buffers.
//!
//! A [`Buffer`] is a reference-counted handle: cloning it yields another
//! reference to the same buffer. Sub-buffers share their parent's storage and
//! coordinate system, so writes through either are visible through both.
//!
//! Reads outside the abyss rectangle follow an [`AbyssPolicy`]. Writes are
//! clipped to the intersection of extent and abyss.

mod sampler;
mod storage;

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use prism_color::{Colour, PixelFormat};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, PrismError, PrismResult, ResourceError};
use crate::rect::Rect;

pub use sampler::{Sampler, SamplerKind};
pub use storage::HandlerId;
pub(crate) use storage::alloc_bytes;
use storage::TileStorage;

/// How reads outside the abyss rectangle are answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AbyssPolicy {
    /// Transparent zero pixels; a read entirely outside fails with `OutOfRange`.
    #[default]
    None,
    /// Replicate the nearest edge pixel.
    Clamp,
    /// Wrap coordinates modulo the abyss size.
    Loop,
    /// Opaque black.
    Black,
    /// Opaque white.
    White,
}

#[derive(Clone)]
struct BufferState {
    extent: Rect,
    abyss: Rect,
    format: PixelFormat,
}

struct BufferShared {
    storage: Arc<TileStorage>,
    state: RwLock<BufferState>,
    /// One extra strong count per live sub-buffer.
    views: Arc<()>,
    parent: Option<(Buffer, Arc<()>)>,
}

/// Shared handle to tiled pixel storage with an extent, abyss and format.
#[derive(Clone)]
pub struct Buffer(Arc<BufferShared>);

impl Buffer {
    /// Create an empty buffer using the configured tile size.
    pub fn new(extent: Rect, format: &PixelFormat) -> PrismResult<Self> {
        let config = crate::config::config();
        Self::with_tile_size(extent, format, config.tile_width, config.tile_height)
    }

    pub fn with_tile_size(
        extent: Rect,
        format: &PixelFormat,
        tile_width: i32,
        tile_height: i32,
    ) -> PrismResult<Self> {
        let bytes = extent.area().checked_mul(format.bytes_per_pixel() as u64);
        if bytes.is_none_or(|b| b > isize::MAX as u64) {
            return Err(ResourceError::ExtentTooLarge(extent).into());
        }
        let storage = TileStorage::new(tile_width, tile_height, format.bytes_per_pixel());
        Ok(Self(Arc::new(BufferShared {
            storage: Arc::new(storage),
            state: RwLock::new(BufferState {
                extent,
                abyss: extent,
                format: format.clone(),
            }),
            views: Arc::new(()),
            parent: None,
        })))
    }

    /// Create a buffer over `extent` holding `data` (packed rows in `format`).
    pub fn from_bytes(extent: Rect, format: &PixelFormat, data: &[u8]) -> PrismResult<Self> {
        let buffer = Self::new(extent, format)?;
        buffer.set(extent, 0, format, data, None)?;
        Ok(buffer)
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn extent(&self) -> Rect {
        self.0.state.read().extent
    }

    pub fn abyss(&self) -> Rect {
        self.0.state.read().abyss
    }

    pub fn format(&self) -> PixelFormat {
        self.0.state.read().format.clone()
    }

    pub fn tile_size(&self) -> (i32, i32) {
        self.0.storage.tile_size()
    }

    /// Parent of a sub-buffer.
    pub fn parent(&self) -> Option<&Buffer> {
        self.0.parent.as_ref().map(|(p, _)| p)
    }

    /// Whether two handles refer to the same buffer.
    pub fn ptr_eq(&self, other: &Buffer) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Whether two buffers read and write the same pixels.
    pub fn share_storage(a: &Buffer, b: &Buffer) -> bool {
        Arc::ptr_eq(&a.0.storage, &b.0.storage)
    }

    /// Storage is in memory; nothing to write back.
    pub fn flush(&self) {
        tracing::debug!("flush on in-memory buffer {:?}", self.extent());
    }

    // ── Reading ──────────────────────────────────────────────────

    /// Read `rect` as packed rows in `format`.
    ///
    /// With `scale != 1.0` the rectangle is in scaled coordinates and each
    /// destination pixel takes the nearest source pixel.
    pub fn get(
        &self,
        rect: Rect,
        scale: f64,
        format: &PixelFormat,
        abyss: AbyssPolicy,
    ) -> PrismResult<Vec<u8>> {
        self.check_in_range(rect, scale, abyss)?;
        self.read_converted(rect, scale, format, abyss)
    }

    /// Like [`Self::get`] but writes into `dst` with an optional row stride in bytes.
    pub fn get_into(
        &self,
        rect: Rect,
        scale: f64,
        format: &PixelFormat,
        dst: &mut [u8],
        stride: Option<usize>,
        abyss: AbyssPolicy,
    ) -> PrismResult<()> {
        self.check_in_range(rect, scale, abyss)?;
        if rect.is_empty() {
            return Ok(());
        }
        let native_format = self.format();
        let native = self.read_native(rect, scale, abyss)?;
        let width = rect.width as usize;
        let stride = stride.unwrap_or(width * format.bytes_per_pixel());
        let fish = prism_color::fish(&native_format, format)?;
        fish.process_rows(
            &native,
            width * native_format.bytes_per_pixel(),
            dst,
            stride,
            width,
            rect.height as usize,
        )?;
        Ok(())
    }

    /// Interpolated value at `(x, y)` in `format`.
    pub fn sample(
        &self,
        x: f64,
        y: f64,
        format: &PixelFormat,
        kind: SamplerKind,
        abyss: AbyssPolicy,
    ) -> PrismResult<Vec<u8>> {
        Sampler::new(self, format, kind, abyss)?.get(x, y)
    }

    fn check_in_range(&self, rect: Rect, scale: f64, abyss: AbyssPolicy) -> PrismResult<()> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(ConfigurationError::Invalid(format!("scale must be positive, got {scale}")).into());
        }
        if abyss != AbyssPolicy::None || rect.is_empty() {
            return Ok(());
        }
        let source = source_rect(rect, scale);
        let bounds = self.abyss();
        if !source.intersects(&bounds) {
            return Err(PrismError::OutOfRange {
                rect: source,
                abyss: bounds,
            });
        }
        Ok(())
    }

    /// Read without the `OutOfRange` check and convert to `format`.
    pub(crate) fn read_converted(
        &self,
        rect: Rect,
        scale: f64,
        format: &PixelFormat,
        abyss: AbyssPolicy,
    ) -> PrismResult<Vec<u8>> {
        if rect.is_empty() {
            return Ok(Vec::new());
        }
        let native_format = self.format();
        let native = self.read_native(rect, scale, abyss)?;
        if &native_format == format {
            return Ok(native);
        }
        let n = rect.area() as usize;
        let mut out = alloc_bytes(n * format.bytes_per_pixel())?;
        prism_color::fish(&native_format, format)?.process(&native, &mut out, n)?;
        Ok(out)
    }

    /// Read `rect` in the buffer's own format, resolving the abyss per `policy`.
    fn read_native(&self, rect: Rect, scale: f64, policy: AbyssPolicy) -> PrismResult<Vec<u8>> {
        if rect.is_empty() {
            return Ok(Vec::new());
        }
        let state = self.0.state.read().clone();
        let storage = &self.0.storage;
        let bpp = storage.bpp();
        let (width, height) = (rect.width.max(0) as usize, rect.height.max(0) as usize);
        let mut out = alloc_bytes(width * height * bpp)?;
        let fill = fill_pixel(&state.format, policy, bpp);
        let ab = state.abyss;
        let unit = scale == 1.0;

        for (row, line) in out.chunks_exact_mut(width * bpp).enumerate() {
            let dy = i64::from(rect.y) + row as i64;
            let sy = if unit { dy } else { scaled_source(dy, scale) };
            let Some(y) = resolve(sy, ab.y, ab.height, policy) else {
                fill_row(line, &fill);
                continue;
            };

            if unit {
                // Pixels inside the abyss in x come from one span read.
                let x0 = i64::from(rect.x).max(i64::from(ab.x));
                let x1 = rect.right().min(ab.right());
                if x0 < x1 {
                    let start = (x0 - i64::from(rect.x)) as usize * bpp;
                    let end = (x1 - i64::from(rect.x)) as usize * bpp;
                    storage.read_span(x0 as i32, y, &mut line[start..end]);
                }
                for (col, px) in line.chunks_exact_mut(bpp).enumerate() {
                    let sx = i64::from(rect.x) + col as i64;
                    if sx >= x0 && sx < x1 {
                        continue;
                    }
                    match resolve(sx, ab.x, ab.width, policy) {
                        Some(x) => storage.read_span(x, y, px),
                        None => px.copy_from_slice(&fill),
                    }
                }
            } else {
                for (col, px) in line.chunks_exact_mut(bpp).enumerate() {
                    let sx = scaled_source(i64::from(rect.x) + col as i64, scale);
                    match resolve(sx, ab.x, ab.width, policy) {
                        Some(x) => storage.read_span(x, y, px),
                        None => px.copy_from_slice(&fill),
                    }
                }
            }
        }
        Ok(out)
    }

    // ── Writing ──────────────────────────────────────────────────

    /// Write `data` (rows in `format`, `stride` bytes apart) into `rect` at mipmap `level`.
    ///
    /// At level `L` each source pixel covers a `2^L × 2^L` block of the buffer.
    pub fn set(
        &self,
        rect: Rect,
        level: u32,
        format: &PixelFormat,
        data: &[u8],
        stride: Option<usize>,
    ) -> PrismResult<()> {
        if rect.is_empty() {
            return Ok(());
        }
        if level > 16 {
            return Err(ConfigurationError::Invalid(format!("mipmap level {level} too deep")).into());
        }
        let native_format = self.format();
        let bpp = native_format.bytes_per_pixel();
        let width = rect.width as usize;
        let height = rect.height as usize;

        let mut native = alloc_bytes(width * height * bpp)?;
        let stride = stride.unwrap_or(width * format.bytes_per_pixel());
        prism_color::fish(format, &native_format)?
            .process_rows(data, stride, &mut native, width * bpp, width, height)?;

        let f = 1i64 << level;
        let target = Rect::new(
            (i64::from(rect.x) * f) as i32,
            (i64::from(rect.y) * f) as i32,
            (rect.width as i64 * f).min(i64::from(i32::MAX)) as i32,
            (rect.height as i64 * f).min(i64::from(i32::MAX)) as i32,
        );
        let clip = self.writable(target);
        if clip.is_empty() {
            return Ok(());
        }

        let mut line = alloc_bytes(clip.width as usize * bpp)?;
        for y in clip.y..clip.y + clip.height {
            let src_row = ((i64::from(y) - i64::from(target.y)) / f) as usize;
            let row = &native[src_row * width * bpp..(src_row + 1) * width * bpp];
            for (col, px) in line.chunks_exact_mut(bpp).enumerate() {
                let src_col = ((i64::from(clip.x) + col as i64 - i64::from(target.x)) / f) as usize;
                px.copy_from_slice(&row[src_col * bpp..(src_col + 1) * bpp]);
            }
            self.0.storage.write_span(clip.x, y, &line)?;
        }
        self.0.storage.emit(&clip);
        Ok(())
    }

    /// Zero the pixels of `rect`.
    pub fn clear(&self, rect: Rect) {
        let clip = self.writable(rect);
        self.0.storage.clear_rect(&clip);
        self.0.storage.emit(&clip);
    }

    /// Fill `rect` with `colour`.
    pub fn set_color(&self, rect: Rect, colour: &Colour) -> PrismResult<()> {
        let pixel = colour.get_pixel(&self.format())?;
        let clip = self.writable(rect);
        if clip.is_empty() {
            return Ok(());
        }
        let mut line = alloc_bytes(clip.width as usize * pixel.len())?;
        fill_row(&mut line, &pixel);
        for y in clip.y..clip.y + clip.height {
            self.0.storage.write_span(clip.x, y, &line)?;
        }
        self.0.storage.emit(&clip);
        Ok(())
    }

    /// Tile `pattern` over `rect`; the pattern's origin is placed at `(x_offset, y_offset)`.
    pub fn set_pattern(
        &self,
        rect: Rect,
        pattern: &Buffer,
        x_offset: i32,
        y_offset: i32,
    ) -> PrismResult<()> {
        let clip = self.writable(rect);
        let pat_extent = pattern.extent();
        if clip.is_empty() || pat_extent.is_empty() {
            return Ok(());
        }
        let format = self.format();
        let bpp = format.bytes_per_pixel();
        let pixels = pattern.read_converted(pat_extent, 1.0, &format, AbyssPolicy::Clamp)?;
        let (pw, ph) = (i64::from(pat_extent.width), i64::from(pat_extent.height));

        let mut line = alloc_bytes(clip.width as usize * bpp)?;
        for y in clip.y..clip.y + clip.height {
            let py = (i64::from(y) - i64::from(y_offset)).rem_euclid(ph) as usize;
            for (col, px) in line.chunks_exact_mut(bpp).enumerate() {
                let x = i64::from(clip.x) + col as i64;
                let pxi = (x - i64::from(x_offset)).rem_euclid(pw) as usize;
                let at = (py * pw as usize + pxi) * bpp;
                px.copy_from_slice(&pixels[at..at + bpp]);
            }
            self.0.storage.write_span(clip.x, y, &line)?;
        }
        self.0.storage.emit(&clip);
        Ok(())
    }

    /// Copy `src_rect` of `src` to `dst` at `dst_rect`'s origin.
    ///
    /// The source is read completely before anything is written, so copies
    /// between overlapping rectangles of one storage are safe.
    pub fn copy(
        src: &Buffer,
        src_rect: Rect,
        abyss: AbyssPolicy,
        dst: &Buffer,
        dst_rect: Rect,
    ) -> PrismResult<()> {
        if src_rect.is_empty() {
            return Ok(());
        }
        let target = Rect::new(dst_rect.x, dst_rect.y, src_rect.width, src_rect.height);
        if Self::share_storage(src, dst) && src_rect.intersects(&target) {
            tracing::debug!("staging overlapping copy {src_rect} -> {target}");
        }
        let format = dst.format();
        let staged = src.read_converted(src_rect, 1.0, &format, abyss)?;
        dst.set(target, 0, &format, &staged, None)
    }

    fn writable(&self, rect: Rect) -> Rect {
        let state = self.0.state.read();
        rect.intersect(&state.extent).intersect(&state.abyss)
    }

    // ── Views and copies ─────────────────────────────────────────

    /// A view over `rect ∩ extent` sharing this buffer's storage.
    pub fn create_sub_buffer(&self, rect: Rect) -> Buffer {
        let state = self.0.state.read().clone();
        let extent = rect.intersect(&state.extent);
        Buffer(Arc::new(BufferShared {
            storage: self.0.storage.clone(),
            state: RwLock::new(BufferState {
                extent,
                abyss: extent,
                format: state.format,
            }),
            views: Arc::new(()),
            parent: Some((self.clone(), self.0.views.clone())),
        }))
    }

    /// An independent copy of the extent with its own storage.
    pub fn dup(&self) -> PrismResult<Buffer> {
        let state = self.0.state.read().clone();
        let (tw, th) = self.tile_size();
        let copy = Self::with_tile_size(state.extent, &state.format, tw, th)?;
        copy.0.state.write().abyss = state.abyss;
        if !state.extent.is_empty() {
            let pixels = self.read_native(state.extent, 1.0, AbyssPolicy::None)?;
            let bpp = state.format.bytes_per_pixel();
            let row = state.extent.width as usize * bpp;
            for (i, line) in pixels.chunks_exact(row).enumerate() {
                copy.0.storage.write_span(state.extent.x, state.extent.y + i as i32, line)?;
            }
        }
        Ok(copy)
    }

    /// Resize the extent, keeping pixels inside the overlap of old and new.
    ///
    /// Returns `false` while sub-buffer views of this buffer are alive.
    pub fn set_extent(&self, extent: Rect) -> bool {
        if Arc::strong_count(&self.0.views) > 1 {
            tracing::warn!("set_extent refused: buffer has live sub-buffers");
            return false;
        }
        let old = {
            let mut state = self.0.state.write();
            let old = state.extent;
            if state.abyss == old {
                state.abyss = extent;
            } else {
                state.abyss = state.abyss.intersect(&extent);
            }
            state.extent = extent;
            old
        };
        // Root buffers own their storage; drop pixels that left the extent.
        if self.0.parent.is_none() {
            for gone in old.subtract(&extent) {
                self.0.storage.clear_rect(&gone);
            }
        }
        true
    }

    /// Set the rectangle outside of which the abyss policy applies; clipped to the extent.
    pub fn set_abyss(&self, abyss: Rect) -> bool {
        let mut state = self.0.state.write();
        state.abyss = abyss.intersect(&state.extent);
        true
    }

    /// Reinterpret the stored bytes as `format`, which must have the same pixel size.
    pub fn set_format(&self, format: &PixelFormat) -> PrismResult<()> {
        if format.bytes_per_pixel() != self.0.storage.bpp() {
            return Err(ConfigurationError::Invalid(format!(
                "format {format} has {} bytes per pixel, storage has {}",
                format.bytes_per_pixel(),
                self.0.storage.bpp()
            ))
            .into());
        }
        self.0.state.write().format = format.clone();
        Ok(())
    }

    // ── Change notification ──────────────────────────────────────

    /// Call `handler` with the changed rectangle after every write to the storage.
    pub fn connect_changed<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&Rect) + Send + Sync + 'static,
    {
        self.0.storage.connect(Arc::new(handler))
    }

    pub fn disconnect(&self, id: HandlerId) -> bool {
        self.0.storage.disconnect(id)
    }

    /// Hold change notifications; they are merged and emitted by [`Self::thaw_changed`].
    pub fn freeze_changed(&self) {
        self.0.storage.freeze();
    }

    pub fn thaw_changed(&self) {
        self.0.storage.thaw();
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.state.read();
        f.debug_struct("Buffer")
            .field("extent", &state.extent)
            .field("abyss", &state.abyss)
            .field("format", &state.format)
            .finish()
    }
}

/// Source coordinate for destination coordinate `d` at `scale`.
fn scaled_source(d: i64, scale: f64) -> i64 {
    ((d as f64 + 0.5) / scale).floor() as i64
}

/// Level-0 rectangle touched by a scaled read of `rect`.
pub(crate) fn source_rect(rect: Rect, scale: f64) -> Rect {
    if scale == 1.0 {
        return rect;
    }
    let x0 = scaled_source(i64::from(rect.x), scale);
    let y0 = scaled_source(i64::from(rect.y), scale);
    let x1 = scaled_source(rect.right() - 1, scale);
    let y1 = scaled_source(rect.bottom() - 1, scale);
    let clamp = |v: i64| v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
    Rect::new(clamp(x0), clamp(y0), clamp(x1 - x0 + 1), clamp(y1 - y0 + 1))
}

/// Map a coordinate onto `[start, start + len)` according to `policy`.
fn resolve(v: i64, start: i32, len: i32, policy: AbyssPolicy) -> Option<i32> {
    if len <= 0 {
        return None;
    }
    let (start, len) = (i64::from(start), i64::from(len));
    if v >= start && v < start + len {
        return Some(v as i32);
    }
    match policy {
        AbyssPolicy::Clamp => Some(v.clamp(start, start + len - 1) as i32),
        AbyssPolicy::Loop => Some((start + (v - start).rem_euclid(len)) as i32),
        AbyssPolicy::None | AbyssPolicy::Black | AbyssPolicy::White => None,
    }
}

/// Pixel written for abyss reads that do not map onto stored pixels.
fn fill_pixel(format: &PixelFormat, policy: AbyssPolicy, bpp: usize) -> Vec<u8> {
    let colour = match policy {
        AbyssPolicy::Black => Colour::BLACK,
        AbyssPolicy::White => Colour::WHITE,
        _ => return vec![0; bpp],
    };
    // Anonymous component formats have no color meaning; they read zeros.
    colour.get_pixel(format).unwrap_or_else(|_| vec![0; bpp])
}

fn fill_row(line: &mut [u8], pixel: &[u8]) {
    if pixel.is_empty() {
        return;
    }
    for px in line.chunks_exact_mut(pixel.len()) {
        px.copy_from_slice(pixel);
    }
}
