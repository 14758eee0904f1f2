//! Sparse tile storage shared by a buffer and its sub-buffers.
//!
//! Tiles are allocated on first write. Reads of tiles that were never written
//! produce zero bytes. Coordinates are absolute; every buffer sharing a storage
//! uses the same coordinate system.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::ResourceError;
use crate::rect::Rect;

/// Identifies a registered change handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

pub(crate) type ChangedFn = Arc<dyn Fn(&Rect) + Send + Sync>;

#[derive(Default)]
struct ChangeHandlers {
    next: u64,
    handlers: Vec<(HandlerId, ChangedFn)>,
    frozen: u32,
    pending: Rect,
}

pub(crate) struct TileStorage {
    tile_width: i32,
    tile_height: i32,
    bpp: usize,
    tiles: RwLock<HashMap<(i32, i32), Box<[u8]>>>,
    changes: Mutex<ChangeHandlers>,
}

/// Allocate `len` zeroed bytes or report the failure.
pub(crate) fn alloc_bytes(len: usize) -> Result<Vec<u8>, ResourceError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| ResourceError::Allocation { bytes: len })?;
    v.resize(len, 0);
    Ok(v)
}

impl TileStorage {
    pub(crate) fn new(tile_width: i32, tile_height: i32, bpp: usize) -> Self {
        Self {
            tile_width: tile_width.max(1),
            tile_height: tile_height.max(1),
            bpp,
            tiles: RwLock::new(HashMap::new()),
            changes: Mutex::new(ChangeHandlers::default()),
        }
    }

    pub(crate) fn bpp(&self) -> usize {
        self.bpp
    }

    pub(crate) fn tile_size(&self) -> (i32, i32) {
        (self.tile_width, self.tile_height)
    }

    pub(crate) fn tile_count(&self) -> usize {
        self.tiles.read().len()
    }

    fn tile_bytes(&self) -> usize {
        self.tile_width as usize * self.tile_height as usize * self.bpp
    }

    /// Split the row span `[x, x + n)` at `y` into per-tile segments:
    /// `(tile key, byte offset in tile, pixel offset in span, pixel count)`.
    fn segments(&self, x: i32, y: i32, n: usize) -> Vec<((i32, i32), usize, usize, usize)> {
        let (tw, th) = (i64::from(self.tile_width), i64::from(self.tile_height));
        let ty = i64::from(y).div_euclid(th) as i32;
        let local_y = i64::from(y).rem_euclid(th);

        let mut out = Vec::new();
        let mut cur = i64::from(x);
        let end = cur + n as i64;
        while cur < end {
            let tx = cur.div_euclid(tw) as i32;
            let local_x = cur.rem_euclid(tw);
            let take = (tw - local_x).min(end - cur);
            let offset = ((local_y * tw + local_x) as usize) * self.bpp;
            out.push(((tx, ty), offset, (cur - i64::from(x)) as usize, take as usize));
            cur += take;
        }
        out
    }

    /// Read `out.len() / bpp` pixels starting at `(x, y)`.
    pub(crate) fn read_span(&self, x: i32, y: i32, out: &mut [u8]) {
        let n = out.len() / self.bpp;
        let tiles = self.tiles.read();
        for (key, offset, px, count) in self.segments(x, y, n) {
            let dst = &mut out[px * self.bpp..(px + count) * self.bpp];
            match tiles.get(&key) {
                Some(tile) => dst.copy_from_slice(&tile[offset..offset + count * self.bpp]),
                None => dst.fill(0),
            }
        }
    }

    /// Write packed pixels starting at `(x, y)`, allocating tiles as needed.
    pub(crate) fn write_span(&self, x: i32, y: i32, data: &[u8]) -> Result<(), ResourceError> {
        let n = data.len() / self.bpp;
        let mut tiles = self.tiles.write();
        for (key, offset, px, count) in self.segments(x, y, n) {
            let tile = match tiles.entry(key) {
                std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
                std::collections::hash_map::Entry::Vacant(e) => {
                    e.insert(alloc_bytes(self.tile_bytes())?.into_boxed_slice())
                }
            };
            tile[offset..offset + count * self.bpp]
                .copy_from_slice(&data[px * self.bpp..(px + count) * self.bpp]);
        }
        Ok(())
    }

    /// Zero `rect`; tiles it covers completely are released.
    pub(crate) fn clear_rect(&self, rect: &Rect) {
        if rect.is_empty() {
            return;
        }
        let (tw, th) = (i64::from(self.tile_width), i64::from(self.tile_height));
        let mut tiles = self.tiles.write();
        let keys: Vec<(i32, i32)> = tiles.keys().copied().collect();
        for key in keys {
            let tile_rect = Rect::new(
                (i64::from(key.0) * tw) as i32,
                (i64::from(key.1) * th) as i32,
                self.tile_width,
                self.tile_height,
            );
            let overlap = tile_rect.intersect(rect);
            if overlap.is_empty() {
                continue;
            }
            if overlap == tile_rect {
                tiles.remove(&key);
                continue;
            }
            if let Some(tile) = tiles.get_mut(&key) {
                for row in overlap.y..overlap.y + overlap.height {
                    let ly = (row - tile_rect.y) as usize;
                    let lx = (overlap.x - tile_rect.x) as usize;
                    let start = (ly * self.tile_width as usize + lx) * self.bpp;
                    tile[start..start + overlap.width as usize * self.bpp].fill(0);
                }
            }
        }
    }

    // ── Change notification ──────────────────────────────────────

    pub(crate) fn connect(&self, handler: ChangedFn) -> HandlerId {
        let mut changes = self.changes.lock();
        changes.next += 1;
        let id = HandlerId(changes.next);
        changes.handlers.push((id, handler));
        id
    }

    pub(crate) fn disconnect(&self, id: HandlerId) -> bool {
        let mut changes = self.changes.lock();
        let before = changes.handlers.len();
        changes.handlers.retain(|(h, _)| *h != id);
        changes.handlers.len() != before
    }

    pub(crate) fn emit(&self, rect: &Rect) {
        if rect.is_empty() {
            return;
        }
        let handlers = {
            let mut changes = self.changes.lock();
            if changes.frozen > 0 {
                changes.pending = changes.pending.union(rect);
                return;
            }
            changes.handlers.iter().map(|(_, h)| h.clone()).collect::<Vec<_>>()
        };
        for handler in handlers {
            handler(rect);
        }
    }

    pub(crate) fn freeze(&self) {
        self.changes.lock().frozen += 1;
    }

    pub(crate) fn thaw(&self) {
        let (pending, handlers) = {
            let mut changes = self.changes.lock();
            if changes.frozen == 0 {
                return;
            }
            changes.frozen -= 1;
            if changes.frozen > 0 || changes.pending.is_empty() {
                return;
            }
            let pending = std::mem::take(&mut changes.pending);
            let handlers: Vec<ChangedFn> = changes.handlers.iter().map(|(_, h)| h.clone()).collect();
            (pending, handlers)
        };
        for handler in handlers {
            handler(&pending);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_span_crosses_tiles() {
        let storage = TileStorage::new(4, 4, 1);
        let data: Vec<u8> = (1..=10).collect();
        storage.write_span(-3, -1, &data).unwrap();
        assert_eq!(storage.tile_count(), 3);

        let mut out = vec![0u8; 12];
        storage.read_span(-4, -1, &mut out);
        assert_eq!(out, [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 0]);
    }

    #[test]
    fn test_storage_unwritten_reads_zero() {
        let storage = TileStorage::new(8, 8, 4);
        let mut out = vec![7u8; 16];
        storage.read_span(100, 100, &mut out);
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_storage_clear_releases_covered_tiles() {
        let storage = TileStorage::new(2, 2, 1);
        for y in 0..4 {
            storage.write_span(0, y, &[9, 9, 9, 9]).unwrap();
        }
        assert_eq!(storage.tile_count(), 4);
        storage.clear_rect(&Rect::new(0, 0, 3, 2));
        assert_eq!(storage.tile_count(), 3);
        let mut out = [0u8; 4];
        storage.read_span(0, 1, &mut out);
        assert_eq!(out, [0, 0, 0, 9]);
    }

    #[test]
    fn test_storage_freeze_coalesces_changes() {
        let storage = TileStorage::new(4, 4, 1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        storage.connect(Arc::new(move |r: &Rect| sink.lock().push(*r)));

        storage.freeze();
        storage.emit(&Rect::new(0, 0, 1, 1));
        storage.emit(&Rect::new(5, 5, 1, 1));
        assert!(seen.lock().is_empty());
        storage.thaw();
        assert_eq!(*seen.lock(), vec![Rect::new(0, 0, 6, 6)]);
    }
}
