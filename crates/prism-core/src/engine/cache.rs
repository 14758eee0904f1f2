//! Per-node evaluation state and output cache.
//!
//! Each node owns one mutex around its [`NodeRuntime`]. Evaluation holds it
//! while computing, so concurrent requests for the same node wait for one
//! computation instead of repeating it.

use prism_color::PixelFormat;
use serde::Serialize;

use crate::buffer::Buffer;
use crate::error::PrismResult;
use crate::rect::Rect;
use crate::region::Region;

/// Lifecycle of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NodeState {
    /// Created, not yet inserted.
    Unattached,
    /// Inserted into a graph; its operation's `attach` has run.
    Attached,
    /// Output format and bounding box negotiated for a render.
    Prepared,
    /// Output computed at least once.
    Processed,
    /// Some cached output was discarded since the last computation.
    Invalidated,
}

/// Cached output of one pad in one format.
pub(crate) struct CacheEntry {
    pad: String,
    format: PixelFormat,
    buffer: Buffer,
    valid: Region,
}

pub(crate) struct NodeRuntime {
    pub(crate) state: NodeState,
    cache: Option<CacheEntry>,
}

impl NodeRuntime {
    pub(crate) fn new() -> Self {
        Self {
            state: NodeState::Unattached,
            cache: None,
        }
    }

    /// Record the negotiated format; a cache in another format is dropped.
    pub(crate) fn prepared(&mut self, pad: &str, format: &PixelFormat) {
        if self
            .cache
            .as_ref()
            .is_some_and(|c| c.pad != pad || &c.format != format)
        {
            tracing::debug!("dropping cache: output format changed to {format}");
            self.cache = None;
        }
        if self.state != NodeState::Processed {
            self.state = NodeState::Prepared;
        }
    }

    /// Region of the output that is cached and valid.
    pub(crate) fn valid_region(&self) -> Region {
        self.cache.as_ref().map(|c| c.valid.clone()).unwrap_or_default()
    }

    /// The cache buffer when it covers all of `need`.
    pub(crate) fn hit(&self, need: &Rect) -> Option<Buffer> {
        let cache = self.cache.as_ref()?;
        cache.valid.contains(need).then(|| cache.buffer.clone())
    }

    /// Parts of `need` the cache cannot serve.
    pub(crate) fn missing(&self, need: &Rect) -> Region {
        match &self.cache {
            Some(cache) => cache.valid.missing(need),
            None => Region::from_rect(*need),
        }
    }

    /// The cache buffer, created or grown so its extent covers `need`.
    pub(crate) fn buffer_for(&mut self, pad: &str, format: &PixelFormat, need: &Rect) -> PrismResult<Buffer> {
        if let Some(cache) = &mut self.cache {
            let extent = cache.buffer.extent();
            if extent.contains(need) {
                return Ok(cache.buffer.clone());
            }
            if cache.buffer.set_extent(extent.union(need)) {
                return Ok(cache.buffer.clone());
            }
        }
        let buffer = Buffer::new(*need, format)?;
        self.cache = Some(CacheEntry {
            pad: pad.to_string(),
            format: format.clone(),
            buffer: buffer.clone(),
            valid: Region::new(),
        });
        Ok(buffer)
    }

    /// The cache buffer whatever its validity.
    pub(crate) fn cached_buffer(&self) -> Option<Buffer> {
        self.cache.as_ref().map(|c| c.buffer.clone())
    }

    /// Record an uncached computation.
    pub(crate) fn mark_processed(&mut self) {
        self.state = NodeState::Processed;
    }

    /// Mark `rect` of the cache valid after a successful computation.
    pub(crate) fn commit(&mut self, rect: &Rect) {
        if let Some(cache) = &mut self.cache {
            cache.valid.union_rect(rect);
        }
        self.state = NodeState::Processed;
    }

    /// Drop `rect` from the valid region and zero its pixels, so consumers
    /// reading past a shrunken bounding box see transparency.
    pub(crate) fn invalidate(&mut self, rect: &Rect) {
        if let Some(cache) = &mut self.cache {
            cache.valid.subtract_rect(rect);
            cache.buffer.clear(rect.intersect(&cache.buffer.extent()));
        }
        if self.state == NodeState::Processed {
            self.state = NodeState::Invalidated;
        }
    }

    pub(crate) fn clear(&mut self) {
        self.cache = None;
        if self.state == NodeState::Processed {
            self.state = NodeState::Invalidated;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba() -> PixelFormat {
        prism_color::format("RGBA float").unwrap()
    }

    #[test]
    fn test_cache_hit_after_commit() {
        let mut rt = NodeRuntime::new();
        let need = Rect::new(0, 0, 8, 8);
        rt.prepared("output", &rgba());
        assert!(rt.hit(&need).is_none());
        rt.buffer_for("output", &rgba(), &need).unwrap();
        rt.commit(&need);
        assert!(rt.hit(&need).is_some());
        assert_eq!(rt.state, NodeState::Processed);
    }

    #[test]
    fn test_cache_grows_and_reports_missing() {
        let mut rt = NodeRuntime::new();
        rt.buffer_for("output", &rgba(), &Rect::new(0, 0, 4, 4)).unwrap();
        rt.commit(&Rect::new(0, 0, 4, 4));
        let wider = Rect::new(0, 0, 8, 4);
        let buffer = rt.buffer_for("output", &rgba(), &wider).unwrap();
        assert_eq!(buffer.extent(), wider);
        assert_eq!(rt.missing(&wider).rects(), &[Rect::new(4, 0, 4, 4)]);
    }

    #[test]
    fn test_cache_format_change_drops_entry() {
        let mut rt = NodeRuntime::new();
        let need = Rect::new(0, 0, 2, 2);
        rt.buffer_for("output", &rgba(), &need).unwrap();
        rt.commit(&need);
        rt.prepared("output", &prism_color::format("R'G'B'A u8").unwrap());
        assert!(rt.valid_region().is_empty());
    }

    #[test]
    fn test_cache_invalidate_marks_state() {
        let mut rt = NodeRuntime::new();
        let need = Rect::new(0, 0, 4, 4);
        rt.buffer_for("output", &rgba(), &need).unwrap();
        rt.commit(&need);
        rt.invalidate(&Rect::new(0, 0, 2, 4));
        assert_eq!(rt.state, NodeState::Invalidated);
        assert_eq!(rt.valid_region().area(), 8);
    }

    #[test]
    fn test_cache_invalidate_zeroes_pixels() {
        let mut rt = NodeRuntime::new();
        let need = Rect::new(0, 0, 4, 4);
        let buffer = rt.buffer_for("output", &rgba(), &need).unwrap();
        buffer.set_color(need, &prism_color::Colour::WHITE).unwrap();
        rt.commit(&need);
        rt.invalidate(&Rect::new(2, 0, 100, 100));

        let bytes = buffer
            .get(Rect::new(0, 0, 4, 1), 1.0, &rgba(), crate::buffer::AbyssPolicy::None)
            .unwrap();
        let alpha = |px: usize| f32::from_ne_bytes(bytes[px * 16 + 12..px * 16 + 16].try_into().unwrap());
        assert_eq!(alpha(1), 1.0);
        assert_eq!(alpha(2), 0.0);
        assert_eq!(alpha(3), 0.0);
    }
}
