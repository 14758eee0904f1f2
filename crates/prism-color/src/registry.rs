//! Process-wide interning tables for spaces, formats, conversions, and fishes.
//!
//! Lookups take a read lock; misses re-check under the write lock and build
//! the entry there, so each key is constructed at most once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, LazyLock, Once};

use parking_lot::RwLock;

use crate::component::ComponentType;
use crate::error::ColorError;
use crate::fish::{ConversionFn, Fish, Precision};
use crate::format::{FormatInner, FormatKey, Layout, PixelFormat, format_name, parse_format_name};
use crate::space::{ColorSpace, SpaceKey, SpaceParams, build_space, builtin_spaces};

#[derive(Default)]
struct SpaceTable {
    by_key: HashMap<SpaceKey, ColorSpace>,
    by_name: HashMap<String, ColorSpace>,
}

#[derive(Default)]
struct FormatTable {
    by_key: HashMap<FormatKey, PixelFormat>,
    aliases: HashMap<String, (Layout, ComponentType)>,
}

pub(crate) struct Registry {
    spaces: RwLock<SpaceTable>,
    default_space: ColorSpace,
    formats: RwLock<FormatTable>,
    conversions: RwLock<HashMap<(u32, u32), ConversionFn>>,
    fishes: RwLock<HashMap<(u32, u32, Precision), Fish>>,
    next_format_id: AtomicU32,
}

static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::with_builtin_spaces);
static BUILTIN_CONVERSIONS: Once = Once::new();

pub(crate) fn registry() -> &'static Registry {
    &REGISTRY
}

impl Registry {
    fn with_builtin_spaces() -> Self {
        let mut table = SpaceTable::default();
        let mut default_space = None;
        for (name, params) in builtin_spaces() {
            match build_space(name, params) {
                Ok(inner) => {
                    let space = ColorSpace(Arc::new(inner));
                    table.by_key.insert(params.key(), space.clone());
                    table.by_name.insert(name.to_string(), space.clone());
                    if default_space.is_none() {
                        default_space = Some(space);
                    }
                }
                Err(e) => tracing::warn!("built-in space {name} rejected: {e}"),
            }
        }

        let default_space = match default_space {
            Some(space) => space,
            // sRGB parameters are constant; reaching this means the matrix code is broken.
            None => panic!("sRGB space failed to build"),
        };

        Self {
            spaces: RwLock::new(table),
            default_space,
            formats: RwLock::new(FormatTable::default()),
            conversions: RwLock::new(HashMap::new()),
            fishes: RwLock::new(HashMap::new()),
            next_format_id: AtomicU32::new(1),
        }
    }

    pub(crate) fn default_space(&self) -> ColorSpace {
        self.default_space.clone()
    }

    // ── Spaces ───────────────────────────────────────────────────

    pub(crate) fn space(&self, name: &str) -> Result<ColorSpace, ColorError> {
        self.spaces
            .read()
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| ColorError::UnknownSpace(name.to_string()))
    }

    pub(crate) fn intern_space(
        &self,
        name: &str,
        params: SpaceParams,
    ) -> Result<ColorSpace, ColorError> {
        let key = params.key();
        if let Some(space) = self.spaces.read().by_key.get(&key) {
            return Ok(space.clone());
        }

        let mut table = self.spaces.write();
        if let Some(space) = table.by_key.get(&key) {
            return Ok(space.clone());
        }
        let space = ColorSpace(Arc::new(build_space(name, params)?));
        tracing::debug!("interned color space {name}");
        table.by_key.insert(key, space.clone());
        table
            .by_name
            .entry(name.to_string())
            .or_insert_with(|| space.clone());
        Ok(space)
    }

    pub(crate) fn space_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.spaces.read().by_name.keys().cloned().collect();
        names.sort();
        names
    }

    // ── Formats ──────────────────────────────────────────────────

    pub(crate) fn format(&self, name: &str) -> Result<PixelFormat, ColorError> {
        let space = self.default_space();
        self.format_with_space(name, &space)
    }

    pub(crate) fn format_with_space(
        &self,
        name: &str,
        space: &ColorSpace,
    ) -> Result<PixelFormat, ColorError> {
        let alias = self.formats.read().aliases.get(name).copied();
        let (layout, component_type) = match alias {
            Some(entry) => entry,
            None => parse_format_name(name)?,
        };
        Ok(self.intern_format(FormatKey {
            layout,
            component_type,
            space: space.clone(),
        }))
    }

    pub(crate) fn format_exists(&self, name: &str) -> bool {
        self.formats.read().aliases.contains_key(name) || parse_format_name(name).is_ok()
    }

    pub(crate) fn intern_format(&self, key: FormatKey) -> PixelFormat {
        if let Some(format) = self.formats.read().by_key.get(&key) {
            return format.clone();
        }

        let mut table = self.formats.write();
        if let Some(format) = table.by_key.get(&key) {
            return format.clone();
        }
        let format = PixelFormat(Arc::new(FormatInner {
            id: self.next_format_id.fetch_add(1, Ordering::Relaxed),
            name: format_name(key.layout, key.component_type),
            layout: key.layout,
            component_type: key.component_type,
            space: key.space.clone(),
        }));
        tracing::debug!("interned format {:?}", format);
        table.by_key.insert(key, format.clone());
        format
    }

    pub(crate) fn register_alias(
        &self,
        name: &str,
        layout: Layout,
        component_type: ComponentType,
    ) -> Result<PixelFormat, ColorError> {
        {
            let mut table = self.formats.write();
            let parsed = parse_format_name(name).ok();
            let existing = table.aliases.get(name).copied().or(parsed);
            match existing {
                Some(entry) if entry != (layout, component_type) => {
                    return Err(ColorError::FormatConflict(name.to_string()));
                }
                Some(_) => {}
                None => {
                    table
                        .aliases
                        .insert(name.to_string(), (layout, component_type));
                }
            }
        }
        Ok(self.intern_format(FormatKey {
            layout,
            component_type,
            space: self.default_space(),
        }))
    }

    // ── Conversions and fishes ───────────────────────────────────

    pub(crate) fn register_conversion(
        &self,
        source: &PixelFormat,
        destination: &PixelFormat,
        convert: ConversionFn,
    ) -> bool {
        let mut table = self.conversions.write();
        let key = (source.id(), destination.id());
        if table.contains_key(&key) {
            return false;
        }
        table.insert(key, convert);
        true
    }

    pub(crate) fn conversion(
        &self,
        source: &PixelFormat,
        destination: &PixelFormat,
    ) -> Option<ConversionFn> {
        self.conversions
            .read()
            .get(&(source.id(), destination.id()))
            .cloned()
    }

    pub(crate) fn fish(
        &self,
        source: &PixelFormat,
        destination: &PixelFormat,
        precision: Precision,
    ) -> Result<Fish, ColorError> {
        ensure_builtin_conversions();
        let key = (source.id(), destination.id(), precision);
        if let Some(fish) = self.fishes.read().get(&key) {
            return Ok(fish.clone());
        }

        let mut table = self.fishes.write();
        if let Some(fish) = table.get(&key) {
            return Ok(fish.clone());
        }
        let fish = Fish::build(source, destination, precision, self.conversion(source, destination))?;
        tracing::debug!("built {:?}", fish);
        table.insert(key, fish.clone());
        Ok(fish)
    }

    pub(crate) fn cached_fish_count(&self) -> usize {
        self.fishes.read().len()
    }

    pub(crate) fn clear_fishes(&self) {
        self.fishes.write().clear();
    }
}

/// Register the exact direct conversions shipped with the crate.
pub(crate) fn ensure_builtin_conversions() {
    BUILTIN_CONVERSIONS.call_once(|| {
        let reg = registry();
        let (Ok(rgb), Ok(rgba)) = (reg.format("R'G'B' u8"), reg.format("R'G'B'A u8")) else {
            return;
        };
        reg.register_conversion(
            &rgb,
            &rgba,
            Arc::new(|src: &[u8], dst: &mut [u8], n: usize| {
                for (s, d) in src.chunks_exact(3).zip(dst.chunks_exact_mut(4)).take(n) {
                    d[..3].copy_from_slice(s);
                    d[3] = u8::MAX;
                }
            }),
        );
        reg.register_conversion(
            &rgba,
            &rgb,
            Arc::new(|src: &[u8], dst: &mut [u8], n: usize| {
                for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(3)).take(n) {
                    d.copy_from_slice(&s[..3]);
                }
            }),
        );
        tracing::debug!("registered built-in direct conversions");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_lookup_is_interned() {
        let a = registry().format("R'G'B'A u8").unwrap();
        let b = registry().format("R'G'B'A u8").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_space_interning_by_parameters() {
        let srgb = registry().space("sRGB").unwrap();
        let again = registry().intern_space("also sRGB", srgb.params()).unwrap();
        assert_eq!(srgb, again);
        assert_eq!(again.name(), "sRGB");
    }

    #[test]
    fn test_alias_conflict_is_rejected() {
        let layout = parse_format_name("RGBA float").unwrap().0;
        let format = registry()
            .register_alias("test-rgba-f32", layout, ComponentType::Float)
            .unwrap();
        assert_eq!(format, registry().format("RGBA float").unwrap());
        assert_eq!(registry().format("test-rgba-f32").unwrap(), format);

        let err = registry().register_alias("test-rgba-f32", layout, ComponentType::U8);
        assert!(matches!(err, Err(ColorError::FormatConflict(_))));
        let err = registry().register_alias("RGBA u8", layout, ComponentType::Float);
        assert!(matches!(err, Err(ColorError::FormatConflict(_))));
    }

    #[test]
    fn test_unknown_space_name() {
        assert!(matches!(
            registry().space("NotASpace"),
            Err(ColorError::UnknownSpace(_))
        ));
    }
}
