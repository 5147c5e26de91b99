use dashmap::DashMap;
use log::warn;

use crate::kernel::MAX_STEPS;

/// Keys of the blur settings, hierarchical like the rest of the menu settings.
pub mod keys {
    pub const BLUR_ENABLED: &str = "menu/blur/enabled";
    pub const BLUR_DARKNESS: &str = "menu/blur/darkness";
    pub const BLUR_SIZE: &str = "menu/blur/size";
    pub const BLUR_STEPS: &str = "menu/blur/steps";
}

pub mod defaults {
    pub const BLUR_ENABLED: bool = false;
    pub const BLUR_DARKNESS: f32 = 1.0;
    pub const BLUR_SIZE: f32 = 0.0015;
    pub const BLUR_STEPS: i32 = 10;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettingValue {
    Bool(bool),
    Float(f32),
    Int(i32),
}

impl From<bool> for SettingValue {
    fn from(v: bool) -> Self {
        SettingValue::Bool(v)
    }
}

impl From<f32> for SettingValue {
    fn from(v: f32) -> Self {
        SettingValue::Float(v)
    }
}

impl From<i32> for SettingValue {
    fn from(v: i32) -> Self {
        SettingValue::Int(v)
    }
}

/// Typed key/value lookup. Every getter takes a default and never fails: a missing key or a
/// value of another type yields the default.
pub trait SettingsStore: Send + Sync {
    fn value(&self, key: &str) -> Option<SettingValue>;

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.value(key) {
            Some(SettingValue::Bool(v)) => v,
            Some(other) => mismatch(key, "bool", other, default),
            None => default,
        }
    }

    /// Integers are accepted and converted.
    fn get_f32(&self, key: &str, default: f32) -> f32 {
        match self.value(key) {
            Some(SettingValue::Float(v)) => v,
            Some(SettingValue::Int(v)) => v as f32,
            Some(other) => mismatch(key, "float", other, default),
            None => default,
        }
    }

    fn get_i32(&self, key: &str, default: i32) -> i32 {
        match self.value(key) {
            Some(SettingValue::Int(v)) => v,
            Some(other) => mismatch(key, "int", other, default),
            None => default,
        }
    }
}

fn mismatch<T>(key: &str, expected: &str, found: SettingValue, default: T) -> T {
    warn!("SettingsStore: `{key}` expected {expected}, found {found:?}; using default");
    default
}

/// In-memory settings store.
#[derive(Default)]
pub struct Settings {
    map: DashMap<String, SettingValue, fxhash::FxBuildHasher>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<SettingValue>) {
        self.map.insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<SettingValue> {
        self.map.remove(key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Settings
where
    K: Into<String>,
    V: Into<SettingValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let settings = Settings::new();
        for (k, v) in iter {
            settings.set(k, v);
        }
        settings
    }
}

impl SettingsStore for Settings {
    fn value(&self, key: &str) -> Option<SettingValue> {
        self.map.get(key).map(|v| *v.value())
    }
}

pub fn blur_enabled(store: &dyn SettingsStore) -> bool {
    store.get_bool(keys::BLUR_ENABLED, defaults::BLUR_ENABLED)
}

/// Inputs of the blur program. Read from the store each time they are uploaded, never cached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlurParameters {
    /// `1.0` leaves the backdrop faint, `0.0` makes it opaque.
    pub darkness: f32,
    /// Distance between two kernel samples in texture coordinates.
    pub size: f32,
    /// Kernel half-width, `0..=MAX_STEPS` when read from settings. Cost grows with `steps²` per
    /// pixel.
    pub steps: i32,
}

impl Default for BlurParameters {
    fn default() -> Self {
        Self {
            darkness: defaults::BLUR_DARKNESS,
            size: defaults::BLUR_SIZE,
            steps: defaults::BLUR_STEPS,
        }
    }
}

impl BlurParameters {
    pub fn read(store: &dyn SettingsStore) -> Self {
        Self {
            darkness: store.get_f32(keys::BLUR_DARKNESS, defaults::BLUR_DARKNESS),
            size: store.get_f32(keys::BLUR_SIZE, defaults::BLUR_SIZE),
            steps: read_steps(store),
        }
    }
}

fn read_steps(store: &dyn SettingsStore) -> i32 {
    let steps = store.get_i32(keys::BLUR_STEPS, defaults::BLUR_STEPS);
    let clamped = steps.clamp(0, MAX_STEPS);
    if clamped != steps {
        warn!(
            "BlurParameters::read: `{}` = {steps} out of range, using {clamped}",
            keys::BLUR_STEPS
        );
    }
    clamped
}
