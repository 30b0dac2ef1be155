//! Node-scoped settings.
//!
//! Projects carry key/value properties. A producer reads them through its
//! [`Scope`](crate::Scope), and the lookup walks from the producer's project
//! up through the parents to the nearest project that sets the key. When no
//! project does, the setting's own default applies.

use std::fmt::{self, Debug};

use serde::de::DeserializeOwned;

/// A typed property key with a default value.
///
/// ```rust
/// use tsumiki::Setting;
///
/// static OUTPUT_DIR: Setting<String> = Setting::new("output.dir", || "dist".into());
/// static PARALLEL_TESTS: Setting<bool> = Setting::new("test.parallel", || true);
/// ```
pub struct Setting<T> {
    key: &'static str,
    default: fn() -> T,
}

impl<T> Setting<T>
where
    T: DeserializeOwned,
{
    pub const fn new(key: &'static str, default: fn() -> T) -> Self {
        Self { key, default }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn default_value(&self) -> T {
        (self.default)()
    }
}

impl<T> Debug for Setting<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Setting({})", self.key)
    }
}
