#![forbid(unsafe_code)]

//! Surface styling.
//!
//! Surfaces fill their container by default. Authors override individual
//! properties with an inline style string; overrides replace defaults in place
//! so the serialized order stays stable.

/// Default declarations applied to every surface.
pub const DEFAULT_STYLE: &[(&str, &str)] = &[
    ("margin", "0px"),
    ("width", "100vw"),
    ("height", "100vh"),
    ("max-width", "100%"),
    ("max-height", "100%"),
    ("z-index", "1"),
];

/// Ordered CSS declarations for one surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceStyle {
    declarations: Vec<(String, String)>,
}

impl Default for SurfaceStyle {
    fn default() -> Self {
        Self {
            declarations: DEFAULT_STYLE
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        }
    }
}

impl SurfaceStyle {
    /// Defaults merged with the declarations of an inline style string.
    #[must_use]
    pub fn with_overrides(inline: &str) -> Self {
        let mut style = Self::default();
        for (property, value) in parse_inline_style(inline) {
            style.set(property, value);
        }
        style
    }

    /// Set a property, replacing an existing value in place.
    pub fn set(&mut self, property: impl Into<String>, value: impl Into<String>) {
        let property = property.into();
        let value = value.into();
        match self.declarations.iter_mut().find(|(k, _)| *k == property) {
            Some(slot) => slot.1 = value,
            None => self.declarations.push((property, value)),
        }
    }

    #[must_use]
    pub fn get(&self, property: &str) -> Option<&str> {
        self.declarations
            .iter()
            .find(|(k, _)| k == property)
            .map(|(_, v)| v.as_str())
    }

    /// Declarations in application order.
    #[must_use]
    pub fn declarations(&self) -> &[(String, String)] {
        &self.declarations
    }

    /// Serialize as a `style` attribute value.
    #[must_use]
    pub fn to_css(&self) -> String {
        self.declarations
            .iter()
            .fold(String::new(), |mut css, (property, value)| {
                css.push_str(property);
                css.push(':');
                css.push_str(&collapse_whitespace(value));
                css.push(';');
                css
            })
    }
}

/// Parse `prop: value; prop: value !important` into ordered pairs.
///
/// Declarations without a colon or with an empty property are dropped.
#[must_use]
pub fn parse_inline_style(inline: &str) -> Vec<(String, String)> {
    inline
        .split(';')
        .filter_map(|decl| {
            let (property, value) = decl.split_once(':')?;
            let property = property.trim();
            if property.is_empty() {
                return None;
            }
            Some((property.to_owned(), collapse_whitespace(value.trim())))
        })
        .collect()
}

/// Overflow to force on a container, if any.
///
/// Containers clip their surface unless the author asked for visible overflow
/// or the container already carries an overflow value.
#[must_use]
pub fn container_overflow(current: Option<&str>, overflow_shown: bool) -> Option<&'static str> {
    let already_set = current.is_some_and(|v| !v.trim().is_empty());
    (!already_set && !overflow_shown).then_some("hidden")
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
