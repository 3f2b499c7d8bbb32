//! Per-element style properties and partial style updates.

use crate::geom::Size;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Style {
    pub opacity: f64,
    /// Locked width/height. Wins over the natural (content-derived) size.
    pub fixed_size: Option<Size>,
    pub min_size: Option<Size>,
    pub max_size: Option<Size>,
    pub z_index: i32,
    /// Whether the element receives pointer events.
    pub interactive: bool,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            fixed_size: None,
            min_size: None,
            max_size: None,
            z_index: 0,
            interactive: true,
        }
    }
}

impl Style {
    pub fn is_visible(&self) -> bool {
        self.opacity > 0.5
    }

    /// Applies `patch`; returns `true` when the opacity changed.
    pub(crate) fn apply(&mut self, patch: &StylePatch) -> bool {
        let before = self.opacity;
        if let Some(v) = patch.opacity {
            self.opacity = v.clamp(0.0, 1.0);
        }
        if let Some(v) = patch.fixed_size {
            self.fixed_size = v;
        }
        if let Some(v) = patch.min_size {
            self.min_size = v;
        }
        if let Some(v) = patch.max_size {
            self.max_size = v;
        }
        if let Some(v) = patch.z_index {
            self.z_index = v;
        }
        if let Some(v) = patch.interactive {
            self.interactive = v;
        }
        before != self.opacity
    }
}

/// A partial style update; `None` leaves the property untouched.
///
/// The size constraints are `Option<Option<Size>>` so a patch can both set and clear them.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StylePatch {
    pub opacity: Option<f64>,
    pub fixed_size: Option<Option<Size>>,
    pub min_size: Option<Option<Size>>,
    pub max_size: Option<Option<Size>>,
    pub z_index: Option<i32>,
    pub interactive: Option<bool>,
}

impl StylePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opacity(mut self, opacity: f64) -> Self {
        self.opacity = Some(opacity);
        self
    }

    pub fn z_index(mut self, z: i32) -> Self {
        self.z_index = Some(z);
        self
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = Some(interactive);
        self
    }

    /// Pins width/height and the min/max constraints to `size`.
    pub fn lock_size(mut self, size: Size) -> Self {
        self.fixed_size = Some(Some(size));
        self.min_size = Some(Some(size));
        self.max_size = Some(Some(size));
        self
    }

    pub fn unlock_size(mut self) -> Self {
        self.fixed_size = Some(None);
        self.min_size = Some(None);
        self.max_size = Some(None);
        self
    }

    pub fn show() -> Self {
        Self::new().opacity(1.0).interactive(true)
    }

    pub fn hide() -> Self {
        Self::new().opacity(0.0).interactive(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::size;

    #[test]
    fn lock_then_unlock_clears_all_constraints() {
        let mut style = Style::default();
        style.apply(&StylePatch::new().lock_size(size(40.0, 30.0)));
        assert_eq!(style.fixed_size, Some(size(40.0, 30.0)));
        assert_eq!(style.min_size, Some(size(40.0, 30.0)));
        style.apply(&StylePatch::new().unlock_size());
        assert_eq!(style.fixed_size, None);
        assert_eq!(style.max_size, None);
    }

    #[test]
    fn apply_reports_opacity_changes_only() {
        let mut style = Style::default();
        assert!(!style.apply(&StylePatch::new().z_index(3)));
        assert!(style.apply(&StylePatch::hide()));
        assert!(!style.is_visible());
        assert!(!style.interactive);
    }
}
