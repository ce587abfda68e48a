//! Overlay geometry: normalized detection boxes to on-screen pixel rectangles.
//!
//! The detection service answers in image-fraction coordinates relative to the
//! rendered image. Hosts report where that image actually sits inside its
//! container (scaling and cropping included), and projection is pure math, so
//! it can be re-run on every image load or resize without touching the network.

use serde::{Deserialize, Serialize};

use crate::domain::NormalizedBox;

/// Axis-aligned rectangle in CSS pixel space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

/// Where the rendered scene image sits: its own rect and its container's rect,
/// both measured in the same page coordinate space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneLayout {
    pub image: PixelRect,
    pub container: PixelRect,
}

impl SceneLayout {
    pub fn project(&self, bbox: &NormalizedBox) -> PixelRect {
        project(bbox, &self.image, &self.container)
    }
}

/// Map a normalized box onto the container's coordinate space.
///
/// `x`/`y` scale by the image's rendered size and shift by the image's offset
/// within its container; `w`/`h` only scale. The image may be displayed at any
/// size relative to its natural resolution; only the rendered rect matters.
pub fn project(bbox: &NormalizedBox, image: &PixelRect, container: &PixelRect) -> PixelRect {
    let offset_x = image.x - container.x;
    let offset_y = image.y - container.y;
    PixelRect {
        x: bbox.x * image.w + offset_x,
        y: bbox.y * image.h + offset_y,
        w: bbox.w * image.w,
        h: bbox.h * image.h,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nbox(x: f64, y: f64, w: f64, h: f64) -> NormalizedBox {
        NormalizedBox { x, y, w, h }
    }

    fn rect(x: f64, y: f64, w: f64, h: f64) -> PixelRect {
        PixelRect { x, y, w, h }
    }

    #[test]
    fn image_flush_with_container_scales_only() {
        let image = rect(0.0, 0.0, 320.0, 320.0);
        let out = project(&nbox(0.25, 0.5, 0.5, 0.25), &image, &image);
        assert_eq!(out, rect(80.0, 160.0, 160.0, 80.0));
    }

    #[test]
    fn image_offset_inside_container_shifts_the_box() {
        // Image centered in a wider container, 40px of padding each side.
        let image = rect(140.0, 60.0, 320.0, 320.0);
        let container = rect(100.0, 60.0, 400.0, 320.0);
        let out = project(&nbox(0.0, 0.0, 1.0, 1.0), &image, &container);
        assert_eq!(out, rect(40.0, 0.0, 320.0, 320.0));
    }

    #[test]
    fn projection_uses_rendered_size_not_natural_size() {
        // A 1000px-natural scene shown at 320px: fractions are of the rendered rect.
        let image = rect(0.0, 0.0, 320.0, 200.0);
        let out = project(&nbox(0.1, 0.1, 0.2, 0.3), &image, &image);
        assert_eq!(out, rect(32.0, 20.0, 64.0, 60.0));
    }

    #[test]
    fn layout_helper_matches_free_function() {
        let layout = SceneLayout {
            image: rect(10.0, 20.0, 100.0, 50.0),
            container: rect(0.0, 0.0, 200.0, 100.0),
        };
        let b = nbox(0.5, 0.5, 0.5, 0.5);
        assert_eq!(layout.project(&b), project(&b, &layout.image, &layout.container));
        assert_eq!(layout.project(&b), rect(60.0, 45.0, 50.0, 25.0));
    }
}
