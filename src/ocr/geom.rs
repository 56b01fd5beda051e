use crate::ocr::Vertex;
use crate::result::UnitBox;

/// Axis-aligned bounds of `vertices` as fractions of the page size.
///
/// Returns `None` for polygons with fewer than four vertices, an empty page
/// or a rectangle with no area once clamped to the page.
pub fn normalize_box(vertices: &[Vertex], page_width: u32, page_height: u32) -> Option<UnitBox> {
    if vertices.len() < 4 || page_width == 0 || page_height == 0 {
        return None;
    }
    let (min_x, max_x) = span(vertices.iter().map(|v| v.x), page_width)?;
    let (min_y, max_y) = span(vertices.iter().map(|v| v.y), page_height)?;

    let page_w = page_width as f64;
    let page_h = page_height as f64;
    Some(UnitBox {
        x: min_x as f64 / page_w,
        y: min_y as f64 / page_h,
        width: (max_x - min_x) as f64 / page_w,
        height: (max_y - min_y) as f64 / page_h,
    })
}

fn span(values: impl Iterator<Item = i64>, limit: u32) -> Option<(i64, i64)> {
    let limit = limit as i64;
    let (min, max) = values.fold((i64::MAX, i64::MIN), |(min, max), value| {
        let value = value.clamp(0, limit);
        (min.min(value), max.max(value))
    });
    if max > min { Some((min, max)) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(points: [(i64, i64); 4]) -> Vec<Vertex> {
        points.iter().map(|&(x, y)| Vertex { x, y }).collect()
    }

    #[test]
    fn normalizes_pixel_polygon() {
        let vertices = quad([(100, 50), (300, 50), (300, 150), (100, 150)]);
        let unit = normalize_box(&vertices, 400, 200).expect("box");
        assert_eq!(
            unit,
            UnitBox {
                x: 0.25,
                y: 0.25,
                width: 0.5,
                height: 0.5
            }
        );
    }

    #[test]
    fn rotated_polygons_use_their_bounding_rectangle() {
        let vertices = quad([(200, 0), (400, 100), (200, 200), (0, 100)]);
        let unit = normalize_box(&vertices, 400, 200).expect("box");
        assert_eq!((unit.x, unit.y, unit.width, unit.height), (0.0, 0.0, 1.0, 1.0));
    }

    #[test]
    fn too_few_vertices_yield_none() {
        let vertices = vec![Vertex { x: 1, y: 1 }, Vertex { x: 9, y: 9 }];
        assert!(normalize_box(&vertices, 10, 10).is_none());
        assert!(normalize_box(&[], 10, 10).is_none());
    }

    #[test]
    fn degenerate_geometry_yields_none() {
        let flat = quad([(10, 5), (20, 5), (20, 5), (10, 5)]);
        assert!(normalize_box(&flat, 100, 100).is_none());
        let vertices = quad([(0, 0), (10, 0), (10, 10), (0, 10)]);
        assert!(normalize_box(&vertices, 0, 100).is_none());
    }

    #[test]
    fn out_of_page_vertices_are_clamped() {
        let vertices = quad([(-20, -5), (120, -5), (120, 60), (-20, 60)]);
        let unit = normalize_box(&vertices, 100, 50).expect("box");
        assert!(unit.x >= 0.0 && unit.y >= 0.0);
        assert!(unit.x + unit.width <= 1.0 + f64::EPSILON);
        assert!(unit.y + unit.height <= 1.0 + f64::EPSILON);
        assert!(unit.width > 0.0 && unit.height > 0.0);
    }
}
