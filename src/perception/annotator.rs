//! Draws the model's bounding boxes onto the round's observation image.
//!
//! The annotator re-scans the whole raw reply and renders every box it
//! finds; this is deliberately looser than the operation parser, which
//! reads only the first box inside the already-isolated operation detail.
//! One feeds the executor, the other feeds the eye.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{GrounderError, GrounderResult};

/// Outline red, 3 px stroke.
const BOX_COLOUR: [u8; 4] = [255, 0, 0, 255];
const BOX_THICKNESS: i32 = 3;

// Inner brackets around the quadruple are optional: both box=[[1,2,3,4]]
// and box=[1,2,3,4] appear in model output.
static BOX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"box=\[\[?(\d+),(\d+),(\d+),(\d+)\]?\]").unwrap());

/// All box quadruples in the reply, normalized from the 0–1000 scale to 0–1.
pub fn extract_norm_boxes(response: &str) -> Vec<[f64; 4]> {
    BOX_RE
        .captures_iter(response)
        .filter_map(|cap| {
            let mut vals = [0.0f64; 4];
            for (i, v) in vals.iter_mut().enumerate() {
                *v = cap[i + 1].parse::<i64>().ok()? as f64 / 1000.0;
            }
            Some(vals)
        })
        .collect()
}

/// Draw `boxes` (normalized 0–1 corners) onto the image at `src` and save
/// the annotated copy to `dest`.
pub fn annotate_image_file(src: &Path, boxes: &[[f64; 4]], dest: &Path) -> GrounderResult<()> {
    let img = image::open(src)
        .map_err(|e| GrounderError::Perception(format!("annotate load: {e}")))?;
    let mut canvas = img.to_rgba8();
    let (w, h) = canvas.dimensions();

    for bx in boxes {
        let x1 = (bx[0] * w as f64) as i32;
        let y1 = (bx[1] * h as f64) as i32;
        let x2 = (bx[2] * w as f64) as i32;
        let y2 = (bx[3] * h as f64) as i32;
        draw_rect(&mut canvas, x1, y1, x2, y2, BOX_COLOUR, BOX_THICKNESS);
    }

    image::DynamicImage::ImageRgba8(canvas)
        .save(dest)
        .map_err(|e| GrounderError::Perception(format!("annotate save: {e}")))?;
    Ok(())
}

/// Scan the raw reply for boxes and, if any, save an annotated copy of the
/// round's observation as `img_{round}_bbox.png` in `cache_dir`. Returns the
/// saved filename, or `None` when the reply contained no box.
pub fn annotate_response(
    response: &str,
    source_image: &Path,
    cache_dir: &Path,
    round: u32,
) -> GrounderResult<Option<String>> {
    let boxes = extract_norm_boxes(response);
    if boxes.is_empty() {
        return Ok(None);
    }
    let filename = round_annotation_name(round);
    annotate_image_file(source_image, &boxes, &cache_dir.join(&filename))?;
    tracing::debug!(round, boxes = boxes.len(), %filename, "reply annotated");
    Ok(Some(filename))
}

/// Canonical cache filename for a round's annotated observation.
pub fn round_annotation_name(round: u32) -> String {
    format!("img_{round}_bbox.png")
}

fn draw_rect(
    canvas: &mut image::RgbaImage,
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
    col: [u8; 4],
    thickness: i32,
) {
    let (w, h) = canvas.dimensions();
    let (iw, ih) = (w as i32, h as i32);

    // Top & bottom edges
    for t in 0..thickness {
        let ty = y1 + t;
        let by = y2 - t;
        for x in x1..=x2 {
            if x >= 0 && x < iw {
                if ty >= 0 && ty < ih {
                    canvas.put_pixel(x as u32, ty as u32, image::Rgba(col));
                }
                if by >= 0 && by < ih {
                    canvas.put_pixel(x as u32, by as u32, image::Rgba(col));
                }
            }
        }
    }
    // Left & right edges
    for t in 0..thickness {
        let lx = x1 + t;
        let rx = x2 - t;
        for y in y1..=y2 {
            if y >= 0 && y < ih {
                if lx >= 0 && lx < iw {
                    canvas.put_pixel(lx as u32, y as u32, image::Rgba(col));
                }
                if rx >= 0 && rx < iw {
                    canvas.put_pixel(rx as u32, y as u32, image::Rgba(col));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn red(px: &Rgba<u8>) -> bool {
        px[0] == 255 && px[1] == 0 && px[2] == 0
    }

    #[test]
    fn finds_all_boxes_including_single_bracket() {
        let reply = "Grounded Operation: tap(box=[[100,200,300,400]])\n\
                     also box=[500,0,1000,250] here";
        let boxes = extract_norm_boxes(reply);
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0], [0.1, 0.2, 0.3, 0.4]);
        assert_eq!(boxes[1], [0.5, 0.0, 1.0, 0.25]);
    }

    #[test]
    fn no_boxes_yields_empty() {
        assert!(extract_norm_boxes("Action: press the button").is_empty());
    }

    #[test]
    fn draws_rectangle_at_scaled_corners() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src = dir.path().join("img_1.png");
        let dest = dir.path().join("img_1_bbox.png");
        image::DynamicImage::ImageRgba8(RgbaImage::new(200, 100))
            .save(&src)
            .expect("save source");

        // 200x100 image: corners land at (100,0)-(200,25).
        annotate_image_file(&src, &[[0.5, 0.0, 1.0, 0.25]], &dest).expect("annotate");
        let out = image::open(&dest).expect("reopen").to_rgba8();

        assert!(red(out.get_pixel(100, 0)), "top-left corner");
        assert!(red(out.get_pixel(150, 25)), "bottom edge");
        assert!(red(out.get_pixel(199, 12)), "right edge, clipped to canvas");
        assert!(red(out.get_pixel(100, 25)), "left edge bottom");
        assert!(!red(out.get_pixel(50, 50)), "outside the box untouched");
        assert!(!red(out.get_pixel(150, 12)), "interior not filled");
    }

    #[test]
    fn annotate_response_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src = dir.path().join("img_3.png");
        image::DynamicImage::ImageRgba8(RgbaImage::new(10, 10))
            .save(&src)
            .expect("save source");

        let name = annotate_response("box=[[0,0,500,500]]", &src, dir.path(), 3)
            .expect("annotate")
            .expect("has boxes");
        assert_eq!(name, "img_3_bbox.png");
        assert!(dir.path().join(name).exists());

        let none = annotate_response("no boxes here", &src, dir.path(), 3).expect("annotate");
        assert_eq!(none, None);
    }
}
