//! Challenge generation and PNG rendering.

use std::io::Cursor;

use aktar_common::{AktarError, PublicChallenge};
use base64::{Engine, engine::general_purpose::STANDARD};
use image::{ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use rand::Rng;

use super::{Challenge, ChallengeStore, Circle, random_id};
use crate::config::CaptchaConfig;

/// Angular width of the gap on the broken circle
const GAP_DEGREES: f32 = 48.0;

/// Half the stroke width of a circle outline
const STROKE_RADIUS: i32 = 2;

const BACKGROUND: Rgba<u8> = Rgba([244, 241, 232, 255]);

/// Minimum distance between circle edges, and between a circle and the border
const SPACING: u32 = 6;

/// Full layouts tried before giving up
const LAYOUT_ROUNDS: usize = 64;

/// Positions tried for a single circle within one layout
const PLACEMENT_TRIES: usize = 256;

/// CAPTCHA generator service
pub struct ChallengeGenerator {
    circle_count: usize,
    width: u32,
    height: u32,
    min_radius: u32,
    max_radius: u32,
    /// Challenge TTL in seconds
    pub challenge_ttl: u64,
}

impl ChallengeGenerator {
    pub fn new(config: &CaptchaConfig) -> Self {
        Self {
            circle_count: config.circle_count,
            width: config.canvas_width,
            height: config.canvas_height,
            min_radius: config.min_radius,
            max_radius: config.max_radius,
            challenge_ttl: config.challenge_ttl_secs,
        }
    }

    /// Generate a challenge, persist its answer, and return the public view.
    ///
    /// Nothing is returned unless the store accepted the record.
    pub async fn create(&self, store: &ChallengeStore) -> Result<PublicChallenge, AktarError> {
        let challenge = self.build()?;
        let image = self.render_png(&challenge)?;

        store
            .insert_challenge(&challenge.id, challenge.to_stored(), self.challenge_ttl)
            .await?;

        tracing::debug!(
            challenge_id = %challenge.id,
            circles = challenge.circles.len(),
            "Generated CAPTCHA challenge"
        );

        Ok(challenge.public_view(image, self.width, self.height))
    }

    /// Lay out the circles and pick the broken one
    pub fn build(&self) -> Result<Challenge, AktarError> {
        let mut rng = rand::rng();

        let placed = self.layout(&mut rng).ok_or_else(|| {
            AktarError::Internal("could not place circles on canvas".to_string())
        })?;

        let correct_index = rng.random_range(0..placed.len());
        let circles = placed
            .into_iter()
            .enumerate()
            .map(|(i, (x, y, radius))| Circle {
                id: i as u8,
                x,
                y,
                radius,
                is_broken: i == correct_index,
                gap_rotation_degrees: rng.random_range(0..360),
            })
            .collect();

        let now = chrono::Utc::now().timestamp();
        Ok(Challenge {
            id: random_id(16),
            circles,
            correct_index: correct_index as u8,
            created_at: now,
            expires_at: now + self.challenge_ttl as i64,
        })
    }

    /// Rejection-sample `circle_count` non-overlapping circles.
    ///
    /// Returns `(x, y, radius)` triples, or `None` if the canvas is too
    /// crowded for the configured count.
    fn layout(&self, rng: &mut impl Rng) -> Option<Vec<(u32, u32, u32)>> {
        'round: for _ in 0..LAYOUT_ROUNDS {
            let mut placed: Vec<(u32, u32, u32)> = Vec::with_capacity(self.circle_count);

            for _ in 0..self.circle_count {
                let spot = (0..PLACEMENT_TRIES).find_map(|_| {
                    let r = rng.random_range(self.min_radius..=self.max_radius);
                    let x = rng.random_range(r + SPACING..=self.width - r - SPACING);
                    let y = rng.random_range(r + SPACING..=self.height - r - SPACING);
                    let fits = placed.iter().all(|&(px, py, pr)| {
                        let dx = x as i64 - px as i64;
                        let dy = y as i64 - py as i64;
                        let min = (r + pr + SPACING) as i64;
                        dx * dx + dy * dy >= min * min
                    });
                    fits.then_some((x, y, r))
                });

                match spot {
                    Some(c) => placed.push(c),
                    None => continue 'round,
                }
            }

            return Some(placed);
        }

        None
    }

    /// Rasterize the challenge into a base64 PNG data URI.
    ///
    /// The image carries pixels only, never markup describing the circles.
    pub fn render_png(&self, challenge: &Challenge) -> Result<String, AktarError> {
        let mut rng = rand::rng();
        let mut canvas = RgbaImage::from_pixel(self.width, self.height, BACKGROUND);

        // Noise lines
        for _ in 0..12 {
            let from = (
                rng.random_range(0..self.width) as f32,
                rng.random_range(0..self.height) as f32,
            );
            let to = (
                rng.random_range(0..self.width) as f32,
                rng.random_range(0..self.height) as f32,
            );
            let shade: u8 = rng.random_range(150..200);
            draw_line_segment_mut(&mut canvas, from, to, Rgba([shade, shade + 30, shade, 255]));
        }

        for circle in &challenge.circles {
            let color = Rgba([
                rng.random_range(30..90),
                rng.random_range(80..140),
                rng.random_range(30..80),
                255,
            ]);
            let sweep = if circle.is_broken {
                360.0 - GAP_DEGREES
            } else {
                360.0
            };
            stroke_arc(&mut canvas, circle, circle.gap_rotation_degrees as f32, sweep, color);
        }

        // Speckle
        for _ in 0..(self.width * self.height / 40) {
            let x = rng.random_range(0..self.width);
            let y = rng.random_range(0..self.height);
            let v: u8 = rng.random_range(120..220);
            canvas.put_pixel(x, y, Rgba([v, v, v, 255]));
        }

        let mut png = Vec::new();
        canvas
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| AktarError::Internal(format!("png encoding failed: {e}")))?;

        Ok(format!("data:image/png;base64,{}", STANDARD.encode(&png)))
    }
}

/// Stroke `sweep` degrees of `circle` clockwise from `start`, one dot per
/// pixel of arc length
fn stroke_arc(canvas: &mut RgbaImage, circle: &Circle, start: f32, sweep: f32, color: Rgba<u8>) {
    let (cx, cy, r) = (circle.x as f32, circle.y as f32, circle.radius as f32);
    let steps = (sweep.to_radians() * r).ceil().max(1.0) as usize;

    for i in 0..=steps {
        let rad = (start + sweep * i as f32 / steps as f32).to_radians();
        let x = (cx + r * rad.cos()).round() as i32;
        let y = (cy + r * rad.sin()).round() as i32;
        draw_filled_circle_mut(canvas, (x, y), STROKE_RADIUS, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captcha::MemoryStore;
    use aktar_common::constants::DEFAULT_CIRCLE_COUNT;
    use std::sync::Arc;

    fn generator() -> ChallengeGenerator {
        ChallengeGenerator::new(&CaptchaConfig::default())
    }

    #[test]
    fn test_exactly_one_broken_circle() {
        let generator = generator();
        for _ in 0..200 {
            let challenge = generator.build().unwrap();
            assert_eq!(challenge.circles.len(), DEFAULT_CIRCLE_COUNT);
            let broken: Vec<_> = challenge.circles.iter().filter(|c| c.is_broken).collect();
            assert_eq!(broken.len(), 1);
            assert_eq!(broken[0].id, challenge.correct_index);
        }
    }

    #[test]
    fn test_circles_do_not_overlap_and_stay_on_canvas() {
        let config = CaptchaConfig::default();
        let generator = ChallengeGenerator::new(&config);
        for _ in 0..100 {
            let challenge = generator.build().unwrap();
            for (i, a) in challenge.circles.iter().enumerate() {
                assert!(a.x >= a.radius && a.x + a.radius <= config.canvas_width);
                assert!(a.y >= a.radius && a.y + a.radius <= config.canvas_height);
                for b in &challenge.circles[i + 1..] {
                    let dx = a.x as f64 - b.x as f64;
                    let dy = a.y as f64 - b.y as f64;
                    assert!((dx * dx + dy * dy).sqrt() >= (a.radius + b.radius) as f64);
                }
            }
        }
    }

    #[test]
    fn test_broken_index_roughly_uniform() {
        let generator = generator();
        let mut hits = vec![0u32; DEFAULT_CIRCLE_COUNT];
        for _ in 0..3000 {
            hits[generator.build().unwrap().correct_index as usize] += 1;
        }
        // 500 expected per slot
        assert!(hits.iter().all(|&h| h > 300), "skewed distribution: {hits:?}");
    }

    #[test]
    fn test_crowded_canvas_fails_closed() {
        let config = CaptchaConfig {
            circle_count: 40,
            ..Default::default()
        };
        let generator = ChallengeGenerator::new(&config);
        assert!(matches!(generator.build(), Err(AktarError::Internal(_))));
    }

    fn decode(uri: &str) -> Vec<u8> {
        let encoded = uri.strip_prefix("data:image/png;base64,").unwrap();
        STANDARD.decode(encoded).unwrap()
    }

    /// Circle strokes are the only dark green pixels on the canvas; look at
    /// the 3x3 block so speckle on a single pixel doesn't matter
    fn stroked_near(canvas: &RgbaImage, x: u32, y: u32) -> bool {
        (x - 1..=x + 1).any(|nx| {
            (y - 1..=y + 1).any(|ny| {
                let [r, g, b, _] = canvas.get_pixel(nx, ny).0;
                r < 90 && b < 80 && g < 140 && g > r
            })
        })
    }

    #[test]
    fn test_public_view_hides_answer() {
        let generator = generator();
        let challenge = generator.build().unwrap();
        let image = generator.render_png(&challenge).unwrap();
        let public = challenge.public_view(image, 320, 200);
        let json = serde_json::to_value(&public).unwrap();

        assert!(json.get("correctIndex").is_none());
        for circle in json["circles"].as_array().unwrap() {
            let mut keys: Vec<_> = circle.as_object().unwrap().keys().cloned().collect();
            keys.sort();
            assert_eq!(keys, ["id", "radius", "x", "y"]);
        }
    }

    #[test]
    fn test_image_is_raster_without_geometry() {
        let generator = generator();
        let challenge = generator.build().unwrap();
        let bytes = decode(&generator.render_png(&challenge).unwrap());

        assert!(bytes.starts_with(b"\x89PNG\r\n\x1a\n"));
        let text = String::from_utf8_lossy(&bytes);
        for marker in ["<svg", "<path", "stroke"] {
            assert!(!text.contains(marker), "found {marker:?} in image bytes");
        }

        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (320, 200));
    }

    #[test]
    fn test_only_broken_circle_has_gap() {
        let generator = generator();
        for _ in 0..20 {
            let challenge = generator.build().unwrap();
            let canvas = image::load_from_memory(&decode(&generator.render_png(&challenge).unwrap()))
                .unwrap()
                .to_rgba8();

            for circle in &challenge.circles {
                // Middle of where the gap sits on the broken circle
                let rad = (circle.gap_rotation_degrees as f32 + 360.0 - GAP_DEGREES / 2.0)
                    .to_radians();
                let x = (circle.x as f32 + circle.radius as f32 * rad.cos()).round() as u32;
                let y = (circle.y as f32 + circle.radius as f32 * rad.sin()).round() as u32;
                assert_eq!(
                    stroked_near(&canvas, x, y),
                    !circle.is_broken,
                    "circle {} at gap midpoint",
                    circle.id
                );
            }
        }
    }

    #[tokio::test]
    async fn test_create_stores_answer() {
        let store = ChallengeStore::Memory(Arc::new(MemoryStore::new()));
        let public = generator().create(&store).await.unwrap();
        assert_eq!(store.challenge_count().await, 1);
        assert!(!public.captcha_id.is_empty());
    }
}
