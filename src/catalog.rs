//! Piece classification against an ordered template catalog.
//!
//! Every piece has several template variants (`f`ull, `t`op, `b`ottom, `l`eft,
//! `r`ight crops and numbered retakes) so that small rendering differences
//! between themes and zoom levels still produce a match. Entries are tried in
//! catalog order and the first one that clears the confidence threshold decides
//! the square. Later entries are never consulted, so the order itself resolves
//! look-alike conflicts (a white pawn variant placed before a white bishop wins
//! on a square where both would match).

use std::path::{Path, PathBuf};

use image::GrayImage;

use crate::error::{Result, VisionError};
use crate::matcher::TemplateMatcher;
use crate::piece::{Color, Piece, PieceKind};

use Color::{Black, White};
use PieceKind::{Bishop, King, Knight, Pawn, Queen, Rook};

/// Default catalog order: (kind, color, variant suffix).
/// Files are named `pieces/<kind>-<color>-<variant>.png`.
#[rustfmt::skip]
pub const DEFAULT_VARIANTS: &[(PieceKind, Color, &str)] = &[
    (Pawn, White, "f"), (Pawn, White, "t"), (Pawn, White, "t2"), (Pawn, White, "t3"),
    (Pawn, White, "b"), (Pawn, White, "l"), (Pawn, White, "r"),
    (Pawn, Black, "f"), (Pawn, Black, "t"), (Pawn, Black, "t2"), (Pawn, Black, "b"),
    (Pawn, Black, "l"), (Pawn, Black, "r"),
    (Rook, White, "f"), (Rook, White, "t"), (Rook, White, "t2"), (Rook, White, "b"),
    (Rook, White, "l"), (Rook, White, "l2"), (Rook, White, "r"), (Rook, White, "r2"),
    (Rook, Black, "f"), (Rook, Black, "t"), (Rook, Black, "t2"), (Rook, Black, "b"),
    (Rook, Black, "l"), (Rook, Black, "r"),
    (Knight, White, "f"), (Knight, White, "t"), (Knight, White, "t2"), (Knight, White, "t3"),
    (Knight, White, "b"), (Knight, White, "b2"), (Knight, White, "l"), (Knight, White, "l2"),
    (Knight, White, "r"), (Knight, White, "r2"),
    (Knight, Black, "f"), (Knight, Black, "t"), (Knight, Black, "t2"), (Knight, Black, "b"),
    (Knight, Black, "b2"), (Knight, Black, "b3"), (Knight, Black, "l"), (Knight, Black, "r"),
    (Knight, Black, "r2"),
    (Bishop, White, "f"), (Bishop, White, "t"), (Bishop, White, "t2"), (Bishop, White, "t3"),
    (Bishop, White, "b"), (Bishop, White, "l"), (Bishop, White, "r"),
    (Bishop, Black, "f"), (Bishop, Black, "t"), (Bishop, Black, "b"), (Bishop, Black, "b2"),
    (Bishop, Black, "b3"), (Bishop, Black, "l"), (Bishop, Black, "r"),
    (Queen, White, "f"), (Queen, White, "t"), (Queen, White, "t2"), (Queen, White, "t3"),
    (Queen, White, "b"), (Queen, White, "b2"), (Queen, White, "b3"), (Queen, White, "l"),
    (Queen, White, "r"), (Queen, White, "r2"),
    (Queen, Black, "f"), (Queen, Black, "t"), (Queen, Black, "t2"), (Queen, Black, "b"),
    (Queen, Black, "l"), (Queen, Black, "l2"), (Queen, Black, "r"),
    (King, White, "f"), (King, White, "t"), (King, White, "t2"), (King, White, "t3"),
    (King, White, "b"), (King, White, "b2"), (King, White, "l"), (King, White, "l2"),
    (King, White, "r"), (King, White, "r2"), (King, White, "r3"),
    (King, Black, "f"), (King, Black, "t"), (King, Black, "t2"), (King, Black, "b"),
    (King, Black, "l"), (King, Black, "r"),
];

pub struct CatalogEntry {
    pub piece: Piece,
    pub name: String,
    pub template: GrayImage,
}

pub struct PieceCatalog {
    entries: Vec<CatalogEntry>,
}

impl PieceCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// Loads the default variants from `<dir>/<kind>-<color>-<variant>.png`.
    /// Variants a theme does not ship are skipped; a catalog with no templates
    /// at all is an error.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut entries = Vec::with_capacity(DEFAULT_VARIANTS.len());
        for &(kind, color, variant) in DEFAULT_VARIANTS {
            let name = format!("{}-{}-{}", kind.name(), color.name(), variant);
            let path = dir.join(format!("{name}.png"));
            match load_template(&path) {
                Ok(template) => entries.push(CatalogEntry {
                    piece: Piece::new(kind, color),
                    name,
                    template,
                }),
                Err(VisionError::MissingTemplate(path)) => {
                    log::debug!("Skipping missing piece template {}", path.display());
                }
                Err(e) => return Err(e),
            }
        }
        if entries.is_empty() {
            return Err(VisionError::EmptyCatalog(dir.to_path_buf()));
        }
        log::debug!("Loaded {} piece templates from {}", entries.len(), dir.display());
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// First catalog entry matching `sample` at `confidence`, or `None` for an
    /// empty square. Templates larger than the sample are skipped.
    pub fn classify(
        &self,
        sample: &GrayImage,
        matcher: &dyn TemplateMatcher,
        confidence: f32,
    ) -> Result<Option<Piece>> {
        for entry in &self.entries {
            match matcher.find(sample, &entry.template, confidence) {
                Ok(Some(found)) => {
                    log::trace!("{} matched at {:.3}", entry.name, found.confidence);
                    return Ok(Some(entry.piece));
                }
                Ok(None) | Err(VisionError::TemplateSize { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }
}

/// Reads a template as grayscale.
pub fn load_template(path: &Path) -> Result<GrayImage> {
    if !path.is_file() {
        return Err(VisionError::MissingTemplate(PathBuf::from(path)));
    }
    let image = image::open(path).map_err(|source| VisionError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(image.to_luma8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::Match;
    use image::Luma;
    use std::collections::HashMap;

    /// Matcher keyed on the template's first pixel value, so tests can decide
    /// per template whether it "matches" and at what confidence.
    struct StubMatcher {
        pub scores: HashMap<u8, f32>,
        pub too_big: Vec<u8>,
    }

    impl TemplateMatcher for StubMatcher {
        fn find(&self, region: &GrayImage, template: &GrayImage, confidence: f32) -> Result<Option<Match>> {
            let key = template.get_pixel(0, 0).0[0];
            if self.too_big.contains(&key) {
                return Err(VisionError::TemplateSize {
                    template_w: region.width() + 1,
                    template_h: region.height() + 1,
                    region_w: region.width(),
                    region_h: region.height(),
                });
            }
            Ok(self
                .scores
                .get(&key)
                .filter(|&&score| score >= confidence)
                .map(|&score| Match {
                    x: 0,
                    y: 0,
                    confidence: score,
                }))
        }
    }

    fn entry(kind: PieceKind, color: Color, key: u8) -> CatalogEntry {
        CatalogEntry {
            piece: Piece::new(kind, color),
            name: format!("{}-{}", kind.name(), key),
            template: GrayImage::from_pixel(2, 2, Luma([key])),
        }
    }

    fn sample() -> GrayImage {
        GrayImage::from_pixel(8, 8, Luma([128]))
    }

    #[test]
    fn test_first_acceptable_match_wins_over_higher_confidence() {
        let catalog = PieceCatalog::new(vec![
            entry(Pawn, White, 1),
            entry(Bishop, White, 2),
            entry(Queen, Black, 3),
        ]);
        let matcher = StubMatcher {
            scores: HashMap::from([(2, 0.81), (3, 0.99)]),
            too_big: vec![],
        };

        let piece = catalog.classify(&sample(), &matcher, 0.8).unwrap();
        assert_eq!(piece, Some(Piece::new(Bishop, White)));
    }

    #[test]
    fn test_below_threshold_means_empty_square() {
        let catalog = PieceCatalog::new(vec![entry(Rook, Black, 1)]);
        let matcher = StubMatcher {
            scores: HashMap::from([(1, 0.79)]),
            too_big: vec![],
        };
        assert_eq!(catalog.classify(&sample(), &matcher, 0.8).unwrap(), None);
    }

    #[test]
    fn test_size_error_skips_to_next_entry() {
        let catalog = PieceCatalog::new(vec![entry(King, White, 1), entry(Knight, Black, 2)]);
        let matcher = StubMatcher {
            scores: HashMap::from([(1, 1.0), (2, 0.9)]),
            too_big: vec![1],
        };
        let piece = catalog.classify(&sample(), &matcher, 0.8).unwrap();
        assert_eq!(piece, Some(Piece::new(Knight, Black)));
    }

    #[test]
    fn test_other_errors_propagate() {
        struct Failing;
        impl TemplateMatcher for Failing {
            fn find(&self, _: &GrayImage, _: &GrayImage, _: f32) -> Result<Option<Match>> {
                Err(VisionError::Io(std::io::Error::other("boom")))
            }
        }
        let catalog = PieceCatalog::new(vec![entry(Pawn, Black, 1)]);
        assert!(matches!(
            catalog.classify(&sample(), &Failing, 0.8),
            Err(VisionError::Io(_))
        ));
    }

    #[test]
    fn test_default_variants_order_and_size() {
        assert_eq!(DEFAULT_VARIANTS.len(), 94);
        assert_eq!(DEFAULT_VARIANTS[0], (Pawn, White, "f"));
        assert_eq!(DEFAULT_VARIANTS[93], (King, Black, "r"));
    }

    #[test]
    fn test_load_skips_missing_variants() {
        let dir = tempfile::tempdir().unwrap();
        GrayImage::from_pixel(4, 4, Luma([10]))
            .save(dir.path().join("rook-black-l.png"))
            .unwrap();
        GrayImage::from_pixel(4, 4, Luma([20]))
            .save(dir.path().join("pawn-white-t2.png"))
            .unwrap();

        let catalog = PieceCatalog::load(dir.path()).unwrap();
        let names: Vec<&str> = catalog.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["pawn-white-t2", "rook-black-l"]);
    }

    #[test]
    fn test_load_empty_dir_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            PieceCatalog::load(dir.path()),
            Err(VisionError::EmptyCatalog(_))
        ));
    }
}
