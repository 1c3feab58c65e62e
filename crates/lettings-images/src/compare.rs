//! Gallery-level comparisons over already-hashed images.

use lettings_core::GalleryImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GalleryOverlap {
    /// Images of the smaller gallery with a hash match in the other.
    pub matched: usize,
    /// Size of the smaller gallery.
    pub compared: usize,
}

impl GalleryOverlap {
    pub fn fraction(&self) -> f64 {
        if self.compared == 0 {
            0.0
        } else {
            self.matched as f64 / self.compared as f64
        }
    }
}

/// `None` when either gallery is empty.
pub fn gallery_overlap(
    a: &[GalleryImage],
    b: &[GalleryImage],
    max_distance: u32,
) -> Option<GalleryOverlap> {
    if a.is_empty() || b.is_empty() {
        return None;
    }
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let matched = small
        .iter()
        .filter(|img| large.iter().any(|other| img.matches(other, max_distance)))
        .count();
    Some(GalleryOverlap {
        matched,
        compared: small.len(),
    })
}

/// Highest cosine similarity across all image pairs carrying embeddings.
pub fn best_embedding_similarity(a: &[GalleryImage], b: &[GalleryImage]) -> Option<f64> {
    a.iter()
        .filter_map(|x| x.embedding.as_ref())
        .flat_map(|ea| {
            b.iter()
                .filter_map(|y| y.embedding.as_ref())
                .filter_map(move |eb| ea.cosine(eb))
        })
        .fold(None, |best: Option<f64>, sim| Some(best.map_or(sim, |b| b.max(sim))))
}

/// Keep the first occurrence of each picture. Later images are dropped when
/// they share a URL with, or hash-match, one already kept.
pub fn dedupe_images(
    images: impl IntoIterator<Item = GalleryImage>,
    max_distance: u32,
) -> Vec<GalleryImage> {
    let mut kept: Vec<GalleryImage> = Vec::new();
    for image in images {
        let duplicate = kept
            .iter()
            .any(|k| k.url == image.url || k.matches(&image, max_distance));
        if !duplicate {
            kept.push(image);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use lettings_core::{Embedding, Hash64};

    fn img(url: &str, hash: u64) -> GalleryImage {
        GalleryImage {
            index: 0,
            url: url.to_string(),
            cached_path: None,
            phash: Hash64(hash),
            whash: Hash64(!hash),
            crop_hash: Hash64(hash.rotate_left(7)),
            embedding: None,
        }
    }

    #[test]
    fn overlap_uses_the_smaller_gallery() {
        let a = vec![img("a1", 0), img("a2", u64::MAX)];
        let b = vec![
            img("b1", 0b111),
            img("b2", 0x0f0f_0f0f_0f0f_0f0f),
            img("b3", 0x1234_5678_9abc_def0),
        ];
        let overlap = gallery_overlap(&a, &b, 8).unwrap();
        assert_eq!(overlap.compared, 2);
        assert_eq!(overlap.matched, 1);
        assert!((overlap.fraction() - 0.5).abs() < 1e-9);
        assert!(gallery_overlap(&a, &[], 8).is_none());
    }

    #[test]
    fn any_hash_family_can_match() {
        let mut x = img("x", 0);
        let mut y = img("y", u64::MAX);
        x.crop_hash = Hash64(42);
        y.crop_hash = Hash64(43);
        assert!(x.matches(&y, 8));
        assert!(!x.matches(&y, 0));
    }

    #[test]
    fn best_embedding_similarity_takes_the_maximum() {
        let mut a = img("a", 0);
        let mut b = img("b", 0);
        let mut c = img("c", 0);
        a.embedding = Some(Embedding::new(vec![1.0, 0.0]));
        b.embedding = Some(Embedding::new(vec![0.0, 1.0]));
        c.embedding = Some(Embedding::new(vec![1.0, 0.1]));
        let sim = best_embedding_similarity(&[a.clone()], &[b, c]).unwrap();
        assert!(sim > 0.99);
        assert!(best_embedding_similarity(&[a], &[img("d", 0)]).is_none());
    }

    #[test]
    fn dedupe_drops_url_and_hash_duplicates() {
        let images = vec![
            img("https://rm/1.jpg", 0),
            img("https://zp/9.jpg", 0x0f0f_0f0f_0f0f_0f0f),
            img("https://rm/1.jpg", 0x00ff_00ff_00ff_00ff),
            img("https://zp/7.jpg", 0x00ff_00ff_00ff_00ff),
            img("https://zp/8.jpg", 0x00ff_00ff_00ff_00fe),
        ];
        let kept = dedupe_images(images, 8);
        let urls: Vec<_> = kept.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://rm/1.jpg", "https://zp/9.jpg", "https://zp/7.jpg"]
        );
    }
}
