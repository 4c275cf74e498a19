pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (dot, na, nb) = a
        .iter()
        .zip(b.iter())
        .fold((0.0f32, 0.0f32, 0.0f32), |(d, aa, bb), (x, y)| {
            (d + (x * y), aa + (x * x), bb + (y * y))
        });

    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na.sqrt() * nb.sqrt())
    }
}

/// Cosine similarity of `query` against every candidate, in candidate order.
pub fn score_all(query: &[f32], candidates: &[Vec<f32>]) -> Vec<f32> {
    candidates
        .iter()
        .map(|c| cosine_similarity(query, c))
        .collect()
}

/// Running best over a stream of scores: a candidate replaces the current best
/// only when it is strictly above both the threshold and the best so far, so
/// the first of several equal scores is kept.
#[derive(Debug, Clone, Copy)]
pub struct BestScore<T> {
    threshold: f32,
    best: Option<(f32, T)>,
}

impl<T: Copy> BestScore<T> {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            best: None,
        }
    }

    pub fn offer(&mut self, score: f32, item: T) -> bool {
        let beats_best = self.best.map_or(true, |(b, _)| score > b);
        if score > self.threshold && beats_best {
            self.best = Some((score, item));
            true
        } else {
            false
        }
    }

    pub fn best(&self) -> Option<(f32, T)> {
        self.best
    }
}
