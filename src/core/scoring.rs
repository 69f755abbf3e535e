use rand::Rng;

/// Lowest placeholder score handed out
pub const MIN_PLACEHOLDER_SCORE: u8 = 70;

/// Width of the placeholder score range
const PLACEHOLDER_SPAN: u8 = 30;

/// Placeholder match score in `[70, 100)`
///
/// Stands in for a real compatibility model; callers must not rely on the value.
pub fn placeholder_score<R: Rng + ?Sized>(rng: &mut R) -> u8 {
    MIN_PLACEHOLDER_SCORE + rng.gen_range(0..PLACEHOLDER_SPAN)
}

/// Convenience wrapper over the thread-local generator
pub fn random_score() -> u8 {
    placeholder_score(&mut rand::thread_rng())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_range() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let score = placeholder_score(&mut rng);
            assert!((70..100).contains(&score), "score out of range: {}", score);
        }
    }
}
