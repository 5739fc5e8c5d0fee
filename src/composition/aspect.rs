/// Which composition branch a source takes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AspectBranch {
    /// Landscape: a portrait slice is cut out of the frame.
    Wide,
    /// Portrait or near-square: a thin margin is trimmed.
    Tall,
}

/// `Wide` when `width / height >= threshold`.
pub fn classify(width: u32, height: u32, threshold: f64) -> AspectBranch {
    let ratio = f64::from(width) / f64::from(height.max(1));
    if ratio >= threshold {
        AspectBranch::Wide
    } else {
        AspectBranch::Tall
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_inclusive() {
        assert_eq!(classify(1920, 1080, 1.3), AspectBranch::Wide);
        assert_eq!(classify(130, 100, 1.3), AspectBranch::Wide);
        assert_eq!(classify(129, 100, 1.3), AspectBranch::Tall);
        assert_eq!(classify(1080, 1080, 1.3), AspectBranch::Tall);
        assert_eq!(classify(1080, 1920, 1.3), AspectBranch::Tall);
    }
}
