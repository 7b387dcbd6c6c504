//! Axis labels and dimension-order inference.
//!
//! Files often describe their axes only partially: a shaped series without
//! axes is `QQYX`, a generic page stack is `IYX`. [`infer`] replaces those
//! placeholders with plausible labels derived from the shape alone, keeping
//! every label the file did provide.
//!
//! # Example
//!
//! ```
//! use tiffscene::dimensions::infer;
//!
//! assert_eq!(infer("QYX", &[3, 512, 512]), "CYX");
//! assert_eq!(infer("TCZYX", &[1, 2, 3, 4, 5]), "TCZYX");
//! ```

// =============================================================================
// Labels
// =============================================================================

/// Labels meaning "axis present, meaning unknown".
pub const UNKNOWN_LABELS: [char; 2] = ['Q', 'I'];

/// Axes always read as whole blocks.
pub const REQUIRED_CHUNK_DIMS: [char; 3] = ['Y', 'X', 'S'];

/// Chunk axes used when the caller does not ask for any.
pub const DEFAULT_CHUNK_DIMS: [char; 4] = ['Z', 'Y', 'X', 'S'];

/// Canonical order of the common microscopy axes, slowest first.
const CANONICAL_ORDER: &str = "TZCYX";

/// Labels handed out, in order, to leading axes beyond the canonical five.
const EXTRA_LABELS: &str = "MPARLEHV";

/// Whether `label` is a placeholder.
pub fn is_unknown(label: char) -> bool {
    UNKNOWN_LABELS.contains(&label)
}

/// Upper-case chunk axes and drop duplicates, keeping first occurrences.
pub fn normalize_chunk_dims(dims: impl IntoIterator<Item = char>) -> Vec<char> {
    let mut out = Vec::new();
    for label in dims.into_iter().flat_map(char::to_uppercase) {
        if !out.contains(&label) {
            out.push(label);
        }
    }
    out
}

/// Labels for a shape, from its length alone.
///
/// Up to five axes take the matching suffix of `TZCYX`. Longer shapes get
/// extra leading labels, then `Q` once those run out.
pub fn guess_dim_order(shape: &[usize]) -> String {
    let n = shape.len();
    let canonical = CANONICAL_ORDER.len();
    if n <= canonical {
        return CANONICAL_ORDER[canonical - n..].to_string();
    }

    let extra = n - canonical;
    let mut labels: String = EXTRA_LABELS.chars().take(extra).collect();
    labels.extend(std::iter::repeat(UNKNOWN_LABELS[0]).take(extra.saturating_sub(EXTRA_LABELS.len())));
    labels.push_str(CANONICAL_ORDER);
    labels
}

// =============================================================================
// Merge Strategy
// =============================================================================

/// Combines a file's partial axis labels with a shape-only guess.
pub trait DimensionGuesser: Send + Sync {
    /// Produce one label per character of `hint`.
    fn merge(&self, hint: &str, guess: &str) -> String;
}

/// Left-to-right greedy merge.
///
/// Known labels are copied. Each placeholder takes the first guessed label
/// that is neither already placed nor present anywhere in the hint; when no
/// such label is left the placeholder is kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyMerge;

impl DimensionGuesser for GreedyMerge {
    fn merge(&self, hint: &str, guess: &str) -> String {
        let mut placed: Vec<char> = Vec::with_capacity(hint.len());
        let mut out = String::with_capacity(hint.len());

        for label in hint.chars() {
            if !is_unknown(label) {
                out.push(label);
                continue;
            }

            let pick = guess
                .chars()
                .find(|c| !placed.contains(c) && !hint.contains(*c));
            match pick {
                Some(c) => {
                    placed.push(c);
                    out.push(c);
                }
                None => out.push(label),
            }
        }

        out
    }
}

// =============================================================================
// Inference
// =============================================================================

/// Resolve placeholders in `hint` using the default [`GreedyMerge`].
pub fn infer(hint: &str, shape: &[usize]) -> String {
    infer_with(&GreedyMerge, hint, shape)
}

/// Resolve placeholders in `hint` with a custom merge strategy.
///
/// Hints without placeholders are returned unchanged.
pub fn infer_with(strategy: &dyn DimensionGuesser, hint: &str, shape: &[usize]) -> String {
    if !hint.chars().any(is_unknown) {
        return hint.to_string();
    }
    strategy.merge(hint, &guess_dim_order(shape))
}

// =============================================================================
// Tests
// =============================================================================
