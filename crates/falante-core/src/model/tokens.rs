//! Speech-codec token constants and decode-path cleanup.

/// Size of the speech-codec vocabulary; the sentinel ids sit just past it.
pub const SPEECH_VOCAB_SIZE: i64 = 6561;

/// Start-of-sequence sentinel.
pub const SOS: i64 = SPEECH_VOCAB_SIZE;

/// End-of-sequence sentinel.
pub const EOS: i64 = SPEECH_VOCAB_SIZE + 1;

/// Strip the start-of-sequence prefix and end-of-sequence suffix from a
/// decoded token sequence.
///
/// The effective range starts after the first `SOS` (or at 0 when absent)
/// and ends before the first `EOS` (or at the end when absent). A malformed
/// sequence whose range is inverted (an `EOS` ahead of the first `SOS`) is
/// returned unchanged rather than truncated to nothing, so a bad decode
/// never aborts the synthesis loop.
pub fn drop_invalid_tokens(tokens: &[i64]) -> &[i64] {
    let start = tokens
        .iter()
        .position(|&t| t == SOS)
        .map(|i| i + 1)
        .unwrap_or(0);
    let end = tokens
        .iter()
        .position(|&t| t == EOS)
        .unwrap_or(tokens.len());

    if start > end {
        return tokens;
    }
    &tokens[start..end]
}

/// Batch form of [`drop_invalid_tokens`].
///
/// Models emit a batch dimension; only a batch of exactly one sequence is
/// supported.
pub fn drop_invalid_tokens_batch(batch: &[Vec<i64>]) -> &[i64] {
    assert!(
        batch.len() == 1,
        "only a batch size of one is supported, got {}",
        batch.len()
    );
    drop_invalid_tokens(&batch[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_sentinels() {
        assert_eq!(drop_invalid_tokens(&[SOS, 5, 6, EOS, 9]), &[5, 6]);
    }

    #[test]
    fn test_no_sentinels_passes_through() {
        let tokens = [4, 8, 15, 16, 23, 42];
        assert_eq!(drop_invalid_tokens(&tokens), &tokens);
    }

    #[test]
    fn test_missing_sos_keeps_prefix() {
        assert_eq!(drop_invalid_tokens(&[7, 8, EOS, 9]), &[7, 8]);
    }

    #[test]
    fn test_missing_eos_keeps_suffix() {
        assert_eq!(drop_invalid_tokens(&[SOS, 7, 8]), &[7, 8]);
    }

    #[test]
    fn test_inverted_range_returns_original() {
        // EOS ahead of SOS must fall back to the untrimmed sequence, not an
        // empty one.
        let tokens = [EOS, 1, SOS, 2];
        assert_eq!(drop_invalid_tokens(&tokens), &tokens);
    }

    #[test]
    fn test_adjacent_sentinels_yield_empty() {
        assert_eq!(drop_invalid_tokens(&[SOS, EOS]), &[] as &[i64]);
    }

    #[test]
    fn test_empty_sequence() {
        assert_eq!(drop_invalid_tokens(&[]), &[] as &[i64]);
    }

    #[test]
    fn test_batch_of_one_unwraps() {
        assert_eq!(drop_invalid_tokens_batch(&[vec![SOS, 3, EOS]]), &[3]);
    }

    #[test]
    #[should_panic(expected = "batch size of one")]
    fn test_larger_batch_is_rejected() {
        drop_invalid_tokens_batch(&[vec![1], vec![2]]);
    }
}
