//! Exponential backoff between retry attempts.

const MAX_DELAY_SECONDS: f64 = 30.0;

/// `min(base_delay * 2^(attempt_num-1), 30.0)`, per the reference's
/// `calculate_backoff_delay`.
pub fn calculate_backoff(attempt_num: u32, base_delay: f64) -> f64 {
    let scaled = base_delay * 2f64.powi(attempt_num as i32 - 1);
    scaled.min(MAX_DELAY_SECONDS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_exponentially_then_caps() {
        assert_eq!(calculate_backoff(1, 1.0), 1.0);
        assert_eq!(calculate_backoff(2, 1.0), 2.0);
        assert_eq!(calculate_backoff(3, 1.0), 4.0);
        assert_eq!(calculate_backoff(4, 1.0), 8.0);
        assert_eq!(calculate_backoff(10, 1.0), 30.0);
    }

    #[test]
    fn scales_with_base_delay() {
        assert_eq!(calculate_backoff(1, 2.0), 2.0);
        assert_eq!(calculate_backoff(2, 2.0), 4.0);
        assert_eq!(calculate_backoff(6, 2.0), 30.0);
    }
}
