//! Exact integer proportional allocation (largest-remainder method).
//!
//! Volume reconciliation depends on these sums being exact, so shares are
//! computed with widened integer arithmetic instead of floats.

/// Split a non-negative `total` across `weights` proportionally.
///
/// Returns one integer per weight, summing exactly to `total`. The remainder
/// after flooring goes to the positions with the largest fractional shares,
/// ties broken by lower index. A zero weight-sum distributes evenly with the
/// remainder on the leading indices.
pub fn proportional_alloc(total: i64, weights: &[i64]) -> Vec<i64> {
    let n = weights.len();
    if n == 0 {
        return Vec::new();
    }
    if total <= 0 {
        return vec![0; n];
    }

    let weight_sum: i128 = weights.iter().map(|w| *w as i128).sum();
    if weight_sum <= 0 {
        let base = total / n as i64;
        let remainder = (total - base * n as i64) as usize;
        let mut shares = vec![base; n];
        for share in shares.iter_mut().take(remainder) {
            *share += 1;
        }
        return shares;
    }

    let mut shares = Vec::with_capacity(n);
    let mut remainders: Vec<(usize, i128)> = Vec::with_capacity(n);
    let mut allocated: i64 = 0;
    for (index, weight) in weights.iter().enumerate() {
        let product = total as i128 * *weight as i128;
        let share = (product / weight_sum) as i64;
        shares.push(share);
        allocated += share;
        // fractional parts share the denominator, so remainders compare exactly
        remainders.push((index, product % weight_sum));
    }

    let mut leftover = total - allocated;
    if leftover > 0 {
        remainders.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        for (index, _) in remainders {
            if leftover == 0 {
                break;
            }
            shares[index] += 1;
            leftover -= 1;
        }
    }

    shares
}

/// Distribute a possibly negative `delta` proportionally across `weights`.
pub fn proportional_alloc_signed(delta: i64, weights: &[i64]) -> Vec<i64> {
    if delta == 0 {
        return vec![0; weights.len()];
    }
    let sign = if delta > 0 { 1 } else { -1 };
    proportional_alloc(delta.abs(), weights)
        .into_iter()
        .map(|share| sign * share)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_remainder_goes_to_leading_indices() {
        assert_eq!(proportional_alloc(10, &[1, 1, 1]), vec![4, 3, 3]);
        assert_eq!(proportional_alloc(10, &[0, 0, 0]), vec![4, 3, 3]);
    }

    #[test]
    fn test_exact_shares() {
        assert_eq!(proportional_alloc(100, &[3, 1]), vec![75, 25]);
        assert_eq!(proportional_alloc(5, &[2, 3]), vec![2, 3]);
    }

    #[test]
    fn test_empty_and_zero_total() {
        assert_eq!(proportional_alloc(10, &[]), Vec::<i64>::new());
        assert_eq!(proportional_alloc(0, &[1, 2]), vec![0, 0]);
    }

    #[test]
    fn test_sum_and_cap_properties() {
        let cases: &[(i64, &[i64])] = &[
            (17, &[5, 3, 9]),
            (1, &[1000, 1]),
            (999, &[1, 2, 3, 4, 5]),
            (7, &[0, 4, 0, 4]),
        ];
        for (total, weights) in cases {
            let shares = proportional_alloc(*total, weights);
            assert_eq!(shares.iter().sum::<i64>(), *total);

            let weight_sum: i64 = weights.iter().sum();
            for (share, weight) in shares.iter().zip(weights.iter()) {
                assert!(*share >= 0);
                // each share is at most the ceiling of its exact fraction
                let ceiling = (total * weight + weight_sum - 1) / weight_sum;
                assert!(*share <= ceiling, "share {} over {}", share, ceiling);
            }
            // deterministic
            assert_eq!(shares, proportional_alloc(*total, weights));
        }
    }

    #[test]
    fn test_signed_restores_sign() {
        assert_eq!(proportional_alloc_signed(-10, &[1, 1, 1]), vec![-4, -3, -3]);
        assert_eq!(proportional_alloc_signed(0, &[1, 2]), vec![0, 0]);
        assert_eq!(proportional_alloc_signed(6, &[1, 2]), vec![2, 4]);
    }
}
