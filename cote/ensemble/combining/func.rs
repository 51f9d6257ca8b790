/// Index of the largest value; ties resolve to the lowest index, and an empty
/// slice yields zero.
#[must_use]
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (index, value) in values.iter().enumerate() {
        if *value > values[best] {
            best = index;
        }
    }
    best
}

/// Scales `values` to sum to one. Returns false, leaving them untouched, when
/// the sum is not a positive finite number.
pub fn normalize(values: &mut [f64]) -> bool {
    let total: f64 = values.iter().sum();
    if !(total.is_finite() && total > 0.0) {
        return false;
    }
    for value in values.iter_mut() {
        *value /= total;
    }
    true
}

/// Normalizes `values`, replacing them with a uniform distribution when they
/// carry no mass.
pub fn normalize_or_uniform(values: &mut [f64]) {
    if !normalize(values) && !values.is_empty() {
        let uniform = 1.0 / values.len() as f64;
        values.fill(uniform);
    }
}

/// One-hot distribution for `class` over `num_classes`.
#[must_use]
pub fn one_hot(class: usize, num_classes: usize) -> Vec<f64> {
    let mut dist = vec![0.0; num_classes];
    if let Some(slot) = dist.get_mut(class) {
        *slot = 1.0;
    }
    dist
}
