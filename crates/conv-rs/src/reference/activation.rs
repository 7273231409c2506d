use crate::tensor::Tensor;

/// Elementwise `max(x, 0)`.
pub fn relu(tensor: &Tensor) -> Tensor {
    tensor.map(|v| v.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Shape;

    #[test]
    fn relu_clamps_negatives_and_is_idempotent() {
        let x = Tensor::from_vec(Shape::new([5]), vec![-2.0, -0.0, 0.5, 3.0, -1e-7]).unwrap();
        let once = relu(&x);
        assert_eq!(once.data(), &[0.0, 0.0, 0.5, 3.0, 0.0]);
        assert_eq!(relu(&once), once);
    }
}
