#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use crate::error::NetForgeError;
    use crate::optim::{LearnableParam, SgdRule, UpdateRule};

    fn param(lr_mult: f64, decay_mult: f64) -> LearnableParam {
        LearnableParam {
            index: 0,
            node: "ip".to_string(),
            display_name: "w".to_string(),
            lr_mult,
            decay_mult,
        }
    }

    #[test]
    fn test_sgd_basic_step() -> Result<(), NetForgeError> {
        let mut rule = SgdRule::<f64>::new(0.1, 0.0, 0.0);
        let mut value = vec![1.0, 2.0];
        rule.apply(&param(1.0, 1.0), &mut value, &[0.5, -1.0])?;
        assert_relative_eq!(value[0], 0.95);
        assert_relative_eq!(value[1], 2.1);
        Ok(())
    }

    #[test]
    fn test_sgd_lr_mult_zero_freezes() -> Result<(), NetForgeError> {
        let mut rule = SgdRule::<f32>::new(0.1, 0.9, 0.0);
        let mut value = vec![1.0f32];
        rule.apply(&param(0.0, 1.0), &mut value, &[10.0])?;
        assert_eq!(value, vec![1.0]);
        Ok(())
    }

    #[test]
    fn test_sgd_momentum_accumulates() -> Result<(), NetForgeError> {
        let mut rule = SgdRule::<f64>::new(1.0, 0.5, 0.0);
        let mut value = vec![0.0];
        rule.apply(&param(1.0, 1.0), &mut value, &[1.0])?;
        rule.apply(&param(1.0, 1.0), &mut value, &[1.0])?;
        // history: 1.0, then 0.5 * 1.0 + 1.0
        assert_relative_eq!(rule.history(0).map(|h| h[0]).unwrap_or(0.0), 1.5);
        assert_relative_eq!(value[0], -2.5);
        Ok(())
    }

    #[test]
    fn test_sgd_weight_decay_uses_decay_mult() -> Result<(), NetForgeError> {
        let mut rule = SgdRule::<f64>::new(1.0, 0.0, 0.1);
        let mut value = vec![2.0];
        rule.apply(&param(1.0, 0.5), &mut value, &[0.0])?;
        assert_relative_eq!(value[0], 2.0 - 0.1 * 0.5 * 2.0);
        Ok(())
    }

    #[test]
    fn test_sgd_rejects_length_mismatch() {
        let mut rule = SgdRule::<f64>::new(1.0, 0.0, 0.0);
        let mut value = vec![0.0; 2];
        assert!(rule.apply(&param(1.0, 1.0), &mut value, &[1.0]).is_err());
    }
}
